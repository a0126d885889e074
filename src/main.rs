//! The speedtest results Lambda.
//!
//! The runtime hands us the raw HTTP event as JSON and serializes whatever
//! envelope we return. Streaming responses cost more than buffered ones and
//! we only ever send a tiny JSON body, so we stay buffered.

use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use serde_json::Value;

use speedtest_lambda::Services;

#[tokio::main]
async fn main() -> Result<(), Error> {
    let svcs = Services::init().await?;
    let ref_svcs = &svcs;

    run(service_fn(|event: LambdaEvent<Value>| async move {
        let (payload, _context) = event.into_parts();
        ref_svcs.handle(payload).await
    }))
    .await?;
    Ok(())
}
