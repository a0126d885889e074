//! "Oneshot" version of the speedtest Lambda.
//!
//! This executable handles one HTTP event, given as JSON text on the command
//! line, using configuration from the environment, and prints the response
//! envelope. Pair it with `STORE_PATH=file://...` to try things out without
//! any AWS resources.

use lambda_runtime::Error;
use serde_json::Value;
use std::env;

use speedtest_lambda::Services;

#[tokio::main]
async fn main() -> Result<(), Error> {
    let mut args = env::args();
    args.next(); // skip argv[0]

    let json_text = args
        .next()
        .ok_or_else(|| -> Error { "first argument should be the JSON event text".into() })?;
    let event: Value = serde_json::from_str(&json_text)?;

    let svcs = Services::init().await?;
    let response = svcs.handle(event).await?;

    serde_json::to_writer(std::io::stdout().lock(), &response)?;
    println!();
    Ok(())
}
