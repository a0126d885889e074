//! The AWS/Lambda-powered speedtest results service
//!
//! This library crate implements the one endpoint behind the speedtest site:
//! the browser client POSTs its measurements when a run completes, and we
//! file each submission away as a JSON document in S3 (or, for local
//! development, a directory). The codebase is compiled into two executables:
//! `speedtest-lambda`, which runs inside the Lambda runtime, and
//! `speedtest-lambda-oneshot`, which handles a single event given on the
//! command line and is handy for poking at things locally.
//!
//! The function is invoked through a function URL / API Gateway HTTP API, so
//! the events are the v2 HTTP payload format and responses are buffered JSON
//! envelopes. Each invocation passes through the same stages:
//!
//! 1. [`event::adapt_with_context`] normalizes the raw event;
//! 2. [`cors::Cors::check_request`] may refuse it outright;
//! 3. [`speedtest::handle`] validates and persists the submission;
//! 4. [`cors::Cors::decorate_response`] stamps the response on the way out.

use lambda_runtime::Error;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, level_filters::LevelFilter};
use tracing_subscriber::EnvFilter;

pub mod config;
pub mod cors;
pub mod event;
pub mod response;
pub mod speedtest;
pub mod store;

use crate::{
    config::{Config, ConfigError},
    cors::Cors,
    response::Response,
    store::{ObjectStore, Store},
};

pub fn set_up_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_target(false) // don't print the module name
        .without_time() // don't print time (CloudWatch has it)
        .init();
}

pub struct Services {
    config: Config,
    cors: Cors,
    store: Store,
}

impl Services {
    /// Create a state object for the speedtest Lambda service, configured
    /// from the environment.
    pub async fn init() -> Result<Self, Error> {
        set_up_logging();

        info!(
            "Initializing {} version {}",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION")
        );

        let config = Config::load_from_env()?;
        let aws_config = aws_config::load_from_env().await;
        let s3c = aws_sdk_s3::Client::new(&aws_config);

        Ok(Services::new(config, Arc::new(s3c))?)
    }

    /// Assemble the service from explicit parts.
    pub fn new(config: Config, objects: Arc<dyn ObjectStore>) -> Result<Self, ConfigError> {
        let cors = Cors::new(config.allowed_origin.as_deref())?;
        let store = Store::new(config.store_path.clone(), objects);

        info!(
            store = %config.store_path,
            allow_origin = cors.allow_origin().unwrap_or("<disabled>"),
            "service configured"
        );

        Ok(Services {
            config,
            cors,
            store,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Handle one invocation.
    ///
    /// An error here means that the event couldn't be adapted or that a
    /// local-directory write failed; the Lambda runtime reports those as
    /// invocation failures.
    pub async fn handle(&self, event: Value) -> Result<Response, Error> {
        let (request, context) = event::adapt_with_context(event)?;

        debug!(
            request_id = context.request_id.as_deref().unwrap_or("<none>"),
            method = request.method.as_deref().unwrap_or("<none>"),
            path = request.path.as_deref().unwrap_or("<none>"),
            "handling request"
        );

        let response = match self.cors.check_request(&request) {
            Some(rejection) => rejection,
            None => speedtest::handle(&request, &context, &self.config, &self.store).await?,
        };

        Ok(self.cors.decorate_response(response))
    }
}
