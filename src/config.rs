//! Runtime configuration, read once from the environment.

use std::{collections::HashSet, env};
use tracing::error;

use crate::{
    cors::CorsError,
    store::{StorePath, StorePathError},
};

pub const DEFAULT_PATH: &str = "/speedtest";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("bad ALLOWED_ORIGIN: {0}")]
    Cors(#[from] CorsError),

    #[error(transparent)]
    StorePath(#[from] StorePathError),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    /// Acceptable `Host` header values, lower-cased.
    pub allowed_hosts: HashSet<String>,

    /// CORS origin; `None` disables CORS handling.
    pub allowed_origin: Option<String>,

    pub allowed_paths: HashSet<String>,

    pub store_path: StorePath,
}

fn var(name: &str) -> String {
    env::var(name).unwrap_or_default()
}

impl Config {
    pub fn load_from_env() -> Result<Config, ConfigError> {
        let allowed_hosts = var("ALLOWED_HOSTS")
            .split_whitespace()
            .map(str::to_lowercase)
            .collect();

        let allowed_origin = Some(var("ALLOWED_ORIGIN").trim().to_owned()).filter(|o| !o.is_empty());

        let mut allowed_paths: HashSet<String> = var("ALLOWED_PATHS")
            .split_whitespace()
            .map(str::to_owned)
            .collect();

        if allowed_paths.is_empty() {
            allowed_paths.insert(DEFAULT_PATH.to_owned());
        }

        let store_path = var("STORE_PATH").parse::<StorePath>().map_err(|e| {
            error!("bad configuration value for STORE_PATH: {e}");
            ConfigError::StorePath(e)
        })?;

        Ok(Config {
            allowed_hosts,
            allowed_origin,
            allowed_paths,
            store_path,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const VARS: [&str; 4] = ["ALLOWED_HOSTS", "ALLOWED_ORIGIN", "ALLOWED_PATHS", "STORE_PATH"];

    fn with_env<R>(values: [Option<&str>; 4], f: impl FnOnce() -> R) -> R {
        let vars: Vec<(&str, Option<&str>)> = VARS.into_iter().zip(values).collect();
        temp_env::with_vars(vars, f)
    }

    #[test]
    fn test_load_full() {
        let config = with_env(
            [
                Some("Speed.Example.org  localhost:3000"),
                Some(" https://speed.example.org "),
                Some("/speedtest /api/speedtest"),
                Some("s3://results/speedtest"),
            ],
            Config::load_from_env,
        )
        .unwrap();

        assert_eq!(
            config.allowed_hosts,
            HashSet::from(["speed.example.org".to_owned(), "localhost:3000".to_owned()])
        );
        assert_eq!(
            config.allowed_origin.as_deref(),
            Some("https://speed.example.org")
        );
        assert_eq!(
            config.allowed_paths,
            HashSet::from(["/speedtest".to_owned(), "/api/speedtest".to_owned()])
        );
        assert_eq!(
            config.store_path,
            StorePath::ObjectStore {
                bucket: "results".into(),
                prefix: Some("speedtest".into())
            }
        );
    }

    #[test]
    fn test_load_defaults() {
        let config = with_env(
            [None, Some("   "), None, Some("file:///tmp/speedtest")],
            Config::load_from_env,
        )
        .unwrap();

        assert!(config.allowed_hosts.is_empty());
        assert_eq!(config.allowed_origin, None);
        assert_eq!(config.allowed_paths, HashSet::from([DEFAULT_PATH.to_owned()]));
        assert_eq!(
            config.store_path,
            StorePath::LocalDirectory("/tmp/speedtest".into())
        );
    }

    #[test]
    fn test_bad_store_path() {
        for bad in [None, Some(""), Some("/tmp/speedtest"), Some("ftp://host/x")] {
            let result = with_env([None, None, None, bad], Config::load_from_env);
            assert!(
                matches!(result, Err(ConfigError::StorePath(_))),
                "accepted {bad:?}"
            );
        }
    }
}
