//! Environment-driven configuration.
//!
//! The HTTP service loads a full [`Config`] once at startup (after `dotenvy` has merged any
//! `.env` file) and hands the relevant slices to the components that need them. The agent tool
//! server only talks to the vector index, so it loads the narrower [`SearchConfig`] and never
//! needs database or storage settings. Nothing reads the environment after that point.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Deployment environment, used to decide which settings are mandatory.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AppEnv {
    /// Local or test deployments.
    Development,
    /// Production deployments; secrets must be explicit.
    Production,
}

/// Runtime configuration shared by the HTTP service and the agent tool server.
#[derive(Clone, Debug)]
pub struct Config {
    /// Deployment environment.
    pub app_env: AppEnv,
    /// sqlx connection URL of the relational store.
    pub database_url: String,
    /// Base URL of the hybrid vector index.
    pub weaviate_url: String,
    /// Optional bearer key for the vector index (mandatory in production).
    pub weaviate_api_key: Option<String>,
    /// Storage root that relative upload paths are resolved against.
    pub resources_base_path: PathBuf,
    /// Storage root that relative artifact paths are resolved against.
    pub artifacts_base_path: PathBuf,
    /// Number of concurrent workers in the job pool.
    pub worker_count: usize,
    /// Capacity of the bounded job queue.
    pub job_queue_size: usize,
    /// How long a submission may wait for queue capacity before failing.
    pub job_submit_wait: Duration,
    /// Grace period granted to in-flight jobs when the pool shuts down.
    pub shutdown_grace: Duration,
    /// Executable invoked to extract and chunk a document.
    pub processor_command: String,
    /// Leading arguments passed to the processor before the source and artifact paths.
    pub processor_args: Vec<String>,
    /// Upper bound on a single processor run.
    pub processor_timeout: Duration,
    /// Number of objects written per index batch.
    pub index_batch_size: usize,
    /// Maximum number of hits requested per hybrid query.
    pub search_result_limit: usize,
    /// Autocut value forwarded to hybrid queries.
    pub search_autocut: u32,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
    /// Bind address of the agent tool SSE server.
    pub mcp_bind: SocketAddr,
}

const DEFAULT_WORKER_COUNT: usize = 3;
const DEFAULT_QUEUE_SIZE: usize = 100;
const DEFAULT_SUBMIT_WAIT_MS: u64 = 250;
const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 30;
const DEFAULT_PROCESSOR_TIMEOUT_SECS: u64 = 900;
pub(crate) const DEFAULT_INDEX_BATCH_SIZE: usize = 10;
const DEFAULT_SEARCH_LIMIT: usize = 20;
const DEFAULT_AUTOCUT: u32 = 2;
const DEFAULT_MCP_BIND: &str = "0.0.0.0:8081";

/// Settings for the agent tool server: vector index access and the SSE bind address.
#[derive(Clone, Debug)]
pub struct SearchConfig {
    /// Deployment environment.
    pub app_env: AppEnv,
    /// Base URL of the hybrid vector index.
    pub weaviate_url: String,
    /// Optional bearer key for the vector index (mandatory in production).
    pub weaviate_api_key: Option<String>,
    /// Maximum number of hits requested per hybrid query.
    pub search_result_limit: usize,
    /// Autocut value forwarded to hybrid queries.
    pub search_autocut: u32,
    /// Bind address of the agent tool SSE server.
    pub mcp_bind: SocketAddr,
}

impl SearchConfig {
    /// Merge `.env` into the process environment, then load the search settings from it.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let config = Self::from_lookup(|key| env::var(key).ok())?;
        tracing::debug!(
            app_env = ?config.app_env,
            weaviate_url = %config.weaviate_url,
            mcp_bind = %config.mcp_bind,
            "Loaded search configuration"
        );
        Ok(config)
    }

    /// Load search settings through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let app_env = load_app_env(&lookup)?;
        Ok(Self {
            app_env,
            weaviate_url: load_env(&lookup, "WEAVIATE_URL")?,
            weaviate_api_key: load_index_key(&lookup, app_env)?,
            search_result_limit: parse_or(&lookup, "SEARCH_RESULT_LIMIT", DEFAULT_SEARCH_LIMIT)?,
            search_autocut: parse_or(&lookup, "SEARCH_AUTOCUT", DEFAULT_AUTOCUT)?,
            mcp_bind: load_mcp_bind(&lookup)?,
        })
    }
}

impl Config {
    /// Merge `.env` into the process environment, then load configuration from it.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let config = Self::from_env()?;
        tracing::debug!(
            app_env = ?config.app_env,
            weaviate_url = %config.weaviate_url,
            resources = %config.resources_base_path.display(),
            workers = config.worker_count,
            queue = config.job_queue_size,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Load configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup, performing validation along the way.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let app_env = load_app_env(&lookup)?;
        let weaviate_api_key = load_index_key(&lookup, app_env)?;

        let resources_base_path = PathBuf::from(
            load_env_optional(&lookup, "RESOURCES_BASE_PATH").unwrap_or_else(|| "uploads".into()),
        );
        let artifacts_base_path = load_env_optional(&lookup, "ARTIFACTS_BASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| resources_base_path.clone());

        let worker_count = parse_or(&lookup, "WORKER_COUNT", DEFAULT_WORKER_COUNT)?;
        if worker_count == 0 {
            return Err(ConfigError::InvalidValue("WORKER_COUNT".into()));
        }
        let job_queue_size = parse_or(&lookup, "JOB_QUEUE_SIZE", DEFAULT_QUEUE_SIZE)?;
        if job_queue_size == 0 {
            return Err(ConfigError::InvalidValue("JOB_QUEUE_SIZE".into()));
        }
        let index_batch_size = parse_or(&lookup, "INDEX_BATCH_SIZE", DEFAULT_INDEX_BATCH_SIZE)?;
        if index_batch_size == 0 {
            return Err(ConfigError::InvalidValue("INDEX_BATCH_SIZE".into()));
        }

        let processor_args = load_env_optional(&lookup, "PROCESSOR_ARGS")
            .unwrap_or_else(|| "docling/document_process.py".into())
            .split_whitespace()
            .map(str::to_string)
            .collect();

        Ok(Self {
            app_env,
            database_url: load_env(&lookup, "DATABASE_URL")?,
            weaviate_url: load_env(&lookup, "WEAVIATE_URL")?,
            weaviate_api_key,
            resources_base_path,
            artifacts_base_path,
            worker_count,
            job_queue_size,
            job_submit_wait: Duration::from_millis(parse_or(
                &lookup,
                "JOB_SUBMIT_WAIT_MS",
                DEFAULT_SUBMIT_WAIT_MS,
            )?),
            shutdown_grace: Duration::from_secs(parse_or(
                &lookup,
                "SHUTDOWN_GRACE_SECS",
                DEFAULT_SHUTDOWN_GRACE_SECS,
            )?),
            processor_command: load_env_optional(&lookup, "PROCESSOR_COMMAND")
                .unwrap_or_else(|| "python3".into()),
            processor_args,
            processor_timeout: Duration::from_secs(parse_or(
                &lookup,
                "PROCESSOR_TIMEOUT_SECS",
                DEFAULT_PROCESSOR_TIMEOUT_SECS,
            )?),
            index_batch_size,
            search_result_limit: parse_or(&lookup, "SEARCH_RESULT_LIMIT", DEFAULT_SEARCH_LIMIT)?,
            search_autocut: parse_or(&lookup, "SEARCH_AUTOCUT", DEFAULT_AUTOCUT)?,
            server_port: load_env_optional(&lookup, "SERVER_PORT")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|_| ConfigError::InvalidValue("SERVER_PORT".into()))
                })
                .transpose()?,
            mcp_bind: load_mcp_bind(&lookup)?,
        })
    }
}

fn load_app_env<F>(lookup: &F) -> Result<AppEnv, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match load_env_optional(lookup, "APP_ENV").as_deref() {
        None | Some("development") | Some("dev") | Some("test") => Ok(AppEnv::Development),
        Some("production") | Some("prod") => Ok(AppEnv::Production),
        Some(_) => Err(ConfigError::InvalidValue("APP_ENV".into())),
    }
}

fn load_index_key<F>(lookup: &F, app_env: AppEnv) -> Result<Option<String>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let key = load_env_optional(lookup, "WEAVIATE_API_KEY");
    if app_env == AppEnv::Production && key.is_none() {
        return Err(ConfigError::MissingVariable(
            "WEAVIATE_API_KEY (required when APP_ENV=production)".into(),
        ));
    }
    Ok(key)
}

fn load_mcp_bind<F>(lookup: &F) -> Result<SocketAddr, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    load_env_optional(lookup, "MCP_BIND")
        .unwrap_or_else(|| DEFAULT_MCP_BIND.into())
        .parse()
        .map_err(|_| ConfigError::InvalidValue("MCP_BIND".into()))
}

fn load_env<F>(lookup: &F, key: &str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    load_env_optional(lookup, key).ok_or_else(|| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).filter(|value| !value.trim().is_empty())
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match load_env_optional(lookup, key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const REQUIRED: [(&str, &str); 2] = [
        ("DATABASE_URL", "sqlite::memory:"),
        ("WEAVIATE_URL", "http://127.0.0.1:8080"),
    ];

    #[test]
    fn defaults_apply_when_optional_values_missing() {
        let config = Config::from_lookup(lookup_from(&REQUIRED)).expect("config");
        assert_eq!(config.app_env, AppEnv::Development);
        assert_eq!(config.worker_count, 3);
        assert_eq!(config.job_queue_size, 100);
        assert_eq!(config.index_batch_size, 10);
        assert_eq!(config.search_result_limit, 20);
        assert_eq!(config.search_autocut, 2);
        assert_eq!(config.resources_base_path, PathBuf::from("uploads"));
        assert_eq!(config.artifacts_base_path, config.resources_base_path);
        assert_eq!(config.mcp_bind.port(), 8081);
        assert_eq!(config.processor_args, vec!["docling/document_process.py"]);
    }

    #[test]
    fn missing_database_url_is_reported() {
        let err = Config::from_lookup(lookup_from(&[("WEAVIATE_URL", "http://x")]))
            .expect_err("missing database url");
        assert!(matches!(err, ConfigError::MissingVariable(ref key) if key == "DATABASE_URL"));
    }

    #[test]
    fn production_requires_explicit_index_key() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("APP_ENV", "production"));
        let err = Config::from_lookup(lookup_from(&pairs)).expect_err("key required");
        assert!(matches!(err, ConfigError::MissingVariable(ref key) if key.starts_with("WEAVIATE_API_KEY")));

        pairs.push(("WEAVIATE_API_KEY", "secret"));
        let config = Config::from_lookup(lookup_from(&pairs)).expect("config");
        assert_eq!(config.weaviate_api_key.as_deref(), Some("secret"));
    }

    #[test]
    fn search_settings_load_without_database_url() {
        let config = SearchConfig::from_lookup(lookup_from(&[
            ("WEAVIATE_URL", "http://127.0.0.1:8080"),
            ("MCP_BIND", "127.0.0.1:9090"),
        ]))
        .expect("search config");
        assert_eq!(config.weaviate_url, "http://127.0.0.1:8080");
        assert_eq!(config.search_result_limit, 20);
        assert_eq!(config.search_autocut, 2);
        assert_eq!(config.mcp_bind.port(), 9090);

        let err = SearchConfig::from_lookup(lookup_from(&[
            ("WEAVIATE_URL", "http://127.0.0.1:8080"),
            ("APP_ENV", "production"),
        ]))
        .expect_err("key required");
        assert!(matches!(err, ConfigError::MissingVariable(ref key) if key.starts_with("WEAVIATE_API_KEY")));

        let err = SearchConfig::from_lookup(lookup_from(&[("DATABASE_URL", "sqlite::memory:")]))
            .expect_err("index url required");
        assert!(matches!(err, ConfigError::MissingVariable(ref key) if key == "WEAVIATE_URL"));
    }

    #[test]
    fn zero_workers_rejected() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("WORKER_COUNT", "0"));
        let err = Config::from_lookup(lookup_from(&pairs)).expect_err("zero workers");
        assert!(matches!(err, ConfigError::InvalidValue(ref key) if key == "WORKER_COUNT"));
    }

    #[test]
    fn unparsable_numbers_are_invalid() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("JOB_QUEUE_SIZE", "lots"));
        let err = Config::from_lookup(lookup_from(&pairs)).expect_err("bad queue size");
        assert!(matches!(err, ConfigError::InvalidValue(ref key) if key == "JOB_QUEUE_SIZE"));
    }
}
