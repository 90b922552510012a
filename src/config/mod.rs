//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    fmt,
    net::SocketAddr,
    num::{NonZeroU32, NonZeroU64},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

mod cli;

pub use cli::*;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "introspector";
const ENV_PREFIX: &str = "INTROSPECTOR";
const API_KEY_FALLBACK_VAR: &str = "OPENAI_API_KEY";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_DB_HTTP_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_DB_JOBS_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_JOB_SUMMARIZE_CONCURRENCY: u32 = 2;
const DEFAULT_JOB_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_JOB_RETENTION_HOURS: u64 = 24;
const DEFAULT_LLM_API_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";
const DEFAULT_LLM_TEMPERATURE: f32 = 0.3;
const DEFAULT_LLM_MAX_TOKENS: u32 = 2000;
const DEFAULT_LLM_TIMEOUT_SECS: u64 = 60;
const DEFAULT_LLM_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_LLM_RETRY_BACKOFF_MS: u64 = 500;
const DEFAULT_LLM_ENDPOINT_CONCURRENCY: u32 = 4;
const DEFAULT_STORAGE_DIR: &str = "job_data";
const DEFAULT_UPLOAD_REQUEST_LIMIT_BYTES: u64 = 10 * 1024 * 1024;
const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 60;
const DEFAULT_RATE_LIMIT_MAX_UPLOADS: u64 = 30;

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub jobs: JobsSettings,
    pub llm: LlmSettings,
    pub storage: StorageSettings,
    pub uploads: UploadSettings,
    pub rate_limit: RateLimitSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub http_max_connections: NonZeroU32,
    pub jobs_max_connections: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct JobsSettings {
    pub summarize_concurrency: NonZeroU32,
    /// Queue-level delivery attempts for a summarize job.
    pub max_attempts: NonZeroU32,
    pub retention: Duration,
}

#[derive(Clone)]
pub struct LlmSettings {
    pub api_base: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: NonZeroU32,
    pub timeout: Duration,
    /// Attempts per completion request, including the first.
    pub max_attempts: NonZeroU32,
    pub retry_backoff: Duration,
    pub endpoint_concurrency: NonZeroU32,
}

impl fmt::Debug for LlmSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmSettings")
            .field("api_base", &self.api_base)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout", &self.timeout)
            .field("max_attempts", &self.max_attempts)
            .field("retry_backoff", &self.retry_backoff)
            .field("endpoint_concurrency", &self.endpoint_concurrency)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct StorageSettings {
    pub directory: PathBuf,
}

#[derive(Debug, Clone)]
pub struct UploadSettings {
    pub max_request_bytes: NonZeroU64,
}

#[derive(Debug, Clone)]
pub struct RateLimitSettings {
    pub window_seconds: NonZeroU32,
    pub max_uploads: NonZeroU32,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_api_key_fallback(|name| std::env::var(name).ok());

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Worker(args)) => raw.apply_worker_overrides(&args.overrides),
        Some(Command::Migrate(args)) => raw.apply_database_override(&args.database),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    jobs: RawJobsSettings,
    llm: RawLlmSettings,
    storage: RawStorageSettings,
    uploads: RawUploadSettings,
    rate_limit: RawRateLimitSettings,
}

impl RawSettings {
    /// Use the conventional OpenAI variable when no key was configured explicitly.
    fn apply_api_key_fallback(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let configured = self
            .llm
            .api_key
            .as_deref()
            .is_some_and(|key| !key.trim().is_empty());
        if !configured {
            self.llm.api_key = lookup(API_KEY_FALLBACK_VAR);
        }
    }

    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(limit) = overrides.uploads_max_request_bytes {
            self.uploads.max_request_bytes = Some(limit);
        }
        if let Some(window) = overrides.rate_limit_window_seconds {
            self.rate_limit.window_seconds = Some(window);
        }
        if let Some(max) = overrides.rate_limit_max_uploads {
            self.rate_limit.max_uploads = Some(max);
        }

        self.apply_worker_overrides(&overrides.worker);
    }

    fn apply_worker_overrides(&mut self, overrides: &WorkerOverrides) {
        self.apply_database_override(&overrides.database);

        if let Some(level) = overrides.logging.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.logging.log_json {
            self.logging.json = Some(json);
        }
        if let Some(value) = overrides.jobs_summarize_concurrency {
            self.jobs.summarize_concurrency = Some(value);
        }
        if let Some(model) = overrides.llm_model.as_ref() {
            self.llm.model = Some(model.clone());
        }
        if let Some(base) = overrides.llm_api_base.as_ref() {
            self.llm.api_base = Some(base.clone());
        }
        if let Some(value) = overrides.llm_endpoint_concurrency {
            self.llm.endpoint_concurrency = Some(value);
        }
        if let Some(directory) = overrides.storage_directory.as_ref() {
            self.storage.directory = Some(directory.clone());
        }
    }

    fn apply_database_override(&mut self, overrides: &DatabaseOverride) {
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            database,
            jobs,
            llm,
            storage,
            uploads,
            rate_limit,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            jobs: build_jobs_settings(jobs)?,
            llm: build_llm_settings(llm)?,
            storage: build_storage_settings(storage)?,
            uploads: build_upload_settings(uploads)?,
            rate_limit: build_rate_limit_settings(rate_limit)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = non_blank(database.url);

    let http_value = database
        .http_max_connections
        .unwrap_or(DEFAULT_DB_HTTP_MAX_CONNECTIONS);
    let jobs_value = database
        .jobs_max_connections
        .unwrap_or(DEFAULT_DB_JOBS_MAX_CONNECTIONS);

    Ok(DatabaseSettings {
        url,
        http_max_connections: non_zero_u32(http_value.into(), "database.http_max_connections")?,
        jobs_max_connections: non_zero_u32(jobs_value.into(), "database.jobs_max_connections")?,
    })
}

fn build_jobs_settings(jobs: RawJobsSettings) -> Result<JobsSettings, LoadError> {
    let summarize = jobs
        .summarize_concurrency
        .unwrap_or(DEFAULT_JOB_SUMMARIZE_CONCURRENCY);
    let max_attempts = jobs.max_attempts.unwrap_or(DEFAULT_JOB_MAX_ATTEMPTS);
    let max_attempts = non_zero_u32(max_attempts.into(), "jobs.max_attempts")?;
    i32::try_from(max_attempts.get())
        .map_err(|_| LoadError::invalid("jobs.max_attempts", "value exceeds i32 range"))?;

    let retention_hours = jobs.retention_hours.unwrap_or(DEFAULT_JOB_RETENTION_HOURS);
    if retention_hours == 0 {
        return Err(LoadError::invalid(
            "jobs.retention_hours",
            "must be greater than zero",
        ));
    }
    let retention_secs = retention_hours
        .checked_mul(3600)
        .ok_or_else(|| LoadError::invalid("jobs.retention_hours", "value is too large"))?;

    Ok(JobsSettings {
        summarize_concurrency: non_zero_u32(summarize.into(), "jobs.summarize_concurrency")?,
        max_attempts,
        retention: Duration::from_secs(retention_secs),
    })
}

fn build_llm_settings(llm: RawLlmSettings) -> Result<LlmSettings, LoadError> {
    let api_base = non_blank(llm.api_base)
        .unwrap_or_else(|| DEFAULT_LLM_API_BASE.to_string())
        .trim_end_matches('/')
        .to_string();
    if !(api_base.starts_with("http://") || api_base.starts_with("https://")) {
        return Err(LoadError::invalid(
            "llm.api_base",
            "must be an http or https URL",
        ));
    }

    let model = non_blank(llm.model).unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string());

    let temperature = llm.temperature.unwrap_or(DEFAULT_LLM_TEMPERATURE);
    if !(0.0..=2.0).contains(&temperature) {
        return Err(LoadError::invalid(
            "llm.temperature",
            "must be between 0.0 and 2.0",
        ));
    }

    let timeout_secs = llm.timeout_seconds.unwrap_or(DEFAULT_LLM_TIMEOUT_SECS);
    if timeout_secs == 0 {
        return Err(LoadError::invalid(
            "llm.timeout_seconds",
            "must be greater than zero",
        ));
    }

    let max_tokens = llm.max_tokens.unwrap_or(DEFAULT_LLM_MAX_TOKENS);
    let max_attempts = llm.max_attempts.unwrap_or(DEFAULT_LLM_MAX_ATTEMPTS);
    let endpoint_concurrency = llm
        .endpoint_concurrency
        .unwrap_or(DEFAULT_LLM_ENDPOINT_CONCURRENCY);

    Ok(LlmSettings {
        api_base,
        api_key: non_blank(llm.api_key),
        model,
        temperature,
        max_tokens: non_zero_u32(max_tokens.into(), "llm.max_tokens")?,
        timeout: Duration::from_secs(timeout_secs),
        max_attempts: non_zero_u32(max_attempts.into(), "llm.max_attempts")?,
        retry_backoff: Duration::from_millis(
            llm.retry_backoff_ms.unwrap_or(DEFAULT_LLM_RETRY_BACKOFF_MS),
        ),
        endpoint_concurrency: non_zero_u32(
            endpoint_concurrency.into(),
            "llm.endpoint_concurrency",
        )?,
    })
}

fn build_storage_settings(storage: RawStorageSettings) -> Result<StorageSettings, LoadError> {
    let directory = storage
        .directory
        .unwrap_or_else(|| PathBuf::from(DEFAULT_STORAGE_DIR));
    if directory.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "storage.directory",
            "path must not be empty",
        ));
    }

    Ok(StorageSettings { directory })
}

fn build_upload_settings(uploads: RawUploadSettings) -> Result<UploadSettings, LoadError> {
    let max_request_bytes_value = uploads
        .max_request_bytes
        .unwrap_or(DEFAULT_UPLOAD_REQUEST_LIMIT_BYTES);
    let max_request_bytes = NonZeroU64::new(max_request_bytes_value).ok_or_else(|| {
        LoadError::invalid("uploads.max_request_bytes", "must be greater than zero")
    })?;
    usize::try_from(max_request_bytes_value).map_err(|_| {
        LoadError::invalid(
            "uploads.max_request_bytes",
            "value exceeds supported range for usize",
        )
    })?;

    Ok(UploadSettings { max_request_bytes })
}

fn build_rate_limit_settings(
    rate_limit: RawRateLimitSettings,
) -> Result<RateLimitSettings, LoadError> {
    let window_seconds_val = rate_limit
        .window_seconds
        .unwrap_or(DEFAULT_RATE_LIMIT_WINDOW_SECS);
    let max_uploads_val = rate_limit
        .max_uploads
        .unwrap_or(DEFAULT_RATE_LIMIT_MAX_UPLOADS);

    Ok(RateLimitSettings {
        window_seconds: non_zero_u32(window_seconds_val, "rate_limit.window_seconds")?,
        max_uploads: non_zero_u32(max_uploads_val, "rate_limit.max_uploads")?,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    http_max_connections: Option<u32>,
    jobs_max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawJobsSettings {
    summarize_concurrency: Option<u32>,
    max_attempts: Option<u32>,
    retention_hours: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLlmSettings {
    api_base: Option<String>,
    api_key: Option<String>,
    model: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    timeout_seconds: Option<u64>,
    max_attempts: Option<u32>,
    retry_backoff_ms: Option<u64>,
    endpoint_concurrency: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawStorageSettings {
    directory: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawUploadSettings {
    max_request_bytes: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRateLimitSettings {
    window_seconds: Option<u64>,
    max_uploads: Option<u64>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[cfg(test)]
mod tests;
