use clap::{Args, Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// Base URL of the LendHub API
    #[arg(long, env = "LENDHUB_API_URL")]
    pub api_url: String,

    #[command(flatten)]
    pub http: HttpConfig,

    #[command(flatten)]
    pub session: SessionConfig,

    #[command(flatten)]
    pub cache: CacheConfig,

    #[command(flatten)]
    pub telemetry: TelemetryConfig,
}

#[derive(Clone, Debug, Args)]
pub struct HttpConfig {
    /// Overall timeout for a single API request in seconds
    #[arg(long, env = "LENDHUB_REQUEST_TIMEOUT_SECS", default_value_t = 120)]
    pub request_timeout_secs: u64,

    /// Persist and send cookies issued by the API
    #[arg(
        long,
        env = "LENDHUB_COOKIE_STORE",
        action = clap::ArgAction::Set,
        default_value_t = true
    )]
    pub cookie_store: bool,
}

#[derive(Clone, Debug, Args)]
pub struct SessionConfig {
    /// Path of the persisted session file
    #[arg(long, env = "LENDHUB_SESSION_FILE", default_value = ".lendhub/session.json")]
    pub session_file: PathBuf,

    /// How many seconds before access-token expiry the proactive refresh fires
    #[arg(long, env = "LENDHUB_REFRESH_LEAD_SECS", default_value_t = 60)]
    pub refresh_lead_secs: u64,
}

#[derive(Clone, Debug, Args)]
pub struct CacheConfig {
    /// How long a cached query result stays fresh in seconds
    #[arg(long, env = "LENDHUB_CACHE_TTL_SECS", default_value_t = 300)]
    pub ttl_secs: u64,

    /// Maximum attempts for a failed read query, first try included
    #[arg(long, env = "LENDHUB_QUERY_MAX_ATTEMPTS", default_value_t = 3)]
    pub max_attempts: usize,
}

#[derive(Clone, Debug, Args)]
pub struct TelemetryConfig {
    /// Log output format
    #[arg(long, env = "LENDHUB_LOG_FORMAT", value_enum, default_value = "text")]
    pub log_format: LogFormat,

    /// OTLP endpoint for traces and metrics
    #[arg(long, env = "LENDHUB_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

impl Config {
    #[must_use]
    pub fn load() -> Self {
        Self::parse()
    }
}
