use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::clock::DEFAULT_TIMEZONE;
use crate::reminder::{
    DEFAULT_LOOKAHEAD_MINUTES, DEFAULT_REMINDER_OFFSETS, DEFAULT_TOLERANCE_MINUTES,
};

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const DEFAULT_MAX_TENANTS: usize = 1024;

/// Top-level config (slotwise.toml + SLOTWISE_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlotwiseConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub booking: BookingConfig,
    #[serde(default)]
    pub reminders: RemindersConfig,
    #[serde(default)]
    pub purge: PurgeConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Shared secret expected in `X-Cron-Token` on the operator trigger.
    /// When unset the trigger route rejects every call.
    pub cron_token: Option<String>,
    /// Bearer token that marks a request as coming from an operator.
    pub operator_token: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
            cron_token: None,
            operator_token: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Directory holding one SQLite file per tenant. `None` keeps every
    /// tenant in memory (tests, demos).
    #[serde(default = "default_data_dir")]
    pub data_dir: Option<String>,
    #[serde(default = "default_max_tenants")]
    pub max_tenants: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            max_tenants: DEFAULT_MAX_TENANTS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingConfig {
    /// Zone assumed for policies whose timezone is missing or unknown.
    #[serde(default = "default_timezone")]
    pub default_timezone: String,
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            default_timezone: default_timezone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemindersConfig {
    #[serde(default = "bool_true")]
    pub enabled: bool,
    /// Seconds between sweeps.
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
    #[serde(default = "default_tolerance")]
    pub tolerance_minutes: i64,
    #[serde(default = "default_offsets")]
    pub default_offsets: Vec<i64>,
    #[serde(default = "default_lookahead")]
    pub lookahead_minutes: i64,
    /// Appointments processed in parallel within one tenant sweep.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for RemindersConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tick_secs: default_tick_secs(),
            tolerance_minutes: DEFAULT_TOLERANCE_MINUTES,
            default_offsets: DEFAULT_REMINDER_OFFSETS.to_vec(),
            lookahead_minutes: DEFAULT_LOOKAHEAD_MINUTES,
            concurrency: default_concurrency(),
        }
    }
}

/// Periodic hard-delete of stale cancelled appointments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurgeConfig {
    #[serde(default = "bool_true")]
    pub enabled: bool,
    #[serde(default = "default_purge_interval")]
    pub interval_secs: u64,
    /// Cancelled appointments untouched for this long are deleted.
    #[serde(default = "default_purge_age")]
    pub cancelled_age_minutes: i64,
}

impl Default for PurgeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_purge_interval(),
            cancelled_age_minutes: default_purge_age(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationProvider {
    /// Log every notification and report it as delivered (dry run).
    #[default]
    Log,
    /// POST a JSON email payload to an HTTP relay (Resend-compatible API).
    Http,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    #[serde(default)]
    pub provider: NotificationProvider,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    pub api_key: Option<String>,
    #[serde(default = "default_from")]
    pub from: String,
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            provider: NotificationProvider::Log,
            endpoint: default_endpoint(),
            api_key: None,
            from: default_from(),
            timeout_secs: default_http_timeout(),
        }
    }
}

fn bool_true() -> bool {
    true
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_data_dir() -> Option<String> {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    Some(format!("{}/.slotwise/tenants", home))
}
fn default_max_tenants() -> usize {
    DEFAULT_MAX_TENANTS
}
fn default_timezone() -> String {
    DEFAULT_TIMEZONE.to_string()
}
fn default_tick_secs() -> u64 {
    60
}
fn default_tolerance() -> i64 {
    DEFAULT_TOLERANCE_MINUTES
}
fn default_offsets() -> Vec<i64> {
    DEFAULT_REMINDER_OFFSETS.to_vec()
}
fn default_lookahead() -> i64 {
    DEFAULT_LOOKAHEAD_MINUTES
}
fn default_concurrency() -> usize {
    8
}
fn default_purge_interval() -> u64 {
    300
}
fn default_purge_age() -> i64 {
    30
}
fn default_endpoint() -> String {
    "https://api.resend.com/emails".to_string()
}
fn default_from() -> String {
    "Slotwise <no-reply@slotwise.local>".to_string()
}
fn default_http_timeout() -> u64 {
    15
}

impl SlotwiseConfig {
    /// Load config from a TOML file with SLOTWISE_* env var overrides.
    ///
    /// Nested keys use a double underscore so field names keep theirs:
    /// `SLOTWISE_GATEWAY__CRON_TOKEN`, `SLOTWISE_REMINDERS__TICK_SECS`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        if std::path::Path::new(&path).exists() {
            info!(path = %path, "loading config file");
        } else {
            debug!(path = %path, "no config file; using defaults and SLOTWISE_* env");
        }

        Self::figment(&path)
            .extract()
            .map_err(|e| crate::error::SlotwiseError::Config(e.to_string()))
    }

    fn figment(path: &str) -> Figment {
        Figment::from(Serialized::defaults(SlotwiseConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("SLOTWISE_").split("__"))
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.slotwise/slotwise.toml", home)
}
