use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_MODEL_ID: &str = "claude-sonnet-4-6";
pub const DEFAULT_MODEL_TEMPERATURE: f32 = 0.1;
pub const DEFAULT_HISTORY_LENGTH: usize = 25;
pub const DEFAULT_SYNC_INTERVAL_MINUTES: u64 = 1;
pub const DEFAULT_SYNC_INITIAL_DELAY_SECONDS: u64 = 30;
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;
pub const MODEL_REQUEST_TIMEOUT_SECS: u64 = 120;
pub const DISCONNECT_TIMEOUT_SECS: u64 = 5;

/// Top-level config (chronicle.toml + CHRONICLE_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub agent: AgentConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub channels: ChannelsConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub debug: DebugConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub messengers: MessengersConfig,
    #[serde(default)]
    pub calendar: CalendarConfig,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub api_key: String,
    #[serde(default = "default_model_id")]
    pub model_id: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
    #[serde(default = "default_anthropic_base_url")]
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_history_length")]
    pub length: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            length: DEFAULT_HISTORY_LENGTH,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelsConfig {
    #[serde(default = "default_channel_capacity")]
    pub capacity: usize,
    #[serde(default = "bool_true")]
    pub drop_on_full: bool,
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CHANNEL_CAPACITY,
            drop_on_full: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_sync_interval")]
    pub poll_interval_minutes: u64,
    #[serde(default = "default_sync_initial_delay")]
    pub initial_delay_seconds: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval_minutes: DEFAULT_SYNC_INTERVAL_MINUTES,
            initial_delay_seconds: DEFAULT_SYNC_INITIAL_DELAY_SECONDS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DebugConfig {
    /// Bypass the tracked-channel filter; process every inbound message.
    #[serde(default)]
    pub all_messages: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MessengersConfig {
    pub messenger_a: Option<MessengerAConfig>,
    pub messenger_b: Option<MessengerBConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessengerAConfig {
    pub bot_token: String,
    /// Base path for session files; per-user suffix is appended (`"{base}.user_{id}"`).
    #[serde(default = "default_session_base_a")]
    pub session_base_path: String,
    #[serde(default)]
    pub allow_users: Vec<String>,
    #[serde(default = "bool_true")]
    pub dm_allowed: bool,
    #[serde(default)]
    pub require_mention: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessengerBConfig {
    pub bot_token: String,
    #[serde(default = "default_session_base_b")]
    pub session_base_path: String,
    #[serde(default)]
    pub require_mention: bool,
    #[serde(default = "bool_true")]
    pub dm_allowed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EmailConfig {
    pub imap: Option<ImapConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImapConfig {
    pub host: String,
    #[serde(default = "default_imap_port")]
    pub port: u16,
    pub username: String,
    pub password: String,
    #[serde(default = "default_mailbox")]
    pub mailbox: String,
    #[serde(default = "default_imap_poll_secs")]
    pub poll_interval_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarConfig {
    pub api_key: String,
    #[serde(default = "default_calendar_base_url")]
    pub base_url: String,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_calendar_base_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NotifyConfig {
    pub email_transport: Option<EmailTransportConfig>,
    pub push_transport: Option<PushTransportConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailTransportConfig {
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: String,
    pub from_address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushTransportConfig {
    pub webhook_url: String,
}

fn bool_true() -> bool {
    true
}
fn default_model_id() -> String {
    DEFAULT_MODEL_ID.to_string()
}
fn default_temperature() -> f32 {
    DEFAULT_MODEL_TEMPERATURE
}
fn default_max_turns() -> usize {
    6
}
fn default_anthropic_base_url() -> String {
    "https://api.anthropic.com".to_string()
}
fn default_history_length() -> usize {
    DEFAULT_HISTORY_LENGTH
}
fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}
fn default_sync_interval() -> u64 {
    DEFAULT_SYNC_INTERVAL_MINUTES
}
fn default_sync_initial_delay() -> u64 {
    DEFAULT_SYNC_INITIAL_DELAY_SECONDS
}
fn default_session_base_a() -> String {
    format!("{}/.chronicle/session_a", home_dir())
}
fn default_session_base_b() -> String {
    format!("{}/.chronicle/session_b", home_dir())
}
fn default_imap_port() -> u16 {
    993
}
fn default_mailbox() -> String {
    "INBOX".to_string()
}
fn default_imap_poll_secs() -> u64 {
    60
}
fn default_calendar_base_url() -> String {
    "https://calendar.example.com/api/v1".to_string()
}
fn default_smtp_port() -> u16 {
    587
}
fn default_db_path() -> String {
    format!("{}/.chronicle/chronicle.db", home_dir())
}
fn home_dir() -> String {
    std::env::var("HOME").unwrap_or_else(|_| ".".to_string())
}

impl AppConfig {
    /// Load config from a TOML file with `CHRONICLE_*` env var overrides.
    ///
    /// A missing or malformed required key (API key, model id) is a fatal
    /// `Configuration` error, surfaced before any task is spawned.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: AppConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("CHRONICLE_").split("_"))
            .extract()
            .map_err(|e| crate::error::ChronicleError::Config(e.to_string()))?;

        if config.agent.api_key.trim().is_empty() {
            return Err(crate::error::ChronicleError::Config(
                "agent.api_key is required".to_string(),
            ));
        }

        Ok(config)
    }
}

fn default_config_path() -> String {
    format!("{}/.chronicle/chronicle.toml", home_dir())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_config_default_matches_spec() {
        assert_eq!(HistoryConfig::default().length, 25);
    }

    #[test]
    fn channels_config_defaults_to_drop_on_full() {
        let cfg = ChannelsConfig::default();
        assert!(cfg.drop_on_full);
        assert!(cfg.capacity >= 1000);
    }

    #[test]
    fn sync_config_defaults_match_spec() {
        let cfg = SyncConfig::default();
        assert_eq!(cfg.poll_interval_minutes, 1);
        assert_eq!(cfg.initial_delay_seconds, 30);
    }
}
