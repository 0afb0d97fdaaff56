use crate::eap_type::EapType;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The log level for the application, corresponding to syslog levels.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Emerg,
    Alert,
    Crit,
    Err,
    Warning,
    Notice,
    Info,
    Debug,
}

impl LogLevel {
    /// The `tracing` filter directive closest to this syslog level.
    pub fn as_directive(self) -> &'static str {
        match self {
            LogLevel::Emerg | LogLevel::Alert | LogLevel::Crit | LogLevel::Err => "error",
            LogLevel::Warning => "warn",
            LogLevel::Notice | LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }
}

/// Who is driving the port, which decides whether prompting is possible.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PortMode {
    /// Unattended; nobody can answer a prompt.
    #[default]
    System,
    User,
    LoginWindow,
}

impl PortMode {
    pub fn allows_user_input(self) -> bool {
        !matches!(self, PortMode::System)
    }
}

// Helper functions for default values
fn default_interface() -> String { "eth0".to_string() }
fn default_loglevel() -> LogLevel { LogLevel::Info }
fn default_cmdsocket() -> String { "/tmp/dot1x.sock".to_string() }
fn default_statedir() -> String { "/var/lib/dot1x".to_string() }
fn default_start_period_secs() -> u64 { 5 }
fn default_auth_period_secs() -> u64 { 5 }
fn default_held_period_secs() -> u64 { 60 }
fn default_max_start() -> u32 { 3 }
fn default_max_auth_attempts() -> u32 { 4 }
fn default_link_poll_interval_ms() -> u64 { 1000 }

/// The main configuration for the supplicant daemon.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Config {
    #[serde(default = "default_interface")]
    pub interface: String,
    #[serde(default)]
    pub mode: PortMode,
    #[serde(default = "default_loglevel")]
    pub loglevel: LogLevel,
    #[serde(default = "default_cmdsocket")]
    pub cmdsocket: String,
    #[serde(default = "default_statedir")]
    pub statedir: String,
    #[serde(default)]
    pub tunables: Tunables,
    #[serde(default)]
    pub profile: Profile,
}

/// Timer periods, retry ceilings and fault injection. Shared read-only by
/// every supplicant on the port.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Tunables {
    #[serde(default = "default_start_period_secs")]
    pub start_period_secs: u64,
    #[serde(default = "default_auth_period_secs")]
    pub auth_period_secs: u64,
    #[serde(default = "default_held_period_secs")]
    pub held_period_secs: u64,
    #[serde(default = "default_max_start")]
    pub max_start: u32,
    #[serde(default = "default_max_auth_attempts")]
    pub max_auth_attempts: u32,
    #[serde(default = "default_link_poll_interval_ms")]
    pub link_poll_interval_ms: u64,
    /// Percentage of outgoing frames silently dropped; 0 disables.
    #[serde(default)]
    pub transmit_loss_percent: u8,
    /// Percentage of incoming frames silently dropped; 0 disables.
    #[serde(default)]
    pub receive_loss_percent: u8,
}

impl Default for Tunables {
    fn default() -> Self {
        Tunables {
            start_period_secs: default_start_period_secs(),
            auth_period_secs: default_auth_period_secs(),
            held_period_secs: default_held_period_secs(),
            max_start: default_max_start(),
            max_auth_attempts: default_max_auth_attempts(),
            link_poll_interval_ms: default_link_poll_interval_ms(),
            transmit_loss_percent: 0,
            receive_loss_percent: 0,
        }
    }
}

impl Tunables {
    pub fn start_period(&self) -> Duration {
        Duration::from_secs(self.start_period_secs)
    }

    pub fn auth_period(&self) -> Duration {
        Duration::from_secs(self.auth_period_secs)
    }

    pub fn held_period(&self) -> Duration {
        Duration::from_secs(self.held_period_secs)
    }

    pub fn link_poll_interval(&self) -> Duration {
        Duration::from_millis(self.link_poll_interval_ms)
    }
}

/// Credentials and method policy for one network.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct Profile {
    pub user_name: Option<String>,
    pub password: Option<String>,
    /// Anonymous identity presented outside a TLS tunnel.
    pub outer_identity: Option<String>,
    /// Empty means every method the daemon can run.
    pub accept_eap_types: Vec<EapType>,
    /// Client certificate identity; implies EAP-TLS.
    pub tls_identity: Option<String>,
    pub require_privacy: bool,
    pub remember_credentials: bool,
    /// The password is good for one authentication only.
    pub one_time_password: bool,
}
