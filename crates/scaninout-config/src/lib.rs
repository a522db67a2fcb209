//! Layered configuration for the scan-in/scan-out daemon and client.
//!
//! [`Config`] merges built-in defaults, an optional configuration file,
//! `SCANINOUT_*` environment variables, and command-line flags, in that
//! order of increasing precedence.

mod defaults;
mod logging;
mod socket;
mod tags;

use std::fmt;
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_KDF_ITERATIONS, DEFAULT_KDF_SALT_HEX, DEFAULT_LOG_FILTER, DEFAULT_PASSPHRASE,
    DEFAULT_RESPONSE_TIMEOUT_SECS, DEFAULT_SCAN_EXPIRY_HOURS, DEFAULT_TAG_LENGTH,
    DEFAULT_TAG_PREFIX, DEFAULT_TCP_PORT, default_kdf_iterations, default_kdf_salt_hex,
    default_log_filter, default_log_filter_string, default_log_format, default_passphrase,
    default_response_timeout_secs, default_scan_expiry_hours, default_socket_endpoint,
    default_tag_length, default_tag_prefix,
};
pub use logging::LogFormat;
pub use socket::{SocketEndpoint, SocketParseError, SocketPreparationError};
pub use tags::TagFormat;

/// Flags understood by the configuration layer. Front ends that mix
/// configuration flags with their own arguments use this list to split them.
pub const CONFIG_CLI_FLAGS: &[&str] = &[
    "--config-path",
    "--daemon-socket",
    "--log-filter",
    "--log-format",
    "--passphrase",
    "--kdf-iterations",
    "--kdf-salt-hex",
    "--tag-length",
    "--tag-prefix",
    "--scan-expiry-hours",
    "--response-timeout-secs",
];

/// Settings shared by `scaninoutd` and `scaninout`.
#[derive(Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "SCANINOUT")]
pub struct Config {
    /// Endpoint the daemon listens on and clients connect to.
    #[serde(default = "default_socket_endpoint")]
    #[ortho_config(default = default_socket_endpoint())]
    pub daemon_socket: SocketEndpoint,
    /// `tracing` filter directive for the daemon.
    #[serde(default = "default_log_filter_string")]
    #[ortho_config(default = default_log_filter_string())]
    pub log_filter: String,
    #[serde(default = "default_log_format")]
    #[ortho_config(default = default_log_format())]
    pub log_format: LogFormat,
    /// Shared secret authorising privileged commands.
    #[serde(default = "default_passphrase")]
    #[ortho_config(default = default_passphrase())]
    pub passphrase: String,
    #[serde(default = "default_kdf_iterations")]
    #[ortho_config(default = default_kdf_iterations())]
    pub kdf_iterations: u32,
    #[serde(default = "default_kdf_salt_hex")]
    #[ortho_config(default = default_kdf_salt_hex())]
    pub kdf_salt_hex: String,
    #[serde(default = "default_tag_length")]
    #[ortho_config(default = default_tag_length())]
    pub tag_length: usize,
    #[serde(default = "default_tag_prefix")]
    #[ortho_config(default = default_tag_prefix())]
    pub tag_prefix: String,
    #[serde(default = "default_scan_expiry_hours")]
    #[ortho_config(default = default_scan_expiry_hours())]
    pub scan_expiry_hours: u32,
    /// Client response timeout in seconds; zero disables it.
    #[serde(default = "default_response_timeout_secs")]
    #[ortho_config(default = default_response_timeout_secs())]
    pub response_timeout_secs: u64,
}

impl fmt::Debug for Config {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Config")
            .field("daemon_socket", &self.daemon_socket)
            .field("log_filter", &self.log_filter)
            .field("log_format", &self.log_format)
            .field("passphrase", &"<redacted>")
            .field("kdf_iterations", &self.kdf_iterations)
            .field("kdf_salt_hex", &self.kdf_salt_hex)
            .field("tag_length", &self.tag_length)
            .field("tag_prefix", &self.tag_prefix)
            .field("scan_expiry_hours", &self.scan_expiry_hours)
            .field("response_timeout_secs", &self.response_timeout_secs)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            daemon_socket: default_socket_endpoint(),
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
            passphrase: default_passphrase(),
            kdf_iterations: default_kdf_iterations(),
            kdf_salt_hex: default_kdf_salt_hex(),
            tag_length: default_tag_length(),
            tag_prefix: default_tag_prefix(),
            scan_expiry_hours: default_scan_expiry_hours(),
            response_timeout_secs: default_response_timeout_secs(),
        }
    }
}

impl Config {
    #[must_use]
    pub const fn daemon_socket(&self) -> &SocketEndpoint {
        &self.daemon_socket
    }

    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    #[must_use]
    pub fn passphrase(&self) -> &str {
        &self.passphrase
    }

    #[must_use]
    pub const fn kdf_iterations(&self) -> u32 {
        self.kdf_iterations
    }

    #[must_use]
    pub fn kdf_salt_hex(&self) -> &str {
        &self.kdf_salt_hex
    }

    /// The tag predicate described by `tag_length` and `tag_prefix`.
    #[must_use]
    pub fn tag_format(&self) -> TagFormat {
        TagFormat::new(self.tag_length, self.tag_prefix.clone())
    }

    /// Age after which an open scan-in is discarded.
    #[must_use]
    pub fn scan_expiry(&self) -> Duration {
        Duration::from_secs(u64::from(self.scan_expiry_hours).saturating_mul(3600))
    }

    /// Client response timeout, or `None` when disabled.
    #[must_use]
    pub fn response_timeout(&self) -> Option<Duration> {
        (self.response_timeout_secs > 0).then(|| Duration::from_secs(self.response_timeout_secs))
    }
}
