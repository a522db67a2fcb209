//! Built-in configuration defaults shared by the daemon and the client.

use camino::Utf8PathBuf;
use std::env;

#[cfg(unix)]
use dirs::runtime_dir;
#[cfg(unix)]
use libc::geteuid;

use crate::LogFormat;
use crate::socket::SocketEndpoint;

/// TCP port used when Unix domain sockets are not available.
pub const DEFAULT_TCP_PORT: u16 = 9780;

pub const DEFAULT_LOG_FILTER: &str = "info";

/// Shared secret used when none is configured.
pub const DEFAULT_PASSPHRASE: &str = "password";

pub const DEFAULT_KDF_ITERATIONS: u32 = 1000;

/// Deployment salt for the key derivation, hex encoded.
pub const DEFAULT_KDF_SALT_HEX: &str =
    "c9b504e78b4570033650137e56daab104a8b84c445d4c0cb7bfbb1aa10c25d72";

pub const DEFAULT_TAG_LENGTH: usize = 10;
pub const DEFAULT_TAG_PREFIX: &str = "H0";

/// A scan-in older than this is discarded rather than closed into a shift.
pub const DEFAULT_SCAN_EXPIRY_HOURS: u32 = 4;

/// Seconds a client waits for a response line. Zero waits forever.
pub const DEFAULT_RESPONSE_TIMEOUT_SECS: u64 = 30;

#[must_use]
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

#[must_use]
pub const fn default_log_format() -> LogFormat {
    LogFormat::Json
}

#[must_use]
pub fn default_passphrase() -> String {
    DEFAULT_PASSPHRASE.to_owned()
}

#[must_use]
pub const fn default_kdf_iterations() -> u32 {
    DEFAULT_KDF_ITERATIONS
}

#[must_use]
pub fn default_kdf_salt_hex() -> String {
    DEFAULT_KDF_SALT_HEX.to_owned()
}

#[must_use]
pub const fn default_tag_length() -> usize {
    DEFAULT_TAG_LENGTH
}

#[must_use]
pub fn default_tag_prefix() -> String {
    DEFAULT_TAG_PREFIX.to_owned()
}

#[must_use]
pub const fn default_scan_expiry_hours() -> u32 {
    DEFAULT_SCAN_EXPIRY_HOURS
}

#[must_use]
pub const fn default_response_timeout_secs() -> u64 {
    DEFAULT_RESPONSE_TIMEOUT_SECS
}

/// Computes the default socket endpoint for the daemon.
///
/// Unix hosts use `$XDG_RUNTIME_DIR/scaninout/scaninoutd.sock`, falling back
/// to a per-user directory under the system temporary directory.
#[must_use]
pub fn default_socket_endpoint() -> SocketEndpoint {
    default_socket_endpoint_inner()
}

#[cfg(unix)]
fn default_socket_endpoint_inner() -> SocketEndpoint {
    let (mut base, per_user) = match runtime_base_directory() {
        Some(dir) => (dir, false),
        None => (fallback_base_directory(), true),
    };

    base.push("scaninout");
    if per_user {
        base.push(user_namespace());
    }

    SocketEndpoint::unix(base.join("scaninoutd.sock"))
}

#[cfg(unix)]
fn runtime_base_directory() -> Option<Utf8PathBuf> {
    runtime_dir().and_then(|path| Utf8PathBuf::from_path_buf(path).ok())
}

#[cfg(unix)]
fn fallback_base_directory() -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(env::temp_dir()).unwrap_or_else(|_| Utf8PathBuf::from("/tmp"))
}

#[cfg(unix)]
fn user_namespace() -> String {
    // SAFETY: geteuid has no preconditions and cannot fail.
    let uid = unsafe { geteuid() };
    format!("uid-{uid}")
}

#[cfg(not(unix))]
fn default_socket_endpoint_inner() -> SocketEndpoint {
    SocketEndpoint::tcp("127.0.0.1", DEFAULT_TCP_PORT)
}
