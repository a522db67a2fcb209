//! Error types for the client library and the CLI runtime.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use scaninout_proto::{AuthError, CommandError, RegistryError, SchemaError, WireError};
use thiserror::Error;

/// Failures of a single client call.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The daemon answered with a command error.
    #[error(transparent)]
    Command(#[from] CommandError),
    /// The endpoint host could not be resolved.
    #[error("failed to resolve daemon address {endpoint}: {source}")]
    Resolve {
        endpoint: String,
        #[source]
        source: io::Error,
    },
    /// Nothing accepted the connection.
    #[error("failed to connect to daemon at {endpoint}: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: io::Error,
    },
    #[cfg(not(unix))]
    #[error("platform does not support Unix sockets: {0}")]
    UnsupportedUnixTransport(String),
    /// Reading or writing the established connection failed.
    #[error("daemon connection failed: {source}")]
    Transport {
        #[source]
        source: io::Error,
    },
    /// The daemon closed the connection before answering.
    #[error("daemon closed the connection without a response")]
    Closed,
    /// No response arrived in time. The request may still have been applied.
    #[error("daemon did not respond within {}s", .timeout.as_secs_f64())]
    Timeout { timeout: Duration },
    /// The response line could not be framed or parsed.
    #[error("malformed daemon response: {source}")]
    Protocol {
        #[source]
        source: WireError,
    },
    /// The nonce reply carried no nonce.
    #[error("daemon issued no nonce")]
    MissingNonce,
    /// The request did not satisfy the command's request schema.
    #[error("invalid request: {source}")]
    Request {
        #[source]
        source: SchemaError,
    },
    /// The daemon's fields did not satisfy the command's response schema.
    #[error("invalid response: {source}")]
    Response {
        #[source]
        source: SchemaError,
    },
    /// The signing key could not be derived or used.
    #[error("failed to sign request: {source}")]
    Auth {
        #[source]
        source: AuthError,
    },
    /// The command catalog could not be built.
    #[error("failed to install command catalog: {source}")]
    Catalog {
        #[source]
        source: RegistryError,
    },
}

impl ClientError {
    /// Whether the failure means the connection is unusable and a fresh one
    /// may succeed.
    #[must_use]
    pub const fn is_connection_failure(&self) -> bool {
        matches!(
            self,
            Self::Connect { .. } | Self::Transport { .. } | Self::Closed
        )
    }

    /// The daemon's error, when the failure is one.
    #[must_use]
    pub const fn command_error(&self) -> Option<&CommandError> {
        match self {
            Self::Command(error) => Some(error),
            _ => None,
        }
    }
}

/// Failures of the `scaninout` binary.
#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error("failed to load configuration: {0}")]
    LoadConfiguration(Arc<ortho_config::OrthoError>),
    #[error("{0}")]
    CliUsage(clap::Error),
    #[error("FIELDS_JSON must be a JSON object: {0}")]
    ParseFields(serde_json::Error),
    #[error("failed to write output: {0}")]
    WriteOutput(io::Error),
    #[error("failed to encode response: {0}")]
    EncodeResponse(SchemaError),
    #[error(transparent)]
    Client(#[from] ClientError),
}
