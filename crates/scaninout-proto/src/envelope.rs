//! RPC envelopes and the typed command error carried on failure.

use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as Json};
use thiserror::Error;

use crate::schema::SchemaError;

/// Well-known error identifiers carried in failure envelopes.
pub mod ids {
    /// The line is not a JSON document.
    pub const JSON_ERROR: &str = "json-error";
    /// The line or its envelope is malformed.
    pub const FORMAT_ERROR: &str = "format-error";
    /// No command is registered under the requested name.
    pub const UNKNOWN_COMMAND: &str = "unknown-command";
    /// The command is registered but nothing serves it.
    pub const NO_HANDLER: &str = "no-handler";
    /// A privileged command arrived without an armed handshake.
    pub const FORBIDDEN: &str = "forbidden";
    /// The preloaded signature does not match the request.
    pub const INVALID_SIGNATURE: &str = "invalid-signature";
    /// A request field failed validation.
    pub const VALIDATION_ERROR: &str = "validation-error";
    /// A handler returned something other than its response record.
    pub const NO_RESPONSE: &str = "no-response";
    /// An internal fault; details stay in the daemon log.
    pub const CRITICAL_ERROR: &str = "critical-error";
    /// A signature was preloaded before any nonce was issued.
    pub const NO_NONCE: &str = "no-nonce";
    /// No member has the given id or tag.
    pub const MEMBER_NOT_FOUND: &str = "member-not-found";
    /// No member information field has the given id.
    pub const INFO_FIELD_NOT_FOUND: &str = "info-field-not-found";
    /// An edit named no record id.
    pub const MISSING_ID: &str = "missing-id";
    /// Another member already holds the tag.
    pub const DUPLICATE_TAG: &str = "duplicate-tag";
}

/// A machine-distinguishable command failure.
///
/// Handlers raise these deliberately; the dispatcher forwards them verbatim so
/// clients can branch on [`CommandError::id`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{message} [{id}]")]
pub struct CommandError {
    id: String,
    message: String,
}

impl CommandError {
    #[must_use]
    pub fn new(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn json_error(detail: impl std::fmt::Display) -> Self {
        Self::new(ids::JSON_ERROR, format!("JSON error: {detail}"))
    }

    #[must_use]
    pub fn format_error(detail: impl std::fmt::Display) -> Self {
        Self::new(ids::FORMAT_ERROR, format!("Format error: {detail}"))
    }

    #[must_use]
    pub fn unknown_command() -> Self {
        Self::new(ids::UNKNOWN_COMMAND, "Unknown command.")
    }

    #[must_use]
    pub fn no_handler() -> Self {
        Self::new(ids::NO_HANDLER, "No handler found for command.")
    }

    #[must_use]
    pub fn forbidden() -> Self {
        Self::new(ids::FORBIDDEN, "Command forbidden.")
    }

    #[must_use]
    pub fn invalid_signature() -> Self {
        Self::new(ids::INVALID_SIGNATURE, "Invalid signature.")
    }

    /// Wraps a schema failure; the message names the failing field path.
    #[must_use]
    pub fn validation(error: &SchemaError) -> Self {
        Self::new(ids::VALIDATION_ERROR, error.to_string())
    }

    #[must_use]
    pub fn no_response() -> Self {
        Self::new(ids::NO_RESPONSE, "Invalid response from handler.")
    }

    /// The opaque failure reported for unexpected faults.
    #[must_use]
    pub fn critical() -> Self {
        Self::new(ids::CRITICAL_ERROR, "Critical error. See log for details.")
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns true when this error carries `id`.
    #[must_use]
    pub fn is(&self, id: &str) -> bool {
        self.id == id
    }
}

/// `{"command": "<Name>", "fields": {...}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub command: String,
    pub fields: JsonMap<String, Json>,
}

impl RpcRequest {
    #[must_use]
    pub fn new(command: impl Into<String>, fields: JsonMap<String, Json>) -> Self {
        Self {
            command: command.into(),
            fields,
        }
    }
}

/// `{"success": true, "fields": {...}}` or
/// `{"success": false, "error": {"id": ..., "message": ...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<JsonMap<String, Json>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<CommandError>,
}

impl RpcResponse {
    #[must_use]
    pub fn success(fields: JsonMap<String, Json>) -> Self {
        Self {
            success: true,
            fields: Some(fields),
            error: None,
        }
    }

    #[must_use]
    pub fn failure(error: CommandError) -> Self {
        Self {
            success: false,
            fields: None,
            error: Some(error),
        }
    }

    /// Splits the envelope into its payload or its carried error.
    ///
    /// # Errors
    ///
    /// Returns the carried [`CommandError`] for failures, or a `format-error`
    /// when the discriminator disagrees with the keys present.
    pub fn into_result(self) -> Result<JsonMap<String, Json>, CommandError> {
        match (self.success, self.fields, self.error) {
            (true, Some(fields), None) => Ok(fields),
            (false, None, Some(error)) => Err(error),
            (true, ..) => Err(CommandError::format_error(
                "success envelope must carry fields and no error",
            )),
            (false, ..) => Err(CommandError::format_error(
                "failure envelope must carry an error and no fields",
            )),
        }
    }
}

impl From<CommandError> for RpcResponse {
    fn from(error: CommandError) -> Self {
        Self::failure(error)
    }
}
