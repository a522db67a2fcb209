//! Failures raised by command handlers.

use scaninout_proto::{CommandError, SchemaError};
use thiserror::Error;

use crate::store::StoreError;

/// Errors returned by a [`super::CommandHandler`].
///
/// Only [`HandlerError::Command`] reaches the client as written. Every other
/// variant is treated as an internal fault: it is logged and reported as
/// `critical-error`.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// A deliberate, client-visible failure.
    #[error(transparent)]
    Command(#[from] CommandError),
    /// The persistence collaborator failed.
    #[error("storage failure: {0}")]
    Store(#[from] StoreError),
    /// A record could not be built or encoded.
    #[error("record failure: {0}")]
    Schema(#[from] SchemaError),
    /// A shared record schema was not registered.
    #[error("record schema '{name}' is not registered")]
    UnknownSchema { name: String },
    /// A decoded request lacked a field its schema requires.
    #[error("request field '{field}' is missing")]
    MissingField { field: String },
}

impl HandlerError {
    pub(crate) fn missing_field(field: &str) -> Self {
        Self::MissingField {
            field: field.to_owned(),
        }
    }
}
