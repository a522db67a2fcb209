//! Handlers for the command catalog.
//!
//! Every handler receives a request record that already satisfies its
//! command's request schema, so the `required*` helpers fail only when a
//! handler is bound to the wrong command.

pub(crate) mod info_fields;
pub(crate) mod members;
pub(crate) mod scans;
pub(crate) mod system;

use scaninout_proto::{Record, Value};

use super::errors::HandlerError;

fn required<'r>(request: &'r Record, field: &str) -> Result<&'r Value, HandlerError> {
    request
        .get(field)
        .ok_or_else(|| HandlerError::missing_field(field))
}

fn required_int(request: &Record, field: &str) -> Result<i64, HandlerError> {
    request
        .int(field)
        .ok_or_else(|| HandlerError::missing_field(field))
}

fn required_str<'r>(request: &'r Record, field: &str) -> Result<&'r str, HandlerError> {
    request
        .str(field)
        .ok_or_else(|| HandlerError::missing_field(field))
}

fn required_record<'r>(request: &'r Record, field: &str) -> Result<&'r Record, HandlerError> {
    request
        .record(field)
        .ok_or_else(|| HandlerError::missing_field(field))
}
