//! Liveness and handshake commands.

use scaninout_proto::envelope::ids;
use scaninout_proto::{CommandError, Record, auth};

use super::required_str;
use crate::dispatch::dispatcher::HandlerContext;
use crate::dispatch::errors::HandlerError;

pub(crate) fn ping(
    _request: &Record,
    context: &mut HandlerContext<'_>,
) -> Result<Record, HandlerError> {
    context.acknowledge()
}

/// Succeeds only behind a valid handshake; clients use it to test their key.
pub(crate) fn authenticated_ping(
    _request: &Record,
    context: &mut HandlerContext<'_>,
) -> Result<Record, HandlerError> {
    context.acknowledge()
}

/// Issues a fresh nonce for this connection, replacing any earlier one.
pub(crate) fn generate_nonce(
    _request: &Record,
    context: &mut HandlerContext<'_>,
) -> Result<Record, HandlerError> {
    let nonce = context.session().arm();
    context.respond([("nonce_hex", hex::encode(nonce))])
}

pub(crate) fn preload_signature(
    request: &Record,
    context: &mut HandlerContext<'_>,
) -> Result<Record, HandlerError> {
    let text = required_str(request, "signature_hex")?;
    let signature = auth::decode_hex(text).map_err(|error| {
        CommandError::new(ids::VALIDATION_ERROR, format!("signature_hex: {error}"))
    })?;
    context.session().preload(signature)?;
    context.acknowledge()
}
