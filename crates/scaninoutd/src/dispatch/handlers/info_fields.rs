//! Definitions of the extra per-member information fields.

use scaninout_proto::catalog::records;
use scaninout_proto::envelope::ids;
use scaninout_proto::{CommandError, Record, Value};

use super::{required_int, required_record};
use crate::dispatch::dispatcher::HandlerContext;
use crate::dispatch::errors::HandlerError;
use crate::store::ID_FIELD;

fn info_field_not_found() -> CommandError {
    CommandError::new(ids::INFO_FIELD_NOT_FOUND, "Member info field not found.")
}

pub(crate) fn add(
    request: &Record,
    context: &mut HandlerContext<'_>,
) -> Result<Record, HandlerError> {
    let field = required_record(request, "field")?
        .clone()
        .without_field(ID_FIELD)?;
    let stored = context.transaction().insert(field)?;
    context.respond([("field", stored)])
}

pub(crate) fn edit(
    request: &Record,
    context: &mut HandlerContext<'_>,
) -> Result<Record, HandlerError> {
    let field = required_record(request, "field")?;
    let id = field
        .int(ID_FIELD)
        .ok_or_else(|| CommandError::new(ids::MISSING_ID, "Member info field id must be defined."))?;
    if context
        .transaction()
        .get(records::MEMBER_INFO_FIELD, id)?
        .is_none()
    {
        return Err(info_field_not_found().into());
    }
    let stored = context.transaction().update(field.clone())?;
    context.respond([("field", stored)])
}

pub(crate) fn delete(
    request: &Record,
    context: &mut HandlerContext<'_>,
) -> Result<Record, HandlerError> {
    let id = required_int(request, ID_FIELD)?;
    if !context
        .transaction()
        .delete(records::MEMBER_INFO_FIELD, id)?
    {
        return Err(info_field_not_found().into());
    }
    context.acknowledge()
}

pub(crate) fn get(
    request: &Record,
    context: &mut HandlerContext<'_>,
) -> Result<Record, HandlerError> {
    let id = required_int(request, ID_FIELD)?;
    let field = context
        .transaction()
        .get(records::MEMBER_INFO_FIELD, id)?
        .ok_or_else(info_field_not_found)?;
    context.respond([("field", field)])
}

pub(crate) fn get_all(
    _request: &Record,
    context: &mut HandlerContext<'_>,
) -> Result<Record, HandlerError> {
    let fields: Vec<Value> = context
        .transaction()
        .all(records::MEMBER_INFO_FIELD)?
        .into_iter()
        .map(Value::from)
        .collect();
    context.respond([("fields", fields)])
}
