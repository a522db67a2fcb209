//! Member records.

use scaninout_proto::catalog::records;
use scaninout_proto::envelope::ids;
use scaninout_proto::{CommandError, Record, Value};

use super::{required, required_int, required_record};
use crate::dispatch::dispatcher::HandlerContext;
use crate::dispatch::errors::HandlerError;
use crate::store::{ID_FIELD, Transaction};

pub(crate) fn member_not_found() -> CommandError {
    CommandError::new(ids::MEMBER_NOT_FOUND, "Member not found.")
}

/// `"<first> <last>"`, for log events.
pub(crate) fn display_name(member: &Record) -> String {
    let first = member.str("first_name").unwrap_or_default();
    let last = member.str("last_name").unwrap_or_default();
    format!("{first} {last}")
}

/// Fails with `duplicate-tag` when a member other than `owner` holds the
/// tag of `member`.
fn ensure_tag_is_free(
    transaction: &dyn Transaction,
    member: &Record,
    owner: Option<i64>,
) -> Result<(), HandlerError> {
    let tag = required(member, "tag")?;
    let holders = transaction.find_by(records::MEMBER, "tag", tag)?;
    if holders.iter().any(|holder| holder.int(ID_FIELD) != owner) {
        return Err(CommandError::new(
            ids::DUPLICATE_TAG,
            "Tag is already assigned to another member.",
        )
        .into());
    }
    Ok(())
}

/// Enrols a member. Any client-supplied id is ignored.
pub(crate) fn add(
    request: &Record,
    context: &mut HandlerContext<'_>,
) -> Result<Record, HandlerError> {
    let member = required_record(request, "member")?
        .clone()
        .without_field(ID_FIELD)?;
    ensure_tag_is_free(context.transaction(), &member, None)?;
    let stored = context.transaction().insert(member)?;
    context.respond([("member", stored)])
}

pub(crate) fn edit(
    request: &Record,
    context: &mut HandlerContext<'_>,
) -> Result<Record, HandlerError> {
    let member = required_record(request, "member")?;
    let id = member
        .int(ID_FIELD)
        .ok_or_else(|| CommandError::new(ids::MISSING_ID, "Member id must be defined."))?;
    if context.transaction().get(records::MEMBER, id)?.is_none() {
        return Err(member_not_found().into());
    }
    ensure_tag_is_free(context.transaction(), member, Some(id))?;
    let stored = context.transaction().update(member.clone())?;
    context.respond([("member", stored)])
}

/// Removes a member together with their shifts.
pub(crate) fn delete(
    request: &Record,
    context: &mut HandlerContext<'_>,
) -> Result<Record, HandlerError> {
    let id = required_int(request, ID_FIELD)?;
    let transaction = context.transaction();
    if !transaction.delete(records::MEMBER, id)? {
        return Err(member_not_found().into());
    }
    for shift in transaction.find_by(records::SHIFT, "member_id", &Value::from(id))? {
        if let Some(shift_id) = shift.int(ID_FIELD) {
            transaction.delete(records::SHIFT, shift_id)?;
        }
    }
    context.acknowledge()
}

pub(crate) fn get(
    request: &Record,
    context: &mut HandlerContext<'_>,
) -> Result<Record, HandlerError> {
    let id = required_int(request, ID_FIELD)?;
    let member = context
        .transaction()
        .get(records::MEMBER, id)?
        .ok_or_else(member_not_found)?;
    context.respond([("member", member)])
}

pub(crate) fn get_all(
    _request: &Record,
    context: &mut HandlerContext<'_>,
) -> Result<Record, HandlerError> {
    let members: Vec<Value> = context
        .transaction()
        .all(records::MEMBER)?
        .into_iter()
        .map(Value::from)
        .collect();
    context.respond([("members", members)])
}
