//! Scanning in and out, and the shifts that result.
//!
//! A scan-in is stored as a `Shift` without an `end_time`; scanning out
//! completes that row. Only completed shifts count towards a member's hours.

use std::sync::Arc;

use scaninout_proto::catalog::records;
use scaninout_proto::{Record, Value};
use time::Duration;
use tracing::debug;

use super::members::{display_name, member_not_found};
use super::{required, required_int};
use crate::dispatch::dispatcher::HandlerContext;
use crate::dispatch::errors::HandlerError;
use crate::dispatch::router::DISPATCH_TARGET;
use crate::store::ID_FIELD;

const SECONDS_PER_HOUR: f64 = 3600.0;

fn hours(length: Duration) -> f64 {
    length.as_seconds_f64() / SECONDS_PER_HOUR
}

fn is_open(shift: &Record) -> bool {
    shift.get("end_time").is_none()
}

fn shift_length(shift: &Record) -> Option<Duration> {
    Some(shift.datetime("end_time")? - shift.datetime("start_time")?)
}

/// Toggles the presence of the member holding `tag`.
pub(crate) fn scan_in_out(
    request: &Record,
    context: &mut HandlerContext<'_>,
) -> Result<Record, HandlerError> {
    let tag = required(request, "tag")?;
    let member = context
        .transaction()
        .find_by(records::MEMBER, "tag", tag)?
        .into_iter()
        .next()
        .ok_or_else(member_not_found)?;
    let member_id = member
        .int(ID_FIELD)
        .ok_or_else(|| HandlerError::missing_field(ID_FIELD))?;
    let now = context.now();

    let open = context
        .transaction()
        .find_by(records::SHIFT, "member_id", &Value::from(member_id))?
        .into_iter()
        .find(is_open);
    if let Some(shift) = open {
        let start = shift
            .datetime("start_time")
            .ok_or_else(|| HandlerError::missing_field("start_time"))?;
        let elapsed = (now - start).max(Duration::ZERO);
        if elapsed <= context.scan_expiry() {
            context
                .transaction()
                .update(shift.with_field("end_time", start + elapsed)?)?;
            debug!(
                target: DISPATCH_TARGET,
                member = %display_name(&member),
                elapsed_hours = hours(elapsed),
                "member scanned out"
            );
            return context.respond([
                ("scanned_in", Value::from(false)),
                ("elapsed_hours", Value::from(hours(elapsed))),
            ]);
        }
        if let Some(shift_id) = shift.int(ID_FIELD) {
            context.transaction().delete(records::SHIFT, shift_id)?;
        }
        debug!(
            target: DISPATCH_TARGET,
            member = %display_name(&member),
            "discarded expired scan-in"
        );
    }

    let schema = Arc::clone(context.record_schema(records::SHIFT)?);
    let shift = Record::new(
        &schema,
        [
            ("member_id", Value::from(member_id)),
            ("start_time", Value::from(now)),
        ],
    )?;
    context.transaction().insert(shift)?;
    debug!(
        target: DISPATCH_TARGET,
        member = %display_name(&member),
        "member scanned in"
    );
    context.respond([("scanned_in", true)])
}

/// Completed shifts of one member and their total length.
pub(crate) fn get_shifts(
    request: &Record,
    context: &mut HandlerContext<'_>,
) -> Result<Record, HandlerError> {
    let id = required_int(request, ID_FIELD)?;
    if context.transaction().get(records::MEMBER, id)?.is_none() {
        return Err(member_not_found().into());
    }
    let shifts: Vec<Record> = context
        .transaction()
        .find_by(records::SHIFT, "member_id", &Value::from(id))?
        .into_iter()
        .filter(|shift| !is_open(shift))
        .collect();
    let total = shifts
        .iter()
        .filter_map(shift_length)
        .fold(Duration::ZERO, |total, length| total + length);
    let shifts: Vec<Value> = shifts.into_iter().map(Value::from).collect();
    context.respond([
        ("hours", Value::from(hours(total))),
        ("shifts", Value::from(shifts)),
    ])
}
