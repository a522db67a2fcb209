//! The scan-in/scan-out command catalog.
//!
//! Every command and shared record schema is declared here, once, by
//! [`build`]. [`install`] publishes the result as the process-wide registry.

use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::command::{CommandRegistry, RegistryError, request, response};
use crate::field::{Field, TagValidator};
use crate::schema::{Schema, SchemaError};

/// Shared record schema names.
pub mod records {
    pub const MEMBER_INFO_FIELD: &str = "MemberInfoField";
    pub const MEMBER: &str = "Member";
    pub const SHIFT: &str = "Shift";
}

/// Registered command names.
pub mod names {
    pub const PING: &str = "Ping";
    pub const AUTHENTICATED_PING: &str = "AuthenticatedPing";
    pub const GENERATE_NONCE: &str = "GenerateNonce";
    pub const PRELOAD_SIGNATURE: &str = "PreloadSignature";
    pub const MEMBER_INFO_FIELD_ADD: &str = "MemberInfoFieldAdd";
    pub const MEMBER_INFO_FIELD_EDIT: &str = "MemberInfoFieldEdit";
    pub const MEMBER_INFO_FIELD_DELETE: &str = "MemberInfoFieldDelete";
    pub const MEMBER_INFO_FIELD_GET: &str = "MemberInfoFieldGet";
    pub const MEMBER_INFO_FIELD_GET_ALL: &str = "MemberInfoFieldGetAll";
    pub const MEMBER_ADD: &str = "MemberAdd";
    pub const MEMBER_EDIT: &str = "MemberEdit";
    pub const MEMBER_DELETE: &str = "MemberDelete";
    pub const MEMBER_GET: &str = "MemberGet";
    pub const MEMBER_GET_ALL: &str = "MemberGetAll";
    pub const MEMBER_SCAN_IN_OUT: &str = "MemberScanInOut";
    pub const MEMBER_GET_SHIFTS: &str = "MemberGetShifts";
}

static REGISTRY: OnceCell<Arc<CommandRegistry>> = OnceCell::new();

fn member_info_field() -> Result<Arc<Schema>, SchemaError> {
    Schema::builder(records::MEMBER_INFO_FIELD)
        .field("id", Field::int().optional())
        .field("name", Field::string())
        .build()
}

fn member(tags: Arc<dyn TagValidator>) -> Result<Arc<Schema>, SchemaError> {
    Schema::builder(records::MEMBER)
        .field("id", Field::int().optional())
        .field("tag", Field::tag(tags))
        .field("first_name", Field::non_empty_string())
        .field("last_name", Field::non_empty_string())
        .field("info", Field::map(Field::string(), Field::string()).optional())
        .build()
}

fn shift() -> Result<Arc<Schema>, SchemaError> {
    Schema::builder(records::SHIFT)
        .field("id", Field::int().optional())
        .field("member_id", Field::int())
        .field("start_time", Field::datetime())
        .field("end_time", Field::datetime().optional())
        .build()
}

/// Declares every command. Tags are checked with `tags`.
///
/// # Errors
///
/// Fails only if a declaration is inconsistent, which is a programming
/// error.
pub fn build(tags: Arc<dyn TagValidator>) -> Result<CommandRegistry, RegistryError> {
    let info_field = member_info_field()?;
    let member = member(Arc::clone(&tags))?;
    let shift = shift()?;

    let mut builder = CommandRegistry::builder();
    builder.schema(&info_field)?;
    builder.schema(&member)?;
    builder.schema(&shift)?;

    for name in [names::PING, names::AUTHENTICATED_PING] {
        builder.command(name, request(name), response(name))?;
    }
    builder.command(
        names::GENERATE_NONCE,
        request(names::GENERATE_NONCE),
        response(names::GENERATE_NONCE).field("nonce_hex", Field::non_empty_string()),
    )?;
    builder.command(
        names::PRELOAD_SIGNATURE,
        request(names::PRELOAD_SIGNATURE).field("signature_hex", Field::non_empty_string()),
        response(names::PRELOAD_SIGNATURE),
    )?;

    for name in [names::MEMBER_INFO_FIELD_ADD, names::MEMBER_INFO_FIELD_EDIT] {
        builder.command(
            name,
            request(name).field("field", Field::object(&info_field)),
            response(name).field("field", Field::object(&info_field)),
        )?;
    }
    builder.command(
        names::MEMBER_INFO_FIELD_DELETE,
        request(names::MEMBER_INFO_FIELD_DELETE).field("id", Field::int()),
        response(names::MEMBER_INFO_FIELD_DELETE),
    )?;
    builder.command(
        names::MEMBER_INFO_FIELD_GET,
        request(names::MEMBER_INFO_FIELD_GET).field("id", Field::int()),
        response(names::MEMBER_INFO_FIELD_GET).field("field", Field::object(&info_field)),
    )?;
    builder.command(
        names::MEMBER_INFO_FIELD_GET_ALL,
        request(names::MEMBER_INFO_FIELD_GET_ALL),
        response(names::MEMBER_INFO_FIELD_GET_ALL)
            .field("fields", Field::list(Field::object(&info_field)).optional()),
    )?;

    for name in [names::MEMBER_ADD, names::MEMBER_EDIT] {
        builder.command(
            name,
            request(name).field("member", Field::object(&member)),
            response(name).field("member", Field::object(&member)),
        )?;
    }
    builder.command(
        names::MEMBER_DELETE,
        request(names::MEMBER_DELETE).field("id", Field::int()),
        response(names::MEMBER_DELETE),
    )?;
    builder.command(
        names::MEMBER_GET,
        request(names::MEMBER_GET).field("id", Field::int()),
        response(names::MEMBER_GET).field("member", Field::object(&member)),
    )?;
    builder.command(
        names::MEMBER_GET_ALL,
        request(names::MEMBER_GET_ALL),
        response(names::MEMBER_GET_ALL)
            .field("members", Field::list(Field::object(&member)).optional()),
    )?;
    builder.command(
        names::MEMBER_SCAN_IN_OUT,
        request(names::MEMBER_SCAN_IN_OUT).field("tag", Field::tag(tags)),
        response(names::MEMBER_SCAN_IN_OUT)
            .field("elapsed_hours", Field::float().optional())
            .field("scanned_in", Field::bool()),
    )?;
    builder.command(
        names::MEMBER_GET_SHIFTS,
        request(names::MEMBER_GET_SHIFTS).field("id", Field::int()),
        response(names::MEMBER_GET_SHIFTS)
            .field("hours", Field::float())
            .field("shifts", Field::list(Field::object(&shift)).optional()),
    )?;

    Ok(builder.build())
}

/// Builds the catalog once and publishes it process-wide. Later calls return
/// the registry published first.
///
/// # Errors
///
/// See [`build`].
pub fn install(tags: Arc<dyn TagValidator>) -> Result<Arc<CommandRegistry>, RegistryError> {
    REGISTRY
        .get_or_try_init(|| build(tags).map(Arc::new))
        .map(Arc::clone)
}
