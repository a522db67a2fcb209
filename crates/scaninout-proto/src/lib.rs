//! Protocol library for the scan-in/scan-out record-keeping service.
//!
//! The crate provides the typed [`field::Field`] system, [`schema::Record`]
//! instances of declared [`schema::Schema`]s, the [`command::CommandRegistry`]
//! pairing request and response schemas per command, the line-oriented
//! [`wire`] codec with its [`envelope`] types, and the shared-secret
//! [`auth`] primitives. The daemon and client both build on it.

pub mod auth;
pub mod catalog;
pub mod command;
pub mod envelope;
pub mod field;
pub mod schema;
pub mod value;
pub mod wire;

pub use auth::{AuthError, AuthKey};
pub use command::{CommandRegistry, CommandSchema, RegistryError};
pub use envelope::{CommandError, RpcRequest, RpcResponse};
pub use field::{Field, FieldError, TagValidator};
pub use schema::{Record, Schema, SchemaError};
pub use value::Value;
pub use wire::WireError;
