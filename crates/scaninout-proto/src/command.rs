//! Command schemas and the registry that names them.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map as JsonMap, Value as Json};
use thiserror::Error;

use crate::envelope::CommandError;
use crate::schema::{Record, Schema, SchemaBuilder, SchemaError};
use crate::value::Value;

/// Errors raised while assembling a [`CommandRegistry`].
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("command '{name}' is already registered")]
    DuplicateCommand { name: String },
    #[error("record schema '{name}' is already registered")]
    DuplicateSchema { name: String },
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// A named pair of request and response schemas.
#[derive(Debug)]
pub struct CommandSchema {
    name: String,
    request: Arc<Schema>,
    response: Arc<Schema>,
}

impl CommandSchema {
    #[must_use]
    pub fn new(name: impl Into<String>, request: Arc<Schema>, response: Arc<Schema>) -> Self {
        Self {
            name: name.into(),
            request,
            response,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn request_schema(&self) -> &Arc<Schema> {
        &self.request
    }

    #[must_use]
    pub const fn response_schema(&self) -> &Arc<Schema> {
        &self.response
    }

    /// Builds a request record from named values.
    ///
    /// # Errors
    ///
    /// See [`Record::new`].
    pub fn request<I, K, V>(&self, values: I) -> Result<Record, SchemaError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        Record::new(&self.request, values)
    }

    /// Builds a response record from named values.
    ///
    /// # Errors
    ///
    /// See [`Record::new`].
    pub fn response<I, K, V>(&self, values: I) -> Result<Record, SchemaError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        Record::new(&self.response, values)
    }

    /// Returns true when `record` is an instance of the response schema.
    #[must_use]
    pub fn is_response(&self, record: &Record) -> bool {
        Arc::ptr_eq(record.schema(), &self.response)
    }

    /// # Errors
    ///
    /// Fails with [`SchemaError::SchemaMismatch`] for records of another
    /// schema, or when a field cannot be encoded.
    pub fn encode_request(&self, record: &Record) -> Result<JsonMap<String, Json>, SchemaError> {
        ensure_schema(&self.request, record)?;
        record.encode()
    }

    /// # Errors
    ///
    /// See [`Record::decode`].
    pub fn decode_request(&self, fields: &JsonMap<String, Json>) -> Result<Record, SchemaError> {
        Record::decode(&self.request, fields)
    }

    /// # Errors
    ///
    /// See [`CommandSchema::encode_request`].
    pub fn encode_response(&self, record: &Record) -> Result<JsonMap<String, Json>, SchemaError> {
        ensure_schema(&self.response, record)?;
        record.encode()
    }

    /// # Errors
    ///
    /// See [`Record::decode`].
    pub fn decode_response(&self, fields: &JsonMap<String, Json>) -> Result<Record, SchemaError> {
        Record::decode(&self.response, fields)
    }
}

fn ensure_schema(expected: &Arc<Schema>, record: &Record) -> Result<(), SchemaError> {
    if Arc::ptr_eq(expected, record.schema()) {
        Ok(())
    } else {
        Err(SchemaError::SchemaMismatch {
            expected: expected.name().to_owned(),
            found: record.schema().name().to_owned(),
        })
    }
}

/// Converts a `snake_case` alias to its `CamelCase` command name.
#[must_use]
pub fn camelize(name: &str) -> String {
    name.split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars).collect()
            })
        })
        .collect()
}

/// Immutable map from command name to [`CommandSchema`], plus the shared
/// record schemas the commands are built from.
#[derive(Debug, Default)]
pub struct CommandRegistry {
    commands: HashMap<String, Arc<CommandSchema>>,
    order: Vec<String>,
    schemas: HashMap<String, Arc<Schema>>,
}

impl CommandRegistry {
    #[must_use]
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Looks up a command by its registered name.
    ///
    /// # Errors
    ///
    /// Returns an `unknown-command` [`CommandError`] on a miss.
    pub fn get(&self, name: &str) -> Result<&Arc<CommandSchema>, CommandError> {
        self.commands
            .get(name)
            .ok_or_else(CommandError::unknown_command)
    }

    /// Looks up a command by name or `snake_case` alias.
    ///
    /// # Errors
    ///
    /// See [`CommandRegistry::get`].
    pub fn resolve(&self, name: &str) -> Result<&Arc<CommandSchema>, CommandError> {
        self.get(name).or_else(|_| self.get(&camelize(name)))
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    /// A shared record schema such as `Member`.
    #[must_use]
    pub fn record_schema(&self, name: &str) -> Option<&Arc<Schema>> {
        self.schemas.get(name)
    }

    /// Command names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Collects commands during the single initialisation phase.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    registry: CommandRegistry,
}

impl RegistryBuilder {
    /// Registers a shared record schema under its own name.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateSchema`] for a repeated name.
    pub fn schema(&mut self, schema: &Arc<Schema>) -> Result<(), RegistryError> {
        let name = schema.name().to_owned();
        if self.registry.schemas.contains_key(&name) {
            return Err(RegistryError::DuplicateSchema { name });
        }
        self.registry.schemas.insert(name, Arc::clone(schema));
        Ok(())
    }

    /// Registers `name` with its request and response declarations.
    ///
    /// # Errors
    ///
    /// Fails for a repeated command name or an invalid schema declaration.
    pub fn command(
        &mut self,
        name: &str,
        request: SchemaBuilder,
        response: SchemaBuilder,
    ) -> Result<Arc<CommandSchema>, RegistryError> {
        if self.registry.commands.contains_key(name) {
            return Err(RegistryError::DuplicateCommand {
                name: name.to_owned(),
            });
        }
        let command = Arc::new(CommandSchema::new(name, request.build()?, response.build()?));
        self.registry
            .commands
            .insert(name.to_owned(), Arc::clone(&command));
        self.registry.order.push(name.to_owned());
        Ok(command)
    }

    #[must_use]
    pub fn build(self) -> CommandRegistry {
        self.registry
    }
}

/// Starts the request schema of `command`.
#[must_use]
pub fn request(command: &str) -> SchemaBuilder {
    Schema::builder(format!("{command}.Request"))
}

/// Starts the response schema of `command`.
#[must_use]
pub fn response(command: &str) -> SchemaBuilder {
    Schema::builder(format!("{command}.Response"))
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};
    use serde_json::json;

    use super::*;
    use crate::envelope::ids;
    use crate::field::Field;

    #[fixture]
    fn registry() -> CommandRegistry {
        let mut builder = CommandRegistry::builder();
        builder
            .command("Ping", request("Ping"), response("Ping"))
            .expect("ping");
        builder
            .command(
                "MemberGet",
                request("MemberGet").field("id", Field::int()),
                response("MemberGet").field("name", Field::string()),
            )
            .expect("member get");
        builder.build()
    }

    #[rstest]
    #[case::single("ping", "Ping")]
    #[case::pair("member_get", "MemberGet")]
    #[case::already_camel("MemberGet", "MemberGet")]
    #[case::stray_underscores("_member__get_", "MemberGet")]
    fn camelizes_aliases(#[case] alias: &str, #[case] expected: &str) {
        assert_eq!(camelize(alias), expected);
    }

    #[rstest]
    fn unknown_names_are_distinguishable(registry: CommandRegistry) {
        let error = registry.get("Nope").expect_err("unknown");
        assert!(error.is(ids::UNKNOWN_COMMAND));
    }

    #[rstest]
    fn aliases_resolve(registry: CommandRegistry) {
        let command = registry.resolve("member_get").expect("alias");
        assert_eq!(command.name(), "MemberGet");
        assert_eq!(registry.names().collect::<Vec<_>>(), ["Ping", "MemberGet"]);
    }

    #[test]
    fn duplicate_commands_are_rejected() {
        let mut builder = CommandRegistry::builder();
        builder
            .command("Ping", request("Ping"), response("Ping"))
            .expect("first");
        let error = builder
            .command("Ping", request("Ping"), response("Ping"))
            .expect_err("second");
        assert!(matches!(error, RegistryError::DuplicateCommand { .. }));
    }

    #[rstest]
    fn request_round_trips_through_the_command(registry: CommandRegistry) {
        let command = registry.get("MemberGet").expect("command");
        let record = command.request([("id", 4_i64)]).expect("request");
        let fields = command.encode_request(&record).expect("encode");
        assert_eq!(fields.get("id"), Some(&json!(4)));
        assert_eq!(command.decode_request(&fields).expect("decode"), record);
    }

    #[rstest]
    fn encoding_refuses_records_of_another_schema(registry: CommandRegistry) {
        let command = registry.get("MemberGet").expect("command");
        let record = command.request([("id", 4_i64)]).expect("request");
        let error = command.encode_response(&record).expect_err("mismatch");
        assert!(matches!(error, SchemaError::SchemaMismatch { .. }));
        assert!(!command.is_response(&record));
    }

    #[rstest]
    fn decoding_names_the_missing_field(registry: CommandRegistry) {
        let command = registry.get("MemberGet").expect("command");
        let error = command.decode_request(&JsonMap::new()).expect_err("missing id");
        assert_eq!(error.path(), Some("id"));
    }
}
