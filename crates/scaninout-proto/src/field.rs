//! Typed field descriptors.
//!
//! A [`Field`] governs one named slot of a schema: it knows the in-memory
//! type ([`ValueKind`]) and the wire type ([`WireKind`]) of the slot, whether a
//! value must be present, which default fills an omitted slot, and how to
//! convert between the two representations.
//!
//! Conversion is checked in both directions. [`Field::to_base`] refuses values
//! that fail [`Field::validate`] and reports a contract violation if the
//! produced JSON does not have the declared wire type. [`Field::from_base`]
//! refuses JSON of the wrong wire type and re-validates what it produced.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::{Map as JsonMap, Number, Value as Json};
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::schema::{Record, Schema, SchemaError};
use crate::value::{Value, ValueKind, WireKind};

/// Format predicate for tag strings, supplied by the deployment.
pub trait TagValidator: Send + Sync {
    /// Returns true when `tag` is a well-formed tag.
    fn is_valid(&self, tag: &str) -> bool;
}

impl<F> TagValidator for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn is_valid(&self, tag: &str) -> bool {
        self(tag)
    }
}

/// Tag predicate accepting any non-empty tag.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAnyTag;

impl TagValidator for AcceptAnyTag {
    fn is_valid(&self, _tag: &str) -> bool {
        true
    }
}

/// Errors raised while validating or converting a single field value.
#[derive(Debug, Error)]
pub enum FieldError {
    /// A required value was absent.
    #[error("value is required")]
    Required,
    /// The in-memory value has the wrong type.
    #[error("expected {expected}, found {found}")]
    WrongType { expected: ValueKind, found: ValueKind },
    /// The wire value has the wrong JSON type.
    #[error("expected {expected} on the wire, found {found}")]
    WireType { expected: WireKind, found: WireKind },
    /// A type-specific refinement rejected the value.
    #[error("{message}")]
    Invalid { message: String },
    /// A list element failed.
    #[error("element {index}: {source}")]
    Element {
        index: usize,
        #[source]
        source: Box<FieldError>,
    },
    /// A map entry failed.
    #[error("entry {key:?}: {source}")]
    Entry {
        key: String,
        #[source]
        source: Box<FieldError>,
    },
    /// A nested record failed.
    #[error("{0}")]
    Nested(Box<SchemaError>),
    /// A conversion produced a value of the wrong type. This is a defect in
    /// the field implementation, never a caller error.
    #[error("contract violation: {message}")]
    Contract { message: String },
}

impl FieldError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    pub(crate) fn contract(message: impl Into<String>) -> Self {
        Self::Contract {
            message: message.into(),
        }
    }

    fn element(index: usize, source: Self) -> Self {
        Self::Element {
            index,
            source: Box::new(source),
        }
    }

    fn entry(key: &str, source: Self) -> Self {
        Self::Entry {
            key: key.to_owned(),
            source: Box::new(source),
        }
    }

    fn nested(source: SchemaError) -> Self {
        Self::Nested(Box::new(source))
    }

    /// Returns true when the error signals an implementation defect.
    #[must_use]
    pub fn is_contract_violation(&self) -> bool {
        match self {
            Self::Contract { .. } => true,
            Self::Element { source, .. } | Self::Entry { source, .. } => {
                source.is_contract_violation()
            }
            Self::Nested(inner) => inner.is_contract_violation(),
            _ => false,
        }
    }

    /// Flattens element, entry, and nested-record wrappers into a dotted
    /// path rooted at `path`, returning the innermost error.
    pub(crate) fn locate(self, path: String) -> (String, Self) {
        match self {
            Self::Element { index, source } => (*source).locate(format!("{path}[{index}]")),
            Self::Entry { key, source } => (*source).locate(format!("{path}[{key:?}]")),
            Self::Nested(inner) => match *inner {
                SchemaError::Field {
                    path: inner_path,
                    source,
                } => (format!("{path}.{inner_path}"), source),
                other => (path, Self::Nested(Box::new(other))),
            },
            other => (path, other),
        }
    }
}

/// The concrete kind of a field, including composite parameters.
#[derive(Clone)]
pub enum FieldKind {
    /// JSON boolean.
    Bool,
    /// Signed 64-bit integer.
    Int,
    /// Finite float; JSON integers are not accepted in its place.
    Float,
    /// UTF-8 string, optionally refusing the empty string.
    Str { non_empty: bool },
    /// String checked by a deployment tag predicate.
    Tag(Arc<dyn TagValidator>),
    /// Timestamp carried as RFC 3339 text.
    DateTime,
    /// Homogeneous list of the item field.
    List(Box<Field>),
    /// String-keyed map.
    Map { key: Box<Field>, value: Box<Field> },
    /// Nested record of the given schema.
    Object(Arc<Schema>),
}

impl fmt::Debug for FieldKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool => formatter.write_str("Bool"),
            Self::Int => formatter.write_str("Int"),
            Self::Float => formatter.write_str("Float"),
            Self::Str { non_empty } => formatter
                .debug_struct("Str")
                .field("non_empty", non_empty)
                .finish(),
            Self::Tag(_) => formatter.write_str("Tag"),
            Self::DateTime => formatter.write_str("DateTime"),
            Self::List(item) => formatter.debug_tuple("List").field(item).finish(),
            Self::Map { key, value } => formatter
                .debug_struct("Map")
                .field("key", key)
                .field("value", value)
                .finish(),
            Self::Object(schema) => formatter.debug_tuple("Object").field(&schema.name()).finish(),
        }
    }
}

impl FieldKind {
    fn empty_container(&self) -> Option<Value> {
        match self {
            Self::List(_) => Some(Value::List(Vec::new())),
            Self::Map { .. } => Some(Value::Map(BTreeMap::new())),
            _ => None,
        }
    }
}

/// Descriptor for one named value in a schema.
#[derive(Debug, Clone)]
pub struct Field {
    kind: FieldKind,
    required: bool,
    default: Option<Value>,
}

impl Field {
    fn new(kind: FieldKind) -> Self {
        Self {
            kind,
            required: true,
            default: None,
        }
    }

    /// Boolean field.
    #[must_use]
    pub fn bool() -> Self {
        Self::new(FieldKind::Bool)
    }

    /// Integer field.
    #[must_use]
    pub fn int() -> Self {
        Self::new(FieldKind::Int)
    }

    /// Float field.
    #[must_use]
    pub fn float() -> Self {
        Self::new(FieldKind::Float)
    }

    /// String field; the empty string is allowed.
    #[must_use]
    pub fn string() -> Self {
        Self::new(FieldKind::Str { non_empty: false })
    }

    /// String field that rejects the empty string.
    #[must_use]
    pub fn non_empty_string() -> Self {
        Self::new(FieldKind::Str { non_empty: true })
    }

    /// Non-empty string field checked against a deployment tag format.
    #[must_use]
    pub fn tag(validator: Arc<dyn TagValidator>) -> Self {
        Self::new(FieldKind::Tag(validator))
    }

    /// Timestamp carried as RFC 3339 text on the wire.
    #[must_use]
    pub fn datetime() -> Self {
        Self::new(FieldKind::DateTime)
    }

    /// List field whose items follow `item`.
    #[must_use]
    pub fn list(item: Self) -> Self {
        Self::new(FieldKind::List(Box::new(item)))
    }

    /// Map field. The key field must be string based since JSON object keys
    /// are strings.
    #[must_use]
    pub fn map(key: Self, value: Self) -> Self {
        Self::new(FieldKind::Map {
            key: Box::new(key),
            value: Box::new(value),
        })
    }

    /// Field holding a nested record of `schema`.
    #[must_use]
    pub fn object(schema: &Arc<Schema>) -> Self {
        Self::new(FieldKind::Object(Arc::clone(schema)))
    }

    /// Marks the field optional. Lists and maps without an explicit default
    /// default to an empty container.
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.required = false;
        if self.default.is_none() {
            self.default = self.kind.empty_container();
        }
        self
    }

    /// Marks the field optional with an explicit default.
    #[must_use]
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.required = false;
        self.default = Some(value.into());
        self
    }

    #[must_use]
    pub const fn is_required(&self) -> bool {
        self.required
    }

    #[must_use]
    pub const fn kind(&self) -> &FieldKind {
        &self.kind
    }

    /// In-memory type of values held by this field.
    #[must_use]
    pub fn actual_kind(&self) -> ValueKind {
        match self.kind {
            FieldKind::Bool => ValueKind::Bool,
            FieldKind::Int => ValueKind::Int,
            FieldKind::Float => ValueKind::Float,
            FieldKind::Str { .. } | FieldKind::Tag(_) => ValueKind::Str,
            FieldKind::DateTime => ValueKind::DateTime,
            FieldKind::List(_) => ValueKind::List,
            FieldKind::Map { .. } => ValueKind::Map,
            FieldKind::Object(_) => ValueKind::Record,
        }
    }

    /// Wire type produced by [`Field::to_base`] for present values.
    #[must_use]
    pub fn base_kind(&self) -> WireKind {
        match self.kind {
            FieldKind::Bool => WireKind::Bool,
            FieldKind::Int => WireKind::Integer,
            FieldKind::Float => WireKind::Float,
            FieldKind::Str { .. } | FieldKind::Tag(_) | FieldKind::DateTime => WireKind::String,
            FieldKind::List(_) => WireKind::Array,
            FieldKind::Map { .. } | FieldKind::Object(_) => WireKind::Object,
        }
    }

    /// Returns a fresh copy of the default. Every call yields an independent
    /// container so records never share mutable state.
    #[must_use]
    pub fn clone_default(&self) -> Option<Value> {
        self.default.clone()
    }

    /// Validates an in-memory value, where `None` means absent.
    pub fn validate(&self, value: Option<&Value>) -> Result<(), FieldError> {
        let Some(value) = value else {
            return if self.required {
                Err(FieldError::Required)
            } else {
                Ok(())
            };
        };
        let expected = self.actual_kind();
        if value.kind() != expected {
            return Err(FieldError::WrongType {
                expected,
                found: value.kind(),
            });
        }
        self.validate_impl(value)
    }

    fn validate_impl(&self, value: &Value) -> Result<(), FieldError> {
        match (&self.kind, value) {
            (FieldKind::Float, Value::Float(number)) if !number.is_finite() => {
                Err(FieldError::invalid("must be finite"))
            }
            (FieldKind::Str { non_empty: true }, Value::Str(text)) if text.is_empty() => {
                Err(FieldError::invalid("must not be empty"))
            }
            (FieldKind::Tag(validator), Value::Str(text)) => {
                if text.is_empty() {
                    Err(FieldError::invalid("must not be empty"))
                } else if validator.is_valid(text) {
                    Ok(())
                } else {
                    Err(FieldError::invalid("invalid tag"))
                }
            }
            (FieldKind::List(item), Value::List(values)) => {
                values.iter().enumerate().try_for_each(|(index, element)| {
                    item.validate(Some(element))
                        .map_err(|source| FieldError::element(index, source))
                })
            }
            (FieldKind::Map { key, value: entry }, Value::Map(entries)) => {
                entries.iter().try_for_each(|(name, element)| {
                    key.validate(Some(&Value::Str(name.clone())))
                        .and_then(|()| entry.validate(Some(element)))
                        .map_err(|source| FieldError::entry(name, source))
                })
            }
            (FieldKind::Object(schema), Value::Record(record)) => {
                if record.schema().name() != schema.name() {
                    return Err(FieldError::invalid(format!(
                        "expected {} record, found {}",
                        schema.name(),
                        record.schema().name()
                    )));
                }
                record.validate().map_err(FieldError::nested)
            }
            _ => Ok(()),
        }
    }

    /// Converts an in-memory value to its wire form. Absent values encode as
    /// JSON `null`.
    pub fn to_base(&self, value: Option<&Value>) -> Result<Json, FieldError> {
        self.validate(value)?;
        let Some(value) = value else {
            return Ok(Json::Null);
        };
        let base = self.actual_to_base(value)?;
        let found = WireKind::of(&base);
        if found != self.base_kind() {
            return Err(FieldError::contract(format!(
                "encoded {} as {found}, declared {}",
                self.actual_kind(),
                self.base_kind()
            )));
        }
        Ok(base)
    }

    /// Converts a wire value to its in-memory form. JSON `null` is absence:
    /// it fails for required fields and yields the default otherwise.
    pub fn from_base(&self, base: &Json) -> Result<Option<Value>, FieldError> {
        if base.is_null() {
            return if self.required {
                Err(FieldError::Required)
            } else {
                Ok(self.clone_default())
            };
        }
        let value = self.base_to_actual(base)?;
        self.validate(Some(&value))?;
        Ok(Some(value))
    }

    fn actual_to_base(&self, value: &Value) -> Result<Json, FieldError> {
        match (&self.kind, value) {
            (FieldKind::Bool, Value::Bool(flag)) => Ok(Json::Bool(*flag)),
            (FieldKind::Int, Value::Int(number)) => Ok(Json::from(*number)),
            (FieldKind::Float, Value::Float(number)) => Number::from_f64(*number)
                .map(Json::Number)
                .ok_or_else(|| FieldError::contract("float is not finite")),
            (FieldKind::Str { .. } | FieldKind::Tag(_), Value::Str(text)) => {
                Ok(Json::String(text.clone()))
            }
            (FieldKind::DateTime, Value::DateTime(moment)) => moment
                .format(&Rfc3339)
                .map(Json::String)
                .map_err(|error| FieldError::contract(format!("cannot format timestamp: {error}"))),
            (FieldKind::List(item), Value::List(values)) => values
                .iter()
                .enumerate()
                .map(|(index, element)| {
                    item.to_base(Some(element))
                        .map_err(|source| FieldError::element(index, source))
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Json::Array),
            (FieldKind::Map { key, value: entry }, Value::Map(entries)) => {
                let mut object = JsonMap::new();
                for (name, element) in entries {
                    let encoded_key = key
                        .to_base(Some(&Value::Str(name.clone())))
                        .map_err(|source| FieldError::entry(name, source))?;
                    let Json::String(wire_key) = encoded_key else {
                        return Err(FieldError::contract("map keys must encode to strings"));
                    };
                    let wire_value = entry
                        .to_base(Some(element))
                        .map_err(|source| FieldError::entry(name, source))?;
                    object.insert(wire_key, wire_value);
                }
                Ok(Json::Object(object))
            }
            (FieldKind::Object(_), Value::Record(record)) => record
                .encode()
                .map(Json::Object)
                .map_err(FieldError::nested),
            _ => Err(FieldError::contract(format!(
                "cannot encode {} as {}",
                value.kind(),
                self.actual_kind()
            ))),
        }
    }

    fn base_to_actual(&self, base: &Json) -> Result<Value, FieldError> {
        match (&self.kind, base) {
            (FieldKind::Bool, Json::Bool(flag)) => Ok(Value::Bool(*flag)),
            (FieldKind::Int, Json::Number(number)) if !number.is_f64() => number
                .as_i64()
                .map(Value::Int)
                .ok_or_else(|| FieldError::invalid("integer out of range")),
            (FieldKind::Float, Json::Number(number)) if number.is_f64() => number
                .as_f64()
                .map(Value::Float)
                .ok_or_else(|| FieldError::invalid("float out of range")),
            (FieldKind::Str { .. } | FieldKind::Tag(_), Json::String(text)) => {
                Ok(Value::Str(text.clone()))
            }
            (FieldKind::DateTime, Json::String(text)) => OffsetDateTime::parse(text, &Rfc3339)
                .map(Value::DateTime)
                .map_err(|error| FieldError::invalid(format!("invalid RFC 3339 timestamp: {error}"))),
            (FieldKind::List(item), Json::Array(elements)) => elements
                .iter()
                .enumerate()
                .map(|(index, element)| {
                    item.from_base(element)
                        .and_then(|decoded| decoded.ok_or(FieldError::Required))
                        .map_err(|source| FieldError::element(index, source))
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            (FieldKind::Map { key, value: entry }, Json::Object(object)) => {
                let mut entries = BTreeMap::new();
                for (name, element) in object {
                    let decoded_key = key
                        .from_base(&Json::String(name.clone()))
                        .map_err(|source| FieldError::entry(name, source))?;
                    let Some(Value::Str(decoded_key)) = decoded_key else {
                        return Err(FieldError::contract("map keys must decode to strings"));
                    };
                    let decoded = entry
                        .from_base(element)
                        .and_then(|decoded| decoded.ok_or(FieldError::Required))
                        .map_err(|source| FieldError::entry(name, source))?;
                    entries.insert(decoded_key, decoded);
                }
                Ok(Value::Map(entries))
            }
            (FieldKind::Object(schema), Json::Object(object)) => Record::decode(schema, object)
                .map(Value::Record)
                .map_err(FieldError::nested),
            _ => Err(FieldError::WireType {
                expected: self.base_kind(),
                found: WireKind::of(base),
            }),
        }
    }
}
