//! Schemas and the records they describe.
//!
//! A [`Schema`] is an ordered, immutable list of named [`Field`]s assembled
//! once through [`SchemaBuilder`]. A [`Record`] is an instance of a schema: a
//! fully populated slot per declared field, where absent optional values are
//! `None` and defaulted values are independent copies of the field default.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map as JsonMap, Value as Json};
use thiserror::Error;
use time::OffsetDateTime;

use crate::field::{Field, FieldError};
use crate::value::Value;

static NULL: Json = Json::Null;

/// Errors raised while building schemas or handling records.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// A value was supplied for a name the schema does not declare.
    #[error("unknown field '{name}' for {schema}")]
    UnknownField { schema: String, name: String },
    /// A schema declared the same field name twice.
    #[error("duplicate field '{name}' in {schema}")]
    DuplicateField { schema: String, name: String },
    /// A field failed validation or conversion. `path` locates the failing
    /// value, for example `member.first_name` or `shifts[2].start_time`.
    #[error("{path}: {source}")]
    Field {
        path: String,
        #[source]
        source: FieldError,
    },
    /// A record of one schema was offered where another was expected.
    #[error("expected {expected} record, found {found}")]
    SchemaMismatch { expected: String, found: String },
}

impl SchemaError {
    pub(crate) fn at(name: &str, error: FieldError) -> Self {
        let (path, source) = error.locate(name.to_owned());
        Self::Field { path, source }
    }

    /// Path of the failing field, when the error concerns one.
    #[must_use]
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::Field { path, .. } => Some(path),
            Self::UnknownField { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Returns true when the error signals an implementation defect rather
    /// than bad input.
    #[must_use]
    pub fn is_contract_violation(&self) -> bool {
        match self {
            Self::Field { source, .. } => source.is_contract_violation(),
            _ => false,
        }
    }
}

/// A declared field together with its name and declaration index.
#[derive(Debug)]
pub struct SchemaField {
    name: String,
    order: usize,
    field: Field,
}

impl SchemaField {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stable declaration index.
    #[must_use]
    pub const fn order(&self) -> usize {
        self.order
    }

    #[must_use]
    pub const fn field(&self) -> &Field {
        &self.field
    }
}

/// A named, ordered set of fields.
#[derive(Debug)]
pub struct Schema {
    name: String,
    fields: Vec<SchemaField>,
    index: HashMap<String, usize>,
}

impl Schema {
    /// Starts declaring a schema.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// A schema without fields.
    #[must_use]
    pub fn empty(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            fields: Vec::new(),
            index: HashMap::new(),
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = &SchemaField> {
        self.fields.iter()
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.position(name)
            .and_then(|position| self.fields.get(position))
            .map(SchemaField::field)
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn unknown(&self, name: &str) -> SchemaError {
        SchemaError::UnknownField {
            schema: self.name.clone(),
            name: name.to_owned(),
        }
    }
}

/// Builder collecting `(name, Field)` pairs for a [`Schema`].
#[derive(Debug)]
pub struct SchemaBuilder {
    name: String,
    fields: Vec<SchemaField>,
}

impl SchemaBuilder {
    /// Declares the next field.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, field: Field) -> Self {
        let order = self.fields.len();
        self.fields.push(SchemaField {
            name: name.into(),
            order,
            field,
        });
        self
    }

    /// Finishes the declaration.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::DuplicateField`] when a name was declared twice.
    pub fn build(self) -> Result<Arc<Schema>, SchemaError> {
        let mut index = HashMap::with_capacity(self.fields.len());
        for declared in &self.fields {
            if index.insert(declared.name.clone(), declared.order).is_some() {
                return Err(SchemaError::DuplicateField {
                    schema: self.name,
                    name: declared.name.clone(),
                });
            }
        }
        Ok(Arc::new(Schema {
            name: self.name,
            fields: self.fields,
            index,
        }))
    }
}

/// An instance of a [`Schema`].
#[derive(Debug, Clone)]
pub struct Record {
    schema: Arc<Schema>,
    values: Vec<Option<Value>>,
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.schema.name == other.schema.name && self.values == other.values
    }
}

impl Record {
    /// Builds a record from named values. Omitted fields take a fresh copy of
    /// their default; the result is validated before it is returned.
    ///
    /// # Errors
    ///
    /// Fails with [`SchemaError::UnknownField`] for undeclared names and with
    /// [`SchemaError::Field`] for the first field that fails validation.
    pub fn new<I, K, V>(schema: &Arc<Schema>, values: I) -> Result<Self, SchemaError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let mut record = Self::defaults(schema);
        for (name, value) in values {
            let name = name.as_ref();
            let slot = schema
                .position(name)
                .and_then(|position| record.values.get_mut(position))
                .ok_or_else(|| schema.unknown(name))?;
            *slot = Some(value.into());
        }
        record.validate()?;
        Ok(record)
    }

    /// Builds a record where every field holds its default.
    ///
    /// # Errors
    ///
    /// Fails when the schema has required fields.
    pub fn empty(schema: &Arc<Schema>) -> Result<Self, SchemaError> {
        Self::new(schema, std::iter::empty::<(&str, Value)>())
    }

    fn defaults(schema: &Arc<Schema>) -> Self {
        Self {
            schema: Arc::clone(schema),
            values: schema
                .fields
                .iter()
                .map(|declared| declared.field.clone_default())
                .collect(),
        }
    }

    #[must_use]
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Returns the value of `name`, or `None` when absent or undeclared.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.schema
            .position(name)
            .and_then(|position| self.values.get(position))
            .and_then(Option::as_ref)
    }

    #[must_use]
    pub fn int(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_int)
    }

    #[must_use]
    pub fn float(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(Value::as_float)
    }

    #[must_use]
    pub fn bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(Value::as_bool)
    }

    #[must_use]
    pub fn str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    #[must_use]
    pub fn datetime(&self, name: &str) -> Option<OffsetDateTime> {
        self.get(name).and_then(Value::as_datetime)
    }

    #[must_use]
    pub fn record(&self, name: &str) -> Option<&Record> {
        self.get(name).and_then(Value::as_record)
    }

    #[must_use]
    pub fn list(&self, name: &str) -> Option<&[Value]> {
        self.get(name).and_then(Value::as_list)
    }

    /// Replaces one field, validating the new value first.
    ///
    /// # Errors
    ///
    /// Fails for undeclared names or values the field rejects; the record is
    /// left unchanged in that case.
    pub fn set(&mut self, name: &str, value: Option<Value>) -> Result<(), SchemaError> {
        let position = self
            .schema
            .position(name)
            .ok_or_else(|| self.schema.unknown(name))?;
        if let Some(declared) = self.schema.fields.get(position) {
            declared
                .field
                .validate(value.as_ref())
                .map_err(|error| SchemaError::at(name, error))?;
        }
        if let Some(slot) = self.values.get_mut(position) {
            *slot = value;
        }
        Ok(())
    }

    /// Builder-style [`Record::set`] for a present value.
    ///
    /// # Errors
    ///
    /// See [`Record::set`].
    pub fn with_field(mut self, name: &str, value: impl Into<Value>) -> Result<Self, SchemaError> {
        self.set(name, Some(value.into()))?;
        Ok(self)
    }

    /// Builder-style [`Record::set`] clearing a value.
    ///
    /// # Errors
    ///
    /// See [`Record::set`].
    pub fn without_field(mut self, name: &str) -> Result<Self, SchemaError> {
        self.set(name, None)?;
        Ok(self)
    }

    /// Iterates `(name, value)` pairs in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&Value>)> {
        self.schema
            .fields
            .iter()
            .zip(&self.values)
            .map(|(declared, value)| (declared.name(), value.as_ref()))
    }

    /// Validates every field in declaration order, surfacing the first
    /// failure with its field path.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Field`] for the first failing field.
    pub fn validate(&self) -> Result<(), SchemaError> {
        for (declared, value) in self.schema.fields.iter().zip(&self.values) {
            declared
                .field
                .validate(value.as_ref())
                .map_err(|error| SchemaError::at(&declared.name, error))?;
        }
        Ok(())
    }

    /// Encodes the record into a string-keyed JSON object.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Field`] when a field cannot be encoded.
    pub fn encode(&self) -> Result<JsonMap<String, Json>, SchemaError> {
        let mut object = JsonMap::new();
        for (declared, value) in self.schema.fields.iter().zip(&self.values) {
            let base = declared
                .field
                .to_base(value.as_ref())
                .map_err(|error| SchemaError::at(&declared.name, error))?;
            object.insert(declared.name.clone(), base);
        }
        Ok(object)
    }

    /// Decodes a JSON object into a record of `schema`. Missing keys are
    /// treated as `null`.
    ///
    /// # Errors
    ///
    /// Fails for undeclared keys and for the first field that fails
    /// conversion or validation.
    pub fn decode(schema: &Arc<Schema>, object: &JsonMap<String, Json>) -> Result<Self, SchemaError> {
        if let Some(unknown) = object.keys().find(|key| schema.position(key).is_none()) {
            return Err(schema.unknown(unknown));
        }
        let values = schema
            .fields
            .iter()
            .map(|declared| {
                let base = object.get(&declared.name).unwrap_or(&NULL);
                declared
                    .field
                    .from_base(base)
                    .map_err(|error| SchemaError::at(&declared.name, error))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let record = Self {
            schema: Arc::clone(schema),
            values,
        };
        record.validate()?;
        Ok(record)
    }
}
