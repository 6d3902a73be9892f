//! Field schema definitions.
//!
//! A [`FieldSchema`] describes how one field of a model is stored: its
//! type, default, whether it is required, how it expands into a foreign
//! entity, and an optional custom transform.

use crate::{codec::Direction, error::Result, Error, Value};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Field types supported in schemas.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Integer,
    /// `YYYY-MM-DD HH:MM:SS` text decoded into a UTC date-time
    DateTime,
    /// `YYYY-MM-DD HH:MM:SS` text decoded into epoch seconds
    Timestamp,
    /// Float rounded to two decimals
    Money,
    /// Comma-joined list
    Set,
    /// JSON text
    Json,
    /// One of a fixed set of values
    Enum,
    Boolean,
    /// HTML-escaped, slash-quoted text
    String,
    /// Transformed by the codec registered under this name
    Custom(String),
    /// Passed through unchanged
    Untyped,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Integer => write!(f, "integer"),
            FieldType::DateTime => write!(f, "datetime"),
            FieldType::Timestamp => write!(f, "timestamp"),
            FieldType::Money => write!(f, "money"),
            FieldType::Set => write!(f, "set"),
            FieldType::Json => write!(f, "json"),
            FieldType::Enum => write!(f, "enum"),
            FieldType::Boolean => write!(f, "boolean"),
            FieldType::String => write!(f, "string"),
            FieldType::Custom(name) => write!(f, "custom({name})"),
            FieldType::Untyped => write!(f, "untyped"),
        }
    }
}

/// How a field expands into a foreign entity on `populate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PopulateRule {
    /// Foreign model name; the result is stored as `_<field>`.
    Model(String),
    /// Foreign model name with an explicit target field.
    Target {
        model: String,
        #[serde(default)]
        field: Option<String>,
    },
}

impl PopulateRule {
    /// Name of the foreign model.
    pub fn model(&self) -> &str {
        match self {
            PopulateRule::Model(model) | PopulateRule::Target { model, .. } => model,
        }
    }

    /// Name of the computed field the populated entity is stored under.
    pub fn target_field(&self, field: &str) -> String {
        match self {
            PopulateRule::Target {
                field: Some(target),
                ..
            } if !target.is_empty() => target.clone(),
            _ => format!("_{field}"),
        }
    }
}

/// A custom field transform. Replaces the built-in type rules entirely.
#[derive(Clone)]
pub struct TransformFn(Arc<dyn Fn(Value, Direction) -> Result<Value> + Send + Sync>);

impl TransformFn {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Value, Direction) -> Result<Value> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn call(&self, value: Value, direction: Direction) -> Result<Value> {
        (self.0)(value, direction)
    }
}

impl fmt::Debug for TransformFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TransformFn(..)")
    }
}

/// Definition of a field in a model.
#[derive(Debug, Clone)]
pub struct FieldSchema {
    /// Field name
    pub name: String,
    /// Field type
    pub field_type: FieldType,
    /// Value used when the field is reset
    pub default: Option<Value>,
    /// Whether this field must be present on commit (see `Config::enforce_required`)
    pub required: bool,
    /// Foreign entity expansion rule
    pub populate: Option<PopulateRule>,
    /// Allowed values for `enum` fields
    pub enum_values: Vec<Value>,
    /// Custom transform overriding the type rules
    pub transform: Option<TransformFn>,
}

impl FieldSchema {
    /// Create an optional field with no default.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            default: None,
            required: false,
            populate: None,
            enum_values: Vec::new(),
            transform: None,
        }
    }

    /// Create a required field.
    pub fn required(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            required: true,
            ..Self::new(name, field_type)
        }
    }

    /// Create an `enum` field accepting `values`.
    pub fn enumeration<V: Into<Value>>(
        name: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self::new(name, FieldType::Enum).with_enum_values(values)
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn with_populate(mut self, rule: PopulateRule) -> Self {
        self.populate = Some(rule);
        self
    }

    pub fn with_enum_values<V: Into<Value>>(mut self, values: impl IntoIterator<Item = V>) -> Self {
        self.enum_values = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_transform<F>(mut self, f: F) -> Self
    where
        F: Fn(Value, Direction) -> Result<Value> + Send + Sync + 'static,
    {
        self.transform = Some(TransformFn::new(f));
        self
    }
}

/// Serializable field declaration, the data form of [`FieldSchema`].
///
/// Custom transforms cannot be declared as data; use [`FieldType::Custom`]
/// with a registered codec instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDef {
    pub name: String,
    #[serde(rename = "type", default = "untyped")]
    pub field_type: FieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub populate: Option<PopulateRule>,
    #[serde(default, rename = "enum", skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<serde_json::Value>,
}

fn untyped() -> FieldType {
    FieldType::Untyped
}

impl FieldDef {
    /// Convert the declaration into a field schema.
    pub fn into_schema(self) -> Result<FieldSchema> {
        if self.name.is_empty() {
            return Err(Error::InvalidModelDef("field name must not be empty".into()));
        }
        Ok(FieldSchema {
            name: self.name,
            field_type: self.field_type,
            default: self.default.map(Value::from),
            required: self.required,
            populate: self.populate,
            enum_values: self.enum_values.into_iter().map(Value::from).collect(),
            transform: None,
        })
    }
}
