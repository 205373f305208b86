//! Declarative field schema
//!
//! A class's fields are edited locally in `fields.yaml`, a YAML list of field
//! descriptors. The file is parsed from text on every sync; nothing is cached
//! between passes.
//!
//! ```yaml
//! - identifier: codigo
//!   type: string
//!   label: Código
//!   required: true
//! - identifier: valor
//!   type: number
//!   precision: 2
//! ```
//!
//! Keys other than `identifier`, `type`, `label` and `required` are carried
//! through to the remote field unchanged.

use std::collections::{BTreeMap, HashSet};
use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::DomainError;
use super::manifest::element_identifier;
use super::newtypes::Identifier;

/// File name of the field schema inside a class folder
pub const FIELD_SCHEMA_FILE: &str = "fields.yaml";

/// Value type of a field
///
/// Types the platform adds later are kept verbatim in [`FieldType::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Integer,
    Boolean,
    Date,
    Datetime,
    Object,
    Array,
    Reference,
    #[serde(untagged)]
    Other(String),
}

impl Display for FieldType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Integer => "integer",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::Datetime => "datetime",
            FieldType::Object => "object",
            FieldType::Array => "array",
            FieldType::Reference => "reference",
            FieldType::Other(name) => name,
        };
        f.write_str(name)
    }
}

/// One field as declared in `fields.yaml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub identifier: Identifier,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl FieldDescriptor {
    /// The field as the remote stores it
    #[must_use]
    pub fn to_remote(&self) -> Value {
        // Serializing a plain struct with string keys cannot fail.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Parsed content of a `fields.yaml` file
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FieldSchema {
    fields: Vec<FieldDescriptor>,
}

impl FieldSchema {
    /// Parses and validates schema text
    ///
    /// An empty (or whitespace/comment only) document is an empty schema.
    ///
    /// # Errors
    /// Returns [`DomainError::InvalidFieldSchema`] when the YAML is malformed,
    /// a field has an unknown type or an invalid identifier, or an identifier
    /// is declared twice.
    pub fn parse(text: &str) -> Result<Self, DomainError> {
        let document: Option<Vec<FieldDescriptor>> = serde_yaml::from_str(text)
            .map_err(|e| DomainError::InvalidFieldSchema(e.to_string()))?;
        let fields = document.unwrap_or_default();

        let mut seen = HashSet::new();
        for field in &fields {
            if !seen.insert(field.identifier.clone()) {
                return Err(DomainError::InvalidFieldSchema(format!(
                    "duplicate field identifier '{}'",
                    field.identifier
                )));
            }
        }

        Ok(Self { fields })
    }

    /// Renders remote fields as schema text
    ///
    /// System-reserved fields are left out: they stay remote-owned unless the
    /// developer declares an override by hand.
    ///
    /// # Errors
    /// Returns error if a remote field cannot be expressed as a descriptor
    pub fn render_remote(fields: &[Value]) -> Result<String, DomainError> {
        let descriptors = fields
            .iter()
            .filter(|f| !element_identifier(f).is_some_and(|id| id.starts_with(Identifier::SYSTEM_PREFIX)))
            .map(|f| {
                serde_json::from_value::<FieldDescriptor>(f.clone())
                    .map_err(|e| DomainError::InvalidFieldSchema(format!("remote field: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        if descriptors.is_empty() {
            return Ok(String::new());
        }
        serde_yaml::to_string(&descriptors).map_err(|e| DomainError::InvalidFieldSchema(e.to_string()))
    }

    /// Declared fields, in file order
    #[must_use]
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Number of declared fields
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if no field is declared
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
