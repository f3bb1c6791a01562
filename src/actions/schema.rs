//! Data-driven argument validation built from a JSON-Schema object.
//!
//! Only the top level of the schema is enforced: each property maps to a
//! [`FieldSpec`] with a primitive [`FieldType`]. Nested schemas are accepted
//! as-is.

use log::debug;
use serde_json::{Map, Number, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Number,
    Integer,
    String,
    Boolean,
    Array,
    Object,
    /// Missing or unrecognized `type`; any value is accepted.
    Any,
}

impl FieldType {
    /// Map a JSON-Schema `type` keyword. Union types such as
    /// `["number", "null"]` resolve to their first non-null member.
    #[must_use]
    pub fn from_schema(type_keyword: Option<&Value>) -> Self {
        let name = match type_keyword {
            Some(Value::String(name)) => Some(name.as_str()),
            Some(Value::Array(names)) => names
                .iter()
                .filter_map(Value::as_str)
                .find(|name| *name != "null"),
            _ => None,
        };
        match name {
            Some("number") => Self::Number,
            Some("integer") => Self::Integer,
            Some("string") => Self::String,
            Some("boolean") => Self::Boolean,
            Some("array") => Self::Array,
            Some("object") => Self::Object,
            _ => Self::Any,
        }
    }

    const fn name(self) -> &'static str {
        match self {
            Self::Number => "number",
            Self::Integer => "integer",
            Self::String => "string",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
            Self::Any => "any",
        }
    }

    /// Coerce a value to this type the way a lax model validator would.
    fn coerce(self, value: Value) -> Option<Value> {
        match (self, value) {
            (Self::Any, v) => Some(v),
            (Self::Number, v @ Value::Number(_)) => Some(v),
            (Self::Number, Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number),
            (Self::Integer, Value::Number(n)) => integer_from_number(&n),
            (Self::Integer, Value::String(s)) => {
                s.trim().parse::<i64>().ok().map(|i| Value::Number(i.into()))
            }
            (Self::Boolean, v @ Value::Bool(_)) => Some(v),
            (Self::Boolean, Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                _ => None,
            },
            (Self::String, v @ Value::String(_))
            | (Self::Array, v @ Value::Array(_))
            | (Self::Object, v @ Value::Object(_)) => Some(v),
            _ => None,
        }
    }
}

fn integer_from_number(n: &Number) -> Option<Value> {
    if n.is_i64() || n.is_u64() {
        return Some(Value::Number(n.clone()));
    }
    let f = n.as_f64()?;
    #[allow(clippy::cast_possible_truncation)]
    let truncated = f as i64;
    #[allow(clippy::cast_precision_loss)]
    let exact = f.fract() == 0.0 && truncated as f64 == f;
    exact.then(|| Value::Number(truncated.into()))
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub field_type: FieldType,
    pub required: bool,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArgumentSchema {
    fields: Vec<FieldSpec>,
}

impl ArgumentSchema {
    /// Build from a JSON-Schema object. Missing `properties`, `required`
    /// or `type` keywords are tolerated. Required names that have no
    /// property entry become untyped required fields.
    #[must_use]
    pub fn from_json_schema(schema: &Value) -> Self {
        let required: Vec<&str> = schema
            .get("required")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let mut fields: Vec<FieldSpec> = schema
            .get("properties")
            .and_then(Value::as_object)
            .map(|properties| {
                properties
                    .iter()
                    .map(|(name, spec)| FieldSpec {
                        name: name.clone(),
                        field_type: FieldType::from_schema(spec.get("type")),
                        required: required.contains(&name.as_str()),
                        description: spec
                            .get("description")
                            .and_then(Value::as_str)
                            .map(str::to_owned),
                    })
                    .collect()
            })
            .unwrap_or_default();

        for name in required {
            if !fields.iter().any(|f| f.name == name) {
                fields.push(FieldSpec {
                    name: name.to_owned(),
                    field_type: FieldType::Any,
                    required: true,
                    description: None,
                });
            }
        }

        Self { fields }
    }

    #[must_use]
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Validate and coerce arguments, returning the object to send.
    ///
    /// Output fields follow schema order. Absent optional fields and
    /// `null` optionals are omitted; unknown fields are dropped.
    ///
    /// # Errors
    ///
    /// Returns a human-readable reason when the arguments are not an
    /// object, a required field is missing, or a value cannot be coerced.
    pub fn validate(&self, arguments: &Value) -> Result<Map<String, Value>, String> {
        let empty = Map::new();
        let supplied = match arguments {
            Value::Object(map) => map,
            Value::Null => &empty,
            other => return Err(format!("expected an object, got {}", json_type(other))),
        };

        let mut validated = Map::new();
        for field in &self.fields {
            match supplied.get(&field.name) {
                None | Some(Value::Null) if field.required => {
                    return Err(format!("missing required field '{}'", field.name));
                }
                None | Some(Value::Null) => {}
                Some(value) => {
                    let coerced = field.field_type.coerce(value.clone()).ok_or_else(|| {
                        format!(
                            "field '{}' expected {}, got {}",
                            field.name,
                            field.field_type.name(),
                            json_type(value)
                        )
                    })?;
                    validated.insert(field.name.clone(), coerced);
                }
            }
        }

        for name in supplied.keys() {
            if self.field(name).is_none() {
                debug!("dropping undeclared argument '{name}'");
            }
        }

        Ok(validated)
    }
}

const fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
