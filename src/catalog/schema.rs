//! Tagged parameter schema for tool arguments
//!
//! Arguments are checked once against the schema when a call arrives; the
//! dispatcher then works with typed records only.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::{FmpError, Result};

/// JSON type of a tool parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
}

impl ParamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamKind::String => "string",
            ParamKind::Integer => "integer",
            ParamKind::Number => "number",
            ParamKind::Boolean => "boolean",
            ParamKind::Object => "object",
            ParamKind::Array => "array",
        }
    }

    /// Whether a JSON value is acceptable for this kind
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            ParamKind::String => value.is_string(),
            ParamKind::Integer => value.is_i64() || value.is_u64(),
            ParamKind::Number => value.is_number(),
            ParamKind::Boolean => value.is_boolean(),
            ParamKind::Object => value.is_object(),
            ParamKind::Array => value.is_array(),
        }
    }
}

/// One declared tool parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamKind,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    pub description: String,
    /// Allowed string values, when restricted
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<String>,
}

impl ParamSpec {
    pub fn new(name: &str, kind: ParamKind, description: &str) -> Self {
        Self {
            name: name.to_string(),
            kind,
            required: false,
            default: None,
            description: description.to_string(),
            choices: Vec::new(),
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_choices(mut self, choices: &[&str]) -> Self {
        self.choices = choices.iter().map(|c| c.to_string()).collect();
        self
    }
}

/// Render a parameter list as a JSON Schema object
pub fn input_schema(params: &[ParamSpec]) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();
    for spec in params {
        let mut prop = Map::new();
        prop.insert("type".into(), json!(spec.kind.as_str()));
        if !spec.description.is_empty() {
            prop.insert("description".into(), json!(spec.description));
        }
        if let Some(default) = &spec.default {
            prop.insert("default".into(), default.clone());
        }
        if !spec.choices.is_empty() {
            prop.insert("enum".into(), json!(spec.choices));
        }
        properties.insert(spec.name.clone(), Value::Object(prop));
        if spec.required {
            required.push(spec.name.clone());
        }
    }

    let mut schema = Map::new();
    schema.insert("type".into(), json!("object"));
    schema.insert("properties".into(), Value::Object(properties));
    if !required.is_empty() {
        schema.insert("required".into(), json!(required));
    }
    Value::Object(schema)
}

/// Check arguments against the schema and fill in defaults
///
/// Undeclared arguments are kept; tools decide what to do with them.
pub fn validate(params: &[ParamSpec], arguments: &Value) -> Result<Map<String, Value>> {
    let mut args = match arguments {
        Value::Null => Map::new(),
        Value::Object(map) => map.clone(),
        other => {
            return Err(FmpError::InvalidParams(format!(
                "arguments must be an object, got {}",
                json_type(other)
            )))
        }
    };

    for spec in params {
        match args.get(&spec.name) {
            None | Some(Value::Null) => {
                if spec.required {
                    return Err(FmpError::InvalidParams(format!(
                        "missing required argument: {}",
                        spec.name
                    )));
                }
                if let Some(default) = &spec.default {
                    args.insert(spec.name.clone(), default.clone());
                }
            }
            Some(value) => {
                if !spec.kind.accepts(value) {
                    return Err(FmpError::InvalidParams(format!(
                        "argument {} must be {}, got {}",
                        spec.name,
                        spec.kind.as_str(),
                        json_type(value)
                    )));
                }
                if spec.required && value.as_str().is_some_and(|s| s.trim().is_empty()) {
                    return Err(FmpError::InvalidParams(format!(
                        "argument {} must not be empty",
                        spec.name
                    )));
                }
                if !spec.choices.is_empty() {
                    let matches = value
                        .as_str()
                        .is_some_and(|s| spec.choices.iter().any(|c| c.eq_ignore_ascii_case(s)));
                    if !matches {
                        return Err(FmpError::InvalidParams(format!(
                            "argument {} must be one of: {}",
                            spec.name,
                            spec.choices.join(", ")
                        )));
                    }
                }
            }
        }
    }

    Ok(args)
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
