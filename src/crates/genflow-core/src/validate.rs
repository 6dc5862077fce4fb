//! Response validation - deciding between accept and retry
//!
//! The [`Validator`] takes whatever a generator produced and either returns a
//! clean structured payload or a [`ValidationError`] explaining what was
//! wrong. The explanation is not just for logs: the workflow forwards it to
//! the next attempt so the model can correct itself.
//!
//! # Pipeline
//!
//! ```text
//! RawResponse
//!    │
//!    ├─ Fault(msg)        → Err(Fault)
//!    ├─ Structured(value) ─────────────────────┐
//!    └─ Text(text)                              │
//!         │ trim, reject empty                  │
//!         │ strip wrapper markers (```json …```)│
//!         │ parse JSON (fallback: plain text if the
//!         │ schema accepts it, else first {…} span)
//!         ▼                                     ▼
//!    shape check: object? required fields? primitive types? non-empty?
//!         ▼
//!    JSON Schema document (feature `json-validation`)
//!         ▼
//!    caller predicate (e.g. "articles is non-empty")
//!         ▼
//!    Ok(payload)
//! ```
//!
//! # Declaring a Schema
//!
//! ```rust
//! use genflow_core::generator::RawResponse;
//! use genflow_core::validate::{FieldKind, Schema, Validator};
//!
//! let schema = Schema::object()
//!     .required("reasoning", FieldKind::String)
//!     .non_empty("code", FieldKind::String)
//!     .required("instructions", FieldKind::String);
//!
//! let validator = Validator::new(schema);
//! let raw = RawResponse::Text(
//!     "```json\n{\"reasoning\": \"r\", \"code\": \"<html/>\", \"instructions\": \"play\"}\n```".into(),
//! );
//! let payload = validator.validate(&raw).unwrap();
//! assert_eq!(payload["code"], "<html/>");
//! ```
//!
//! Schemas are plain serde types, so they can also live in YAML or JSON
//! files:
//!
//! ```yaml
//! name: search_results
//! fields:
//!   - name: articles
//!     type: array
//!     non_empty: true
//! ```

use crate::error::{Result, ValidationError, WorkflowError};
use crate::generator::RawResponse;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Primitive kind a field must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    /// JSON string
    String,
    /// Any JSON number
    Number,
    /// Whole JSON number
    Integer,
    /// JSON boolean
    Boolean,
    /// JSON array
    Array,
    /// JSON object
    Object,
    /// Anything except null
    #[default]
    Any,
}

impl FieldKind {
    /// Whether `value` has this kind.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            FieldKind::String => value.is_string(),
            FieldKind::Number => value.is_number(),
            FieldKind::Integer => value.is_i64() || value.is_u64(),
            FieldKind::Boolean => value.is_boolean(),
            FieldKind::Array => value.is_array(),
            FieldKind::Object => value.is_object(),
            FieldKind::Any => !value.is_null(),
        }
    }

    /// Name used in error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Number => "number",
            FieldKind::Integer => "integer",
            FieldKind::Boolean => "boolean",
            FieldKind::Array => "array",
            FieldKind::Object => "object",
            FieldKind::Any => "any",
        }
    }
}

/// One expected field of an object payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Field name
    pub name: String,

    /// Expected kind
    #[serde(rename = "type", default)]
    pub kind: FieldKind,

    /// Whether the field must be present (and non-null)
    #[serde(default = "default_required")]
    pub required: bool,

    /// Reject empty strings, arrays and objects
    #[serde(default)]
    pub non_empty: bool,
}

fn default_required() -> bool {
    true
}

/// Expected shape of an accepted payload.
///
/// An empty schema (no fields, no JSON Schema) accepts any non-null JSON
/// value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// Optional label used in logs
    #[serde(default)]
    pub name: Option<String>,

    /// Expected object fields
    #[serde(default)]
    pub fields: Vec<FieldSpec>,

    /// Full JSON Schema document, enforced with the `json-validation` feature
    #[serde(default)]
    pub json_schema: Option<Value>,

    /// Accept non-JSON text as a string payload (free-form writers)
    #[serde(default)]
    pub accept_plain_text: bool,
}

impl Schema {
    /// Schema for an object payload; add fields with the builder methods.
    pub fn object() -> Self {
        Self::default()
    }

    /// Schema accepting free-form text as well as JSON.
    pub fn plain_text() -> Self {
        Self {
            accept_plain_text: true,
            ..Self::default()
        }
    }

    /// Set the schema label.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Add a required field.
    pub fn required(self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.field(name, kind, true, false)
    }

    /// Add an optional field; when present it must still have `kind`.
    pub fn optional(self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.field(name, kind, false, false)
    }

    /// Add a required field that must not be empty.
    pub fn non_empty(self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.field(name, kind, true, true)
    }

    /// Attach a JSON Schema document.
    pub fn with_json_schema(mut self, schema: Value) -> Self {
        self.json_schema = Some(schema);
        self
    }

    fn field(mut self, name: impl Into<String>, kind: FieldKind, required: bool, non_empty: bool) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            kind,
            required,
            non_empty,
        });
        self
    }

    /// Parse a schema from YAML.
    pub fn from_yaml_str(source: &str) -> Result<Self> {
        serde_yaml::from_str(source).map_err(|e| WorkflowError::SchemaParse(e.to_string()))
    }

    /// Parse a schema from JSON.
    pub fn from_json_str(source: &str) -> Result<Self> {
        serde_json::from_str(source).map_err(|e| WorkflowError::SchemaParse(e.to_string()))
    }

    /// Label for logs.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("payload")
    }
}

/// Caller-supplied semantic check run after the structural one.
pub type Predicate = Arc<dyn Fn(&Value) -> std::result::Result<(), String> + Send + Sync>;

/// Checks raw responses against a [`Schema`] and an optional predicate.
#[derive(Clone)]
pub struct Validator {
    schema: Schema,
    predicate: Option<Predicate>,
    extra_markers: Vec<(String, String)>,
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Validator")
            .field("schema", &self.schema)
            .field("predicate", &self.predicate.is_some())
            .field("extra_markers", &self.extra_markers)
            .finish()
    }
}

impl Validator {
    /// Create a validator for `schema`.
    pub fn new(schema: Schema) -> Self {
        Self {
            schema,
            predicate: None,
            extra_markers: Vec::new(),
        }
    }

    /// Add a semantic predicate, e.g. "list of articles is non-empty".
    pub fn with_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Value) -> std::result::Result<(), String> + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    /// Add an opening/closing wrapper pair to strip besides Markdown fences.
    pub fn with_wrapper_marker(mut self, open: impl Into<String>, close: impl Into<String>) -> Self {
        self.extra_markers.push((open.into(), close.into()));
        self
    }

    /// The schema being enforced.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Validate a raw response.
    pub fn validate(&self, raw: &RawResponse) -> std::result::Result<Value, ValidationError> {
        let value = match raw {
            RawResponse::Fault(msg) => return Err(ValidationError::Fault(msg.clone())),
            RawResponse::Structured(Value::String(text)) => self.parse_text(text)?,
            RawResponse::Structured(value) => value.clone(),
            RawResponse::Text(text) => self.parse_text(text)?,
        };

        check_shape(&value, &self.schema)?;

        if let Some(predicate) = &self.predicate {
            predicate(&value).map_err(ValidationError::Predicate)?;
        }

        Ok(value)
    }

    fn parse_text(&self, text: &str) -> std::result::Result<Value, ValidationError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::Empty);
        }

        let stripped = strip_wrappers(trimmed, &self.extra_markers);
        if stripped.is_empty() {
            return Err(ValidationError::Empty);
        }

        match serde_json::from_str::<Value>(stripped) {
            Ok(value) => Ok(value),
            // Free-form text is the payload itself; objects quoted inside it are not.
            Err(_) if self.schema.accept_plain_text => Ok(Value::String(stripped.to_string())),
            Err(err) => extract_object_span(stripped).ok_or_else(|| ValidationError::Unparseable(err.to_string())),
        }
    }
}

/// Validate `raw` against `schema` without a predicate.
pub fn validate(raw: &RawResponse, schema: &Schema) -> std::result::Result<Value, ValidationError> {
    Validator::new(schema.clone()).validate(raw)
}

fn fence_regex() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| {
        Regex::new(r"(?s)^```[\w+-]*[ \t]*\r?\n?(.*?)\s*```$").expect("fence pattern is valid")
    })
}

/// Remove surrounding Markdown code fences and caller-declared markers.
///
/// Only the outermost wrapper is removed; fences inside the payload (for
/// example inside generated code) are left alone.
pub fn strip_wrappers<'a>(text: &'a str, extra_markers: &[(String, String)]) -> &'a str {
    let mut current = text.trim();

    if let Some(captures) = fence_regex().captures(current) {
        if let Some(inner) = captures.get(1) {
            current = inner.as_str().trim();
        }
    } else if let Some(rest) = current.strip_prefix("```") {
        // Unterminated fence: drop the opening line only.
        current = rest.split_once('\n').map(|(_, body)| body).unwrap_or("").trim();
    }

    for (open, close) in extra_markers {
        if let Some(inner) = current
            .strip_prefix(open.as_str())
            .and_then(|rest| rest.strip_suffix(close.as_str()))
        {
            current = inner.trim();
        }
    }

    current
}

fn extract_object_span(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<Value>(&text[start..=end])
        .ok()
        .filter(Value::is_object)
}

/// JSON type name used in error messages.
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Null => true,
        _ => false,
    }
}

fn check_shape(value: &Value, schema: &Schema) -> std::result::Result<(), ValidationError> {
    if value.is_null() {
        return Err(ValidationError::Empty);
    }

    if !schema.fields.is_empty() {
        let object = value.as_object().ok_or_else(|| ValidationError::WrongShape {
            found: type_name(value).to_string(),
        })?;

        for field in &schema.fields {
            match object.get(&field.name) {
                None | Some(Value::Null) => {
                    if field.required {
                        return Err(ValidationError::MissingField(field.name.clone()));
                    }
                }
                Some(found) => {
                    if !field.kind.matches(found) {
                        return Err(ValidationError::WrongType {
                            field: field.name.clone(),
                            expected: field.kind.as_str().to_string(),
                            found: type_name(found).to_string(),
                        });
                    }
                    if field.non_empty && is_empty_value(found) {
                        return Err(ValidationError::EmptyField(field.name.clone()));
                    }
                }
            }
        }
    }

    if let Some(json_schema) = &schema.json_schema {
        check_json_schema(value, json_schema)?;
    }

    Ok(())
}

#[cfg(feature = "json-validation")]
fn check_json_schema(value: &Value, schema: &Value) -> std::result::Result<(), ValidationError> {
    use jsonschema::JSONSchema;

    let compiled = JSONSchema::compile(schema).map_err(|e| {
        tracing::error!(error = %e, "Failed to compile JSON Schema for output validation");
        ValidationError::Schema(format!("invalid schema document: {}", e))
    })?;

    let messages = match compiled.validate(value) {
        Ok(()) => None,
        Err(errors) => Some(
            errors
                .map(|e| format!("{}: {}", e.instance_path, e))
                .collect::<Vec<String>>(),
        ),
    };

    match messages {
        Some(messages) => Err(ValidationError::Schema(messages.join("; "))),
        None => Ok(()),
    }
}

#[cfg(not(feature = "json-validation"))]
fn check_json_schema(value: &Value, schema: &Value) -> std::result::Result<(), ValidationError> {
    tracing::debug!("JSON Schema document checked for type and required keys only (enable 'json-validation' for full validation)");

    if let Some(expected) = schema["type"].as_str() {
        let ok = match expected {
            "object" => value.is_object(),
            "string" => value.is_string(),
            "number" => value.is_number(),
            "integer" => value.is_i64() || value.is_u64(),
            "boolean" => value.is_boolean(),
            "array" => value.is_array(),
            _ => true,
        };
        if !ok {
            return Err(ValidationError::Schema(format!(
                "expected {} but got {}",
                expected,
                type_name(value)
            )));
        }
    }

    if let (Some(required), Some(object)) = (schema["required"].as_array(), value.as_object()) {
        for key in required.iter().filter_map(Value::as_str) {
            if !object.contains_key(key) {
                return Err(ValidationError::Schema(format!("missing required property '{}'", key)));
            }
        }
    }

    Ok(())
}
