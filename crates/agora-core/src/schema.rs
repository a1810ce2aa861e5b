//! Structured request-body schemas.
//!
//! A [`Schema`] describes the fields of a JSON object body. Validation walks
//! the body once and collects every problem as a [`FieldIssue`] (field path
//! plus human-readable reason) instead of stopping at the first one, so a
//! caller sees all offending fields in a single response.
//!
//! Issues render as `path: reason` and are joined with `", "`:
//!
//! ```text
//! serviceId: invalid UUID format, budget: must be greater than or equal to 0
//! ```
//!
//! Schemas are plain data and can be declared in configuration files:
//!
//! ```toml
//! [[endpoints.schema.fields]]
//! name = "serviceId"
//! type = "string"
//! format = "uuid"
//! ```
//!
//! # Example
//!
//! ```
//! use agora_core::schema::{FieldRule, Schema, StringFormat};
//! use serde_json::json;
//!
//! let schema = Schema::new()
//!     .field("email", FieldRule::string().format(StringFormat::Email))
//!     .optional_field("age", FieldRule::integer().min(18));
//!
//! let issues = schema.validate(&json!({ "email": "nope", "age": 12 })).unwrap_err();
//! assert_eq!(
//!     agora_core::FieldIssue::join(&issues),
//!     "email: invalid email format, age: must be greater than or equal to 18"
//! );
//! ```

use chrono::DateTime;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::OnceLock;
use uuid::Uuid;

/// One validation problem at a field path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldIssue {
    /// Dotted path to the field (`address.city`, `items.0`).
    pub path: String,
    /// Human-readable reason.
    pub message: String,
}

impl FieldIssue {
    /// Creates an issue.
    #[must_use]
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Renders issues as `path: reason` pairs joined by `", "`.
    #[must_use]
    pub fn join(issues: &[FieldIssue]) -> String {
        issues
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Schema for a JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// Declared fields, checked in order.
    #[serde(default)]
    pub fields: Vec<FieldSpec>,

    /// Whether fields not declared in the schema are accepted.
    #[serde(default = "default_true")]
    pub allow_unknown_fields: bool,
}

fn default_true() -> bool {
    true
}

impl Default for Schema {
    fn default() -> Self {
        Self::new()
    }
}

/// A named field and its rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Field name.
    pub name: String,

    /// Whether the field must be present and non-null.
    #[serde(default = "default_true")]
    pub required: bool,

    /// The rule values must satisfy.
    #[serde(flatten)]
    pub rule: FieldRule,
}

/// Well-known string formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StringFormat {
    /// `local@domain.tld`
    Email,
    /// Hyphenated or simple UUID.
    Uuid,
    /// Absolute `http`/`https` URL.
    Url,
    /// RFC 3339 timestamp.
    DateTime,
}

/// Rule for a single value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldRule {
    /// A string.
    String {
        /// Minimum length in characters.
        #[serde(default)]
        min_length: Option<usize>,
        /// Maximum length in characters.
        #[serde(default)]
        max_length: Option<usize>,
        /// Required format.
        #[serde(default)]
        format: Option<StringFormat>,
    },
    /// Any JSON number.
    Number {
        /// Inclusive lower bound.
        #[serde(default)]
        min: Option<f64>,
        /// Inclusive upper bound.
        #[serde(default)]
        max: Option<f64>,
    },
    /// A whole number.
    Integer {
        /// Inclusive lower bound.
        #[serde(default)]
        min: Option<i64>,
        /// Inclusive upper bound.
        #[serde(default)]
        max: Option<i64>,
    },
    /// `true` or `false`.
    Boolean,
    /// An array, optionally with an item rule.
    Array {
        /// Rule applied to every item.
        #[serde(default)]
        items: Option<Box<FieldRule>>,
        /// Minimum number of items.
        #[serde(default)]
        min_items: Option<usize>,
        /// Maximum number of items.
        #[serde(default)]
        max_items: Option<usize>,
    },
    /// A nested object.
    Object {
        /// Schema of the nested object.
        schema: Box<Schema>,
    },
    /// One of a fixed set of strings.
    Enum {
        /// Accepted values.
        values: Vec<String>,
    },
}

impl FieldRule {
    /// An unconstrained string rule.
    #[must_use]
    pub const fn string() -> Self {
        Self::String {
            min_length: None,
            max_length: None,
            format: None,
        }
    }

    /// An unconstrained number rule.
    #[must_use]
    pub const fn number() -> Self {
        Self::Number { min: None, max: None }
    }

    /// An unconstrained integer rule.
    #[must_use]
    pub const fn integer() -> Self {
        Self::Integer { min: None, max: None }
    }

    /// An array rule with items checked against `items`.
    #[must_use]
    pub fn array_of(items: FieldRule) -> Self {
        Self::Array {
            items: Some(Box::new(items)),
            min_items: None,
            max_items: None,
        }
    }

    /// A nested object rule.
    #[must_use]
    pub fn object(schema: Schema) -> Self {
        Self::Object {
            schema: Box::new(schema),
        }
    }

    /// An enumeration rule.
    #[must_use]
    pub fn one_of<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Enum {
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Sets the string format. No effect on other rules.
    #[must_use]
    pub fn format(mut self, value: StringFormat) -> Self {
        if let Self::String { format, .. } = &mut self {
            *format = Some(value);
        }
        self
    }

    /// Sets the minimum string length. No effect on other rules.
    #[must_use]
    pub fn min_length(mut self, value: usize) -> Self {
        if let Self::String { min_length, .. } = &mut self {
            *min_length = Some(value);
        }
        self
    }

    /// Sets the maximum string length. No effect on other rules.
    #[must_use]
    pub fn max_length(mut self, value: usize) -> Self {
        if let Self::String { max_length, .. } = &mut self {
            *max_length = Some(value);
        }
        self
    }

    /// Sets the inclusive lower bound of a number or integer rule,
    /// or the minimum item count of an array rule.
    #[must_use]
    pub fn min(mut self, value: i64) -> Self {
        match &mut self {
            Self::Number { min, .. } => *min = Some(value as f64),
            Self::Integer { min, .. } => *min = Some(value),
            Self::Array { min_items, .. } => *min_items = usize::try_from(value).ok(),
            _ => {}
        }
        self
    }

    /// Sets the inclusive upper bound of a number or integer rule,
    /// or the maximum item count of an array rule.
    #[must_use]
    pub fn max(mut self, value: i64) -> Self {
        match &mut self {
            Self::Number { max, .. } => *max = Some(value as f64),
            Self::Integer { max, .. } => *max = Some(value),
            Self::Array { max_items, .. } => *max_items = usize::try_from(value).ok(),
            _ => {}
        }
        self
    }

    fn type_name(&self) -> &'static str {
        match self {
            Self::String { .. } | Self::Enum { .. } => "string",
            Self::Number { .. } => "number",
            Self::Integer { .. } => "integer",
            Self::Boolean => "boolean",
            Self::Array { .. } => "array",
            Self::Object { .. } => "object",
        }
    }

    fn check(&self, path: &str, value: &Value, issues: &mut Vec<FieldIssue>) {
        match (self, value) {
            (
                Self::String {
                    min_length,
                    max_length,
                    format,
                },
                Value::String(s),
            ) => {
                let len = s.chars().count();
                if let Some(min) = min_length {
                    if len < *min {
                        issues.push(FieldIssue::new(
                            path,
                            format!("must contain at least {min} character(s)"),
                        ));
                        return;
                    }
                }
                if let Some(max) = max_length {
                    if len > *max {
                        issues.push(FieldIssue::new(
                            path,
                            format!("must contain at most {max} character(s)"),
                        ));
                        return;
                    }
                }
                if let Some(format) = format {
                    if let Some(reason) = check_format(*format, s) {
                        issues.push(FieldIssue::new(path, reason));
                    }
                }
            }
            (Self::Number { min, max }, Value::Number(n)) => {
                let Some(n) = n.as_f64() else {
                    issues.push(FieldIssue::new(path, "expected number"));
                    return;
                };
                check_bounds(path, n, *min, *max, issues);
            }
            (Self::Integer { min, max }, Value::Number(n)) => match n.as_i64() {
                Some(n) => check_bounds(path, n, *min, *max, issues),
                None => issues.push(FieldIssue::new(path, "expected integer, received float")),
            },
            (Self::Boolean, Value::Bool(_)) => {}
            (
                Self::Array {
                    items,
                    min_items,
                    max_items,
                },
                Value::Array(values),
            ) => {
                if let Some(min) = min_items {
                    if values.len() < *min {
                        issues.push(FieldIssue::new(
                            path,
                            format!("must contain at least {min} item(s)"),
                        ));
                    }
                }
                if let Some(max) = max_items {
                    if values.len() > *max {
                        issues.push(FieldIssue::new(
                            path,
                            format!("must contain at most {max} item(s)"),
                        ));
                    }
                }
                if let Some(rule) = items {
                    for (index, item) in values.iter().enumerate() {
                        rule.check(&join_path(path, &index.to_string()), item, issues);
                    }
                }
            }
            (Self::Object { schema }, Value::Object(_)) => schema.check_object(path, value, issues),
            (Self::Enum { values }, Value::String(s)) => {
                if !values.iter().any(|v| v == s) {
                    issues.push(FieldIssue::new(
                        path,
                        format!("must be one of: {}", values.join(", ")),
                    ));
                }
            }
            (rule, other) => issues.push(FieldIssue::new(
                path,
                format!("expected {}, received {}", rule.type_name(), json_type(other)),
            )),
        }
    }
}

impl Schema {
    /// Creates an empty schema that accepts unknown fields.
    #[must_use]
    pub fn new() -> Self {
        Self {
            fields: Vec::new(),
            allow_unknown_fields: true,
        }
    }

    /// Adds a required field.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, rule: FieldRule) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            required: true,
            rule,
        });
        self
    }

    /// Adds an optional field.
    #[must_use]
    pub fn optional_field(mut self, name: impl Into<String>, rule: FieldRule) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            required: false,
            rule,
        });
        self
    }

    /// Rejects fields that are not declared.
    #[must_use]
    pub fn strict(mut self) -> Self {
        self.allow_unknown_fields = false;
        self
    }

    /// Validates a JSON value against this schema.
    ///
    /// Returns every issue found, in field declaration order.
    pub fn validate(&self, value: &Value) -> Result<(), Vec<FieldIssue>> {
        let mut issues = Vec::new();
        self.check_object("", value, &mut issues);
        if issues.is_empty() {
            Ok(())
        } else {
            Err(issues)
        }
    }

    fn check_object(&self, prefix: &str, value: &Value, issues: &mut Vec<FieldIssue>) {
        let Value::Object(map) = value else {
            let path = if prefix.is_empty() { "body" } else { prefix };
            issues.push(FieldIssue::new(
                path,
                format!("expected object, received {}", json_type(value)),
            ));
            return;
        };

        for spec in &self.fields {
            let path = join_path(prefix, &spec.name);
            match map.get(&spec.name) {
                None | Some(Value::Null) => {
                    if spec.required {
                        issues.push(FieldIssue::new(path, "required"));
                    }
                }
                Some(field_value) => spec.rule.check(&path, field_value, issues),
            }
        }

        if !self.allow_unknown_fields {
            for key in map.keys() {
                if !self.fields.iter().any(|spec| &spec.name == key) {
                    issues.push(FieldIssue::new(join_path(prefix, key), "unrecognized field"));
                }
            }
        }
    }
}

fn check_bounds<T>(path: &str, n: T, min: Option<T>, max: Option<T>, issues: &mut Vec<FieldIssue>)
where
    T: PartialOrd + fmt::Display + Copy,
{
    if let Some(min) = min {
        if n < min {
            issues.push(FieldIssue::new(
                path,
                format!("must be greater than or equal to {min}"),
            ));
            return;
        }
    }
    if let Some(max) = max {
        if n > max {
            issues.push(FieldIssue::new(
                path,
                format!("must be less than or equal to {max}"),
            ));
        }
    }
}

fn check_format(format: StringFormat, value: &str) -> Option<&'static str> {
    let valid = match format {
        StringFormat::Email => email_pattern().is_match(value),
        StringFormat::Uuid => Uuid::parse_str(value).is_ok(),
        StringFormat::Url => url_pattern().is_match(value),
        StringFormat::DateTime => DateTime::parse_from_rfc3339(value).is_ok(),
    };
    if valid {
        return None;
    }
    Some(match format {
        StringFormat::Email => "invalid email format",
        StringFormat::Uuid => "invalid UUID format",
        StringFormat::Url => "invalid URL format",
        StringFormat::DateTime => "invalid datetime format",
    })
}

fn email_pattern() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| {
        Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid")
    })
}

fn url_pattern() -> &'static Regex {
    static URL: OnceLock<Regex> = OnceLock::new();
    URL.get_or_init(|| Regex::new(r"^https?://[^\s/?#]+[^\s]*$").expect("url pattern is valid"))
}

fn join_path(prefix: &str, segment: &str) -> String {
    if prefix.is_empty() {
        segment.to_string()
    } else {
        format!("{prefix}.{segment}")
    }
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

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn booking_schema() -> Schema {
        Schema::new()
            .field("serviceId", FieldRule::string().format(StringFormat::Uuid))
            .field("budget", FieldRule::number().min(0))
            .optional_field("notes", FieldRule::string().max_length(500))
    }

    #[test]
    fn test_valid_body_passes() {
        let body = json!({
            "serviceId": "6f1c2a4e-8d3b-4c5a-9e7f-1a2b3c4d5e6f",
            "budget": 120.5
        });
        assert!(booking_schema().validate(&body).is_ok());
    }

    #[test]
    fn test_reports_every_offending_field() {
        let body = json!({ "serviceId": "not-a-uuid", "budget": -5 });
        let issues = booking_schema().validate(&body).unwrap_err();

        assert_eq!(issues.len(), 2);
        assert_eq!(
            FieldIssue::join(&issues),
            "serviceId: invalid UUID format, budget: must be greater than or equal to 0"
        );
    }

    #[test]
    fn test_missing_and_null_required_fields() {
        let issues = booking_schema()
            .validate(&json!({ "serviceId": null }))
            .unwrap_err();
        assert_eq!(
            issues,
            vec![
                FieldIssue::new("serviceId", "required"),
                FieldIssue::new("budget", "required"),
            ]
        );
    }

    #[test]
    fn test_type_mismatch() {
        let issues = booking_schema()
            .validate(&json!({ "serviceId": 7, "budget": "cheap" }))
            .unwrap_err();
        assert_eq!(issues[0].message, "expected string, received number");
        assert_eq!(issues[1].message, "expected number, received string");
    }

    #[test]
    fn test_non_object_body() {
        let issues = booking_schema().validate(&json!([1, 2])).unwrap_err();
        assert_eq!(issues, vec![FieldIssue::new("body", "expected object, received array")]);
    }

    #[test]
    fn test_email_format() {
        let schema = Schema::new().field("email", FieldRule::string().format(StringFormat::Email));
        assert!(schema.validate(&json!({ "email": "ana@example.com" })).is_ok());

        let issues = schema.validate(&json!({ "email": "ana.example.com" })).unwrap_err();
        assert_eq!(FieldIssue::join(&issues), "email: invalid email format");
    }

    #[test]
    fn test_nested_paths() {
        let schema = Schema::new()
            .field(
                "address",
                FieldRule::object(Schema::new().field("city", FieldRule::string().min_length(2))),
            )
            .field("tags", FieldRule::array_of(FieldRule::one_of(["plumbing", "cleaning"])));

        let issues = schema
            .validate(&json!({ "address": { "city": "X" }, "tags": ["cleaning", "gardening"] }))
            .unwrap_err();

        assert_eq!(issues[0].path, "address.city");
        assert_eq!(issues[1].path, "tags.1");
        assert_eq!(issues[1].message, "must be one of: plumbing, cleaning");
    }

    #[test]
    fn test_integer_rule() {
        let schema = Schema::new().field("guests", FieldRule::integer().min(1).max(10));
        assert!(schema.validate(&json!({ "guests": 4 })).is_ok());
        assert_eq!(
            schema.validate(&json!({ "guests": 2.5 })).unwrap_err()[0].message,
            "expected integer, received float"
        );
        assert_eq!(
            schema.validate(&json!({ "guests": 11 })).unwrap_err()[0].message,
            "must be less than or equal to 10"
        );
    }

    #[test]
    fn test_strict_schema_rejects_unknown_fields() {
        let schema = Schema::new().field("rating", FieldRule::integer()).strict();
        let issues = schema.validate(&json!({ "rating": 5, "admin": true })).unwrap_err();
        assert_eq!(issues, vec![FieldIssue::new("admin", "unrecognized field")]);
    }

    #[test]
    fn test_schema_deserializes_from_json() {
        let schema: Schema = serde_json::from_value(json!({
            "fields": [
                { "name": "serviceId", "type": "string", "format": "uuid" },
                { "name": "budget", "type": "number", "min": 0.0 },
                { "name": "notes", "type": "string", "required": false }
            ]
        }))
        .unwrap();

        assert_eq!(schema, booking_schema_without_notes_limit());
    }

    proptest! {
        #[test]
        fn test_any_uuid_and_non_negative_budget_pass(
            id in any::<u128>(),
            budget in 0i64..1_000_000,
        ) {
            let service_id = uuid::Uuid::from_u128(id).to_string();
            let body = json!({ "serviceId": service_id, "budget": budget });
            prop_assert!(booking_schema().validate(&body).is_ok());
        }

        #[test]
        fn test_negative_budget_always_named(budget in i64::MIN / 2..0) {
            let body = json!({
                "serviceId": "6f1c2a4e-8d3b-4c5a-9e7f-1a2b3c4d5e6f",
                "budget": budget,
            });
            let issues = booking_schema().validate(&body).unwrap_err();
            prop_assert_eq!(issues.len(), 1);
            prop_assert_eq!(issues[0].path.as_str(), "budget");
        }
    }

    fn booking_schema_without_notes_limit() -> Schema {
        Schema::new()
            .field("serviceId", FieldRule::string().format(StringFormat::Uuid))
            .field("budget", FieldRule::number().min(0))
            .optional_field("notes", FieldRule::string())
    }
}
