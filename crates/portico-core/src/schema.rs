//! Declarative structural schemas and the validator that applies them.
//!
//! A [`Schema`] is a closed set of shapes (string, number, boolean, object,
//! array). [`validate`] walks a JSON value against a schema and returns every
//! [`Violation`] it finds, each tagged with a path such as `$.items[2].name`.
//!
//! ```
//! use portico_core::schema::{validate, Schema};
//! use serde_json::json;
//!
//! let schema = Schema::object([
//!     ("name", Schema::string().required()),
//!     ("age", Schema::number().minimum(0.0)),
//! ]);
//!
//! let violations = validate(&json!({"age": -1}), &schema);
//! let paths: Vec<_> = violations.iter().map(|v| v.path.as_str()).collect();
//! assert_eq!(paths, ["$.name", "$.age"]);
//! ```

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A structural schema.
///
/// Schemas are plain data and can be loaded from JSON:
///
/// ```json
/// {"type": "object", "properties": {"tags": {"type": "array", "items": {"type": "string"}}}}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Schema {
    /// A string with optional length bounds (in characters) and allowed values.
    String {
        /// Whether the property must be present.
        #[serde(default)]
        required: bool,
        /// Minimum length.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_length: Option<usize>,
        /// Maximum length.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_length: Option<usize>,
        /// Allowed values; empty means unrestricted.
        #[serde(default, rename = "enum", skip_serializing_if = "Vec::is_empty")]
        one_of: Vec<String>,
    },
    /// A finite number with optional inclusive bounds and allowed values.
    Number {
        /// Whether the property must be present.
        #[serde(default)]
        required: bool,
        /// Inclusive lower bound.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        minimum: Option<f64>,
        /// Inclusive upper bound.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        maximum: Option<f64>,
        /// Allowed values; empty means unrestricted.
        #[serde(default, rename = "enum", skip_serializing_if = "Vec::is_empty")]
        one_of: Vec<f64>,
    },
    /// A boolean.
    Boolean {
        /// Whether the property must be present.
        #[serde(default)]
        required: bool,
    },
    /// A mapping with named child schemas. Undeclared properties are allowed.
    Object {
        /// Whether the property must be present.
        #[serde(default)]
        required: bool,
        /// Declared properties, checked in declaration order.
        #[serde(default)]
        properties: IndexMap<String, Schema>,
    },
    /// A sequence whose elements all match `items`.
    Array {
        /// Whether the property must be present.
        #[serde(default)]
        required: bool,
        /// Schema for every element.
        items: Box<Schema>,
        /// Minimum element count.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_items: Option<usize>,
        /// Maximum element count.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_items: Option<usize>,
    },
}

impl Schema {
    /// An optional, unbounded string.
    #[must_use]
    pub fn string() -> Self {
        Self::String {
            required: false,
            min_length: None,
            max_length: None,
            one_of: Vec::new(),
        }
    }

    /// An optional, unbounded number.
    #[must_use]
    pub fn number() -> Self {
        Self::Number {
            required: false,
            minimum: None,
            maximum: None,
            one_of: Vec::new(),
        }
    }

    /// An optional boolean.
    #[must_use]
    pub fn boolean() -> Self {
        Self::Boolean { required: false }
    }

    /// An optional object with the given properties.
    pub fn object<'a>(properties: impl IntoIterator<Item = (&'a str, Schema)>) -> Self {
        Self::Object {
            required: false,
            properties: properties
                .into_iter()
                .map(|(name, schema)| (name.to_string(), schema))
                .collect(),
        }
    }

    /// An optional array of `items`.
    #[must_use]
    pub fn array(items: Schema) -> Self {
        Self::Array {
            required: false,
            items: Box::new(items),
            min_items: None,
            max_items: None,
        }
    }

    /// Marks the schema as required.
    #[must_use]
    pub fn required(mut self) -> Self {
        match &mut self {
            Self::String { required, .. }
            | Self::Number { required, .. }
            | Self::Boolean { required }
            | Self::Object { required, .. }
            | Self::Array { required, .. } => *required = true,
        }
        self
    }

    /// Sets the minimum string length. No effect on other shapes.
    #[must_use]
    pub fn min_length(mut self, len: usize) -> Self {
        if let Self::String { min_length, .. } = &mut self {
            *min_length = Some(len);
        }
        self
    }

    /// Sets the maximum string length. No effect on other shapes.
    #[must_use]
    pub fn max_length(mut self, len: usize) -> Self {
        if let Self::String { max_length, .. } = &mut self {
            *max_length = Some(len);
        }
        self
    }

    /// Sets the inclusive numeric lower bound. No effect on other shapes.
    #[must_use]
    pub fn minimum(mut self, value: f64) -> Self {
        if let Self::Number { minimum, .. } = &mut self {
            *minimum = Some(value);
        }
        self
    }

    /// Sets the inclusive numeric upper bound. No effect on other shapes.
    #[must_use]
    pub fn maximum(mut self, value: f64) -> Self {
        if let Self::Number { maximum, .. } = &mut self {
            *maximum = Some(value);
        }
        self
    }

    /// Restricts a string schema to the given values.
    #[must_use]
    pub fn one_of_strings<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Self::String { one_of, .. } = &mut self {
            *one_of = values.into_iter().map(Into::into).collect();
        }
        self
    }

    /// Restricts a number schema to the given values.
    #[must_use]
    pub fn one_of_numbers(mut self, values: impl IntoIterator<Item = f64>) -> Self {
        if let Self::Number { one_of, .. } = &mut self {
            *one_of = values.into_iter().collect();
        }
        self
    }

    /// Sets array length bounds. No effect on other shapes.
    #[must_use]
    pub fn items_between(mut self, min: Option<usize>, max: Option<usize>) -> Self {
        if let Self::Array {
            min_items,
            max_items,
            ..
        } = &mut self
        {
            *min_items = min;
            *max_items = max;
        }
        self
    }

    /// Adds or replaces a property on an object schema.
    #[must_use]
    pub fn property(mut self, name: impl Into<String>, schema: Schema) -> Self {
        if let Self::Object { properties, .. } = &mut self {
            properties.insert(name.into(), schema);
        }
        self
    }

    /// Returns whether the schema is marked required.
    #[must_use]
    pub const fn is_required(&self) -> bool {
        match self {
            Self::String { required, .. }
            | Self::Number { required, .. }
            | Self::Boolean { required }
            | Self::Object { required, .. }
            | Self::Array { required, .. } => *required,
        }
    }

    const fn kind(&self) -> &'static str {
        match self {
            Self::String { .. } => "string",
            Self::Number { .. } => "number",
            Self::Boolean { .. } => "boolean",
            Self::Object { .. } => "object",
            Self::Array { .. } => "array",
        }
    }
}

/// A single schema violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// Location of the offending value, rooted at `$`.
    pub path: String,
    /// What is wrong with it.
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Validates `value` against `schema`, collecting every violation.
///
/// An empty result means the value is valid. The root is always checked for
/// shape, regardless of its `required` flag.
#[must_use]
pub fn validate(value: &Value, schema: &Schema) -> Vec<Violation> {
    let mut violations = Vec::new();
    check(value, schema, "$", &mut violations);
    violations
}

fn check(value: &Value, schema: &Schema, path: &str, out: &mut Vec<Violation>) {
    let mut push = |message: String| {
        out.push(Violation {
            path: path.to_string(),
            message,
        });
    };

    match schema {
        Schema::String {
            min_length,
            max_length,
            one_of,
            ..
        } => {
            let Some(s) = value.as_str() else {
                return push(mismatch(schema, value));
            };
            let len = s.chars().count();
            if let Some(min) = min_length.filter(|min| len < *min) {
                push(format!("must be at least {min} characters, found {len}"));
            }
            if let Some(max) = max_length.filter(|max| len > *max) {
                push(format!("must be at most {max} characters, found {len}"));
            }
            if !one_of.is_empty() && !one_of.iter().any(|allowed| allowed == s) {
                push(format!("must be one of {one_of:?}, found {s:?}"));
            }
        }
        Schema::Number {
            minimum,
            maximum,
            one_of,
            ..
        } => {
            let Some(n) = value.as_f64() else {
                return push(mismatch(schema, value));
            };
            if !n.is_finite() {
                return push(format!("must be a finite number, found {n}"));
            }
            if let Some(min) = minimum.filter(|min| n < *min) {
                push(format!("must be at least {min}, found {n}"));
            }
            if let Some(max) = maximum.filter(|max| n > *max) {
                push(format!("must be at most {max}, found {n}"));
            }
            if !one_of.is_empty() && !one_of.iter().any(|allowed| *allowed == n) {
                push(format!("must be one of {one_of:?}, found {n}"));
            }
        }
        Schema::Boolean { .. } => {
            if !value.is_boolean() {
                push(mismatch(schema, value));
            }
        }
        Schema::Object { properties, .. } => {
            let Some(map) = value.as_object() else {
                return push(mismatch(schema, value));
            };
            for (name, child) in properties {
                let child_path = format!("{path}.{name}");
                match map.get(name) {
                    None | Some(Value::Null) => {
                        if child.is_required() {
                            out.push(Violation {
                                path: child_path,
                                message: "is required".to_string(),
                            });
                        }
                    }
                    Some(child_value) => check(child_value, child, &child_path, out),
                }
            }
        }
        Schema::Array {
            items,
            min_items,
            max_items,
            ..
        } => {
            let Some(elements) = value.as_array() else {
                return push(mismatch(schema, value));
            };
            let len = elements.len();
            if let Some(min) = min_items.filter(|min| len < *min) {
                push(format!("must contain at least {min} items, found {len}"));
            }
            if let Some(max) = max_items.filter(|max| len > *max) {
                push(format!("must contain at most {max} items, found {len}"));
            }
            for (idx, element) in elements.iter().enumerate() {
                check(element, items, &format!("{path}[{idx}]"), out);
            }
        }
    }
}

fn mismatch(schema: &Schema, value: &Value) -> String {
    format!("expected {}, found {}", schema.kind(), value_type_name(value))
}

fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
