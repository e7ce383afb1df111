//! Input fields derived from a template's JSON Schema.

use std::fmt;

use serde::Serialize;
use serde_json::Value;

/// Declared JSON Schema type of an input field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    Boolean,
    Integer,
    Number,
    String,
    /// Any other declared type (`array`, `object`, ...). Collected verbatim.
    Other(String),
}

impl FieldType {
    fn from_schema(value: Option<&Value>) -> Self {
        let name = match value {
            Some(Value::String(s)) => Some(s.as_str()),
            // `["string", "null"]` style declarations
            Some(Value::Array(types)) => types
                .iter()
                .filter_map(Value::as_str)
                .find(|t| *t != "null"),
            _ => None,
        };
        match name {
            Some("boolean") => Self::Boolean,
            Some("integer") => Self::Integer,
            Some("number") => Self::Number,
            Some("string") | None => Self::String,
            Some(other) => Self::Other(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Boolean => "boolean",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::String => "string",
            Self::Other(name) => name,
        }
    }
}

/// One named, typed input declared by a template's schema.
#[derive(Debug, Clone, PartialEq)]
pub struct InputField {
    pub name: String,
    pub field_type: FieldType,
    pub required: bool,
    pub title: Option<String>,
    pub description: Option<String>,
    pub enum_values: Option<Vec<String>>,
    pub default: Option<String>,
}

impl InputField {
    pub fn display_title(&self) -> &str {
        self.title
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(&self.name)
    }

    /// Describes the values the user may reply with.
    pub fn reply_hint(&self) -> String {
        if self.field_type == FieldType::Boolean {
            return "`true` or `false`.".to_string();
        }
        if let Some(values) = &self.enum_values {
            let shown: Vec<&str> = values
                .iter()
                .map(|v| if v.is_empty() { "\"\"" } else { v.as_str() })
                .collect();
            return format!("one of these values: {}. ", shown.join(", "));
        }
        format!("a {}.", self.field_type.name())
    }
}

/// Render a schema literal the way the user would type it.
fn literal_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// A default is only offered as a suggestion, so an empty one counts as none.
fn default_text(value: &Value) -> Option<String> {
    literal_text(value).filter(|text| !text.is_empty())
}

/// Parse the properties of an input schema into fields, in declaration order.
///
/// A field is required only if its name appears in the schema's `required` list.
pub fn parse_input_fields(schema: &Value) -> Vec<InputField> {
    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return Vec::new();
    };
    let required: Vec<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|names| names.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    properties
        .iter()
        .map(|(name, property)| InputField {
            name: name.clone(),
            field_type: FieldType::from_schema(property.get("type")),
            required: required.contains(&name.as_str()),
            title: property
                .get("title")
                .and_then(Value::as_str)
                .map(str::to_string),
            description: property
                .get("description")
                .and_then(Value::as_str)
                .map(str::to_string),
            enum_values: property
                .get("enum")
                .and_then(Value::as_array)
                .map(|values| values.iter().filter_map(literal_text).collect()),
            default: property.get("default").and_then(default_text),
        })
        .collect()
}

/// A validated answer for one field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Boolean(bool),
    Integer(i64),
    Number(f64),
    String(String),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean(b) => write!(f, "{}", b),
            Self::Integer(i) => write!(f, "{}", i),
            Self::Number(n) => write!(f, "{}", n),
            Self::String(s) => write!(f, "{}", s),
        }
    }
}

#[cfg(test)]
pub(crate) fn field(name: &str, field_type: FieldType, required: bool) -> InputField {
    InputField {
        name: name.to_string(),
        field_type,
        required,
        title: None,
        description: None,
        enum_values: None,
        default: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_keeps_declaration_order() {
        let schema = json!({
            "type": "object",
            "properties": {
                "zeta": { "type": "string" },
                "alpha": { "type": "integer" },
                "mid": { "type": "boolean" }
            }
        });
        let names: Vec<String> = parse_input_fields(&schema)
            .into_iter()
            .map(|f| f.name)
            .collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_required_follows_schema_membership() {
        let schema = json!({
            "properties": {
                "env": { "type": "string" },
                "replicas": { "type": "integer" }
            },
            "required": ["env"]
        });
        let fields = parse_input_fields(&schema);
        assert!(fields[0].required);
        assert!(!fields[1].required);
    }

    #[test]
    fn test_first_required_entry_is_still_required() {
        // Index 0 in the required list must not be treated as "absent".
        let schema = json!({
            "properties": { "a": {}, "b": {} },
            "required": ["a"]
        });
        let fields = parse_input_fields(&schema);
        assert!(fields[0].required);
        assert!(!fields[1].required);
    }

    #[test]
    fn test_enum_default_and_title() {
        let schema = json!({
            "properties": {
                "size": {
                    "type": "string",
                    "title": "VM Size",
                    "description": "Machine size",
                    "enum": ["small", "large", 3],
                    "default": "small"
                }
            }
        });
        let size = &parse_input_fields(&schema)[0];
        assert_eq!(size.display_title(), "VM Size");
        assert_eq!(size.description.as_deref(), Some("Machine size"));
        assert_eq!(
            size.enum_values,
            Some(vec!["small".to_string(), "large".to_string(), "3".to_string()])
        );
        assert_eq!(size.default.as_deref(), Some("small"));
    }

    #[test]
    fn test_empty_enum_entry_is_kept() {
        let schema = json!({
            "properties": {
                "suffix": { "type": "string", "enum": ["", "-dev"], "default": "" }
            }
        });
        let suffix = &parse_input_fields(&schema)[0];
        assert_eq!(
            suffix.enum_values,
            Some(vec![String::new(), "-dev".to_string()])
        );
        assert_eq!(suffix.default, None);
        assert_eq!(suffix.reply_hint(), "one of these values: \"\", -dev. ");
    }

    #[test]
    fn test_type_variants() {
        let schema = json!({
            "properties": {
                "a": { "type": ["integer", "null"] },
                "b": { "type": "number" },
                "c": { "type": "array" },
                "d": {}
            }
        });
        let types: Vec<FieldType> = parse_input_fields(&schema)
            .into_iter()
            .map(|f| f.field_type)
            .collect();
        assert_eq!(
            types,
            vec![
                FieldType::Integer,
                FieldType::Number,
                FieldType::Other("array".to_string()),
                FieldType::String
            ]
        );
    }

    #[test]
    fn test_no_properties_yields_no_fields() {
        assert!(parse_input_fields(&json!({ "type": "object" })).is_empty());
        assert!(parse_input_fields(&json!({ "properties": {} })).is_empty());
    }

    #[test]
    fn test_display_title_falls_back_to_name() {
        let f = field("replicas", FieldType::Integer, false);
        assert_eq!(f.display_title(), "replicas");
    }

    #[test]
    fn test_reply_hints() {
        let mut f = field("flag", FieldType::Boolean, false);
        assert_eq!(f.reply_hint(), "`true` or `false`.");

        f.field_type = FieldType::String;
        f.enum_values = Some(vec!["dev".to_string(), "prod".to_string()]);
        assert_eq!(f.reply_hint(), "one of these values: dev, prod. ");

        f.enum_values = None;
        f.field_type = FieldType::Integer;
        assert_eq!(f.reply_hint(), "a integer.");
    }

    #[test]
    fn test_field_values_serialize_untagged() {
        let values = json!([
            FieldValue::Boolean(true),
            FieldValue::Integer(3),
            FieldValue::Number(1.5),
            FieldValue::String("x".to_string())
        ]);
        assert_eq!(values, json!([true, 3, 1.5, "x"]));
    }
}
