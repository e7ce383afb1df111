//! Validation and coercion of user replies for template input fields.

use thiserror::Error;

use crate::fields::{FieldType, FieldValue, InputField};

/// Replies that count as "yes" (compared case-insensitively after trimming).
const AFFIRMATIVE_REPLIES: &[&str] = &["yes", "true", "y", "t", "1"];

/// A reply that could not be used for the current field.
///
/// The display text is shown to the user as-is before the field is asked again.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FieldInputError {
    #[error(
        "I'm sorry, I didn't understand \"{value}.\" I need a {expected} value for **{title}**. Please try again.\n\n"
    )]
    NotANumber {
        value: String,
        expected: String,
        title: String,
    },
    #[error("I'm sorry \"{value}\" isn't a valid value for **{title}**. Please try again.\n\n")]
    NotAllowed { value: String, title: String },
}

/// Interpret a reply as yes/no. Anything not recognised as "yes" is "no".
pub fn is_affirmative(reply: &str) -> bool {
    let normalized = reply.trim().to_lowercase();
    AFFIRMATIVE_REPLIES.contains(&normalized.as_str())
}

fn not_a_number(field: &InputField, raw: &str) -> FieldInputError {
    FieldInputError::NotANumber {
        value: raw.to_string(),
        expected: field.field_type.name().to_string(),
        title: field.display_title().to_string(),
    }
}

/// Check a string reply against the field's enumerated values (case-sensitive).
fn check_allowed(field: &InputField, raw: &str) -> Result<(), FieldInputError> {
    match &field.enum_values {
        Some(values) if !values.iter().any(|v| v == raw) => Err(FieldInputError::NotAllowed {
            value: raw.to_string(),
            title: field.display_title().to_string(),
        }),
        _ => Ok(()),
    }
}

/// Coerce a raw reply into a typed value for `field`.
pub fn coerce_field_value(field: &InputField, raw: &str) -> Result<FieldValue, FieldInputError> {
    match field.field_type {
        FieldType::Boolean => Ok(FieldValue::Boolean(is_affirmative(raw))),
        FieldType::Integer => raw
            .trim()
            .parse::<i64>()
            .map(FieldValue::Integer)
            .map_err(|_| not_a_number(field, raw)),
        FieldType::Number => match raw.trim().parse::<f64>() {
            Ok(n) if n.is_finite() => Ok(FieldValue::Number(n)),
            _ => Err(not_a_number(field, raw)),
        },
        FieldType::String | FieldType::Other(_) => {
            check_allowed(field, raw)?;
            Ok(FieldValue::String(raw.to_string()))
        }
    }
}
