use serde_json::Value;

use crate::error::StoreError;

/// Width of the `id char(50)` primary key column.
pub const MAX_ID_LEN: usize = 50;

/// Extract the storable id from a document.
///
/// Documents are schema-less JSON objects; the only field this crate cares
/// about is a non-empty string `id` that fits the key column.
///
/// # Errors
/// Returns `StoreError::InvalidDocument` if the document is not an object, or
/// its `id` is missing, not a string, empty, or longer than [`MAX_ID_LEN`].
pub fn document_id(document: &Value) -> Result<&str, StoreError> {
    let object = document.as_object().ok_or_else(|| {
        StoreError::InvalidDocument(format!("expected a JSON object, got {}", kind_of(document)))
    })?;
    let id = match object.get("id") {
        Some(Value::String(id)) => id.as_str(),
        Some(other) => {
            return Err(StoreError::InvalidDocument(format!(
                "id must be a string, got {}",
                kind_of(other)
            )));
        }
        None => return Err(StoreError::InvalidDocument("id is missing".to_string())),
    };
    validate_id(id)?;
    Ok(id)
}

/// # Errors
/// Returns `StoreError::InvalidDocument` if `id` is empty or too long for the key column.
pub fn validate_id(id: &str) -> Result<(), StoreError> {
    if id.is_empty() {
        return Err(StoreError::InvalidDocument("id is empty".to_string()));
    }
    let len = id.chars().count();
    if len > MAX_ID_LEN {
        return Err(StoreError::InvalidDocument(format!(
            "id is {len} characters, at most {MAX_ID_LEN} fit"
        )));
    }
    Ok(())
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
