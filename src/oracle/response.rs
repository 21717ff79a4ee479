//! Autocomplete response bodies.

use serde_json::Value;

use super::OracleError;

/// Keys that may hold the suggestion list, in lookup order.
pub const RESULT_KEYS: &[&str] = &["results", "suggestions"];

/// Extract the suggestion list from a JSON body.
///
/// Uses `results` when present, otherwise `suggestions`. Non-string entries
/// are skipped.
pub fn parse_suggestions(body: &Value) -> Result<Vec<String>, OracleError> {
    let list = RESULT_KEYS
        .iter()
        .find_map(|key| body.get(*key))
        .and_then(Value::as_array)
        .ok_or(OracleError::UnexpectedShape)?;

    Ok(list
        .iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect())
}
