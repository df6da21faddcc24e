//! Pure functions for converting values to and from their cached text form.
//!
//! Values are stored as JSON, with one exception: anything that serializes
//! to a JSON string is stored verbatim, without the surrounding quotes. A
//! `String` therefore round-trips byte-for-byte and the raw text read back
//! from any backend is directly usable.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::{CacheError, Result};

/// Serializes a value to the text stored in the cache.
///
/// # Arguments
/// * `value` - The value to serialize
///
/// # Returns
/// The string itself for string-like values, JSON text for everything else
pub fn encode_value<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let json = serde_json::to_string(value)?;
    if json.starts_with('"') {
        return Ok(serde_json::from_str::<String>(&json)?);
    }
    Ok(json)
}

/// Deserializes cached text into a value.
///
/// # Arguments
/// * `raw` - The stored text, or `None` on a miss
///
/// # Returns
/// `T::default()` when `raw` is absent or empty. Text that is valid JSON is
/// decoded as JSON; text that is not, or that `T` only accepts as a plain
/// string, reaches `T` verbatim. A JSON string literal is also handed over
/// verbatim first, so `"quoted"` stays quoted for string targets.
pub fn decode_value<T: DeserializeOwned + Default>(raw: Option<&str>) -> Result<T> {
    let Some(raw) = raw.filter(|r| !r.is_empty()) else {
        return Ok(T::default());
    };
    let verbatim = || T::deserialize(Value::String(raw.to_owned()));

    let decoded = match serde_json::from_str::<Value>(raw) {
        Err(_) => verbatim(),
        Ok(parsed @ Value::String(_)) => verbatim().or_else(|_| T::deserialize(parsed)),
        Ok(parsed) => T::deserialize(parsed).or_else(|e| verbatim().map_err(|_| e)),
    };
    decoded.map_err(|e| CacheError::Serialization(e.to_string()))
}

/// Deserializes a list of cached texts.
///
/// Every element goes through [`decode_value`], so empty elements become
/// `T::default()`.
pub fn decode_values<T: DeserializeOwned + Default>(raw: &[String]) -> Result<Vec<T>> {
    raw.iter().map(|r| decode_value(Some(r))).collect()
}

/// Decodes the members of a member/score list, keeping each score alongside.
pub fn decode_scored<T: DeserializeOwned + Default>(raw: Vec<(String, f64)>) -> Result<Vec<(T, f64)>> {
    raw.into_iter()
        .map(|(member, score)| Ok((decode_value(Some(&member))?, score)))
        .collect()
}
