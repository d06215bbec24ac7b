use rmpv::Value;
use serde::Serialize;

use crate::Result;

/// Agent maps may key by str or raw bytes depending on its codec version.
pub(crate) fn key_matches(key: &Value, name: &str) -> bool {
    match key {
        Value::String(key) => key.as_bytes() == name.as_bytes(),
        Value::Binary(key) => key.as_slice() == name.as_bytes(),
        _ => false,
    }
}

pub(crate) fn map_get<'a>(value: &'a Value, name: &str) -> Option<&'a Value> {
    value
        .as_map()?
        .iter()
        .find(|(key, _)| key_matches(key, name))
        .map(|(_, value)| value)
}

/// Raw bytes of a str or bin value.
pub(crate) fn as_bytes(value: &Value) -> Option<&[u8]> {
    match value {
        Value::String(value) => Some(value.as_bytes()),
        Value::Binary(value) => Some(value.as_slice()),
        _ => None,
    }
}

pub(crate) fn encode_to(buffer: &mut Vec<u8>, value: &(impl Serialize + ?Sized)) -> Result<()> {
    buffer.extend_from_slice(&rmp_serde::to_vec_named(value)?);
    Ok(())
}
