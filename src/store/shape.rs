//! Argument shapes for `get` and `set`
//!
//! A key is one identifier or an ordered list; a value is one (possibly
//! absent) JSON value or an ordered list of them. `plan_writes` turns a
//! key/value pair of shapes into the concrete writes, validating keys and
//! enforcing the serialized size ceiling before anything touches the network.

use crate::error::{ContextError, ContextResult};
use crate::keys;
use serde_json::Value;

/// Largest serialized value accepted by `set`, in bytes
pub const MAX_VALUE_BYTES: usize = 512_000;

/// One key or an ordered list of keys
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySpec {
    One(String),
    Many(Vec<String>),
}

impl From<&str> for KeySpec {
    fn from(key: &str) -> Self {
        Self::One(key.to_string())
    }
}

impl From<String> for KeySpec {
    fn from(key: String) -> Self {
        Self::One(key)
    }
}

impl From<Vec<String>> for KeySpec {
    fn from(keys: Vec<String>) -> Self {
        Self::Many(keys)
    }
}

impl From<Vec<&str>> for KeySpec {
    fn from(keys: Vec<&str>) -> Self {
        Self::Many(keys.into_iter().map(str::to_string).collect())
    }
}

impl<const N: usize> From<[&str; N]> for KeySpec {
    fn from(keys: [&str; N]) -> Self {
        Self::Many(keys.iter().map(|k| k.to_string()).collect())
    }
}

/// One value or an ordered list of values; `None` means "no value"
#[derive(Debug, Clone, PartialEq)]
pub enum ValueSpec {
    One(Option<Value>),
    Many(Vec<Option<Value>>),
}

impl From<Value> for ValueSpec {
    fn from(value: Value) -> Self {
        Self::One(Some(value))
    }
}

impl From<Option<Value>> for ValueSpec {
    fn from(value: Option<Value>) -> Self {
        Self::One(value)
    }
}

impl From<Vec<Value>> for ValueSpec {
    fn from(values: Vec<Value>) -> Self {
        Self::Many(values.into_iter().map(Some).collect())
    }
}

impl From<Vec<Option<Value>>> for ValueSpec {
    fn from(values: Vec<Option<Value>>) -> Self {
        Self::Many(values)
    }
}

/// Result of `get`, shaped like the key that was asked for
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched {
    One(Option<Value>),
    Many(Vec<Option<Value>>),
}

impl Fetched {
    /// The single value; for a list, its first element
    pub fn into_one(self) -> Option<Value> {
        match self {
            Self::One(value) => value,
            Self::Many(values) => values.into_iter().next().flatten(),
        }
    }

    /// Every value as a list
    pub fn into_many(self) -> Vec<Option<Value>> {
        match self {
            Self::One(value) => vec![value],
            Self::Many(values) => values,
        }
    }
}

/// A single key write: serialized bytes, or `None` to delete the key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedWrite {
    pub key: String,
    pub bytes: Option<Vec<u8>>,
}

/// Resolve key/value shapes into writes.
///
/// - one key, one value: written as is
/// - key list, one value: first key gets the value, the rest are deleted
/// - one key, value list: first element only
/// - key list, value list: pairwise; extra keys are deleted, extra values dropped
pub fn plan_writes(key_spec: KeySpec, value_spec: ValueSpec) -> ContextResult<Vec<PlannedWrite>> {
    let pairs: Vec<(String, Option<Value>)> = match (key_spec, value_spec) {
        (KeySpec::One(key), ValueSpec::One(value)) => vec![(key, value)],
        (KeySpec::Many(names), ValueSpec::One(value)) => {
            if names.is_empty() {
                return Err(ContextError::InvalidKey("key list is empty".to_string()));
            }
            let mut value = Some(value);
            names
                .into_iter()
                .map(|key| (key, value.take().flatten()))
                .collect()
        }
        (KeySpec::One(key), ValueSpec::Many(values)) => {
            let first = values.into_iter().next().ok_or_else(|| {
                ContextError::InvalidArguments(format!("value list for key '{}' is empty", key))
            })?;
            vec![(key, first)]
        }
        (KeySpec::Many(names), ValueSpec::Many(values)) => {
            if names.is_empty() {
                return Err(ContextError::InvalidKey("key list is empty".to_string()));
            }
            let mut values = values.into_iter();
            names
                .into_iter()
                .map(|key| (key, values.next().flatten()))
                .collect()
        }
    };

    pairs
        .into_iter()
        .map(|(key, value)| {
            keys::validate_key(&key)?;
            let bytes = value.map(|v| serialize_checked(&key, &v)).transpose()?;
            Ok(PlannedWrite { key, bytes })
        })
        .collect()
}

/// Serialize `value`, rejecting it if it exceeds `MAX_VALUE_BYTES`
pub fn serialize_checked(key: &str, value: &Value) -> ContextResult<Vec<u8>> {
    let bytes = serde_json::to_vec(value)?;
    if bytes.len() > MAX_VALUE_BYTES {
        return Err(ContextError::ValueTooLarge {
            key: key.to_string(),
            size: bytes.len(),
            limit: MAX_VALUE_BYTES,
        });
    }
    Ok(bytes)
}
