//! Coercion of inbound field values into the trimmed strings used for signing.

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Coerces a JSON value into a trimmed string.
///
/// `null` becomes the empty string, numbers keep their JSON rendering.
pub fn normalize(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_owned(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

/// Serde adapter for fields gateways send either as strings or numbers.
pub fn deserialize_normalized<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(normalize(&value))
}

/// Request fields after normalization.
///
/// Empty values are treated as absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedFields(HashMap<String, String>);

impl NormalizedFields {
    pub fn from_json(object: &Map<String, Value>) -> Self {
        Self(
            object
                .iter()
                .map(|(k, v)| (k.trim().to_owned(), normalize(v)))
                .collect(),
        )
    }

    /// Parses an `application/x-www-form-urlencoded` body.
    pub fn from_form(body: &str) -> Self {
        Self(
            url::form_urlencoded::parse(body.as_bytes())
                .map(|(k, v)| (k.trim().to_owned(), v.trim().to_owned()))
                .collect(),
        )
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn insert(&mut self, key: &str, value: &str) {
        self.0.insert(key.to_owned(), value.trim().to_owned());
    }
}

impl<K: Into<String>, V: AsRef<str>> FromIterator<(K, V)> for NormalizedFields {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.as_ref().trim().to_owned()))
                .collect(),
        )
    }
}
