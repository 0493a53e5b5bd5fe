use super::{Provider, Result, SourceError};
use chrono::NaiveDate;
use serde_json::Value;

/// Checked accessor over a provider JSON document.
///
/// Every lookup names the field it wanted so a malformed response surfaces
/// as a consistency error pointing at the culprit rather than a silent
/// default.
#[derive(Debug, Clone, Copy)]
pub struct Fields<'a> {
    value: &'a Value,
    provider: Provider,
}

impl<'a> Fields<'a> {
    pub const fn new(value: &'a Value, provider: Provider) -> Self {
        Self { value, provider }
    }

    pub const fn value(&self) -> &'a Value {
        self.value
    }

    pub fn is_null(&self) -> bool {
        self.value.is_null()
    }

    /// Required key; the value itself may be null
    pub fn child(&self, key: &str) -> Result<Fields<'a>> {
        self.value
            .get(key)
            .map(|v| Fields::new(v, self.provider))
            .ok_or_else(|| SourceError::consistency(self.provider, key))
    }

    /// Optional key, treating null as absent
    pub fn opt_child(&self, key: &str) -> Option<Fields<'a>> {
        self.value
            .get(key)
            .filter(|v| !v.is_null())
            .map(|v| Fields::new(v, self.provider))
    }

    /// Required non-null string
    pub fn str(&self, key: &str) -> Result<&'a str> {
        self.value
            .get(key)
            .and_then(Value::as_str)
            .ok_or_else(|| SourceError::consistency(self.provider, key))
    }

    /// Required key whose value may be null
    pub fn maybe_str(&self, key: &str) -> Result<Option<&'a str>> {
        let child = self.child(key)?;
        match child.value {
            Value::Null => Ok(None),
            Value::String(s) => Ok(Some(s.as_str())),
            _ => Err(SourceError::consistency(self.provider, key)),
        }
    }

    /// Optional string, empty strings treated as absent
    pub fn opt_str(&self, key: &str) -> Option<&'a str> {
        self.value
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    pub fn u64(&self, key: &str) -> Result<u64> {
        self.opt_u64(key)
            .ok_or_else(|| SourceError::consistency(self.provider, key))
    }

    /// Accepts both numbers and numeric strings, which some providers mix
    pub fn opt_u64(&self, key: &str) -> Option<u64> {
        match self.value.get(key)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn opt_i64(&self, key: &str) -> Option<i64> {
        match self.value.get(key)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn i32(&self, key: &str) -> Result<i32> {
        self.opt_i64(key)
            .and_then(|n| i32::try_from(n).ok())
            .ok_or_else(|| SourceError::consistency(self.provider, key))
    }

    pub fn opt_f64(&self, key: &str) -> Option<f64> {
        match self.value.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Optional `YYYY-MM-DD` date; anything unparseable counts as absent
    pub fn opt_date(&self, key: &str) -> Option<NaiveDate> {
        self.opt_str(key)
            .and_then(|s| NaiveDate::parse_from_str(s.get(..10).unwrap_or(s), "%Y-%m-%d").ok())
    }

    /// Required array
    pub fn array(&self, key: &str) -> Result<Vec<Fields<'a>>> {
        self.value
            .get(key)
            .and_then(Value::as_array)
            .map(|items| items.iter().map(|v| Fields::new(v, self.provider)).collect())
            .ok_or_else(|| SourceError::consistency(self.provider, key))
    }

    /// Optional array, absent or null yields an empty list
    pub fn opt_array(&self, key: &str) -> Vec<Fields<'a>> {
        self.value
            .get(key)
            .and_then(Value::as_array)
            .map(|items| items.iter().map(|v| Fields::new(v, self.provider)).collect())
            .unwrap_or_default()
    }

    /// Array of plain strings, skipping non-string entries
    pub fn strings(&self, key: &str) -> Vec<String> {
        self.value
            .get(key)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }
}
