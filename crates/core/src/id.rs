//! Job identifiers.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::DomainError;

/// Identifier of a job document.
///
/// Assigned by the document store on insert and used as the claim/transition
/// key afterwards. Stores differ in how they render ids (hex object ids,
/// UUIDs, ...), so the value is kept as an opaque string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Generate a fresh identifier (UUIDv7 in simple form, time-ordered).
    ///
    /// Used by stores that do not have a native id generator.
    pub fn generate() -> Self {
        Self(Uuid::now_v7().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Interpret a store-generated id value.
    ///
    /// Strings are taken verbatim; extended-JSON object ids (`{"$oid": ".."}`)
    /// are unwrapped; any other scalar is rendered with its JSON form.
    pub fn from_store_value(value: &Value) -> Result<Self, DomainError> {
        match value {
            Value::String(s) => s.parse(),
            Value::Object(map) => match map.get("$oid") {
                Some(Value::String(s)) => s.parse(),
                _ => Err(DomainError::invalid_id(format!("JobId: unsupported id value {value}"))),
            },
            Value::Number(n) => Ok(Self(n.to_string())),
            other => Err(DomainError::invalid_id(format!("JobId: unsupported id value {other}"))),
        }
    }

    /// JSON value used when the id appears in a filter document.
    pub fn to_value(&self) -> Value {
        Value::String(self.0.clone())
    }
}

impl core::fmt::Display for JobId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for JobId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(DomainError::invalid_id("JobId: empty"));
        }
        if trimmed.chars().any(char::is_control) {
            return Err(DomainError::invalid_id("JobId: contains control characters"));
        }
        Ok(Self(trimmed.to_string()))
    }
}
