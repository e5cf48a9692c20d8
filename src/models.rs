//! Shared models and types
//!
//! This module contains types shared across multiple modules
//! to avoid circular dependencies.

use serde::{Deserialize, Serialize};

/// Standard API response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub db_connected: bool,
    pub bus_connected: bool,
}

/// Flexible numeric field: edge detectors send confidence/threat either as a
/// JSON number or as a numeric string (multipart form origins). Malformed
/// values must surface as a validation rejection, not a deserialization 500,
/// so the raw value is kept and parsed during pipeline ingest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumericField {
    Number(f64),
    Text(String),
}

impl NumericField {
    /// Parse to f64, None if the text form is not numeric
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            NumericField::Number(n) => Some(*n),
            NumericField::Text(s) => s.trim().parse::<f64>().ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_field_number() {
        let v: NumericField = serde_json::from_str("97.5").unwrap();
        assert_eq!(v.as_f64(), Some(97.5));
    }

    #[test]
    fn test_numeric_field_string() {
        let v: NumericField = serde_json::from_str("\"88\"").unwrap();
        assert_eq!(v.as_f64(), Some(88.0));
    }

    #[test]
    fn test_numeric_field_malformed() {
        let v: NumericField = serde_json::from_str("\"high\"").unwrap();
        assert_eq!(v.as_f64(), None);
    }
}
