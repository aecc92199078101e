//! The chart specification value consumed by the pipeline.
//!
//! A `ChartSpec` is an opaque JSON tree (source, transformations,
//! representation). It is never validated here; the host editor is the only
//! judge of whether a spec is meaningful.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::Path;

/// An immutable chart specification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChartSpec(Value);

impl ChartSpec {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Parse a spec from JSON text
    pub fn from_json_str(text: &str) -> Result<Self> {
        let value = serde_json::from_str(text)
            .map_err(|e| Error::EncodingFailure(format!("Spec is not valid JSON: {}", e)))?;
        Ok(Self(value))
    }

    /// Read and parse a spec file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text).map_err(|e| match e {
            Error::EncodingFailure(msg) => Error::EncodingFailure(format!("{}: {}", path.display(), msg)),
            other => other,
        })
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    /// Short, stable digest of the canonical form.
    ///
    /// Object keys are kept sorted by `serde_json`, so two specs that differ
    /// only in key order or whitespace share a fingerprint.
    pub fn fingerprint(&self) -> String {
        let canonical = self.0.to_string();
        let digest = Sha256::digest(canonical.as_bytes());
        hex::encode(&digest[..6])
    }
}

impl From<Value> for ChartSpec {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

impl std::str::FromStr for ChartSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_json_str(s)
    }
}
