//! Core types shared between the harness and backend implementations.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// One write to issue against the backend.
///
/// Created once per invocation and dropped when the operation completes.
/// The payload is shared by every request of a run.
#[derive(Debug, Clone)]
pub struct OperationRequest {
    key: String,
    payload: Arc<[u8]>,
}

impl OperationRequest {
    pub fn new(key: impl Into<String>, payload: Arc<[u8]>) -> Self {
        Self {
            key: key.into(),
            payload,
        }
    }

    /// Create a request keyed by a fresh UUID
    pub fn generate(prefix: &str, payload: Arc<[u8]>) -> Self {
        Self::new(format!("{}{}", prefix, Uuid::new_v4()), payload)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn size(&self) -> usize {
        self.payload.len()
    }
}

/// Shape of the document written by every operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PayloadTemplate {
    /// JSON object with `fields` string fields named `Field_1..=Field_n`,
    /// each holding `field_len` asterisks
    Json { fields: usize, field_len: usize },
    /// `size` raw bytes
    Raw { size: usize },
}

impl Default for PayloadTemplate {
    fn default() -> Self {
        PayloadTemplate::Json {
            fields: 6,
            field_len: 16,
        }
    }
}

impl PayloadTemplate {
    /// Render the template into the bytes sent with every write.
    pub fn render(&self) -> Arc<[u8]> {
        match self {
            PayloadTemplate::Json { fields, field_len } => {
                let value = "*".repeat(*field_len);
                let mut doc = String::from("{\n");
                for i in 1..=*fields {
                    doc.push_str(&format!("  \"Field_{}\": \"{}\"", i, value));
                    if i < *fields {
                        doc.push(',');
                    }
                    doc.push('\n');
                }
                doc.push('}');
                Arc::from(doc.into_bytes())
            }
            PayloadTemplate::Raw { size } => Arc::from(vec![b'*'; *size]),
        }
    }
}

/// Destination resource provisioned before a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSpec {
    pub name: String,
    pub capacity_mb: u64,
    /// Time the backend needs between dropping and recreating the target
    pub settle: Duration,
}

impl TargetSpec {
    pub fn new(name: impl Into<String>, capacity_mb: u64) -> Self {
        Self {
            name: name.into(),
            capacity_mb,
            settle: Duration::ZERO,
        }
    }

    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }
}
