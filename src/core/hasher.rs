//! Content fingerprints used to deduplicate queued work.

use serde_json::Value;
use sha2::{Digest, Sha256};

use super::filter::resolve_path;

/// Computes the deduplication key of a task payload.
///
/// Two payloads describing the same unit of work must hash equal even when
/// they were submitted as different task records.
pub trait TaskHasher: Send + Sync {
    /// Fingerprint `payload`.
    fn hash(&self, payload: &Value) -> String;
}

impl<F> TaskHasher for F
where
    F: Fn(&Value) -> String + Send + Sync,
{
    fn hash(&self, payload: &Value) -> String {
        self(payload)
    }
}

/// SHA-256 over selected payload fields, or over the whole payload when no
/// fields are configured.
///
/// Fields use the same `__` path syntax as filters, e.g.
/// `["boefje__id", "input_ooi", "organization"]`.
#[derive(Debug, Clone, Default)]
pub struct FieldHasher {
    fields: Vec<String>,
}

impl FieldHasher {
    /// Hash the given payload fields, in order.
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    /// Hash the entire payload.
    #[must_use]
    pub fn whole_payload() -> Self {
        Self::default()
    }

    /// Configured field paths.
    #[must_use]
    pub fn fields(&self) -> &[String] {
        &self.fields
    }
}

impl TaskHasher for FieldHasher {
    fn hash(&self, payload: &Value) -> String {
        let mut digest = Sha256::new();
        if self.fields.is_empty() {
            digest.update(canonical(payload).as_bytes());
        } else {
            let material = self
                .fields
                .iter()
                .map(|path| canonical(resolve_path(payload, path).unwrap_or(&Value::Null)))
                .collect::<Vec<_>>()
                .join("-");
            digest.update(material.as_bytes());
        }
        hex::encode(digest.finalize())
    }
}

/// JSON text with object keys sorted at every level.
fn canonical(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let body = entries
                .into_iter()
                .map(|(key, value)| format!("{}:{}", Value::String(key.clone()), canonical(value)))
                .collect::<Vec<_>>()
                .join(",");
            format!("{{{body}}}")
        }
        Value::Array(items) => {
            let body = items.iter().map(canonical).collect::<Vec<_>>().join(",");
            format!("[{body}]")
        }
        scalar => scalar.to_string(),
    }
}
