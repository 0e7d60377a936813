//! Request/response transport seam.
//!
//! The concrete HTTP client is an external collaborator; the core only
//! depends on this trait and on the success envelope every endpoint shares.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::core::{Record, RecordId, Result, SyncError};

/// Shared response envelope: `{ success, data, message? }`.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    pub success: bool,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub message: Option<String>,
}

impl Envelope {
    /// Unwraps the payload of a successful envelope, turning a server-side
    /// refusal into a transport error carrying the server's message.
    pub fn into_data(self) -> Result<Value> {
        if !self.success {
            return Err(SyncError::transport(
                None,
                self.message
                    .unwrap_or_else(|| "request rejected by server".to_string()),
            ));
        }
        self.data.ok_or_else(|| {
            SyncError::transport(None, "successful response carries no data".to_string())
        })
    }

    pub fn into_record(self) -> Result<Record> {
        Record::from_value(self.into_data()?)
    }

    pub fn into_records(self) -> Result<Vec<Record>> {
        let Value::Array(items) = self.into_data()? else {
            return Err(SyncError::transport(
                None,
                "expected an array of records".to_string(),
            ));
        };
        items.into_iter().map(Record::from_value).collect()
    }
}

/// Fetch-all, create, and patch-by-id against the workflow backend. Each
/// call resolves the shared envelope or fails with a status code.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch_all(&self) -> Result<Vec<Record>>;
    async fn create(&self, payload: &Map<String, Value>) -> Result<Record>;
    async fn patch(&self, id: &RecordId, patch: &Map<String, Value>) -> Result<Record>;
}
