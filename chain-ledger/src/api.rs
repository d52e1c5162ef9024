//! Collaborator boundary
//!
//! Transport-neutral request handlers over a shared [`Ledger`]. A web or RPC
//! layer maps each method to a route and [`ApiError::status_code`] to its
//! response status.

use crate::{
    events::{ActivitySubmission, LedgerEvent},
    types::{AppendReceipt, EventRecord},
    Error, Ledger,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

/// Event type written by [`EventApi::submit_activity`]
pub const ACTIVITY_EVENT_TYPE: &str = "activity_submission";

/// Response to a successful submit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitResponse {
    /// Height of the new block
    pub height: u64,
    /// Hash of the new block
    pub hash: String,
    /// Event type of the new block
    pub event_type: String,
}

impl From<AppendReceipt> for SubmitResponse {
    fn from(receipt: AppendReceipt) -> Self {
        Self {
            height: receipt.height,
            hash: receipt.hash,
            event_type: receipt.event_type,
        }
    }
}

/// Response to an activity submit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityResponse {
    /// Id assigned to the activity
    pub activity_id: String,
    /// Block the activity was written to
    pub block: SubmitResponse,
}

/// Chain verification result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyResponse {
    /// Whether the chain verified
    pub valid: bool,
    /// Fault description when invalid, `null` otherwise
    pub error: Option<String>,
}

/// Liveness response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `"ok"`
    pub status: String,
    /// Service name
    pub service: String,
    /// Service version
    pub version: String,
}

/// Error returned to collaborators
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct ApiError(#[from] Error);

impl ApiError {
    /// HTTP-equivalent status code
    pub fn status_code(&self) -> u16 {
        match &self.0 {
            Error::UnsupportedValueKind(_) | Error::InvalidEvent(_) => 400,
            Error::BlockNotFound(_) => 404,
            Error::LedgerUninitialized | Error::DuplicateHeight(_) => 503,
            Error::Storage(_)
            | Error::Serialization(_)
            | Error::Json(_)
            | Error::Config(_)
            | Error::Io(_) => 500,
        }
    }

    /// Short machine-readable error class
    pub fn error_type(&self) -> &'static str {
        match &self.0 {
            Error::UnsupportedValueKind(_) => "unsupported_value",
            Error::InvalidEvent(_) => "validation_error",
            Error::BlockNotFound(_) => "not_found",
            Error::LedgerUninitialized => "ledger_uninitialized",
            Error::DuplicateHeight(_) => "write_conflict",
            Error::Storage(_) => "storage_error",
            Error::Serialization(_) | Error::Json(_) => "encoding_error",
            Error::Config(_) | Error::Io(_) => "internal_error",
        }
    }

    /// Response body
    pub fn body(&self) -> Value {
        json!({
            "error": {
                "code": self.status_code(),
                "message": self.0.to_string(),
                "type": self.error_type(),
            }
        })
    }

    /// Underlying ledger error
    pub fn inner(&self) -> &Error {
        &self.0
    }
}

/// Request handlers over a shared ledger
#[derive(Debug, Clone)]
pub struct EventApi {
    ledger: Arc<Ledger>,
}

impl EventApi {
    /// Create handlers over `ledger`
    pub fn new(ledger: Arc<Ledger>) -> Self {
        Self { ledger }
    }

    /// Underlying ledger
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Append an arbitrary event
    pub async fn submit_event(
        &self,
        event_type: &str,
        payload: &Value,
    ) -> Result<SubmitResponse, ApiError> {
        Ok(self.ledger.append(event_type, payload).await?.into())
    }

    /// Payloads of every event of `event_type`, oldest first
    pub async fn list_events(&self, event_type: &str) -> Result<Vec<EventRecord>, ApiError> {
        Ok(self.ledger.list_by_type(event_type).await?)
    }

    /// Verify the whole chain
    pub async fn verify(&self) -> Result<VerifyResponse, ApiError> {
        let status = self.ledger.verify_chain().await?;
        Ok(VerifyResponse {
            valid: status.is_valid(),
            error: status.fault().map(ToString::to_string),
        })
    }

    /// Liveness check; does not touch the store
    pub fn health(&self) -> HealthResponse {
        let config = self.ledger.config();
        HealthResponse {
            status: "ok".to_string(),
            service: config.service_name.clone(),
            version: config.service_version.clone(),
        }
    }

    /// Validate a posted activity and append it
    pub async fn submit_activity(
        &self,
        submission: ActivitySubmission,
    ) -> Result<ActivityResponse, ApiError> {
        let activity = submission.into_activity()?;
        let activity_id = activity.id.clone();
        let event = LedgerEvent::ActivitySubmission {
            user_id: None,
            activity,
        };

        let receipt = self.ledger.append_event(&event).await?;
        tracing::info!(activity_id = %activity_id, height = receipt.height, "Activity recorded");

        Ok(ActivityResponse {
            activity_id,
            block: receipt.into(),
        })
    }

    /// Every submitted activity, oldest first
    pub async fn list_activities(&self) -> Result<Vec<EventRecord>, ApiError> {
        self.list_events(ACTIVITY_EVENT_TYPE).await
    }

    /// Prometheus text exposition
    pub fn metrics(&self) -> String {
        self.ledger.metrics().render()
    }
}
