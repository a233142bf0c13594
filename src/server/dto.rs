//! Wire shapes for the `/generate` endpoint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dialogue::{GenerationMetadata, Turn};
use crate::jobs::JobStatus;
use crate::orchestrator::JobView;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateQuery {
    pub mode: Option<String>,
    pub job_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Body of a successful synchronous generation.
#[derive(Debug, Clone, Serialize)]
pub struct SyncResponse {
    pub conversation: Vec<Turn>,
    pub metadata: GenerationMetadata,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub job_id: String,
    pub status: JobStatus,
    pub progress: u8,
    pub message: String,
    pub conversation: Option<Vec<Turn>>,
    pub error: Option<String>,
    pub error_details: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub enhanced_metadata: Option<Value>,
    pub possibly_stuck: bool,
    pub debug: StatusDebug,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusDebug {
    pub conversation_length: usize,
    pub has_error: bool,
    pub config_present: bool,
    pub timestamp: DateTime<Utc>,
}

impl From<JobView> for StatusResponse {
    fn from(view: JobView) -> Self {
        let job = view.job;
        let debug = StatusDebug {
            conversation_length: job.conversation.as_ref().map_or(0, Vec::len),
            has_error: job.error.is_some(),
            config_present: job.config.is_some(),
            timestamp: Utc::now(),
        };
        Self {
            job_id: job.id,
            status: job.status,
            progress: job.progress,
            message: job.message,
            conversation: job.conversation,
            error: job.error,
            error_details: job.error_details,
            created_at: job.created_at,
            updated_at: job.updated_at,
            enhanced_metadata: job.metadata,
            possibly_stuck: view.possibly_stuck,
            debug,
        }
    }
}
