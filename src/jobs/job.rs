use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::dialogue::Turn;

/// Tracks the lifecycle status of a job.
///
/// Transitions only move forward: queued → processing → completed | failed.
/// A job may also fail straight out of `queued` when its configuration is
/// rejected before processing starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, next),
            (Queued, Processing)
                | (Queued, Failed)
                | (Processing, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Queued => write!(f, "queued"),
            JobStatus::Processing => write!(f, "processing"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// One generation request's persisted lifecycle record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub status: JobStatus,
    pub progress: u8,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation: Option<Vec<Turn>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_details: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    /// The submitted configuration, credentials stripped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn queued(config: Option<Value>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            status: JobStatus::Queued,
            progress: 0,
            message: "Job queued for processing".to_string(),
            conversation: None,
            error: None,
            error_details: None,
            metadata: None,
            config,
            created_at: now,
            updated_at: now,
        }
    }

    /// A processing job untouched for longer than `threshold` may be stuck.
    pub fn is_possibly_stuck(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        self.status == JobStatus::Processing && now - self.updated_at > threshold
    }
}

/// A partial write. `Some` fields overwrite, `None` fields are left alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub progress: Option<u8>,
    pub message: Option<String>,
    pub conversation: Option<Vec<Turn>>,
    pub error: Option<String>,
    pub error_details: Option<Value>,
    pub metadata: Option<Value>,
}

impl JobUpdate {
    pub fn status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn conversation(mut self, conversation: Vec<Turn>) -> Self {
        self.conversation = Some(conversation);
        self
    }

    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn error_details(mut self, details: Value) -> Self {
        self.error_details = Some(details);
        self
    }

    pub fn metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Merges the update into `job` and refreshes `updated_at`.
    pub fn apply(self, job: &mut Job, now: DateTime<Utc>) {
        if let Some(status) = self.status {
            job.status = status;
        }
        if let Some(progress) = self.progress {
            job.progress = progress;
        }
        if let Some(message) = self.message {
            job.message = message;
        }
        if let Some(conversation) = self.conversation {
            job.conversation = Some(conversation);
        }
        if let Some(error) = self.error {
            job.error = Some(error);
        }
        if let Some(details) = self.error_details {
            job.error_details = Some(details);
        }
        if let Some(metadata) = self.metadata {
            job.metadata = Some(metadata);
        }
        job.updated_at = now;
    }
}
