use chrono::{DateTime, Utc};

use crate::store::models::TriggerType;

pub type QueuedJobId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueuedJobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Retrying,
}

impl QueuedJobStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Retrying => "retrying",
        }
    }

    #[allow(clippy::should_implement_trait)]
    #[must_use]
    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "retrying" => Some(Self::Retrying),
            _ => None,
        }
    }
}

/// A job row as read back from `absa_job_queue`.
#[derive(Debug, Clone)]
pub struct QueuedJob {
    pub id: QueuedJobId,
    pub movie_id: String,
    pub trigger_type: TriggerType,
    pub status: QueuedJobStatus,
    pub error_message: Option<String>,
    pub retry_count: i32,
    pub max_retries: i32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub next_attempt_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewQueuedJob {
    pub movie_id: String,
    pub trigger_type: TriggerType,
    pub max_retries: i32,
}
