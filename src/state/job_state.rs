/// Job status definitions for tracking queue progress
///
/// Jobs only ever move forward: `pending → processing → {completed, failed, cancelled}`.
use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents the current state of a crawl or batch job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    // ===== Active States =====
    /// Job accepted and waiting for a worker
    Pending,

    /// A worker is running the job
    Processing,

    // ===== Terminal States =====
    /// Job finished; results are frozen
    Completed,

    /// Job-level retries exhausted
    Failed,

    /// Job stopped on request while processing
    Cancelled,
}

impl JobStatus {
    /// Returns true if this is a terminal state (no further processing)
    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }

    /// Returns true if the job may still make progress
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Processing)
    }

    /// Returns true if the transition never moves the job backwards
    ///
    /// Staying in the same active state is allowed so that progress updates
    /// and retried attempts can be written through the same path.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        match self {
            Self::Pending => true,
            Self::Processing => next != Self::Pending,
            _ => false,
        }
    }

    /// Converts to the string representation used in the database
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parses a job status from its database string representation
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// All statuses, in lifecycle order
    pub fn all() -> [JobStatus; 5] {
        [
            Self::Pending,
            Self::Processing,
            Self::Completed,
            Self::Failed,
            Self::Cancelled,
        ]
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
