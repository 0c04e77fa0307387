//! Export job types

use super::BookId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Export job identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Inclusive range of chapter numbers, as requested.
/// Bounds may exceed the highest storable chapter number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterRange {
    pub from: u64,
    pub to: u64,
}

impl ChapterRange {
    /// Build a range, returning None unless `0 < from <= to`
    pub fn new(from: u64, to: u64) -> Option<Self> {
        if from == 0 || from > to {
            None
        } else {
            Some(Self { from, to })
        }
    }

    pub fn contains(&self, number: u32) -> bool {
        (self.from..=self.to).contains(&u64::from(number))
    }

    /// The part of the range chapter numbers can occupy, None if it lies
    /// entirely above `u32::MAX`
    pub fn storable(&self) -> Option<(u32, u32)> {
        let from = u32::try_from(self.from).ok()?;
        Some((from, u32::try_from(self.to).unwrap_or(u32::MAX)))
    }
}

impl fmt::Display for ChapterRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.from, self.to)
    }
}

/// Lifecycle state of an export job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobStatus {
    /// Created, not yet validated
    Pending,

    /// Validated and handed to the packager
    Accepted,

    /// Validation failed before dispatch
    Rejected { reason: String },

    /// The packager reported an error
    Failed { reason: String },
}

impl JobStatus {
    /// Short lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Accepted => "accepted",
            JobStatus::Rejected { .. } => "rejected",
            JobStatus::Failed { .. } => "failed",
        }
    }

    /// Reason attached to rejected and failed jobs
    pub fn reason(&self) -> Option<&str> {
        match self {
            JobStatus::Rejected { reason } | JobStatus::Failed { reason } => Some(reason),
            JobStatus::Pending | JobStatus::Accepted => None,
        }
    }

    /// Whether the job can no longer change state
    pub fn is_final(&self) -> bool {
        matches!(self, JobStatus::Rejected { .. } | JobStatus::Failed { .. })
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reason() {
            Some(reason) => write!(f, "{} ({})", self.as_str(), reason),
            None => write!(f, "{}", self.as_str()),
        }
    }
}

/// A request to package a range of chapters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportJob {
    pub id: JobId,

    /// Target book
    pub book_id: BookId,

    /// Nominal range requested by the caller
    pub range: ChapterRange,

    /// Chapter numbers actually handed to packaging, ascending.
    /// May be a subset of `range` when the source has gaps.
    pub chapters: Vec<u32>,

    pub status: JobStatus,

    pub created_at: DateTime<Utc>,

    /// When the packager picked the job up
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,

    /// When packaging finished, successfully or not
    pub finished_at: Option<DateTime<Utc>>,

    /// Storage key of the packaged artifact
    pub artifact: Option<String>,

    /// Whether the artifact reached the configured deliverer
    #[serde(default)]
    pub sent: bool,

    /// Last delivery failure, cleared on success
    #[serde(default)]
    pub delivery_error: Option<String>,
}

impl ExportJob {
    /// Create a pending job
    pub fn new(book_id: BookId, range: ChapterRange) -> Self {
        Self {
            id: JobId::new(),
            book_id,
            range,
            chapters: Vec::new(),
            status: JobStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            artifact: None,
            sent: false,
            delivery_error: None,
        }
    }

    /// Whether the handed-over chapters cover every number in the range
    pub fn is_complete(&self) -> bool {
        self.chapters.len() as u64 == self.range.to - self.range.from + 1
    }
}

impl fmt::Display for ExportJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> book {} chapters {}",
            self.status, self.book_id, self.range
        )
    }
}
