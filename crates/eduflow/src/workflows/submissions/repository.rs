use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    CategoryId, DataEntry, PrincipalId, RegionId, SchoolId, SectorId, SubmissionId,
    SubmissionRecord, SubmissionStatus, TransitionAction,
};

/// Filter applied to submission listings. Region and sector narrowing is
/// resolved against the directory by the service; stores only need to match
/// the record-level fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionFilter {
    pub status: Option<SubmissionStatus>,
    pub region: Option<RegionId>,
    pub sector: Option<SectorId>,
    pub school: Option<SchoolId>,
    pub category: Option<CategoryId>,
    pub search: Option<String>,
}

impl SubmissionFilter {
    /// Record-level match: status, school, category, and free-text search
    /// over the submission identity.
    pub fn matches_record(&self, record: &SubmissionRecord) -> bool {
        if let Some(status) = self.status {
            if record.status != status {
                return false;
            }
        }
        if let Some(school) = &self.school {
            if school != &record.id.school {
                return false;
            }
        }
        if let Some(category) = &self.category {
            if category != &record.id.category {
                return false;
            }
        }
        if let Some(search) = &self.search {
            let needle = search.trim().to_ascii_lowercase();
            if !needle.is_empty() {
                let haystack = format!("{} {}", record.id.school.0, record.id.category.0);
                if !haystack.to_ascii_lowercase().contains(&needle) {
                    return false;
                }
            }
        }
        true
    }

    /// Cache key derived from the filter so list caches can be invalidated
    /// per scope after a write.
    pub fn scope_key(&self) -> String {
        format!(
            "status={};region={};sector={};school={};category={};search={}",
            self.status.map(SubmissionStatus::label).unwrap_or("*"),
            self.region.as_ref().map(|id| id.0.as_str()).unwrap_or("*"),
            self.sector.as_ref().map(|id| id.0.as_str()).unwrap_or("*"),
            self.school.as_ref().map(|id| id.0.as_str()).unwrap_or("*"),
            self.category
                .as_ref()
                .map(|id| id.0.as_str())
                .unwrap_or("*"),
            self.search.as_deref().unwrap_or("*"),
        )
    }
}

/// Batched status mutation covering every row of one submission. The store
/// must reject the write when the stored status no longer matches `expect`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub id: SubmissionId,
    pub expect: SubmissionStatus,
    pub to: SubmissionStatus,
    pub reason: Option<String>,
    pub clear_rejection_reason: bool,
    pub actor: PrincipalId,
    pub at: DateTime<Utc>,
}

/// Error enumeration for store failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("submission not found")]
    NotFound,
    #[error("submission status changed concurrently (now '{current}')")]
    StatusConflict { current: SubmissionStatus },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Storage abstraction over the external row-store. All row writes for one
/// submission happen in a single batched mutation so reviewers never observe
/// a half-transitioned submission.
#[async_trait]
pub trait SubmissionStore: Send + Sync {
    async fn list(&self, filter: &SubmissionFilter) -> Result<Vec<SubmissionRecord>, StoreError>;

    async fn fetch(&self, id: &SubmissionId) -> Result<Option<SubmissionRecord>, StoreError>;

    /// Upsert one row per entry, creating the submission as `Draft` when it
    /// does not exist yet.
    async fn upsert_entries(
        &self,
        id: &SubmissionId,
        rows: Vec<DataEntry>,
        actor: &PrincipalId,
        at: DateTime<Utc>,
    ) -> Result<SubmissionRecord, StoreError>;

    /// Apply a status transition guarded by the expected current status.
    async fn apply_status(&self, update: StatusUpdate) -> Result<SubmissionRecord, StoreError>;
}

/// Event describing one applied transition, fanned out to reviewers or
/// submitters by the host's delivery mechanism.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionEvent {
    pub kind: TransitionAction,
    pub submission: SubmissionId,
    pub old_status: SubmissionStatus,
    pub new_status: SubmissionStatus,
    pub actor: PrincipalId,
}

/// Notification dispatch error. Dispatch failures are logged by the caller
/// and never fail the transition that produced the event.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}

/// Trait describing the outbound notification hook.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, event: TransitionEvent) -> Result<(), NotifyError>;
}
