//! Data-entry approval workflow: validation, role-scoped transitions, bulk
//! coordination, and completion roll-ups for a region/sector/school network.

pub mod bulk;
pub mod deadline;
pub mod domain;
pub mod machine;
pub mod repository;
pub mod router;
pub mod scope;
pub mod service;
pub mod stats;
pub mod validation;
pub mod watch;

#[cfg(test)]
mod tests;

pub use bulk::{
    BulkItemOutcome, BulkItemResult, BulkOutcome, BulkParams, BulkSummary, CancelFlag,
};
pub use deadline::{deadline_status, DeadlineStatus};
pub use domain::{
    Category, CategoryCatalog, CategoryId, Column, ColumnId, ColumnType, DataEntry, Dependency,
    DependencyCondition, Directory, IssueSeverity, Principal, PrincipalDirectory, PrincipalId,
    RegionId, Role, SchoolId, SchoolPlacement, SectorId, SubmissionId, SubmissionRecord,
    SubmissionStatus, TransitionAction, ValidationRules,
};
pub use machine::{TransitionError, TransitionPlan};
pub use repository::{
    NotificationSink, NotifyError, StatusUpdate, StoreError, SubmissionFilter, SubmissionStore,
    TransitionEvent,
};
pub use router::{submission_router, SubmissionRef, WorkflowState};
pub use scope::{can_act, scope_for, AccessScope, ScopeDenial};
pub use service::{
    DashboardView, DraftEntry, SubmissionView, SubmissionWorkflowService, TransitionReceipt,
    WorkflowError,
};
pub use stats::{completion_percent, roll_up, StatusRollUp};
pub use validation::{validate, FieldIssue, IssueCode, ValidationReport};
pub use watch::{ChangeFeed, ChangeToken, ListCache, ReloadRequest};
