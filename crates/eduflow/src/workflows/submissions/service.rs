use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::bulk::{
    self, BulkItemOutcome, BulkItemResult, BulkOutcome, BulkParams, BulkSummary, CancelFlag,
    ItemEligibility, LoadedItem,
};
use super::deadline::{self, DeadlineStatus};
use super::domain::{
    Category, CategoryCatalog, CategoryId, ColumnId, DataEntry, Directory, Principal, PrincipalId,
    RegionId, SchoolId, SchoolPlacement, SectorId, SubmissionId, SubmissionRecord,
    SubmissionStatus, TransitionAction,
};
use super::machine::{self, TransitionContext, TransitionError, TransitionPlan};
use super::repository::{
    NotificationSink, StatusUpdate, StoreError, SubmissionFilter, SubmissionStore, TransitionEvent,
};
use super::scope;
use super::stats::{self, StatusRollUp};
use super::validation::{self, ValidationReport};

/// Error raised by the workflow service. Validation and permission failures
/// resolve here; only transient store outages carry retry semantics.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WorkflowError {
    #[error("validation failed with {} error(s)", .0.errors.len())]
    Validation(ValidationReport),
    #[error("permission denied: {reason}")]
    PermissionDenied { reason: String },
    #[error("a rejection requires a non-empty reason")]
    MissingReason,
    #[error("submission is locked in status '{status}'")]
    SubmissionLocked { status: SubmissionStatus },
    #[error("cannot {action} a submission in status '{from}'")]
    IllegalTransition {
        from: SubmissionStatus,
        action: TransitionAction,
    },
    #[error("submission status changed concurrently (now '{current}')")]
    Conflict { current: SubmissionStatus },
    #[error("unknown school '{}'", .0 .0)]
    UnknownSchool(SchoolId),
    #[error("unknown category '{}'", .0 .0)]
    UnknownCategory(CategoryId),
    #[error("unknown column '{}'", .0 .0)]
    UnknownColumn(ColumnId),
    #[error("submission '{0}' not found")]
    NotFound(SubmissionId),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl WorkflowError {
    fn from_store(error: StoreError, id: &SubmissionId) -> Self {
        match error {
            StoreError::NotFound => WorkflowError::NotFound(id.clone()),
            StoreError::StatusConflict { current } => WorkflowError::Conflict { current },
            StoreError::Unavailable(message) => WorkflowError::Unavailable(message),
        }
    }
}

impl From<TransitionError> for WorkflowError {
    fn from(error: TransitionError) -> Self {
        match error {
            TransitionError::PermissionDenied { reason } => {
                WorkflowError::PermissionDenied { reason }
            }
            TransitionError::IllegalTransition { from, action } => {
                WorkflowError::IllegalTransition { from, action }
            }
            TransitionError::MissingReason => WorkflowError::MissingReason,
            TransitionError::ValidationFailed(report) => WorkflowError::Validation(report),
        }
    }
}

/// One column value in a draft save request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftEntry {
    pub column: ColumnId,
    pub value: Option<String>,
}

/// Receipt for a transition attempt. `applied == false` marks the idempotent
/// no-op path where the submission already held the target status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionReceipt {
    pub id: SubmissionId,
    pub old_status: SubmissionStatus,
    pub new_status: SubmissionStatus,
    pub applied: bool,
}

/// Read-model row returned by listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionView {
    pub id: SubmissionId,
    pub status: &'static str,
    pub category_name: String,
    pub completion: u8,
    pub deadline: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    pub has_errors: bool,
    pub has_warnings: bool,
    pub updated_at: DateTime<Utc>,
}

/// Per-sector aggregate for dashboards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SectorRollUp {
    pub sector: SectorId,
    pub schools_count: usize,
    /// Unweighted mean of the sector's school completion rates.
    pub completion: u8,
    pub statuses: StatusRollUp,
}

/// Per-region aggregate for dashboards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegionRollUp {
    pub region: RegionId,
    pub sectors_count: usize,
    /// Unweighted mean of the region's sector completion rates.
    pub completion: u8,
}

/// Advisory deadline badge for one category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeadlineBadge {
    pub category: CategoryId,
    pub category_name: String,
    pub deadline: NaiveDate,
    #[serde(flatten)]
    pub status: DeadlineStatus,
}

/// Scope-filtered dashboard computed freshly from current rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardView {
    pub overall: StatusRollUp,
    pub sectors: Vec<SectorRollUp>,
    pub regions: Vec<RegionRollUp>,
    pub deadlines: Vec<DeadlineBadge>,
}

/// Service composing the validation engine, scope resolver, state machine,
/// bulk coordinator, and aggregation calculator over an external store.
pub struct SubmissionWorkflowService<S, N> {
    store: Arc<S>,
    sink: Arc<N>,
    catalog: Arc<CategoryCatalog>,
    directory: Arc<Directory>,
}

impl<S, N> SubmissionWorkflowService<S, N>
where
    S: SubmissionStore + 'static,
    N: NotificationSink + 'static,
{
    pub fn new(
        store: Arc<S>,
        sink: Arc<N>,
        catalog: Arc<CategoryCatalog>,
        directory: Arc<Directory>,
    ) -> Self {
        Self {
            store,
            sink,
            catalog,
            directory,
        }
    }

    fn placement(&self, school: &SchoolId) -> Result<&SchoolPlacement, WorkflowError> {
        self.directory
            .placement_of(school)
            .ok_or_else(|| WorkflowError::UnknownSchool(school.clone()))
    }

    fn category(&self, id: &CategoryId) -> Result<&Category, WorkflowError> {
        self.catalog
            .get(id)
            .ok_or_else(|| WorkflowError::UnknownCategory(id.clone()))
    }

    /// List submissions visible to the actor. The caller filter is ANDed
    /// with the actor's resolved scope before the store is consulted.
    pub async fn list(
        &self,
        actor: &Principal,
        filter: SubmissionFilter,
    ) -> Result<Vec<SubmissionView>, WorkflowError> {
        let actor_scope = scope::scope_for(actor);
        let Some(narrowed) = actor_scope.narrow(filter) else {
            return Ok(Vec::new());
        };

        let records = self
            .store
            .list(&narrowed)
            .await
            .map_err(|error| WorkflowError::Unavailable(error.to_string()))?;

        let mut views = Vec::with_capacity(records.len());
        for record in records {
            let Some(placement) = self.directory.placement_of(&record.id.school) else {
                warn!(school = %record.id.school.0, "stored submission references unknown school");
                continue;
            };
            if !actor_scope.permits(placement) || !placement_matches(&narrowed, placement) {
                continue;
            }
            let Some(category) = self.catalog.get(&record.id.category) else {
                warn!(category = %record.id.category.0, "stored submission references unknown category");
                continue;
            };
            views.push(view_of(category, &record));
        }
        Ok(views)
    }

    /// Upsert draft values, one row per column. Creates the submission as
    /// `Draft`; pending and approved submissions are locked against edits.
    pub async fn save_draft(
        &self,
        actor: &Principal,
        school: SchoolId,
        category_id: CategoryId,
        entries: Vec<DraftEntry>,
        at: DateTime<Utc>,
    ) -> Result<SubmissionRecord, WorkflowError> {
        let placement = self.placement(&school)?;
        let category = self.category(&category_id)?;
        // Draft writes share the submit guard: only the owning school (or a
        // superadmin) may touch a school's data.
        scope::can_act(actor, placement, TransitionAction::Submit)
            .map_err(|denial| WorkflowError::PermissionDenied {
                reason: denial.reason,
            })?;

        for entry in &entries {
            if category.column(&entry.column).is_none() {
                return Err(WorkflowError::UnknownColumn(entry.column.clone()));
            }
        }

        let id = SubmissionId {
            school,
            category: category_id,
        };
        if let Some(existing) = self
            .store
            .fetch(&id)
            .await
            .map_err(|error| WorkflowError::from_store(error, &id))?
        {
            if matches!(
                existing.status,
                SubmissionStatus::Pending | SubmissionStatus::Approved
            ) {
                return Err(WorkflowError::SubmissionLocked {
                    status: existing.status,
                });
            }
        }

        let rows = entries
            .into_iter()
            .map(|entry| DataEntry {
                column: entry.column,
                value: entry.value,
                created_by: actor.id.clone(),
                created_at: at,
                updated_at: at,
            })
            .collect();

        self.store
            .upsert_entries(&id, rows, &actor.id, at)
            .await
            .map_err(|error| WorkflowError::from_store(error, &id))
    }

    /// Read-only validation pass for inline field feedback. A submission that
    /// does not exist yet validates as an empty draft.
    pub async fn validate_now(
        &self,
        school: &SchoolId,
        category_id: &CategoryId,
    ) -> Result<ValidationReport, WorkflowError> {
        self.placement(school)?;
        let category = self.category(category_id)?;
        let id = SubmissionId {
            school: school.clone(),
            category: category_id.clone(),
        };
        let record = self
            .store
            .fetch(&id)
            .await
            .map_err(|error| WorkflowError::from_store(error, &id))?
            .unwrap_or_else(|| SubmissionRecord::empty(id.clone(), Utc::now()));
        Ok(validation::validate(category, &record))
    }

    pub async fn submit(
        &self,
        actor: &Principal,
        id: SubmissionId,
        at: DateTime<Utc>,
    ) -> Result<TransitionReceipt, WorkflowError> {
        self.transition(actor, id, TransitionAction::Submit, None, at)
            .await
    }

    pub async fn approve(
        &self,
        actor: &Principal,
        id: SubmissionId,
        at: DateTime<Utc>,
    ) -> Result<TransitionReceipt, WorkflowError> {
        self.transition(actor, id, TransitionAction::Approve, None, at)
            .await
    }

    pub async fn reject(
        &self,
        actor: &Principal,
        id: SubmissionId,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<TransitionReceipt, WorkflowError> {
        self.transition(actor, id, TransitionAction::Reject, Some(reason), at)
            .await
    }

    /// Superadmin-only escape hatch returning an approved submission to
    /// draft. The override is always logged.
    pub async fn reopen(
        &self,
        actor: &Principal,
        id: SubmissionId,
        at: DateTime<Utc>,
    ) -> Result<TransitionReceipt, WorkflowError> {
        self.transition(actor, id, TransitionAction::Reopen, None, at)
            .await
    }

    async fn transition(
        &self,
        actor: &Principal,
        id: SubmissionId,
        action: TransitionAction,
        reason: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<TransitionReceipt, WorkflowError> {
        let placement = self.placement(&id.school)?;
        let category = self.category(&id.category)?;

        let record = self
            .store
            .fetch(&id)
            .await
            .map_err(|error| WorkflowError::from_store(error, &id))?
            .ok_or_else(|| WorkflowError::NotFound(id.clone()))?;

        let report = validation::validate(category, &record);
        let ctx = TransitionContext {
            actor,
            placement,
            record: &record,
            action,
            reason,
            validation: Some(&report),
        };

        match machine::plan(&ctx)? {
            TransitionPlan::AlreadyApplied { status } => Ok(TransitionReceipt {
                id,
                old_status: status,
                new_status: status,
                applied: false,
            }),
            TransitionPlan::Apply {
                from,
                to,
                reason,
                clear_rejection_reason,
            } => {
                if action == TransitionAction::Reopen {
                    warn!(
                        submission = %id,
                        actor = %actor.id.0,
                        "approved submission reopened by superadmin override"
                    );
                }
                self.apply_and_notify(actor, &id, from, to, reason, clear_rejection_reason, at)
                    .await?;
                Ok(TransitionReceipt {
                    id,
                    old_status: from,
                    new_status: to,
                    applied: true,
                })
            }
        }
    }

    async fn apply_and_notify(
        &self,
        actor: &Principal,
        id: &SubmissionId,
        from: SubmissionStatus,
        to: SubmissionStatus,
        reason: Option<String>,
        clear_rejection_reason: bool,
        at: DateTime<Utc>,
    ) -> Result<(), WorkflowError> {
        let update = StatusUpdate {
            id: id.clone(),
            expect: from,
            to,
            reason,
            clear_rejection_reason,
            actor: actor.id.clone(),
            at,
        };
        self.store
            .apply_status(update)
            .await
            .map_err(|error| WorkflowError::from_store(error, id))?;

        let event = TransitionEvent {
            kind: action_for(from, to),
            submission: id.clone(),
            old_status: from,
            new_status: to,
            actor: actor.id.clone(),
        };
        // Fire and forget: a dead notification transport never fails the
        // transition that produced the event.
        if let Err(error) = self.sink.notify(event).await {
            warn!(submission = %id, %error, "notification dispatch failed");
        }
        Ok(())
    }

    /// Preview a bulk action without committing anything.
    pub async fn preview_bulk(
        &self,
        actor: &Principal,
        ids: &[SubmissionId],
        action: TransitionAction,
        reason: Option<&str>,
        params: BulkParams,
    ) -> Result<BulkSummary, WorkflowError> {
        let loaded = self.load_bulk(ids).await?;
        let items = self.bulk_items(&loaded);
        Ok(bulk::assess(actor, action, reason, params, &items).summary)
    }

    pub async fn bulk_approve(
        &self,
        actor: &Principal,
        ids: &[SubmissionId],
        params: BulkParams,
        cancel: Option<&CancelFlag>,
        at: DateTime<Utc>,
    ) -> Result<BulkOutcome, WorkflowError> {
        self.bulk_apply(actor, ids, TransitionAction::Approve, None, params, cancel, at)
            .await
    }

    pub async fn bulk_reject(
        &self,
        actor: &Principal,
        ids: &[SubmissionId],
        reason: &str,
        params: BulkParams,
        cancel: Option<&CancelFlag>,
        at: DateTime<Utc>,
    ) -> Result<BulkOutcome, WorkflowError> {
        // The shared reason is demanded before any store call.
        if reason.trim().is_empty() {
            return Err(WorkflowError::MissingReason);
        }
        self.bulk_apply(
            actor,
            ids,
            TransitionAction::Reject,
            Some(reason),
            params,
            cancel,
            at,
        )
        .await
    }

    async fn bulk_apply(
        &self,
        actor: &Principal,
        ids: &[SubmissionId],
        action: TransitionAction,
        reason: Option<&str>,
        params: BulkParams,
        cancel: Option<&CancelFlag>,
        at: DateTime<Utc>,
    ) -> Result<BulkOutcome, WorkflowError> {
        let loaded = self.load_bulk(ids).await?;
        let items = self.bulk_items(&loaded);
        let assessment = bulk::assess(actor, action, reason, params, &items);

        let mut results = Vec::with_capacity(assessment.items.len());
        let mut processed_count = 0;
        let mut error_count = 0;
        let mut cancelled = false;

        for (id, eligibility) in assessment.items {
            if cancelled || cancel.map(CancelFlag::is_cancelled).unwrap_or(false) {
                cancelled = true;
                results.push(BulkItemResult {
                    id,
                    outcome: BulkItemOutcome::Cancelled,
                });
                continue;
            }

            let outcome = match eligibility {
                ItemEligibility::NotFound => {
                    error_count += 1;
                    BulkItemOutcome::NotFound
                }
                ItemEligibility::Ineligible { reason } => {
                    error_count += 1;
                    BulkItemOutcome::Ineligible { reason }
                }
                ItemEligibility::Eligible {
                    plan: TransitionPlan::AlreadyApplied { .. },
                    ..
                } => {
                    processed_count += 1;
                    BulkItemOutcome::AlreadyApplied
                }
                ItemEligibility::Eligible {
                    plan:
                        TransitionPlan::Apply {
                            from,
                            to,
                            reason,
                            clear_rejection_reason,
                        },
                    ..
                } => {
                    // One item's failure never aborts the batch.
                    match self
                        .apply_and_notify(actor, &id, from, to, reason, clear_rejection_reason, at)
                        .await
                    {
                        Ok(()) => {
                            processed_count += 1;
                            BulkItemOutcome::Applied
                        }
                        Err(error) => {
                            error_count += 1;
                            BulkItemOutcome::Failed {
                                reason: error.to_string(),
                            }
                        }
                    }
                }
            };
            results.push(BulkItemResult { id, outcome });
        }

        Ok(BulkOutcome {
            processed_count,
            error_count,
            cancelled,
            results,
            summary: assessment.summary,
        })
    }

    async fn load_bulk(
        &self,
        ids: &[SubmissionId],
    ) -> Result<Vec<(SubmissionId, Option<SubmissionRecord>)>, WorkflowError> {
        let mut loaded = Vec::with_capacity(ids.len());
        for id in ids {
            let record = self
                .store
                .fetch(id)
                .await
                .map_err(|error| WorkflowError::from_store(error, id))?;
            loaded.push((id.clone(), record));
        }
        Ok(loaded)
    }

    /// Join loaded records with their category and placement references for
    /// the bulk assessor. A record whose school or category is unknown
    /// surfaces as not found rather than a panic.
    fn bulk_items<'a>(
        &'a self,
        loaded: &'a [(SubmissionId, Option<SubmissionRecord>)],
    ) -> Vec<LoadedItem<'a>> {
        loaded
            .iter()
            .map(|(id, record)| LoadedItem {
                id: id.clone(),
                record: record.as_ref(),
                category: self.catalog.get(&id.category),
                placement: self.directory.placement_of(&id.school),
            })
            .collect()
    }

    /// Scope-filtered dashboard: status counts, per-sector and per-region
    /// completion roll-ups, and advisory deadline badges.
    pub async fn dashboard(
        &self,
        actor: &Principal,
        today: NaiveDate,
    ) -> Result<DashboardView, WorkflowError> {
        let actor_scope = scope::scope_for(actor);
        let Some(narrowed) = actor_scope.narrow(SubmissionFilter::default()) else {
            return Ok(DashboardView {
                overall: StatusRollUp::default(),
                sectors: Vec::new(),
                regions: Vec::new(),
                deadlines: Vec::new(),
            });
        };
        let records = self
            .store
            .list(&narrowed)
            .await
            .map_err(|error| WorkflowError::Unavailable(error.to_string()))?;

        let mut scoped: Vec<(&Category, SubmissionRecord, SchoolPlacement)> = Vec::new();
        for record in records {
            let Some(placement) = self.directory.placement_of(&record.id.school) else {
                continue;
            };
            if !actor_scope.permits(placement) {
                continue;
            }
            let Some(category) = self.catalog.get(&record.id.category) else {
                continue;
            };
            scoped.push((category, record, placement.clone()));
        }

        let overall = stats::roll_up(
            scoped
                .iter()
                .map(|(category, record, _)| (*category, record)),
        );

        // School completion is the mean over its submissions; sector
        // completion averages schools, region completion averages sectors.
        let mut school_rates: BTreeMap<SchoolId, Vec<u8>> = BTreeMap::new();
        for (category, record, _) in &scoped {
            school_rates
                .entry(record.id.school.clone())
                .or_default()
                .push(stats::completion_percent(category, record));
        }

        let mut sector_schools: BTreeMap<SectorId, Vec<u8>> = BTreeMap::new();
        for (school, rates) in &school_rates {
            if let Some(placement) = self.directory.placement_of(school) {
                sector_schools
                    .entry(placement.sector.clone())
                    .or_default()
                    .push(stats::average_completion(rates));
            }
        }

        let mut sectors = Vec::with_capacity(sector_schools.len());
        let mut region_sectors: BTreeMap<RegionId, Vec<u8>> = BTreeMap::new();
        for (sector, school_completions) in sector_schools {
            let completion = stats::average_completion(&school_completions);
            let statuses = stats::roll_up(scoped.iter().filter_map(|(category, record, placement)| {
                (placement.sector == sector).then_some((*category, record))
            }));
            if let Some(region) = scoped
                .iter()
                .find(|(_, _, placement)| placement.sector == sector)
                .map(|(_, _, placement)| placement.region.clone())
            {
                region_sectors.entry(region).or_default().push(completion);
            }
            sectors.push(SectorRollUp {
                sector,
                schools_count: school_completions.len(),
                completion,
                statuses,
            });
        }

        let regions = region_sectors
            .into_iter()
            .map(|(region, completions)| RegionRollUp {
                region,
                sectors_count: completions.len(),
                completion: stats::average_completion(&completions),
            })
            .collect();

        let mut deadlines: Vec<DeadlineBadge> = self
            .catalog
            .categories()
            .filter_map(|category| {
                category.deadline.map(|date| DeadlineBadge {
                    category: category.id.clone(),
                    category_name: category.name.clone(),
                    deadline: date,
                    status: deadline::deadline_status(date, today),
                })
            })
            .collect();
        deadlines.sort_by_key(|badge| badge.deadline);

        Ok(DashboardView {
            overall,
            sectors,
            regions,
            deadlines,
        })
    }
}

fn view_of(category: &Category, record: &SubmissionRecord) -> SubmissionView {
    let report = validation::validate(category, record);
    SubmissionView {
        id: record.id.clone(),
        status: record.status.label(),
        category_name: category.name.clone(),
        completion: stats::completion_percent(category, record),
        deadline: category.deadline,
        rejection_reason: record.rejection_reason.clone(),
        has_errors: !report.is_clean(),
        has_warnings: report.has_warnings(),
        updated_at: record.updated_at,
    }
}

fn placement_matches(filter: &SubmissionFilter, placement: &SchoolPlacement) -> bool {
    if let Some(region) = &filter.region {
        if region != &placement.region {
            return false;
        }
    }
    if let Some(sector) = &filter.sector {
        if sector != &placement.sector {
            return false;
        }
    }
    true
}

/// Recover the action label for an applied (from, to) pair so notification
/// events name what happened even when driven by a stored plan.
fn action_for(from: SubmissionStatus, to: SubmissionStatus) -> TransitionAction {
    match (from, to) {
        (_, SubmissionStatus::Pending) => TransitionAction::Submit,
        (_, SubmissionStatus::Approved) => TransitionAction::Approve,
        (_, SubmissionStatus::Rejected) => TransitionAction::Reject,
        (_, SubmissionStatus::Draft) => TransitionAction::Reopen,
    }
}

