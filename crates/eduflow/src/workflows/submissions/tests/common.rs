use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::http::StatusCode;
use axum::response::Response;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde_json::Value;

use crate::workflows::submissions::domain::{
    Category, CategoryCatalog, CategoryId, Column, ColumnId, ColumnType, DataEntry, Dependency,
    DependencyCondition, Directory, IssueSeverity, Principal, PrincipalDirectory, PrincipalId,
    RegionId, Role, SchoolId, SectorId, SubmissionId, SubmissionRecord, SubmissionStatus,
    ValidationRules,
};
use crate::workflows::submissions::repository::{
    NotificationSink, NotifyError, StatusUpdate, StoreError, SubmissionFilter, SubmissionStore,
    TransitionEvent,
};
use crate::workflows::submissions::service::{DraftEntry, SubmissionWorkflowService};
use crate::workflows::submissions::submission_router;

pub(super) fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).single().expect("valid timestamp")
}

pub(super) fn today() -> NaiveDate {
    now().date_naive()
}

pub(super) fn region() -> RegionId {
    RegionId("r-north".to_string())
}

pub(super) fn sector_alpha() -> SectorId {
    SectorId("s-alpha".to_string())
}

pub(super) fn sector_beta() -> SectorId {
    SectorId("s-beta".to_string())
}

pub(super) fn school(id: &str) -> SchoolId {
    SchoolId(id.to_string())
}

/// One region, two sectors, three schools: sch-01 and sch-02 under s-alpha,
/// sch-03 under s-beta.
pub(super) fn directory() -> Directory {
    let mut directory = Directory::new();
    directory.add_school(school("sch-01"), sector_alpha(), region());
    directory.add_school(school("sch-02"), sector_alpha(), region());
    directory.add_school(school("sch-03"), sector_beta(), region());
    directory
}

pub(super) fn column(id: &str, column_type: ColumnType, is_required: bool) -> Column {
    Column {
        id: ColumnId(id.to_string()),
        name: id.to_string(),
        column_type,
        is_required,
        options: Vec::new(),
        rules: None,
    }
}

/// Category with the full rule surface: requiredness, numeric bounds with a
/// warning ceiling, lengths, type checks, a select, and a dependency.
pub(super) fn enrollment_category() -> Category {
    Category {
        id: CategoryId("cat-enrollment".to_string()),
        name: "Enrollment".to_string(),
        deadline: Some(NaiveDate::from_ymd_opt(2026, 3, 4).expect("valid date")),
        priority: 1,
        columns: vec![
            Column {
                rules: Some(ValidationRules {
                    min_length: Some(2),
                    max_length: Some(50),
                    ..ValidationRules::default()
                }),
                ..column("principal_name", ColumnType::Text, true)
            },
            Column {
                rules: Some(ValidationRules {
                    min: Some(0.0),
                    max: Some(5000.0),
                    warn_above: Some(2000.0),
                    ..ValidationRules::default()
                }),
                ..column("student_count", ColumnType::Number, true)
            },
            column("contact_email", ColumnType::Email, true),
            column("contact_phone", ColumnType::Phone, false),
            Column {
                rules: Some(ValidationRules {
                    min_date: NaiveDate::from_ymd_opt(1900, 1, 1),
                    ..ValidationRules::default()
                }),
                ..column("opened_on", ColumnType::Date, false)
            },
            Column {
                options: vec!["yes".to_string(), "no".to_string()],
                ..column("meal_program", ColumnType::Select, false)
            },
            Column {
                rules: Some(ValidationRules {
                    depends_on: Some(Dependency {
                        column: ColumnId("meal_program".to_string()),
                        condition: DependencyCondition::Equal("yes".to_string()),
                        severity: IssueSeverity::Error,
                    }),
                    ..ValidationRules::default()
                }),
                ..column("meal_vendor", ColumnType::Text, false)
            },
        ],
    }
}

/// Category without required columns; completion must report 0, not NaN.
pub(super) fn notes_category() -> Category {
    Category {
        id: CategoryId("cat-notes".to_string()),
        name: "Notes".to_string(),
        deadline: None,
        priority: 9,
        columns: vec![column("remarks", ColumnType::Text, false)],
    }
}

pub(super) fn catalog() -> CategoryCatalog {
    CategoryCatalog::new(vec![enrollment_category(), notes_category()])
}

pub(super) fn superadmin() -> Principal {
    Principal {
        id: PrincipalId("root".to_string()),
        role: Role::SuperAdmin,
    }
}

pub(super) fn region_admin() -> Principal {
    Principal {
        id: PrincipalId("ra-north".to_string()),
        role: Role::RegionAdmin {
            region_id: region(),
        },
    }
}

pub(super) fn sector_admin_alpha() -> Principal {
    Principal {
        id: PrincipalId("sa-alpha".to_string()),
        role: Role::SectorAdmin {
            sector_id: sector_alpha(),
        },
    }
}

pub(super) fn sector_admin_beta() -> Principal {
    Principal {
        id: PrincipalId("sa-beta".to_string()),
        role: Role::SectorAdmin {
            sector_id: sector_beta(),
        },
    }
}

pub(super) fn school_admin(school_id: &str) -> Principal {
    Principal {
        id: PrincipalId(format!("sc-{school_id}")),
        role: Role::SchoolAdmin {
            school_id: school(school_id),
        },
    }
}

pub(super) fn principals() -> PrincipalDirectory {
    let mut principals = PrincipalDirectory::new();
    principals.register(superadmin());
    principals.register(region_admin());
    principals.register(sector_admin_alpha());
    principals.register(sector_admin_beta());
    principals.register(school_admin("sch-01"));
    principals.register(school_admin("sch-02"));
    principals.register(school_admin("sch-03"));
    principals
}

pub(super) fn submission_id(school_id: &str, category_id: &str) -> SubmissionId {
    SubmissionId {
        school: school(school_id),
        category: CategoryId(category_id.to_string()),
    }
}

pub(super) fn entry(column_id: &str, value: &str) -> DataEntry {
    DataEntry {
        column: ColumnId(column_id.to_string()),
        value: Some(value.to_string()),
        created_by: PrincipalId("sc-sch-01".to_string()),
        created_at: now(),
        updated_at: now(),
    }
}

pub(super) fn draft_entry(column_id: &str, value: &str) -> DraftEntry {
    DraftEntry {
        column: ColumnId(column_id.to_string()),
        value: Some(value.to_string()),
    }
}

/// Values passing every rule of the enrollment category.
pub(super) fn complete_values() -> Vec<(&'static str, &'static str)> {
    vec![
        ("principal_name", "Leyla Aliyeva"),
        ("student_count", "640"),
        ("contact_email", "office@sch01.example.org"),
    ]
}

pub(super) fn record_with(
    school_id: &str,
    category_id: &str,
    status: SubmissionStatus,
    values: &[(&str, &str)],
) -> SubmissionRecord {
    let mut record = SubmissionRecord::empty(submission_id(school_id, category_id), now());
    record.status = status;
    for (column_id, value) in values {
        record
            .entries
            .insert(ColumnId(column_id.to_string()), entry(column_id, value));
    }
    record
}

#[derive(Default, Clone)]
pub(super) struct MemoryStore {
    pub(super) records: Arc<Mutex<BTreeMap<SubmissionId, SubmissionRecord>>>,
}

impl MemoryStore {
    pub(super) fn seed(&self, record: SubmissionRecord) {
        self.records
            .lock()
            .expect("store mutex poisoned")
            .insert(record.id.clone(), record);
    }

    pub(super) fn status_of(&self, id: &SubmissionId) -> Option<SubmissionStatus> {
        self.records
            .lock()
            .expect("store mutex poisoned")
            .get(id)
            .map(|record| record.status)
    }
}

#[async_trait]
impl SubmissionStore for MemoryStore {
    async fn list(&self, filter: &SubmissionFilter) -> Result<Vec<SubmissionRecord>, StoreError> {
        let guard = self.records.lock().expect("store mutex poisoned");
        Ok(guard
            .values()
            .filter(|record| filter.matches_record(record))
            .cloned()
            .collect())
    }

    async fn fetch(&self, id: &SubmissionId) -> Result<Option<SubmissionRecord>, StoreError> {
        let guard = self.records.lock().expect("store mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    async fn upsert_entries(
        &self,
        id: &SubmissionId,
        rows: Vec<DataEntry>,
        actor: &PrincipalId,
        at: DateTime<Utc>,
    ) -> Result<SubmissionRecord, StoreError> {
        let mut guard = self.records.lock().expect("store mutex poisoned");
        let record = guard
            .entry(id.clone())
            .or_insert_with(|| SubmissionRecord::empty(id.clone(), at));
        for row in rows {
            match record.entries.get_mut(&row.column) {
                Some(existing) => {
                    existing.value = row.value;
                    existing.updated_at = at;
                }
                None => {
                    record.entries.insert(row.column.clone(), row);
                }
            }
        }
        record.updated_by = Some(actor.clone());
        record.updated_at = at;
        Ok(record.clone())
    }

    async fn apply_status(&self, update: StatusUpdate) -> Result<SubmissionRecord, StoreError> {
        let mut guard = self.records.lock().expect("store mutex poisoned");
        let record = guard.get_mut(&update.id).ok_or(StoreError::NotFound)?;
        if record.status != update.expect {
            return Err(StoreError::StatusConflict {
                current: record.status,
            });
        }
        record.status = update.to;
        if update.clear_rejection_reason {
            record.rejection_reason = None;
        }
        if let Some(reason) = update.reason {
            record.rejection_reason = Some(reason);
        }
        record.updated_by = Some(update.actor);
        record.updated_at = update.at;
        Ok(record.clone())
    }
}

#[derive(Default, Clone)]
pub(super) struct RecordingSink {
    events: Arc<Mutex<Vec<TransitionEvent>>>,
}

impl RecordingSink {
    pub(super) fn events(&self) -> Vec<TransitionEvent> {
        self.events.lock().expect("sink mutex poisoned").clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn notify(&self, event: TransitionEvent) -> Result<(), NotifyError> {
        self.events
            .lock()
            .expect("sink mutex poisoned")
            .push(event);
        Ok(())
    }
}

/// Sink whose transport is always down; transitions must still succeed.
pub(super) struct DeadSink;

#[async_trait]
impl NotificationSink for DeadSink {
    async fn notify(&self, _event: TransitionEvent) -> Result<(), NotifyError> {
        Err(NotifyError::Transport("webhook offline".to_string()))
    }
}

/// Store wrapper that answers every status write with a conflict, simulating
/// a concurrent transition between load and write.
pub(super) struct ConflictingStore {
    pub(super) inner: MemoryStore,
}

#[async_trait]
impl SubmissionStore for ConflictingStore {
    async fn list(&self, filter: &SubmissionFilter) -> Result<Vec<SubmissionRecord>, StoreError> {
        self.inner.list(filter).await
    }

    async fn fetch(&self, id: &SubmissionId) -> Result<Option<SubmissionRecord>, StoreError> {
        self.inner.fetch(id).await
    }

    async fn upsert_entries(
        &self,
        id: &SubmissionId,
        rows: Vec<DataEntry>,
        actor: &PrincipalId,
        at: DateTime<Utc>,
    ) -> Result<SubmissionRecord, StoreError> {
        self.inner.upsert_entries(id, rows, actor, at).await
    }

    async fn apply_status(&self, _update: StatusUpdate) -> Result<SubmissionRecord, StoreError> {
        Err(StoreError::StatusConflict {
            current: SubmissionStatus::Approved,
        })
    }
}

/// Store that is offline for every call.
pub(super) struct UnavailableStore;

#[async_trait]
impl SubmissionStore for UnavailableStore {
    async fn list(&self, _filter: &SubmissionFilter) -> Result<Vec<SubmissionRecord>, StoreError> {
        Err(StoreError::Unavailable("row store offline".to_string()))
    }

    async fn fetch(&self, _id: &SubmissionId) -> Result<Option<SubmissionRecord>, StoreError> {
        Err(StoreError::Unavailable("row store offline".to_string()))
    }

    async fn upsert_entries(
        &self,
        _id: &SubmissionId,
        _rows: Vec<DataEntry>,
        _actor: &PrincipalId,
        _at: DateTime<Utc>,
    ) -> Result<SubmissionRecord, StoreError> {
        Err(StoreError::Unavailable("row store offline".to_string()))
    }

    async fn apply_status(&self, _update: StatusUpdate) -> Result<SubmissionRecord, StoreError> {
        Err(StoreError::Unavailable("row store offline".to_string()))
    }
}

pub(super) fn build_service() -> (
    SubmissionWorkflowService<MemoryStore, RecordingSink>,
    Arc<MemoryStore>,
    Arc<RecordingSink>,
) {
    let store = Arc::new(MemoryStore::default());
    let sink = Arc::new(RecordingSink::default());
    let service = SubmissionWorkflowService::new(
        store.clone(),
        sink.clone(),
        Arc::new(catalog()),
        Arc::new(directory()),
    );
    (service, store, sink)
}

pub(super) fn service_with<S, N>(
    store: Arc<S>,
    sink: Arc<N>,
    catalog: CategoryCatalog,
    directory: Directory,
) -> SubmissionWorkflowService<S, N>
where
    S: SubmissionStore + 'static,
    N: NotificationSink + 'static,
{
    SubmissionWorkflowService::new(store, sink, Arc::new(catalog), Arc::new(directory))
}

pub(super) fn workflow_router() -> (axum::Router, Arc<MemoryStore>, Arc<RecordingSink>) {
    let (service, store, sink) = build_service();
    let router = submission_router(Arc::new(service), Arc::new(principals()));
    (router, store, sink)
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

pub(super) fn assert_status(response: &Response, expected: StatusCode) {
    assert_eq!(response.status(), expected);
}
