use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use eduflow::workflows::submissions::domain::{
    Category, CategoryCatalog, CategoryId, Column, ColumnId, ColumnType, DataEntry, Directory,
    Principal, PrincipalDirectory, PrincipalId, RegionId, Role, SchoolId, SectorId, SubmissionId,
    SubmissionRecord, ValidationRules,
};
use eduflow::workflows::submissions::repository::{
    NotificationSink, NotifyError, StatusUpdate, StoreError, SubmissionFilter, SubmissionStore,
    TransitionEvent,
};
use eduflow::workflows::submissions::watch::ChangeToken;
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::BTreeMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, info};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Mutex-guarded map standing in for the row store. Status writes are
/// compare-and-swap on the expected status so concurrent reviews surface as
/// conflicts instead of lost updates.
#[derive(Default, Clone)]
pub(crate) struct InMemorySubmissionStore {
    records: Arc<Mutex<BTreeMap<SubmissionId, SubmissionRecord>>>,
}

#[async_trait]
impl SubmissionStore for InMemorySubmissionStore {
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

/// Notification sink that writes transition events to the service log and,
/// when wired, pushes change tokens towards the debounced reload feed. A
/// deployment wires a webhook or mail transport here instead.
#[derive(Default, Clone)]
pub(crate) struct LoggingNotificationSink {
    changes: Option<mpsc::Sender<ChangeToken>>,
}

impl LoggingNotificationSink {
    pub(crate) fn with_changes(changes: mpsc::Sender<ChangeToken>) -> Self {
        Self {
            changes: Some(changes),
        }
    }
}

#[async_trait]
impl NotificationSink for LoggingNotificationSink {
    async fn notify(&self, event: TransitionEvent) -> Result<(), NotifyError> {
        info!(
            submission = %event.submission,
            action = %event.kind,
            from = %event.old_status,
            to = %event.new_status,
            actor = %event.actor.0,
            "submission transition"
        );
        if let Some(changes) = &self.changes {
            let scope_key = SubmissionFilter {
                school: Some(event.submission.school.clone()),
                ..SubmissionFilter::default()
            }
            .scope_key();
            // Tokens are advisory; a full channel drops rather than blocks.
            if let Err(err) = changes.try_send(ChangeToken { scope_key }) {
                debug!(%err, "change token dropped");
            }
        }
        Ok(())
    }
}

fn column(id: &str, name: &str, column_type: ColumnType, is_required: bool) -> Column {
    Column {
        id: ColumnId(id.to_string()),
        name: name.to_string(),
        column_type,
        is_required,
        options: Vec::new(),
        rules: None,
    }
}

/// Demo category catalog: an enrollment census due mid-March plus an optional
/// facilities survey.
pub(crate) fn seed_catalog() -> CategoryCatalog {
    CategoryCatalog::new(vec![
        Category {
            id: CategoryId("enrollment-census".to_string()),
            name: "Enrollment Census".to_string(),
            deadline: NaiveDate::from_ymd_opt(2026, 3, 15),
            priority: 1,
            columns: vec![
                Column {
                    rules: Some(ValidationRules {
                        min_length: Some(2),
                        max_length: Some(80),
                        ..ValidationRules::default()
                    }),
                    ..column("head_teacher", "Head teacher", ColumnType::Text, true)
                },
                Column {
                    rules: Some(ValidationRules {
                        min: Some(0.0),
                        max: Some(10_000.0),
                        warn_above: Some(2_500.0),
                        ..ValidationRules::default()
                    }),
                    ..column("pupil_count", "Pupil count", ColumnType::Number, true)
                },
                column(
                    "contact_email",
                    "Contact email",
                    ColumnType::Email,
                    true,
                ),
            ],
        },
        Category {
            id: CategoryId("facilities-survey".to_string()),
            name: "Facilities Survey".to_string(),
            deadline: None,
            priority: 5,
            columns: vec![
                Column {
                    options: vec!["yes".to_string(), "no".to_string()],
                    ..column("has_library", "Has a library", ColumnType::Select, false)
                },
                column("remarks", "Remarks", ColumnType::Text, false),
            ],
        },
    ])
}

/// Demo hierarchy: one region, two sectors, four schools.
pub(crate) fn seed_directory() -> Directory {
    let region = RegionId("region-north".to_string());
    let mut directory = Directory::new();
    directory.add_school(
        SchoolId("school-101".to_string()),
        SectorId("sector-coastal".to_string()),
        region.clone(),
    );
    directory.add_school(
        SchoolId("school-102".to_string()),
        SectorId("sector-coastal".to_string()),
        region.clone(),
    );
    directory.add_school(
        SchoolId("school-201".to_string()),
        SectorId("sector-inland".to_string()),
        region.clone(),
    );
    directory.add_school(
        SchoolId("school-202".to_string()),
        SectorId("sector-inland".to_string()),
        region,
    );
    directory
}

/// Demo principals covering each role in the hierarchy.
pub(crate) fn seed_principals() -> PrincipalDirectory {
    let mut principals = PrincipalDirectory::new();
    principals.register(Principal {
        id: PrincipalId("ministry".to_string()),
        role: Role::SuperAdmin,
    });
    principals.register(Principal {
        id: PrincipalId("north-office".to_string()),
        role: Role::RegionAdmin {
            region_id: RegionId("region-north".to_string()),
        },
    });
    principals.register(Principal {
        id: PrincipalId("coastal-office".to_string()),
        role: Role::SectorAdmin {
            sector_id: SectorId("sector-coastal".to_string()),
        },
    });
    principals.register(Principal {
        id: PrincipalId("inland-office".to_string()),
        role: Role::SectorAdmin {
            sector_id: SectorId("sector-inland".to_string()),
        },
    });
    for school in ["school-101", "school-102", "school-201", "school-202"] {
        principals.register(Principal {
            id: PrincipalId(format!("{school}-office")),
            role: Role::SchoolAdmin {
                school_id: SchoolId(school.to_string()),
            },
        });
    }
    principals
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use eduflow::workflows::submissions::domain::{SubmissionStatus, TransitionAction};

    fn approval_event() -> TransitionEvent {
        TransitionEvent {
            kind: TransitionAction::Approve,
            submission: SubmissionId {
                school: SchoolId("school-101".to_string()),
                category: CategoryId("enrollment-census".to_string()),
            },
            old_status: SubmissionStatus::Pending,
            new_status: SubmissionStatus::Approved,
            actor: PrincipalId("coastal-office".to_string()),
        }
    }

    #[tokio::test]
    async fn full_change_channel_never_fails_a_notification() {
        let (tx, mut rx) = mpsc::channel(1);
        let sink = LoggingNotificationSink::with_changes(tx);

        sink.notify(approval_event()).await.expect("first token fits");
        sink.notify(approval_event())
            .await
            .expect("overflow drops the token, not the notification");

        let token = rx.try_recv().expect("one token delivered");
        assert!(token.scope_key.contains("school-101"));
        assert!(rx.try_recv().is_err());
    }
}
