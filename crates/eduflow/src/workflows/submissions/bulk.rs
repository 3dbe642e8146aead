use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::domain::{
    Category, Principal, SchoolPlacement, SubmissionId, SubmissionRecord, TransitionAction,
};
use super::machine::{self, TransitionContext, TransitionPlan};
use super::stats;
use super::validation::{self, ValidationReport};

/// Caller-tunable knobs for a bulk action.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkParams {
    /// Admit records whose validation reports errors or warnings. Permission
    /// guards are never bypassable.
    #[serde(default)]
    pub bypass_validation: bool,
}

/// Cooperative cancellation handle checked between items. Work already
/// committed when the flag flips stays committed.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Outcome for one submission inside a bulk batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BulkItemOutcome {
    /// Transition executed and persisted.
    Applied,
    /// Already in the target status; counted as processed, no notification.
    AlreadyApplied,
    /// Guard or validation blocked the item before execution.
    Ineligible { reason: String },
    /// Execution failed, e.g. a concurrent status change at the store.
    Failed { reason: String },
    /// The batch was cancelled before this item was visited.
    Cancelled,
    /// The referenced submission does not exist.
    NotFound,
}

/// Per-item result reported back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkItemResult {
    pub id: SubmissionId,
    #[serde(flatten)]
    pub outcome: BulkItemOutcome,
}

/// Pre-execution aggregate so a caller can preview consequences before
/// committing a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkSummary {
    pub average_completion: u8,
    pub schools_count: usize,
    pub categories_count: usize,
    pub has_errors: bool,
    pub has_warnings: bool,
    pub can_approve_all: bool,
    pub requires_manual_review: bool,
}

/// Final report for an executed batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkOutcome {
    pub processed_count: usize,
    pub error_count: usize,
    pub cancelled: bool,
    pub results: Vec<BulkItemResult>,
    pub summary: BulkSummary,
}

/// One loaded item ready for assessment.
#[derive(Debug)]
pub struct LoadedItem<'a> {
    pub id: SubmissionId,
    pub record: Option<&'a SubmissionRecord>,
    pub category: Option<&'a Category>,
    pub placement: Option<&'a SchoolPlacement>,
}

/// Eligibility decision for one item, taken before any store write.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemEligibility {
    Eligible {
        plan: TransitionPlan,
        report: ValidationReport,
    },
    Ineligible {
        reason: String,
    },
    NotFound,
}

/// Assessment of a whole batch: per-item eligibility plus the summary that
/// callers preview before committing.
#[derive(Debug)]
pub struct BulkAssessment {
    pub items: Vec<(SubmissionId, ItemEligibility)>,
    pub summary: BulkSummary,
}

/// Assess a batch without touching the store. Items failing a permission
/// guard or (unless bypassed) validation are partitioned out as ineligible;
/// the summary is computed over every item that resolved to a record.
pub fn assess(
    actor: &Principal,
    action: TransitionAction,
    reason: Option<&str>,
    params: BulkParams,
    items: &[LoadedItem<'_>],
) -> BulkAssessment {
    let mut assessed = Vec::with_capacity(items.len());
    let mut schools = BTreeSet::new();
    let mut categories = BTreeSet::new();
    let mut completions = Vec::new();
    let mut has_errors = false;
    let mut has_warnings = false;
    let mut all_eligible = true;

    for item in items {
        let (record, category, placement) = match (item.record, item.category, item.placement) {
            (Some(record), Some(category), Some(placement)) => (record, category, placement),
            _ => {
                assessed.push((item.id.clone(), ItemEligibility::NotFound));
                all_eligible = false;
                continue;
            }
        };

        schools.insert(item.id.school.clone());
        categories.insert(item.id.category.clone());
        completions.push(stats::completion_percent(category, record));

        let report = validation::validate(category, record);
        has_errors |= !report.is_clean();
        has_warnings |= report.has_warnings();

        if !params.bypass_validation && !report.is_clean() {
            assessed.push((
                item.id.clone(),
                ItemEligibility::Ineligible {
                    reason: format!("validation reports {} error(s)", report.errors.len()),
                },
            ));
            all_eligible = false;
            continue;
        }

        let ctx = TransitionContext {
            actor,
            placement,
            record,
            action,
            reason,
            validation: Some(&report),
        };
        match machine::plan(&ctx) {
            Ok(plan) => {
                assessed.push((item.id.clone(), ItemEligibility::Eligible { plan, report }))
            }
            Err(error) => {
                assessed.push((
                    item.id.clone(),
                    ItemEligibility::Ineligible {
                        reason: error.to_string(),
                    },
                ));
                all_eligible = false;
            }
        }
    }

    let summary = BulkSummary {
        average_completion: stats::average_completion(&completions),
        schools_count: schools.len(),
        categories_count: categories.len(),
        has_errors,
        has_warnings,
        can_approve_all: all_eligible && !assessed.is_empty(),
        requires_manual_review: has_errors || has_warnings,
    };

    BulkAssessment {
        items: assessed,
        summary,
    }
}
