use serde::{Deserialize, Serialize};

use super::domain::{Category, SubmissionRecord, SubmissionStatus};

/// Completion of one submission: filled required columns over total required
/// columns, rounded to the nearest integer percent. A category without
/// required columns reports 0, never a division error.
pub fn completion_percent(category: &Category, record: &SubmissionRecord) -> u8 {
    let required: Vec<_> = category.required_columns().collect();
    if required.is_empty() {
        return 0;
    }
    let filled = required
        .iter()
        .filter(|column| !record.is_column_blank(&column.id))
        .count();
    ((filled as f64 / required.len() as f64) * 100.0).round() as u8
}

/// Status counts plus the unweighted average completion over a set of
/// submissions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRollUp {
    pub total: usize,
    pub draft: usize,
    pub pending: usize,
    pub approved: usize,
    pub rejected: usize,
    pub average_completion: u8,
}

/// Roll statistics up over (category, submission) pairs. Always recomputed
/// from current rows; nothing is incrementally maintained.
pub fn roll_up<'a, I>(items: I) -> StatusRollUp
where
    I: IntoIterator<Item = (&'a Category, &'a SubmissionRecord)>,
{
    let mut roll = StatusRollUp::default();
    let mut completion_sum: u64 = 0;

    for (category, record) in items {
        roll.total += 1;
        match record.status {
            SubmissionStatus::Draft => roll.draft += 1,
            SubmissionStatus::Pending => roll.pending += 1,
            SubmissionStatus::Approved => roll.approved += 1,
            SubmissionStatus::Rejected => roll.rejected += 1,
        }
        completion_sum += u64::from(completion_percent(category, record));
    }

    if roll.total > 0 {
        roll.average_completion = (completion_sum as f64 / roll.total as f64).round() as u8;
    }
    roll
}

/// Unweighted mean of child completion rates. Sector completion averages its
/// schools, region completion averages its sectors; deliberately not weighted
/// by column or record count so dashboards stay consistent with the historic
/// numbers.
pub fn average_completion(rates: &[u8]) -> u8 {
    if rates.is_empty() {
        return 0;
    }
    let sum: u64 = rates.iter().map(|rate| u64::from(*rate)).sum();
    (sum as f64 / rates.len() as f64).round() as u8
}
