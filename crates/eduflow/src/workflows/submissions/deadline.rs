use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// How many days out a deadline starts counting as "due soon".
pub const DUE_SOON_WINDOW_DAYS: i64 = 3;

/// Advisory badge for a category deadline. Deadlines never block a
/// submission; they only annotate dashboards and listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DeadlineStatus {
    Open,
    DueSoon { days_left: i64 },
    Overdue { days_overdue: i64 },
}

/// Classify a deadline relative to today.
pub fn deadline_status(deadline: NaiveDate, today: NaiveDate) -> DeadlineStatus {
    let days_left = (deadline - today).num_days();
    if days_left < 0 {
        DeadlineStatus::Overdue {
            days_overdue: -days_left,
        }
    } else if days_left <= DUE_SOON_WINDOW_DAYS {
        DeadlineStatus::DueSoon { days_left }
    } else {
        DeadlineStatus::Open
    }
}
