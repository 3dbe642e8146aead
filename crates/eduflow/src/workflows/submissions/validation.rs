use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::domain::{
    Category, Column, ColumnId, ColumnType, IssueSeverity, SubmissionRecord, ValidationRules,
};

/// Machine-readable classification of a validation finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCode {
    Required,
    DependencyUnmet,
    InvalidNumber,
    OutOfRange,
    OutsideComfortRange,
    TooShort,
    TooLong,
    PatternMismatch,
    UnusablePattern,
    InvalidEmail,
    InvalidPhone,
    InvalidDate,
    DateOutOfRange,
    UnknownOption,
}

/// One finding against one column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldIssue {
    pub column: ColumnId,
    pub code: IssueCode,
    pub message: String,
}

/// Outcome of validating a submission against its category template.
/// Errors block the submit transition; warnings never do.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub errors: Vec<FieldIssue>,
    pub warnings: Vec<FieldIssue>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    fn push(&mut self, severity: IssueSeverity, issue: FieldIssue) {
        match severity {
            IssueSeverity::Error => self.errors.push(issue),
            IssueSeverity::Warning => self.warnings.push(issue),
        }
    }
}

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").expect("static pattern")
    })
}

fn phone_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\+?[0-9][0-9 ()-]{5,18}[0-9]$").expect("static pattern"))
}

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Validate every column of a submission against the category template.
///
/// The engine is pure and deterministic: no I/O, and identical inputs always
/// yield identical reports.
pub fn validate(category: &Category, record: &SubmissionRecord) -> ValidationReport {
    let mut report = ValidationReport::default();
    for column in &category.columns {
        check_column(category, column, record, &mut report);
    }
    report
}

fn check_column(
    category: &Category,
    column: &Column,
    record: &SubmissionRecord,
    report: &mut ValidationReport,
) {
    let dependency = column
        .rules
        .as_ref()
        .and_then(|rules| rules.depends_on.as_ref())
        // A dependency pointing at a column outside the category is inactive.
        .filter(|dependency| category.column(&dependency.column).is_some());

    let value = record.value_of(&column.id);

    if value.is_none() {
        if let Some(dependency) = dependency {
            let reference = record.value_of(&dependency.column);
            if dependency.condition.is_satisfied_by(reference) {
                // A required column stays a hard error even when its
                // dependency is configured at warning severity.
                let severity = if column.is_required {
                    IssueSeverity::Error
                } else {
                    dependency.severity
                };
                report.push(
                    severity,
                    FieldIssue {
                        column: column.id.clone(),
                        code: IssueCode::DependencyUnmet,
                        message: format!(
                            "'{}' is expected while '{}' holds its current value",
                            column.name, dependency.column.0
                        ),
                    },
                );
            }
        } else if column.is_required {
            report.errors.push(FieldIssue {
                column: column.id.clone(),
                code: IssueCode::Required,
                message: format!("'{}' is required", column.name),
            });
        }
        // A blank column runs no further checks.
        return;
    }

    let value = value.unwrap_or_default().trim();
    let rules = column.rules.as_ref();

    if let Some(rules) = rules {
        check_numeric(column, rules, value, report);
        check_length(column, rules, value, report);
        check_pattern(column, rules, value, report);
    }
    check_type(column, rules, value, report);
}

fn check_numeric(
    column: &Column,
    rules: &ValidationRules,
    value: &str,
    report: &mut ValidationReport,
) {
    let wants_number = column.column_type == ColumnType::Number
        || rules.min.is_some()
        || rules.max.is_some()
        || rules.warn_below.is_some()
        || rules.warn_above.is_some();
    if !wants_number {
        return;
    }

    let number: f64 = match value.parse() {
        Ok(number) => number,
        Err(_) => {
            report.errors.push(FieldIssue {
                column: column.id.clone(),
                code: IssueCode::InvalidNumber,
                message: format!("'{}' must be a number", column.name),
            });
            return;
        }
    };

    if let Some(min) = rules.min {
        if number < min {
            report.errors.push(FieldIssue {
                column: column.id.clone(),
                code: IssueCode::OutOfRange,
                message: format!("'{}' must be at least {min}", column.name),
            });
        }
    }
    if let Some(max) = rules.max {
        if number > max {
            report.errors.push(FieldIssue {
                column: column.id.clone(),
                code: IssueCode::OutOfRange,
                message: format!("'{}' must be at most {max}", column.name),
            });
        }
    }
    if let Some(floor) = rules.warn_below {
        if number < floor {
            report.warnings.push(FieldIssue {
                column: column.id.clone(),
                code: IssueCode::OutsideComfortRange,
                message: format!("'{}' is unusually low (below {floor})", column.name),
            });
        }
    }
    if let Some(ceiling) = rules.warn_above {
        if number > ceiling {
            report.warnings.push(FieldIssue {
                column: column.id.clone(),
                code: IssueCode::OutsideComfortRange,
                message: format!("'{}' is unusually high (above {ceiling})", column.name),
            });
        }
    }
}

fn check_length(
    column: &Column,
    rules: &ValidationRules,
    value: &str,
    report: &mut ValidationReport,
) {
    let length = value.chars().count();
    if let Some(min_length) = rules.min_length {
        if length < min_length {
            report.errors.push(FieldIssue {
                column: column.id.clone(),
                code: IssueCode::TooShort,
                message: format!("'{}' must be at least {min_length} characters", column.name),
            });
        }
    }
    if let Some(max_length) = rules.max_length {
        if length > max_length {
            report.errors.push(FieldIssue {
                column: column.id.clone(),
                code: IssueCode::TooLong,
                message: format!("'{}' must be at most {max_length} characters", column.name),
            });
        }
    }
}

fn check_pattern(
    column: &Column,
    rules: &ValidationRules,
    value: &str,
    report: &mut ValidationReport,
) {
    let Some(pattern) = rules.pattern.as_deref() else {
        return;
    };

    match Regex::new(pattern) {
        Ok(regex) => {
            if !regex.is_match(value) {
                let message = rules
                    .pattern_message
                    .clone()
                    .unwrap_or_else(|| format!("'{}' has an invalid format", column.name));
                report.errors.push(FieldIssue {
                    column: column.id.clone(),
                    code: IssueCode::PatternMismatch,
                    message,
                });
            }
        }
        // An admin misconfiguration must not block submitters.
        Err(_) => report.warnings.push(FieldIssue {
            column: column.id.clone(),
            code: IssueCode::UnusablePattern,
            message: format!("pattern configured for '{}' does not compile", column.name),
        }),
    }
}

fn check_type(
    column: &Column,
    rules: Option<&ValidationRules>,
    value: &str,
    report: &mut ValidationReport,
) {
    match column.column_type {
        ColumnType::Email => {
            if !email_pattern().is_match(value) {
                report.errors.push(FieldIssue {
                    column: column.id.clone(),
                    code: IssueCode::InvalidEmail,
                    message: format!("'{}' must be a valid e-mail address", column.name),
                });
            }
        }
        ColumnType::Phone => {
            if !phone_pattern().is_match(value) {
                report.errors.push(FieldIssue {
                    column: column.id.clone(),
                    code: IssueCode::InvalidPhone,
                    message: format!("'{}' must be a valid phone number", column.name),
                });
            }
        }
        ColumnType::Date => check_date(column, rules, value, report),
        ColumnType::Select => {
            if !column.options.iter().any(|option| option == value) {
                report.errors.push(FieldIssue {
                    column: column.id.clone(),
                    code: IssueCode::UnknownOption,
                    message: format!("'{value}' is not an option for '{}'", column.name),
                });
            }
        }
        ColumnType::Text | ColumnType::Number => {}
    }
}

fn check_date(
    column: &Column,
    rules: Option<&ValidationRules>,
    value: &str,
    report: &mut ValidationReport,
) {
    let date = match NaiveDate::parse_from_str(value, DATE_FORMAT) {
        Ok(date) => date,
        Err(_) => {
            report.errors.push(FieldIssue {
                column: column.id.clone(),
                code: IssueCode::InvalidDate,
                message: format!("'{}' must be a date in YYYY-MM-DD format", column.name),
            });
            return;
        }
    };

    let Some(rules) = rules else {
        return;
    };
    if let Some(min_date) = rules.min_date {
        if date < min_date {
            report.errors.push(FieldIssue {
                column: column.id.clone(),
                code: IssueCode::DateOutOfRange,
                message: format!("'{}' must not be before {min_date}", column.name),
            });
        }
    }
    if let Some(max_date) = rules.max_date {
        if date > max_date {
            report.errors.push(FieldIssue {
                column: column.id.clone(),
                code: IssueCode::DateOutOfRange,
                message: format!("'{}' must not be after {max_date}", column.name),
            });
        }
    }
}
