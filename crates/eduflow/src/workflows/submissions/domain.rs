use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for a region, the root of the organizational tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegionId(pub String);

/// Identifier wrapper for a sector inside a region.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SectorId(pub String);

/// Identifier wrapper for a school inside a sector.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SchoolId(pub String);

/// Identifier wrapper for a published data-collection category.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CategoryId(pub String);

/// Identifier wrapper for a column definition within a category.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ColumnId(pub String);

/// Identifier wrapper for an authenticated principal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PrincipalId(pub String);

/// Role held by a principal; the scoping id lives inside the variant so an
/// unscoped lower role is unrepresentable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Role {
    SuperAdmin,
    RegionAdmin { region_id: RegionId },
    SectorAdmin { sector_id: SectorId },
    SchoolAdmin { school_id: SchoolId },
}

impl Role {
    pub const fn label(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "superadmin",
            Role::RegionAdmin { .. } => "regionadmin",
            Role::SectorAdmin { .. } => "sectoradmin",
            Role::SchoolAdmin { .. } => "schooladmin",
        }
    }
}

/// An authenticated actor with a role and the scope that role carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: PrincipalId,
    pub role: Role,
}

/// Fully resolved position of a school within the hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchoolPlacement {
    pub school: SchoolId,
    pub sector: SectorId,
    pub region: RegionId,
}

/// Immutable snapshot of the region/sector/school tree for one workflow run.
#[derive(Debug, Clone, Default)]
pub struct Directory {
    placements: BTreeMap<SchoolId, SchoolPlacement>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a school under its sector and region. Later registrations of
    /// the same school replace the earlier placement.
    pub fn add_school(&mut self, school: SchoolId, sector: SectorId, region: RegionId) {
        self.placements.insert(
            school.clone(),
            SchoolPlacement {
                school,
                sector,
                region,
            },
        );
    }

    pub fn placement_of(&self, school: &SchoolId) -> Option<&SchoolPlacement> {
        self.placements.get(school)
    }

    pub fn schools(&self) -> impl Iterator<Item = &SchoolPlacement> {
        self.placements.values()
    }
}

/// Directory of known principals so transports can resolve an actor id.
#[derive(Debug, Clone, Default)]
pub struct PrincipalDirectory {
    principals: BTreeMap<PrincipalId, Principal>,
}

impl PrincipalDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, principal: Principal) {
        self.principals.insert(principal.id.clone(), principal);
    }

    pub fn resolve(&self, id: &PrincipalId) -> Option<&Principal> {
        self.principals.get(id)
    }
}

/// Primitive type of a column value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Text,
    Number,
    Email,
    Phone,
    Date,
    Select,
}

/// Condition evaluated against another column's current value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "condition", content = "value", rename_all = "snake_case")]
pub enum DependencyCondition {
    Equal(String),
    NotEqual(String),
    In(Vec<String>),
    NotIn(Vec<String>),
}

impl DependencyCondition {
    /// Evaluate the condition against the referenced column's raw value.
    /// A blank reference value compares as the empty string.
    pub fn is_satisfied_by(&self, value: Option<&str>) -> bool {
        let value = value.map(str::trim).unwrap_or_default();
        match self {
            DependencyCondition::Equal(expected) => value == expected,
            DependencyCondition::NotEqual(expected) => value != expected,
            DependencyCondition::In(options) => options.iter().any(|option| option == value),
            DependencyCondition::NotIn(options) => options.iter().all(|option| option != value),
        }
    }
}

/// Severity a rule reports when it fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Error,
    Warning,
}

impl Default for IssueSeverity {
    fn default() -> Self {
        IssueSeverity::Error
    }
}

/// "This column is expected only while another column satisfies a condition."
/// On a column that is also marked required, a satisfied condition always
/// reports at error severity; `severity` only softens optional columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub column: ColumnId,
    pub condition: DependencyCondition,
    #[serde(default)]
    pub severity: IssueSeverity,
}

/// Declarative validation rules attached to a column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationRules {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub warn_below: Option<f64>,
    pub warn_above: Option<f64>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub pattern: Option<String>,
    pub pattern_message: Option<String>,
    pub min_date: Option<NaiveDate>,
    pub max_date: Option<NaiveDate>,
    pub depends_on: Option<Dependency>,
}

/// Column definition inside a category template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub id: ColumnId,
    pub name: String,
    pub column_type: ColumnType,
    pub is_required: bool,
    /// Allowed values for `Select` columns; ignored for other types.
    #[serde(default)]
    pub options: Vec<String>,
    pub rules: Option<ValidationRules>,
}

/// Named template of required data with an advisory deadline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub deadline: Option<NaiveDate>,
    pub priority: u8,
    pub columns: Vec<Column>,
}

impl Category {
    pub fn column(&self, id: &ColumnId) -> Option<&Column> {
        self.columns.iter().find(|column| &column.id == id)
    }

    pub fn required_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|column| column.is_required)
    }
}

/// Published categories supplied at service construction; immutable afterwards.
#[derive(Debug, Clone, Default)]
pub struct CategoryCatalog {
    categories: BTreeMap<CategoryId, Category>,
}

impl CategoryCatalog {
    pub fn new(categories: Vec<Category>) -> Self {
        Self {
            categories: categories
                .into_iter()
                .map(|category| (category.id.clone(), category))
                .collect(),
        }
    }

    pub fn get(&self, id: &CategoryId) -> Option<&Category> {
        self.categories.get(id)
    }

    pub fn categories(&self) -> impl Iterator<Item = &Category> {
        self.categories.values()
    }
}

/// One submitted value for one (school, category, column) triple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataEntry {
    pub column: ColumnId,
    pub value: Option<String>,
    pub created_by: PrincipalId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DataEntry {
    /// Blankness covers absent values, whitespace-only strings, and the
    /// serialized empty array some clients send for cleared multi-selects.
    pub fn is_blank(&self) -> bool {
        match self.value.as_deref().map(str::trim) {
            None | Some("") | Some("[]") => true,
            Some(_) => false,
        }
    }
}

/// Lifecycle state shared by every row of a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Draft,
    Pending,
    Approved,
    Rejected,
}

impl SubmissionStatus {
    pub const fn label(self) -> &'static str {
        match self {
            SubmissionStatus::Draft => "draft",
            SubmissionStatus::Pending => "pending",
            SubmissionStatus::Approved => "approved",
            SubmissionStatus::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A submission is keyed by the (school, category) pair it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubmissionId {
    pub school: SchoolId,
    pub category: CategoryId,
}

impl std::fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.school.0, self.category.0)
    }
}

/// All data-entry rows for one (school, category) pair plus the shared
/// lifecycle state. Rows always change status together as one batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub id: SubmissionId,
    pub status: SubmissionStatus,
    pub entries: BTreeMap<ColumnId, DataEntry>,
    pub rejection_reason: Option<String>,
    pub updated_by: Option<PrincipalId>,
    pub updated_at: DateTime<Utc>,
}

impl SubmissionRecord {
    pub fn empty(id: SubmissionId, at: DateTime<Utc>) -> Self {
        Self {
            id,
            status: SubmissionStatus::Draft,
            entries: BTreeMap::new(),
            rejection_reason: None,
            updated_by: None,
            updated_at: at,
        }
    }

    /// Raw value of a column, `None` when the row is absent or blank.
    pub fn value_of(&self, column: &ColumnId) -> Option<&str> {
        self.entries
            .get(column)
            .filter(|entry| !entry.is_blank())
            .and_then(|entry| entry.value.as_deref())
    }

    pub fn is_column_blank(&self, column: &ColumnId) -> bool {
        self.entries
            .get(column)
            .map(DataEntry::is_blank)
            .unwrap_or(true)
    }
}

/// Actions a principal may attempt against a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionAction {
    Submit,
    Approve,
    Reject,
    Reopen,
}

impl TransitionAction {
    pub const fn label(self) -> &'static str {
        match self {
            TransitionAction::Submit => "submit",
            TransitionAction::Approve => "approve",
            TransitionAction::Reject => "reject",
            TransitionAction::Reopen => "reopen",
        }
    }

    /// Status the action drives a submission towards.
    pub const fn target_status(self) -> SubmissionStatus {
        match self {
            TransitionAction::Submit => SubmissionStatus::Pending,
            TransitionAction::Approve => SubmissionStatus::Approved,
            TransitionAction::Reject => SubmissionStatus::Rejected,
            TransitionAction::Reopen => SubmissionStatus::Draft,
        }
    }
}

impl std::fmt::Display for TransitionAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
