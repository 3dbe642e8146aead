use serde::{Deserialize, Serialize};

use super::domain::{
    Principal, RegionId, Role, SchoolId, SchoolPlacement, SectorId, TransitionAction,
};
use super::repository::SubmissionFilter;

/// The slice of the hierarchy a principal may read or act upon.
/// All fields `None` means unrestricted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessScope {
    pub region: Option<RegionId>,
    pub sector: Option<SectorId>,
    pub school: Option<SchoolId>,
}

/// Guard failure raised when a principal steps outside their scope.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("permission denied: {reason}")]
pub struct ScopeDenial {
    pub reason: String,
}

impl ScopeDenial {
    fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl AccessScope {
    pub fn unrestricted() -> Self {
        Self::default()
    }

    /// Whether a school placement falls inside this scope.
    pub fn permits(&self, placement: &SchoolPlacement) -> bool {
        if let Some(region) = &self.region {
            if region != &placement.region {
                return false;
            }
        }
        if let Some(sector) = &self.sector {
            if sector != &placement.sector {
                return false;
            }
        }
        if let Some(school) = &self.school {
            if school != &placement.school {
                return false;
            }
        }
        true
    }

    /// AND this scope into a caller-supplied filter. Returns `None` when the
    /// filter asks for entities the scope can never reach, in which case the
    /// caller answers with an empty list instead of querying.
    pub fn narrow(&self, mut filter: SubmissionFilter) -> Option<SubmissionFilter> {
        match (&self.region, &mut filter.region) {
            (Some(scoped), Some(requested)) if *requested != *scoped => return None,
            (Some(scoped), requested) => *requested = Some(scoped.clone()),
            (None, _) => {}
        }
        match (&self.sector, &mut filter.sector) {
            (Some(scoped), Some(requested)) if *requested != *scoped => return None,
            (Some(scoped), requested) => *requested = Some(scoped.clone()),
            (None, _) => {}
        }
        match (&self.school, &mut filter.school) {
            (Some(scoped), Some(requested)) if *requested != *scoped => return None,
            (Some(scoped), requested) => *requested = Some(scoped.clone()),
            (None, _) => {}
        }
        Some(filter)
    }
}

/// Resolve the read/act scope a principal's role carries.
pub fn scope_for(principal: &Principal) -> AccessScope {
    match &principal.role {
        Role::SuperAdmin => AccessScope::unrestricted(),
        Role::RegionAdmin { region_id } => AccessScope {
            region: Some(region_id.clone()),
            ..AccessScope::default()
        },
        Role::SectorAdmin { sector_id } => AccessScope {
            sector: Some(sector_id.clone()),
            ..AccessScope::default()
        },
        Role::SchoolAdmin { school_id } => AccessScope {
            school: Some(school_id.clone()),
            ..AccessScope::default()
        },
    }
}

/// Decide whether a principal may perform an action against a submission
/// owned by the given school. Read-filtering and write-guarding both build on
/// [`AccessScope::permits`], so an actionable submission always appears in
/// the actor's own scoped list.
pub fn can_act(
    principal: &Principal,
    placement: &SchoolPlacement,
    action: TransitionAction,
) -> Result<(), ScopeDenial> {
    if !scope_for(principal).permits(placement) {
        return Err(ScopeDenial::new(format!(
            "{} '{}' has no authority over school '{}'",
            principal.role.label(),
            principal.id.0,
            placement.school.0
        )));
    }

    match (&principal.role, action) {
        (Role::SuperAdmin, _) => Ok(()),
        // A school submits and resubmits its own data, nothing more.
        (Role::SchoolAdmin { .. }, TransitionAction::Submit) => Ok(()),
        (Role::SchoolAdmin { .. }, TransitionAction::Approve | TransitionAction::Reject) => {
            Err(ScopeDenial::new(
                "a school may not review its own submission",
            ))
        }
        // Reviewers approve and reject within their slice but never submit
        // on a school's behalf.
        (
            Role::RegionAdmin { .. } | Role::SectorAdmin { .. },
            TransitionAction::Approve | TransitionAction::Reject,
        ) => Ok(()),
        (Role::RegionAdmin { .. } | Role::SectorAdmin { .. }, TransitionAction::Submit) => Err(
            ScopeDenial::new("only the owning school may submit its data"),
        ),
        (_, TransitionAction::Reopen) => Err(ScopeDenial::new(
            "reopening an approved submission requires superadmin",
        )),
    }
}
