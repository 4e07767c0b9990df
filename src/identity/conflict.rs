//! Identity/name conflict resolution
//!
//! Detects the state where one canonical identity maps to two differing
//! display names across the employee roster and/or historical records.
//! Name comparison is done on a normalized form (diacritics stripped,
//! case-folded, whitespace collapsed) so accenting and casing variance
//! never produce false positives.

use crate::identity::rut;
use crate::records::{Employee, LeaveRecord};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Where a conflicting name was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictSource {
    /// The employee roster
    Employees,
    /// Historical leave records
    Records,
}

/// A detected identity/name conflict
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityConflict {
    /// Which dataset holds the conflicting entry
    pub source: ConflictSource,

    /// Canonical identity shared by both names
    pub rut: String,

    /// The display name already stored for this identity
    pub existing_name: String,
}

/// Entities to exclude from conflict scanning, so that editing an entry
/// does not conflict with itself
#[derive(Debug, Clone, Default)]
pub struct IgnoreSpec {
    /// Skip the employee with this identity (any formatting)
    pub employee_rut: Option<String>,

    /// Skip entries whose normalized name matches this one
    pub employee_name: Option<String>,

    /// Skip the historical record with this id
    pub record_id: Option<String>,
}

/// Normalize a display name for comparison
///
/// NFD-decomposes, strips combining marks, lower-cases, and collapses
/// internal whitespace. `"Juán  Pérez "` and `"JUAN PEREZ"` normalize
/// identically.
pub fn normalize_name(name: &str) -> String {
    let stripped: String = name.nfd().filter(|c| !is_combining_mark(*c)).collect();
    stripped
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Find a conflicting name for the candidate identity, if any
///
/// Employees are scanned first; a hit there takes priority over historical
/// records. Matching normalized names are never a conflict. `ignore`
/// suppresses matches against the entity currently being edited.
pub fn find_conflict(
    canonical_rut: &str,
    display_name: &str,
    employees: &[Employee],
    records: &[LeaveRecord],
    ignore: &IgnoreSpec,
) -> Option<IdentityConflict> {
    let candidate_name = normalize_name(display_name);
    let ignored_rut = ignore
        .employee_rut
        .as_deref()
        .and_then(rut::canonicalize);
    let ignored_name = ignore.employee_name.as_deref().map(normalize_name);

    for employee in employees {
        let Some(employee_rut) = rut::canonicalize(&employee.rut) else {
            continue;
        };
        if employee_rut != canonical_rut {
            continue;
        }
        if ignored_rut.as_deref() == Some(employee_rut.as_str()) {
            continue;
        }

        let existing = normalize_name(&employee.display_name);
        if ignored_name.as_deref() == Some(existing.as_str()) {
            continue;
        }
        if existing != candidate_name {
            return Some(IdentityConflict {
                source: ConflictSource::Employees,
                rut: canonical_rut.to_string(),
                existing_name: employee.display_name.clone(),
            });
        }
    }

    for record in records {
        if ignore.record_id.as_deref() == Some(record.id.as_str()) {
            continue;
        }
        let Some(record_rut) = rut::canonicalize(&record.rut) else {
            continue;
        };
        if record_rut != canonical_rut {
            continue;
        }
        if ignored_rut.as_deref() == Some(record_rut.as_str()) {
            continue;
        }

        let existing = normalize_name(&record.display_name);
        if ignored_name.as_deref() == Some(existing.as_str()) {
            continue;
        }
        if existing != candidate_name {
            return Some(IdentityConflict {
                source: ConflictSource::Records,
                rut: canonical_rut.to_string(),
                existing_name: record.display_name.clone(),
            });
        }
    }

    None
}
