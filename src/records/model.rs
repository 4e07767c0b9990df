//! Leave record and employee data structures
//!
//! A single `LeaveRecord` shape serves both partitions; the partition tag
//! determines which balance fields are meaningful. Dates are kept as
//! normalized `YYYY-MM-DD` strings (empty when the source cell was
//! unparseable) so records survive round-trips through messy sheets.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Leave-record partition
///
/// Each partition is synchronized independently against its own remote
/// endpoint and schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Partition {
    /// Administrative permits ("PA")
    #[serde(rename = "PA")]
    Administrative,

    /// Legal holiday ("FL")
    #[serde(rename = "FL")]
    Legal,
}

impl Partition {
    /// All partitions, in push/fetch order
    pub const ALL: [Partition; 2] = [Partition::Administrative, Partition::Legal];

    /// Wire tag for this partition
    pub fn tag(&self) -> &'static str {
        match self {
            Partition::Administrative => "PA",
            Partition::Legal => "FL",
        }
    }

    /// Parse a wire tag
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_uppercase().as_str() {
            "PA" => Some(Partition::Administrative),
            "FL" => Some(Partition::Legal),
            _ => None,
        }
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Per-period balance for legal-holiday records
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PeriodBalance {
    /// Calendar year of the period
    pub year: i32,

    /// Days available at the start of the period
    pub available: f64,

    /// Days requested against the period
    pub requested: f64,

    /// Days remaining after this request
    pub remaining: f64,
}

impl PeriodBalance {
    /// Whether every field of the balance is zero
    pub fn is_zero(&self) -> bool {
        self.year == 0 && self.available == 0.0 && self.requested == 0.0 && self.remaining == 0.0
    }
}

/// A single leave/permit record
///
/// For the `Legal` partition the period balances are meaningful;
/// `second_period` is either fully populated or absent, never partial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaveRecord {
    /// Opaque identifier (locally assigned, or derived from the source row)
    pub id: String,

    /// Partition this record belongs to
    pub partition: Partition,

    /// Subject national identity (any formatting; canonicalized on compare)
    pub rut: String,

    /// Subject display name
    pub display_name: String,

    /// Act/resolution number from the decree, if any
    #[serde(default)]
    pub act_number: String,

    /// Decree date (`YYYY-MM-DD`, empty when unknown)
    #[serde(default)]
    pub decree_date: String,

    /// First day of leave (`YYYY-MM-DD`, empty when unknown)
    #[serde(default)]
    pub start_date: String,

    /// Last day of leave (`YYYY-MM-DD`, empty when unknown)
    #[serde(default)]
    pub end_date: String,

    /// Days requested
    #[serde(default)]
    pub requested_days: f64,

    /// Days of entitlement for the year
    #[serde(default)]
    pub entitlement_days: f64,

    /// First-period balance (Legal partition only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_period: Option<PeriodBalance>,

    /// Second-period balance (Legal partition only; all-or-nothing)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub second_period: Option<PeriodBalance>,

    /// Creation timestamp (RFC3339)
    pub created_at: String,
}

impl LeaveRecord {
    /// Create an empty record for the given subject
    pub fn new(partition: Partition, rut: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            partition,
            rut: rut.into(),
            display_name: display_name.into(),
            act_number: String::new(),
            decree_date: String::new(),
            start_date: String::new(),
            end_date: String::new(),
            requested_days: 0.0,
            entitlement_days: 0.0,
            first_period: None,
            second_period: None,
            created_at: String::new(),
        }
    }
}

/// An employee known to the roster
///
/// Identity is unique within the employee set; uniqueness is enforced at
/// mutation time, not by this type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Employee {
    /// Canonical national identity
    pub rut: String,

    /// Display name
    pub display_name: String,

    /// Department, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
}
