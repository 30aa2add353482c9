//! Compliance Records
//!
//! Defines the four record kinds stored in the ledger and the per-user
//! history view handed to consumers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind tag of a compliance record.
///
/// Lexicographic comparisons (evidence ordering) use [`RecordKind::as_str`],
/// not the declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordKind {
    Validation,
    Appeal,
    AccessCheck,
    GeofenceCheck,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Validation => "VALIDATION",
            RecordKind::Appeal => "APPEAL",
            RecordKind::AccessCheck => "ACCESS_CHECK",
            RecordKind::GeofenceCheck => "GEOFENCE_CHECK",
        }
    }

    /// All kinds in lexicographic tag order.
    pub fn all() -> [RecordKind; 4] {
        [
            RecordKind::AccessCheck,
            RecordKind::Appeal,
            RecordKind::GeofenceCheck,
            RecordKind::Validation,
        ]
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RecordKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().replace('-', "_").as_str() {
            "VALIDATION" => Ok(RecordKind::Validation),
            "APPEAL" => Ok(RecordKind::Appeal),
            "ACCESS_CHECK" => Ok(RecordKind::AccessCheck),
            "GEOFENCE_CHECK" => Ok(RecordKind::GeofenceCheck),
            _ => Err(format!("Unknown record kind: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationStatus {
    #[default]
    Approved,
    AuditRequired,
    Rejected,
}

impl ValidationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationStatus::Approved => "APPROVED",
            ValidationStatus::AuditRequired => "AUDIT_REQUIRED",
            ValidationStatus::Rejected => "REJECTED",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppealStatus {
    #[default]
    Submitted,
    Approved,
    Rejected,
    Reviewed,
}

impl AppealStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppealStatus::Submitted => "SUBMITTED",
            AppealStatus::Approved => "APPROVED",
            AppealStatus::Rejected => "REJECTED",
            AppealStatus::Reviewed => "REVIEWED",
        }
    }
}

/// Manual price override checked against the market median.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationRecord {
    pub id: String,
    pub user_id: String,
    pub order_id: String,
    pub materials_cost: f64,
    pub labor_cost: f64,
    pub currency: String,
    pub status: ValidationStatus,
    pub deviation: f64,
    pub median_price: f64,
    pub audit_required: bool,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub previous_hash: String,
}

/// Supporting material attached to an appeal. Opaque to the ledger.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvidenceItem {
    pub id: String,
    pub item_type: String,
    pub url: String,
    #[serde(default)]
    pub description: Option<String>,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppealRecord {
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub order_id: String,
    pub event_id: String,
    pub justification: String,
    #[serde(default)]
    pub evidence_items: Vec<EvidenceItem>,
    pub status: AppealStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub previous_hash: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccessCheckRecord {
    pub id: String,
    pub user_id: String,
    pub order_id: String,
    pub access_granted: bool,
    pub reason: String,
    pub requires_biometrics: bool,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub previous_hash: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeofenceCheckRecord {
    pub id: String,
    pub user_id: String,
    pub order_id: String,
    pub is_inside: bool,
    pub latitude: f64,
    pub longitude: f64,
    pub violation_reason: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub previous_hash: String,
}

/// A single entry of a user's compliance chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComplianceRecord {
    Validation(ValidationRecord),
    Appeal(AppealRecord),
    AccessCheck(AccessCheckRecord),
    GeofenceCheck(GeofenceCheckRecord),
}

impl ComplianceRecord {
    pub fn kind(&self) -> RecordKind {
        match self {
            ComplianceRecord::Validation(_) => RecordKind::Validation,
            ComplianceRecord::Appeal(_) => RecordKind::Appeal,
            ComplianceRecord::AccessCheck(_) => RecordKind::AccessCheck,
            ComplianceRecord::GeofenceCheck(_) => RecordKind::GeofenceCheck,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            ComplianceRecord::Validation(r) => &r.id,
            ComplianceRecord::Appeal(r) => &r.id,
            ComplianceRecord::AccessCheck(r) => &r.id,
            ComplianceRecord::GeofenceCheck(r) => &r.id,
        }
    }

    pub fn user_id(&self) -> &str {
        match self {
            ComplianceRecord::Validation(r) => &r.user_id,
            ComplianceRecord::Appeal(r) => &r.user_id,
            ComplianceRecord::AccessCheck(r) => &r.user_id,
            ComplianceRecord::GeofenceCheck(r) => &r.user_id,
        }
    }

    pub fn order_id(&self) -> &str {
        match self {
            ComplianceRecord::Validation(r) => &r.order_id,
            ComplianceRecord::Appeal(r) => &r.order_id,
            ComplianceRecord::AccessCheck(r) => &r.order_id,
            ComplianceRecord::GeofenceCheck(r) => &r.order_id,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            ComplianceRecord::Validation(r) => r.timestamp,
            ComplianceRecord::Appeal(r) => r.timestamp,
            ComplianceRecord::AccessCheck(r) => r.timestamp,
            ComplianceRecord::GeofenceCheck(r) => r.timestamp,
        }
    }

    pub fn hash(&self) -> &str {
        match self {
            ComplianceRecord::Validation(r) => &r.hash,
            ComplianceRecord::Appeal(r) => &r.hash,
            ComplianceRecord::AccessCheck(r) => &r.hash,
            ComplianceRecord::GeofenceCheck(r) => &r.hash,
        }
    }

    pub fn previous_hash(&self) -> &str {
        match self {
            ComplianceRecord::Validation(r) => &r.previous_hash,
            ComplianceRecord::Appeal(r) => &r.previous_hash,
            ComplianceRecord::AccessCheck(r) => &r.previous_hash,
            ComplianceRecord::GeofenceCheck(r) => &r.previous_hash,
        }
    }

    /// Set the chain link. Only the ledger calls this, before the record is stored.
    pub(crate) fn set_previous_hash(&mut self, previous_hash: String) {
        match self {
            ComplianceRecord::Validation(r) => r.previous_hash = previous_hash,
            ComplianceRecord::Appeal(r) => r.previous_hash = previous_hash,
            ComplianceRecord::AccessCheck(r) => r.previous_hash = previous_hash,
            ComplianceRecord::GeofenceCheck(r) => r.previous_hash = previous_hash,
        }
    }

    pub(crate) fn set_hash(&mut self, hash: String) {
        match self {
            ComplianceRecord::Validation(r) => r.hash = hash,
            ComplianceRecord::Appeal(r) => r.hash = hash,
            ComplianceRecord::AccessCheck(r) => r.hash = hash,
            ComplianceRecord::GeofenceCheck(r) => r.hash = hash,
        }
    }

    /// Get a human-readable summary
    pub fn summary(&self) -> String {
        format!("{} {} (user {}, order {})", self.kind(), self.id(), self.user_id(), self.order_id())
    }
}

impl From<ValidationRecord> for ComplianceRecord {
    fn from(record: ValidationRecord) -> Self {
        ComplianceRecord::Validation(record)
    }
}

impl From<AppealRecord> for ComplianceRecord {
    fn from(record: AppealRecord) -> Self {
        ComplianceRecord::Appeal(record)
    }
}

impl From<AccessCheckRecord> for ComplianceRecord {
    fn from(record: AccessCheckRecord) -> Self {
        ComplianceRecord::AccessCheck(record)
    }
}

impl From<GeofenceCheckRecord> for ComplianceRecord {
    fn from(record: GeofenceCheckRecord) -> Self {
        ComplianceRecord::GeofenceCheck(record)
    }
}

/// A user's records split by kind, each list in append order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserHistory {
    pub user_id: String,
    pub validations: Vec<ValidationRecord>,
    pub appeals: Vec<AppealRecord>,
    pub access_checks: Vec<AccessCheckRecord>,
    pub geofence_checks: Vec<GeofenceCheckRecord>,
}

impl UserHistory {
    pub fn empty(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            ..Self::default()
        }
    }

    /// Build a history from records already in append order.
    pub fn from_chain(user_id: &str, chain: Vec<ComplianceRecord>) -> Self {
        let mut history = Self::empty(user_id);
        for record in chain {
            match record {
                ComplianceRecord::Validation(r) => history.validations.push(r),
                ComplianceRecord::Appeal(r) => history.appeals.push(r),
                ComplianceRecord::AccessCheck(r) => history.access_checks.push(r),
                ComplianceRecord::GeofenceCheck(r) => history.geofence_checks.push(r),
            }
        }
        history
    }

    pub fn len(&self) -> usize {
        self.validations.len()
            + self.appeals.len()
            + self.access_checks.len()
            + self.geofence_checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
