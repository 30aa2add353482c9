#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;

use compliance_ledger::crypto::Secp256k1Signer;
use compliance_ledger::database::Database;
use compliance_ledger::ledger::{
    AccessCheckRecord, AppealRecord, AppealStatus, EvidenceItem, GeofenceCheckRecord,
    ValidationRecord, ValidationStatus,
};
use compliance_ledger::{EvidenceAssembler, Ledger};

/// Fixed base time so packages are reproducible
pub fn at(offset_secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 5, 20, 10, 0, 0).unwrap() + Duration::seconds(offset_secs)
}

pub fn validation(id: &str, user: &str, order: &str, offset_secs: i64) -> ValidationRecord {
    ValidationRecord {
        id: id.to_string(),
        user_id: user.to_string(),
        order_id: order.to_string(),
        materials_cost: 18_450.75,
        labor_cost: 6_200.0,
        currency: "UAH".to_string(),
        status: ValidationStatus::AuditRequired,
        deviation: 0.3125,
        median_price: 18_800.0,
        audit_required: true,
        reason: "manual override above market median".to_string(),
        timestamp: at(offset_secs),
        ..Default::default()
    }
}

pub fn appeal(id: &str, user: &str, order: &str, offset_secs: i64) -> AppealRecord {
    AppealRecord {
        id: id.to_string(),
        user_id: user.to_string(),
        order_id: order.to_string(),
        event_id: format!("{}-event", id),
        justification: "supplier invoice attached".to_string(),
        evidence_items: vec![EvidenceItem {
            id: format!("{}-item", id),
            item_type: "invoice".to_string(),
            url: "https://files.example.org/invoice.pdf".to_string(),
            description: Some("Supplier invoice".to_string()),
            uploaded_at: at(offset_secs),
        }],
        status: AppealStatus::Submitted,
        timestamp: at(offset_secs),
        ..Default::default()
    }
}

pub fn access_check(id: &str, user: &str, order: &str, offset_secs: i64) -> AccessCheckRecord {
    AccessCheckRecord {
        id: id.to_string(),
        user_id: user.to_string(),
        order_id: order.to_string(),
        access_granted: true,
        reason: "role permits order access".to_string(),
        requires_biometrics: false,
        timestamp: at(offset_secs),
        ..Default::default()
    }
}

pub fn geofence_check(id: &str, user: &str, order: &str, offset_secs: i64) -> GeofenceCheckRecord {
    GeofenceCheckRecord {
        id: id.to_string(),
        user_id: user.to_string(),
        order_id: order.to_string(),
        is_inside: true,
        latitude: 50.4501,
        longitude: 30.5234,
        violation_reason: String::new(),
        timestamp: at(offset_secs),
        ..Default::default()
    }
}

pub fn test_signer() -> Arc<Secp256k1Signer> {
    Arc::new(Secp256k1Signer::generate())
}

pub fn test_assembler(ledger: &Ledger) -> (EvidenceAssembler, Arc<Secp256k1Signer>) {
    let signer = test_signer();
    (EvidenceAssembler::new(ledger.clone(), signer.clone()), signer)
}

/// Ledger over a private in-memory SQLite database
pub async fn setup_sqlite_ledger() -> (Database, Ledger) {
    let db = Database::new_in_memory().await.expect("Failed to create test database");
    let ledger = Ledger::open(Arc::new(db.record_store()), Arc::new(db.head_store()))
        .await
        .expect("Failed to open ledger");
    (db, ledger)
}
