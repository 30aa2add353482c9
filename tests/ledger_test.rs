//! Ledger Tests
//!
//! Chain continuity, user history and read queries.

mod common;

use common::*;
use compliance_ledger::ledger::GENESIS_HEAD;
use compliance_ledger::{ComplianceRecord, Ledger, RecordKind};

#[tokio::test]
async fn test_user_chain_continuity() {
    let ledger = Ledger::in_memory();
    let mut stored = Vec::new();
    stored.push(ledger.append(validation("v1", "u1", "o1", 0)).await.unwrap());
    stored.push(ledger.append(appeal("p1", "u1", "o1", 1)).await.unwrap());
    stored.push(ledger.append(access_check("a1", "u1", "o2", 2)).await.unwrap());
    stored.push(ledger.append(geofence_check("g1", "u1", "o2", 3)).await.unwrap());

    assert_eq!(stored[0].previous_hash(), GENESIS_HEAD);
    for pair in stored.windows(2) {
        assert_eq!(pair[1].previous_hash(), pair[0].hash());
    }
    for record in &stored {
        assert_eq!(record.hash().len(), 64);
        assert!(record.verify_hash());
        assert!(ledger.verify_record(record.kind(), record.id()).await.unwrap());
    }

    let verification = ledger.verify_user_chain("u1").await.unwrap();
    assert!(verification.is_valid, "{}", verification.detailed_status());
    assert_eq!(verification.linked_count, 4);
}

#[tokio::test]
async fn test_users_have_independent_chains() {
    let ledger = Ledger::in_memory();
    let a = ledger.append(access_check("a1", "alice", "o1", 0)).await.unwrap();
    let b = ledger.append(access_check("b1", "bob", "o1", 1)).await.unwrap();
    let a2 = ledger.append(access_check("a2", "alice", "o1", 2)).await.unwrap();

    assert_eq!(a.previous_hash(), GENESIS_HEAD);
    assert_eq!(b.previous_hash(), GENESIS_HEAD);
    assert_eq!(a2.previous_hash(), a.hash());
    assert_eq!(ledger.users().await.unwrap(), vec!["alice", "bob"]);
}

#[tokio::test]
async fn test_history_across_orders() {
    // One user, two orders: the history links A to B
    let ledger = Ledger::in_memory();
    let a = ledger.append(validation("A", "u1", "O1", 0)).await.unwrap();
    let b = ledger.append(validation("B", "u1", "O2", 1)).await.unwrap();

    let history = ledger.get_user_history("u1").await.unwrap();
    assert_eq!(history.validations.len(), 2);
    assert_eq!(history.validations[0].id, "A");
    assert_eq!(history.validations[1].id, "B");
    assert_eq!(history.validations[1].previous_hash, a.hash());
    assert_eq!(history.validations[1].hash, b.hash());
    assert!(history.appeals.is_empty());
}

#[tokio::test]
async fn test_unknown_user_and_order_are_empty() {
    let ledger = Ledger::in_memory();
    ledger.append(access_check("a1", "u1", "o1", 0)).await.unwrap();

    let history = ledger.get_user_history("nobody").await.unwrap();
    assert_eq!(history.user_id, "nobody");
    assert!(history.is_empty());
    assert!(ledger.get_records_for_order("no-such-order").await.unwrap().is_empty());

    let verification = ledger.verify_user_chain("nobody").await.unwrap();
    assert!(verification.is_valid);
    assert_eq!(verification.entry_count, 0);
}

#[tokio::test]
async fn test_records_for_order_cover_all_kinds_and_users() {
    let ledger = Ledger::in_memory();
    ledger.append(validation("v1", "u1", "o1", 0)).await.unwrap();
    ledger.append(appeal("p1", "u2", "o1", 1)).await.unwrap();
    ledger.append(access_check("a1", "u3", "o1", 2)).await.unwrap();
    ledger.append(geofence_check("g1", "u1", "o2", 3)).await.unwrap();

    let records = ledger.get_records_for_order("o1").await.unwrap();
    let kinds: Vec<RecordKind> = records.iter().map(ComplianceRecord::kind).collect();
    assert_eq!(
        kinds,
        vec![RecordKind::Validation, RecordKind::Appeal, RecordKind::AccessCheck]
    );
}

#[tokio::test]
async fn test_records_in_range() {
    let ledger = Ledger::in_memory();
    for i in 0..6 {
        ledger
            .append(access_check(&format!("a{}", i), "u1", "o1", i * 60))
            .await
            .unwrap();
    }
    let found = ledger.get_records_in_range(at(60), at(180)).await.unwrap();
    let ids: Vec<&str> = found.iter().map(|r| r.id()).collect();
    assert_eq!(ids, vec!["a1", "a2", "a3"]);
}

#[tokio::test]
async fn test_non_finite_amount_is_rejected() {
    let ledger = Ledger::in_memory();
    let mut record = validation("v1", "u1", "o1", 0);
    record.deviation = f64::NAN;
    assert!(ledger.append(record).await.is_err());
    assert_eq!(ledger.len().await.unwrap(), 0);

    // The failed append leaves the chain usable
    let stored = ledger.append(validation("v2", "u1", "o1", 1)).await.unwrap();
    assert_eq!(stored.previous_hash(), GENESIS_HEAD);
}

#[tokio::test]
async fn test_sqlite_backed_ledger() {
    let (_db, ledger) = setup_sqlite_ledger().await;
    let first = ledger.append(appeal("p1", "u1", "o1", 0)).await.unwrap();
    let second = ledger.append(geofence_check("g1", "u1", "o1", 1)).await.unwrap();
    assert_eq!(second.previous_hash(), first.hash());

    let history = ledger.get_user_history("u1").await.unwrap();
    assert_eq!(history.appeals[0], match first {
        ComplianceRecord::Appeal(r) => r,
        other => panic!("unexpected record {:?}", other),
    });
    assert!(ledger.verify_user_chain("u1").await.unwrap().is_valid);
}

#[tokio::test]
async fn test_decimals_beyond_pinned_precision_are_rounded() {
    let ledger = Ledger::in_memory();
    let mut record = validation("v1", "u1", "o1", 0);
    record.materials_cost = 18_450.750_04;
    let stored = ledger.append(record).await.unwrap();
    assert!(ledger.verify_record(RecordKind::Validation, "v1").await.unwrap());

    let mut edited = stored.clone();
    if let ComplianceRecord::Validation(r) = &mut edited {
        assert_eq!(r.materials_cost, 18_450.75);
        r.materials_cost = 18_450.750_04;
    }
    assert!(!edited.verify_hash());
}
