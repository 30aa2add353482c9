//! Concurrency Tests
//!
//! Concurrent appends must never fork a user's chain or drop a record.

mod common;

use common::*;
use std::collections::HashSet;
use std::sync::Arc;

use compliance_ledger::ledger::{
    link_chain, ChainHeadStore, MemoryChainHeadStore, MemoryRecordStore, RecordStore,
};
use compliance_ledger::Ledger;

const APPENDS: usize = 32;

async fn assert_fork_free(ledger: &Ledger, store: &dyn RecordStore, user_id: &str, expected: usize) {
    let chain = link_chain(store.records_for_user(user_id).await.unwrap());
    assert!(chain.forks.is_empty(), "forked records: {}", chain.forks.len());
    assert!(chain.orphans.is_empty());
    assert_eq!(chain.ordered.len(), expected);

    let previous: HashSet<&str> = chain.ordered.iter().map(|r| r.previous_hash()).collect();
    assert_eq!(previous.len(), expected);

    let verification = ledger.verify_user_chain(user_id).await.unwrap();
    assert!(verification.is_valid, "{}", verification.detailed_status());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_same_user_appends_are_fork_free() {
    let store = Arc::new(MemoryRecordStore::new());
    let heads = Arc::new(MemoryChainHeadStore::new());
    // Every lost CAS means another append won, so N attempts always suffice
    let ledger = Ledger::new(store.clone(), heads.clone()).with_max_append_retries(APPENDS as u32 + 1);

    let mut handles = Vec::new();
    for i in 0..APPENDS {
        let ledger = ledger.clone();
        handles.push(tokio::spawn(async move {
            ledger
                .append(access_check(&format!("a{}", i), "u1", "o1", i as i64))
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_fork_free(&ledger, &*store, "u1", APPENDS).await;

    let history = ledger.get_user_history("u1").await.unwrap();
    assert_eq!(history.access_checks.len(), APPENDS);
    let tip = history.access_checks.last().unwrap().hash.clone();
    assert_eq!(heads.get_head("u1").await.unwrap(), tip);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_appends_across_users() {
    let store = Arc::new(MemoryRecordStore::new());
    let ledger = Ledger::new(store.clone(), Arc::new(MemoryChainHeadStore::new()))
        .with_max_append_retries(APPENDS as u32 + 1);

    let users: Vec<String> = (0..8).map(|u| format!("user-{}", u)).collect();
    let mut handles = Vec::new();
    for user in &users {
        for i in 0..8 {
            let ledger = ledger.clone();
            let user = user.clone();
            handles.push(tokio::spawn(async move {
                ledger
                    .append(geofence_check(&format!("{}-g{}", user, i), &user, "shared-order", i))
                    .await
            }));
        }
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    for user in &users {
        assert_fork_free(&ledger, &*store, user, 8).await;
    }
    assert_eq!(ledger.len().await.unwrap(), 64);

    let (assembler, _) = test_assembler(&ledger);
    let package = assembler.build_evidence_package("shared-order").await.unwrap();
    assert_eq!(package.hash_chain.len(), 64);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_appends_on_sqlite() {
    let (db, ledger) = setup_sqlite_ledger().await;
    let ledger = ledger.with_max_append_retries(17);

    let mut handles = Vec::new();
    for i in 0..16 {
        let ledger = ledger.clone();
        handles.push(tokio::spawn(async move {
            ledger
                .append(validation(&format!("v{}", i), "u1", "o1", i))
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let store = db.record_store();
    assert_fork_free(&ledger, &store, "u1", 16).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_evidence_during_appends_is_self_consistent() {
    let ledger = Ledger::in_memory().with_max_append_retries(APPENDS as u32 + 1);
    let (assembler, signer) = test_assembler(&ledger);

    let writer = {
        let ledger = ledger.clone();
        tokio::spawn(async move {
            for i in 0..APPENDS {
                ledger
                    .append(access_check(&format!("a{}", i), "u1", "o1", i as i64))
                    .await
                    .unwrap();
            }
        })
    };

    for _ in 0..8 {
        let package = assembler.build_evidence_package("o1").await.unwrap();
        let verification = compliance_ledger::verify_evidence_package(&package, &*signer);
        assert!(verification.is_verified(), "{}", verification.detailed_status());
        tokio::task::yield_now().await;
    }

    writer.await.unwrap();
    let package = assembler.build_evidence_package("o1").await.unwrap();
    assert_eq!(package.hash_chain.len(), APPENDS);
}
