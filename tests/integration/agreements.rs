//! Agreement lifecycle against a fake ledger and API

use crate::integration::test_utils::{temp_store, FakeLedgerRpc, FakeRemoteApi, Reply};
use chrono::Utc;
use metanode_ledger::agreement::{AgreementManager, AgreementMeta, AgreementStatus};
use metanode_ledger::config::AgreementDefaults;
use metanode_ledger::error::ErrorKind;
use metanode_ledger::remote::{methods, paths};
use metanode_ledger::store::{FileStore, Namespace};
use metanode_ledger::Agreement;
use serde_json::{json, Value};
use std::sync::Arc;

fn manager(store: FileStore) -> (AgreementManager, Arc<FakeLedgerRpc>, Arc<FakeRemoteApi>) {
    let rpc = FakeLedgerRpc::new();
    let api = FakeRemoteApi::new();
    let manager = AgreementManager::new(store, rpc.clone(), api.clone(), AgreementDefaults::default());
    (manager, rpc, api)
}

fn meta() -> AgreementMeta {
    AgreementMeta::new("client-123", "server-456", "web-app", json!({"cpu": 2, "memory": "4GB"}))
}

fn stored(store: &FileStore, id: &str) -> Agreement {
    store
        .get(Namespace::Agreements, &format!("agreement-{}", id))
        .unwrap()
        .unwrap()
}

#[test]
fn test_generate_applies_defaults_and_persists() {
    let (_dir, store) = temp_store();
    let (manager, _, _) = manager(store.clone());

    let agreement = manager.generate(meta()).unwrap();
    assert_eq!(agreement.agreement_id.len(), 16);
    assert_eq!(agreement.status, AgreementStatus::Created);
    assert_eq!(agreement.expires_at - agreement.starts_at, 86_400);
    assert_eq!(agreement.app.version, "1.0.0");
    assert_eq!(agreement.payment_terms.currency, "MNT");
    assert!(agreement.verify_hash().unwrap());

    let on_disk = stored(&store, &agreement.agreement_id);
    assert_eq!(on_disk, agreement);
    assert_eq!(on_disk.compute_hash().unwrap(), on_disk.agreement_hash);
}

#[test]
fn test_generate_rejects_missing_fields() {
    let (_dir, store) = temp_store();
    let (manager, _, _) = manager(store.clone());

    let err = manager
        .generate(AgreementMeta::new("", "server-456", "web-app", serde_json::Value::Null))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    let message = err.to_string();
    assert!(message.contains("client_id"));
    assert!(message.contains("resources"));
    assert!(manager.list_local().unwrap().is_empty());
}

#[test]
fn test_generate_accepts_empty_resource_descriptor() {
    let (_dir, store) = temp_store();
    let (manager, _, _) = manager(store);

    let agreement = manager
        .generate(AgreementMeta::new("client-123", "server-456", "web-app", json!({})))
        .unwrap();
    assert_eq!(agreement.resources, json!({}));
    assert!(agreement.verify_hash().unwrap());
}

#[test]
fn test_generate_rejects_out_of_range_window() {
    let (_dir, store) = temp_store();
    let (manager, _, _) = manager(store);

    let err = manager
        .generate(meta().with_duration_secs(i64::MAX))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = manager
        .generate(meta().with_starts_at(i64::MAX - 10).with_duration_secs(3_600))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(manager.list_local().unwrap().is_empty());
}

#[tokio::test]
async fn test_submit_activates_and_rehashes() {
    let (_dir, store) = temp_store();
    let (manager, rpc, _) = manager(store.clone());
    rpc.reply(methods::SUBMIT_AGREEMENT, Reply::Ok(json!("0xabc")));

    let mut agreement = manager.generate(meta()).unwrap();
    let created_hash = agreement.agreement_hash.clone();
    let receipt = manager.submit_to_ledger(&mut agreement).await.unwrap();

    assert_eq!(receipt.tx_hash, "0xabc");
    assert_eq!(agreement.status, AgreementStatus::Active);
    assert_eq!(agreement.tx_hash(), Some("0xabc"));
    assert_ne!(agreement.agreement_hash, created_hash);
    assert!(agreement.verify_hash().unwrap());
    assert_eq!(stored(&store, &agreement.agreement_id), agreement);

    let calls = rpc.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].1[0]["agreement_hash"], Value::from(created_hash));
}

#[tokio::test]
async fn test_submit_failure_leaves_status_unchanged() {
    let (_dir, store) = temp_store();
    let (manager, rpc, _) = manager(store.clone());
    rpc.reply(methods::SUBMIT_AGREEMENT, Reply::Remote("execution reverted".to_string()));

    let mut agreement = manager.generate(meta()).unwrap();
    let before = agreement.clone();
    let err = manager.submit_to_ledger(&mut agreement).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Remote);
    assert!(err.to_string().contains("execution reverted"));
    assert_eq!(agreement, before);
    assert_eq!(stored(&store, &agreement.agreement_id).status, AgreementStatus::Created);
    assert_eq!(rpc.calls_to(methods::SUBMIT_AGREEMENT), 1);
}

#[tokio::test]
async fn test_submit_refuses_tampered_record() {
    let (_dir, store) = temp_store();
    let (manager, rpc, _) = manager(store);

    let mut agreement = manager.generate(meta()).unwrap();
    agreement.server_id = "someone-else".to_string();
    let err = manager.submit_to_ledger(&mut agreement).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Integrity);
    assert!(rpc.calls().is_empty());
}

#[tokio::test]
async fn test_validate_state_expired_by_time() {
    let (_dir, store) = temp_store();
    let (manager, rpc, _) = manager(store.clone());

    let past = Utc::now().timestamp() - 7_200;
    let mut agreement = manager
        .generate(meta().with_starts_at(past).with_duration_secs(3_600))
        .unwrap();
    agreement.status = AgreementStatus::Active;
    agreement.rehash().unwrap();
    store
        .put(
            Namespace::Agreements,
            &format!("agreement-{}", agreement.agreement_id),
            &agreement,
        )
        .unwrap();

    let validation = manager.validate_state(&agreement.agreement_id).await.unwrap();
    assert_eq!(validation.status, AgreementStatus::Expired);
    assert!(validation.expired);
    assert!(!validation.valid);
    assert!(!validation.overwritten);
    // Expiry is derived from time, the stored record keeps its status.
    assert_eq!(stored(&store, &agreement.agreement_id).status, AgreementStatus::Active);
    assert!(rpc.calls().is_empty());
}

#[tokio::test]
async fn test_validate_state_ledger_wins() {
    let (_dir, store) = temp_store();
    let (manager, rpc, _) = manager(store.clone());
    rpc.reply(methods::SUBMIT_AGREEMENT, Reply::Ok(json!("0xfeed")));
    rpc.reply(methods::GET_AGREEMENT_STATUS, Reply::Ok(json!({"status": "disputed"})));

    let mut agreement = manager.generate(meta()).unwrap();
    manager.submit_to_ledger(&mut agreement).await.unwrap();

    let validation = manager.validate_state(&agreement.agreement_id).await.unwrap();
    assert_eq!(validation.status, AgreementStatus::Disputed);
    assert_eq!(validation.ledger_status, Some(AgreementStatus::Disputed));
    assert!(validation.disputed);
    assert!(!validation.valid);
    assert!(validation.overwritten);

    let on_disk = stored(&store, &agreement.agreement_id);
    assert_eq!(on_disk.status, AgreementStatus::Disputed);
    assert!(on_disk.verify_hash().unwrap());
    assert_eq!(rpc.calls_to(methods::GET_AGREEMENT_STATUS), 1);
}

#[tokio::test]
async fn test_validate_state_keeps_local_status_when_ledger_fails() {
    let (_dir, store) = temp_store();
    let (manager, rpc, _) = manager(store.clone());
    rpc.reply(methods::SUBMIT_AGREEMENT, Reply::Ok(json!("0xfeed")));
    rpc.reply(methods::GET_AGREEMENT_STATUS, Reply::Remote("node offline".to_string()));

    let mut agreement = manager.generate(meta()).unwrap();
    manager.submit_to_ledger(&mut agreement).await.unwrap();

    let validation = manager.validate_state(&agreement.agreement_id).await.unwrap();
    assert_eq!(validation.status, AgreementStatus::Active);
    assert!(validation.valid);
    assert!(validation.ledger_error.unwrap().contains("node offline"));
    assert!(!validation.overwritten);
}

#[tokio::test]
async fn test_load_falls_back_to_api_and_caches() {
    let (_dir, store) = temp_store();
    let (_dir2, other_store) = temp_store();
    let (origin, _, _) = manager(other_store);
    let remote_copy = origin.generate(meta()).unwrap();

    let (manager, _, api) = manager(store.clone());
    let id = remote_copy.agreement_id.clone();
    api.on_get(
        &paths::agreement(&id),
        Reply::Ok(serde_json::to_value(&remote_copy).unwrap()),
    );

    let loaded = manager.load(&id).await.unwrap();
    assert_eq!(loaded, remote_copy);
    assert_eq!(stored(&store, &id), remote_copy);

    // Second load is served locally.
    manager.load(&id).await.unwrap();
    assert_eq!(api.calls().len(), 1);
}

#[tokio::test]
async fn test_load_rejects_remote_copy_with_bad_hash() {
    let (_dir, store) = temp_store();
    let (manager, _, api) = manager(store.clone());
    let mut record = json!({
        "agreement_id": "0011223344556677",
        "client_id": "c",
        "server_id": "s",
        "app": {"name": "web-app", "version": "1.0.0"},
        "resources": {"cpu": 1},
        "created_at": 1,
        "starts_at": 1,
        "expires_at": 2,
        "payment_terms": {"rate": "1.0", "currency": "MNT", "payment_schedule": "hourly"},
        "status": "active",
        "extensions": {},
    });
    record["agreement_hash"] = json!("00".repeat(32));
    api.on_get(&paths::agreement("0011223344556677"), Reply::Ok(record));

    let err = manager.load("0011223344556677").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Integrity);
    assert!(manager.list_local().unwrap().is_empty());
}

#[tokio::test]
async fn test_load_missing_everywhere_is_not_found() {
    let (_dir, store) = temp_store();
    let (manager, _, _) = manager(store);
    let err = manager.load("ffffffffffffffff").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}
