//! Integration tests for configuration loading and component wiring

use crate::integration::test_utils::{config_in, FakeLedgerRpc, FakeRemoteApi, FakeSampler, Reply};
use metanode_ledger::agreement::{AgreementMeta, AgreementStatus};
use metanode_ledger::config::{ConfigLoader, MetanodeConfig};
use metanode_ledger::error::ErrorKind;
use metanode_ledger::remote::{methods, paths};
use metanode_ledger::Metanode;
use serde_json::json;
use tempfile::TempDir;

#[test]
fn test_config_file_drives_components() {
    let temp_dir = TempDir::new().unwrap();
    let config_file = temp_dir.path().join("metanode.toml");
    let store_root = temp_dir.path().join("records");

    std::fs::write(
        &config_file,
        format!(
            r#"
[endpoints]
api_url = "http://api.internal:8000"
ledger_url = "http://ledger.internal:8545"
request_timeout_secs = 5

[storage]
root = "{}"

[agreement]
default_duration_secs = 3600

[agreement.default_payment_terms]
rate = "2.5"
currency = "USDC"

[telemetry]
server_id = "srv-from-file"
interval_secs = 15
"#,
            store_root.display()
        ),
    )
    .unwrap();

    let config = ConfigLoader::load_from_file(&config_file).unwrap();
    assert!(config.validate().is_ok());
    assert_eq!(config.endpoints.request_timeout_secs, 5);
    assert_eq!(config.endpoints.connect_timeout_secs, 10);
    assert_eq!(config.agreement.default_payment_terms.payment_schedule, "hourly");

    let node = Metanode::with_components(
        config,
        FakeLedgerRpc::new(),
        FakeRemoteApi::new(),
        FakeSampler::new(10.0, 1, 64.0),
    )
    .unwrap();

    assert_eq!(node.store().root(), store_root.as_path());
    assert_eq!(node.telemetry().server_id().as_deref(), Some("srv-from-file"));
    assert_eq!(node.telemetry().default_interval().as_secs(), 15);

    let agreement = node
        .agreements()
        .generate(AgreementMeta::new("c", "s", "app", json!({"cpu": 1})))
        .unwrap();
    assert_eq!(agreement.expires_at - agreement.starts_at, 3_600);
    assert_eq!(agreement.payment_terms.rate, "2.5");
    assert_eq!(agreement.payment_terms.currency, "USDC");
}

#[test]
fn test_invalid_config_is_rejected() {
    let mut config = MetanodeConfig::default();
    config.endpoints.ledger_url = "ftp://ledger".to_string();
    config.telemetry.interval_secs = 0;

    let errors = config.validate().unwrap_err();
    assert_eq!(errors.len(), 2);
    assert_eq!(
        Metanode::from_config(config).err().map(|e| e.kind()),
        Some(ErrorKind::Config)
    );
}

#[test]
fn test_from_config_builds_http_components() {
    let temp_dir = TempDir::new().unwrap();
    let node = Metanode::from_config(config_in(&temp_dir)).unwrap();
    assert!(node.store().root().exists());
    assert!(!node.telemetry().is_active());
}

#[tokio::test]
async fn test_agreement_and_proof_log_share_a_store() {
    let temp_dir = TempDir::new().unwrap();
    let rpc = FakeLedgerRpc::new();
    let api = FakeRemoteApi::new();
    rpc.reply(methods::SUBMIT_AGREEMENT, Reply::Ok(json!("0x77")));
    api.on_post(paths::PROOF_LOG, Reply::Ok(json!({"ipfs_hash": "QmX"})));

    let node = Metanode::with_components(
        config_in(&temp_dir),
        rpc.clone(),
        api.clone(),
        FakeSampler::new(10.0, 1, 64.0),
    )
    .unwrap();

    let mut agreement = node
        .agreements()
        .generate(AgreementMeta::new("client", "server", "db", json!({"disk": "10GB"})))
        .unwrap();
    node.agreements().submit_to_ledger(&mut agreement).await.unwrap();
    assert_eq!(agreement.status, AgreementStatus::Active);

    let receipt = node
        .proof_log()
        .append(
            json!({"event": "agreement_activated", "tx_hash": "0x77"}),
            Some(&agreement.agreement_id),
            None,
        )
        .await
        .unwrap();

    let check = node.verifier().verify_proof_log(&receipt.id).unwrap();
    assert!(check.verified);
    assert_eq!(node.agreements().list_local().unwrap(), vec![agreement]);
}
