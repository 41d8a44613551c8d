//! Single entrypoint that builds every component from one configuration.

use crate::agreement::AgreementManager;
use crate::config::MetanodeConfig;
use crate::error::LedgerError;
use crate::proof_log::ProofLog;
use crate::remote::{HttpLedgerRpc, HttpRemoteApi, LedgerRpc, RemoteApi};
use crate::store::FileStore;
use crate::telemetry::{ResourceSampler, SystemSampler, TelemetryCollector};
use crate::verification::Verifier;
use std::sync::Arc;
use tracing::info;

/// Agreements, proof log, verifier and telemetry sharing one store and one
/// pair of remote clients.
pub struct Metanode {
    config: MetanodeConfig,
    store: FileStore,
    agreements: AgreementManager,
    proof_log: ProofLog,
    verifier: Verifier,
    telemetry: TelemetryCollector,
}

impl Metanode {
    /// Validate `config` and wire HTTP clients, the file store and the host
    /// sampler into every component.
    pub fn from_config(config: MetanodeConfig) -> Result<Self, LedgerError> {
        config.ensure_valid()?;
        let rpc: Arc<dyn LedgerRpc> = Arc::new(HttpLedgerRpc::new(&config.endpoints)?);
        let api: Arc<dyn RemoteApi> = Arc::new(HttpRemoteApi::new(&config.endpoints)?);
        let sampler: Arc<dyn ResourceSampler> = Arc::new(SystemSampler::new());
        Self::with_components(config, rpc, api, sampler)
    }

    /// Build with caller-supplied remote clients and sampler.
    pub fn with_components(
        config: MetanodeConfig,
        rpc: Arc<dyn LedgerRpc>,
        api: Arc<dyn RemoteApi>,
        sampler: Arc<dyn ResourceSampler>,
    ) -> Result<Self, LedgerError> {
        let store = FileStore::new(&config.storage.root)?;
        let agreements = AgreementManager::new(
            store.clone(),
            rpc.clone(),
            api.clone(),
            config.agreement.clone(),
        );
        let proof_log = ProofLog::new(store.clone(), api.clone());
        let verifier = Verifier::new(store.clone(), rpc, api.clone());
        let telemetry = TelemetryCollector::new(store.clone(), api, sampler, &config.telemetry);

        info!(
            store = %store.root().display(),
            api_url = %config.endpoints.api_url,
            ledger_url = %config.endpoints.ledger_url,
            "MetaNode components ready"
        );
        Ok(Self {
            config,
            store,
            agreements,
            proof_log,
            verifier,
            telemetry,
        })
    }

    pub fn config(&self) -> &MetanodeConfig {
        &self.config
    }

    pub fn store(&self) -> &FileStore {
        &self.store
    }

    pub fn agreements(&self) -> &AgreementManager {
        &self.agreements
    }

    pub fn proof_log(&self) -> &ProofLog {
        &self.proof_log
    }

    pub fn verifier(&self) -> &Verifier {
        &self.verifier
    }

    pub fn telemetry(&self) -> &TelemetryCollector {
        &self.telemetry
    }
}
