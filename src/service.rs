use std::sync::Arc;

use crate::auth::Authenticator;
use crate::client::{TelemetryApi, TractiveClient};
use crate::config::GatewayConfig;
use crate::credential_cache::CredentialStore;
use crate::error::Result;
use crate::gateway::ReportGateway;

/// Authenticator and report gateway wired to one shared credential store.
///
/// Cheap to clone; clones share the credential and the report caches.
#[derive(Clone)]
pub struct TrackerService {
    pub auth: Authenticator,
    pub reports: Arc<ReportGateway>,
}

impl TrackerService {
    /// Build the service against the real Tractive API.
    pub fn from_config(config: &GatewayConfig) -> Result<Self> {
        let api = Arc::new(TractiveClient::new(config)?);
        Ok(Self::with_api(api, config))
    }

    pub fn with_api(api: Arc<dyn TelemetryApi>, config: &GatewayConfig) -> Self {
        let store = CredentialStore::new();
        let auth = Authenticator::new(api.clone(), store.clone(), config.account.clone());
        let reports = Arc::new(ReportGateway::new(api, store, config));
        Self { auth, reports }
    }
}
