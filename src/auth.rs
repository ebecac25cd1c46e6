//! Authentication against the Tractive API.
//!
//! The account's email and password come from process configuration. Once a
//! credential is cached, [`Authenticator::authenticate`] is free to call on
//! every request path.

use std::sync::Arc;

use crate::client::TelemetryApi;
use crate::config::AccountCredentials;
use crate::credential::Credential;
use crate::credential_cache::CredentialStore;
use crate::error::{GatewayError, Result};

#[derive(Clone)]
pub struct Authenticator {
    api: Arc<dyn TelemetryApi>,
    store: CredentialStore,
    account: Option<AccountCredentials>,
}

impl Authenticator {
    pub fn new(
        api: Arc<dyn TelemetryApi>,
        store: CredentialStore,
        account: Option<AccountCredentials>,
    ) -> Self {
        Self {
            api,
            store,
            account,
        }
    }

    /// Return the cached credential, or log in once and cache the result.
    ///
    /// The cached credential is trusted indefinitely: its `expires_at` is not
    /// checked and an upstream 401 on a report call does not force a new login.
    /// Login failures propagate unchanged, without retry.
    pub async fn authenticate(&self) -> Result<Credential> {
        if let Some(credential) = self.store.get().await {
            tracing::debug!("Already authenticated, returning cached credential");
            return Ok(credential);
        }

        let account = self.account.as_ref().ok_or_else(|| {
            GatewayError::Config(
                "TRACTIVE_EMAIL and TRACTIVE_PASSWORD are required to authenticate".to_string(),
            )
        })?;

        tracing::info!("Authenticating user '{}'", account.email);
        let credential = self.api.issue_token(account).await.inspect_err(|e| {
            tracing::error!("Authentication failed for '{}': {}", account.email, e);
        })?;

        self.store.set(credential.clone()).await;
        tracing::info!("User authentication successful");
        Ok(credential)
    }

    /// Whether a credential is cached. Never calls upstream.
    pub async fn is_authenticated(&self) -> bool {
        self.store.is_authenticated().await
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeTelemetry, account};

    fn authenticator(api: Arc<FakeTelemetry>) -> Authenticator {
        Authenticator::new(api, CredentialStore::new(), Some(account()))
    }

    #[tokio::test]
    async fn test_authenticate_twice_calls_upstream_once() {
        let api = Arc::new(FakeTelemetry::new());
        let auth = authenticator(api.clone());

        let first = auth.authenticate().await.unwrap();
        let second = auth.authenticate().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.access_token, "token-for-owner@example.com");
        assert_eq!(api.token_calls(), 1);
    }

    #[tokio::test]
    async fn test_bearer_token_available_after_authenticate() {
        let api = Arc::new(FakeTelemetry::new());
        let auth = authenticator(api);

        assert_eq!(
            auth.store().bearer_token().await,
            Err(GatewayError::NotAuthenticated)
        );
        assert!(!auth.is_authenticated().await);

        auth.authenticate().await.unwrap();

        assert!(auth.is_authenticated().await);
        assert_eq!(
            auth.store().bearer_token().await.unwrap(),
            "token-for-owner@example.com"
        );
    }

    #[tokio::test]
    async fn test_login_failure_propagates_and_caches_nothing() {
        let api = Arc::new(FakeTelemetry::new());
        api.reject_login(true);
        let auth = authenticator(api.clone());

        let err = auth.authenticate().await.unwrap_err();
        assert_eq!(err.upstream_status(), Some(401));
        assert!(!auth.is_authenticated().await);

        // No retry: a second call tries upstream again exactly once more.
        api.reject_login(false);
        auth.authenticate().await.unwrap();
        assert_eq!(api.token_calls(), 2);
    }

    #[tokio::test]
    async fn test_missing_account_is_config_error() {
        let api = Arc::new(FakeTelemetry::new());
        let auth = Authenticator::new(api.clone(), CredentialStore::new(), None);

        assert!(matches!(
            auth.authenticate().await,
            Err(GatewayError::Config(_))
        ));
        assert_eq!(api.token_calls(), 0);
    }

    #[tokio::test]
    async fn test_preloaded_store_skips_login() {
        let api = Arc::new(FakeTelemetry::new());
        let store = CredentialStore::new();
        store.set(Credential::new("preloaded")).await;
        let auth = Authenticator::new(api.clone(), store, None);

        assert_eq!(auth.authenticate().await.unwrap().access_token, "preloaded");
        assert_eq!(api.token_calls(), 0);
    }
}
