//! Thread-safe credential store for concurrent access.
//!
//! A single cached [`Credential`] is shared by the authenticator and the
//! report gateway via `Arc<RwLock<>>`. Every clone of [`CredentialStore`]
//! points at the same slot.

use std::sync::Arc;
use tokio::sync::RwLock;

use crate::credential::Credential;
use crate::error::{GatewayError, Result};

/// Holds zero or one credential.
///
/// Writes are last-write-wins with no merge and no expiry check. Readers never
/// wait on upstream I/O; the lock is only held for the copy in or out.
///
/// # Example
///
/// ```no_run
/// use tractive_gateway::{Credential, CredentialStore};
///
/// #[tokio::main]
/// async fn main() {
///     let store = CredentialStore::new();
///     assert!(store.bearer_token().await.is_err());
///
///     store.set(Credential::new("token")).await;
///     assert_eq!(store.bearer_token().await.unwrap(), "token");
/// }
/// ```
#[derive(Clone, Default)]
pub struct CredentialStore {
    inner: Arc<RwLock<Option<Credential>>>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the cached credential, if any.
    pub async fn get(&self) -> Option<Credential> {
        self.inner.read().await.clone()
    }

    /// Replace the cached credential unconditionally.
    pub async fn set(&self, credential: Credential) {
        let mut slot = self.inner.write().await;
        *slot = Some(credential);
    }

    /// Token to put in the `Authorization: Bearer` header.
    ///
    /// Fails with [`GatewayError::NotAuthenticated`] when nothing has been
    /// cached yet, including after a failed authentication attempt.
    pub async fn bearer_token(&self) -> Result<String> {
        self.inner
            .read()
            .await
            .as_ref()
            .map(|c| c.access_token.clone())
            .ok_or(GatewayError::NotAuthenticated)
    }

    pub async fn is_authenticated(&self) -> bool {
        self.inner.read().await.is_some()
    }

    /// Drop the cached credential. Nothing calls this automatically; an
    /// upstream 401 does not clear the store.
    pub async fn clear(&self) {
        let mut slot = self.inner.write().await;
        if slot.take().is_some() {
            tracing::info!("Cleared cached credential");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_store_creation() {
        let store = CredentialStore::new();
        assert!(store.get().await.is_none());
        assert!(!store.is_authenticated().await);
        assert_eq!(
            store.bearer_token().await,
            Err(GatewayError::NotAuthenticated)
        );
    }

    #[tokio::test]
    async fn test_set_overwrites() {
        let store = CredentialStore::new();
        store.set(Credential::new("first")).await;
        store.set(Credential::new("second")).await;
        assert_eq!(store.bearer_token().await.unwrap(), "second");
    }

    #[tokio::test]
    async fn test_clones_share_slot() {
        let store = CredentialStore::new();
        let other = store.clone();
        other.set(Credential::new("shared")).await;
        assert!(store.is_authenticated().await);

        store.clear().await;
        assert!(!other.is_authenticated().await);
    }
}
