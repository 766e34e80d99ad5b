//! Entry point wiring the credential store, client and controller together.

use std::sync::Arc;

use adminpanel_core::AdminResult;

use crate::config::ClientConfig;
use crate::controller::DirectoryController;
use crate::credential::{CredentialStore, FileCredentialStore};
use crate::http::AuthenticatedClient;

/// Controller type handed to the presentation layer.
pub type Directory = DirectoryController<Arc<AuthenticatedClient>>;

/// Login/logout surface plus a factory for directory controllers.
///
/// A controller that hit `Unauthenticated` is finished; after logging in
/// again, take a fresh one from [`directory`](Self::directory).
#[derive(Clone)]
pub struct AdminSession {
    client: Arc<AuthenticatedClient>,
}

impl AdminSession {
    pub fn new(config: ClientConfig, store: Arc<dyn CredentialStore>) -> AdminResult<Self> {
        Ok(Self {
            client: Arc::new(AuthenticatedClient::new(config, store)?),
        })
    }

    /// Environment configuration with the persistent per-origin store.
    pub fn from_env() -> AdminResult<Self> {
        let config = ClientConfig::from_env();
        let store = Arc::new(FileCredentialStore::for_origin(&config.api_url));
        tracing::debug!(api_url = %config.api_url, store = ?store.path(), "session configured");
        Self::new(config, store)
    }

    pub fn client(&self) -> &Arc<AuthenticatedClient> {
        &self.client
    }

    pub fn is_authenticated(&self) -> bool {
        self.client.is_authenticated()
    }

    /// Log in and return a controller bound to the new credential.
    pub async fn login(&self, email: &str, password: &str) -> AdminResult<Directory> {
        self.client.login(email, password).await?;
        Ok(self.directory())
    }

    /// A fresh controller in the `Idle` phase.
    pub fn directory(&self) -> Directory {
        DirectoryController::new(self.client.clone())
    }

    pub fn logout(&self) {
        self.client.logout();
    }
}
