//! Fixed account list for hosts that manage credentials themselves.

use async_trait::async_trait;
use bridge_traits::catalog::{AccountCatalog, AccountDirectory};
use bridge_traits::error::Result;
use bridge_traits::http::HttpClient;
use provider_google_photos::GooglePhotosConnector;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Account directory whose entries are added by the host.
#[derive(Default)]
pub struct StaticAccountDirectory {
    accounts: RwLock<Vec<AccountCatalog>>,
}

impl StaticAccountDirectory {
    pub fn new(accounts: Vec<AccountCatalog>) -> Self {
        Self {
            accounts: RwLock::new(accounts),
        }
    }

    /// Add or replace an account, keyed by e-mail.
    pub async fn upsert(&self, account: AccountCatalog) {
        let mut accounts = self.accounts.write().await;
        accounts.retain(|existing| existing.email != account.email);
        accounts.push(account);
    }

    /// Register a Google Photos account with a ready access token.
    pub async fn add_google_photos(
        &self,
        email: &str,
        client_id: &str,
        access_token: &str,
        http_client: Arc<dyn HttpClient>,
    ) {
        let connector = GooglePhotosConnector::new(http_client, access_token);
        self.upsert(AccountCatalog::new(email, client_id, Arc::new(connector)))
            .await;
    }

    pub async fn remove(&self, email: &str) -> bool {
        let mut accounts = self.accounts.write().await;
        let before = accounts.len();
        accounts.retain(|existing| existing.email != email);
        accounts.len() != before
    }
}

#[async_trait]
impl AccountDirectory for StaticAccountDirectory {
    async fn accounts(&self) -> Result<Vec<AccountCatalog>> {
        Ok(self.accounts.read().await.clone())
    }
}
