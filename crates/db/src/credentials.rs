//! `PgCredentialStore` — the engine's credential boundary backed by the
//! credentials repository.

use async_trait::async_trait;

use engine::{CredentialStore, CredentialStoreError};

use crate::pool::DbPool;
use crate::repository::credentials as credential_repo;

/// Postgres-backed credential store handed to the engine at construction.
#[derive(Clone)]
pub struct PgCredentialStore {
    pool: DbPool,
}

impl PgCredentialStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn get_credential_value(
        &self,
        name: &str,
        user_id: &str,
    ) -> Result<Option<String>, CredentialStoreError> {
        credential_repo::get_credential_value(&self.pool, name, user_id)
            .await
            .map_err(|e| CredentialStoreError(e.to_string()))
    }
}
