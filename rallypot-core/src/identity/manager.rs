use crate::error::{CoreError, Result};
use crate::identity::KeyMaterial;
use crate::storage::identity_store::{IdentityRecord, IdentityStore};
use crate::storage::Storage;
use crate::types::Address;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// A named local signing identity: the player's key pair plus metadata.
pub struct Identity {
    id: String,
    name: String,
    keys: KeyMaterial,
}

impl Identity {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> Address {
        self.keys.address()
    }

    pub fn keys(&self) -> &KeyMaterial {
        &self.keys
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("address", &self.address().short())
            .finish()
    }
}

/// Creates and loads signing identities backed by the shared storage, with
/// an in-process cache keyed by name.
pub struct IdentityManager {
    storage: Arc<Storage>,
    identities: Arc<RwLock<HashMap<String, Arc<Identity>>>>,
}

impl IdentityManager {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self {
            storage,
            identities: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn create_identity(&self, name: &str) -> Result<Arc<Identity>> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CoreError::invalid_input("Identity name cannot be empty"));
        }

        // Check if identity already exists
        let store = IdentityStore::new(&self.storage);
        if store.identity_exists(name).await? {
            return Err(CoreError::conflict(format!(
                "Identity '{}' already exists",
                name
            )));
        }

        let keys = KeyMaterial::generate();
        let record = IdentityRecord {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            address: keys.address(),
            secret_hex: keys.to_hex(),
            created_at: Utc::now(),
        };
        store.save_identity(&record).await?;

        let identity = Arc::new(Identity {
            id: record.id,
            name: record.name,
            keys,
        });

        // Cache the identity
        {
            let mut identities = self.identities.write();
            identities.insert(name.to_string(), identity.clone());
        }

        tracing::info!(
            "Created identity '{}' with address {}",
            name,
            identity.address().short()
        );
        Ok(identity)
    }

    pub async fn load_identity(&self, name: &str) -> Result<Arc<Identity>> {
        // Check cache first
        {
            let identities = self.identities.read();
            if let Some(identity) = identities.get(name) {
                return Ok(identity.clone());
            }
        }

        let store = IdentityStore::new(&self.storage);
        let record = store
            .list_identities()
            .await?
            .into_iter()
            .find(|r| r.name == name)
            .ok_or_else(|| CoreError::IdentityNotFound {
                name: name.to_string(),
            })?;

        let keys = KeyMaterial::from_hex(&record.secret_hex)?;
        if keys.address() != record.address {
            // The stored secret no longer matches the advertised address; any
            // signature made with it would fail verification everywhere.
            return Err(CoreError::crypto(format!(
                "Stored secret for '{}' does not match its address",
                name
            )));
        }

        let identity = Arc::new(Identity {
            id: record.id,
            name: record.name,
            keys,
        });

        // Cache the identity
        {
            let mut identities = self.identities.write();
            identities.insert(name.to_string(), identity.clone());
        }

        Ok(identity)
    }

    pub async fn list_identities(&self) -> Result<Vec<IdentityRecord>> {
        let store = IdentityStore::new(&self.storage);
        store.list_identities().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn manager() -> (tempfile::TempDir, IdentityManager) {
        let dir = tempdir().unwrap();
        let storage = Arc::new(Storage::new(&dir.path().join("test.db")).await.unwrap());
        (dir, IdentityManager::new(storage))
    }

    #[tokio::test]
    async fn create_and_reload_identity() {
        let (_dir, manager) = manager().await;

        let created = manager.create_identity("alice").await.unwrap();
        let loaded = manager.load_identity("alice").await.unwrap();

        assert_eq!(created.address(), loaded.address());
        assert_eq!(loaded.name(), "alice");
    }

    #[tokio::test]
    async fn duplicate_name_is_a_conflict() {
        let (_dir, manager) = manager().await;

        manager.create_identity("bob").await.unwrap();
        let err = manager.create_identity("bob").await.unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn missing_identity_is_not_found() {
        let (_dir, manager) = manager().await;

        let err = manager.load_identity("carol").await.unwrap_err();
        assert!(matches!(err, CoreError::IdentityNotFound { .. }));
    }

    #[tokio::test]
    async fn list_returns_every_identity() {
        let (_dir, manager) = manager().await;

        manager.create_identity("alice").await.unwrap();
        manager.create_identity("bob").await.unwrap();

        let names: Vec<String> = manager
            .list_identities()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["alice".to_string(), "bob".to_string()]);
    }
}
