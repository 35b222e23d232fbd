//! Rallypot core - identities, escrow accounts, and the balance ledger.
//!
//! This library provides the platform layer for wagered-match settlement:
//! named signing identities, escrow key handling, signature verification,
//! and the ledger interface that settlement code pays out through.

pub mod error;
pub mod escrow;
pub mod identity;
pub mod ledger;
pub mod storage;
pub mod types;

pub use error::{CoreError, Result};
pub use escrow::EscrowAccount;
pub use identity::{verify_signature, Identity, IdentityManager, KeyMaterial};
pub use ledger::{build_transfer, Ledger, SignedTransfer, SqliteLedger};
pub use storage::Storage;
pub use types::{Address, Amount, TransferReceipt, TransferStatus};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[tokio::test]
    async fn identity_signs_for_the_ledger() {
        let temp_dir = tempdir().unwrap();
        let storage = Arc::new(
            Storage::new(&temp_dir.path().join("rallypot.db"))
                .await
                .unwrap(),
        );
        let manager = IdentityManager::new(storage.clone());
        let ledger = SqliteLedger::new(storage);

        let alice = manager.create_identity("alice").await.unwrap();
        let bob = manager.create_identity("bob").await.unwrap();

        ledger
            .credit(&alice.address(), Amount::from_raw(500))
            .await
            .unwrap();
        let transfer = build_transfer(alice.keys(), bob.address(), Amount::from_raw(200));
        ledger.submit_transfer(&transfer).await.unwrap();

        assert_eq!(
            ledger.balance(&bob.address()).await.unwrap(),
            Amount::from_raw(200)
        );
    }
}
