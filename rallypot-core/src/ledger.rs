//! Balance ledger interface and a local sqlite-backed implementation.
//!
//! The ledger is the source of truth for account balances. Settlement code
//! talks to it through the [`Ledger`] trait so a real payment backend can be
//! swapped in without touching the callers; [`SqliteLedger`] is the
//! single-process development backend.

use crate::error::{CoreError, Result};
use crate::identity::{verify_signature, KeyMaterial};
use crate::storage::Storage;
use crate::types::{Address, Amount, TransferReceipt, TransferStatus};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::params;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// A transfer instruction authorized by the debited account's key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedTransfer {
    pub transfer_id: String,
    pub from: Address,
    pub to: Address,
    pub amount: Amount,
    /// Hex-encoded signature over [`transfer_message`].
    pub authorization: String,
}

/// Canonical byte message covered by a transfer authorization.
pub fn transfer_message(
    transfer_id: &str,
    from: &Address,
    to: &Address,
    amount: Amount,
) -> Vec<u8> {
    format!(
        "transfer:{}:{}:{}:{}",
        transfer_id,
        from,
        to,
        amount.raw()
    )
    .into_bytes()
}

/// Builds a transfer debiting the account that owns `keys`.
pub fn build_transfer(keys: &KeyMaterial, to: Address, amount: Amount) -> SignedTransfer {
    let transfer_id = Uuid::new_v4().to_string();
    let from = keys.address();
    let message = transfer_message(&transfer_id, &from, &to, amount);
    let authorization = hex::encode(keys.sign(&message));

    SignedTransfer {
        transfer_id,
        from,
        to,
        amount,
        authorization,
    }
}

/// Source of truth for balances and transfer status.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Current confirmed balance of `address`. Unknown accounts hold zero.
    async fn balance(&self, address: &Address) -> Result<Amount>;

    /// Submits a signed transfer. The debit and credit are atomic; a
    /// transfer that would overdraw the source account is rejected whole.
    async fn submit_transfer(&self, transfer: &SignedTransfer) -> Result<TransferReceipt>;

    /// Status of a previously submitted transfer.
    async fn confirm_transfer(&self, transfer_id: &str) -> Result<TransferStatus>;
}

/// Development ledger backed by the shared sqlite storage.
pub struct SqliteLedger {
    storage: Arc<Storage>,
}

impl SqliteLedger {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// Faucet for local setups: credits `amount` to an account out of thin
    /// air and returns the new balance.
    pub async fn credit(&self, address: &Address, amount: Amount) -> Result<Amount> {
        let conn = self.storage.get_connection().await;

        conn.execute(
            "INSERT INTO accounts (address, balance) VALUES (?1, ?2)
             ON CONFLICT(address) DO UPDATE SET balance = balance + ?2",
            params![address.to_hex(), amount.raw() as i64],
        )?;

        let balance: i64 = conn.query_row(
            "SELECT balance FROM accounts WHERE address = ?1",
            params![address.to_hex()],
            |row| row.get(0),
        )?;

        tracing::info!("Credited {} to {}", amount, address.short());
        Ok(Amount::from_raw(balance as u64))
    }
}

#[async_trait]
impl Ledger for SqliteLedger {
    async fn balance(&self, address: &Address) -> Result<Amount> {
        let conn = self.storage.get_connection().await;

        let balance: i64 = conn.query_row(
            "SELECT COALESCE(SUM(balance), 0) FROM accounts WHERE address = ?1",
            params![address.to_hex()],
            |row| row.get(0),
        )?;

        Ok(Amount::from_raw(balance as u64))
    }

    async fn submit_transfer(&self, transfer: &SignedTransfer) -> Result<TransferReceipt> {
        if transfer.amount.is_zero() {
            return Err(CoreError::invalid_input("Transfer amount must be positive"));
        }

        let signature = hex::decode(&transfer.authorization)
            .map_err(|_| CoreError::ledger("Transfer authorization is not valid hex"))?;
        let message = transfer_message(
            &transfer.transfer_id,
            &transfer.from,
            &transfer.to,
            transfer.amount,
        );
        if !verify_signature(&signature, &message, &transfer.from) {
            return Err(CoreError::ledger(
                "Transfer authorization does not verify against the source account",
            ));
        }

        let mut conn = self.storage.get_connection().await;
        let tx = conn.transaction()?;

        let already_submitted: i64 = tx.query_row(
            "SELECT COUNT(*) FROM transfers WHERE transfer_id = ?1",
            params![transfer.transfer_id],
            |row| row.get(0),
        )?;
        if already_submitted > 0 {
            return Err(CoreError::conflict(format!(
                "Transfer {} was already submitted",
                transfer.transfer_id
            )));
        }

        // Conditional debit: the balance check and the debit are one
        // statement, so two racing transfers cannot both pass the check.
        let debited = tx.execute(
            "UPDATE accounts SET balance = balance - ?2
             WHERE address = ?1 AND balance >= ?2",
            params![transfer.from.to_hex(), transfer.amount.raw() as i64],
        )?;
        if debited == 0 {
            let available: i64 = tx.query_row(
                "SELECT COALESCE(SUM(balance), 0) FROM accounts WHERE address = ?1",
                params![transfer.from.to_hex()],
                |row| row.get(0),
            )?;
            return Err(CoreError::InsufficientFunds {
                need: transfer.amount.raw(),
                available: available as u64,
            });
        }

        tx.execute(
            "INSERT INTO accounts (address, balance) VALUES (?1, ?2)
             ON CONFLICT(address) DO UPDATE SET balance = balance + ?2",
            params![transfer.to.to_hex(), transfer.amount.raw() as i64],
        )?;

        let submitted_at = Utc::now();
        tx.execute(
            "INSERT INTO transfers (transfer_id, from_address, to_address, amount, submitted_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                transfer.transfer_id,
                transfer.from.to_hex(),
                transfer.to.to_hex(),
                transfer.amount.raw() as i64,
                submitted_at.to_rfc3339(),
            ],
        )?;

        tx.commit()?;

        tracing::info!(
            "Transfer {}: {} from {} to {}",
            transfer.transfer_id,
            transfer.amount,
            transfer.from.short(),
            transfer.to.short()
        );

        Ok(TransferReceipt {
            transfer_id: transfer.transfer_id.clone(),
            from: transfer.from,
            to: transfer.to,
            amount: transfer.amount,
            submitted_at,
        })
    }

    async fn confirm_transfer(&self, transfer_id: &str) -> Result<TransferStatus> {
        let conn = self.storage.get_connection().await;

        let recorded: i64 = conn.query_row(
            "SELECT COUNT(*) FROM transfers WHERE transfer_id = ?1",
            params![transfer_id],
            |row| row.get(0),
        )?;

        if recorded > 0 {
            Ok(TransferStatus::Confirmed)
        } else {
            Ok(TransferStatus::Failed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn ledger() -> (tempfile::TempDir, SqliteLedger) {
        let dir = tempdir().unwrap();
        let storage = Arc::new(Storage::new(&dir.path().join("test.db")).await.unwrap());
        (dir, SqliteLedger::new(storage))
    }

    #[tokio::test]
    async fn unknown_account_has_zero_balance() {
        let (_dir, ledger) = ledger().await;
        let keys = KeyMaterial::generate();

        let balance = ledger.balance(&keys.address()).await.unwrap();
        assert!(balance.is_zero());
    }

    #[tokio::test]
    async fn credit_accumulates() {
        let (_dir, ledger) = ledger().await;
        let keys = KeyMaterial::generate();

        ledger
            .credit(&keys.address(), Amount::from_raw(400))
            .await
            .unwrap();
        let balance = ledger
            .credit(&keys.address(), Amount::from_raw(600))
            .await
            .unwrap();

        assert_eq!(balance, Amount::from_raw(1_000));
        assert_eq!(
            ledger.balance(&keys.address()).await.unwrap(),
            Amount::from_raw(1_000)
        );
    }

    #[tokio::test]
    async fn transfer_moves_funds_atomically() {
        let (_dir, ledger) = ledger().await;
        let sender = KeyMaterial::generate();
        let receiver = KeyMaterial::generate();

        ledger
            .credit(&sender.address(), Amount::from_raw(1_000))
            .await
            .unwrap();

        let transfer = build_transfer(&sender, receiver.address(), Amount::from_raw(750));
        let receipt = ledger.submit_transfer(&transfer).await.unwrap();

        assert_eq!(receipt.amount, Amount::from_raw(750));
        assert_eq!(
            ledger.balance(&sender.address()).await.unwrap(),
            Amount::from_raw(250)
        );
        assert_eq!(
            ledger.balance(&receiver.address()).await.unwrap(),
            Amount::from_raw(750)
        );
        assert_eq!(
            ledger.confirm_transfer(&transfer.transfer_id).await.unwrap(),
            TransferStatus::Confirmed
        );
    }

    #[tokio::test]
    async fn overdraft_is_rejected_without_side_effects() {
        let (_dir, ledger) = ledger().await;
        let sender = KeyMaterial::generate();
        let receiver = KeyMaterial::generate();

        ledger
            .credit(&sender.address(), Amount::from_raw(100))
            .await
            .unwrap();

        let transfer = build_transfer(&sender, receiver.address(), Amount::from_raw(500));
        let err = ledger.submit_transfer(&transfer).await.unwrap_err();

        assert!(matches!(
            err,
            CoreError::InsufficientFunds {
                need: 500,
                available: 100
            }
        ));
        assert_eq!(
            ledger.balance(&sender.address()).await.unwrap(),
            Amount::from_raw(100)
        );
        assert!(ledger.balance(&receiver.address()).await.unwrap().is_zero());
        assert_eq!(
            ledger.confirm_transfer(&transfer.transfer_id).await.unwrap(),
            TransferStatus::Failed
        );
    }

    #[tokio::test]
    async fn duplicate_transfer_id_is_a_conflict() {
        let (_dir, ledger) = ledger().await;
        let sender = KeyMaterial::generate();
        let receiver = KeyMaterial::generate();

        ledger
            .credit(&sender.address(), Amount::from_raw(1_000))
            .await
            .unwrap();

        let transfer = build_transfer(&sender, receiver.address(), Amount::from_raw(100));
        ledger.submit_transfer(&transfer).await.unwrap();
        let err = ledger.submit_transfer(&transfer).await.unwrap_err();

        assert!(matches!(err, CoreError::Conflict(_)));
        // The first submission stands; nothing moved twice.
        assert_eq!(
            ledger.balance(&sender.address()).await.unwrap(),
            Amount::from_raw(900)
        );
    }

    #[tokio::test]
    async fn forged_authorization_is_rejected() {
        let (_dir, ledger) = ledger().await;
        let sender = KeyMaterial::generate();
        let thief = KeyMaterial::generate();

        ledger
            .credit(&sender.address(), Amount::from_raw(1_000))
            .await
            .unwrap();

        // Signed by the wrong key: the thief tries to spend the sender's funds.
        let mut transfer = build_transfer(&thief, thief.address(), Amount::from_raw(1_000));
        transfer.from = sender.address();

        let err = ledger.submit_transfer(&transfer).await.unwrap_err();
        assert!(matches!(err, CoreError::Ledger(_)));
        assert_eq!(
            ledger.balance(&sender.address()).await.unwrap(),
            Amount::from_raw(1_000)
        );
    }

    #[tokio::test]
    async fn zero_amount_is_rejected() {
        let (_dir, ledger) = ledger().await;
        let sender = KeyMaterial::generate();
        let receiver = KeyMaterial::generate();

        let transfer = build_transfer(&sender, receiver.address(), Amount::from_raw(0));
        let err = ledger.submit_transfer(&transfer).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(_)));
    }
}
