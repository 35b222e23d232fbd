use crate::error::{Result, SettleError};
use crate::slot::Slot;
use crate::store::MatchStore;
use crate::wager::{JoinOutcome, Match, MatchId, SignOutcome};
use rallypot_core::Address;
use std::sync::Arc;

const MAX_WRITE_ATTEMPTS: usize = 5;

/// Applies match mutations through the store with optimistic-concurrency
/// retries.
///
/// Every mutation is a read-modify-write against a fresh record, replayed on
/// `Conflict` until it lands or the operation stops making sense on the new
/// state. Mutations that turn out to be no-ops (a duplicate join, a
/// re-delivered signature) skip the write entirely.
pub struct MatchManager {
    store: Arc<dyn MatchStore>,
}

impl MatchManager {
    pub fn new(store: Arc<dyn MatchStore>) -> Self {
        Self { store }
    }

    /// Creates a match with the creator seated and publishes it.
    pub async fn create_match(
        &self,
        creator_slot: Slot,
        creator_address: Address,
        display_name: &str,
    ) -> Result<Match> {
        let record = Match::create(creator_slot, creator_address, display_name)?;
        self.store.insert(&record).await?;

        tracing::info!(
            "Created match {} with {} seated at {}",
            record.id,
            display_name,
            creator_slot
        );
        Ok(record)
    }

    pub async fn get_match(&self, id: &MatchId) -> Result<Match> {
        self.store.get(id).await
    }

    /// Seats a player into `slot`.
    pub async fn join_match(
        &self,
        id: &MatchId,
        slot: Slot,
        address: Address,
        display_name: &str,
    ) -> Result<(Match, JoinOutcome)> {
        let (record, outcome) = self
            .apply(id, |m| m.join(slot, address, display_name))
            .await?;

        if outcome == JoinOutcome::Joined {
            tracing::info!("{} joined match {} at {}", display_name, id, slot);
        }
        Ok((record, outcome))
    }

    /// Proposes the result everyone must sign.
    pub async fn propose_result(
        &self,
        id: &MatchId,
        winner_slot: Slot,
        final_score: &str,
    ) -> Result<Match> {
        let (record, _) = self
            .apply(id, |m| m.propose_result(winner_slot, final_score))
            .await?;

        tracing::info!(
            "Match {} proposal {}: {}",
            id,
            record.proposal_seq,
            record.result_message.as_deref().unwrap_or_default()
        );
        Ok(record)
    }

    /// Records one participant's signature over the current proposal.
    pub async fn record_signature(
        &self,
        id: &MatchId,
        signer_slot: Slot,
        signature: &[u8],
    ) -> Result<(Match, SignOutcome)> {
        let (record, outcome) = self
            .apply(id, |m| m.record_signature(signer_slot, signature))
            .await?;

        if let SignOutcome::Recorded { valid } = outcome {
            tracing::info!(
                "Match {}: {} signed ({}/{} collected, valid: {})",
                id,
                signer_slot,
                record.signatures.len(),
                record.participants.len(),
                valid
            );
        }
        Ok((record, outcome))
    }

    async fn apply<T, F>(&self, id: &MatchId, op: F) -> Result<(Match, T)>
    where
        F: Fn(&mut Match) -> Result<T>,
    {
        for _ in 0..MAX_WRITE_ATTEMPTS {
            let mut record = self.store.get(id).await?;
            let before = record.clone();
            let outcome = op(&mut record)?;

            if record == before {
                return Ok((record, outcome));
            }

            match self.store.update(&record).await {
                Ok(stored) => return Ok((stored, outcome)),
                Err(SettleError::Conflict(reason)) => {
                    tracing::debug!("Retrying write to match {}: {}", id, reason);
                }
                Err(err) => return Err(err),
            }
        }

        Err(SettleError::Conflict(format!(
            "Match {} kept changing, gave up after {} attempts",
            id, MAX_WRITE_ATTEMPTS
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{SqliteMatchStore, Subscription};
    use async_trait::async_trait;
    use rallypot_core::{KeyMaterial, Storage};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    async fn manager() -> (tempfile::TempDir, Arc<SqliteMatchStore>, MatchManager) {
        let dir = tempdir().unwrap();
        let storage = Arc::new(Storage::new(&dir.path().join("test.db")).await.unwrap());
        let store = Arc::new(SqliteMatchStore::new(storage).await.unwrap());
        (dir, store.clone(), MatchManager::new(store))
    }

    /// Store wrapper that loses the first `n` update races on purpose.
    struct ContendedStore {
        inner: Arc<SqliteMatchStore>,
        conflicts_left: AtomicUsize,
    }

    #[async_trait]
    impl MatchStore for ContendedStore {
        async fn get(&self, id: &MatchId) -> Result<Match> {
            self.inner.get(id).await
        }

        async fn insert(&self, record: &Match) -> Result<()> {
            self.inner.insert(record).await
        }

        async fn update(&self, record: &Match) -> Result<Match> {
            if self
                .conflicts_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(SettleError::Conflict("lost a simulated race".to_string()));
            }
            self.inner.update(record).await
        }

        async fn subscribe(&self, id: &MatchId) -> Result<Subscription> {
            self.inner.subscribe(id).await
        }
    }

    #[tokio::test]
    async fn full_flow_lands_in_the_store() {
        let (_dir, store, manager) = manager().await;
        let alice = KeyMaterial::generate();
        let bob = KeyMaterial::generate();

        let created = manager
            .create_match(Slot::A1, alice.address(), "alice")
            .await
            .unwrap();
        manager
            .join_match(&created.id, Slot::B1, bob.address(), "bob")
            .await
            .unwrap();
        let proposed = manager
            .propose_result(&created.id, Slot::B1, "11-9")
            .await
            .unwrap();

        let message = proposed.result_message.as_deref().unwrap();
        let (record, outcome) = manager
            .record_signature(&created.id, Slot::A1, &alice.sign(message.as_bytes()))
            .await
            .unwrap();

        assert_eq!(outcome, SignOutcome::Recorded { valid: true });
        assert_eq!(store.get(&created.id).await.unwrap(), record);
    }

    #[tokio::test]
    async fn lost_race_is_replayed_on_a_fresh_read() {
        let (_dir, store, _unused) = manager().await;
        let contended = Arc::new(ContendedStore {
            inner: store.clone(),
            conflicts_left: AtomicUsize::new(2),
        });
        let manager = MatchManager::new(contended);

        let alice = KeyMaterial::generate();
        let bob = KeyMaterial::generate();
        let created = manager
            .create_match(Slot::A1, alice.address(), "alice")
            .await
            .unwrap();

        let (record, outcome) = manager
            .join_match(&created.id, Slot::B1, bob.address(), "bob")
            .await
            .unwrap();

        assert_eq!(outcome, JoinOutcome::Joined);
        assert_eq!(record.participants.len(), 2);
        assert_eq!(store.get(&created.id).await.unwrap(), record);
    }

    #[tokio::test]
    async fn persistent_contention_gives_up_with_conflict() {
        let (_dir, store, _unused) = manager().await;
        let contended = Arc::new(ContendedStore {
            inner: store,
            conflicts_left: AtomicUsize::new(usize::MAX),
        });
        let manager = MatchManager::new(contended);

        let alice = KeyMaterial::generate();
        let bob = KeyMaterial::generate();
        let created = manager
            .create_match(Slot::A1, alice.address(), "alice")
            .await
            .unwrap();

        let err = manager
            .join_match(&created.id, Slot::B1, bob.address(), "bob")
            .await
            .unwrap_err();
        assert!(matches!(err, SettleError::Conflict(_)));
    }

    #[tokio::test]
    async fn duplicate_signature_skips_the_store_write() {
        let (_dir, store, manager) = manager().await;
        let alice = KeyMaterial::generate();
        let bob = KeyMaterial::generate();

        let created = manager
            .create_match(Slot::A1, alice.address(), "alice")
            .await
            .unwrap();
        manager
            .join_match(&created.id, Slot::B1, bob.address(), "bob")
            .await
            .unwrap();
        let proposed = manager
            .propose_result(&created.id, Slot::B1, "11-9")
            .await
            .unwrap();

        let signature = alice.sign(proposed.result_message.as_deref().unwrap().as_bytes());
        manager
            .record_signature(&created.id, Slot::A1, &signature)
            .await
            .unwrap();
        let after_first = store.get(&created.id).await.unwrap();

        let (_, outcome) = manager
            .record_signature(&created.id, Slot::A1, &signature)
            .await
            .unwrap();
        assert_eq!(outcome, SignOutcome::AlreadySigned);
        assert_eq!(store.get(&created.id).await.unwrap().revision, after_first.revision);
    }

    #[tokio::test]
    async fn joining_a_missing_match_is_not_found() {
        let (_dir, _store, manager) = manager().await;
        let bob = KeyMaterial::generate();
        let id: MatchId = "ABSENT00".parse().unwrap();

        let err = manager
            .join_match(&id, Slot::B1, bob.address(), "bob")
            .await
            .unwrap_err();
        assert!(matches!(err, SettleError::MatchNotFound(_)));
    }
}
