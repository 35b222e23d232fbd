use crate::error::{Result, SettleError};
use crate::store::MatchStore;
use crate::wager::{Match, MatchId};
use parking_lot::Mutex;
use rallypot_core::{Amount, Ledger, TransferReceipt, TransferStatus};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

/// Units withheld from every payout so the escrow can still cover transfer
/// fees.
pub const DEFAULT_RESERVE: Amount = Amount::from_raw(5_000);

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_MARK_ATTEMPTS: usize = 5;

/// Per-match payout progress. Failure is an explicit state rather than an
/// absent flag, so "retry later" and "never tried" stay distinguishable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayoutState {
    NotAttempted,
    InFlight,
    Settled,
    Failed(String),
}

/// What one observation concluded.
#[derive(Debug)]
pub enum Observation {
    /// Signatures are not complete yet.
    NotReady,
    /// The match is already settled, here or elsewhere.
    AlreadySettled,
    /// Another observation in this process is mid-payout.
    PayoutInFlight,
    /// This observation executed the payout.
    Settled(TransferReceipt),
}

/// Decides from observed match snapshots whether the payout must run, and
/// runs it at most once no matter how many duplicate or stale snapshots
/// arrive.
///
/// The guard map only covers this process. A second process can pass the
/// same checks concurrently; the ledger's conditional debit is what actually
/// prevents the pot from being paid twice. The guard exists to stop needless
/// duplicate submissions, not as the safety mechanism.
pub struct SettlementCoordinator {
    store: Arc<dyn MatchStore>,
    ledger: Arc<dyn Ledger>,
    reserve: Amount,
    guards: Mutex<HashMap<MatchId, PayoutState>>,
}

impl SettlementCoordinator {
    pub fn new(store: Arc<dyn MatchStore>, ledger: Arc<dyn Ledger>) -> Self {
        Self::with_reserve(store, ledger, DEFAULT_RESERVE)
    }

    pub fn with_reserve(
        store: Arc<dyn MatchStore>,
        ledger: Arc<dyn Ledger>,
        reserve: Amount,
    ) -> Self {
        Self {
            store,
            ledger,
            reserve,
            guards: Mutex::new(HashMap::new()),
        }
    }

    /// Current payout progress for a match, as this process saw it.
    pub fn payout_state(&self, id: &MatchId) -> PayoutState {
        self.guards
            .lock()
            .get(id)
            .cloned()
            .unwrap_or(PayoutState::NotAttempted)
    }

    /// Feeds one observed snapshot through the settlement decision.
    ///
    /// Called for every push notification and every reconciliation poll
    /// tick; the two channels deliver duplicates and stale reads in
    /// arbitrary order, so everything here treats the snapshot as
    /// idempotently-applicable state. The guard is flipped to `InFlight`
    /// before any ledger round-trip begins, and only the caller that flips
    /// it proceeds. A failed payout parks the guard in `Failed`, which a
    /// later observation may retry.
    pub async fn on_match_observed(&self, snapshot: &Match) -> Result<Observation> {
        if snapshot.is_settled() {
            self.guards
                .lock()
                .insert(snapshot.id.clone(), PayoutState::Settled);
            return Ok(Observation::AlreadySettled);
        }
        if !snapshot.all_signed() {
            return Ok(Observation::NotReady);
        }

        {
            let mut guards = self.guards.lock();
            match guards.get(&snapshot.id) {
                Some(PayoutState::InFlight) => return Ok(Observation::PayoutInFlight),
                Some(PayoutState::Settled) => return Ok(Observation::AlreadySettled),
                Some(PayoutState::NotAttempted) | Some(PayoutState::Failed(_)) | None => {
                    guards.insert(snapshot.id.clone(), PayoutState::InFlight);
                }
            }
        }

        match self.execute_payout(snapshot).await {
            Ok(receipt) => {
                self.guards
                    .lock()
                    .insert(snapshot.id.clone(), PayoutState::Settled);
                tracing::info!(
                    "Match {} settled: {} paid to {}",
                    snapshot.id,
                    receipt.amount,
                    receipt.to.short()
                );
                Ok(Observation::Settled(receipt))
            }
            Err(err) => {
                self.guards.lock().insert(
                    snapshot.id.clone(),
                    PayoutState::Failed(err.to_string()),
                );
                Err(err)
            }
        }
    }

    async fn execute_payout(&self, snapshot: &Match) -> Result<TransferReceipt> {
        // Resolve the winner before touching the ledger; bad data must not
        // cost a transfer attempt.
        let winner_address = snapshot.winner()?.address;
        let escrow = snapshot.escrow()?;

        let balance = self.ledger.balance(&escrow.address()).await?;
        let payout = balance.saturating_sub(self.reserve);
        if payout.is_zero() {
            return Err(SettleError::EscrowEmpty {
                balance: balance.raw(),
                reserve: self.reserve.raw(),
            });
        }

        tracing::info!(
            "Match {}: paying {} of {} escrowed to {}",
            snapshot.id,
            payout,
            balance,
            winner_address.short()
        );

        let receipt = escrow
            .transfer(self.ledger.as_ref(), winner_address, payout)
            .await
            .map_err(|err| SettleError::TransferFailed(err.to_string()))?;

        match self.ledger.confirm_transfer(&receipt.transfer_id).await? {
            TransferStatus::Confirmed => {}
            status => {
                return Err(SettleError::TransferFailed(format!(
                    "Transfer {} not confirmed: {:?}",
                    receipt.transfer_id, status
                )));
            }
        }

        self.mark_settled(&snapshot.id, &receipt).await;
        Ok(receipt)
    }

    /// Durably records the settlement. The funds have already moved, so a
    /// lost marking race only means another writer recorded it first; a
    /// store failure here is logged, not propagated.
    async fn mark_settled(&self, id: &MatchId, receipt: &TransferReceipt) {
        for _ in 0..MAX_MARK_ATTEMPTS {
            let mut record = match self.store.get(id).await {
                Ok(record) => record,
                Err(err) => {
                    tracing::warn!("Could not re-read match {} to mark settled: {}", id, err);
                    return;
                }
            };

            if !record.mark_settled(receipt.clone()) {
                return;
            }

            match self.store.update(&record).await {
                Ok(_) => return,
                Err(SettleError::Conflict(_)) => continue,
                Err(err) => {
                    tracing::warn!("Could not mark match {} settled: {}", id, err);
                    return;
                }
            }
        }
        tracing::warn!("Gave up marking match {} settled", id);
    }
}

/// Drives settlement for one match by merging both notification channels
/// into a single stream of snapshots.
///
/// The push subscription and the reconciliation poll land in the same
/// `select!`, so exactly one snapshot at a time reaches the coordinator;
/// there are never two handlers racing on the same aggregate inside a
/// process.
#[derive(Clone)]
pub struct MatchWatcher {
    coordinator: Arc<SettlementCoordinator>,
    store: Arc<dyn MatchStore>,
    poll_interval: Duration,
}

impl MatchWatcher {
    pub fn new(coordinator: Arc<SettlementCoordinator>, store: Arc<dyn MatchStore>) -> Self {
        Self {
            coordinator,
            store,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Watches until the match settles and returns the payout receipt.
    ///
    /// Payout-path failures are logged and retried on the next observation;
    /// only store-level failures end the watch early.
    pub async fn watch(&self, id: &MatchId) -> Result<TransferReceipt> {
        let mut subscription = self.store.subscribe(id).await?;
        let mut poll = tokio::time::interval(self.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut push_closed = false;

        loop {
            let snapshot = tokio::select! {
                _ = poll.tick() => self.store.get(id).await?,
                update = subscription.next(), if !push_closed => match update {
                    Some(record) => record,
                    None => {
                        // The poll carries on alone if the push feed closes.
                        push_closed = true;
                        continue;
                    }
                },
            };

            match self.coordinator.on_match_observed(&snapshot).await {
                Ok(Observation::Settled(receipt)) => return Ok(receipt),
                Ok(Observation::AlreadySettled) => {
                    if let Some(settlement) = snapshot.settlement {
                        return Ok(settlement.receipt);
                    }
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!("Settlement attempt for {} failed: {}", id, err);
                }
            }
        }
    }
}
