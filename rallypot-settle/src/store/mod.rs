//! Replicated match store abstraction.

pub mod sqlite;

pub use sqlite::SqliteMatchStore;

use crate::error::Result;
use crate::wager::{Match, MatchId};
use async_trait::async_trait;
use tokio::sync::broadcast;

/// Durable shared home of match records.
///
/// Implementations guarantee per-call atomicity and optimistic concurrency:
/// `update` is a whole-record compare-and-swap against the revision the
/// caller read, so a losing writer gets `Conflict` and retries against a
/// fresh read instead of clobbering someone else's write. Nothing beyond a
/// single call is ever atomic.
#[async_trait]
pub trait MatchStore: Send + Sync {
    /// Fetches a match by lobby code. Fails with `MatchNotFound` when the
    /// code does not resolve.
    async fn get(&self, id: &MatchId) -> Result<Match>;

    /// Inserts a new match. Fails with `Conflict` if the code is taken.
    async fn insert(&self, record: &Match) -> Result<()>;

    /// Replaces a match record if its stored revision still matches the one
    /// the caller read, and returns the record with its bumped revision.
    async fn update(&self, record: &Match) -> Result<Match>;

    /// Opens a push-style feed of updates for one match.
    async fn subscribe(&self, id: &MatchId) -> Result<Subscription>;
}

/// Update feed for a single match.
pub struct Subscription {
    id: MatchId,
    rx: broadcast::Receiver<Match>,
}

impl Subscription {
    pub(crate) fn new(id: MatchId, rx: broadcast::Receiver<Match>) -> Self {
        Self { id, rx }
    }

    /// Next update for the subscribed match, or `None` once the feed closes.
    ///
    /// A lagged receiver skips ahead instead of failing: every missed
    /// snapshot is superseded by the ones still queued, and the
    /// reconciliation poll covers whatever the queue dropped.
    pub async fn next(&mut self) -> Option<Match> {
        loop {
            match self.rx.recv().await {
                Ok(record) if record.id == self.id => return Some(record),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Match feed for {} lagged, skipped {} updates", self.id, skipped);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
