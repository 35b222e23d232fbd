//! Escrow settlement protocol for peer-to-peer wagered matches.
//!
//! A match collects two or four players into fixed slots, custodies the pot
//! in a per-match escrow account, and pays the declared winner exactly once
//! after every participant has signed the same result message. The
//! [`SettlementCoordinator`] is the only component allowed to trigger the
//! payout.

pub mod coordinator;
pub mod error;
pub mod manager;
pub mod participant;
pub mod slot;
pub mod store;
pub mod wager;

pub use coordinator::{
    MatchWatcher, Observation, PayoutState, SettlementCoordinator, DEFAULT_RESERVE,
};
pub use error::{Result, SettleError};
pub use manager::MatchManager;
pub use participant::Participant;
pub use slot::{Side, Slot};
pub use store::{MatchStore, SqliteMatchStore, Subscription};
pub use wager::{
    result_message, JoinOutcome, Match, MatchId, Phase, SignOutcome, SignatureEntry,
};
