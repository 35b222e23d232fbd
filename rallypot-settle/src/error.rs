use crate::slot::Slot;
use crate::wager::MatchId;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SettleError>;

#[derive(Error, Debug)]
pub enum SettleError {
    #[error("Rallypot core error: {0}")]
    Core(#[from] rallypot_core::CoreError),

    #[error("Match not found: {0}")]
    MatchNotFound(MatchId),

    #[error("Invalid slot: {0}")]
    InvalidSlot(String),

    #[error("Slot {0} is already taken")]
    SlotOccupied(Slot),

    #[error("Match roster is incomplete")]
    RosterIncomplete,

    #[error("No result has been proposed yet")]
    NoProposalYet,

    #[error("Invalid match state: {0}")]
    InvalidState(String),

    #[error("Proposed winner {0} is not seated in the match")]
    WinnerUnresolved(Slot),

    #[error("Escrow holds {balance}, below the {reserve} reserve")]
    EscrowEmpty { balance: u64, reserve: u64 },

    #[error("Payout transfer failed: {0}")]
    TransferFailed(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}
