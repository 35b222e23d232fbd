use crate::error::{Result, SettleError};
use crate::participant::Participant;
use crate::slot::{Side, Slot};
use chrono::{DateTime, Utc};
use rallypot_core::{verify_signature, Address, EscrowAccount, TransferReceipt};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Shareable lobby code identifying a match.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MatchId(String);

impl MatchId {
    /// Generates a short code players can read out loud.
    pub fn generate() -> Self {
        let hex = Uuid::new_v4().simple().to_string();
        Self(hex[..8].to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for MatchId {
    type Err = SettleError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let code = s.trim();
        if code.is_empty() {
            return Err(SettleError::InvalidInput(
                "Match code cannot be empty".to_string(),
            ));
        }
        Ok(Self(code.to_uppercase()))
    }
}

/// Lifecycle phase, derived from the record rather than stored in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Forming,
    ResultProposed,
    AwaitingSignatures,
    Settled,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Forming => f.write_str("Forming"),
            Phase::ResultProposed => f.write_str("Result proposed"),
            Phase::AwaitingSignatures => f.write_str("Awaiting signatures"),
            Phase::Settled => f.write_str("Settled"),
        }
    }
}

/// A participant's attestation over the current result message. Invalid
/// signatures are kept for audit rather than dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureEntry {
    /// Hex-encoded signature bytes.
    pub signature_bytes: String,
    pub is_valid: bool,
    #[serde(default)]
    pub signed_at: DateTime<Utc>,
}

/// Durable proof that the payout happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementRecord {
    pub receipt: TransferReceipt,
    pub settled_at: DateTime<Utc>,
}

/// A superseded proposal, preserved with whatever signatures it had
/// collected when a new proposal replaced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchivedRound {
    pub proposal_seq: u64,
    pub winner_slot: Slot,
    pub final_score: String,
    pub result_message: String,
    pub message_digest: String,
    pub signatures: BTreeMap<Slot, SignatureEntry>,
    pub archived_at: DateTime<Utc>,
}

/// Canonical message participants sign for a proposed result. Changing the
/// winner or the score yields a different message, so stale signatures can
/// never be replayed against a new proposal.
pub fn result_message(winner_slot: Slot, final_score: &str) -> String {
    format!("Result: {} wins. Score: {}", winner_slot, final_score)
}

/// Hex sha-256 digest of a result message, pinned into archived rounds.
pub fn message_digest(message: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(message.as_bytes());
    hex::encode(hasher.finalize())
}

/// The root match record: roster, escrow custody material, the current
/// proposal with its collected signatures, and the settlement outcome.
///
/// This struct is the wire contract between clients sharing a store; its
/// serialized field names must stay stable across versions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    pub id: MatchId,
    pub participants: BTreeMap<Slot, Participant>,
    pub escrow_public_key: Address,
    /// Escrow signing secret, shared through the record so whichever client
    /// observes completion first can release the pot. Any holder can spend;
    /// see [`EscrowAccount`].
    pub escrow_secret: String,
    #[serde(default)]
    pub proposed_winner_slot: Option<Slot>,
    #[serde(default)]
    pub final_score: Option<String>,
    #[serde(default)]
    pub result_message: Option<String>,
    #[serde(default)]
    pub signatures: BTreeMap<Slot, SignatureEntry>,
    /// Bumped on every proposal; signatures always belong to the current seq.
    #[serde(default)]
    pub proposal_seq: u64,
    #[serde(default)]
    pub settlement: Option<SettlementRecord>,
    #[serde(default)]
    pub history: Vec<ArchivedRound>,
    #[serde(default)]
    pub created_at: DateTime<Utc>,
    /// Store revision for optimistic concurrency.
    #[serde(default = "default_revision")]
    pub revision: u64,
}

fn default_revision() -> u64 {
    1
}

/// What a join attempt did to the roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    Joined,
    /// The same player was already seated in that slot.
    AlreadyJoined,
}

/// What recording a signature did to the match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignOutcome {
    Recorded { valid: bool },
    /// That slot already signed the current proposal.
    AlreadySigned,
}

impl Match {
    /// Creates a match with the creator seated and a fresh escrow account.
    pub fn create(
        creator_slot: Slot,
        creator_address: Address,
        display_name: &str,
    ) -> Result<Self> {
        let creator = Participant::new(creator_slot, creator_address, display_name)?;
        let escrow = EscrowAccount::generate();

        let mut participants = BTreeMap::new();
        participants.insert(creator_slot, creator);

        Ok(Self {
            id: MatchId::generate(),
            participants,
            escrow_public_key: escrow.address(),
            escrow_secret: escrow.secret_hex(),
            proposed_winner_slot: None,
            final_score: None,
            result_message: None,
            signatures: BTreeMap::new(),
            proposal_seq: 0,
            settlement: None,
            history: Vec::new(),
            created_at: Utc::now(),
            revision: 1,
        })
    }

    /// Seats a player. Re-joining the slot you already hold is a no-op;
    /// taking a slot someone else holds is rejected so a seat can never be
    /// hijacked.
    pub fn join(&mut self, slot: Slot, address: Address, display_name: &str) -> Result<JoinOutcome> {
        if self.is_settled() {
            return Err(SettleError::InvalidState(
                "Match is already settled".to_string(),
            ));
        }
        if self.result_message.is_some() {
            return Err(SettleError::InvalidState(
                "Cannot join after a result has been proposed".to_string(),
            ));
        }

        if let Some(existing) = self.participants.get(&slot) {
            if existing.address == address {
                return Ok(JoinOutcome::AlreadyJoined);
            }
            return Err(SettleError::SlotOccupied(slot));
        }

        let participant = Participant::new(slot, address, display_name)?;
        self.participants.insert(slot, participant);
        Ok(JoinOutcome::Joined)
    }

    /// Proposes the match result. Any prior proposal is archived with its
    /// signatures and the signature set starts over, so attestations only
    /// ever count toward the message currently on the table.
    pub fn propose_result(&mut self, winner_slot: Slot, final_score: &str) -> Result<()> {
        if self.is_settled() {
            return Err(SettleError::InvalidState(
                "Match is already settled".to_string(),
            ));
        }

        let final_score = final_score.trim();
        if final_score.is_empty() {
            return Err(SettleError::InvalidInput(
                "Final score cannot be empty".to_string(),
            ));
        }
        if !self.has_both_sides() {
            return Err(SettleError::RosterIncomplete);
        }
        if !self.participants.contains_key(&winner_slot) {
            return Err(SettleError::InvalidSlot(winner_slot.to_string()));
        }

        if let (Some(prev_winner), Some(prev_score), Some(prev_message)) = (
            self.proposed_winner_slot,
            self.final_score.clone(),
            self.result_message.clone(),
        ) {
            self.history.push(ArchivedRound {
                proposal_seq: self.proposal_seq,
                winner_slot: prev_winner,
                final_score: prev_score,
                message_digest: message_digest(&prev_message),
                result_message: prev_message,
                signatures: std::mem::take(&mut self.signatures),
                archived_at: Utc::now(),
            });
        }

        self.proposal_seq += 1;
        self.proposed_winner_slot = Some(winner_slot);
        self.final_score = Some(final_score.to_string());
        self.result_message = Some(result_message(winner_slot, final_score));
        self.signatures.clear();

        Ok(())
    }

    /// Records a participant's signature over the current result message.
    ///
    /// The signature is verified against the signer's registered address and
    /// stored either way; a failed verification is visible state, not a
    /// dropped write. A slot that already signed this proposal is a no-op,
    /// which keeps duplicate delivery from the push and poll channels
    /// harmless.
    pub fn record_signature(
        &mut self,
        signer_slot: Slot,
        signature_bytes: &[u8],
    ) -> Result<SignOutcome> {
        if self.is_settled() {
            return Err(SettleError::InvalidState(
                "Match is already settled".to_string(),
            ));
        }

        let message = self
            .result_message
            .as_ref()
            .ok_or(SettleError::NoProposalYet)?;
        let participant = self
            .participants
            .get(&signer_slot)
            .ok_or_else(|| SettleError::InvalidSlot(signer_slot.to_string()))?;

        if self.signatures.contains_key(&signer_slot) {
            return Ok(SignOutcome::AlreadySigned);
        }

        let is_valid = verify_signature(signature_bytes, message.as_bytes(), &participant.address);
        self.signatures.insert(
            signer_slot,
            SignatureEntry {
                signature_bytes: hex::encode(signature_bytes),
                is_valid,
                signed_at: Utc::now(),
            },
        );

        Ok(SignOutcome::Recorded { valid: is_valid })
    }

    /// True when every seated participant holds a valid signature over the
    /// current proposal. Partial or invalid signature sets never qualify.
    pub fn all_signed(&self) -> bool {
        self.result_message.is_some()
            && !self.participants.is_empty()
            && self.signatures.len() == self.participants.len()
            && self.signatures.values().all(|entry| entry.is_valid)
    }

    pub fn phase(&self) -> Phase {
        if self.settlement.is_some() {
            Phase::Settled
        } else if self.result_message.is_none() {
            Phase::Forming
        } else if self.signatures.is_empty() {
            Phase::ResultProposed
        } else {
            Phase::AwaitingSignatures
        }
    }

    pub fn is_settled(&self) -> bool {
        self.settlement.is_some()
    }

    /// The participant the current proposal names as winner.
    pub fn winner(&self) -> Result<&Participant> {
        let slot = self
            .proposed_winner_slot
            .ok_or(SettleError::NoProposalYet)?;
        self.participants
            .get(&slot)
            .ok_or(SettleError::WinnerUnresolved(slot))
    }

    /// Rebuilds the escrow account from the custody material in the record.
    pub fn escrow(&self) -> Result<EscrowAccount> {
        Ok(EscrowAccount::from_parts(
            &self.escrow_public_key,
            &self.escrow_secret,
        )?)
    }

    /// Marks the match settled. Only the first marking wins; later calls
    /// report `false` and leave the original settlement record in place.
    pub fn mark_settled(&mut self, receipt: TransferReceipt) -> bool {
        if self.settlement.is_some() {
            return false;
        }
        self.settlement = Some(SettlementRecord {
            receipt,
            settled_at: Utc::now(),
        });
        true
    }

    fn has_both_sides(&self) -> bool {
        let sides: Vec<Side> = self.participants.keys().map(|slot| slot.side()).collect();
        sides.contains(&Side::A) && sides.contains(&Side::B)
    }
}
