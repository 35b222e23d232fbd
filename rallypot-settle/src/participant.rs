use crate::error::{Result, SettleError};
use crate::slot::Slot;
use chrono::{DateTime, Utc};
use rallypot_core::Address;
use serde::{Deserialize, Serialize};

/// A player seated in a match. Immutable once registered; the slot is never
/// reassigned for the life of the match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub slot: Slot,
    pub address: Address,
    pub display_name: String,
    #[serde(default)]
    pub joined_at: DateTime<Utc>,
}

impl Participant {
    pub fn new(slot: Slot, address: Address, display_name: &str) -> Result<Self> {
        let display_name = display_name.trim();
        if display_name.is_empty() {
            return Err(SettleError::InvalidInput(
                "Display name cannot be empty".to_string(),
            ));
        }

        Ok(Self {
            slot,
            address,
            display_name: display_name.to_string(),
            joined_at: Utc::now(),
        })
    }
}
