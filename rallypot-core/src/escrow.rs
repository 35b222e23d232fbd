use crate::error::{CoreError, Result};
use crate::identity::KeyMaterial;
use crate::ledger::{build_transfer, Ledger};
use crate::types::{Address, Amount, TransferReceipt};

/// Key pair controlling a match's escrow account.
///
/// The secret travels inside the match record, so every participant and any
/// settlement process can release the pot once a result is signed off. The
/// escrow is cooperative rather than trustless; that trade-off is what keeps
/// payout possible from whichever process observes completion first.
pub struct EscrowAccount {
    keys: KeyMaterial,
}

impl EscrowAccount {
    /// Generates a fresh escrow account with its own key pair.
    pub fn generate() -> Self {
        Self {
            keys: KeyMaterial::generate(),
        }
    }

    /// Rebuilds an escrow account from its advertised address and stored
    /// secret. Material that does not reproduce the address is rejected, so
    /// a corrupted or swapped secret cannot silently sign for the wrong
    /// account.
    pub fn from_parts(address: &Address, secret_hex: &str) -> Result<Self> {
        let keys = KeyMaterial::from_hex(secret_hex)?;
        if keys.address() != *address {
            return Err(CoreError::crypto(
                "Escrow secret does not match the advertised escrow key",
            ));
        }
        Ok(Self { keys })
    }

    pub fn address(&self) -> Address {
        self.keys.address()
    }

    pub fn secret_hex(&self) -> String {
        self.keys.to_hex()
    }

    /// Pays `amount` from escrow to `to` through the ledger.
    pub async fn transfer(
        &self,
        ledger: &dyn Ledger,
        to: Address,
        amount: Amount,
    ) -> Result<TransferReceipt> {
        let transfer = build_transfer(&self.keys, to, amount);
        ledger.submit_transfer(&transfer).await
    }
}

impl std::fmt::Debug for EscrowAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EscrowAccount")
            .field("address", &self.address().short())
            .finish()
    }
}
