//! Persisted ledger journal and reward issuance.

use crate::error::Result;
use crate::tx::SignedTx;
use crate::validator::signer_owns;
use hegemon_core::{sha256_hex, Address};
use hegemon_wallet::Wallet;
use serde::{Deserialize, Serialize};

/// One state change, in the order it was applied.
///
/// Replaying the journal from an empty ledger reproduces the live ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LedgerEntry {
    /// An admitted transfer.
    Transfer {
        /// The transaction as it was admitted
        tx: SignedTx,
    },
    /// Tokens issued from nothing.
    Mint {
        /// The signed issuance record
        reward: SignedReward,
    },
}

/// Newly issued tokens credited to the player who earned them.
///
/// Gossiped like a transaction so every peer's ledger credits the same
/// rewards; `id` makes replaying one twice detectable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reward {
    /// Hash of every other field
    pub id: String,
    /// Credited player
    pub address: Address,
    /// Tokens issued
    pub amount: u64,
    /// Simulation tick that earned the reward
    pub tick: u64,
    /// Milliseconds since the Unix epoch
    pub timestamp: u64,
    /// What earned it, such as a harvest or a battle
    pub reason: String,
}

impl Reward {
    /// Reward for `address`, stamped with the current wall clock.
    pub fn new(address: Address, amount: u64, tick: u64, reason: impl Into<String>) -> Result<Self> {
        let mut reward = Self {
            id: String::new(),
            address,
            amount,
            tick,
            timestamp: hegemon_core::now_millis(),
            reason: reason.into(),
        };
        reward.id = reward.expected_id()?;
        Ok(reward)
    }

    /// Hash over every field except `id`, in declaration order.
    pub fn expected_id(&self) -> Result<String> {
        let fields = (&self.address, self.amount, self.tick, self.timestamp, &self.reason);
        Ok(sha256_hex(&serde_json::to_vec(&fields)?))
    }

    /// Sign with the credited player's wallet.
    pub fn sign(self, wallet: &Wallet) -> Result<SignedReward> {
        let signature = wallet.sign(&serde_json::to_vec(&self)?);
        Ok(SignedReward {
            reward: self,
            signature,
            public_key: wallet.public_key_hex(),
        })
    }
}

/// A [`Reward`] with the credited player's signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedReward {
    /// The issuance being authorized
    pub reward: Reward,
    /// Ed25519 over the serialized reward, hex
    pub signature: String,
    /// Credited player's verifying key, hex
    pub public_key: String,
}

impl SignedReward {
    /// True when the id recomputes, the signature covers the whole reward
    /// and the signing key belongs to the credited address.
    pub fn verify(&self) -> bool {
        let reward = &self.reward;
        let id_ok = reward.expected_id().is_ok_and(|id| id == reward.id);
        let signature_ok = serde_json::to_vec(reward).is_ok_and(|bytes| {
            hegemon_wallet::verify(&bytes, &self.signature, &self.public_key)
        });
        id_ok && signature_ok && signer_owns(&self.public_key, &reward.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_reward_verifies_until_touched() {
        let wallet = Wallet::generate();
        let signed = Reward::new(wallet.address().clone(), 40, 3, "harvest")
            .unwrap()
            .sign(&wallet)
            .unwrap();
        assert!(signed.verify());

        let mut inflated = signed.clone();
        inflated.reward.amount = 4_000;
        assert!(!inflated.verify());

        // Signing a reward credited to someone else does not count.
        let other = Wallet::generate();
        let foreign = Reward::new(other.address().clone(), 40, 3, "harvest")
            .unwrap()
            .sign(&wallet)
            .unwrap();
        assert!(!foreign.verify());
    }
}
