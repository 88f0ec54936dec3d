//! Transactions and their signed envelope.

use crate::error::Result;
use hegemon_core::{sha256_hex, Address};
use hegemon_wallet::Wallet;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What a transaction is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxType {
    /// Plain token transfer between two players.
    Transfer,
    /// Payment settling an accepted trade offer.
    TradeSettlement,
}

/// Every transaction field except `id`, in the order hashed to produce it.
///
/// The field order here is the canonical encoding: do not reorder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxDraft {
    /// Serialized as `type`
    #[serde(rename = "type")]
    pub tx_type: TxType,
    /// Sender; must match the signing key
    pub from: Address,
    /// Recipient
    pub to: Address,
    /// Tokens moved; must be positive
    pub amount: u64,
    /// Burned on top of `amount`
    pub fee: u64,
    /// Sender's count of previously admitted transactions
    pub nonce: u64,
    /// Simulation tick at issue
    pub tick: u64,
    /// Milliseconds since the Unix epoch
    pub timestamp: u64,
    /// Free-form payload, such as a trade offer id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl TxDraft {
    /// Draft a transfer stamped with the current wall clock.
    pub fn transfer(from: Address, to: Address, amount: u64, fee: u64, nonce: u64, tick: u64) -> Self {
        Self {
            tx_type: TxType::Transfer,
            from,
            to,
            amount,
            fee,
            nonce,
            tick,
            timestamp: hegemon_core::now_millis(),
            data: None,
        }
    }

    /// Override the transaction type.
    pub fn with_type(mut self, tx_type: TxType) -> Self {
        self.tx_type = tx_type;
        self
    }

    /// Attach a payload.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Hash of this draft's fixed-order encoding.
    pub fn id(&self) -> Result<String> {
        Ok(sha256_hex(&serde_json::to_vec(self)?))
    }

    /// Assign the id, producing an unsigned transaction.
    pub fn finalize(self) -> Result<Tx> {
        let id = self.id()?;
        Ok(Tx {
            id,
            tx_type: self.tx_type,
            from: self.from,
            to: self.to,
            amount: self.amount,
            fee: self.fee,
            nonce: self.nonce,
            tick: self.tick,
            timestamp: self.timestamp,
            data: self.data,
        })
    }

    /// Finalize and sign with `wallet`.
    pub fn sign(self, wallet: &Wallet) -> Result<SignedTx> {
        SignedTx::sign(self.finalize()?, wallet)
    }
}

/// A transaction with its content id assigned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tx {
    /// Hash of the [`TxDraft`] fields
    pub id: String,
    /// Serialized as `type`
    #[serde(rename = "type")]
    pub tx_type: TxType,
    /// Sender
    pub from: Address,
    /// Recipient
    pub to: Address,
    /// Tokens moved
    pub amount: u64,
    /// Tokens burned
    pub fee: u64,
    /// Sender-side sequence number
    pub nonce: u64,
    /// Simulation tick at issue
    pub tick: u64,
    /// Wall clock at issue, in milliseconds
    pub timestamp: u64,
    /// Optional payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Tx {
    /// Bytes covered by the signature: the full serialized transaction,
    /// including its `id`.
    pub fn signing_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Recompute the id from the other fields.
    pub fn expected_id(&self) -> Result<String> {
        TxDraft {
            tx_type: self.tx_type,
            from: self.from.clone(),
            to: self.to.clone(),
            amount: self.amount,
            fee: self.fee,
            nonce: self.nonce,
            tick: self.tick,
            timestamp: self.timestamp,
            data: self.data.clone(),
        }
        .id()
    }
}

/// The unit gossiped between peers and stored in the journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedTx {
    /// The transaction being authorized
    pub tx: Tx,
    /// Ed25519 over [`Tx::signing_bytes`], hex
    pub signature: String,
    /// Sender's verifying key, hex
    pub public_key: String,
}

impl SignedTx {
    /// Sign `tx` with the sender's wallet.
    pub fn sign(tx: Tx, wallet: &Wallet) -> Result<Self> {
        let signature = wallet.sign(&tx.signing_bytes()?);
        Ok(Self {
            tx,
            signature,
            public_key: wallet.public_key_hex(),
        })
    }

    /// Shorthand for `tx.id`.
    pub fn id(&self) -> &str {
        &self.tx.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(from: &Wallet, to: &Wallet) -> TxDraft {
        TxDraft {
            tx_type: TxType::Transfer,
            from: from.address().clone(),
            to: to.address().clone(),
            amount: 10,
            fee: 1,
            nonce: 0,
            tick: 42,
            timestamp: 1_700_000_000_000,
            data: None,
        }
    }

    #[test]
    fn id_is_deterministic_for_identical_fields() {
        let (a, b) = (Wallet::generate(), Wallet::generate());
        let first = draft(&a, &b).finalize().unwrap();
        let second = draft(&a, &b).finalize().unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.expected_id().unwrap(), first.id);
    }

    #[test]
    fn id_changes_with_any_field() {
        let (a, b) = (Wallet::generate(), Wallet::generate());
        let base = draft(&a, &b).finalize().unwrap().id;
        let mut bumped = draft(&a, &b);
        bumped.nonce = 1;
        assert_ne!(bumped.finalize().unwrap().id, base);
        let with_data = draft(&a, &b).with_data(serde_json::json!({"offer": "o-1"}));
        assert_ne!(with_data.finalize().unwrap().id, base);
        let settlement = draft(&a, &b).with_type(TxType::TradeSettlement);
        assert_ne!(settlement.finalize().unwrap().id, base);
    }

    #[test]
    fn signature_covers_the_id() {
        let (a, b) = (Wallet::generate(), Wallet::generate());
        let signed = draft(&a, &b).sign(&a).unwrap();
        assert!(hegemon_wallet::verify(
            &signed.tx.signing_bytes().unwrap(),
            &signed.signature,
            &signed.public_key
        ));

        let mut renamed = signed.tx.clone();
        renamed.id = "0".repeat(64);
        assert!(!hegemon_wallet::verify(
            &renamed.signing_bytes().unwrap(),
            &signed.signature,
            &signed.public_key
        ));
    }
}
