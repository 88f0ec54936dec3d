//! Balances and nonces.

use crate::error::{LedgerError, Result};
use crate::error::TxRejection;
use crate::journal::{LedgerEntry, SignedReward};
use crate::tx::{SignedTx, TxDraft, TxType};
use crate::validator::TxValidator;
use hegemon_core::Address;
use hegemon_wallet::Wallet;
use std::collections::{BTreeMap, BTreeSet};

/// Token balances and per-address nonces.
///
/// Never shared mutably: mutation requires `&mut self`, and the snapshot
/// accessors hand out copies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ledger {
    balances: BTreeMap<Address, u64>,
    nonces: BTreeMap<Address, u64>,
    /// Ids of rewards already credited
    rewards: BTreeSet<String>,
}

impl Ledger {
    /// Empty ledger: every balance and nonce is zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a ledger by replaying its journal in order.
    pub fn replay<'a>(entries: impl IntoIterator<Item = &'a LedgerEntry>) -> Result<Self> {
        let mut ledger = Self::new();
        for entry in entries {
            ledger.apply_entry(entry)?;
        }
        Ok(ledger)
    }

    /// Current balance of `address`; zero if never credited.
    pub fn balance(&self, address: &Address) -> u64 {
        self.balances.get(address).copied().unwrap_or(0)
    }

    /// Nonce the next transaction from `address` must carry.
    pub fn nonce(&self, address: &Address) -> u64 {
        self.nonces.get(address).copied().unwrap_or(0)
    }

    /// Copy of every non-default balance.
    pub fn balances(&self) -> BTreeMap<Address, u64> {
        self.balances.clone()
    }

    /// Sum of all balances.
    pub fn total_supply(&self) -> u128 {
        self.balances.values().map(|&b| u128::from(b)).sum()
    }

    /// Add `amount` to `address`.
    pub fn credit(&mut self, address: &Address, amount: u64) -> Result<()> {
        let balance = self.balance(address);
        let updated = balance
            .checked_add(amount)
            .ok_or_else(|| LedgerError::BalanceOverflow(address.clone()))?;
        self.balances.insert(address.clone(), updated);
        Ok(())
    }

    /// Remove `amount` from `address`; fails without change if the balance
    /// is smaller.
    pub fn debit(&mut self, address: &Address, amount: u64) -> Result<()> {
        let balance = self.balance(address);
        if balance < amount {
            return Err(LedgerError::InsufficientBalance {
                address: address.clone(),
                balance,
                requested: amount,
            });
        }
        self.balances.insert(address.clone(), balance - amount);
        Ok(())
    }

    /// Issue new tokens to `address`.
    pub fn mint(&mut self, address: &Address, amount: u64) -> Result<()> {
        self.credit(address, amount)?;
        tracing::debug!(%address, amount, "minted reward");
        Ok(())
    }

    /// Advance `address`'s nonce by one.
    pub fn increment_nonce(&mut self, address: &Address) {
        *self.nonces.entry(address.clone()).or_insert(0) += 1;
    }

    /// Debit `amount + fee` from `from`, credit `amount` to `to`, burn `fee`
    /// and bump `from`'s nonce. Either every step happens or none does.
    pub fn apply_transfer(&mut self, from: &Address, to: &Address, amount: u64, fee: u64) -> Result<()> {
        let balance = self.balance(from);
        let total = amount
            .checked_add(fee)
            .filter(|&total| total <= balance)
            .ok_or_else(|| LedgerError::InsufficientBalance {
                address: from.clone(),
                balance,
                requested: amount.saturating_add(fee),
            })?;

        // A self-transfer credits the already-debited balance.
        let receiver_after_debit = if from == to {
            balance - total
        } else {
            self.balance(to)
        };
        if receiver_after_debit.checked_add(amount).is_none() {
            return Err(LedgerError::BalanceOverflow(to.clone()));
        }

        self.debit(from, total)?;
        self.credit(to, amount)?;
        self.increment_nonce(from);
        Ok(())
    }

    /// Validate and apply a signed transaction as one step.
    pub fn admit(&mut self, signed: &SignedTx) -> Result<()> {
        TxValidator::validate(signed, self)?;
        let tx = &signed.tx;
        match tx.tx_type {
            TxType::Transfer | TxType::TradeSettlement => {
                self.apply_transfer(&tx.from, &tx.to, tx.amount, tx.fee)?;
            }
        }
        tracing::debug!(
            tx_id = %tx.id,
            from = %tx.from,
            to = %tx.to,
            amount = tx.amount,
            fee = tx.fee,
            "transaction admitted"
        );
        Ok(())
    }

    /// Verify and credit a signed reward. A reward is credited at most once.
    pub fn admit_reward(&mut self, signed: &SignedReward) -> Result<()> {
        let reward = &signed.reward;
        if !signed.verify() {
            return Err(TxRejection::InvalidSignature.into());
        }
        if reward.amount == 0 {
            return Err(TxRejection::NonPositiveAmount.into());
        }
        if self.rewards.contains(&reward.id) {
            return Err(LedgerError::DuplicateReward(reward.id.clone()));
        }
        self.mint(&reward.address, reward.amount)?;
        self.rewards.insert(reward.id.clone());
        Ok(())
    }

    /// Draft and sign a transfer from `wallet` at its current nonce.
    ///
    /// Nothing is applied; pass the result to [`Ledger::admit`].
    pub fn sign_transfer(
        &self,
        wallet: &Wallet,
        to: &Address,
        amount: u64,
        fee: u64,
        tick: u64,
    ) -> Result<SignedTx> {
        let from = wallet.address().clone();
        let nonce = self.nonce(&from);
        TxDraft::transfer(from, to.clone(), amount, fee, nonce, tick).sign(wallet)
    }

    /// Apply one journal entry.
    pub fn apply_entry(&mut self, entry: &LedgerEntry) -> Result<()> {
        match entry {
            LedgerEntry::Transfer { tx } => self.admit(tx),
            LedgerEntry::Mint { reward } => self.admit_reward(reward),
        }
    }
}
