use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use log::info;
use thiserror::Error;

use crate::domain::{AccountId, Wei, format_ether};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PaymentError {
    #[error("payment rejected: {0}")]
    Rejected(String),

    #[error("payment channel unavailable: {0}")]
    Unavailable(String),
}

/// The host's mechanism for sending value to an account.
///
/// Implementations may run arbitrary code, including calls back into the
/// ledger; the ledger applies its own state change before calling `pay`.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn pay(&self, to: AccountId, amount: Wei) -> Result<(), PaymentError>;
}

/// Gateway that only logs payouts. Used when no real value moves, e.g. from the CLI.
#[derive(Debug, Default)]
pub struct LogGateway;

#[async_trait]
impl PaymentGateway for LogGateway {
    async fn pay(&self, to: AccountId, amount: Wei) -> Result<(), PaymentError> {
        info!("payout of {} ether to {}", format_ether(amount), to);
        Ok(())
    }
}

/// Gateway that keeps a running total of what each account has been paid.
#[derive(Debug, Default)]
pub struct MemoryGateway {
    paid: Mutex<HashMap<AccountId, Wei>>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total value paid out to `account` so far.
    pub fn paid_to(&self, account: AccountId) -> Wei {
        self.paid
            .lock()
            .map(|paid| paid.get(&account).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Total value paid out to everyone.
    pub fn total_paid(&self) -> Wei {
        self.paid
            .lock()
            .map(|paid| paid.values().sum())
            .unwrap_or(0)
    }
}

#[async_trait]
impl PaymentGateway for MemoryGateway {
    async fn pay(&self, to: AccountId, amount: Wei) -> Result<(), PaymentError> {
        let mut paid = self
            .paid
            .lock()
            .map_err(|_| PaymentError::Unavailable("payout record poisoned".to_string()))?;
        let entry = paid.entry(to).or_insert(0);
        *entry = entry
            .checked_add(amount)
            .ok_or_else(|| PaymentError::Rejected("payout total overflow".to_string()))?;
        Ok(())
    }
}
