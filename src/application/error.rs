use thiserror::Error;

use crate::domain::{AccountId, LedgerError, Wei};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Amount must be greater than zero")]
    InvalidAmount,

    #[error("Invalid recipient address")]
    InvalidRecipient,

    #[error("Insufficient balance for {account}: balance {balance} wei, requested {requested} wei")]
    InsufficientBalance {
        account: AccountId,
        balance: Wei,
        requested: Wei,
    },

    #[error("Balance of {0} would overflow")]
    BalanceOverflow(AccountId),

    #[error("Sum of all balances does not fit in 128 bits")]
    TotalOverflow,

    #[error("Payment to {to} failed: {reason}")]
    PaymentFailed { to: AccountId, reason: String },

    #[error("Ledger call rejected: already inside a payout")]
    ReentrantCall,

    #[error("Database error: {0}")]
    Database(#[from] anyhow::Error),
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InvalidAmount => AppError::InvalidAmount,
            LedgerError::InvalidRecipient => AppError::InvalidRecipient,
            LedgerError::InsufficientBalance {
                account,
                balance,
                requested,
            } => AppError::InsufficientBalance {
                account,
                balance,
                requested,
            },
            LedgerError::BalanceOverflow { account } => AppError::BalanceOverflow(account),
        }
    }
}
