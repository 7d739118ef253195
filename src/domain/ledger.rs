use std::collections::HashMap;

use super::{AccountId, LedgerEvent, Wei};

/// Add `amount` to `balance`, failing instead of wrapping.
pub fn credit(account: AccountId, balance: Wei, amount: Wei) -> Result<Wei, LedgerError> {
    balance
        .checked_add(amount)
        .ok_or(LedgerError::BalanceOverflow { account })
}

/// Take `amount` out of `balance`. Balances never go below zero.
pub fn debit(account: AccountId, balance: Wei, amount: Wei) -> Result<Wei, LedgerError> {
    balance
        .checked_sub(amount)
        .ok_or(LedgerError::InsufficientBalance {
            account,
            balance,
            requested: amount,
        })
}

/// Preconditions of a transfer: the attached amount is positive and the
/// recipient is not the null account. Amount is checked first.
pub fn validate_transfer(recipient: AccountId, amount: Wei) -> Result<(), LedgerError> {
    if amount == 0 {
        return Err(LedgerError::InvalidAmount);
    }
    if recipient.is_zero() {
        return Err(LedgerError::InvalidRecipient);
    }
    Ok(())
}

/// Balance of the account an event touches, after the event.
///
/// This is the single place the rules of each operation live: the in-memory
/// ledger, journal replay and the service all go through it.
pub fn apply_to_balance(event: &LedgerEvent, balance: Wei) -> Result<Wei, LedgerError> {
    match *event {
        LedgerEvent::Deposit { account, amount } => credit(account, balance, amount),
        LedgerEvent::Transfer { to, amount, .. } => {
            validate_transfer(to, amount)?;
            credit(to, balance, amount)
        }
        LedgerEvent::Withdraw { account, amount } => debit(account, balance, amount),
    }
}

/// In-memory balance ledger.
///
/// `apply` either changes one balance completely or returns an error and
/// leaves the ledger untouched. Unknown accounts read as zero.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ledger {
    balances: HashMap<AccountId, Wei>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a ledger by applying events in order from an empty state.
    pub fn replay<'a, I>(events: I) -> Result<Self, LedgerError>
    where
        I: IntoIterator<Item = &'a LedgerEvent>,
    {
        let mut ledger = Self::new();
        for event in events {
            ledger.apply(event)?;
        }
        Ok(ledger)
    }

    pub fn balance_of(&self, account: AccountId) -> Wei {
        self.balances.get(&account).copied().unwrap_or(0)
    }

    /// Apply a single event, validating it against the current state.
    pub fn apply(&mut self, event: &LedgerEvent) -> Result<(), LedgerError> {
        let account = event.affected_account();
        let balance = apply_to_balance(event, self.balance_of(account))?;
        self.balances.insert(account, balance);
        Ok(())
    }

    /// Sum of all balances, or None if it does not fit in a u128.
    pub fn total_balance(&self) -> Option<Wei> {
        self.balances
            .values()
            .try_fold(0, |total: Wei, balance| total.checked_add(*balance))
    }

    /// Accounts that have ever been touched, with their balances.
    pub fn accounts(&self) -> impl Iterator<Item = (AccountId, Wei)> + '_ {
        self.balances.iter().map(|(account, balance)| (*account, *balance))
    }

    pub fn into_balances(self) -> HashMap<AccountId, Wei> {
        self.balances
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    InvalidAmount,
    InvalidRecipient,
    InsufficientBalance {
        account: AccountId,
        balance: Wei,
        requested: Wei,
    },
    BalanceOverflow {
        account: AccountId,
    },
}

impl std::fmt::Display for LedgerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LedgerError::InvalidAmount => write!(f, "Amount must be greater than zero"),
            LedgerError::InvalidRecipient => write!(f, "Invalid recipient address"),
            LedgerError::InsufficientBalance {
                account,
                balance,
                requested,
            } => write!(
                f,
                "Insufficient balance for {}: balance {} wei, requested {} wei",
                account, balance, requested
            ),
            LedgerError::BalanceOverflow { account } => {
                write!(f, "Balance of {} would overflow", account)
            }
        }
    }
}

impl std::error::Error for LedgerError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::WEI_PER_ETHER;

    fn account(byte: u8) -> AccountId {
        AccountId::new([byte; 20])
    }

    fn deposit(account: AccountId, amount: Wei) -> LedgerEvent {
        LedgerEvent::Deposit { account, amount }
    }

    fn transfer(from: AccountId, to: AccountId, amount: Wei) -> LedgerEvent {
        LedgerEvent::Transfer { from, to, amount }
    }

    fn withdraw(account: AccountId, amount: Wei) -> LedgerEvent {
        LedgerEvent::Withdraw { account, amount }
    }

    #[test]
    fn test_unknown_account_reads_zero() {
        let ledger = Ledger::new();
        assert_eq!(ledger.balance_of(account(1)), 0);
        assert_eq!(ledger.total_balance(), Some(0));
    }

    #[test]
    fn test_deposits_accumulate() {
        let mut ledger = Ledger::new();
        let alice = account(1);

        for amount in [100, 250, 0, 1] {
            ledger.apply(&deposit(alice, amount)).unwrap();
        }

        assert_eq!(ledger.balance_of(alice), 351);
    }

    #[test]
    fn test_transfer_credits_recipient_only() {
        let mut ledger = Ledger::new();
        let (alice, bob) = (account(1), account(2));

        ledger.apply(&deposit(alice, WEI_PER_ETHER)).unwrap();
        ledger
            .apply(&transfer(alice, bob, WEI_PER_ETHER / 2))
            .unwrap();

        assert_eq!(ledger.balance_of(bob), WEI_PER_ETHER / 2);
        assert_eq!(ledger.balance_of(alice), WEI_PER_ETHER);
    }

    #[test]
    fn test_transfer_does_not_need_sender_balance() {
        assert_eq!(apply_to_balance(&transfer(account(1), account(2), 10), 0), Ok(10));
    }

    #[test]
    fn test_transfer_rejects_zero_amount() {
        let mut ledger = Ledger::new();
        ledger.apply(&deposit(account(1), 10)).unwrap();
        let before = ledger.clone();

        let result = ledger.apply(&transfer(account(1), account(2), 0));

        assert_eq!(result, Err(LedgerError::InvalidAmount));
        assert_eq!(ledger, before);
    }

    #[test]
    fn test_transfer_rejects_zero_recipient() {
        let mut ledger = Ledger::new();
        let before = ledger.clone();

        let result = ledger.apply(&transfer(account(1), AccountId::ZERO, 10));

        assert_eq!(result, Err(LedgerError::InvalidRecipient));
        assert_eq!(ledger, before);
    }

    #[test]
    fn test_zero_amount_checked_before_recipient() {
        assert_eq!(
            validate_transfer(AccountId::ZERO, 0),
            Err(LedgerError::InvalidAmount)
        );
        assert_eq!(
            apply_to_balance(&transfer(account(1), AccountId::ZERO, 0), 0),
            Err(LedgerError::InvalidAmount)
        );
    }

    #[test]
    fn test_withdraw_debits_balance() {
        assert_eq!(apply_to_balance(&withdraw(account(1), 100), 100), Ok(0));
    }

    #[test]
    fn test_withdraw_insufficient_balance() {
        let mut ledger = Ledger::new();
        ledger.apply(&deposit(account(1), 50)).unwrap();

        let result = ledger.apply(&withdraw(account(1), 51));

        assert_eq!(
            result,
            Err(LedgerError::InsufficientBalance {
                account: account(1),
                balance: 50,
                requested: 51,
            })
        );
        assert_eq!(ledger.balance_of(account(1)), 50);
    }

    #[test]
    fn test_credit_overflow_is_rejected() {
        let mut ledger = Ledger::new();
        ledger.apply(&deposit(account(1), Wei::MAX)).unwrap();

        let result = ledger.apply(&deposit(account(1), 1));

        assert_eq!(
            result,
            Err(LedgerError::BalanceOverflow {
                account: account(1)
            })
        );
        assert_eq!(ledger.balance_of(account(1)), Wei::MAX);
    }

    #[test]
    fn test_replay_applies_events_in_order() {
        let events = vec![
            deposit(account(1), 1000),
            transfer(account(1), account(2), 300),
            withdraw(account(2), 100),
            withdraw(account(1), 1000),
        ];

        let replayed = Ledger::replay(&events).unwrap();

        assert_eq!(replayed.balance_of(account(1)), 0);
        assert_eq!(replayed.balance_of(account(2)), 200);
        assert_eq!(replayed.total_balance(), Some(200));
        assert_eq!(replayed.accounts().count(), 2);
    }

    #[test]
    fn test_replay_stops_on_invalid_event() {
        let events = vec![withdraw(account(1), 1)];

        assert!(matches!(
            Ledger::replay(&events),
            Err(LedgerError::InsufficientBalance { .. })
        ));
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            LedgerError::InvalidAmount.to_string(),
            "Amount must be greater than zero"
        );
        assert_eq!(
            LedgerError::InvalidRecipient.to_string(),
            "Invalid recipient address"
        );
        assert!(
            LedgerError::InsufficientBalance {
                account: account(1),
                balance: 0,
                requested: 1
            }
            .to_string()
            .starts_with("Insufficient balance")
        );
    }
}
