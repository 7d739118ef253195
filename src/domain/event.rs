use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AccountId, Wei, wei_string};

pub type EventId = Uuid;

/// A state change published by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum LedgerEvent {
    /// `account` credited its own balance with `amount`.
    Deposit {
        account: AccountId,
        #[serde(with = "wei_string")]
        amount: Wei,
    },
    /// `from` paid `amount` into the balance of `to`.
    Transfer {
        from: AccountId,
        to: AccountId,
        #[serde(with = "wei_string")]
        amount: Wei,
    },
    /// `account` took `amount` out of its balance.
    Withdraw {
        account: AccountId,
        #[serde(with = "wei_string")]
        amount: Wei,
    },
}

impl LedgerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            LedgerEvent::Deposit { .. } => EventKind::Deposit,
            LedgerEvent::Transfer { .. } => EventKind::Transfer,
            LedgerEvent::Withdraw { .. } => EventKind::Withdraw,
        }
    }

    pub fn amount(&self) -> Wei {
        match self {
            LedgerEvent::Deposit { amount, .. }
            | LedgerEvent::Transfer { amount, .. }
            | LedgerEvent::Withdraw { amount, .. } => *amount,
        }
    }

    /// The party that invoked the operation.
    pub fn caller(&self) -> AccountId {
        match self {
            LedgerEvent::Deposit { account, .. } | LedgerEvent::Withdraw { account, .. } => {
                *account
            }
            LedgerEvent::Transfer { from, .. } => *from,
        }
    }

    /// The other party, for transfers.
    pub fn counterparty(&self) -> Option<AccountId> {
        match self {
            LedgerEvent::Transfer { to, .. } => Some(*to),
            _ => None,
        }
    }

    /// The account whose balance this event changes.
    pub fn affected_account(&self) -> AccountId {
        match self {
            LedgerEvent::Deposit { account, .. } | LedgerEvent::Withdraw { account, .. } => {
                *account
            }
            LedgerEvent::Transfer { to, .. } => *to,
        }
    }

    /// Returns true if `account` is the caller or counterparty.
    pub fn involves(&self, account: AccountId) -> bool {
        self.caller() == account || self.counterparty() == Some(account)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Deposit,
    Transfer,
    Withdraw,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Deposit => "deposit",
            EventKind::Transfer => "transfer",
            EventKind::Withdraw => "withdraw",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "deposit" => Some(EventKind::Deposit),
            "transfer" => Some(EventKind::Transfer),
            "withdraw" => Some(EventKind::Withdraw),
            _ => None,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A committed event as stored in the journal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: EventId,
    /// Monotonically increasing position in the journal, assigned by storage
    pub sequence: i64,
    #[serde(flatten)]
    pub event: LedgerEvent,
    pub recorded_at: DateTime<Utc>,
}

impl EventRecord {
    /// Wrap an event for persistence. Sequence number must be assigned by the repository.
    pub fn new(event: LedgerEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            sequence: 0,
            event,
            recorded_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(byte: u8) -> AccountId {
        AccountId::new([byte; 20])
    }

    #[test]
    fn test_transfer_parties() {
        let event = LedgerEvent::Transfer {
            from: account(1),
            to: account(2),
            amount: 50,
        };

        assert_eq!(event.kind(), EventKind::Transfer);
        assert_eq!(event.caller(), account(1));
        assert_eq!(event.counterparty(), Some(account(2)));
        assert_eq!(event.affected_account(), account(2));
        assert!(event.involves(account(1)));
        assert!(event.involves(account(2)));
        assert!(!event.involves(account(3)));
    }

    #[test]
    fn test_deposit_affects_caller() {
        let event = LedgerEvent::Deposit {
            account: account(7),
            amount: 10,
        };
        assert_eq!(event.affected_account(), account(7));
        assert_eq!(event.counterparty(), None);
        assert_eq!(event.amount(), 10);
    }

    #[test]
    fn test_event_kind_roundtrip() {
        for kind in [EventKind::Deposit, EventKind::Transfer, EventKind::Withdraw] {
            assert_eq!(EventKind::from_str(kind.as_str()), Some(kind));
        }
        assert_eq!(EventKind::from_str("mint"), None);
    }

    #[test]
    fn test_record_json_shape() {
        let record = EventRecord::new(LedgerEvent::Withdraw {
            account: account(9),
            amount: 5,
        });
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["kind"], "withdraw");
        assert_eq!(value["amount"], "5");
        assert_eq!(value["sequence"], 0);

        let back: EventRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back.event, record.event);
    }
}
