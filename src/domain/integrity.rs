use std::collections::{BTreeSet, HashMap};

use serde::Serialize;

use super::{AccountId, EventRecord, Ledger, LedgerEvent, Wei, format_ether};

/// A stored balance that disagrees with the journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceMismatch {
    pub account: AccountId,
    pub stored: Wei,
    pub replayed: Wei,
}

/// Result of comparing the balance table with the event journal.
#[derive(Debug, Clone, Serialize)]
pub struct IntegrityReport {
    pub account_count: usize,
    pub event_count: usize,
    /// Sum of the stored balances
    pub stored_total: Wei,
    /// Deposits plus transfers in, minus withdrawals
    pub net_inflow: Wei,
    pub is_balanced: bool,
    pub mismatches: Vec<BalanceMismatch>,
    pub issues: Vec<String>,
}

impl IntegrityReport {
    pub fn is_healthy(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Check the stored balances against the journal: every account must match
/// a replay of the events, and the total must equal the net value that
/// entered the ledger.
pub fn build_integrity_report(
    stored: &HashMap<AccountId, Wei>,
    events: &[EventRecord],
    has_sequence_gaps: bool,
) -> IntegrityReport {
    let mut issues = Vec::new();

    if has_sequence_gaps {
        issues.push("Event journal has gaps in its sequence numbers".to_string());
    }

    let mut replayed = Ledger::new();
    for record in events {
        if let Err(e) = replayed.apply(&record.event) {
            issues.push(format!(
                "Event #{} ({}) cannot be applied: {}",
                record.sequence,
                record.event.kind(),
                e
            ));
        }
    }

    let accounts: BTreeSet<AccountId> = stored
        .keys()
        .copied()
        .chain(replayed.accounts().map(|(account, _)| account))
        .collect();

    let mut mismatches = Vec::new();
    for account in &accounts {
        let stored_balance = stored.get(account).copied().unwrap_or(0);
        let replayed_balance = replayed.balance_of(*account);
        if stored_balance != replayed_balance {
            issues.push(format!(
                "Balance of {} is {} but the journal gives {}",
                account,
                format_ether(stored_balance),
                format_ether(replayed_balance)
            ));
            mismatches.push(BalanceMismatch {
                account: *account,
                stored: stored_balance,
                replayed: replayed_balance,
            });
        }
    }

    let stored_total = stored
        .values()
        .try_fold(0, |total: Wei, balance| total.checked_add(*balance));
    let net_inflow = net_inflow(events);

    if stored_total.is_none() {
        issues.push("Sum of stored balances overflows".to_string());
    }
    if net_inflow.is_none() {
        issues.push("Journal withdraws more value than it takes in".to_string());
    }

    let is_balanced = matches!((stored_total, net_inflow), (Some(a), Some(b)) if a == b);
    if !is_balanced && stored_total.is_some() && net_inflow.is_some() {
        issues.push("Stored balances do not add up to the net value deposited".to_string());
    }

    IntegrityReport {
        account_count: stored.len(),
        event_count: events.len(),
        stored_total: stored_total.unwrap_or(Wei::MAX),
        net_inflow: net_inflow.unwrap_or(0),
        is_balanced,
        mismatches,
        issues,
    }
}

/// Value credited by deposits and transfers minus value withdrawn, or None
/// if more leaves than entered.
fn net_inflow(events: &[EventRecord]) -> Option<Wei> {
    let mut inflow: Wei = 0;
    let mut outflow: Wei = 0;
    for record in events {
        match record.event {
            LedgerEvent::Deposit { amount, .. } | LedgerEvent::Transfer { amount, .. } => {
                inflow = inflow.saturating_add(amount);
            }
            LedgerEvent::Withdraw { amount, .. } => outflow = outflow.saturating_add(amount),
        }
    }
    inflow.checked_sub(outflow)
}
