use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::sync::{Mutex, broadcast};

use crate::domain::{
    AccountId, EventKind, EventRecord, IntegrityReport, LedgerEvent, Wei, apply_to_balance,
    build_integrity_report, credit, format_ether, wei_string,
};
use crate::storage::Repository;

use super::{AppError, LogGateway, PaymentGateway};

/// Number of committed events a slow subscriber may lag behind before it
/// starts missing them.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// How long a withdrawal waits for the gateway before giving up on it.
pub const DEFAULT_PAYOUT_TIMEOUT: Duration = Duration::from_secs(30);

tokio::task_local! {
    /// Set while a withdrawal is paying out on the current task.
    static IN_PAYOUT: ();
}

/// Application service owning the balance ledger.
/// This is the primary interface for any client (CLI, API, TUI, etc.).
///
/// Mutating calls are serialized: each one runs to completion under a single
/// write lock, and its balance change and journal entry commit together or
/// not at all. Reads go straight to committed storage.
pub struct LedgerService {
    repo: Repository,
    gateway: Arc<dyn PaymentGateway>,
    payout_timeout: Duration,
    write_lock: Mutex<()>,
    events: broadcast::Sender<EventRecord>,
}

/// Balance entry for an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceEntry {
    pub account: AccountId,
    #[serde(with = "wei_string")]
    pub balance: Wei,
}

/// Filter for querying the event journal
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub account: Option<AccountId>,
    pub kind: Option<EventKind>,
    pub limit: Option<usize>,
}

impl LedgerService {
    /// Create a new ledger service with the given repository.
    /// Payouts go to a `LogGateway` until `with_gateway` replaces it.
    pub fn new(repo: Repository) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            repo,
            gateway: Arc::new(LogGateway),
            payout_timeout: DEFAULT_PAYOUT_TIMEOUT,
            write_lock: Mutex::new(()),
            events,
        }
    }

    /// Replace the payment gateway used by withdrawals.
    pub fn with_gateway(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.gateway = gateway;
        self
    }

    /// Bound how long a withdrawal waits on the gateway. A payout that takes
    /// longer is treated as failed.
    pub fn with_payout_timeout(mut self, timeout: Duration) -> Self {
        self.payout_timeout = timeout;
        self
    }

    /// Initialize a new database at the given path.
    pub async fn init(database_path: &str) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}?mode=rwc", database_path);
        let repo = Repository::init(&db_url).await?;
        Ok(Self::new(repo))
    }

    /// Connect to an existing database.
    pub async fn connect(database_path: &str) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}", database_path);
        let repo = Repository::connect(&db_url).await?;
        Ok(Self::new(repo))
    }

    /// Receive every event committed from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<EventRecord> {
        self.events.subscribe()
    }

    // ========================
    // Ledger operations
    // ========================

    /// Credit `caller` with the value attached to the call. Zero is allowed.
    pub async fn deposit(&self, caller: AccountId, amount: Wei) -> Result<EventRecord, AppError> {
        ensure_not_in_payout()?;
        let _guard = self.write_lock.lock().await;

        let record = self
            .commit_event(LedgerEvent::Deposit {
                account: caller,
                amount,
            })
            .await?;

        info!("deposit: {} ether to {}", format_ether(amount), caller);
        self.publish(record.clone());
        Ok(record)
    }

    /// Credit `recipient` with the value `caller` attached to the call.
    /// The caller's own balance is not debited.
    pub async fn transfer(
        &self,
        caller: AccountId,
        recipient: AccountId,
        amount: Wei,
    ) -> Result<EventRecord, AppError> {
        ensure_not_in_payout()?;
        let _guard = self.write_lock.lock().await;

        let record = self
            .commit_event(LedgerEvent::Transfer {
                from: caller,
                to: recipient,
                amount,
            })
            .await?;

        info!(
            "transfer: {} ether from {} to {}",
            format_ether(amount),
            caller,
            recipient
        );
        self.publish(record.clone());
        Ok(record)
    }

    /// Debit `caller` and pay the amount out through the gateway.
    ///
    /// The debit and its journal entry are committed before the gateway runs,
    /// so anything the payout triggers already reads the reduced balance. If
    /// the payment fails or does not finish within the payout timeout, the
    /// debit and the entry are reverted and nothing is published.
    pub async fn withdraw(&self, caller: AccountId, amount: Wei) -> Result<EventRecord, AppError> {
        ensure_not_in_payout()?;
        let _guard = self.write_lock.lock().await;

        let record = self
            .commit_event(LedgerEvent::Withdraw {
                account: caller,
                amount,
            })
            .await?;

        let payout = IN_PAYOUT
            .scope(
                (),
                tokio::time::timeout(self.payout_timeout, self.gateway.pay(caller, amount)),
            )
            .await;
        let reason = match payout {
            Ok(Ok(())) => {
                info!("withdraw: {} ether by {}", format_ether(amount), caller);
                self.publish(record.clone());
                return Ok(record);
            }
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("no confirmation within {:?}", self.payout_timeout),
        };

        warn!(
            "payout of {} ether to {} failed, reverting: {}",
            format_ether(amount),
            caller,
            reason
        );
        self.revert_withdrawal(&record).await?;
        Err(AppError::PaymentFailed { to: caller, reason })
    }

    /// Committed balance of `account`. Unknown accounts read as zero.
    pub async fn get_balance(&self, account: AccountId) -> Result<Wei, AppError> {
        Ok(self.repo.get_balance(account).await?)
    }

    /// Balances of every account the ledger has seen, ordered by account.
    pub async fn get_all_balances(&self) -> Result<Vec<BalanceEntry>, AppError> {
        let mut entries: Vec<BalanceEntry> = self
            .repo
            .list_balances()
            .await?
            .into_iter()
            .map(|(account, balance)| BalanceEntry { account, balance })
            .collect();
        entries.sort_by_key(|e| e.account);
        Ok(entries)
    }

    /// Sum of all balances.
    pub async fn total_balance(&self) -> Result<Wei, AppError> {
        let balances = self.repo.list_balances().await?;
        balances
            .values()
            .try_fold(0, |total: Wei, balance| total.checked_add(*balance))
            .ok_or(AppError::TotalOverflow)
    }

    // ========================
    // Journal operations
    // ========================

    /// List the whole journal in order.
    pub async fn list_all_events(&self) -> Result<Vec<EventRecord>, AppError> {
        Ok(self.repo.list_events().await?)
    }

    /// List journal entries matching a filter.
    pub async fn list_events(&self, filter: EventFilter) -> Result<Vec<EventRecord>, AppError> {
        Ok(self
            .repo
            .list_events_filtered(filter.account, filter.kind, filter.limit)
            .await?)
    }

    /// Check the balance table against the journal and return a report.
    pub async fn check_integrity(&self) -> Result<IntegrityReport, AppError> {
        let has_sequence_gaps = self.repo.has_sequence_gaps().await?;
        let balances = self.repo.list_balances().await?;
        let events = self.repo.list_events().await?;

        Ok(build_integrity_report(
            &balances,
            &events,
            has_sequence_gaps,
        ))
    }

    // ========================
    // Internals
    // ========================

    /// Apply an event to its account and journal it in one transaction.
    /// Caller must hold the write lock.
    async fn commit_event(&self, event: LedgerEvent) -> Result<EventRecord, AppError> {
        let account = event.affected_account();

        let mut tx = self.repo.begin().await?;
        let balance = tx.balance(account).await?;
        let new_balance = match apply_to_balance(&event, balance) {
            Ok(b) => b,
            Err(e) => {
                debug!("{} by {} rejected: {}", event.kind(), event.caller(), e);
                return Err(e.into());
            }
        };
        tx.set_balance(account, new_balance).await?;

        let mut record = EventRecord::new(event);
        tx.append_event(&mut record).await?;
        tx.commit().await?;

        Ok(record)
    }

    /// Undo a committed withdrawal whose payout did not go through.
    /// Caller must hold the write lock.
    async fn revert_withdrawal(&self, record: &EventRecord) -> Result<(), AppError> {
        let account = record.event.affected_account();

        let mut tx = self.repo.begin().await?;
        let balance = tx.balance(account).await?;
        tx.set_balance(account, credit(account, balance, record.event.amount())?)
            .await?;
        tx.remove_event(record).await?;

        if let Err(e) = tx.commit().await {
            error!(
                "could not revert unpaid withdrawal #{} of {} ether by {}: {:#}",
                record.sequence,
                format_ether(record.event.amount()),
                account,
                e
            );
            return Err(e.into());
        }
        Ok(())
    }

    fn publish(&self, record: EventRecord) {
        // No subscribers is not an error
        let _ = self.events.send(record);
    }
}

fn ensure_not_in_payout() -> Result<(), AppError> {
    if IN_PAYOUT.try_with(|_| ()).is_ok() {
        warn!("rejected ledger call made from inside a payout");
        return Err(AppError::ReentrantCall);
    }
    Ok(())
}
