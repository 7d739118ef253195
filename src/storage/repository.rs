use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

use crate::domain::{AccountId, EventKind, EventRecord, LedgerEvent, Wei};

use super::MIGRATION_001_INITIAL;

const EVENT_COLUMNS: &str = "id, sequence, kind, account, counterparty, amount, recorded_at";

/// Repository for persisting balances and the event journal.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a SQLite database at the given URL.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(database_url)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;
        Ok(())
    }

    /// Initialize a new database (connect + migrate).
    pub async fn init(database_url: &str) -> Result<Self> {
        let repo = Self::connect(database_url).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    /// Start a write transaction. Dropping it without `commit` rolls back.
    pub async fn begin(&self) -> Result<LedgerTx> {
        let tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;
        Ok(LedgerTx { tx })
    }

    // ========================
    // Balance reads
    // ========================

    /// Committed balance of an account. Unknown accounts read as zero.
    pub async fn get_balance(&self, account: AccountId) -> Result<Wei> {
        let row = sqlx::query("SELECT amount FROM balances WHERE account = ?")
            .bind(account.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch balance")?;

        match row {
            Some(row) => parse_wei(row.get("amount")),
            None => Ok(0),
        }
    }

    /// All materialized balances, including those that fell to zero.
    pub async fn list_balances(&self) -> Result<HashMap<AccountId, Wei>> {
        let rows = sqlx::query("SELECT account, amount FROM balances")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list balances")?;

        rows.iter()
            .map(|row| -> Result<(AccountId, Wei)> {
                let account = parse_account(row.get("account"))?;
                let amount = parse_wei(row.get("amount"))?;
                Ok((account, amount))
            })
            .collect()
    }

    // ========================
    // Journal reads
    // ========================

    /// List all events, ordered by sequence number.
    pub async fn list_events(&self) -> Result<Vec<EventRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM events ORDER BY sequence",
            EVENT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list events")?;

        rows.iter().map(Self::row_to_event).collect()
    }

    /// List events with optional filters. With a limit, the most recent
    /// matching events are returned, still in sequence order.
    pub async fn list_events_filtered(
        &self,
        account: Option<AccountId>,
        kind: Option<EventKind>,
        limit: Option<usize>,
    ) -> Result<Vec<EventRecord>> {
        let mut query = format!("SELECT {} FROM events WHERE 1=1", EVENT_COLUMNS);

        let account_str = account.map(|a| a.to_string());

        if account.is_some() {
            query.push_str(" AND (account = ? OR counterparty = ?)");
        }
        if kind.is_some() {
            query.push_str(" AND kind = ?");
        }

        if let Some(lim) = limit {
            query = format!(
                "SELECT {} FROM ({} ORDER BY sequence DESC LIMIT {}) ORDER BY sequence",
                EVENT_COLUMNS, query, lim
            );
        } else {
            query.push_str(" ORDER BY sequence");
        }

        let mut sql_query = sqlx::query(&query);

        if let Some(ref acc) = account_str {
            sql_query = sql_query.bind(acc).bind(acc);
        }
        if let Some(k) = kind {
            sql_query = sql_query.bind(k.as_str());
        }

        let rows = sql_query
            .fetch_all(&self.pool)
            .await
            .context("Failed to list filtered events")?;

        rows.iter().map(Self::row_to_event).collect()
    }

    /// Check that journal sequence numbers run 1..=N without holes.
    pub async fn has_sequence_gaps(&self) -> Result<bool> {
        let sequence_check = sqlx::query(
            r#"
            SELECT
                MIN(sequence) as min_seq,
                MAX(sequence) as max_seq,
                COUNT(*) as count
            FROM events
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .context("Failed to check event sequence")?;

        let min_seq: Option<i64> = sequence_check.get("min_seq");
        let max_seq: Option<i64> = sequence_check.get("max_seq");
        let event_count: i64 = sequence_check.get("count");

        // A rolled-back write leaves no hole: the counter update rolls back with it
        Ok(match (min_seq, max_seq) {
            (Some(min), Some(max)) => min != 1 || (max - min + 1) != event_count,
            _ => false,
        })
    }

    fn row_to_event(row: &sqlx::sqlite::SqliteRow) -> Result<EventRecord> {
        let id_str: String = row.get("id");
        let kind_str: String = row.get("kind");
        let counterparty_str: Option<String> = row.get("counterparty");
        let recorded_at_str: String = row.get("recorded_at");

        let account = parse_account(row.get("account"))?;
        let amount = parse_wei(row.get("amount"))?;

        let event = match EventKind::from_str(&kind_str) {
            Some(EventKind::Deposit) => LedgerEvent::Deposit { account, amount },
            Some(EventKind::Transfer) => LedgerEvent::Transfer {
                from: account,
                to: parse_account(
                    counterparty_str
                        .ok_or_else(|| anyhow::anyhow!("Transfer event without recipient"))?,
                )?,
                amount,
            },
            Some(EventKind::Withdraw) => LedgerEvent::Withdraw { account, amount },
            None => anyhow::bail!("Invalid event kind: {}", kind_str),
        };

        Ok(EventRecord {
            id: Uuid::parse_str(&id_str).context("Invalid event ID")?,
            sequence: row.get("sequence"),
            event,
            recorded_at: DateTime::parse_from_rfc3339(&recorded_at_str)
                .context("Invalid recorded_at")?
                .with_timezone(&Utc),
        })
    }
}

/// An open write transaction over balances and the journal.
pub struct LedgerTx {
    tx: Transaction<'static, Sqlite>,
}

impl LedgerTx {
    /// Balance as seen inside this transaction.
    pub async fn balance(&mut self, account: AccountId) -> Result<Wei> {
        let row = sqlx::query("SELECT amount FROM balances WHERE account = ?")
            .bind(account.to_string())
            .fetch_optional(&mut *self.tx)
            .await
            .context("Failed to fetch balance")?;

        match row {
            Some(row) => parse_wei(row.get("amount")),
            None => Ok(0),
        }
    }

    /// Overwrite the balance of an account, creating its row if needed.
    pub async fn set_balance(&mut self, account: AccountId, amount: Wei) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO balances (account, amount, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(account) DO UPDATE SET amount = excluded.amount, updated_at = excluded.updated_at
            "#,
        )
        .bind(account.to_string())
        .bind(amount.to_string())
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *self.tx)
        .await
        .context("Failed to save balance")?;
        Ok(())
    }

    /// Append an event to the journal.
    /// Automatically assigns the next sequence number.
    pub async fn append_event(&mut self, record: &mut EventRecord) -> Result<()> {
        record.sequence = self.next_sequence().await?;

        sqlx::query(
            r#"
            INSERT INTO events (id, sequence, kind, account, counterparty, amount, recorded_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.id.to_string())
        .bind(record.sequence)
        .bind(record.event.kind().as_str())
        .bind(record.event.caller().to_string())
        .bind(record.event.counterparty().map(|a| a.to_string()))
        .bind(record.event.amount().to_string())
        .bind(record.recorded_at.to_rfc3339())
        .execute(&mut *self.tx)
        .await
        .context("Failed to save event")?;

        Ok(())
    }

    /// Take a committed event back out of the journal.
    ///
    /// The sequence counter is only wound back when the event is still the
    /// latest one, so later events never share a number with a new one.
    pub async fn remove_event(&mut self, record: &EventRecord) -> Result<()> {
        sqlx::query("DELETE FROM events WHERE id = ?")
            .bind(record.id.to_string())
            .execute(&mut *self.tx)
            .await
            .context("Failed to remove event")?;

        sqlx::query(
            r#"
            UPDATE sequence_counter
            SET value = value - 1
            WHERE name = 'event_sequence' AND value = ?
            "#,
        )
        .bind(record.sequence)
        .execute(&mut *self.tx)
        .await
        .context("Failed to wind back sequence number")?;

        Ok(())
    }

    /// Get the next sequence number and increment the counter.
    async fn next_sequence(&mut self) -> Result<i64> {
        let row = sqlx::query(
            r#"
            UPDATE sequence_counter
            SET value = value + 1
            WHERE name = 'event_sequence'
            RETURNING value
            "#,
        )
        .fetch_one(&mut *self.tx)
        .await
        .context("Failed to get next sequence number")?;

        Ok(row.get("value"))
    }

    pub async fn commit(self) -> Result<()> {
        self.tx.commit().await.context("Failed to commit transaction")
    }

    pub async fn rollback(self) -> Result<()> {
        self.tx
            .rollback()
            .await
            .context("Failed to roll back transaction")
    }
}

fn parse_wei(s: String) -> Result<Wei> {
    s.parse()
        .with_context(|| format!("Invalid stored amount: {}", s))
}

fn parse_account(s: String) -> Result<AccountId> {
    s.parse()
        .with_context(|| format!("Invalid stored account: {}", s))
}
