use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::Write;

use crate::application::{BalanceEntry, LedgerService};
use crate::domain::{EventRecord, format_ether};

/// Ledger snapshot for a full JSON export
#[derive(Debug, Clone, Serialize)]
pub struct LedgerSnapshot {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    pub balances: Vec<BalanceEntry>,
    pub events: Vec<EventRecord>,
}

/// Exporter for converting ledger data to various formats
pub struct Exporter<'a> {
    service: &'a LedgerService,
}

impl<'a> Exporter<'a> {
    pub fn new(service: &'a LedgerService) -> Self {
        Self { service }
    }

    /// Export the event journal to CSV format
    pub async fn export_events_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let events = self.service.list_all_events().await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record([
            "sequence",
            "id",
            "recorded_at",
            "kind",
            "account",
            "counterparty",
            "amount_wei",
            "amount_ether",
        ])?;

        for record in &events {
            let event = &record.event;
            csv_writer.write_record([
                record.sequence.to_string(),
                record.id.to_string(),
                record.recorded_at.to_rfc3339(),
                event.kind().to_string(),
                event.caller().to_string(),
                event
                    .counterparty()
                    .map(|a| a.to_string())
                    .unwrap_or_default(),
                event.amount().to_string(),
                format_ether(event.amount()),
            ])?;
        }

        csv_writer.flush()?;
        Ok(events.len())
    }

    /// Export balances to CSV format
    pub async fn export_balances_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let entries = self.service.get_all_balances().await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record(["account", "balance_wei", "balance_ether"])?;

        for entry in &entries {
            csv_writer.write_record([
                entry.account.to_string(),
                entry.balance.to_string(),
                format_ether(entry.balance),
            ])?;
        }

        csv_writer.flush()?;
        Ok(entries.len())
    }

    /// Export the event journal as a JSON array
    pub async fn export_events_json<W: Write>(&self, mut writer: W) -> Result<usize> {
        let events = self.service.list_all_events().await?;
        serde_json::to_writer_pretty(&mut writer, &events)?;
        writer.flush()?;
        Ok(events.len())
    }

    /// Export balances as a JSON array
    pub async fn export_balances_json<W: Write>(&self, mut writer: W) -> Result<usize> {
        let entries = self.service.get_all_balances().await?;
        serde_json::to_writer_pretty(&mut writer, &entries)?;
        writer.flush()?;
        Ok(entries.len())
    }

    /// Export balances and journal together as one JSON snapshot
    pub async fn export_full_json<W: Write>(&self, mut writer: W) -> Result<LedgerSnapshot> {
        let snapshot = LedgerSnapshot {
            version: env!("CARGO_PKG_VERSION").to_string(),
            exported_at: Utc::now(),
            balances: self.service.get_all_balances().await?,
            events: self.service.list_all_events().await?,
        };

        let json = serde_json::to_string_pretty(&snapshot)?;
        writer.write_all(json.as_bytes())?;
        writer.flush()?;

        Ok(snapshot)
    }
}
