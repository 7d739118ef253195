use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::application::{EventFilter, LedgerService};
use crate::domain::{AccountId, EventKind, EventRecord, Wei, format_ether, parse_ether};

/// Remit - per-account balance ledger
#[derive(Parser)]
#[command(name = "remit")]
#[command(about = "Deposit, transfer and withdraw against a durable balance ledger")]
#[command(version)]
pub struct Cli {
    /// Database file path
    #[arg(short, long, default_value = "remit.db", env = "REMIT_DATABASE")]
    pub database: String,

    /// Seconds a withdrawal waits for its payout before reverting
    #[arg(long, default_value_t = 30, env = "REMIT_PAYOUT_TIMEOUT")]
    pub payout_timeout: u64,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// Credit your own balance with the attached amount
    Deposit {
        /// Amount in ether (e.g., "1.0" or "0.25")
        amount: String,

        /// Calling account (0x-prefixed address)
        #[arg(long)]
        from: AccountId,
    },

    /// Pay an amount into another account's balance
    Transfer {
        /// Amount in ether (e.g., "1.0" or "0.25")
        amount: String,

        /// Calling account (0x-prefixed address)
        #[arg(long)]
        from: AccountId,

        /// Recipient account (0x-prefixed address)
        #[arg(long)]
        to: AccountId,
    },

    /// Withdraw from your balance
    Withdraw {
        /// Amount in ether (e.g., "1.0" or "0.25")
        amount: String,

        /// Calling account (0x-prefixed address)
        #[arg(long)]
        from: AccountId,
    },

    /// Show balance for an account or all accounts
    Balance {
        /// Account address (omit for all accounts)
        account: Option<AccountId>,
    },

    /// List journal events
    Events {
        /// Only events where this account is caller or recipient
        #[arg(long)]
        account: Option<AccountId>,

        /// Filter by kind: deposit, transfer, withdraw
        #[arg(long)]
        kind: Option<String>,

        /// Show only the most recent N events
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Verify balances against the event journal
    Check,

    /// Export data to CSV or JSON
    Export {
        /// What to export: events, balances, full
        export_type: String,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,

        /// Format: csv, json (default: csv, json for full)
        #[arg(short, long)]
        format: Option<String>,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        match self.command {
            Commands::Init => {
                LedgerService::init(&self.database).await?;
                println!("Database initialized: {}", self.database);
            }

            Commands::Deposit { amount, from } => {
                let service = LedgerService::connect(&self.database).await?;
                let wei = parse_amount(&amount)?;

                let record = service.deposit(from, wei).await?;
                print_record("Deposited", &record);
                print_balance(&service, from).await?;
            }

            Commands::Transfer { amount, from, to } => {
                let service = LedgerService::connect(&self.database).await?;
                let wei = parse_amount(&amount)?;

                let record = service.transfer(from, to, wei).await?;
                print_record("Transferred", &record);
                print_balance(&service, to).await?;
            }

            Commands::Withdraw { amount, from } => {
                let service = LedgerService::connect(&self.database)
                    .await?
                    .with_payout_timeout(Duration::from_secs(self.payout_timeout));
                let wei = parse_amount(&amount)?;

                let record = service.withdraw(from, wei).await?;
                print_record("Withdrew", &record);
                print_balance(&service, from).await?;
            }

            Commands::Balance { account } => {
                let service = LedgerService::connect(&self.database).await?;
                run_balance_command(&service, account).await?;
            }

            Commands::Events {
                account,
                kind,
                limit,
            } => {
                let service = LedgerService::connect(&self.database).await?;
                let kind = kind
                    .map(|k| {
                        EventKind::from_str(&k).ok_or_else(|| {
                            anyhow::anyhow!(
                                "Invalid event kind '{}'. Valid kinds: deposit, transfer, withdraw",
                                k
                            )
                        })
                    })
                    .transpose()?;

                let filter = EventFilter {
                    account,
                    kind,
                    limit,
                };
                run_events_command(&service, filter).await?;
            }

            Commands::Check => {
                let service = LedgerService::connect(&self.database).await?;
                run_check_command(&service).await?;
            }

            Commands::Export {
                export_type,
                output,
                format,
            } => {
                let service = LedgerService::connect(&self.database).await?;
                run_export_command(&service, &export_type, output.as_deref(), format.as_deref())
                    .await?;
            }
        }

        Ok(())
    }
}

fn parse_amount(amount: &str) -> Result<Wei> {
    parse_ether(amount)
        .with_context(|| format!("Invalid amount '{}'. Use ether, e.g. '1.0' or '0.5'", amount))
}

fn print_record(verb: &str, record: &EventRecord) {
    let event = &record.event;
    match event.counterparty() {
        Some(to) => println!(
            "{} {} ether from {} to {} (#{})",
            verb,
            format_ether(event.amount()),
            event.caller(),
            to,
            record.sequence
        ),
        None => println!(
            "{} {} ether for {} (#{})",
            verb,
            format_ether(event.amount()),
            event.caller(),
            record.sequence
        ),
    }
}

async fn print_balance(service: &LedgerService, account: AccountId) -> Result<()> {
    let balance = service.get_balance(account).await?;
    println!("Balance of {}: {} ETH", account, format_ether(balance));
    Ok(())
}

async fn run_balance_command(service: &LedgerService, account: Option<AccountId>) -> Result<()> {
    match account {
        Some(account) => print_balance(service, account).await?,
        None => {
            let entries = service.get_all_balances().await?;
            if entries.is_empty() {
                println!("No accounts found.");
            } else {
                println!("{:<44} {:>28}", "ACCOUNT", "BALANCE (ETH)");
                println!("{}", "-".repeat(73));
                for entry in &entries {
                    println!(
                        "{:<44} {:>28}",
                        entry.account.to_string(),
                        format_ether(entry.balance)
                    );
                }
                println!("{}", "-".repeat(73));
                println!(
                    "{:<44} {:>28}",
                    "TOTAL",
                    format_ether(service.total_balance().await?)
                );
            }
        }
    }
    Ok(())
}

async fn run_events_command(service: &LedgerService, filter: EventFilter) -> Result<()> {
    let events = service.list_events(filter).await?;

    if events.is_empty() {
        println!("No events found.");
        return Ok(());
    }

    println!(
        "{:>6}  {:<9} {:<44} {:<44} {:>24}  {}",
        "SEQ", "KIND", "ACCOUNT", "RECIPIENT", "AMOUNT (ETH)", "RECORDED"
    );
    for record in &events {
        let event = &record.event;
        println!(
            "{:>6}  {:<9} {:<44} {:<44} {:>24}  {}",
            record.sequence,
            event.kind().as_str(),
            event.caller().to_string(),
            event
                .counterparty()
                .map(|a| a.to_string())
                .unwrap_or_else(|| "-".to_string()),
            format_ether(event.amount()),
            record.recorded_at.format("%Y-%m-%d %H:%M:%S")
        );
    }

    Ok(())
}

async fn run_check_command(service: &LedgerService) -> Result<()> {
    println!("Checking ledger integrity...\n");

    let report = service.check_integrity().await?;

    println!("Accounts: {}", report.account_count);
    println!("Events:   {}", report.event_count);
    println!();
    println!(
        "  {:<14} {:>28}",
        "Net deposited:",
        format_ether(report.net_inflow)
    );
    println!(
        "  {:<14} {:>28}  {}",
        "Balances:",
        format_ether(report.stored_total),
        if report.is_balanced {
            "OK"
        } else {
            "UNBALANCED!"
        }
    );
    println!();

    if report.is_healthy() {
        println!("Ledger is consistent.");
    } else {
        println!("Issues found:");
        for issue in &report.issues {
            println!("  - {}", issue);
        }
        anyhow::bail!("Ledger integrity check failed");
    }

    Ok(())
}

async fn run_export_command(
    service: &LedgerService,
    export_type: &str,
    output: Option<&str>,
    format: Option<&str>,
) -> Result<()> {
    use crate::io::Exporter;
    use std::fs::File;
    use std::io::{Write, stdout};

    let exporter = Exporter::new(service);

    let writer: Box<dyn Write> = match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path))?;
            Box::new(file)
        }
        None => Box::new(stdout()),
    };

    let format = format.unwrap_or(if export_type == "full" { "json" } else { "csv" });

    match (export_type, format) {
        ("events", "csv") => {
            let count = exporter.export_events_csv(writer).await?;
            if output.is_some() {
                eprintln!("Exported {} events", count);
            }
        }
        ("events", "json") => {
            let count = exporter.export_events_json(writer).await?;
            if output.is_some() {
                eprintln!("Exported {} events", count);
            }
        }
        ("balances", "csv") => {
            let count = exporter.export_balances_csv(writer).await?;
            if output.is_some() {
                eprintln!("Exported {} balances", count);
            }
        }
        ("balances", "json") => {
            let count = exporter.export_balances_json(writer).await?;
            if output.is_some() {
                eprintln!("Exported {} balances", count);
            }
        }
        ("full", "json") => {
            let snapshot = exporter.export_full_json(writer).await?;
            if output.is_some() {
                eprintln!(
                    "Exported full ledger: {} balances, {} events",
                    snapshot.balances.len(),
                    snapshot.events.len()
                );
            }
        }
        ("events" | "balances" | "full", _) => {
            anyhow::bail!(
                "Unsupported format '{}' for '{}'. Use csv or json (full is json only)",
                format,
                export_type
            );
        }
        _ => {
            anyhow::bail!(
                "Unknown export type '{}'. Valid types: events, balances, full",
                export_type
            );
        }
    }

    Ok(())
}
