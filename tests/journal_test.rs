mod common;

use anyhow::Result;
use common::{Accounts, ether, one_ether, test_service};
use remit::Repository;
use remit::application::{EventFilter, LedgerService};
use remit::domain::EventKind;
use remit::io::Exporter;

/// Record a small history touching all three accounts
async fn seed(service: &LedgerService) -> Result<()> {
    service.deposit(Accounts::alice(), ether("2")).await?;
    service
        .transfer(Accounts::alice(), Accounts::bob(), ether("0.5"))
        .await?;
    service
        .transfer(Accounts::carol(), Accounts::alice(), ether("0.25"))
        .await?;
    service.withdraw(Accounts::alice(), ether("1")).await?;
    service.deposit(Accounts::bob(), ether("0.1")).await?;
    Ok(())
}

#[tokio::test]
async fn test_journal_is_ordered() -> Result<()> {
    let (service, _gateway, _temp) = test_service().await?;
    seed(&service).await?;

    let events = service.list_all_events().await?;
    let sequences: Vec<i64> = events.iter().map(|e| e.sequence).collect();
    let kinds: Vec<EventKind> = events.iter().map(|e| e.event.kind()).collect();

    assert_eq!(sequences, vec![1, 2, 3, 4, 5]);
    assert_eq!(
        kinds,
        vec![
            EventKind::Deposit,
            EventKind::Transfer,
            EventKind::Transfer,
            EventKind::Withdraw,
            EventKind::Deposit,
        ]
    );

    Ok(())
}

#[tokio::test]
async fn test_filter_events_by_account() -> Result<()> {
    let (service, _gateway, _temp) = test_service().await?;
    seed(&service).await?;

    let filter = EventFilter {
        account: Some(Accounts::bob()),
        ..Default::default()
    };
    let events = service.list_events(filter).await?;

    // Bob receives one transfer and makes one deposit
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|e| e.event.involves(Accounts::bob())));

    Ok(())
}

#[tokio::test]
async fn test_filter_events_by_kind_and_limit() -> Result<()> {
    let (service, _gateway, _temp) = test_service().await?;
    seed(&service).await?;

    let deposits = service
        .list_events(EventFilter {
            kind: Some(EventKind::Deposit),
            ..Default::default()
        })
        .await?;
    assert_eq!(deposits.len(), 2);

    let recent = service
        .list_events(EventFilter {
            limit: Some(2),
            ..Default::default()
        })
        .await?;
    let sequences: Vec<i64> = recent.iter().map(|e| e.sequence).collect();
    assert_eq!(sequences, vec![4, 5], "limit keeps the most recent events");

    Ok(())
}

#[tokio::test]
async fn test_total_matches_net_deposits() -> Result<()> {
    let (service, gateway, _temp) = test_service().await?;
    seed(&service).await?;

    // 2 + 0.5 + 0.25 - 1 + 0.1
    assert_eq!(service.total_balance().await?, ether("1.85"));
    assert_eq!(gateway.total_paid(), one_ether());

    let report = service.check_integrity().await?;
    assert!(report.is_healthy(), "issues: {:?}", report.issues);
    assert!(report.is_balanced);
    assert_eq!(report.net_inflow, ether("1.85"));
    assert_eq!(report.account_count, 2, "carol only ever sent value");
    assert_eq!(report.event_count, 5);

    Ok(())
}

#[tokio::test]
async fn test_integrity_check_detects_tampering() -> Result<()> {
    let (service, _gateway, temp) = test_service().await?;
    seed(&service).await?;

    // Write a balance behind the service's back
    let db_path = temp.path().join("test.db");
    let repo = Repository::connect(&format!("sqlite:{}", db_path.display())).await?;
    let mut tx = repo.begin().await?;
    tx.set_balance(Accounts::bob(), ether("100")).await?;
    tx.commit().await?;

    let report = service.check_integrity().await?;

    assert!(!report.is_healthy());
    assert!(!report.is_balanced);
    assert_eq!(report.mismatches.len(), 1);
    assert_eq!(report.mismatches[0].account, Accounts::bob());
    assert_eq!(report.mismatches[0].replayed, ether("0.6"));

    Ok(())
}

#[tokio::test]
async fn test_export_events_csv() -> Result<()> {
    let (service, _gateway, _temp) = test_service().await?;
    seed(&service).await?;

    let mut buffer = Vec::new();
    let count = Exporter::new(&service).export_events_csv(&mut buffer).await?;
    let csv = String::from_utf8(buffer)?;
    let lines: Vec<&str> = csv.lines().collect();

    assert_eq!(count, 5);
    assert_eq!(lines.len(), 6);
    assert!(lines[0].starts_with("sequence,id,recorded_at,kind"));
    assert!(lines[2].contains(",transfer,"));
    assert!(lines[2].contains(&Accounts::bob().to_string()));
    assert!(lines[2].ends_with(",500000000000000000,0.5"));

    Ok(())
}

#[tokio::test]
async fn test_export_full_json() -> Result<()> {
    let (service, _gateway, _temp) = test_service().await?;
    seed(&service).await?;

    let mut buffer = Vec::new();
    let snapshot = Exporter::new(&service)
        .export_full_json(&mut buffer)
        .await?;
    let value: serde_json::Value = serde_json::from_slice(&buffer)?;

    assert_eq!(snapshot.balances.len(), 2);
    assert_eq!(value["events"].as_array().map(|a| a.len()), Some(5));
    assert_eq!(value["events"][0]["kind"], "deposit");
    assert_eq!(value["events"][0]["amount"], "2000000000000000000");

    Ok(())
}
