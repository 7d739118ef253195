// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use remit::application::{LedgerService, MemoryGateway, PaymentError, PaymentGateway};
use remit::domain::{AccountId, WEI_PER_ETHER, Wei, parse_ether};
use tempfile::TempDir;

/// Helper to create a test service with a temporary database.
/// Payouts are recorded in the returned gateway.
pub async fn test_service() -> Result<(LedgerService, Arc<MemoryGateway>, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let gateway = Arc::new(MemoryGateway::new());
    let service = LedgerService::init(db_path.to_str().unwrap())
        .await?
        .with_gateway(gateway.clone());
    Ok((service, gateway, temp_dir))
}

/// Helper to create a test service whose payouts always fail
pub async fn failing_service() -> Result<(LedgerService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let service = LedgerService::init(db_path.to_str().unwrap())
        .await?
        .with_gateway(Arc::new(FailingGateway));
    Ok((service, temp_dir))
}

/// Parse an ether amount, panicking on bad test input
pub fn ether(amount: &str) -> Wei {
    parse_ether(amount).unwrap()
}

pub fn one_ether() -> Wei {
    WEI_PER_ETHER
}

/// Test fixture: well-known accounts
pub struct Accounts;

impl Accounts {
    pub fn alice() -> AccountId {
        "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266".parse().unwrap()
    }

    pub fn bob() -> AccountId {
        "0x70997970c51812dc3a010c7d01b50e0d17dc79c8".parse().unwrap()
    }

    pub fn carol() -> AccountId {
        "0x3c44cdddb6a900fa2b585dd299e03d12fa4293bc".parse().unwrap()
    }
}

/// Gateway that refuses every payout
pub struct FailingGateway;

#[async_trait]
impl PaymentGateway for FailingGateway {
    async fn pay(&self, _to: AccountId, _amount: Wei) -> Result<(), PaymentError> {
        Err(PaymentError::Rejected("recipient cannot accept value".to_string()))
    }
}
