//! Game platform access.
//!
//! This module handles:
//! - Platform data types and credentials
//! - Retrying request client
//! - HTTP client for the battle game API
//! - Scripted in-memory platform for testing

pub mod client;
pub mod mock;
pub mod request;
pub mod types;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::error::PlatformError;

pub use client::GameClient;
pub use mock::{MockGamePlatform, PlacedBet};
pub use request::{retry, Attempted, Backoff, RequestClient, RetryObserver, RetryPolicy, TracingObserver};
pub use types::{BetReceipt, Credential, RankedToken, RoundConfig, RoundResult};

/// The five platform operations a betting session needs.
///
/// Every call authenticates with the given credential.
#[async_trait]
pub trait GamePlatform: Send + Sync {
    /// Current balance of the account.
    async fn balance(&self, credential: &Credential) -> Result<Decimal, PlatformError>;

    /// Tokens open for betting in `round_id`.
    async fn round_config(
        &self,
        credential: &Credential,
        round_id: &str,
    ) -> Result<RoundConfig, PlatformError>;

    /// Fresh bet identifier for `round_id`.
    async fn bet_id(&self, credential: &Credential, round_id: &str) -> Result<String, PlatformError>;

    /// Back `token` with `amount` in `round_id`.
    async fn place_bet(
        &self,
        credential: &Credential,
        round_id: &str,
        bet_id: &str,
        token: &str,
        amount: Decimal,
    ) -> Result<BetReceipt, PlatformError>;

    /// Final standings of `round_id`.
    async fn round_result(
        &self,
        credential: &Credential,
        round_id: &str,
    ) -> Result<RoundResult, PlatformError>;
}
