//! Mock game platform for unit testing.
//!
//! Keeps a real balance per account so sessions see bets debit their
//! stake, and lets tests script config outages, rejections, revoked
//! credentials and balance outages without network access.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;

use super::types::{BetReceipt, Credential, RankedToken, RoundConfig, RoundResult};
use super::GamePlatform;
use crate::error::{PlatformError, RequestError};

/// A bet the mock accepted or rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedBet {
    /// Account fingerprint.
    pub account: String,
    /// Round the bet targeted.
    pub round_id: String,
    /// Bet identifier used.
    pub bet_id: String,
    /// Chosen token.
    pub token: String,
    /// Stake.
    pub amount: Decimal,
    /// Whether the mock accepted it.
    pub accepted: bool,
}

#[derive(Debug, Default)]
struct MockState {
    balances: HashMap<Credential, Decimal>,
    tokens: Vec<String>,
    config_failures: u32,
    empty_configs: u32,
    payout: Decimal,
    revoke_on_results: HashSet<Credential>,
    rejections: VecDeque<String>,
    revoked: HashSet<Credential>,
    balance_reads_left: HashMap<Credential, u32>,
    results: Vec<RankedToken>,
    bets: Vec<PlacedBet>,
    next_bet_id: u64,
}

/// Scripted in-memory [`GamePlatform`].
#[derive(Debug, Clone)]
pub struct MockGamePlatform {
    state: Arc<Mutex<MockState>>,
    latency: Duration,
}

impl MockGamePlatform {
    /// Create a mock whose rounds offer `tokens`.
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let state = MockState {
            tokens: tokens.into_iter().map(Into::into).collect(),
            ..Default::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
            latency: Duration::ZERO,
        }
    }

    /// Delay every call by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Set an account's balance.
    pub fn set_balance(&self, credential: &Credential, balance: Decimal) {
        self.lock().balances.insert(credential.clone(), balance);
    }

    /// Current balance of an account.
    pub fn balance_of(&self, credential: &Credential) -> Decimal {
        self.lock()
            .balances
            .get(credential)
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    /// Make the next `count` round config fetches fail.
    pub fn fail_round_configs(&self, count: u32) {
        self.lock().config_failures = count;
    }

    /// Make the next `count` round configs offer no tokens.
    pub fn empty_round_configs(&self, count: u32) {
        self.lock().empty_configs = count;
    }

    /// Credit every account `amount` when it reads a round's results.
    pub fn pay_on_results(&self, amount: Decimal) {
        self.lock().payout = amount;
    }

    /// Revoke `credential` the first time it reads round results.
    pub fn revoke_on_results(&self, credential: &Credential) {
        self.lock().revoke_on_results.insert(credential.clone());
    }

    /// Reject the next bets with these failure keys, in order.
    pub fn reject_next_bets<I, S>(&self, keys: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lock().rejections.extend(keys.into_iter().map(Into::into));
    }

    /// Answer every call for `credential` with 401.
    pub fn revoke(&self, credential: &Credential) {
        self.lock().revoked.insert(credential.clone());
    }

    /// Allow `reads` more successful balance reads, then fail them.
    pub fn fail_balance_after(&self, credential: &Credential, reads: u32) {
        self.lock()
            .balance_reads_left
            .insert(credential.clone(), reads);
    }

    /// Standings returned for every round.
    pub fn set_results(&self, results: Vec<RankedToken>) {
        self.lock().results = results;
    }

    /// Every bet submitted so far.
    pub fn placed_bets(&self) -> Vec<PlacedBet> {
        self.lock().bets.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().expect("mock state poisoned")
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    fn check_auth(
        state: &MockState,
        credential: &Credential,
        operation: &'static str,
    ) -> Result<(), PlatformError> {
        if state.revoked.contains(credential) {
            return Err(PlatformError::Unauthorized {
                operation,
                status: 401,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl GamePlatform for MockGamePlatform {
    async fn balance(&self, credential: &Credential) -> Result<Decimal, PlatformError> {
        self.simulate_latency().await;
        let mut state = self.lock();
        Self::check_auth(&state, credential, "balance")?;

        if let Some(left) = state.balance_reads_left.get_mut(credential) {
            if *left == 0 {
                return Err(PlatformError::Exhausted {
                    operation: "balance",
                    attempts: 3,
                    source: RequestError::Transient("Mock balance failure".to_string()),
                });
            }
            *left -= 1;
        }

        Ok(state
            .balances
            .get(credential)
            .copied()
            .unwrap_or(Decimal::ZERO))
    }

    async fn round_config(
        &self,
        credential: &Credential,
        _round_id: &str,
    ) -> Result<RoundConfig, PlatformError> {
        self.simulate_latency().await;
        let mut state = self.lock();
        Self::check_auth(&state, credential, "round_config")?;

        if state.config_failures > 0 {
            state.config_failures -= 1;
            return Err(PlatformError::Exhausted {
                operation: "round_config",
                attempts: 3,
                source: RequestError::Parse("Mock config failure".to_string()),
            });
        }

        if state.empty_configs > 0 {
            state.empty_configs -= 1;
            return Ok(RoundConfig::default());
        }

        Ok(RoundConfig {
            tokens: state.tokens.clone(),
        })
    }

    async fn bet_id(&self, credential: &Credential, round_id: &str) -> Result<String, PlatformError> {
        self.simulate_latency().await;
        let mut state = self.lock();
        Self::check_auth(&state, credential, "bet_id")?;

        state.next_bet_id += 1;
        Ok(format!("{}-{}", round_id, state.next_bet_id))
    }

    async fn place_bet(
        &self,
        credential: &Credential,
        round_id: &str,
        bet_id: &str,
        token: &str,
        amount: Decimal,
    ) -> Result<BetReceipt, PlatformError> {
        self.simulate_latency().await;
        let mut state = self.lock();
        Self::check_auth(&state, credential, "place_bet")?;

        let balance = state
            .balances
            .get(credential)
            .copied()
            .unwrap_or(Decimal::ZERO);

        let rejection = match state.rejections.pop_front() {
            Some(key) => Some(key),
            None if balance < amount => Some("balance.insufficient".to_string()),
            None => None,
        };

        let accepted = rejection.is_none();
        if accepted {
            state.balances.insert(credential.clone(), balance - amount);
        }

        state.bets.push(PlacedBet {
            account: credential.fingerprint(),
            round_id: round_id.to_string(),
            bet_id: bet_id.to_string(),
            token: token.to_string(),
            amount,
            accepted,
        });

        Ok(BetReceipt {
            success: accepted,
            msg_key: rejection,
        })
    }

    async fn round_result(
        &self,
        credential: &Credential,
        _round_id: &str,
    ) -> Result<RoundResult, PlatformError> {
        self.simulate_latency().await;
        let mut state = self.lock();
        if state.revoke_on_results.remove(credential) {
            state.revoked.insert(credential.clone());
        }
        Self::check_auth(&state, credential, "round_result")?;

        let payout = state.payout;
        if !payout.is_zero() {
            *state.balances.entry(credential.clone()).or_default() += payout;
        }

        Ok(RoundResult {
            rankings: state.results.clone(),
        })
    }
}
