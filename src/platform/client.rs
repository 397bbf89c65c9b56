//! HTTP client for the battle game API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::{debug, instrument};

use super::request::RequestClient;
use super::types::{
    bet_id_from_value, ApiEnvelope, BalanceResponse, BetReceipt, Credential, RoundConfig,
    RoundResult, RoundResultData,
};
use super::GamePlatform;
use crate::config::Config;
use crate::error::{BotError, PlatformError};

/// Battle game API client shared by all sessions.
#[derive(Debug, Clone)]
pub struct GameClient {
    /// Retrying HTTP client.
    requests: RequestClient,
    /// Base URL for the game API.
    base_url: String,
    /// Balance endpoint.
    balance_url: String,
    /// Header carrying the credential.
    auth_header: String,
    /// `saas_id` header value.
    saas_id: String,
}

impl GameClient {
    /// Create a client from config.
    pub fn new(config: &Config) -> Result<Self, BotError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));

        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.http_timeout_ms))
            .connect_timeout(Duration::from_secs(5))
            .tcp_keepalive(Duration::from_secs(30))
            .pool_max_idle_per_host(config.threads.max(1))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            requests: RequestClient::new(http, config.retry_policy()),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            balance_url: config.balance_url.clone(),
            auth_header: config.auth_header.clone(),
            saas_id: config.saas_id.clone(),
        })
    }

    /// Game API base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn round_url(&self, round_id: &str, path: &str) -> String {
        format!("{}/games/battle/{}/{}", self.base_url, round_id, path)
    }

    fn authorized(&self, builder: reqwest::RequestBuilder, credential: &Credential) -> reqwest::RequestBuilder {
        builder
            .header(self.auth_header.as_str(), credential.expose())
            .header("saas_id", self.saas_id.as_str())
    }

    fn get(&self, url: &str, credential: &Credential) -> reqwest::RequestBuilder {
        self.authorized(self.requests.http().get(url), credential)
    }

    fn post_empty(&self, url: &str, credential: &Credential) -> reqwest::RequestBuilder {
        self.authorized(self.requests.http().post(url), credential)
            .header(CONTENT_TYPE, "application/json")
            .body("{}")
    }
}

#[async_trait]
impl GamePlatform for GameClient {
    #[instrument(skip(self), fields(account = %credential))]
    async fn balance(&self, credential: &Credential) -> Result<Decimal, PlatformError> {
        let response: BalanceResponse = self
            .requests
            .send_json("balance", || self.get(&self.balance_url, credential))
            .await?;

        let balance = response.ojo().ok_or_else(|| PlatformError::Unexpected {
            operation: "balance",
            reason: "ojoValue is not numeric".to_string(),
        })?;

        debug!(balance = %balance, "Retrieved OJO balance");
        Ok(balance)
    }

    #[instrument(skip(self), fields(account = %credential))]
    async fn round_config(
        &self,
        credential: &Credential,
        round_id: &str,
    ) -> Result<RoundConfig, PlatformError> {
        let url = self.round_url(round_id, "configs");
        let envelope: ApiEnvelope<RoundConfig> = self
            .requests
            .send_json("round_config", || self.get(&url, credential))
            .await?;

        Ok(envelope.data.unwrap_or_default())
    }

    #[instrument(skip(self), fields(account = %credential))]
    async fn bet_id(&self, credential: &Credential, round_id: &str) -> Result<String, PlatformError> {
        let url = self.round_url(round_id, "bets/id");
        let envelope: ApiEnvelope<Value> = self
            .requests
            .send_json("bet_id", || self.post_empty(&url, credential))
            .await?;

        envelope
            .data
            .as_ref()
            .and_then(bet_id_from_value)
            .ok_or_else(|| PlatformError::Unexpected {
                operation: "bet_id",
                reason: "missing bet id".to_string(),
            })
    }

    #[instrument(skip(self), fields(account = %credential))]
    async fn place_bet(
        &self,
        credential: &Credential,
        round_id: &str,
        bet_id: &str,
        token: &str,
        amount: Decimal,
    ) -> Result<BetReceipt, PlatformError> {
        let url = self.round_url(round_id, "real/bets");
        let amount = amount.normalize().to_string();

        // The bet id makes a resubmission after a lost response idempotent.
        self.requests
            .send_json("place_bet", || {
                self.post_empty(&url, credential).query(&[
                    ("betId", bet_id),
                    ("token", token),
                    ("amount", amount.as_str()),
                ])
            })
            .await
    }

    #[instrument(skip(self), fields(account = %credential))]
    async fn round_result(
        &self,
        credential: &Credential,
        round_id: &str,
    ) -> Result<RoundResult, PlatformError> {
        let url = self.round_url(round_id, "result");
        let envelope: ApiEnvelope<RoundResultData> = self
            .requests
            .send_json("round_result", || self.get(&url, credential))
            .await?;

        envelope
            .data
            .map(RoundResult::from)
            .ok_or_else(|| PlatformError::Unexpected {
                operation: "round_result",
                reason: "results not published".to_string(),
            })
    }
}
