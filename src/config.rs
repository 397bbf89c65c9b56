//! Application configuration loaded from environment variables.

use std::time::Duration;

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::platform::request::{Backoff, RetryPolicy};

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // === Platform Endpoints ===
    /// Game API base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Account balance endpoint (full URL).
    #[serde(default = "default_balance_url")]
    pub balance_url: String,

    /// Header carrying the credential.
    #[serde(default = "default_auth_header")]
    pub auth_header: String,

    /// Value of the `saas_id` header.
    #[serde(default = "default_saas_id")]
    pub saas_id: String,

    // === Session Parameters ===
    /// Maximum sessions running at once.
    #[serde(default = "default_threads")]
    pub threads: usize,

    /// Successful bets per account before the session stops.
    #[serde(default = "default_max_games")]
    pub max_games: u32,

    /// Stake per bet.
    #[serde(default = "default_bet_amount")]
    pub bet_amount: Decimal,

    // === Round Timing ===
    /// Second within the minute at which a round opens.
    #[serde(default = "default_round_second")]
    pub round_second: u8,

    /// Second within the following minute at which results are checked.
    #[serde(default = "default_verify_second")]
    pub verify_second: u8,

    /// Lower bound of the random delay after the round boundary, in seconds.
    #[serde(default = "default_jitter_min")]
    pub jitter_min_s: u64,

    /// Upper bound of the random delay after the round boundary, in seconds.
    #[serde(default = "default_jitter_max")]
    pub jitter_max_s: u64,

    /// Pause before retrying a skipped round, in seconds.
    #[serde(default = "default_skip_pause")]
    pub skip_pause_s: u64,

    // === Token Selection ===
    /// Chance of picking from the preference list when one matches.
    #[serde(default = "default_prefer_probability")]
    pub prefer_probability: f64,

    // === HTTP ===
    /// Attempts per request (first try included).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay between attempts in milliseconds.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,

    /// Double the delay after every failed attempt.
    #[serde(default)]
    pub exponential_backoff: bool,

    /// Per-request timeout in milliseconds.
    #[serde(default = "default_http_timeout")]
    pub http_timeout_ms: u64,

    // === Inputs ===
    /// Newline-delimited credential file.
    #[serde(default = "default_tokens_file")]
    pub tokens_file: String,

    /// Optional JSON array of preferred token identifiers.
    #[serde(default)]
    pub preferred_tokens_file: Option<String>,

    // === Observability ===
    /// Expose Prometheus metrics.
    #[serde(default)]
    pub metrics_enabled: bool,

    /// Prometheus listener port.
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub rust_log: String,
}

fn default_base_url() -> String {
    "https://api.dojo3.io/v1".to_string()
}

fn default_balance_url() -> String {
    "https://quest.dojo3.io/v2/customer/me?businessType=ojo,asset".to_string()
}

fn default_auth_header() -> String {
    "jwt_token".to_string()
}

fn default_saas_id() -> String {
    "dojo3-tg".to_string()
}

fn default_threads() -> usize {
    4
}

fn default_max_games() -> u32 {
    5
}

fn default_bet_amount() -> Decimal {
    Decimal::new(200, 0)
}

fn default_round_second() -> u8 {
    18
}

fn default_verify_second() -> u8 {
    25
}

fn default_jitter_min() -> u64 {
    2
}

fn default_jitter_max() -> u64 {
    27
}

fn default_skip_pause() -> u64 {
    10
}

fn default_prefer_probability() -> f64 {
    0.5
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    2000
}

fn default_http_timeout() -> u64 {
    10_000
}

fn default_tokens_file() -> String {
    "tokens.txt".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            balance_url: default_balance_url(),
            auth_header: default_auth_header(),
            saas_id: default_saas_id(),
            threads: default_threads(),
            max_games: default_max_games(),
            bet_amount: default_bet_amount(),
            round_second: default_round_second(),
            verify_second: default_verify_second(),
            jitter_min_s: default_jitter_min(),
            jitter_max_s: default_jitter_max(),
            skip_pause_s: default_skip_pause(),
            prefer_probability: default_prefer_probability(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay(),
            exponential_backoff: false,
            http_timeout_ms: default_http_timeout(),
            tokens_file: default_tokens_file(),
            preferred_tokens_file: None,
            metrics_enabled: false,
            metrics_port: default_metrics_port(),
            rust_log: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from environment, reading .env file first.
    pub fn load() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Check if the configuration is valid.
    pub fn validate(&self) -> Result<(), String> {
        if self.round_second > 59 {
            return Err("ROUND_SECOND must be between 0 and 59".to_string());
        }

        if self.verify_second > 59 {
            return Err("VERIFY_SECOND must be between 0 and 59".to_string());
        }

        if self.threads == 0 {
            return Err("THREADS must be at least 1".to_string());
        }

        if self.max_games == 0 {
            return Err("MAX_GAMES must be at least 1".to_string());
        }

        if self.bet_amount <= Decimal::ZERO {
            return Err("BET_AMOUNT must be positive".to_string());
        }

        if self.jitter_min_s > self.jitter_max_s {
            return Err("JITTER_MIN_S must not exceed JITTER_MAX_S".to_string());
        }

        if !(0.0..=1.0).contains(&self.prefer_probability) {
            return Err("PREFER_PROBABILITY must be within [0, 1]".to_string());
        }

        if self.max_retries == 0 {
            return Err("MAX_RETRIES must be at least 1".to_string());
        }

        if self.auth_header.trim().is_empty() {
            return Err("AUTH_HEADER must not be empty".to_string());
        }

        Ok(())
    }

    /// Retry policy for every platform request.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retries,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            backoff: if self.exponential_backoff {
                Backoff::Exponential {
                    max_delay: Duration::from_secs(30),
                }
            } else {
                Backoff::Fixed
            },
        }
    }

    /// Pause before re-entering the loop after a skipped round.
    pub fn skip_pause(&self) -> Duration {
        Duration::from_secs(self.skip_pause_s)
    }
}
