//! Platform data types: credentials, round configuration, bets and results.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

/// Bearer token for one account session.
///
/// Never printed in full; `Debug` and `Display` show a fingerprint.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Credential(String);

impl Credential {
    /// Wrap a raw token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Raw token for the auth header.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Short, log-safe identifier (`eyJhbG…x9Qk`).
    pub fn fingerprint(&self) -> String {
        let chars: Vec<char> = self.0.chars().collect();
        if chars.len() <= 12 {
            return "***".to_string();
        }
        let head: String = chars[..6].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}…{}", head, tail)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Credential").field(&self.fingerprint()).finish()
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fingerprint())
    }
}

/// Generic `{ "data": ... }` envelope used by the game API.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope<T> {
    /// Payload.
    pub data: Option<T>,
}

/// Tokens open for betting in one round.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RoundConfig {
    /// Token identifiers.
    #[serde(default)]
    pub tokens: Vec<String>,
}

/// Balance endpoint response.
#[derive(Debug, Clone, Deserialize)]
pub struct BalanceResponse {
    /// Customer object.
    pub obj: Option<BalanceObject>,
}

/// Customer object carrying the OJO balance.
#[derive(Debug, Clone, Deserialize)]
pub struct BalanceObject {
    /// Balance as number or numeric string.
    #[serde(rename = "ojoValue")]
    pub ojo_value: Option<Value>,
}

impl BalanceResponse {
    /// OJO balance, zero when absent.
    pub fn ojo(&self) -> Option<Decimal> {
        match self.obj.as_ref().and_then(|obj| obj.ojo_value.as_ref()) {
            None | Some(Value::Null) => Some(Decimal::ZERO),
            Some(value) => decimal_from_value(value),
        }
    }
}

/// Parse a JSON number or numeric string into a Decimal.
pub fn decimal_from_value(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string()))
            .ok(),
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    }
}

/// Bet identifier as returned by the platform (string or number).
pub fn bet_id_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Outcome of a bet submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BetReceipt {
    /// Whether the platform accepted the bet.
    #[serde(default)]
    pub success: bool,
    /// Machine-readable failure key.
    #[serde(rename = "msgKey", default)]
    pub msg_key: Option<String>,
}

impl BetReceipt {
    /// Failure reason for logs.
    pub fn reason(&self) -> &str {
        self.msg_key.as_deref().unwrap_or("unknown")
    }
}

/// One token's placing in a finished round.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RankedToken {
    /// Token identifier.
    #[serde(alias = "symbol", alias = "name")]
    pub token: String,
    /// 1-based rank.
    #[serde(alias = "ranking", alias = "position")]
    pub rank: u32,
}

/// Result payload: either a bare list or an object wrapping it.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RoundResultData {
    /// `[{token, rank}, ...]`
    List(Vec<RankedToken>),
    /// `{ "rankings": [...] }`
    Wrapped {
        /// Ranked tokens.
        #[serde(alias = "tokens", alias = "results")]
        rankings: Vec<RankedToken>,
    },
}

/// Final standings of a round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoundResult {
    /// Ranked tokens, in response order.
    pub rankings: Vec<RankedToken>,
}

impl From<RoundResultData> for RoundResult {
    fn from(data: RoundResultData) -> Self {
        let rankings = match data {
            RoundResultData::List(list) => list,
            RoundResultData::Wrapped { rankings } => rankings,
        };
        Self { rankings }
    }
}

impl RoundResult {
    /// Tokens ranked within `1..=top`, best first.
    pub fn winners(&self, top: u32) -> Vec<&RankedToken> {
        let mut winners: Vec<&RankedToken> = self
            .rankings
            .iter()
            .filter(|entry| entry.rank >= 1 && entry.rank <= top)
            .collect();
        winners.sort_by_key(|entry| entry.rank);
        winners
    }

    /// Whether `token` placed within `1..=top`.
    pub fn placed(&self, token: &str, top: u32) -> bool {
        self.winners(top).iter().any(|entry| entry.token == token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn credential_is_redacted() {
        let cred = Credential::new("eyJhbGciOiJIUzI1NiJ9.payload.x9Qk");
        assert_eq!(cred.fingerprint(), "eyJhbG…x9Qk");
        assert_eq!(format!("{cred}"), "eyJhbG…x9Qk");
        assert!(!format!("{cred:?}").contains("payload"));
        assert_eq!(Credential::new("short").fingerprint(), "***");
    }

    #[test]
    fn balance_accepts_number_string_or_missing() {
        let numeric: BalanceResponse = serde_json::from_value(json!({"obj": {"ojoValue": 1250.5}})).unwrap();
        assert_eq!(numeric.ojo(), Some(dec!(1250.5)));

        let text: BalanceResponse = serde_json::from_value(json!({"obj": {"ojoValue": "88"}})).unwrap();
        assert_eq!(text.ojo(), Some(dec!(88)));

        let missing: BalanceResponse = serde_json::from_value(json!({"obj": {}})).unwrap();
        assert_eq!(missing.ojo(), Some(Decimal::ZERO));

        let garbage: BalanceResponse = serde_json::from_value(json!({"obj": {"ojoValue": "n/a"}})).unwrap();
        assert_eq!(garbage.ojo(), None);
    }

    #[test]
    fn round_config_parses_tokens() {
        let env: ApiEnvelope<RoundConfig> =
            serde_json::from_value(json!({"data": {"tokens": ["BTC", "ETH", "SOL"]}})).unwrap();
        assert_eq!(env.data.unwrap().tokens, vec!["BTC", "ETH", "SOL"]);
    }

    #[test]
    fn bet_receipt_reads_msg_key() {
        let receipt: BetReceipt =
            serde_json::from_value(json!({"success": false, "msgKey": "bet.closed"})).unwrap();
        assert!(!receipt.success);
        assert_eq!(receipt.reason(), "bet.closed");
    }

    #[test]
    fn bet_id_from_string_or_number() {
        assert_eq!(bet_id_from_value(&json!("abc")), Some("abc".to_string()));
        assert_eq!(bet_id_from_value(&json!(12345)), Some("12345".to_string()));
        assert_eq!(bet_id_from_value(&json!("")), None);
        assert_eq!(bet_id_from_value(&json!(null)), None);
    }

    #[test]
    fn winners_are_top_three_best_first() {
        let data: RoundResultData = serde_json::from_value(json!({
            "rankings": [
                {"token": "DOGE", "rank": 4},
                {"token": "ETH", "rank": 2},
                {"token": "BTC", "rank": 1},
                {"symbol": "SOL", "ranking": 3},
            ]
        }))
        .unwrap();
        let result = RoundResult::from(data);
        let names: Vec<&str> = result.winners(3).iter().map(|e| e.token.as_str()).collect();
        assert_eq!(names, vec!["BTC", "ETH", "SOL"]);
        assert!(result.placed("SOL", 3));
        assert!(!result.placed("DOGE", 3));
    }
}
