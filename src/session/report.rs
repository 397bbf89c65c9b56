//! Session state, stop reasons and end-of-run reports.

use std::fmt;

use rust_decimal::Decimal;
use serde::Serialize;
use strum::Display;
use time::OffsetDateTime;

use crate::error::PlatformError;

/// Lifecycle of one account session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[strum(serialize_all = "snake_case")]
pub enum SessionState {
    /// Reading the starting balance.
    Init,
    /// Placing bets round after round.
    Betting,
    /// Betting is over; pending results are still being checked.
    Verifying,
    /// Finished.
    Stopped,
}

/// Why a session stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum StopReason {
    /// The games quota was reached.
    QuotaReached,
    /// Balance fell below the stake.
    InsufficientBalance,
    /// Balance could not be read.
    BalanceUnavailable(String),
    /// The credential was rejected.
    Unauthorized,
    /// Any other terminal failure.
    Failed(String),
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::BalanceUnavailable(reason) | StopReason::Failed(reason) => {
                write!(f, "{}: {}", self.label(), reason)
            }
            _ => f.write_str(self.label()),
        }
    }
}

impl StopReason {
    /// Stop reason for a failed balance read.
    pub fn from_balance_error(error: &PlatformError) -> Self {
        if error.is_auth() {
            StopReason::Unauthorized
        } else {
            StopReason::BalanceUnavailable(error.to_string())
        }
    }

    /// Short label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            StopReason::QuotaReached => "quota_reached",
            StopReason::InsufficientBalance => "insufficient_balance",
            StopReason::BalanceUnavailable(_) => "balance_unavailable",
            StopReason::Unauthorized => "unauthorized",
            StopReason::Failed(_) => "failed",
        }
    }
}

/// Bet waiting for its round's results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingOutcome {
    /// Round the bet was placed in.
    pub round_id: String,
    /// Token backed.
    pub token: String,
    /// Balance before the bet.
    pub balance_before: Decimal,
    /// When results should be available.
    pub check_at: OffsetDateTime,
}

/// What the verifier learned about one bet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutcomeRecord {
    /// Round the bet was placed in.
    pub round_id: String,
    /// Token backed.
    pub token: String,
    /// Tokens ranked in the top three, best first.
    pub winners: Vec<String>,
    /// Whether the backed token placed; `None` when results were unavailable.
    pub won: Option<bool>,
    /// Balance before the bet.
    pub balance_before: Decimal,
    /// Balance after results; `None` when it could not be read.
    pub balance_after: Option<Decimal>,
}

impl OutcomeRecord {
    /// Record for a bet whose results were never checked.
    pub fn unverified(pending: PendingOutcome) -> Self {
        Self {
            round_id: pending.round_id,
            token: pending.token,
            winners: Vec::new(),
            won: None,
            balance_before: pending.balance_before,
            balance_after: None,
        }
    }

    /// Balance change attributed to this bet.
    pub fn delta(&self) -> Option<Decimal> {
        self.balance_after.map(|after| after - self.balance_before)
    }
}

/// End-of-run summary for one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionReport {
    /// Credential fingerprint.
    pub account: String,
    /// Final state (always `Stopped`).
    pub state: SessionState,
    /// Why the session ended.
    pub stop_reason: StopReason,
    /// Balance at start; `None` when it could not be read.
    pub initial_balance: Option<Decimal>,
    /// Balance at end.
    pub final_balance: Option<Decimal>,
    /// Accepted bets.
    pub games_played: u32,
    /// Submissions made, accepted or not.
    pub attempts: u32,
    /// Submissions the platform rejected.
    pub rejected: u32,
    /// Rounds skipped before a submission (no config, no tokens, errors).
    pub skipped: u32,
    /// Verified bet outcomes.
    pub outcomes: Vec<OutcomeRecord>,
}

impl SessionReport {
    /// Report for a session that never got to bet.
    pub fn aborted(account: String, stop_reason: StopReason, balance: Option<Decimal>) -> Self {
        Self {
            account,
            state: SessionState::Stopped,
            stop_reason,
            initial_balance: balance,
            final_balance: balance,
            games_played: 0,
            attempts: 0,
            rejected: 0,
            skipped: 0,
            outcomes: Vec::new(),
        }
    }

    /// Final minus initial balance; zero when either is unknown.
    pub fn net(&self) -> Decimal {
        match (self.initial_balance, self.final_balance) {
            (Some(start), Some(end)) => end - start,
            _ => Decimal::ZERO,
        }
    }

    /// One-line summary for logs.
    pub fn summary_line(&self) -> String {
        let show = |value: Option<Decimal>| value.map_or_else(|| "n/a".to_string(), |v| v.to_string());
        let net = self.net();
        let sign = if net > Decimal::ZERO { "+" } else { "" };
        format!(
            "{} | start {} | end {} | net {}{} | games {} | {}",
            self.account,
            show(self.initial_balance),
            show(self.final_balance),
            sign,
            net,
            self.games_played,
            self.stop_reason
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RequestError;
    use rust_decimal_macros::dec;

    #[test]
    fn aborted_report_has_zero_net() {
        let report = SessionReport::aborted(
            "acct".to_string(),
            StopReason::InsufficientBalance,
            Some(dec!(50)),
        );
        assert_eq!(report.net(), Decimal::ZERO);
        assert_eq!(report.state, SessionState::Stopped);
        assert_eq!(report.games_played, 0);
    }

    #[test]
    fn stop_reason_from_balance_error() {
        let auth = PlatformError::Unauthorized {
            operation: "balance",
            status: 401,
        };
        assert_eq!(StopReason::from_balance_error(&auth), StopReason::Unauthorized);

        let transient = PlatformError::Exhausted {
            operation: "balance",
            attempts: 3,
            source: RequestError::Transient("HTTP 500".into()),
        };
        assert!(matches!(
            StopReason::from_balance_error(&transient),
            StopReason::BalanceUnavailable(_)
        ));
    }

    #[test]
    fn summary_line_shows_signed_net() {
        let mut report = SessionReport::aborted("acct".to_string(), StopReason::QuotaReached, Some(dec!(1000)));
        report.final_balance = Some(dec!(1150));
        report.games_played = 5;
        assert_eq!(
            report.summary_line(),
            "acct | start 1000 | end 1150 | net +150 | games 5 | quota_reached"
        );
    }

    #[test]
    fn outcome_delta() {
        let record = OutcomeRecord {
            round_id: "ojoCap_1".into(),
            token: "BTC".into(),
            winners: vec!["BTC".into()],
            won: Some(true),
            balance_before: dec!(1000),
            balance_after: Some(dec!(1180)),
        };
        assert_eq!(record.delta(), Some(dec!(180)));
    }

    #[test]
    fn unverified_outcome_has_no_delta() {
        let record = OutcomeRecord::unverified(PendingOutcome {
            round_id: "ojoCap_1".into(),
            token: "ETH".into(),
            balance_before: dec!(800),
            check_at: time::macros::datetime!(2025-06-01 12:01:25 UTC),
        });
        assert_eq!(record.won, None);
        assert!(record.winners.is_empty());
        assert_eq!(record.delta(), None);
    }
}
