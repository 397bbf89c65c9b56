//! One account's betting session.
//!
//! The betting loop and the verification loop run concurrently inside the
//! session's task. They share nothing but an mpsc channel of
//! [`PendingOutcome`]s: the betting loop owns the sender and drops it when it
//! stops, and the verifier drains the channel to completion.

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

use super::report::{OutcomeRecord, PendingOutcome, SessionReport, SessionState, StopReason};
use crate::config::Config;
use crate::error::PlatformError;
use crate::metrics;
use crate::platform::{BetReceipt, Credential, GamePlatform};
use crate::strategy::TokenSelector;
use crate::timing::{self, Clock};

/// Ranks counted as winners when results come in.
pub const WINNING_RANKS: u32 = 3;

/// Per-session knobs, taken from [`Config`].
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    /// Accepted bets before stopping.
    pub max_games: u32,
    /// Stake per bet.
    pub stake: Decimal,
    /// Second at which rounds open.
    pub round_second: u8,
    /// Second in the following minute at which results are checked.
    pub verify_second: u8,
    /// Random delay after the boundary, in seconds (inclusive range).
    pub jitter_s: (u64, u64),
    /// Pause after a skipped round.
    pub skip_pause: Duration,
}

impl From<&Config> for SessionSettings {
    fn from(config: &Config) -> Self {
        Self {
            max_games: config.max_games,
            stake: config.bet_amount,
            round_second: config.round_second,
            verify_second: config.verify_second,
            jitter_s: (config.jitter_min_s, config.jitter_max_s),
            skip_pause: config.skip_pause(),
        }
    }
}

/// Counters kept by the betting loop.
#[derive(Debug, Clone, PartialEq)]
struct BettingSummary {
    games_played: u32,
    attempts: u32,
    rejected: u32,
    skipped: u32,
    last_balance: Decimal,
    stop_reason: StopReason,
}

/// Drives one credential from `Init` to `Stopped`.
pub struct SessionRunner<P, S> {
    credential: Credential,
    platform: Arc<P>,
    selector: S,
    preferred: Arc<Vec<String>>,
    clock: Arc<dyn Clock>,
    settings: SessionSettings,
    jitter_rng: StdRng,
    state: SessionState,
}

impl<P, S> SessionRunner<P, S>
where
    P: GamePlatform + 'static,
    S: TokenSelector,
{
    /// Create a runner for `credential`.
    pub fn new(
        credential: Credential,
        platform: Arc<P>,
        selector: S,
        preferred: Arc<Vec<String>>,
        clock: Arc<dyn Clock>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            credential,
            platform,
            selector,
            preferred,
            clock,
            settings,
            jitter_rng: StdRng::from_entropy(),
            state: SessionState::Init,
        }
    }

    fn transition(&mut self, next: SessionState) {
        debug!(account = %self.credential, from = %self.state, to = %next, "Session state change");
        self.state = next;
    }

    /// Run the session to completion.
    #[instrument(skip(self), fields(account = %self.credential))]
    pub async fn run(mut self) -> SessionReport {
        let account = self.credential.fingerprint();
        let stake = self.settings.stake;
        info!(max_games = self.settings.max_games, stake = %stake, "Starting session");

        let initial = match self.platform.balance(&self.credential).await {
            Ok(balance) => balance,
            Err(e) => {
                warn!(error = %e, "Could not read starting balance, skipping account");
                return self.finish(SessionReport::aborted(account, StopReason::from_balance_error(&e), None));
            }
        };
        info!(balance = %initial, "Current balance");

        if initial < stake {
            warn!(balance = %initial, stake = %stake, "Balance below stake, skipping account");
            return self.finish(SessionReport::aborted(
                account,
                StopReason::InsufficientBalance,
                Some(initial),
            ));
        }

        self.transition(SessionState::Betting);
        let (tx, rx) = mpsc::unbounded_channel();
        let verifier = verify_outcomes(
            Arc::clone(&self.platform),
            self.credential.clone(),
            Arc::clone(&self.clock),
            rx,
        );
        let (mut summary, verification) = tokio::join!(self.bet_rounds(initial, tx), verifier);
        if verification.unauthorized && summary.stop_reason != StopReason::Unauthorized {
            warn!(stop_reason = %summary.stop_reason, "Credential rejected during verification");
            summary.stop_reason = StopReason::Unauthorized;
        }

        self.transition(SessionState::Stopped);
        let final_balance = match self.platform.balance(&self.credential).await {
            Ok(balance) => balance,
            Err(e) => {
                warn!(error = %e, "Final balance unavailable, using last known");
                summary.last_balance
            }
        };

        let report = SessionReport {
            account,
            state: SessionState::Stopped,
            stop_reason: summary.stop_reason,
            initial_balance: Some(initial),
            final_balance: Some(final_balance),
            games_played: summary.games_played,
            attempts: summary.attempts,
            rejected: summary.rejected,
            skipped: summary.skipped,
            outcomes: verification.records,
        };
        self.finish(report)
    }

    fn finish(&mut self, report: SessionReport) -> SessionReport {
        self.state = SessionState::Stopped;
        metrics::inc_sessions_finished(report.stop_reason.label());
        info!(
            games_played = report.games_played,
            stop_reason = %report.stop_reason,
            "Session finished: {}",
            report.summary_line()
        );
        report
    }

    fn jitter(&mut self) -> Duration {
        let (min, max) = self.settings.jitter_s;
        Duration::from_secs(self.jitter_rng.gen_range(min..=max.max(min)))
    }

    /// Betting loop; drops `pending` on exit, which ends the verifier.
    async fn bet_rounds(
        &mut self,
        initial: Decimal,
        pending: mpsc::UnboundedSender<PendingOutcome>,
    ) -> BettingSummary {
        let mut summary = BettingSummary {
            games_played: 0,
            attempts: 0,
            rejected: 0,
            skipped: 0,
            last_balance: initial,
            stop_reason: StopReason::QuotaReached,
        };
        let mut last_round: Option<String> = None;

        while summary.games_played < self.settings.max_games {
            let now = self.clock.now();
            let boundary = match timing::next_boundary(now, self.settings.round_second) {
                Ok(boundary) => boundary,
                Err(e) => {
                    summary.stop_reason = StopReason::Failed(e.to_string());
                    break;
                }
            };
            let round = timing::round_id(boundary);

            if last_round.as_deref() == Some(round.as_str()) {
                sleep(timing::until(now, boundary)).await;
                continue;
            }

            let wait = timing::until(now, boundary) + self.jitter();
            debug!(round = %round, wait_ms = wait.as_millis() as u64, "Waiting for round");
            sleep(wait).await;

            let tokens = match self.platform.round_config(&self.credential, &round).await {
                Ok(config) if !config.tokens.is_empty() => config.tokens,
                Ok(_) => {
                    warn!(round = %round, "No available tokens for betting");
                    self.skip_round(&mut summary).await;
                    continue;
                }
                Err(e) if e.is_auth() => {
                    summary.stop_reason = StopReason::Unauthorized;
                    break;
                }
                Err(e) => {
                    warn!(round = %round, error = %e, "Failed to load round config");
                    self.skip_round(&mut summary).await;
                    continue;
                }
            };
            debug!(round = %round, tokens = %tokens.join(", "), "Available tokens");

            let Some(token) = self.selector.select_token(&tokens, &self.preferred) else {
                self.skip_round(&mut summary).await;
                continue;
            };
            info!(round = %round, token = %token, "Selected token");

            let before = match self.platform.balance(&self.credential).await {
                Ok(balance) => balance,
                Err(e) => {
                    warn!(error = %e, "Balance check before bet failed, stopping");
                    summary.stop_reason = StopReason::from_balance_error(&e);
                    break;
                }
            };
            summary.last_balance = before;
            if before < self.settings.stake {
                warn!(balance = %before, stake = %self.settings.stake, "Balance below stake, stopping");
                summary.stop_reason = StopReason::InsufficientBalance;
                break;
            }

            last_round = Some(round.clone());
            summary.attempts += 1;

            match self.submit(&round, &token).await {
                Ok(receipt) if receipt.success => {
                    summary.games_played += 1;
                    metrics::inc_bets_placed();
                    info!(
                        round = %round,
                        token = %token,
                        games_played = summary.games_played,
                        "Bet placed successfully"
                    );
                    match timing::verification_time(boundary, self.settings.verify_second) {
                        Ok(check_at) => {
                            // Receiver only closes if the verifier panicked.
                            let _ = pending.send(PendingOutcome {
                                round_id: round.clone(),
                                token: token.clone(),
                                balance_before: before,
                                check_at,
                            });
                        }
                        Err(e) => warn!(error = %e, "Cannot schedule verification"),
                    }
                }
                Ok(receipt) => {
                    summary.rejected += 1;
                    metrics::inc_bets_rejected(receipt.reason());
                    warn!(round = %round, token = %token, reason = %receipt.reason(), "Bet failed");
                }
                Err(e) if e.is_auth() => {
                    summary.stop_reason = StopReason::Unauthorized;
                    break;
                }
                Err(e) => {
                    summary.skipped += 1;
                    metrics::inc_rounds_skipped();
                    warn!(round = %round, error = %e, "Bet submission failed");
                }
            }

            match self.platform.balance(&self.credential).await {
                Ok(after) => {
                    let diff = after - before;
                    info!(before = %before, after = %after, diff = %diff, "Balance after bet");
                    summary.last_balance = after;
                    if after < self.settings.stake {
                        warn!(balance = %after, stake = %self.settings.stake, "Balance below stake, stopping");
                        summary.stop_reason = StopReason::InsufficientBalance;
                        break;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Balance check failed mid-session, stopping");
                    summary.stop_reason = StopReason::from_balance_error(&e);
                    break;
                }
            }
        }

        if summary.stop_reason == StopReason::QuotaReached {
            info!(games_played = summary.games_played, "All bets completed");
        }
        self.transition(SessionState::Verifying);
        summary
    }

    async fn skip_round(&mut self, summary: &mut BettingSummary) {
        summary.skipped += 1;
        metrics::inc_rounds_skipped();
        sleep(self.settings.skip_pause).await;
    }

    async fn submit(&self, round: &str, token: &str) -> Result<BetReceipt, PlatformError> {
        let bet_id = self.platform.bet_id(&self.credential, round).await?;
        debug!(round = %round, bet_id = %bet_id, "Acquired bet id");
        self.platform
            .place_bet(&self.credential, round, &bet_id, token, self.settings.stake)
            .await
    }
}

/// What the verifier hands back when the channel closes.
struct Verification {
    records: Vec<OutcomeRecord>,
    unauthorized: bool,
}

/// Verification loop: check each pending bet once its results are due.
///
/// After the credential is rejected, remaining bets are recorded unverified
/// without further calls.
async fn verify_outcomes<P: GamePlatform>(
    platform: Arc<P>,
    credential: Credential,
    clock: Arc<dyn Clock>,
    mut pending: mpsc::UnboundedReceiver<PendingOutcome>,
) -> Verification {
    let mut records = Vec::new();
    let mut unauthorized = false;

    while let Some(outcome) = pending.recv().await {
        if unauthorized {
            records.push(OutcomeRecord::unverified(outcome));
            continue;
        }
        sleep(timing::until(clock.now(), outcome.check_at)).await;
        let (record, rejected) = verify_one(platform.as_ref(), &credential, outcome, clock.now()).await;
        unauthorized = rejected;
        records.push(record);
    }

    Verification {
        records,
        unauthorized,
    }
}

/// Check one bet; the flag reports a rejected credential.
async fn verify_one<P: GamePlatform>(
    platform: &P,
    credential: &Credential,
    outcome: PendingOutcome,
    checked_at: OffsetDateTime,
) -> (OutcomeRecord, bool) {
    metrics::inc_outcomes_verified();

    let (winners, won) = match platform.round_result(credential, &outcome.round_id).await {
        Ok(result) => {
            let winners: Vec<String> = result
                .winners(WINNING_RANKS)
                .into_iter()
                .map(|entry| entry.token.clone())
                .collect();
            let won = result.placed(&outcome.token, WINNING_RANKS);
            info!(
                account = %credential,
                round = %outcome.round_id,
                winners = %winners.join(", "),
                token = %outcome.token,
                won,
                "Round results"
            );
            (winners, Some(won))
        }
        Err(e) if e.is_auth() => {
            error!(account = %credential, round = %outcome.round_id, error = %e, "Credential rejected while checking results");
            return (OutcomeRecord::unverified(outcome), true);
        }
        Err(e) => {
            warn!(account = %credential, round = %outcome.round_id, error = %e, "Round results unavailable");
            (Vec::new(), None)
        }
    };

    let (balance_after, rejected) = match platform.balance(credential).await {
        Ok(balance) => {
            info!(
                account = %credential,
                round = %outcome.round_id,
                before = %outcome.balance_before,
                after = %balance,
                diff = %(balance - outcome.balance_before),
                checked_at = %checked_at,
                "Outcome balance"
            );
            (Some(balance), false)
        }
        Err(e) => {
            if e.is_auth() {
                error!(account = %credential, error = %e, "Credential rejected while reading outcome balance");
            } else {
                warn!(account = %credential, error = %e, "Outcome balance unavailable");
            }
            (None, e.is_auth())
        }
    };

    let record = OutcomeRecord {
        round_id: outcome.round_id,
        token: outcome.token,
        winners,
        won,
        balance_before: outcome.balance_before,
        balance_after,
    };
    (record, rejected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{MockGamePlatform, RankedToken};
    use crate::strategy::PreferredTokenSelector;
    use crate::timing::RuntimeClock;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;
    use time::macros::datetime;

    fn settings(max_games: u32) -> SessionSettings {
        SessionSettings {
            max_games,
            stake: dec!(200),
            round_second: 18,
            verify_second: 25,
            jitter_s: (2, 27),
            skip_pause: Duration::from_secs(10),
        }
    }

    fn runner(
        platform: &Arc<MockGamePlatform>,
        credential: &Credential,
        max_games: u32,
    ) -> SessionRunner<MockGamePlatform, PreferredTokenSelector> {
        runner_with(platform, credential, settings(max_games))
    }

    fn runner_with(
        platform: &Arc<MockGamePlatform>,
        credential: &Credential,
        settings: SessionSettings,
    ) -> SessionRunner<MockGamePlatform, PreferredTokenSelector> {
        let clock = RuntimeClock::starting_at(datetime!(2025-06-01 12:00:05 UTC));
        SessionRunner::new(
            credential.clone(),
            Arc::clone(platform),
            PreferredTokenSelector::seeded(1.0, 5),
            Arc::new(vec!["ETH".to_string()]),
            Arc::new(clock),
            settings,
        )
    }

    fn cred() -> Credential {
        Credential::new("session-test-credential")
    }

    #[tokio::test(start_paused = true)]
    async fn low_starting_balance_places_no_bets() {
        let platform = Arc::new(MockGamePlatform::new(["BTC", "ETH"]));
        platform.set_balance(&cred(), dec!(150));

        let report = runner(&platform, &cred(), 5).run().await;

        assert_eq!(report.stop_reason, StopReason::InsufficientBalance);
        assert_eq!(report.games_played, 0);
        assert_eq!(report.net(), Decimal::ZERO);
        assert!(platform.placed_bets().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn quota_reached_with_one_bet_per_round() {
        let platform = Arc::new(MockGamePlatform::new(["BTC", "ETH", "SOL"]));
        platform.set_balance(&cred(), dec!(5000));
        platform.set_results(vec![
            RankedToken { token: "ETH".into(), rank: 1 },
            RankedToken { token: "BTC".into(), rank: 2 },
            RankedToken { token: "SOL".into(), rank: 3 },
        ]);

        let report = runner(&platform, &cred(), 3).run().await;

        assert_eq!(report.stop_reason, StopReason::QuotaReached);
        assert_eq!(report.state, SessionState::Stopped);
        assert_eq!(report.games_played, 3);
        assert_eq!(report.attempts, 3);
        assert_eq!(report.initial_balance, Some(dec!(5000)));
        assert_eq!(report.final_balance, Some(dec!(4400)));
        assert_eq!(report.net(), dec!(-600));

        let bets = platform.placed_bets();
        assert_eq!(bets.len(), 3);
        assert!(bets.iter().all(|b| b.token == "ETH"));
        let mut rounds: Vec<&str> = bets.iter().map(|b| b.round_id.as_str()).collect();
        rounds.dedup();
        assert_eq!(rounds.len(), 3, "one bet per round");

        assert_eq!(report.outcomes.len(), 3);
        assert!(report.outcomes.iter().all(|o| o.won == Some(true)));
        assert_eq!(report.outcomes[0].winners, vec!["ETH", "BTC", "SOL"]);
    }

    #[tokio::test(start_paused = true)]
    async fn balance_exhaustion_stops_before_quota() {
        let platform = Arc::new(MockGamePlatform::new(["BTC", "ETH"]));
        platform.set_balance(&cred(), dec!(700));
        platform.reject_next_bets(["bet.closed"]);

        let report = runner(&platform, &cred(), 5).run().await;

        // 700 -> rejected -> 500 -> 300 -> 100 < 200
        assert_eq!(report.stop_reason, StopReason::InsufficientBalance);
        assert_eq!(report.games_played, 3);
        assert_eq!(report.attempts, 4);
        assert_eq!(report.rejected, 1);
        assert_eq!(report.final_balance, Some(dec!(100)));
        assert_eq!(
            platform.placed_bets().iter().filter(|b| b.accepted).count() as u32,
            report.games_played
        );
    }

    #[tokio::test(start_paused = true)]
    async fn config_outage_skips_without_counting() {
        let platform = Arc::new(MockGamePlatform::new(["BTC"]));
        platform.set_balance(&cred(), dec!(1000));
        platform.fail_round_configs(2);

        let report = runner(&platform, &cred(), 2).run().await;

        assert_eq!(report.stop_reason, StopReason::QuotaReached);
        assert_eq!(report.games_played, 2);
        assert_eq!(report.skipped, 2);
        assert_eq!(platform.placed_bets().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn unreadable_starting_balance_aborts() {
        let platform = Arc::new(MockGamePlatform::new(["BTC"]));
        platform.set_balance(&cred(), dec!(1000));
        platform.fail_balance_after(&cred(), 0);

        let report = runner(&platform, &cred(), 2).run().await;

        assert!(matches!(report.stop_reason, StopReason::BalanceUnavailable(_)));
        assert_eq!(report.initial_balance, None);
        assert_eq!(report.net(), Decimal::ZERO);
        assert!(platform.placed_bets().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn mid_session_balance_failure_is_fatal() {
        let platform = Arc::new(MockGamePlatform::new(["BTC"]));
        platform.set_balance(&cred(), dec!(1000));
        // start and pre-bet reads succeed, the post-bet read fails
        platform.fail_balance_after(&cred(), 2);

        let report = runner(&platform, &cred(), 5).run().await;

        assert!(matches!(report.stop_reason, StopReason::BalanceUnavailable(_)));
        assert_eq!(report.games_played, 1);
        // final read fails too, so the last known balance is reported
        assert_eq!(report.final_balance, Some(dec!(1000)));
        assert_eq!(report.outcomes.len(), 1);
        assert_eq!(report.outcomes[0].balance_after, None);
    }

    #[tokio::test(start_paused = true)]
    async fn revoked_credential_stops_session() {
        let platform = Arc::new(MockGamePlatform::new(["BTC"]));
        platform.set_balance(&cred(), dec!(1000));
        platform.revoke(&cred());

        let report = runner(&platform, &cred(), 5).run().await;

        assert_eq!(report.stop_reason, StopReason::Unauthorized);
        assert_eq!(report.games_played, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn balance_snapshot_is_taken_at_bet_time() {
        let platform = Arc::new(MockGamePlatform::new(["ETH"]));
        platform.set_balance(&cred(), dec!(1000));
        platform.pay_on_results(dec!(1000));

        // bets at :28, results at :25 of the next minute, so round 1 pays
        // out before round 2 is placed
        let fixed_jitter = SessionSettings {
            jitter_s: (10, 10),
            ..settings(2)
        };
        let report = runner_with(&platform, &cred(), fixed_jitter).run().await;

        assert_eq!(report.games_played, 2);
        assert_eq!(report.outcomes.len(), 2);
        assert_eq!(report.outcomes[0].balance_before, dec!(1000));
        assert_eq!(report.outcomes[0].balance_after, Some(dec!(1800)));
        assert_eq!(report.outcomes[1].balance_before, dec!(1800));
        assert_eq!(report.outcomes[1].balance_after, Some(dec!(2600)));
        assert!(report.outcomes.iter().all(|o| o.delta() == Some(dec!(800))));
        assert_eq!(report.final_balance, Some(dec!(2600)));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_round_is_skipped_without_betting() {
        let platform = Arc::new(MockGamePlatform::new(["BTC", "ETH"]));
        platform.set_balance(&cred(), dec!(1000));
        platform.empty_round_configs(2);

        let report = runner(&platform, &cred(), 2).run().await;

        assert_eq!(report.stop_reason, StopReason::QuotaReached);
        assert_eq!(report.skipped, 2);
        assert_eq!(report.games_played, 2);
        assert_eq!(report.attempts, 2);
        assert_eq!(platform.placed_bets().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn rejection_while_verifying_ends_session_unauthorized() {
        let platform = Arc::new(MockGamePlatform::new(["BTC"]));
        platform.set_balance(&cred(), dec!(1000));
        platform.revoke_on_results(&cred());

        let report = runner(&platform, &cred(), 1).run().await;

        assert_eq!(report.stop_reason, StopReason::Unauthorized);
        assert_eq!(report.games_played, 1);
        assert_eq!(report.outcomes.len(), 1);
        assert_eq!(report.outcomes[0].won, None);
        assert_eq!(report.outcomes[0].balance_after, None);
        // final read is rejected too; last known balance is reported
        assert_eq!(report.final_balance, Some(dec!(800)));
    }

    #[test]
    fn settings_from_config() {
        let config = Config::default();
        let settings = SessionSettings::from(&config);
        assert_eq!(settings.max_games, 5);
        assert_eq!(settings.stake, dec!(200));
        assert_eq!(settings.jitter_s, (2, 27));
        assert_eq!(settings.skip_pause, Duration::from_secs(10));
    }
}
