//! Integration tests for the Ojo bettor.
//!
//! The session tests run full multi-account sessions against the in-memory
//! platform under paused time. The network test needs a real credential:
//! Run with: OJO_TEST_TOKEN=... cargo test --test integration -- --ignored

use std::sync::Arc;
use std::time::Duration;

use ojo_bettor::config::Config;
use ojo_bettor::platform::{Credential, GameClient, GamePlatform, MockGamePlatform, RankedToken};
use ojo_bettor::pool::{run_sessions, PoolTotals};
use ojo_bettor::session::{SessionState, StopReason};
use ojo_bettor::strategy::PreferredTokenSelector;
use ojo_bettor::timing::{Clock, RuntimeClock};
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use time::macros::datetime;

fn session_config(threads: usize, max_games: u32) -> Config {
    Config {
        threads,
        max_games,
        ..Config::default()
    }
}

fn clock() -> Arc<dyn Clock> {
    Arc::new(RuntimeClock::starting_at(datetime!(2025-06-01 08:30:40 UTC)))
}

fn standings(tokens: &[&str]) -> Vec<RankedToken> {
    tokens
        .iter()
        .enumerate()
        .map(|(i, token)| RankedToken {
            token: token.to_string(),
            rank: i as u32 + 1,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn mixed_accounts_finish_independently() {
    let rich = Credential::new("integration-rich-account");
    let poor = Credential::new("integration-poor-account");
    let revoked = Credential::new("integration-revoked-account");

    let platform = Arc::new(MockGamePlatform::new(["BTC", "ETH", "SOL", "DOGE"]));
    platform.set_balance(&rich, dec!(5000));
    platform.set_balance(&poor, dec!(100));
    platform.set_balance(&revoked, dec!(5000));
    platform.revoke(&revoked);
    platform.set_results(standings(&["SOL", "BTC", "ETH", "DOGE"]));

    let config = session_config(2, 3);
    let reports = run_sessions(
        vec![rich.clone(), poor.clone(), revoked.clone()],
        &config,
        Arc::clone(&platform),
        Arc::new(vec!["SOL".to_string()]),
        clock(),
        || PreferredTokenSelector::seeded(1.0, 42),
    )
    .await;

    assert_eq!(reports.len(), 3);
    assert!(reports.iter().all(|r| r.state == SessionState::Stopped));

    // reports come back in credential order
    assert_eq!(reports[0].account, rich.fingerprint());
    assert_eq!(reports[0].stop_reason, StopReason::QuotaReached);
    assert_eq!(reports[0].games_played, 3);
    assert_eq!(reports[0].net(), dec!(-600));
    assert_eq!(reports[0].outcomes.len(), 3);
    assert!(reports[0].outcomes.iter().all(|o| o.won == Some(true)));

    assert_eq!(reports[1].account, poor.fingerprint());
    assert_eq!(reports[1].stop_reason, StopReason::InsufficientBalance);
    assert_eq!(reports[1].games_played, 0);

    assert_eq!(reports[2].account, revoked.fingerprint());
    assert_eq!(reports[2].stop_reason, StopReason::Unauthorized);
    assert_eq!(reports[2].initial_balance, None);

    let bets = platform.placed_bets();
    assert_eq!(bets.len(), 3);
    assert!(bets.iter().all(|b| b.account == rich.fingerprint() && b.token == "SOL"));

    let totals = PoolTotals::from_reports(&reports);
    assert_eq!(totals.accounts, 3);
    assert_eq!(totals.games_played, 3);
    assert_eq!(totals.net, dec!(-600));
}

#[tokio::test(start_paused = true)]
async fn single_thread_runs_every_account() {
    let credentials: Vec<Credential> = (0..4)
        .map(|i| Credential::new(format!("integration-serial-{:02}", i)))
        .collect();

    let platform = Arc::new(MockGamePlatform::new(["BTC", "ETH"]).with_latency(Duration::from_millis(150)));
    for credential in &credentials {
        platform.set_balance(credential, dec!(1000));
    }

    let reports = run_sessions(
        credentials.clone(),
        &session_config(1, 2),
        Arc::clone(&platform),
        Arc::new(Vec::new()),
        clock(),
        || PreferredTokenSelector::seeded(0.5, 7),
    )
    .await;

    assert_eq!(reports.len(), 4);
    for (report, credential) in reports.iter().zip(&credentials) {
        assert_eq!(report.account, credential.fingerprint());
        assert_eq!(report.stop_reason, StopReason::QuotaReached);
        assert_eq!(report.games_played, 2);
        assert_eq!(report.final_balance, Some(dec!(600)));
        assert_eq!(platform.balance_of(credential), dec!(600));
    }

    // no account ever bets twice in the same round
    let bets = platform.placed_bets();
    for credential in &credentials {
        let mut rounds: Vec<&str> = bets
            .iter()
            .filter(|b| b.account == credential.fingerprint())
            .map(|b| b.round_id.as_str())
            .collect();
        let total = rounds.len();
        rounds.sort_unstable();
        rounds.dedup();
        assert_eq!(rounds.len(), total);
    }
}

#[tokio::test(start_paused = true)]
async fn rejected_bets_do_not_count_toward_quota() {
    let credential = Credential::new("integration-rejected-bets");
    let platform = Arc::new(MockGamePlatform::new(["BTC"]));
    platform.set_balance(&credential, dec!(2000));
    platform.reject_next_bets(["bet.closed", "round.locked"]);

    let reports = run_sessions(
        vec![credential.clone()],
        &session_config(4, 2),
        Arc::clone(&platform),
        Arc::new(Vec::new()),
        clock(),
        || PreferredTokenSelector::seeded(0.0, 1),
    )
    .await;

    let report = &reports[0];
    assert_eq!(report.stop_reason, StopReason::QuotaReached);
    assert_eq!(report.games_played, 2);
    assert_eq!(report.attempts, 4);
    assert_eq!(report.rejected, 2);
    assert_eq!(report.net(), dec!(-400));
}

/// Balance lookup against the live platform.
#[tokio::test]
#[ignore = "requires OJO_TEST_TOKEN"]
async fn test_live_balance() {
    dotenvy::dotenv().ok();
    let Ok(token) = std::env::var("OJO_TEST_TOKEN") else {
        println!("Skipping: OJO_TEST_TOKEN not set");
        return;
    };

    let client = GameClient::new(&Config::default()).expect("client should build");
    let balance = client
        .balance(&Credential::new(token))
        .await
        .expect("balance should be readable");
    println!("Balance: {}", balance);
    assert!(balance >= Decimal::ZERO);
}
