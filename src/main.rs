//! Ojo battle bettor entry point.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ojo_bettor::config::Config;
use ojo_bettor::credentials::{load_credentials, load_preferred_tokens};
use ojo_bettor::metrics;
use ojo_bettor::platform::{GameClient, GamePlatform};
use ojo_bettor::pool::{run_sessions, PoolTotals};
use ojo_bettor::strategy::PreferredTokenSelector;
use ojo_bettor::timing::{self, SystemClock};

/// Multi-account bettor for the Ojo battle game.
#[derive(Parser, Debug)]
#[command(name = "ojo-bettor")]
#[command(about = "Places one bet per round for every account in the credentials file")]
#[command(version)]
struct Args {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Maximum sessions running at once (overrides THREADS).
    #[arg(long, global = true)]
    threads: Option<usize>,

    /// Successful bets per account (overrides MAX_GAMES).
    #[arg(long, global = true)]
    max_games: Option<u32>,

    /// Credentials file (overrides TOKENS_FILE).
    #[arg(long, global = true)]
    tokens_file: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a session for every account (default).
    Run,

    /// Check configuration and input files.
    CheckConfig,

    /// Print the balance of every account.
    CheckBalance,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::new("ojo_bettor=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    metrics::init_metrics();

    let config = load_config(&args)?;

    match args.command {
        Some(Command::CheckConfig) => cmd_check_config(config),
        Some(Command::CheckBalance) => cmd_check_balance(config).await,
        Some(Command::Run) | None => cmd_run(config).await,
    }
}

/// Load configuration, apply CLI overrides and validate.
fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = Config::load().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    if let Some(threads) = args.threads {
        config.threads = threads;
    }
    if let Some(max_games) = args.max_games {
        config.max_games = max_games;
    }
    if let Some(path) = &args.tokens_file {
        config.tokens_file = path.clone();
    }

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return Err(anyhow::anyhow!("Configuration validation failed: {}", e));
    }
    Ok(config)
}

/// Check configuration validity.
fn cmd_check_config(config: Config) -> anyhow::Result<()> {
    println!("======================================================================");
    println!("OJO BETTOR - CONFIGURATION CHECK");
    println!("======================================================================");

    print!("Loading credentials... ");
    match load_credentials(&config.tokens_file) {
        Ok(credentials) => {
            println!("OK");
            println!("  Accounts: {}", credentials.len());
        }
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Credentials could not be loaded"));
        }
    }

    print!("Loading preference list... ");
    match load_preferred_tokens(config.preferred_tokens_file.as_deref()) {
        Ok(tokens) if tokens.is_empty() => println!("OK (none)"),
        Ok(tokens) => {
            println!("OK");
            println!("  Preferred: {}", tokens.join(", "));
        }
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Preference list could not be loaded"));
        }
    }

    let next = timing::next_boundary_now(config.round_second)?;

    println!("----------------------------------------------------------------------");
    println!("Configuration Summary:");
    println!("  Base URL: {}", config.base_url);
    println!("  Balance URL: {}", config.balance_url);
    println!("  Threads: {}", config.threads);
    println!("  Max Games: {}", config.max_games);
    println!("  Stake: {}", config.bet_amount);
    println!("  Round Second: {}", config.round_second);
    println!("  Verify Second: {}", config.verify_second);
    println!("  Jitter: {}-{}s", config.jitter_min_s, config.jitter_max_s);
    println!("  Prefer Probability: {}", config.prefer_probability);
    println!(
        "  Retries: {} x {}ms ({})",
        config.max_retries,
        config.retry_delay_ms,
        if config.exponential_backoff { "exponential" } else { "fixed" }
    );
    println!("  Next Round: {}", timing::round_id(next));
    println!("======================================================================");
    println!("CONFIGURATION CHECK PASSED");
    println!("======================================================================");

    Ok(())
}

/// Print every account's balance.
async fn cmd_check_balance(config: Config) -> anyhow::Result<()> {
    println!("======================================================================");
    println!("OJO BETTOR - BALANCE CHECK");
    println!("======================================================================");

    let credentials = load_credentials(&config.tokens_file)?;
    let client = GameClient::new(&config)?;

    let mut failures = 0usize;
    for credential in &credentials {
        match client.balance(credential).await {
            Ok(balance) => {
                let note = if balance < config.bet_amount { " (below stake)" } else { "" };
                println!("  {}: {}{}", credential.fingerprint(), balance, note);
            }
            Err(e) => {
                failures += 1;
                println!("  {}: FAILED ({})", credential.fingerprint(), e);
            }
        }
    }

    println!("======================================================================");
    println!(
        "BALANCE CHECK COMPLETED: {} ok, {} failed",
        credentials.len() - failures,
        failures
    );
    println!("======================================================================");
    Ok(())
}

/// Run a session for every account and print the summary.
async fn cmd_run(config: Config) -> anyhow::Result<()> {
    if config.metrics_enabled {
        metrics::install_exporter(config.metrics_port)?;
    }

    let credentials = load_credentials(&config.tokens_file)?;
    let preferred = Arc::new(load_preferred_tokens(config.preferred_tokens_file.as_deref())?);

    info!("Configuration loaded successfully");
    info!("Accounts: {}", credentials.len());
    info!("Threads: {}", config.threads);
    info!("Max games per account: {}", config.max_games);
    info!("Stake: {}", config.bet_amount);
    if !preferred.is_empty() {
        info!("Preferred tokens: {}", preferred.join(", "));
    }

    let platform = Arc::new(GameClient::new(&config)?);
    let clock = Arc::new(SystemClock);
    let probability = config.prefer_probability;

    let reports = tokio::select! {
        reports = run_sessions(
            credentials,
            &config,
            platform,
            preferred,
            clock,
            || PreferredTokenSelector::new(probability),
        ) => reports,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, abandoning running sessions");
            return Ok(());
        }
    };

    println!("======================================================================");
    println!("SESSION SUMMARY");
    println!("======================================================================");
    for report in &reports {
        println!("  {}", report.summary_line());
    }

    let totals = PoolTotals::from_reports(&reports);
    let sign = if totals.net > rust_decimal::Decimal::ZERO { "+" } else { "" };
    println!("----------------------------------------------------------------------");
    println!(
        "  TOTAL | accounts {} | games {} | net {}{}",
        totals.accounts, totals.games_played, sign, totals.net
    );
    println!("======================================================================");

    info!(
        accounts = totals.accounts,
        games_played = totals.games_played,
        net = %totals.net,
        "All sessions finished"
    );
    Ok(())
}
