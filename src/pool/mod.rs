//! Bounded-concurrency runner for one job per credential.
//!
//! Jobs are admitted through a semaphore and tracked in a `JoinSet`. A job
//! that panics is reported on its own; it never takes siblings down.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use rust_decimal::Decimal;
use tokio::sync::Semaphore;
use tokio::task::{Id, JoinError, JoinSet};
use tracing::{error, info};

use crate::config::Config;
use crate::platform::{Credential, GamePlatform};
use crate::session::{SessionReport, SessionRunner, SessionSettings, StopReason};
use crate::strategy::TokenSelector;
use crate::timing::Clock;

/// How one pooled job ended.
#[derive(Debug)]
pub struct JobResult<T> {
    /// Position of the credential in the input list.
    pub index: usize,
    /// Credential fingerprint.
    pub account: String,
    /// Job output, or the panic message.
    pub outcome: Result<T, String>,
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "session panicked".to_string()
    }
}

/// Run `job` once per credential, at most `limit` at a time.
///
/// Results come back in completion order.
pub async fn run_all<T, F, Fut>(credentials: Vec<Credential>, limit: usize, job: F) -> Vec<JobResult<T>>
where
    T: Send + 'static,
    F: Fn(Credential) -> Fut,
    Fut: Future<Output = T> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(limit.max(1)));
    let mut tasks = JoinSet::new();
    let mut launched: HashMap<Id, (usize, String)> = HashMap::new();

    for (index, credential) in credentials.into_iter().enumerate() {
        let semaphore = Arc::clone(&semaphore);
        let account = credential.fingerprint();
        let work = job(credential);
        let task_account = account.clone();

        let handle = tasks.spawn(async move {
            // The semaphore is never closed, so a permit always arrives.
            let _permit = semaphore.acquire_owned().await.ok();
            let outcome = AssertUnwindSafe(work)
                .catch_unwind()
                .await
                .map_err(|payload| panic_message(&*payload));
            JobResult {
                index,
                account: task_account,
                outcome,
            }
        });
        launched.insert(handle.id(), (index, account));
    }

    let mut results = Vec::with_capacity(tasks.len());
    while let Some(joined) = tasks.join_next_with_id().await {
        if let Some(result) = collect_joined(joined, &mut launched) {
            if let Err(message) = &result.outcome {
                error!(account = %result.account, error = %message, "Session aborted");
            }
            results.push(result);
        }
    }
    results
}

/// Turn a joined task into its result, even when the task itself failed.
fn collect_joined<T>(
    joined: std::result::Result<(Id, JobResult<T>), JoinError>,
    launched: &mut HashMap<Id, (usize, String)>,
) -> Option<JobResult<T>> {
    match joined {
        Ok((id, result)) => {
            launched.remove(&id);
            Some(result)
        }
        Err(e) => {
            let Some((index, account)) = launched.remove(&e.id()) else {
                error!(error = %e, "Pool task failed to join");
                return None;
            };
            Some(JobResult {
                index,
                account,
                outcome: Err(e.to_string()),
            })
        }
    }
}

/// Run one betting session per credential and collect every report.
pub async fn run_sessions<P, S, G>(
    credentials: Vec<Credential>,
    config: &Config,
    platform: Arc<P>,
    preferred: Arc<Vec<String>>,
    clock: Arc<dyn Clock>,
    make_selector: G,
) -> Vec<SessionReport>
where
    P: GamePlatform + 'static,
    S: TokenSelector + 'static,
    G: Fn() -> S,
{
    let settings = SessionSettings::from(config);
    info!(
        accounts = credentials.len(),
        threads = config.threads,
        "Launching sessions"
    );

    let results = run_all(credentials, config.threads, |credential| {
        SessionRunner::new(
            credential,
            Arc::clone(&platform),
            make_selector(),
            Arc::clone(&preferred),
            Arc::clone(&clock),
            settings.clone(),
        )
        .run()
    })
    .await;

    let mut reports: Vec<(usize, SessionReport)> = results
        .into_iter()
        .map(|result| {
            let report = result.outcome.unwrap_or_else(|message| {
                SessionReport::aborted(result.account, StopReason::Failed(message), None)
            });
            (result.index, report)
        })
        .collect();
    reports.sort_by_key(|(index, _)| *index);
    reports.into_iter().map(|(_, report)| report).collect()
}

/// Totals across all accounts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolTotals {
    /// Accounts that ran.
    pub accounts: usize,
    /// Accepted bets over all accounts.
    pub games_played: u32,
    /// Sum of per-account net results.
    pub net: Decimal,
}

impl PoolTotals {
    /// Aggregate a set of reports.
    pub fn from_reports(reports: &[SessionReport]) -> Self {
        reports.iter().fold(Self::default(), |mut totals, report| {
            totals.accounts += 1;
            totals.games_played += report.games_played;
            totals.net += report.net();
            totals
        })
    }
}
