//! Per-account betting sessions.
//!
//! This module handles:
//! - The session state machine and betting loop
//! - Deferred verification of round results
//! - End-of-run reports

pub mod report;
pub mod runner;

pub use report::{OutcomeRecord, PendingOutcome, SessionReport, SessionState, StopReason};
pub use runner::{SessionRunner, SessionSettings, WINNING_RANKS};
