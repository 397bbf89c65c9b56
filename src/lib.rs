//! Multi-account bettor for the Ojo battle game.
//!
//! Each account runs a session that bets once per minute-long round on one
//! of the tokens the round offers, until a games quota is met or the balance
//! runs short. Results are checked after each round closes.
//!
//! # Round timing
//!
//! Rounds open on minute boundaries at a fixed second offset and are named
//! after the boundary's epoch milliseconds:
//!
//! ```text
//! now:       12:00:05
//! boundary:  12:00:18  -> ojoCap_1748779218000
//! results:   12:01:25
//! ```
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from environment
//! - [`error`]: Unified error types
//! - [`credentials`]: Credential and preference list inputs
//! - [`timing`]: Round boundaries and identifiers
//! - [`platform`]: Game API client, retry policy and mock
//! - [`strategy`]: Token selection
//! - [`session`]: Per-account betting sessions
//! - [`pool`]: Bounded concurrency across accounts
//! - [`metrics`]: Prometheus metrics

pub mod config;
pub mod credentials;
pub mod error;
pub mod metrics;
pub mod platform;
pub mod pool;
pub mod session;
pub mod strategy;
pub mod timing;

pub use config::Config;
pub use error::{BotError, Result};
