//! # hias-runtime
//!
//! The agent lifecycle coordinator. One [`Agent`] is built at process entry
//! with its collaborators injected, selects a [`Mode`] and drives the model
//! and the messaging channel through it.
//!
//! ```text
//!   train          connect ─▶ prepare_data ─▶ prepare_network ─▶ train ─▶ evaluate
//!   classify       load ─▶ test
//!   server         connect ─▶ load ─▶ inference server (until signal)
//!   classify_http  test_http
//! ```
//!
//! A termination signal at any point logs `Disconnecting`, releases the
//! channel and ends the run with [`RunOutcome::Signalled`].

pub mod agent;
pub mod commands;
pub mod frontend;
pub mod mode;
pub mod shutdown;

pub use agent::{Agent, RunError, RunOutcome};
pub use commands::AgentCommand;
pub use frontend::InferenceFrontend;
pub use mode::{Mode, UsageError};
pub use shutdown::{ShutdownManager, ShutdownReason};
