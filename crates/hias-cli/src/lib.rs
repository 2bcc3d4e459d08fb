//! # hias-cli
//!
//! Command-line front-end for the HIAS agent.
//!
//! ```text
//! hias-agent [--config PATH] [--log-level L] [-v|-q] <mode>
//! ```
//!
//! `<mode>` is one of `train`, `classify`, `server` or `classify_http`, and
//! must also appear in `agent.params`. Exit codes: `0` success, `1` fatal
//! error or termination signal, `2` usage error.

pub mod cli;
pub mod logging;

pub use cli::Cli;
