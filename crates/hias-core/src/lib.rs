//! # hias-core
//!
//! Core types and primitives for the HIAS AI agent. This crate defines the
//! shared vocabulary used by every other crate in the workspace: the unified
//! error type, classification results and the reports published to the
//! platform.

pub mod error;
pub mod types;

pub use error::{HiasError, Result};
pub use types::*;
