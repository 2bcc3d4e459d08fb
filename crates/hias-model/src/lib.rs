//! # hias-model
//!
//! The model facade the agent drives. The coordinator only sees the
//! [`ModelFacade`] lifecycle (`prepare_data`, `prepare_network`, `train`,
//! `evaluate`, `load`, `test`, `test_http`) plus `classify` for serving; model
//! variants are built by a [`ModelFactory`] keyed by [`ModelKind`].

pub mod dataset;
pub mod facade;
pub mod mock;
pub mod registry;
pub mod xdnn;

pub use facade::{ModelFacade, ModelKind};
pub use mock::MockModel;
pub use registry::{ModelFactory, ModelRegistry};
pub use xdnn::XdnnModel;
