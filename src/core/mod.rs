//! Core request engine: model resolution, budgeting, retries, and the
//! per-invocation pipeline.

pub mod budget;
pub mod fingerprint;
pub mod logging;
pub mod model_ref;
pub mod orchestrator;
pub mod pricing;
pub mod prompt;
pub mod provider;
pub mod retry;

pub use model_ref::ModelReference;
pub use provider::Provider;
