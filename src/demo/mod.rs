//! Demo wiring: the standard policy registry and the scenarios that
//! exercise it against the demo server.
//!
//! # Data Flow
//! ```text
//! EngineConfig
//!     → policies.rs (named policies, shared instances)
//!     → scenarios.rs (pipeline per scenario, HTTP calls, report)
//! ```

pub mod policies;
pub mod scenarios;

pub use policies::{client_pipeline, standard_registry};
pub use scenarios::{Scenario, ScenarioError, ScenarioReport, ScenarioRunner};
