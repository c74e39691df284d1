//! listprobe: end-to-end acceptance harness for a realtime todo list.
//!
//! Drives one or more isolated browser sessions against a single running
//! instance of the collaborative todo application, manipulates the list the
//! way a person would, and checks that every session converges on the state
//! the server pushes.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                       LISTPROBE Architecture                       │
//! ├───────────────────────────────────────────────────────────────────┤
//! │  ServerHandle ◄── one per run                                      │
//! │                                                                    │
//! │  ScenarioRunner ──launch──► SessionProvider ──► SessionDriver (×N) │
//! │        │                                             ▲             │
//! │        ▼                                             │             │
//! │    Scenario ──► TodoPage ──(LocatorMap)──────────────┘             │
//! │                    │                                               │
//! │                    └──► wait_until (bounded polling)               │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use listprobe::prelude::*;
//!
//! # async fn demo() -> ProbeResult<()> {
//! let app = MockListServer::new();
//! let runner = ScenarioRunner::new(app, HarnessConfig::default());
//! let suite = runner.run_all(&Scenario::ALL).await;
//! assert!(suite.all_passed());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
// Lints are configured in workspace Cargo.toml [workspace.lints.clippy]

/// Chromium sessions (feature `browser`)
#[cfg(feature = "browser")]
#[allow(clippy::missing_errors_doc)]
pub mod browser;
pub mod config;
/// Session driver abstraction
pub mod driver;
pub mod harness;
pub mod locator;
/// In-memory todo application
pub mod mock;
pub mod page_object;
mod result;
pub mod scenario;
pub mod server;
pub mod tracing_support;
pub mod wait;

#[cfg(feature = "browser")]
pub use browser::{ChromiumProvider, ChromiumSession};
pub use config::HarnessConfig;
pub use driver::{ElementHandle, SessionDriver, SessionOptions, SessionProvider};
pub use harness::{ScenarioReport, ScenarioRunner, SuiteReport};
pub use locator::{LocatorMap, Role, Selector};
pub use mock::{MockDriver, MockListServer};
pub use page_object::{Item, TodoPage};
pub use result::{ensure, ProbeError, ProbeResult};
pub use scenario::{Scenario, ScenarioPhase};
pub use server::{Endpoint, ServerConfig, ServerHandle, ServerState};
pub use tracing_support::init_tracing;
pub use wait::{wait_until, Satisfied, WaitOptions};

/// Prelude for convenient imports
pub mod prelude {
    #[cfg(feature = "browser")]
    pub use super::browser::*;
    pub use super::config::*;
    pub use super::driver::*;
    pub use super::harness::*;
    pub use super::locator::*;
    pub use super::mock::*;
    pub use super::page_object::*;
    pub use super::result::*;
    pub use super::scenario::*;
    pub use super::server::*;
    pub use super::tracing_support::*;
    pub use super::wait::*;
}
