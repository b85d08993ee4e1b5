//! Chatspace core.
//!
//! Shared building blocks for the chatspace protocol state machines.
//!
//! # Architecture
//!
//! Every protocol component in the workspace is written Sans-IO: it receives
//! events, updates owned state and returns actions for a driver to execute.
//! Nothing in a state machine reads the clock, sleeps or draws entropy on its
//! own. Those resources come from an [`env::Environment`], and delayed work
//! is expressed through a [`timer::Scheduler`] that the driver advances by
//! passing the current time.
//!
//! This keeps every state machine deterministic under a virtual clock and a
//! seeded RNG, which is what the simulation harness relies on.
//!
//! # Components
//!
//! - [`env::Environment`]: time and randomness provider
//! - [`env::VirtualInstant`]: instant type for simulated timelines
//! - [`env::test_utils::MockEnv`]: deterministic environment for tests
//! - [`timer::Scheduler`]: cancellable tasks keyed by deadline
//! - [`log::LogLevel`]: severity attached to `Log` actions

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod env;
pub mod log;
pub mod timer;

pub use env::{Environment, VirtualInstant};
pub use log::LogLevel;
pub use timer::{Scheduler, TaskId};
