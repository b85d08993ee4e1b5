//! Deterministic simulation harness for chatspace.
//!
//! Runs real [`chatspace_client::Client`] state machines against a real
//! [`chatspace_server::RelayDriver`] on a virtual clock with a seeded RNG.
//! No sockets or threads are involved: a [`SimNetwork`] moves frames between
//! the state machines itself, so a run replays exactly from its seed.
//!
//! # Invariant Testing
//!
//! The `invariants` module checks behavioral properties against a
//! [`NetworkSnapshot`]. Use [`InvariantRegistry::standard()`] at any point of
//! a run and [`InvariantRegistry::quiescent()`] after [`SimNetwork::settle`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod invariants;
pub mod sim_env;
pub mod sim_network;

pub use invariants::{
    ClientSnapshot, Invariant, InvariantRegistry, InvariantResult, KnownSenders, NetworkSnapshot,
    NoSelfPresence, PresenceConvergence, RecordSnapshot, SocketMatchesRoom, Violation,
};
pub use sim_env::SimEnv;
pub use sim_network::{PeerId, SimNetwork, TICK_STEP};
