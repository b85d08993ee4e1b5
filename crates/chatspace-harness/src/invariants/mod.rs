//! Invariant checking for simulated networks.
//!
//! Invariants are properties that must hold whatever the clients did and in
//! whatever order frames arrived. They are checked against a
//! [`NetworkSnapshot`] taken from a [`crate::SimNetwork`].
//!
//! Two registries are provided:
//!
//! - [`InvariantRegistry::standard()`]: properties that hold at every instant
//! - [`InvariantRegistry::quiescent()`]: the standard set plus convergence,
//!   which only holds once the network has settled (every client has sent a
//!   heartbeat and every pending clear has fired)
//!
//! # Usage
//!
//! ```ignore
//! net.settle();
//! InvariantRegistry::quiescent().check_all(&NetworkSnapshot::of(&net))?;
//! ```

mod checks;
mod snapshot;

pub use checks::{KnownSenders, NoSelfPresence, PresenceConvergence, SocketMatchesRoom};
pub use snapshot::{ClientSnapshot, NetworkSnapshot, RecordSnapshot};

/// Outcome of one invariant check.
pub type InvariantResult = Result<(), Violation>;

/// A broken invariant and the clients involved.
#[derive(Debug, Clone)]
pub struct Violation {
    /// Which invariant broke.
    pub invariant: &'static str,
    /// Which clients disagree, and how.
    pub message: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.invariant, self.message)
    }
}

impl std::error::Error for Violation {}

/// A property of a [`NetworkSnapshot`].
pub trait Invariant: Send + Sync {
    /// Name used in violation reports.
    fn name(&self) -> &'static str;

    /// Return the first violation found in `state`, if any.
    fn check(&self, state: &NetworkSnapshot) -> InvariantResult;
}

/// Set of invariants checked together.
pub struct InvariantRegistry {
    invariants: Vec<Box<dyn Invariant>>,
}

impl Default for InvariantRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InvariantRegistry {
    /// Registry with no invariants.
    pub fn new() -> Self {
        Self { invariants: Vec::new() }
    }

    /// Invariants that hold at every instant.
    ///
    /// Includes:
    /// - [`NoSelfPresence`]: a client never shows its own session
    /// - [`KnownSenders`]: every record belongs to a real session
    /// - [`SocketMatchesRoom`]: online clients sit in their room's channel
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.add(NoSelfPresence);
        registry.add(KnownSenders);
        registry.add(SocketMatchesRoom);
        registry
    }

    /// Standard invariants plus [`PresenceConvergence`].
    pub fn quiescent() -> Self {
        let mut registry = Self::standard();
        registry.add(PresenceConvergence);
        registry
    }

    /// Register `invariant`.
    pub fn add<I: Invariant + 'static>(&mut self, invariant: I) {
        self.invariants.push(Box::new(invariant));
    }

    /// Run every invariant against `state`, collecting all violations.
    pub fn check_all(&self, state: &NetworkSnapshot) -> Result<(), Vec<Violation>> {
        let violations: Vec<Violation> = self
            .invariants
            .iter()
            .filter_map(|invariant| invariant.check(state).err())
            .collect();

        if violations.is_empty() { Ok(()) } else { Err(violations) }
    }

    /// Like [`InvariantRegistry::check_all`], but panics listing every
    /// violation. For tests.
    #[allow(clippy::panic, reason = "test assertion helper")]
    pub fn assert_all(&self, state: &NetworkSnapshot, context: &str) {
        let Err(violations) = self.check_all(state) else {
            return;
        };
        let report = violations.iter().map(ToString::to_string).collect::<Vec<_>>().join("\n  ");
        panic!("{} invariant(s) broken {context}:\n  {report}", violations.len());
    }

    /// Number of registered invariants.
    pub fn len(&self) -> usize {
        self.invariants.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.invariants.is_empty()
    }
}
