//! Property-based tests for the task scheduler.
//!
//! These tests verify the invariants the presence and client state machines
//! depend on:
//!
//! 1. **Completeness**: every non-cancelled task fires exactly once
//! 2. **Ordering**: tasks fire in non-decreasing deadline order
//! 3. **Cancellation**: a cancelled task never fires

use std::{collections::HashSet, time::Duration};

use chatspace_core::{Scheduler, VirtualInstant};
use proptest::prelude::*;

fn at(millis: u64) -> VirtualInstant {
    VirtualInstant::from_elapsed(Duration::from_millis(millis))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: draining in arbitrary steps fires each surviving task once,
    /// in deadline order, and never fires cancelled tasks.
    #[test]
    fn prop_drain_fires_surviving_tasks_in_order(
        deadlines in prop::collection::vec(0u64..5_000, 1..40),
        cancel_mask in prop::collection::vec(any::<bool>(), 40),
        steps in prop::collection::vec(1u64..800, 1..20),
    ) {
        let mut scheduler = Scheduler::new();
        let mut ids = Vec::new();
        for (index, deadline) in deadlines.iter().enumerate() {
            ids.push(scheduler.schedule(at(*deadline), index));
        }

        let mut cancelled = HashSet::new();
        for (index, id) in ids.iter().enumerate() {
            if cancel_mask[index] {
                prop_assert_eq!(scheduler.cancel(*id), Some(index));
                cancelled.insert(index);
            }
        }

        let mut now = 0u64;
        let mut fired = Vec::new();
        for step in steps {
            now += step;
            for (_, index) in scheduler.pop_due(at(now)) {
                prop_assert!(deadlines[index] <= now, "task fired before its deadline");
                fired.push(index);
            }
        }
        for (_, index) in scheduler.pop_due(at(u64::MAX / 2)) {
            fired.push(index);
        }

        let fired_set: HashSet<_> = fired.iter().copied().collect();
        prop_assert_eq!(fired_set.len(), fired.len(), "a task fired twice");

        for (index, _) in deadlines.iter().enumerate() {
            prop_assert_eq!(fired_set.contains(&index), !cancelled.contains(&index));
        }

        for pair in fired.windows(2) {
            prop_assert!(deadlines[pair[0]] <= deadlines[pair[1]], "fired out of order");
        }

        prop_assert!(scheduler.is_empty());
    }
}
