//! Cancellable scheduled tasks.
//!
//! State machines never sleep. They schedule a task with a deadline and the
//! driver hands them the current time on every tick; [`Scheduler::pop_due`]
//! then yields the tasks whose deadline has passed, oldest first. Because the
//! clock is injected, tests fast-forward a virtual clock instead of waiting.

use std::collections::{BTreeMap, HashMap};

/// Handle to a scheduled task, used to cancel it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    /// Raw numeric identifier.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// Deadline-ordered set of pending tasks.
///
/// Tasks with equal deadlines fire in scheduling order.
#[derive(Debug)]
pub struct Scheduler<I, T> {
    next_id: u64,
    queue: BTreeMap<(I, TaskId), T>,
    deadlines: HashMap<TaskId, I>,
}

impl<I, T> Default for Scheduler<I, T> {
    fn default() -> Self {
        Self { next_id: 0, queue: BTreeMap::new(), deadlines: HashMap::new() }
    }
}

impl<I: Copy + Ord, T> Scheduler<I, T> {
    /// Create an empty scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `task` to fire once `fire_at` is reached.
    pub fn schedule(&mut self, fire_at: I, task: T) -> TaskId {
        let id = TaskId(self.next_id);
        self.next_id += 1;

        self.queue.insert((fire_at, id), task);
        self.deadlines.insert(id, fire_at);
        id
    }

    /// Cancel a pending task.
    ///
    /// Returns the task payload, or `None` if it already fired or was
    /// cancelled.
    pub fn cancel(&mut self, id: TaskId) -> Option<T> {
        let fire_at = self.deadlines.remove(&id)?;
        self.queue.remove(&(fire_at, id))
    }

    /// Whether the task is still waiting to fire.
    pub fn is_pending(&self, id: TaskId) -> bool {
        self.deadlines.contains_key(&id)
    }

    /// Deadline of a pending task.
    pub fn fire_at(&self, id: TaskId) -> Option<I> {
        self.deadlines.get(&id).copied()
    }

    /// Earliest deadline among pending tasks.
    pub fn next_deadline(&self) -> Option<I> {
        self.queue.keys().next().map(|(fire_at, _)| *fire_at)
    }

    /// Remove and return every task whose deadline is at or before `now`.
    pub fn pop_due(&mut self, now: I) -> Vec<(TaskId, T)> {
        let mut due = Vec::new();

        while let Some(entry) = self.queue.first_entry() {
            if entry.key().0 > now {
                break;
            }
            let ((_, id), task) = entry.remove_entry();
            self.deadlines.remove(&id);
            due.push((id, task));
        }

        due
    }

    /// Drop every pending task.
    pub fn clear(&mut self) {
        self.queue.clear();
        self.deadlines.clear();
    }

    /// Number of pending tasks.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether no task is pending.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::env::VirtualInstant;

    fn at(millis: u64) -> VirtualInstant {
        VirtualInstant::from_elapsed(Duration::from_millis(millis))
    }

    #[test]
    fn tasks_fire_in_deadline_order() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule(at(300), "late");
        scheduler.schedule(at(100), "early");
        scheduler.schedule(at(200), "middle");

        let fired: Vec<_> = scheduler.pop_due(at(1_000)).into_iter().map(|(_, t)| t).collect();
        assert_eq!(fired, vec!["early", "middle", "late"]);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn equal_deadlines_fire_in_scheduling_order() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule(at(100), 1);
        scheduler.schedule(at(100), 2);
        scheduler.schedule(at(100), 3);

        let fired: Vec<_> = scheduler.pop_due(at(100)).into_iter().map(|(_, t)| t).collect();
        assert_eq!(fired, vec![1, 2, 3]);
    }

    #[test]
    fn tasks_not_yet_due_stay_pending() {
        let mut scheduler = Scheduler::new();
        let id = scheduler.schedule(at(1_000), ());

        assert!(scheduler.pop_due(at(999)).is_empty());
        assert!(scheduler.is_pending(id));
        assert_eq!(scheduler.next_deadline(), Some(at(1_000)));

        assert_eq!(scheduler.pop_due(at(1_000)).len(), 1);
        assert!(!scheduler.is_pending(id));
    }

    #[test]
    fn cancelled_task_never_fires() {
        let mut scheduler = Scheduler::new();
        let keep = scheduler.schedule(at(10), "keep");
        let drop = scheduler.schedule(at(10), "drop");

        assert_eq!(scheduler.cancel(drop), Some("drop"));
        assert_eq!(scheduler.cancel(drop), None, "second cancel is a no-op");

        let fired = scheduler.pop_due(at(10));
        assert_eq!(fired, vec![(keep, "keep")]);
    }

    #[test]
    fn cancel_after_fire_returns_none() {
        let mut scheduler = Scheduler::new();
        let id = scheduler.schedule(at(5), ());

        scheduler.pop_due(at(5));
        assert_eq!(scheduler.cancel(id), None);
        assert_eq!(scheduler.fire_at(id), None);
    }

    #[test]
    fn clear_drops_everything() {
        let mut scheduler = Scheduler::new();
        let id = scheduler.schedule(at(5), ());
        scheduler.schedule(at(6), ());

        scheduler.clear();
        assert_eq!(scheduler.len(), 0);
        assert!(!scheduler.is_pending(id));
        assert!(scheduler.pop_due(at(100)).is_empty());
    }
}
