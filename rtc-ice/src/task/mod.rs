#[cfg(test)]
mod task_test;

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::time::Instant;

/// Deferred work the channel posts to itself.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) enum Task {
    /// Re-rank connections and re-evaluate the selection.
    Sort,
    /// Ping the next connection and schedule the following tick.
    CheckAndPing,
}

/// Deadline-ordered queue of tasks. Tasks due at the same instant run in the
/// order they were posted.
#[derive(Default, Debug)]
pub(crate) struct TaskQueue {
    heap: BinaryHeap<Reverse<(Instant, u64, Task)>>,
    seq: u64,
}

impl TaskQueue {
    pub(crate) fn post_at(&mut self, deadline: Instant, task: Task) {
        self.seq += 1;
        self.heap.push(Reverse((deadline, self.seq, task)));
    }

    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.heap.peek().map(|Reverse((deadline, _, _))| *deadline)
    }

    /// Removes and returns the earliest task if it is due at `now`.
    pub(crate) fn pop_due(&mut self, now: Instant) -> Option<Task> {
        if self.next_deadline()? > now {
            return None;
        }
        self.heap.pop().map(|Reverse((_, _, task))| task)
    }

    pub(crate) fn pending(&self, task: Task) -> usize {
        self.heap
            .iter()
            .filter(|Reverse((_, _, t))| *t == task)
            .count()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.heap.clear();
    }
}
