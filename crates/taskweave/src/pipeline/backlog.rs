use std::collections::VecDeque;
use std::sync::Mutex;

use crate::model::{Event, ProjectScope};

/// Bounded FIFO of normalized events waiting for the `extract_batch` job.
pub struct EventBacklog {
    queue: Mutex<VecDeque<(ProjectScope, Event)>>,
    capacity: usize,
}

impl EventBacklog {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<(ProjectScope, Event)>> {
        self.queue.lock().unwrap_or_else(|poisoned| {
            log::warn!("backlog lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Returns `false` (and keeps the queue unchanged) when full.
    pub fn push(&self, scope: ProjectScope, event: Event) -> bool {
        let mut queue = self.lock();
        if queue.len() >= self.capacity {
            log::warn!(
                "Event backlog full ({} events), rejecting event {}",
                self.capacity,
                event.id
            );
            return false;
        }
        queue.push_back((scope, event));
        true
    }

    /// Removes up to `max` events, oldest first.
    pub fn drain(&self, max: usize) -> Vec<(ProjectScope, Event)> {
        let mut queue = self.lock();
        let n = max.min(queue.len());
        queue.drain(..n).collect()
    }

    /// Puts events back at the front, in their original order.
    pub fn requeue(&self, events: Vec<(ProjectScope, Event)>) {
        let mut queue = self.lock();
        for item in events.into_iter().rev() {
            queue.push_front(item);
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
