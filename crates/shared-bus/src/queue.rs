//! # Priority Queues
//!
//! One FIFO per priority class. Event ids are allocated under the same lock
//! as the push, so id order and queue order agree within a class.

use crate::errors::BusError;
use shared_types::{EventEnvelope, EventId, NewEvent, Priority};
use std::collections::VecDeque;
use std::sync::Arc;

/// Pending envelopes, bucketed by priority.
#[derive(Debug)]
pub struct PriorityQueues {
    queues: [VecDeque<Arc<EventEnvelope>>; Priority::COUNT],
    len: usize,
    capacity: usize,
    next_id: u64,
}

impl PriorityQueues {
    /// Queues that hold at most `capacity` envelopes in total.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            queues: Default::default(),
            len: 0,
            capacity,
            next_id: 1,
        }
    }

    /// Seal `event` under a fresh id and append it to its priority class.
    ///
    /// Ids are never reused, including across rejected pushes.
    pub fn push(&mut self, event: NewEvent) -> Result<EventId, BusError> {
        if self.len >= self.capacity {
            return Err(BusError::QueueFull {
                capacity: self.capacity,
            });
        }

        let id = EventId(self.next_id);
        self.next_id += 1;

        let index = event.priority.index();
        self.queues[index].push_back(Arc::new(EventEnvelope::seal(id, event)));
        self.len += 1;
        Ok(id)
    }

    /// Take every pending envelope, leaving the queues empty.
    ///
    /// The returned buckets are in drain order.
    pub fn take_all(&mut self) -> [VecDeque<Arc<EventEnvelope>>; Priority::COUNT] {
        self.len = 0;
        std::mem::take(&mut self.queues)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Pending envelopes per class, indexed by `Priority::index`.
    #[must_use]
    pub fn depths(&self) -> [usize; Priority::COUNT] {
        let mut depths = [0; Priority::COUNT];
        for (depth, queue) in depths.iter_mut().zip(self.queues.iter()) {
            *depth = queue.len();
        }
        depths
    }
}
