//! Bounded FIFO buffer of idle handles.

use crossbeam::queue::ArrayQueue;

use crate::eviction::Entry;

/// Idle buffer with capacity `max_idle`.
///
/// Push and pop never block; a full buffer hands the entry back so the
/// caller can take the discard path. `ArrayQueue` cannot be built with a
/// capacity of zero, so a `max_idle` of 0 is modelled as the absent queue
/// that rejects every push.
pub(crate) struct IdleQueue<T> {
    slots: Option<ArrayQueue<Entry<T>>>,
}

impl<T> IdleQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: if capacity > 0 {
                Some(ArrayQueue::new(capacity))
            } else {
                None
            },
        }
    }

    pub fn try_push(&self, entry: Entry<T>) -> Result<(), Entry<T>> {
        match &self.slots {
            Some(queue) => queue.push(entry),
            None => Err(entry),
        }
    }

    pub fn try_pop(&self) -> Option<Entry<T>> {
        self.slots.as_ref()?.pop()
    }

    pub fn len(&self) -> usize {
        self.slots.as_ref().map_or(0, |queue| queue.len())
    }
}
