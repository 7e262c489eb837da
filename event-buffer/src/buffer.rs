use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use crate::{EventBufferError, Result};

struct State<T> {
    queue: VecDeque<T>,
    closed: bool,
    pushed: u64,
    popped: u64,
}

struct Shared<T> {
    state: Mutex<State<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
}

pub struct EventBuffer<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for EventBuffer<T> {
    fn clone(&self) -> Self {
        EventBuffer {
            shared: self.shared.clone(),
        }
    }
}

impl<T> EventBuffer<T> {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(EventBufferError::ZeroCapacity);
        }
        Ok(EventBuffer {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    queue: VecDeque::with_capacity(capacity.min(4096)),
                    closed: false,
                    pushed: 0,
                    popped: 0,
                }),
                not_empty: Condvar::new(),
                not_full: Condvar::new(),
                capacity,
            }),
        })
    }

    /// Appends `item`, blocking while the buffer is full.
    pub fn push(&self, item: T) -> Result<()> {
        let mut state = self.shared.state.lock();
        while !state.closed && state.queue.len() >= self.shared.capacity {
            self.shared.not_full.wait(&mut state);
        }
        if state.closed {
            return Err(EventBufferError::Closed);
        }
        state.queue.push_back(item);
        state.pushed += 1;
        drop(state);
        self.shared.not_empty.notify_one();
        Ok(())
    }

    pub fn try_push(&self, item: T) -> Result<()> {
        let mut state = self.shared.state.lock();
        if state.closed {
            return Err(EventBufferError::Closed);
        }
        if state.queue.len() >= self.shared.capacity {
            return Err(EventBufferError::Full);
        }
        state.queue.push_back(item);
        state.pushed += 1;
        drop(state);
        self.shared.not_empty.notify_one();
        Ok(())
    }

    /// Removes the oldest item, blocking while the buffer is empty. Returns
    /// `None` once the buffer is closed and drained.
    pub fn pop(&self) -> Option<T> {
        let mut state = self.shared.state.lock();
        loop {
            if let Some(item) = state.queue.pop_front() {
                state.popped += 1;
                drop(state);
                self.shared.not_full.notify_one();
                return Some(item);
            }
            if state.closed {
                return None;
            }
            self.shared.not_empty.wait(&mut state);
        }
    }

    pub fn try_pop(&self) -> Option<T> {
        let mut state = self.shared.state.lock();
        let item = state.queue.pop_front()?;
        state.popped += 1;
        drop(state);
        self.shared.not_full.notify_one();
        Some(item)
    }

    pub fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        let mut state = self.shared.state.lock();
        if state.queue.is_empty() && !state.closed {
            self.shared
                .not_empty
                .wait_while_for(&mut state, |s| s.queue.is_empty() && !s.closed, timeout);
        }
        let item = state.queue.pop_front()?;
        state.popped += 1;
        drop(state);
        self.shared.not_full.notify_one();
        Some(item)
    }

    /// Rejects further pushes and wakes all waiters. Queued items stay
    /// available to `pop`.
    pub fn close(&self) {
        self.shared.state.lock().closed = true;
        self.shared.not_empty.notify_all();
        self.shared.not_full.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }

    pub fn len(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Total number of items ever pushed.
    pub fn pushed(&self) -> u64 {
        self.shared.state.lock().pushed
    }

    /// Total number of items ever popped.
    pub fn popped(&self) -> u64 {
        self.shared.state.lock().popped
    }

    /// Blocking iterator that ends when the buffer is closed and drained.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter { buffer: self }
    }
}

pub struct Iter<'a, T> {
    buffer: &'a EventBuffer<T>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.buffer.pop()
    }
}
