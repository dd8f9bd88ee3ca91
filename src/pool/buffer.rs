//! Bounded local buffer between the task feed and the one-shot workers.
//!
//! Capacity equals the target worker count, which caps how many requests
//! this process has claimed from the shared queue but not yet started.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::envelope::Request;

pub struct LocalBuffer {
    items: Mutex<VecDeque<Request>>,
    capacity: usize,
}

impl LocalBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// True while another request may be claimed.
    pub fn has_room(&self) -> bool {
        self.len() < self.capacity
    }

    /// Enqueue a request, handing it back if the buffer is full.
    pub fn try_push(&self, request: Request) -> Result<(), Request> {
        let mut items = self.lock();
        if items.len() >= self.capacity {
            return Err(request);
        }
        items.push_back(request);
        Ok(())
    }

    /// Take the oldest buffered request without waiting.
    pub fn try_take(&self) -> Option<Request> {
        self.lock().pop_front()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Request>> {
        self.items.lock().expect("local buffer mutex poisoned")
    }
}
