//! Per-run lookup cache for parent titles.
//!
//! A run creates one [`TitleCache`] and drops it when it finishes; nothing is
//! shared across runs. Capacity is bounded: once full, the oldest inserted
//! entry is evicted first (FIFO). Lookups do not refresh an entry's age.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

pub const DEFAULT_TITLE_CACHE_CAPACITY: usize = 256;

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, String>,
    order: VecDeque<String>,
}

#[derive(Debug)]
pub struct TitleCache {
    capacity: usize,
    inner: Mutex<Inner>,
}

impl TitleCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn get(&self, id: &str) -> Option<String> {
        let inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        inner.entries.get(id).cloned()
    }

    pub fn insert(&self, id: &str, title: &str) {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        if inner.entries.contains_key(id) {
            inner.entries.insert(id.to_string(), title.to_string());
            return;
        }
        while inner.order.len() >= self.capacity {
            match inner.order.pop_front() {
                Some(oldest) => {
                    inner.entries.remove(&oldest);
                }
                None => break,
            }
        }
        inner.order.push_back(id.to_string());
        inner.entries.insert(id.to_string(), title.to_string());
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TitleCache {
    fn default() -> Self {
        Self::new(DEFAULT_TITLE_CACHE_CAPACITY)
    }
}
