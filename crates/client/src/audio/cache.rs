//! Decoded buffer cache keyed by sound URL.

use std::collections::{HashMap, VecDeque};

/// Least-recently-used cache of decoded buffers.
#[derive(Debug)]
pub struct BufferCache<B> {
    capacity: usize,
    entries: HashMap<String, B>,
    /// Front is least recently used.
    order: VecDeque<String>,
}

impl<B: Clone> BufferCache<B> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    pub fn get(&mut self, url: &str) -> Option<B> {
        let buffer = self.entries.get(url).cloned()?;
        self.touch(url);
        Some(buffer)
    }

    pub fn insert(&mut self, url: &str, buffer: B) {
        if self.entries.insert(url.to_string(), buffer).is_some() {
            self.touch(url);
            return;
        }
        self.order.push_back(url.to_string());
        while self.entries.len() > self.capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.entries.remove(&oldest);
        }
    }

    pub fn contains(&self, url: &str) -> bool {
        self.entries.contains_key(url)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    fn touch(&mut self, url: &str) {
        if let Some(pos) = self.order.iter().position(|u| u == url) {
            if let Some(key) = self.order.remove(pos) {
                self.order.push_back(key);
            }
        }
    }
}
