// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

/// Bounded ordered map where insertion/access order tracks recency. `get`
/// promotes to most-recent; `set` evicts the oldest entry on overflow and
/// promotes on update. Both treat an entry past its TTL as absent without
/// waiting for the sweeper to physically remove it.
pub struct LruCache<V: Clone> {
    capacity: usize,
    ttl: Duration,
    order: VecDeque<String>,
    map: HashMap<String, (V, Instant)>,
}

impl<V: Clone> LruCache<V> {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self { capacity, ttl, order: VecDeque::new(), map: HashMap::new() }
    }

    pub fn get(&mut self, key: &str) -> Option<V> {
        let expired = self.map.get(key).is_some_and(|(_, t)| t.elapsed() >= self.ttl);
        if expired {
            self.remove(key);
            return None;
        }
        let value = self.map.get(key).map(|(v, _)| v.clone())?;
        self.touch(key);
        Some(value)
    }

    pub fn set(&mut self, key: impl Into<String>, value: V) {
        let key = key.into();
        if self.map.contains_key(&key) {
            self.map.insert(key.clone(), (value, Instant::now()));
            self.touch(&key);
            return;
        }
        if self.map.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.map.remove(&oldest);
            }
        }
        self.order.push_back(key.clone());
        self.map.insert(key, (value, Instant::now()));
    }

    fn touch(&mut self, key: &str) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            let k = self.order.remove(pos).unwrap();
            self.order.push_back(k);
        }
    }

    fn remove(&mut self, key: &str) {
        self.map.remove(key);
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
        }
    }

    /// Delete every entry past its TTL. Returns the count removed. Called
    /// by the periodic sweeper; also safe to call directly in tests.
    pub fn sweep(&mut self) -> usize {
        let now = Instant::now();
        let expired: Vec<String> = self
            .map
            .iter()
            .filter(|(_, (_, t))| now.duration_since(*t) >= self.ttl)
            .map(|(k, _)| k.clone())
            .collect();
        let count = expired.len();
        for key in expired {
            self.remove(&key);
        }
        count
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
