// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::cache::LruCache;

/// Default bound and TTL for the request dedup cache (§4.1).
pub const DEFAULT_CAPACITY: usize = 500;
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// 64-bit FNV-1a, masked to 53 bits to match the JS-safe-integer hash the
/// distilled design describes. Length is mixed in afterward so two
/// same-hash-prefix payloads of different size don't collide as easily.
fn fnv1a_53(data: &str) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    let mut hash = OFFSET_BASIS;
    for byte in data.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(PRIME);
    }
    (hash ^ (data.len() as u64)) & ((1u64 << 53) - 1)
}

/// Small primitive payloads are inlined into the key verbatim; anything
/// larger is collapsed to a hash so the key itself stays bounded in size.
const INLINE_THRESHOLD: usize = 64;

fn payload_key_part(payload: &serde_json::Value) -> String {
    match payload {
        serde_json::Value::Null | serde_json::Value::Bool(_) | serde_json::Value::Number(_) => payload.to_string(),
        serde_json::Value::String(s) if s.len() <= INLINE_THRESHOLD => format!("s:{s}"),
        other => {
            let serialized = other.to_string();
            if serialized.len() <= INLINE_THRESHOLD {
                serialized
            } else {
                format!("h:{}:{}", fnv1a_53(&serialized), serialized.len())
            }
        }
    }
}

/// Derive the dedup key for `(method, session, payload)`, matching §4.1's
/// "small primitive payloads inline; large payloads via an FNV-1a-derived
/// hash plus length mixing" rule.
pub fn derive_key(method: &str, session: &str, payload: &serde_json::Value) -> String {
    format!("{method}:{session}:{}", payload_key_part(payload))
}

/// Idempotent-read response cache keyed on `(method, session, payload)`. A
/// background sweeper deletes expired entries every [`SWEEP_INTERVAL`];
/// sweep never panics the task, so the sweeper chain survives indefinitely
/// until [`DedupCache::destroy`] stops it.
pub struct DedupCache {
    inner: Arc<Mutex<LruCache<serde_json::Value>>>,
    sweeper: Option<JoinHandle<()>>,
}

impl DedupCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let inner = Arc::new(Mutex::new(LruCache::new(capacity, ttl)));
        let sweep_target = Arc::clone(&inner);
        let sweeper = tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                interval.tick().await;
                let removed = sweep_target.lock().expect("dedup cache mutex poisoned").sweep();
                if removed > 0 {
                    tracing::debug!(removed, "dedup cache sweep");
                }
            }
        });
        Self { inner, sweeper: Some(sweeper) }
    }

    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_TTL)
    }

    pub fn get(&self, method: &str, session: &str, payload: &serde_json::Value) -> Option<serde_json::Value> {
        let key = derive_key(method, session, payload);
        self.inner.lock().expect("dedup cache mutex poisoned").get(&key)
    }

    pub fn set(&self, method: &str, session: &str, payload: &serde_json::Value, response: serde_json::Value) {
        let key = derive_key(method, session, payload);
        self.inner.lock().expect("dedup cache mutex poisoned").set(key, response);
    }

    pub fn destroy(&mut self) {
        if let Some(handle) = self.sweeper.take() {
            handle.abort();
        }
    }
}

impl Drop for DedupCache {
    fn drop(&mut self) {
        self.destroy();
    }
}
