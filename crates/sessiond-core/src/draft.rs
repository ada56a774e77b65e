// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use sessiond_store::Store;
use tokio::task::JoinHandle;

/// Per-`(session, client)` write-coalescing delay (§3.6): the latest text
/// wins and only the final write in a burst reaches the store.
const COALESCE_DELAY: Duration = Duration::from_millis(250);

/// Debounces draft writes the same way [`crate::queue::MessageQueue`]
/// debounces a consumption timeout: one pending timer per key, replaced
/// (never stacked) on every update.
pub struct DraftCoalescer {
    store: Store,
    delay: Duration,
    pending: Mutex<HashMap<(String, String), JoinHandle<()>>>,
}

impl DraftCoalescer {
    pub fn new(store: Store) -> Self {
        Self::with_delay(store, COALESCE_DELAY)
    }

    pub fn with_delay(store: Store, delay: Duration) -> Self {
        Self { store, delay, pending: Mutex::new(HashMap::new()) }
    }

    /// Record a keystroke-level update. Cancels any in-flight write for this
    /// `(session, client)` and arms a fresh one `delay` out; an empty `text`
    /// still coalesces, then deletes the row once it fires.
    pub fn update(&self, session_id: &str, client_id: &str, text: &str) {
        let key = (session_id.to_string(), client_id.to_string());
        let store = self.store.clone();
        let text = text.to_string();
        let delay = self.delay;
        let session_id_owned = key.0.clone();
        let client_id_owned = key.1.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = store.upsert_draft(&session_id_owned, &client_id_owned, &text) {
                tracing::warn!(session_id = %session_id_owned, client_id = %client_id_owned, error = %e, "failed to persist coalesced draft");
            }
        });

        let mut pending = self.pending.lock().expect("draft coalescer mutex poisoned");
        if let Some(old) = pending.insert(key, handle) {
            old.abort();
        }
    }

    /// Flush a key's pending write immediately, bypassing the delay — used
    /// when a session is about to be torn down.
    pub async fn flush(&self, session_id: &str, client_id: &str, text: &str) {
        let key = (session_id.to_string(), client_id.to_string());
        if let Some(handle) = self.pending.lock().expect("draft coalescer mutex poisoned").remove(&key) {
            handle.abort();
        }
        if let Err(e) = self.store.upsert_draft(session_id, client_id, text) {
            tracing::warn!(session_id, client_id, error = %e, "failed to flush draft");
        }
    }

    /// Number of writes currently debouncing — test/observability hook.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().expect("draft coalescer mutex poisoned").len()
    }
}

impl Drop for DraftCoalescer {
    fn drop(&mut self) {
        for (_, handle) in self.pending.lock().expect("draft coalescer mutex poisoned").drain() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn coalesces_rapid_updates_into_one_write() {
        let store = Store::open_in_memory().unwrap();
        store
            .create_session(&sessiond_store::SessionRow {
                id: "s1".into(),
                title: "untitled".into(),
                workspace_path: "/tmp/work".into(),
                status: sessiond_store::SessionStatus::Active,
                created_at: chrono::Utc::now(),
                last_active_at: chrono::Utc::now(),
                config_json: "{}".into(),
                message_count: 0,
                input_tokens: 0,
                output_tokens: 0,
                total_cost_usd: 0.0,
                tool_call_count: 0,
                title_generated: false,
            })
            .unwrap();

        let coalescer = DraftCoalescer::with_delay(store.clone(), Duration::from_millis(20));
        coalescer.update("s1", "c1", "h");
        coalescer.update("s1", "c1", "he");
        coalescer.update("s1", "c1", "hello");
        assert_eq!(coalescer.pending_count(), 1);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(store.get_draft("s1", "c1").unwrap().unwrap().text, "hello");
    }

    #[tokio::test]
    async fn empty_text_coalesces_to_a_delete() {
        let store = Store::open_in_memory().unwrap();
        store
            .create_session(&sessiond_store::SessionRow {
                id: "s1".into(),
                title: "untitled".into(),
                workspace_path: "/tmp/work".into(),
                status: sessiond_store::SessionStatus::Active,
                created_at: chrono::Utc::now(),
                last_active_at: chrono::Utc::now(),
                config_json: "{}".into(),
                message_count: 0,
                input_tokens: 0,
                output_tokens: 0,
                total_cost_usd: 0.0,
                tool_call_count: 0,
                title_generated: false,
            })
            .unwrap();

        let coalescer = DraftCoalescer::with_delay(store.clone(), Duration::from_millis(10));
        coalescer.update("s1", "c1", "hello");
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(store.get_draft("s1", "c1").unwrap().is_some());

        coalescer.update("s1", "c1", "");
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(store.get_draft("s1", "c1").unwrap().is_none());
    }
}
