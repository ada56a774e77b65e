// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::sync::Arc;

use sessiond_sdk::AgentSdk;
use sessiond_store::{SessionRow, SessionStatus, Store};
use tokio::sync::Mutex;

use crate::config::SessionConfig;
use crate::error::{Result, RuntimeError};
use crate::runtime::Runtime;

/// Process-wide registry mapping session id to its live [`Runtime`].
/// Eviction is explicit (archive/delete) — there is no LRU (§4.3).
pub struct SessionManager {
    store: Store,
    sdk: Arc<dyn AgentSdk>,
    runtimes: Mutex<HashMap<String, Runtime>>,
}

impl SessionManager {
    pub fn new(store: Store, sdk: Arc<dyn AgentSdk>) -> Self {
        Self { store, sdk, runtimes: Mutex::new(HashMap::new()) }
    }

    /// Prime the registry with every `active` session row without
    /// constructing a Runtime for any of them — Runtimes are built lazily
    /// on first [`SessionManager::get_session`] (§4.3's "no implicit global
    /// store" design note: startup never spins up an agent query).
    pub async fn create_at_startup(&self) -> Result<Vec<String>> {
        let rows = self.store.list_active_sessions()?;
        Ok(rows.into_iter().map(|r| r.id).collect())
    }

    /// Return the live Runtime for `id`, constructing and recovering it
    /// from the store on first access.
    pub async fn get_session(&self, id: &str) -> Result<Runtime> {
        {
            let runtimes = self.runtimes.lock().await;
            if let Some(runtime) = runtimes.get(id) {
                return Ok(runtime.clone());
            }
        }

        let row = self.store.get_session(id)?;
        let config = SessionConfig::from_json(&row.config_json).map_err(|e| RuntimeError::Internal(e.to_string()))?;
        let runtime = Runtime::new(id, self.store.clone(), Arc::clone(&self.sdk), config);

        if let Err(e) = runtime.recover().await {
            tracing::warn!(session_id = %id, error = %e, "recovery failed on session attach");
        }

        let mut runtimes = self.runtimes.lock().await;
        let runtime = runtimes.entry(id.to_string()).or_insert(runtime).clone();
        Ok(runtime)
    }

    pub async fn create_session(&self, id: &str, title: &str, workspace_path: &str, config: &SessionConfig) -> Result<()> {
        let now = chrono::Utc::now();
        let row = SessionRow {
            id: id.to_string(),
            title: title.to_string(),
            workspace_path: workspace_path.to_string(),
            status: SessionStatus::Active,
            created_at: now,
            last_active_at: now,
            config_json: config.to_json().map_err(|e| RuntimeError::Internal(e.to_string()))?,
            message_count: 0,
            input_tokens: 0,
            output_tokens: 0,
            total_cost_usd: 0.0,
            tool_call_count: 0,
            title_generated: false,
        };
        self.store.create_session(&row)?;
        Ok(())
    }

    /// Explicit eviction: interrupt the live Runtime (if any), mark the
    /// session archived or deleted, and drop it from the registry.
    pub async fn evict_session(&self, id: &str, status: SessionStatus) -> Result<()> {
        let runtime = {
            let mut runtimes = self.runtimes.lock().await;
            runtimes.remove(id)
        };
        if let Some(runtime) = runtime {
            runtime.interrupt().await?;
        }
        self.store.set_session_status(id, status)?;
        Ok(())
    }

    pub async fn delete_session(&self, id: &str) -> Result<()> {
        self.evict_session(id, SessionStatus::Deleted).await?;
        self.store.delete_session(id)?;
        Ok(())
    }

    /// Interrupt every live Runtime and drop the registry. Used by the
    /// hosting binary's shutdown path (§10.5).
    pub async fn tear_down(&self) {
        let runtimes: Vec<Runtime> = {
            let mut runtimes = self.runtimes.lock().await;
            runtimes.drain().map(|(_, r)| r).collect()
        };
        for runtime in runtimes {
            if let Err(e) = runtime.interrupt().await {
                tracing::warn!(session_id = %runtime.session_id(), error = %e, "interrupt during teardown failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use sessiond_sdk::mock::EchoSdk;

    use super::*;

    fn manager() -> SessionManager {
        let store = Store::open_in_memory().unwrap();
        SessionManager::new(store, Arc::new(EchoSdk))
    }

    #[tokio::test]
    async fn get_session_constructs_and_caches_runtime() {
        let manager = manager();
        manager.create_session("s1", "untitled", "/tmp/work", &SessionConfig::default()).await.unwrap();

        let first = manager.get_session("s1").await.unwrap();
        let second = manager.get_session("s1").await.unwrap();
        assert_eq!(first.session_id(), second.session_id());
    }

    #[tokio::test]
    async fn get_session_for_missing_id_errors() {
        let manager = manager();
        assert!(matches!(manager.get_session("missing").await, Err(RuntimeError::Store(_))));
    }

    #[tokio::test]
    async fn create_at_startup_lists_active_sessions_without_constructing_runtimes() {
        let manager = manager();
        manager.create_session("s1", "untitled", "/tmp/work", &SessionConfig::default()).await.unwrap();
        let ids = manager.create_at_startup().await.unwrap();
        assert_eq!(ids, vec!["s1".to_string()]);
        assert!(manager.runtimes.lock().await.is_empty());
    }

    #[tokio::test]
    async fn evict_session_removes_from_registry() {
        let manager = manager();
        manager.create_session("s1", "untitled", "/tmp/work", &SessionConfig::default()).await.unwrap();
        manager.get_session("s1").await.unwrap();
        manager.evict_session("s1", SessionStatus::Archived).await.unwrap();
        assert!(manager.runtimes.lock().await.is_empty());
    }

    #[tokio::test]
    async fn tear_down_drains_registry() {
        let manager = manager();
        manager.create_session("s1", "untitled", "/tmp/work", &SessionConfig::default()).await.unwrap();
        manager.create_session("s2", "untitled", "/tmp/work", &SessionConfig::default()).await.unwrap();
        manager.get_session("s1").await.unwrap();
        manager.get_session("s2").await.unwrap();
        manager.tear_down().await;
        assert!(manager.runtimes.lock().await.is_empty());
    }
}
