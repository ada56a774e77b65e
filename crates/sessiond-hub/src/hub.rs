// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use serde::Serialize;

use crate::connection::ClientConnection;
use crate::dedup::DedupCache;
use crate::error::{HubError, Result};
use crate::handler::RequestHandler;
use crate::subscription::{validate_session_scope, SubscriptionIndex};

/// The literal `"global"` scope used for session/room lifecycle events.
pub const GLOBAL_SCOPE: &str = "global";

/// Default Hub `request` timeout (§4.1 expansion), matching the message
/// queue's own consumption timeout so neither suspension point is
/// surprising relative to the other.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection-time policy naming the methods a client is pre-registered
/// for. One list for `global` joins, another for joins to a specific
/// session.
#[derive(Debug, Clone, Default)]
pub struct AutoSubscribeConfig {
    pub global_methods: Vec<String>,
    pub session_methods: Vec<String>,
}

/// Observability record returned by every [`Hub::publish`] call.
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryReport {
    pub session: String,
    pub method: String,
    pub sent: usize,
    pub failed: usize,
    pub total_subscribers: usize,
}

struct Inner {
    connections: Mutex<HashMap<String, Arc<dyn ClientConnection>>>,
    subscriptions: Mutex<SubscriptionIndex>,
    handlers: Mutex<HashMap<String, Arc<dyn RequestHandler>>>,
    dedup: DedupCache,
    auto_subscribe: AutoSubscribeConfig,
    request_timeout: Duration,
}

/// The transport-agnostic router (§4.1). Cheap to clone — every method
/// takes `&self` and locks only the specific piece of state it touches.
#[derive(Clone)]
pub struct Hub {
    inner: Arc<Inner>,
}

impl Hub {
    pub fn new(auto_subscribe: AutoSubscribeConfig) -> Self {
        Self::with_config(auto_subscribe, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_config(auto_subscribe: AutoSubscribeConfig, request_timeout: Duration) -> Self {
        Self::with_dedup(auto_subscribe, request_timeout, crate::dedup::DEFAULT_CAPACITY, crate::dedup::DEFAULT_TTL)
    }

    /// Like [`Hub::with_config`] but also tunes the request-dedup cache's
    /// bound and TTL — the knobs the hosting binary's `DaemonConfig`
    /// exposes.
    pub fn with_dedup(auto_subscribe: AutoSubscribeConfig, request_timeout: Duration, dedup_capacity: usize, dedup_ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                connections: Mutex::new(HashMap::new()),
                subscriptions: Mutex::new(SubscriptionIndex::new()),
                handlers: Mutex::new(HashMap::new()),
                dedup: DedupCache::new(dedup_capacity, dedup_ttl),
                auto_subscribe,
                request_timeout,
            }),
        }
    }

    pub fn register_connection(&self, conn: Arc<dyn ClientConnection>) {
        self.inner.connections.lock().expect("hub connections mutex poisoned").insert(conn.id().to_string(), conn);
    }

    /// Drop a connection and every subscription it held.
    pub fn remove_connection(&self, client_id: &str) {
        self.inner.connections.lock().expect("hub connections mutex poisoned").remove(client_id);
        self.inner.subscriptions.lock().expect("hub subscriptions mutex poisoned").unsubscribe_all(client_id);
    }

    pub fn subscribe(&self, session: &str, method: &str, client_id: &str) -> Result<()> {
        self.inner.subscriptions.lock().expect("hub subscriptions mutex poisoned").subscribe(session, method, client_id)
    }

    pub fn unsubscribe(&self, session: &str, method: &str, client_id: &str) {
        self.inner.subscriptions.lock().expect("hub subscriptions mutex poisoned").unsubscribe(session, method, client_id);
    }

    /// Pre-register `client_id` for the configured auto-subscribe methods
    /// on joining `session` (the literal `"global"` or a specific session
    /// id).
    pub fn auto_subscribe(&self, session: &str, client_id: &str) -> Result<()> {
        validate_session_scope(session)?;
        let methods = if session == GLOBAL_SCOPE {
            self.inner.auto_subscribe.global_methods.clone()
        } else {
            self.inner.auto_subscribe.session_methods.clone()
        };
        let mut subs = self.inner.subscriptions.lock().expect("hub subscriptions mutex poisoned");
        for method in methods {
            subs.subscribe(session, &method, client_id)?;
        }
        Ok(())
    }

    pub fn subscribers(&self, session: &str, method: &str) -> Vec<String> {
        self.inner.subscriptions.lock().expect("hub subscriptions mutex poisoned").subscribers(session, method)
    }

    pub fn register_handler(&self, method: impl Into<String>, handler: Arc<dyn RequestHandler>) {
        self.inner.handlers.lock().expect("hub handlers mutex poisoned").insert(method.into(), handler);
    }

    /// Route a request to its registered handler. Handler panics and
    /// errors are both converted to a typed [`HubError`] — the caller is
    /// never the one to observe a panic.
    pub async fn request(&self, method: &str, payload: serde_json::Value) -> Result<serde_json::Value> {
        let handler = {
            let handlers = self.inner.handlers.lock().expect("hub handlers mutex poisoned");
            handlers.get(method).cloned()
        };
        let Some(handler) = handler else {
            return Err(HubError::NoHandler(method.to_string()));
        };

        let call = AssertUnwindSafe(handler.handle(payload)).catch_unwind();
        match tokio::time::timeout(self.inner.request_timeout, call).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(reason))) => Err(HubError::HandlerFailed(method.to_string(), reason)),
            Ok(Err(_panic)) => Err(HubError::HandlerFailed(method.to_string(), "handler panicked".to_string())),
            Err(_elapsed) => Err(HubError::Timeout(method.to_string())),
        }
    }

    /// `request`, but checking and populating the idempotent-read dedup
    /// cache first. Use only for handlers whose result is safe to replay
    /// verbatim within the TTL window.
    pub async fn request_deduped(
        &self,
        method: &str,
        session: &str,
        payload: serde_json::Value,
    ) -> Result<serde_json::Value> {
        if let Some(cached) = self.inner.dedup.get(method, session, &payload) {
            return Ok(cached);
        }
        let result = self.request(method, payload.clone()).await?;
        self.inner.dedup.set(method, session, &payload, result.clone());
        Ok(result)
    }

    /// Publish an event to every subscriber of `(session, method)`. Returns
    /// a delivery report for observability rather than propagating
    /// per-subscriber send failures — a slow/dead client never stalls
    /// others (§5 backpressure).
    pub async fn publish(&self, session: &str, method: &str, payload: serde_json::Value) -> DeliveryReport {
        let subscriber_ids = self.subscribers(session, method);
        if subscriber_ids.is_empty() {
            return DeliveryReport {
                session: session.to_string(),
                method: method.to_string(),
                sent: 0,
                failed: 0,
                total_subscribers: 0,
            };
        }

        let bytes = match serde_json::to_vec(&payload) {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(session, method, error = %e, "failed to serialize event payload");
                return DeliveryReport {
                    session: session.to_string(),
                    method: method.to_string(),
                    sent: 0,
                    failed: subscriber_ids.len(),
                    total_subscribers: subscriber_ids.len(),
                };
            }
        };

        let connections: Vec<Arc<dyn ClientConnection>> = {
            let conns = self.inner.connections.lock().expect("hub connections mutex poisoned");
            subscriber_ids.iter().filter_map(|id| conns.get(id).cloned()).collect()
        };

        let mut sent = 0;
        let mut failed = 0;
        for conn in connections {
            if !conn.is_open() {
                failed += 1;
                continue;
            }
            match conn.send(bytes.clone()).await {
                Ok(()) => sent += 1,
                Err(e) => {
                    tracing::debug!(session, method, client = conn.id(), error = %e, "event delivery failed");
                    failed += 1;
                }
            }
        }

        DeliveryReport {
            session: session.to_string(),
            method: method.to_string(),
            sent,
            failed,
            total_subscribers: subscriber_ids.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;

    struct FakeConnection {
        id: String,
        open: std::sync::atomic::AtomicBool,
        received: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    #[async_trait]
    impl ClientConnection for FakeConnection {
        fn id(&self) -> &str {
            &self.id
        }

        async fn send(&self, bytes: Vec<u8>) -> anyhow::Result<()> {
            if !self.is_open() {
                anyhow::bail!("connection closed");
            }
            self.received.lock().unwrap().push(bytes);
            Ok(())
        }

        fn is_open(&self) -> bool {
            self.open.load(Ordering::SeqCst)
        }
    }

    fn fake(id: &str) -> (Arc<FakeConnection>, Arc<Mutex<Vec<Vec<u8>>>>) {
        let received = Arc::new(Mutex::new(Vec::new()));
        let conn =
            Arc::new(FakeConnection { id: id.to_string(), open: std::sync::atomic::AtomicBool::new(true), received: received.clone() });
        (conn, received)
    }

    #[tokio::test]
    async fn global_join_auto_subscribes_configured_methods() {
        let hub = Hub::new(AutoSubscribeConfig {
            global_methods: vec!["session.created".into(), "session.updated".into(), "session.deleted".into()],
            session_methods: vec![],
        });
        hub.auto_subscribe(GLOBAL_SCOPE, "client-1").unwrap();
        for method in ["session.created", "session.updated", "session.deleted"] {
            assert_eq!(hub.subscribers(GLOBAL_SCOPE, method), vec!["client-1".to_string()]);
        }
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_is_a_zero_delivery() {
        let hub = Hub::new(AutoSubscribeConfig::default());
        let report = hub.publish("s1", "sdk.message", json!({})).await;
        assert_eq!(report.total_subscribers, 0);
        assert_eq!(report.sent, 0);
    }

    #[tokio::test]
    async fn publish_delivers_to_open_connections_and_counts_closed() {
        let hub = Hub::new(AutoSubscribeConfig::default());
        let (open_conn, received) = fake("c1");
        let (closed_conn, _) = fake("c2");
        closed_conn.open.store(false, Ordering::SeqCst);
        hub.register_connection(open_conn);
        hub.register_connection(closed_conn);
        hub.subscribe("s1", "sdk.message", "c1").unwrap();
        hub.subscribe("s1", "sdk.message", "c2").unwrap();

        let report = hub.publish("s1", "sdk.message", json!({"text": "hi"})).await;
        assert_eq!(report.total_subscribers, 2);
        assert_eq!(report.sent, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(received.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn request_routes_to_handler() {
        let hub = Hub::new(AutoSubscribeConfig::default());
        hub.register_handler(
            "session.get",
            Arc::new(|payload: serde_json::Value| async move { Ok(json!({"echo": payload})) }),
        );
        let result = hub.request("session.get", json!({"id": "s1"})).await.unwrap();
        assert_eq!(result, json!({"echo": {"id": "s1"}}));
    }

    #[tokio::test]
    async fn request_to_unknown_method_errors() {
        let hub = Hub::new(AutoSubscribeConfig::default());
        let err = hub.request("no.such.method", json!(null)).await.unwrap_err();
        assert!(matches!(err, HubError::NoHandler(_)));
    }

    #[tokio::test]
    async fn handler_error_is_converted_never_propagated() {
        let hub = Hub::new(AutoSubscribeConfig::default());
        hub.register_handler(
            "broken",
            Arc::new(|_payload: serde_json::Value| async move { Err("boom".to_string()) }),
        );
        let err = hub.request("broken", json!(null)).await.unwrap_err();
        assert!(matches!(err, HubError::HandlerFailed(_, reason) if reason == "boom"));
    }

    #[tokio::test]
    async fn handler_panic_is_caught_as_typed_error() {
        let hub = Hub::new(AutoSubscribeConfig::default());
        hub.register_handler("panics", Arc::new(|_payload: serde_json::Value| async move { panic!("kaboom") }));
        let err = hub.request("panics", json!(null)).await.unwrap_err();
        assert!(matches!(err, HubError::HandlerFailed(_, _)));
    }

    #[tokio::test]
    async fn request_deduped_reuses_cached_response() {
        let hub = Hub::new(AutoSubscribeConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        hub.register_handler(
            "session.get",
            Arc::new(move |_payload: serde_json::Value| {
                let calls = calls_clone.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(json!({"title": "hi"}))
                }
            }),
        );
        let first = hub.request_deduped("session.get", "s1", json!({"id": 1})).await.unwrap();
        let second = hub.request_deduped("session.get", "s1", json!({"id": 1})).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn remove_connection_drops_its_subscriptions() {
        let hub = Hub::new(AutoSubscribeConfig::default());
        let (conn, _) = fake("c1");
        hub.register_connection(conn);
        hub.subscribe("s1", "sdk.message", "c1").unwrap();
        hub.remove_connection("c1");
        assert!(hub.subscribers("s1", "sdk.message").is_empty());
    }
}
