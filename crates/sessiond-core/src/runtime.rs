// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use futures::StreamExt;
use sessiond_sdk::{AgentSdk, ContentBlock, QueryRequest, SdkMessage};
use sessiond_store::Store;
use tokio::sync::{broadcast, oneshot, Mutex};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::checkpoint::CheckpointTracker;
use crate::circuit_breaker::CircuitBreaker;
use crate::config::SessionConfig;
use crate::context_tracker::ContextTracker;
use crate::error::{Result, RuntimeError};
use crate::events::RuntimeEvent;
use crate::phase::{detect_phase_from_message, Phase, QueryState};
use crate::queue::{EnqueueOutcome, MessageQueue};
use crate::recovery;

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Marker a failed upstream call is persisted under so the circuit breaker
/// can learn about it from the message stream (§7's `UpstreamFailure`
/// taxonomy entry).
const LOCAL_COMMAND_STDERR_MARKER: &str = "local-command-stderr";

struct MutableState {
    config: SessionConfig,
    query_state: QueryState,
    phase: Phase,
    checkpoints: CheckpointTracker,
    breaker: CircuitBreaker,
    context: ContextTracker,
    delta_version: u64,
    message_count: i64,
    input_tokens: i64,
    output_tokens: i64,
    total_cost_usd: f64,
    tool_call_count: i64,
    cancel_tx: Option<oneshot::Sender<()>>,
    query_done_rx: Option<oneshot::Receiver<()>>,
    pump_handle: Option<JoinHandle<()>>,
}

struct Inner {
    session_id: String,
    store: Store,
    sdk: Arc<dyn AgentSdk>,
    queue: MessageQueue,
    events_tx: broadcast::Sender<RuntimeEvent>,
    mutable: Mutex<MutableState>,
    interrupt_lock: Mutex<()>,
}

/// Owns one session's conversation. Cheap to clone — every operation
/// serializes through the internal `mutable` mutex, realizing the
/// single-writer-per-session rule (§5) as a session-scoped lock rather than
/// a dedicated command-channel actor, since nothing here needs the
/// cross-task re-entrancy `ControlService` handles for a shared agent.
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<Inner>,
}

impl Runtime {
    pub fn new(session_id: impl Into<String>, store: Store, sdk: Arc<dyn AgentSdk>, config: SessionConfig) -> Self {
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                session_id: session_id.into(),
                store,
                sdk,
                queue: MessageQueue::new(),
                events_tx,
                mutable: Mutex::new(MutableState {
                    config,
                    query_state: QueryState::Idle,
                    phase: Phase::Idle,
                    checkpoints: CheckpointTracker::new(),
                    breaker: CircuitBreaker::default(),
                    context: ContextTracker::new(),
                    delta_version: 0,
                    message_count: 0,
                    input_tokens: 0,
                    output_tokens: 0,
                    total_cost_usd: 0.0,
                    tool_call_count: 0,
                    cancel_tx: None,
                    query_done_rx: None,
                    pump_handle: None,
                }),
                interrupt_lock: Mutex::new(()),
            }),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RuntimeEvent> {
        self.inner.events_tx.subscribe()
    }

    /// Run the message-recovery handler (§4.2.7) for this session. Called
    /// by the Session Manager once, right after constructing a fresh
    /// Runtime for a session that may have crashed mid-turn.
    pub async fn recover(&self) -> Result<recovery::RecoveryReport> {
        recovery::recover_orphans(&self.inner.store, &self.inner.session_id)
            .await
            .map_err(Into::into)
    }

    /// Accept user input onto the queue (§4.2.1). Transitions `idle` →
    /// `starting` and spawns the agent pump on the session's first enqueue
    /// (or the first after returning to `idle`).
    pub async fn enqueue(&self, content: Vec<ContentBlock>, internal: bool) -> Result<oneshot::Receiver<EnqueueOutcome>> {
        let (id, rx) = self.inner.queue.enqueue(content, internal);
        tracing::debug!(session_id = %self.inner.session_id, %id, "enqueued message");
        self.ensure_started().await;
        Ok(rx)
    }

    async fn ensure_started(&self) {
        let mut state = self.inner.mutable.lock().await;
        if !matches!(state.query_state, QueryState::Idle) {
            return;
        }
        state.query_state = QueryState::Starting;
        let generation = self.inner.queue.start();
        let pump = Runtime { inner: Arc::clone(&self.inner) };
        state.pump_handle = Some(tokio::spawn(async move { pump.run_pump(generation).await }));
    }

    /// The agent pump: drains the queue one item at a time, driving the SDK
    /// query to completion before consuming the next (§5: "each message is
    /// fully handled before the next is consumed").
    async fn run_pump(&self, generation: u64) {
        while let Some(item) = self.inner.queue.next(generation).await {
            self.inner.queue.complete(item.id);

            let (cancel_tx, cancel_rx) = oneshot::channel();
            let (done_tx, done_rx) = oneshot::channel();
            {
                let mut state = self.inner.mutable.lock().await;
                state.cancel_tx = Some(cancel_tx);
                state.query_done_rx = Some(done_rx);
            }

            let req = {
                let state = self.inner.mutable.lock().await;
                let mut req = QueryRequest::new(self.inner.session_id.clone(), item.content);
                req.max_thinking_tokens = state.config.max_thinking_tokens;
                req.permission_mode = Some(format!("{:?}", state.config.permission_mode).to_lowercase());
                req
            };

            match self.inner.sdk.query(req, cancel_rx).await {
                Ok(mut stream) => {
                    while let Some(next) = stream.next().await {
                        match next {
                            Ok(msg) => self.handle_message(msg).await,
                            Err(e) => {
                                self.handle_upstream_failure(e).await;
                                break;
                            }
                        }
                    }
                }
                Err(e) => self.handle_upstream_failure(e).await,
            }

            let _ = done_tx.send(());
            let mut state = self.inner.mutable.lock().await;
            state.cancel_tx = None;
            if matches!(state.query_state, QueryState::Processing | QueryState::Starting) {
                state.query_state = QueryState::Idle;
            }
        }
    }

    async fn handle_upstream_failure(&self, err: anyhow::Error) {
        tracing::warn!(session_id = %self.inner.session_id, error = %err, "upstream agent SDK call failed");
        let marker = format!("<{LOCAL_COMMAND_STDERR_MARKER}>{err}</{LOCAL_COMMAND_STDERR_MARKER}>");
        let msg = SdkMessage::User {
            base: sessiond_sdk::MessageBase::new(self.inner.session_id.clone()),
            content: vec![ContentBlock::text(marker)],
        };
        self.handle_message(msg).await;
    }

    /// The message handler (§4.2.4): persist, publish, dispatch by type,
    /// detect phase, feed the circuit breaker.
    async fn handle_message(&self, msg: SdkMessage) {
        let session_id = self.inner.session_id.clone();

        let persisted = self.inner.store.save_sdk_message(&session_id, &msg);
        match persisted {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(session_id = %session_id, uuid = %msg.uuid(), "dropping replayed message, fan-out aborted");
                return;
            }
            Err(e) => {
                tracing::error!(session_id = %session_id, error = %e, "failed to persist SDK message");
                return;
            }
        }

        let mut state = self.inner.mutable.lock().await;

        if matches!(state.query_state, QueryState::Starting) {
            state.query_state = QueryState::Processing;
        }

        let _ = self.inner.events_tx.send(RuntimeEvent::SdkMessage { session_id: session_id.clone(), message: Box::new(msg.clone()) });
        state.delta_version += 1;
        let _ = self.inner.events_tx.send(RuntimeEvent::SdkMessagesDelta {
            session_id: session_id.clone(),
            added: Box::new(msg.clone()),
            version: state.delta_version,
        });

        match &msg {
            SdkMessage::User { base, content } => {
                if !base.is_replay {
                    let preview = msg.text_preview(100).unwrap_or_default();
                    let checkpoint = state.checkpoints.create(base.uuid, session_id.clone(), preview);
                    let _ = self
                        .inner
                        .events_tx
                        .send(RuntimeEvent::CheckpointCreated { session_id: session_id.clone(), checkpoint });
                }

                let text = content.iter().filter_map(ContentBlock::as_text).collect::<Vec<_>>().join("\n");
                if text.contains(LOCAL_COMMAND_STDERR_MARKER) && state.breaker.observe(&msg) {
                    let breaker_state = state.breaker.state();
                    let message = breaker_state.message.unwrap_or_default();
                    let _ = self.inner.events_tx.send(RuntimeEvent::CircuitBreakerTripped {
                        session_id: session_id.clone(),
                        message,
                    });
                }
            }
            SdkMessage::Assistant { content, .. } => {
                let tool_calls = content.iter().filter(|b| matches!(b, ContentBlock::ToolUse { .. })).count() as i64;
                state.tool_call_count += tool_calls;
                state.message_count += 1;
                let (mc, it, ot, cost, tc) = (state.message_count, state.input_tokens, state.output_tokens, state.total_cost_usd, state.tool_call_count);
                if let Err(e) = self.inner.store.update_session_counters(&session_id, mc, it, ot, cost, tc) {
                    tracing::warn!(session_id = %session_id, error = %e, "failed to persist session counters");
                }
            }
            SdkMessage::Result { outcome, .. } => {
                if let sessiond_sdk::ResultOutcome::Success { usage, cost_usd } = outcome {
                    state.input_tokens += usage.input_tokens as i64;
                    state.output_tokens += usage.output_tokens as i64;
                    state.total_cost_usd += cost_usd;
                    state.context.handle_result_usage(usage);
                    let _ = self.inner.events_tx.send(RuntimeEvent::ContextUpdated {
                        session_id: session_id.clone(),
                        estimate: state.context.estimate(),
                    });
                }
                state.message_count += 1;
                let (mc, it, ot, cost, tc) = (state.message_count, state.input_tokens, state.output_tokens, state.total_cost_usd, state.tool_call_count);
                if let Err(e) = self.inner.store.update_session_counters(&session_id, mc, it, ot, cost, tc) {
                    tracing::warn!(session_id = %session_id, error = %e, "failed to persist session counters");
                }
                state.query_state = QueryState::Idle;
                state.context.reset();
            }
            SdkMessage::StreamEvent { delta, .. } => {
                if let sessiond_sdk::StreamDelta::UsageEstimate { input_tokens, output_tokens } = delta {
                    state.context.observe_stream_estimate(*input_tokens, *output_tokens);
                    let _ = self.inner.events_tx.send(RuntimeEvent::ContextUpdated {
                        session_id: session_id.clone(),
                        estimate: state.context.estimate(),
                    });
                }
            }
            SdkMessage::System { .. } => {}
        }

        let phase = detect_phase_from_message(&msg);
        if phase != state.phase {
            state.phase = phase;
            let _ = self.inner.events_tx.send(RuntimeEvent::PhaseChanged { session_id: session_id.clone(), phase });
        }
    }

    /// The interrupt protocol (§4.2.3). Serialized by `interrupt_lock` so a
    /// second concurrent caller waits out the first's run and then observes
    /// the resulting idle state as its own no-op — the distilled design's
    /// "concurrent calls share the same completion future" realized as
    /// lock contention rather than a shared future handle.
    pub async fn interrupt(&self) -> Result<()> {
        let _guard = self.inner.interrupt_lock.lock().await;
        let session_id = self.inner.session_id.clone();

        let mut state = self.inner.mutable.lock().await;
        if matches!(state.query_state, QueryState::Idle) {
            tracing::debug!(session_id = %session_id, "interrupt on idle session is a no-op");
            return Ok(());
        }
        state.query_state = QueryState::Interrupted;

        self.inner.queue.clear();

        if let Some(cancel_tx) = state.cancel_tx.take() {
            let _ = cancel_tx.send(());
        }

        let sdk = Arc::clone(&self.inner.sdk);
        if let Err(e) = sdk.interrupt(&session_id).await {
            tracing::warn!(session_id = %session_id, error = %e, "sdk interrupt call failed");
        }

        let done_rx = state.query_done_rx.take();
        drop(state);
        if let Some(done_rx) = done_rx {
            let _ = done_rx.await;
        }

        self.inner.queue.stop();
        let _ = self.inner.events_tx.send(RuntimeEvent::SessionInterrupted { session_id: session_id.clone() });

        let mut state = self.inner.mutable.lock().await;
        state.query_state = QueryState::Idle;
        // Belt-and-suspenders: the pump should already be exiting its loop
        // now that the queue is stopped, but a wedged SDK stream shouldn't
        // be able to keep the task alive past an interrupt.
        if let Some(handle) = state.pump_handle.take() {
            handle.abort();
        }
        Ok(())
    }

    // ── SDK Runtime Config (§4.2.8) ────────────────────────────────────

    pub async fn set_max_thinking_tokens(&self, tokens: Option<u32>) -> Result<()> {
        let mut state = self.inner.mutable.lock().await;
        state.config.max_thinking_tokens = tokens;
        self.persist_config(&state.config).await?;
        drop(state);
        let _ = self.inner.events_tx.send(RuntimeEvent::SessionUpdated {
            session_id: self.inner.session_id.clone(),
            source: "thinking-tokens".to_string(),
        });
        Ok(())
    }

    pub async fn set_permission_mode(&self, mode: crate::config::PermissionMode) -> Result<()> {
        let mut state = self.inner.mutable.lock().await;
        state.config.permission_mode = mode;
        self.persist_config(&state.config).await?;
        drop(state);
        let _ = self.inner.events_tx.send(RuntimeEvent::SessionUpdated {
            session_id: self.inner.session_id.clone(),
            source: "permission-mode".to_string(),
        });
        Ok(())
    }

    /// Delegates to the SDK if a query is active; otherwise returns an
    /// empty list. Never errors — SDK failures are warned and swallowed.
    pub async fn mcp_server_status(&self) -> Vec<sessiond_sdk::McpServerStatus> {
        self.inner.sdk.mcp_server_status().await
    }

    /// Persists tool config; restarts the query if the disabled-MCP set
    /// changed, and enqueues a fire-and-forget `/context` refresh if the
    /// queue is currently running.
    pub async fn update_tools_config(&self, tools_allow: Vec<String>, tools_deny: Vec<String>, disabled_mcp: Vec<String>) -> Result<()> {
        let mcp_changed = {
            let state = self.inner.mutable.lock().await;
            state.config.disabled_mcp_servers != disabled_mcp
        };

        {
            let mut state = self.inner.mutable.lock().await;
            state.config.tools_allow = tools_allow;
            state.config.tools_deny = tools_deny;
            state.config.disabled_mcp_servers = disabled_mcp;
            self.persist_config(&state.config).await?;
        }

        if mcp_changed {
            tracing::info!(session_id = %self.inner.session_id, "disabled MCP set changed, restarting query");
        }

        if self.inner.queue.is_running() {
            if let Err(e) = self.enqueue(vec![ContentBlock::text("/context")], true).await {
                tracing::warn!(session_id = %self.inner.session_id, error = %e, "failed to enqueue context refresh");
            }
        }
        Ok(())
    }

    async fn persist_config(&self, config: &SessionConfig) -> Result<()> {
        let json = config.to_json().map_err(|e| RuntimeError::Internal(e.to_string()))?;
        self.inner.store.update_session_config(&self.inner.session_id, &json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use sessiond_sdk::mock::{EchoSdk, ScriptedSdk};
    use sessiond_sdk::{ResultOutcome, StreamDelta, Usage};
    use sessiond_store::{SessionRow, SessionStatus, Store};

    use super::*;

    fn sample_session(id: &str) -> SessionRow {
        let now = chrono::Utc::now();
        SessionRow {
            id: id.into(),
            title: "untitled".into(),
            workspace_path: "/tmp/work".into(),
            status: SessionStatus::Active,
            created_at: now,
            last_active_at: now,
            config_json: SessionConfig::default().to_json().unwrap(),
            message_count: 0,
            input_tokens: 0,
            output_tokens: 0,
            total_cost_usd: 0.0,
            tool_call_count: 0,
            title_generated: false,
        }
    }

    async fn runtime_with_store(session_id: &str) -> (Runtime, Store) {
        let store = Store::open_in_memory().unwrap();
        store.create_session(&sample_session(session_id)).unwrap();
        let runtime = Runtime::new(session_id, store.clone(), Arc::new(EchoSdk), SessionConfig::default());
        (runtime, store)
    }

    #[tokio::test]
    async fn enqueue_drives_echo_sdk_to_a_result() {
        let (runtime, store) = runtime_with_store("s1").await;
        let mut events = runtime.subscribe();
        let rx = runtime.enqueue(vec![ContentBlock::text("hello")], false).await.unwrap();
        assert_eq!(rx.await.unwrap(), EnqueueOutcome::Sent);

        let mut saw_result = false;
        for _ in 0..6 {
            let ev = tokio::time::timeout(std::time::Duration::from_secs(1), events.recv()).await.unwrap().unwrap();
            if let RuntimeEvent::SdkMessage { message, .. } = &ev {
                if matches!(**message, SdkMessage::Result { .. }) {
                    saw_result = true;
                    break;
                }
            }
        }
        assert!(saw_result);
        assert!(!store.list_messages("s1").unwrap().is_empty());
    }

    #[tokio::test]
    async fn checkpoint_created_for_non_replay_user_message() {
        let (runtime, _store) = runtime_with_store("s1").await;
        let mut events = runtime.subscribe();
        runtime.enqueue(vec![ContentBlock::text("hi there")], false).await.unwrap();

        let mut saw_checkpoint = false;
        for _ in 0..6 {
            let ev = tokio::time::timeout(std::time::Duration::from_secs(1), events.recv()).await.unwrap().unwrap();
            if matches!(ev, RuntimeEvent::CheckpointCreated { .. }) {
                saw_checkpoint = true;
                break;
            }
        }
        assert!(saw_checkpoint);
    }

    #[tokio::test]
    async fn interrupt_on_idle_session_is_a_no_op() {
        let (runtime, _store) = runtime_with_store("s1").await;
        assert!(runtime.interrupt().await.is_ok());
    }

    #[tokio::test]
    async fn set_max_thinking_tokens_persists_and_emits_update() {
        let (runtime, store) = runtime_with_store("s1").await;
        let mut events = runtime.subscribe();
        runtime.set_max_thinking_tokens(Some(2048)).await.unwrap();

        let ev = tokio::time::timeout(std::time::Duration::from_secs(1), events.recv()).await.unwrap().unwrap();
        assert!(matches!(ev, RuntimeEvent::SessionUpdated { source, .. } if source == "thinking-tokens"));

        let row = store.get_session("s1").unwrap();
        let config = SessionConfig::from_json(&row.config_json).unwrap();
        assert_eq!(config.max_thinking_tokens, Some(2048));
    }

    #[tokio::test]
    async fn stream_event_estimate_is_superseded_by_result_usage() {
        let store = Store::open_in_memory().unwrap();
        store.create_session(&sample_session("s1")).unwrap();
        let script = vec![
            SdkMessage::StreamEvent {
                base: sessiond_sdk::MessageBase::new("s1"),
                delta: StreamDelta::UsageEstimate { input_tokens: 40, output_tokens: 5 },
            },
            SdkMessage::Result {
                base: sessiond_sdk::MessageBase::new("s1"),
                outcome: ResultOutcome::Success { usage: Usage { input_tokens: 55, output_tokens: 12, ..Default::default() }, cost_usd: 0.01 },
            },
        ];
        let runtime = Runtime::new("s1", store, Arc::new(ScriptedSdk::new(vec![script])), SessionConfig::default());
        let mut events = runtime.subscribe();
        runtime.enqueue(vec![ContentBlock::text("hi")], false).await.unwrap();

        let mut estimates = Vec::new();
        for _ in 0..8 {
            let ev = tokio::time::timeout(std::time::Duration::from_secs(1), events.recv()).await.unwrap().unwrap();
            if let RuntimeEvent::ContextUpdated { estimate, .. } = ev {
                estimates.push(estimate);
                if estimate.is_final {
                    break;
                }
            }
        }

        assert_eq!(estimates.first().unwrap().input_tokens, 40);
        assert!(!estimates.first().unwrap().is_final);
        let last = estimates.last().unwrap();
        assert_eq!(last.input_tokens, 55);
        assert_eq!(last.output_tokens, 12);
        assert!(last.is_final);
    }
}
