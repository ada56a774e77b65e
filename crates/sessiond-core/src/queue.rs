// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sessiond_sdk::ContentBlock;
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// How the enqueue future resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Sent,
    Interrupted,
    Timeout,
}

struct QueuedMessage {
    id: Uuid,
    content: Vec<ContentBlock>,
    internal: bool,
    parent_tool_use_id: Option<String>,
}

struct PendingCompletion {
    tx: Option<oneshot::Sender<EnqueueOutcome>>,
    timeout_handle: JoinHandle<()>,
}

struct QueueState {
    items: VecDeque<QueuedMessage>,
    pending: HashMap<Uuid, PendingCompletion>,
    running: bool,
    generation: u64,
}

/// One item handed to the agent pump by [`MessageQueue::next`]. The
/// consumer must call [`MessageQueue::complete`] with this id exactly once
/// — that is the `onSent` callback from the distilled design.
pub struct DequeuedMessage {
    pub id: Uuid,
    pub content: Vec<ContentBlock>,
    pub internal: bool,
    pub parent_tool_use_id: Option<String>,
}

/// A bounded, FIFO, generation-guarded queue feeding one session's agent
/// pump. Every enqueue arms a consumption timeout; `clear()` rejects
/// everything still outstanding (queued or handed off but not yet
/// completed) without touching `running`/`generation`.
pub struct MessageQueue {
    state: Arc<Mutex<QueueState>>,
    notify: Arc<Notify>,
    consume_timeout: Duration,
}

impl Default for MessageQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageQueue {
    const DEFAULT_CONSUME_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new() -> Self {
        Self::with_timeout(Self::DEFAULT_CONSUME_TIMEOUT)
    }

    pub fn with_timeout(consume_timeout: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(QueueState {
                items: VecDeque::new(),
                pending: HashMap::new(),
                running: false,
                generation: 0,
            })),
            notify: Arc::new(Notify::new()),
            consume_timeout,
        }
    }

    /// Accept content onto the queue. Returns the assigned id and a
    /// receiver that resolves once the item is consumed (`Sent`), the
    /// queue is cleared (`Interrupted`), or the consumption timeout elapses
    /// (`Timeout`).
    pub fn enqueue(&self, content: Vec<ContentBlock>, internal: bool) -> (Uuid, oneshot::Receiver<EnqueueOutcome>) {
        let id = Uuid::new_v4();
        let parent_tool_use_id = content.iter().find_map(ContentBlock::tool_result_id).map(str::to_string);
        let (tx, rx) = oneshot::channel();

        let timeout_state = Arc::clone(&self.state);
        let timeout_handle = tokio::spawn(timeout_after(timeout_state, id, self.consume_timeout));

        {
            let mut state = self.state.lock().expect("message queue mutex poisoned");
            state.items.push_back(QueuedMessage { id, content, internal, parent_tool_use_id });
            state.pending.insert(id, PendingCompletion { tx: Some(tx), timeout_handle });
        }
        self.notify.notify_one();
        (id, rx)
    }

    /// The lazy, restartable generator. Blocks until an item is available,
    /// the queue stops, or a newer generation has started — in which case
    /// this call returns `None` and the caller's loop should exit.
    pub async fn next(&self, generation: u64) -> Option<DequeuedMessage> {
        loop {
            {
                let mut state = self.state.lock().expect("message queue mutex poisoned");
                if state.generation != generation || !state.running {
                    return None;
                }
                if let Some(item) = state.items.pop_front() {
                    return Some(DequeuedMessage {
                        id: item.id,
                        content: item.content,
                        internal: item.internal,
                        parent_tool_use_id: item.parent_tool_use_id,
                    });
                }
            }
            self.notify.notified().await;
        }
    }

    /// Resolve the enqueue future for `id` with `Sent` and cancel its
    /// timeout. Must be called exactly once per dequeued item.
    pub fn complete(&self, id: Uuid) {
        let mut state = self.state.lock().expect("message queue mutex poisoned");
        if let Some(mut pending) = state.pending.remove(&id) {
            pending.timeout_handle.abort();
            if let Some(tx) = pending.tx.take() {
                let _ = tx.send(EnqueueOutcome::Sent);
            }
        }
    }

    /// Reject every outstanding future with `Interrupted`, drop queued
    /// items, and cancel their timeouts. `running`/`generation` are left
    /// untouched.
    pub fn clear(&self) {
        let mut state = self.state.lock().expect("message queue mutex poisoned");
        state.items.clear();
        for (_, mut pending) in state.pending.drain() {
            pending.timeout_handle.abort();
            if let Some(tx) = pending.tx.take() {
                let _ = tx.send(EnqueueOutcome::Interrupted);
            }
        }
    }

    /// Start a new generation and mark the queue running. The generator
    /// loop that owns this generation keeps consuming until a later
    /// `start()` bumps the generation again or `stop()` clears `running`.
    pub fn start(&self) -> u64 {
        let mut state = self.state.lock().expect("message queue mutex poisoned");
        state.generation += 1;
        state.running = true;
        self.notify.notify_waiters();
        state.generation
    }

    /// Mark the queue not running. Any `next()` call in flight wakes and
    /// returns `None` on its next poll.
    pub fn stop(&self) {
        let mut state = self.state.lock().expect("message queue mutex poisoned");
        state.running = false;
        self.notify.notify_waiters();
    }

    pub fn size(&self) -> usize {
        self.state.lock().expect("message queue mutex poisoned").items.len()
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().expect("message queue mutex poisoned").running
    }

    pub fn generation(&self) -> u64 {
        self.state.lock().expect("message queue mutex poisoned").generation
    }
}

async fn timeout_after(state: Arc<Mutex<QueueState>>, id: Uuid, duration: Duration) {
    tokio::time::sleep(duration).await;
    let mut state = state.lock().expect("message queue mutex poisoned");
    state.items.retain(|m| m.id != id);
    if let Some(mut pending) = state.pending.remove(&id) {
        if let Some(tx) = pending.tx.take() {
            let _ = tx.send(EnqueueOutcome::Timeout);
        }
    }
}
