// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use tokio::sync::oneshot;

use crate::message::{ContentBlock, SdkMessage};

/// A stream of messages produced by one agent query. The stream ends with a
/// `SdkMessage::Result` on success, or simply stops (with an error yielded
/// on the last `Item`) on failure.
pub type MessageStream = Pin<Box<dyn Stream<Item = anyhow::Result<SdkMessage>> + Send>>;

/// Input to one agent query: the session to run in and the content to feed
/// it. The SDK implementation is responsible for combining this with
/// whatever conversation history it tracks internally.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub session_id: String,
    pub input: Vec<ContentBlock>,
    pub max_thinking_tokens: Option<u32>,
    pub permission_mode: Option<String>,
}

impl QueryRequest {
    pub fn new(session_id: impl Into<String>, input: Vec<ContentBlock>) -> Self {
        Self { session_id: session_id.into(), input, max_thinking_tokens: None, permission_mode: None }
    }
}

/// The contract the session runtime drives against. Implementations wrap
/// whatever upstream agent process or client library actually exists; the
/// runtime only needs a message stream and a way to ask it to stop early.
#[async_trait]
pub trait AgentSdk: Send + Sync {
    fn name(&self) -> &str;

    /// Start a query. The returned stream is consumed by the runtime's
    /// message pump until it ends or `cancel` fires.
    async fn query(&self, req: QueryRequest, cancel: oneshot::Receiver<()>) -> anyhow::Result<MessageStream>;

    /// Best-effort live interrupt of an in-flight query, used in addition to
    /// cancelling the stream. Implementations without a native interrupt
    /// operation may no-op.
    async fn interrupt(&self, _session_id: &str) -> anyhow::Result<()> {
        Ok(())
    }

    /// Live MCP server status, if the SDK exposes one. Empty when inactive
    /// or unsupported — never an error.
    async fn mcp_server_status(&self) -> Vec<McpServerStatus> {
        Vec::new()
    }
}

#[derive(Debug, Clone)]
pub struct McpServerStatus {
    pub name: String,
    pub connected: bool,
}
