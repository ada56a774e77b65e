// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where a message sits in the durable write path.
///
/// `Queued` messages have been accepted but not yet persisted; `Sent` means
/// the row exists but the turn that produced it has not resolved; `Saved` is
/// terminal. Recovery (see `sessiond-core::recovery`) promotes orphaned
/// `Queued`/`Sent` rows left by a crashed turn to `Saved`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    #[default]
    Queued,
    Sent,
    Saved,
}

/// A block of message content. `ToolResult` blocks carry the id of the tool
/// call they answer so the runtime can recover `parent_tool_use_id` without
/// a side channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    Thinking { text: String },
    ToolUse { id: String, name: String, input: serde_json::Value },
    ToolResult { tool_use_id: String, content: String, #[serde(default)] is_error: bool },
}

impl ContentBlock {
    pub fn text(s: impl Into<String>) -> Self {
        ContentBlock::Text { text: s.into() }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentBlock::Text { text } => Some(text),
            _ => None,
        }
    }

    pub fn tool_result_id(&self) -> Option<&str> {
        match self {
            ContentBlock::ToolResult { tool_use_id, .. } => Some(tool_use_id),
            _ => None,
        }
    }
}

/// Fields shared by every SDK message variant. Flattened into the tagged
/// enum below so the wire shape stays a single-level JSON object per the
/// external method-namespace contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageBase {
    pub uuid: Uuid,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_tool_use_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub internal: bool,
    #[serde(default)]
    pub status: MessageStatus,
    #[serde(default)]
    pub is_replay: bool,
}

impl MessageBase {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            session_id: session_id.into(),
            parent_tool_use_id: None,
            timestamp: Utc::now(),
            internal: false,
            status: MessageStatus::Queued,
            is_replay: false,
        }
    }

    /// Agent identity this message belongs to, for circuit-breaker bucketing:
    /// `"main"` when there is no parent tool use, else the tool-use id.
    pub fn agent_identity(&self) -> &str {
        self.parent_tool_use_id.as_deref().unwrap_or("main")
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    #[serde(default)]
    pub cache_read_tokens: u32,
    #[serde(default)]
    pub cache_write_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ResultOutcome {
    Success { usage: Usage, cost_usd: f64 },
    Error { message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "subtype", rename_all = "snake_case")]
pub enum SystemSubtype {
    Init,
    Compaction { tokens_before: u32, tokens_after: u32 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "delta", rename_all = "snake_case")]
pub enum StreamDelta {
    Text(String),
    Thinking(String),
    UsageEstimate { input_tokens: u32, output_tokens: u32 },
}

/// One step in a conversation, as produced by the upstream agent SDK.
///
/// Ordering is append-only by arrival, never by `timestamp` alone — two
/// messages may share a timestamp under coarse clock resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SdkMessage {
    User {
        #[serde(flatten)]
        base: MessageBase,
        content: Vec<ContentBlock>,
    },
    Assistant {
        #[serde(flatten)]
        base: MessageBase,
        content: Vec<ContentBlock>,
    },
    System {
        #[serde(flatten)]
        base: MessageBase,
        #[serde(flatten)]
        subtype: SystemSubtype,
    },
    Result {
        #[serde(flatten)]
        base: MessageBase,
        #[serde(flatten)]
        outcome: ResultOutcome,
    },
    StreamEvent {
        #[serde(flatten)]
        base: MessageBase,
        #[serde(flatten)]
        delta: StreamDelta,
    },
}

impl SdkMessage {
    pub fn base(&self) -> &MessageBase {
        match self {
            SdkMessage::User { base, .. }
            | SdkMessage::Assistant { base, .. }
            | SdkMessage::System { base, .. }
            | SdkMessage::Result { base, .. }
            | SdkMessage::StreamEvent { base, .. } => base,
        }
    }

    pub fn base_mut(&mut self) -> &mut MessageBase {
        match self {
            SdkMessage::User { base, .. }
            | SdkMessage::Assistant { base, .. }
            | SdkMessage::System { base, .. }
            | SdkMessage::Result { base, .. }
            | SdkMessage::StreamEvent { base, .. } => base,
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.base().uuid
    }

    pub fn is_user(&self) -> bool {
        matches!(self, SdkMessage::User { .. })
    }

    /// First 100 characters of the first text block, used as a checkpoint
    /// preview. Returns `None` for messages with no text content.
    pub fn text_preview(&self, max_len: usize) -> Option<String> {
        let content = match self {
            SdkMessage::User { content, .. } | SdkMessage::Assistant { content, .. } => content,
            _ => return None,
        };
        let text = content.iter().find_map(ContentBlock::as_text)?;
        Some(text.chars().take(max_len).collect())
    }

    /// Concatenated text content, used by the circuit breaker's marker scan.
    pub fn text_content(&self) -> String {
        match self {
            SdkMessage::User { content, .. } | SdkMessage::Assistant { content, .. } => content
                .iter()
                .filter_map(ContentBlock::as_text)
                .collect::<Vec<_>>()
                .join("\n"),
            _ => String::new(),
        }
    }
}
