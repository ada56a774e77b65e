// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use sessiond_sdk::SdkMessage;
use serde::{Deserialize, Serialize};

/// The Agent Query Lifecycle (§4.2.2). Transitions are driven by the
/// message pump, never set directly by a client request — `idle` →
/// `starting` on first enqueue, `starting` → `processing` on first SDK
/// message, `processing` → `idle`/`interrupted`, `interrupted` → `idle`
/// once the interrupt protocol finalizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryState {
    Idle,
    Starting,
    Processing,
    Interrupted,
}

/// A sub-state derived from incoming SDK messages, published alongside
/// `QueryState` for UI hints. Never gates a `QueryState` transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Thinking,
    Streaming,
    Tool,
}

/// Derive the UI-facing phase from one SDK message. `stream_event` carries
/// the finest-grained signal (thinking vs. text deltas); `assistant`
/// messages with a `tool_use` block report `Tool`; everything else that
/// isn't a terminal `result` reports `Streaming` as a conservative default.
pub fn detect_phase_from_message(msg: &SdkMessage) -> Phase {
    match msg {
        SdkMessage::StreamEvent { delta, .. } => match delta {
            sessiond_sdk::StreamDelta::Thinking(_) => Phase::Thinking,
            sessiond_sdk::StreamDelta::Text(_) | sessiond_sdk::StreamDelta::UsageEstimate { .. } => Phase::Streaming,
        },
        SdkMessage::Assistant { content, .. } => {
            if content.iter().any(|b| matches!(b, sessiond_sdk::ContentBlock::ToolUse { .. })) {
                Phase::Tool
            } else {
                Phase::Streaming
            }
        }
        SdkMessage::Result { .. } => Phase::Idle,
        SdkMessage::User { .. } | SdkMessage::System { .. } => Phase::Idle,
    }
}
