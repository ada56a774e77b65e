// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use sessiond_sdk::SdkMessage;
use serde::Serialize;

use crate::checkpoint::Checkpoint;
use crate::context_tracker::ContextEstimate;
use crate::phase::Phase;

/// Everything a Runtime publishes, fanned out via `broadcast` to whatever
/// adapts it onto the Hub (§10.5's hosting binary wires this to
/// `sessiond_hub::Hub::publish`, keeping `sessiond-core` free of a direct
/// dependency on the Hub crate).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "method")]
pub enum RuntimeEvent {
    #[serde(rename = "sdk.message")]
    SdkMessage { session_id: String, message: Box<SdkMessage> },

    #[serde(rename = "state.sdkMessages.delta")]
    SdkMessagesDelta { session_id: String, added: Box<SdkMessage>, version: u64 },

    #[serde(rename = "checkpoint.created")]
    CheckpointCreated { session_id: String, checkpoint: Checkpoint },

    #[serde(rename = "session.interrupted")]
    SessionInterrupted { session_id: String },

    #[serde(rename = "session.updated")]
    SessionUpdated { session_id: String, source: String },

    #[serde(rename = "session.tripped")]
    CircuitBreakerTripped { session_id: String, message: String },

    /// The UI-hint sub-state (§4.2.2's closing note). Published separately
    /// from `QueryState` transitions; never gates them.
    #[serde(rename = "session.phase")]
    PhaseChanged { session_id: String, phase: Phase },

    /// Context Tracker update (§4.2.4): fired on every `stream_event` usage
    /// estimate and once more, final, when `result` usage lands.
    #[serde(rename = "session.context")]
    ContextUpdated { session_id: String, estimate: ContextEstimate },
}

impl RuntimeEvent {
    pub fn session_id(&self) -> &str {
        match self {
            RuntimeEvent::SdkMessage { session_id, .. }
            | RuntimeEvent::SdkMessagesDelta { session_id, .. }
            | RuntimeEvent::CheckpointCreated { session_id, .. }
            | RuntimeEvent::SessionInterrupted { session_id }
            | RuntimeEvent::SessionUpdated { session_id, .. }
            | RuntimeEvent::CircuitBreakerTripped { session_id, .. }
            | RuntimeEvent::PhaseChanged { session_id, .. }
            | RuntimeEvent::ContextUpdated { session_id, .. } => session_id,
        }
    }

    /// The Hub wire method name this event publishes under (§6).
    pub fn method(&self) -> &'static str {
        match self {
            RuntimeEvent::SdkMessage { .. } => "sdk.message",
            RuntimeEvent::SdkMessagesDelta { .. } => "state.sdkMessages.delta",
            RuntimeEvent::CheckpointCreated { .. } => "checkpoint.created",
            RuntimeEvent::SessionInterrupted { .. } => "session.interrupted",
            RuntimeEvent::SessionUpdated { .. } => "session.updated",
            RuntimeEvent::CircuitBreakerTripped { .. } => "session.tripped",
            RuntimeEvent::PhaseChanged { .. } => "session.phase",
            RuntimeEvent::ContextUpdated { .. } => "session.context",
        }
    }
}
