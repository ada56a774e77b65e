// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod checkpoint;
mod circuit_breaker;
mod config;
mod context_tracker;
mod draft;
mod error;
mod events;
mod manager;
mod phase;
mod queue;
mod recovery;
mod runtime;

pub use checkpoint::{Checkpoint, CheckpointTracker};
pub use circuit_breaker::{BreakerState, CircuitBreaker, ErrorKind};
pub use config::{AgentDefinition, OutputFormat, PermissionMode, SandboxConfig, SessionConfig, ThinkingLevel};
pub use context_tracker::{ContextEstimate, ContextTracker};
pub use draft::DraftCoalescer;
pub use error::{Result, RuntimeError};
pub use events::RuntimeEvent;
pub use manager::SessionManager;
pub use phase::{detect_phase_from_message, Phase, QueryState};
pub use queue::{DequeuedMessage, EnqueueOutcome, MessageQueue};
pub use recovery::{recover_orphans, RecoveryReport};
pub use runtime::Runtime;
