// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use sessiond_sdk::Usage;

/// Best-known snapshot of how much of the model's context window a turn has
/// consumed. Populated two ways (§4.2.4): a running estimate refreshed by
/// every `stream_event` delta while a turn is still streaming, and an exact
/// count that lands once the turn's `result` message arrives and supersedes
/// the estimate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContextEstimate {
    pub input_tokens: u32,
    pub output_tokens: u32,
    /// `true` once `handle_result_usage` has landed an exact count for the
    /// in-flight turn; the estimate is authoritative rather than streamed.
    pub is_final: bool,
}

/// Tracks live context-window usage for one session's current turn.
/// Reset on every new turn by the caller via [`ContextTracker::reset`].
#[derive(Debug, Default)]
pub struct ContextTracker {
    estimate: ContextEstimate,
}

impl ContextTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a `stream_event` usage-estimate delta. Ignored once the turn's
    /// exact `result` usage has already landed — a late delta from a slow
    /// transport must not regress an authoritative count.
    pub fn observe_stream_estimate(&mut self, input_tokens: u32, output_tokens: u32) {
        if self.estimate.is_final {
            return;
        }
        self.estimate.input_tokens = input_tokens;
        self.estimate.output_tokens = output_tokens;
    }

    /// `result`'s `handleResultUsage` equivalent: the turn is done, so the
    /// reported usage replaces whatever estimate was accumulating.
    pub fn handle_result_usage(&mut self, usage: &Usage) {
        self.estimate = ContextEstimate {
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            is_final: true,
        };
    }

    /// Clear the tracker for the next turn's streaming estimates.
    pub fn reset(&mut self) {
        self.estimate = ContextEstimate::default();
    }

    pub fn estimate(&self) -> ContextEstimate {
        self.estimate
    }
}
