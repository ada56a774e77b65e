// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::time::{Duration, Instant};

use regex::Regex;
use sessiond_sdk::SdkMessage;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ContextOverflow,
    RateLimit,
    Connection,
    Generic4xx,
    Generic5xx,
}

fn overflow_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"prompt is too long: \d+ tokens > (\d+) maximum").unwrap())
}

/// Classify a user message's text content as a circuit-breaker-relevant
/// error marker, extracting the context-window ceiling for overflow
/// errors. Non-matching text yields `None`.
pub fn classify(text: &str) -> Option<(ErrorKind, Option<u64>)> {
    if let Some(caps) = overflow_re().captures(text) {
        let max_tokens = caps.get(1).and_then(|m| m.as_str().parse().ok());
        return Some((ErrorKind::ContextOverflow, max_tokens));
    }
    if text.contains("Error: 429") {
        return Some((ErrorKind::RateLimit, None));
    }
    if text.contains("Connection error.") {
        return Some((ErrorKind::Connection, None));
    }
    if text.contains("Error: 400") {
        return Some((ErrorKind::Generic4xx, None));
    }
    if text.contains("Error: 5") {
        return Some((ErrorKind::Generic5xx, None));
    }
    None
}

struct AgentWindow {
    consecutive: u32,
    rapid_fire: Vec<Instant>,
    last_kind: Option<ErrorKind>,
}

impl AgentWindow {
    fn new() -> Self {
        Self { consecutive: 0, rapid_fire: Vec::new(), last_kind: None }
    }
}

#[derive(Debug, Clone)]
pub struct BreakerState {
    pub tripped: bool,
    pub trip_count: u64,
    pub message: Option<String>,
}

/// Per-session circuit breaker tracking failures per agent identity
/// (`"main"` or a sub-agent's tool-use id). Trips when one identity
/// produces `error_threshold` consecutive matching errors, or
/// `rapid_fire_threshold` errors within `rapid_fire_window` regardless of
/// kind.
pub struct CircuitBreaker {
    error_threshold: u32,
    rapid_fire_threshold: usize,
    rapid_fire_window: Duration,
    windows: HashMap<String, AgentWindow>,
    tripped: bool,
    trip_count: u64,
    message: Option<String>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(3, 5, Duration::from_secs(3))
    }
}

impl CircuitBreaker {
    pub fn new(error_threshold: u32, rapid_fire_threshold: usize, rapid_fire_window: Duration) -> Self {
        Self {
            error_threshold,
            rapid_fire_threshold,
            rapid_fire_window,
            windows: HashMap::new(),
            tripped: false,
            trip_count: 0,
            message: None,
        }
    }

    /// Feed one SDK message through the breaker. Only non-replay
    /// `SdkMessage::User` messages with a recognized marker are considered;
    /// everything else is ignored and returns `false`.
    pub fn observe(&mut self, msg: &SdkMessage) -> bool {
        if !msg.is_user() {
            return false;
        }
        let Some((kind, max_tokens)) = classify(&msg.text_content()) else {
            return false;
        };
        self.record(msg.base().agent_identity(), kind, max_tokens)
    }

    fn record(&mut self, identity: &str, kind: ErrorKind, max_tokens: Option<u64>) -> bool {
        let now = Instant::now();
        let window = self.windows.entry(identity.to_string()).or_insert_with(AgentWindow::new);

        if window.last_kind == Some(kind) {
            window.consecutive += 1;
        } else {
            window.consecutive = 1;
            window.last_kind = Some(kind);
        }

        window.rapid_fire.push(now);
        window.rapid_fire.retain(|t| now.duration_since(*t) < self.rapid_fire_window);

        let threshold_hit = window.consecutive >= self.error_threshold;
        let rapid_fire_hit = window.rapid_fire.len() >= self.rapid_fire_threshold;

        if threshold_hit || rapid_fire_hit {
            self.trip(kind, max_tokens);
            true
        } else {
            false
        }
    }

    fn trip(&mut self, kind: ErrorKind, max_tokens: Option<u64>) {
        self.tripped = true;
        self.trip_count += 1;
        self.message = Some(match kind {
            ErrorKind::ContextOverflow => {
                format!("Context limit exceeded ({} tokens)", max_tokens.unwrap_or_default())
            }
            ErrorKind::RateLimit => "Rate limit exceeded. Please wait before retrying.".into(),
            ErrorKind::Connection => {
                "Connection error detected repeatedly. Network connectivity issues may be preventing \
                 the agent from reaching the model provider."
                    .into()
            }
            ErrorKind::Generic4xx => "The model provider repeatedly rejected this request.".into(),
            ErrorKind::Generic5xx => "The model provider is repeatedly failing. Try again later.".into(),
        });
    }

    pub fn reset(&mut self) {
        self.windows.clear();
        self.tripped = false;
        self.message = None;
    }

    pub fn mark_success(&mut self, identity: &str) {
        self.windows.remove(identity);
    }

    pub fn state(&self) -> BreakerState {
        BreakerState { tripped: self.tripped, trip_count: self.trip_count, message: self.message.clone() }
    }
}
