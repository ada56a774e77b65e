// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Deterministic test doubles for [`crate::AgentSdk`], mirroring the
//! scripted-provider pattern used throughout the upstream agent stack's own
//! test suites.
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream;
use tokio::sync::oneshot;

use crate::message::{ContentBlock, MessageBase, ResultOutcome, SdkMessage, Usage};
use crate::stream::{AgentSdk, MessageStream, QueryRequest};

/// Echoes the user's input back as a single assistant turn, then a success
/// result. Never trips the circuit breaker and never calls `cancel`.
#[derive(Default)]
pub struct EchoSdk;

#[async_trait]
impl AgentSdk for EchoSdk {
    fn name(&self) -> &str {
        "echo-mock"
    }

    async fn query(&self, req: QueryRequest, _cancel: oneshot::Receiver<()>) -> anyhow::Result<MessageStream> {
        let reply = req
            .input
            .iter()
            .find_map(ContentBlock::as_text)
            .unwrap_or("[no input]")
            .to_string();

        let assistant = SdkMessage::Assistant {
            base: MessageBase::new(req.session_id.clone()),
            content: vec![ContentBlock::text(format!("echo: {reply}"))],
        };
        let result = SdkMessage::Result {
            base: MessageBase::new(req.session_id),
            outcome: ResultOutcome::Success {
                usage: Usage { input_tokens: 10, output_tokens: 10, ..Default::default() },
                cost_usd: 0.0,
            },
        };
        Ok(Box::pin(stream::iter(vec![Ok(assistant), Ok(result)])))
    }
}

/// Replays a fixed script of messages on each query, ignoring the input.
/// Each call to `query` pops the next script off the front of the queue;
/// once exhausted, falls back to a single error result.
pub struct ScriptedSdk {
    scripts: Arc<Mutex<Vec<Vec<SdkMessage>>>>,
}

impl ScriptedSdk {
    pub fn new(scripts: Vec<Vec<SdkMessage>>) -> Self {
        Self { scripts: Arc::new(Mutex::new(scripts)) }
    }
}

#[async_trait]
impl AgentSdk for ScriptedSdk {
    fn name(&self) -> &str {
        "scripted-mock"
    }

    async fn query(&self, req: QueryRequest, _cancel: oneshot::Receiver<()>) -> anyhow::Result<MessageStream> {
        let script = {
            let mut scripts = self.scripts.lock().unwrap();
            if scripts.is_empty() {
                vec![SdkMessage::Result {
                    base: MessageBase::new(req.session_id),
                    outcome: ResultOutcome::Error { message: "no more scripts".into() },
                }]
            } else {
                scripts.remove(0)
            }
        };
        Ok(Box::pin(stream::iter(script.into_iter().map(Ok))))
    }
}
