// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;

/// A request handler registered under one method name. Handlers return a
/// plain `Result<Value, String>` — the Hub is responsible for turning a
/// handler failure (or panic) into the wire-level `{success:false, error}`
/// shape; handlers never need to know about that framing.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle(&self, payload: serde_json::Value) -> Result<serde_json::Value, String>;
}

#[async_trait]
impl<F, Fut> RequestHandler for F
where
    F: Fn(serde_json::Value) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<serde_json::Value, String>> + Send + 'static,
{
    async fn handle(&self, payload: serde_json::Value) -> Result<serde_json::Value, String> {
        (self)(payload).await
    }
}
