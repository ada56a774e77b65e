// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::fmt;

use async_trait::async_trait;

/// A client attached to the Hub over whatever transport actually carries
/// the bytes (WebSocket, P2P stream, in-process channel, …). The Hub never
/// assumes a specific transport — it only needs these three operations.
#[async_trait]
pub trait ClientConnection: Send + Sync {
    fn id(&self) -> &str;

    /// Hand a serialized frame to the transport. MUST NOT block the
    /// router: implementers buffer internally or drop per their own slow-
    /// client policy. A transport-level failure is reported back to the
    /// Hub as `Err` and counted against `failed`, never propagated.
    async fn send(&self, bytes: Vec<u8>) -> anyhow::Result<()>;

    fn is_open(&self) -> bool;
}

impl fmt::Debug for dyn ClientConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClientConnection({})", self.id())
    }
}
