// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod message;
mod stream;

pub mod mock;

pub use message::{
    ContentBlock, MessageBase, MessageStatus, ResultOutcome, SdkMessage, StreamDelta, SystemSubtype, Usage,
};
pub use stream::{AgentSdk, McpServerStatus, MessageStream, QueryRequest};
