// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HubError {
    #[error("no handler registered for method: {0}")]
    NoHandler(String),

    #[error("request to {0} timed out")]
    Timeout(String),

    #[error("handler for {0} failed: {1}")]
    HandlerFailed(String, String),

    #[error("sessionId/method must not contain ':': {0}")]
    ReservedCharacter(String),

    #[error("not connected to server")]
    Disconnected,
}

pub type Result<T> = std::result::Result<T, HubError>;
