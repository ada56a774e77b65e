// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("session not found: {0}")]
    NotFound(String),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("timed out waiting for {0}")]
    Timeout(String),

    #[error("circuit breaker tripped: {0}")]
    Tripped(String),

    #[error("upstream agent SDK call failed: {0}")]
    UpstreamFailure(#[from] anyhow::Error),

    #[error("internal invariant violated: {0}")]
    Internal(String),

    #[error(transparent)]
    Store(#[from] sessiond_store::StoreError),
}

pub type Result<T> = std::result::Result<T, RuntimeError>;
