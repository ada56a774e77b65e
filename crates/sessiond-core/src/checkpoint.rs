// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct Checkpoint {
    pub id: Uuid,
    pub session_id: String,
    pub preview: String,
    pub turn_number: u64,
    pub created_at: DateTime<Utc>,
}

/// Ordered record of checkpoints for one session. Turn numbers are assigned
/// once and never renumbered — `rewindTo` removes everything past the
/// target but leaves the survivors' turn numbers exactly as they were.
#[derive(Default)]
pub struct CheckpointTracker {
    order: Vec<Uuid>,
    by_id: HashMap<Uuid, Checkpoint>,
    next_turn: u64,
}

impl CheckpointTracker {
    pub fn new() -> Self {
        Self { order: Vec::new(), by_id: HashMap::new(), next_turn: 1 }
    }

    /// Create a checkpoint for a non-replay user message. Returns `None`
    /// for anything else — callers should only invoke this for
    /// `SdkMessage::User` variants that are not replays.
    pub fn create(&mut self, id: Uuid, session_id: impl Into<String>, preview: String) -> Checkpoint {
        let checkpoint = Checkpoint {
            id,
            session_id: session_id.into(),
            preview,
            turn_number: self.next_turn,
            created_at: Utc::now(),
        };
        self.next_turn += 1;
        self.order.push(id);
        self.by_id.insert(id, checkpoint.clone());
        checkpoint
    }

    /// Checkpoints newest-first.
    pub fn checkpoints(&self) -> Vec<Checkpoint> {
        self.order.iter().rev().map(|id| self.by_id[id].clone()).collect()
    }

    pub fn get(&self, id: Uuid) -> Option<&Checkpoint> {
        self.by_id.get(&id)
    }

    pub fn has(&self, id: Uuid) -> bool {
        self.by_id.contains_key(&id)
    }

    pub fn latest(&self) -> Option<Checkpoint> {
        self.order.last().map(|id| self.by_id[id].clone())
    }

    pub fn first(&self) -> Option<Checkpoint> {
        self.order.first().map(|id| self.by_id[id].clone())
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Remove every checkpoint with a turn number strictly greater than
    /// `id`'s. Returns the count removed, or 0 if `id` is unknown (a
    /// no-op, per the idempotence contract).
    pub fn rewind_to(&mut self, id: Uuid) -> usize {
        let Some(target) = self.by_id.get(&id).map(|c| c.turn_number) else {
            return 0;
        };
        let mut removed = 0;
        self.order.retain(|cid| {
            let keep = self.by_id[cid].turn_number <= target;
            if !keep {
                removed += 1;
            }
            keep
        });
        self.by_id.retain(|_, c| c.turn_number <= target);
        removed
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.by_id.clear();
        self.next_turn = 1;
    }
}
