// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SchedulerEvent {
    RecurringJobCreated { job_id: Uuid, room_id: String },
    RecurringJobUpdated { job_id: Uuid, room_id: String },
    /// `session_id` carries the compound `"room:<roomId>"` scope used by the
    /// Hub's routing layer.
    RecurringJobTriggered { session_id: String, room_id: String, job_id: Uuid, task_id: Uuid },
}
