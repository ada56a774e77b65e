// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use chrono::{DateTime, Utc};
use sessiond_store::{ExecutionMode, RecurringJobRow};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, SchedulerError};
use crate::schedule::Schedule;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskTemplate {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_priority")]
    pub priority: String,
    #[serde(default)]
    pub execution_mode: ExecutionMode,
    #[serde(default)]
    pub initial_session_assignments: Vec<String>,
}

fn default_priority() -> String {
    "normal".into()
}

#[derive(Debug, Clone)]
pub struct RecurringJob {
    pub id: Uuid,
    pub room_id: String,
    pub name: String,
    pub description: String,
    pub schedule: Schedule,
    pub template: TaskTemplate,
    pub enabled: bool,
    pub max_runs: Option<i64>,
    pub run_count: i64,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
}

impl RecurringJob {
    pub fn has_reached_max_runs(&self) -> bool {
        self.max_runs.map(|m| self.run_count >= m).unwrap_or(false)
    }
}

pub fn job_from_row(row: &RecurringJobRow) -> Result<RecurringJob> {
    let id = Uuid::parse_str(&row.id).map_err(|e| SchedulerError::InvalidSchedule(format!("bad job id: {e}")))?;
    let schedule: Schedule = serde_json::from_str(&row.schedule_json)
        .map_err(|e| SchedulerError::InvalidSchedule(format!("corrupt schedule: {e}")))?;
    let template: TaskTemplate = serde_json::from_str(&row.template_json)
        .map_err(|e| SchedulerError::InvalidSchedule(format!("corrupt template: {e}")))?;
    Ok(RecurringJob {
        id,
        room_id: row.room_id.clone(),
        name: row.name.clone(),
        description: row.description.clone(),
        schedule,
        template,
        enabled: row.enabled,
        max_runs: row.max_runs,
        run_count: row.run_count,
        last_run_at: row.last_run_at,
        next_run_at: row.next_run_at,
    })
}

pub fn row_from_job(job: &RecurringJob) -> Result<RecurringJobRow> {
    Ok(RecurringJobRow {
        id: job.id.to_string(),
        room_id: job.room_id.clone(),
        name: job.name.clone(),
        description: job.description.clone(),
        schedule_json: serde_json::to_string(&job.schedule)?,
        template_json: serde_json::to_string(&job.template)?,
        enabled: job.enabled,
        max_runs: job.max_runs,
        run_count: job.run_count,
        last_run_at: job.last_run_at,
        next_run_at: job.next_run_at,
    })
}
