// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};
use crate::Store;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    #[default]
    Single,
    Parallel,
    Serial,
    ParallelThenMerge,
}

impl ExecutionMode {
    fn as_str(self) -> &'static str {
        match self {
            ExecutionMode::Single => "single",
            ExecutionMode::Parallel => "parallel",
            ExecutionMode::Serial => "serial",
            ExecutionMode::ParallelThenMerge => "parallel_then_merge",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "parallel" => ExecutionMode::Parallel,
            "serial" => ExecutionMode::Serial,
            "parallel_then_merge" => ExecutionMode::ParallelThenMerge,
            _ => ExecutionMode::Single,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TaskRow {
    pub id: String,
    pub room_id: String,
    pub title: String,
    pub description: String,
    pub priority: String,
    pub execution_mode: ExecutionMode,
    pub session_assignments: Vec<String>,
    pub recurring_job_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Store {
    pub fn create_task(&self, row: &TaskRow) -> Result<()> {
        let conn = self.lock();
        let assignments = serde_json::to_string(&row.session_assignments)?;
        conn.execute(
            "INSERT INTO tasks (id, room_id, title, description, priority, execution_mode,
                assignments_json, recurring_job_id, created_at) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)",
            params![
                row.id,
                row.room_id,
                row.title,
                row.description,
                row.priority,
                row.execution_mode.as_str(),
                assignments,
                row.recurring_job_id,
                row.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_task(&self, id: &str) -> Result<TaskRow> {
        let conn = self.lock();
        conn.query_row(
            "SELECT id, room_id, title, description, priority, execution_mode, assignments_json,
                recurring_job_id, created_at FROM tasks WHERE id = ?1",
            params![id],
            row_from_sql,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound(format!("task {id}")),
            other => other.into(),
        })
    }

    pub fn list_tasks_for_room(&self, room_id: &str) -> Result<Vec<TaskRow>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, room_id, title, description, priority, execution_mode, assignments_json,
                recurring_job_id, created_at FROM tasks WHERE room_id = ?1 ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map(params![room_id], row_from_sql)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }
}

fn row_from_sql(r: &rusqlite::Row) -> rusqlite::Result<TaskRow> {
    let assignments_json: String = r.get(6)?;
    let created_at: String = r.get(8)?;
    Ok(TaskRow {
        id: r.get(0)?,
        room_id: r.get(1)?,
        title: r.get(2)?,
        description: r.get(3)?,
        priority: r.get(4)?,
        execution_mode: ExecutionMode::parse(&r.get::<_, String>(5)?),
        session_assignments: serde_json::from_str(&assignments_json).unwrap_or_default(),
        recurring_job_id: r.get(7)?,
        created_at: DateTime::parse_from_rfc3339(&created_at).unwrap().with_timezone(&Utc),
    })
}
