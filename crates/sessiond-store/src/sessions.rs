// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};
use crate::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Archived,
    Deleted,
}

impl SessionStatus {
    fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Archived => "archived",
            SessionStatus::Deleted => "deleted",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "archived" => SessionStatus::Archived,
            "deleted" => SessionStatus::Deleted,
            _ => SessionStatus::Active,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionRow {
    pub id: String,
    pub title: String,
    pub workspace_path: String,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    /// Opaque serialized `SessionConfig` — the store does not interpret it.
    pub config_json: String,
    pub message_count: i64,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub total_cost_usd: f64,
    pub tool_call_count: i64,
    pub title_generated: bool,
}

impl Store {
    pub fn create_session(&self, row: &SessionRow) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO sessions (id, title, workspace_path, status, created_at, last_active_at, config_json,
                message_count, input_tokens, output_tokens, total_cost_usd, tool_call_count, title_generated)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                row.id,
                row.title,
                row.workspace_path,
                row.status.as_str(),
                row.created_at.to_rfc3339(),
                row.last_active_at.to_rfc3339(),
                row.config_json,
                row.message_count,
                row.input_tokens,
                row.output_tokens,
                row.total_cost_usd,
                row.tool_call_count,
                row.title_generated as i64,
            ],
        )?;
        Ok(())
    }

    pub fn get_session(&self, id: &str) -> Result<SessionRow> {
        let conn = self.lock();
        conn.query_row(
            "SELECT id, title, workspace_path, status, created_at, last_active_at, config_json,
                message_count, input_tokens, output_tokens, total_cost_usd, tool_call_count, title_generated
             FROM sessions WHERE id = ?1",
            params![id],
            row_from_sql,
        )
        .optional()?
        .ok_or_else(|| StoreError::NotFound(format!("session {id}")))
    }

    pub fn list_active_sessions(&self) -> Result<Vec<SessionRow>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, title, workspace_path, status, created_at, last_active_at, config_json,
                message_count, input_tokens, output_tokens, total_cost_usd, tool_call_count, title_generated
             FROM sessions WHERE status = 'active' ORDER BY last_active_at DESC",
        )?;
        let rows = stmt.query_map([], row_from_sql)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    pub fn update_session_counters(
        &self,
        id: &str,
        message_count: i64,
        input_tokens: i64,
        output_tokens: i64,
        total_cost_usd: f64,
        tool_call_count: i64,
    ) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE sessions SET message_count=?2, input_tokens=?3, output_tokens=?4,
                total_cost_usd=?5, tool_call_count=?6, last_active_at=?7 WHERE id=?1",
            params![id, message_count, input_tokens, output_tokens, total_cost_usd, tool_call_count, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn update_session_config(&self, id: &str, config_json: &str) -> Result<()> {
        let conn = self.lock();
        conn.execute("UPDATE sessions SET config_json=?2 WHERE id=?1", params![id, config_json])?;
        Ok(())
    }

    pub fn set_session_status(&self, id: &str, status: SessionStatus) -> Result<()> {
        let conn = self.lock();
        conn.execute("UPDATE sessions SET status=?2 WHERE id=?1", params![id, status.as_str()])?;
        Ok(())
    }

    pub fn delete_session(&self, id: &str) -> Result<()> {
        let conn = self.lock();
        conn.execute("DELETE FROM sessions WHERE id=?1", params![id])?;
        Ok(())
    }
}

fn row_from_sql(r: &rusqlite::Row) -> rusqlite::Result<SessionRow> {
    let created_at: String = r.get(4)?;
    let last_active_at: String = r.get(5)?;
    Ok(SessionRow {
        id: r.get(0)?,
        title: r.get(1)?,
        workspace_path: r.get(2)?,
        status: SessionStatus::parse(&r.get::<_, String>(3)?),
        created_at: DateTime::parse_from_rfc3339(&created_at).unwrap().with_timezone(&Utc),
        last_active_at: DateTime::parse_from_rfc3339(&last_active_at).unwrap().with_timezone(&Utc),
        config_json: r.get(6)?,
        message_count: r.get(7)?,
        input_tokens: r.get(8)?,
        output_tokens: r.get(9)?,
        total_cost_usd: r.get(10)?,
        tool_call_count: r.get(11)?,
        title_generated: r.get::<_, i64>(12)? != 0,
    })
}
