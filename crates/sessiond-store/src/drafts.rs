// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use crate::error::Result;
use crate::Store;

#[derive(Debug, Clone)]
pub struct Draft {
    pub session_id: String,
    pub client_id: String,
    pub text: String,
    pub updated_at: DateTime<Utc>,
}

impl Store {
    /// Write a draft, or delete it if `text` is empty — matches the
    /// write-coalescing contract at the runtime layer (250ms debounce lives
    /// above the store, not in it).
    pub fn upsert_draft(&self, session_id: &str, client_id: &str, text: &str) -> Result<()> {
        let conn = self.lock();
        if text.is_empty() {
            conn.execute("DELETE FROM drafts WHERE session_id=?1 AND client_id=?2", params![session_id, client_id])?;
            return Ok(());
        }
        conn.execute(
            "INSERT INTO drafts (session_id, client_id, text, updated_at) VALUES (?1,?2,?3,?4)
             ON CONFLICT(session_id, client_id) DO UPDATE SET text=excluded.text, updated_at=excluded.updated_at",
            params![session_id, client_id, text, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn get_draft(&self, session_id: &str, client_id: &str) -> Result<Option<Draft>> {
        let conn = self.lock();
        conn.query_row(
            "SELECT session_id, client_id, text, updated_at FROM drafts WHERE session_id=?1 AND client_id=?2",
            params![session_id, client_id],
            |r| {
                let updated_at: String = r.get(3)?;
                Ok(Draft {
                    session_id: r.get(0)?,
                    client_id: r.get(1)?,
                    text: r.get(2)?,
                    updated_at: DateTime::parse_from_rfc3339(&updated_at).unwrap().with_timezone(&Utc),
                })
            },
        )
        .optional()
        .map_err(Into::into)
    }
}
