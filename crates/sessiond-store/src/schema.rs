// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use rusqlite::Connection;

use crate::error::Result;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS sessions (
    id              TEXT PRIMARY KEY,
    title           TEXT NOT NULL,
    workspace_path  TEXT NOT NULL,
    status          TEXT NOT NULL DEFAULT 'active',
    created_at      TEXT NOT NULL,
    last_active_at  TEXT NOT NULL,
    config_json     TEXT NOT NULL,
    message_count   INTEGER NOT NULL DEFAULT 0,
    input_tokens    INTEGER NOT NULL DEFAULT 0,
    output_tokens   INTEGER NOT NULL DEFAULT 0,
    total_cost_usd  REAL NOT NULL DEFAULT 0,
    tool_call_count INTEGER NOT NULL DEFAULT 0,
    title_generated INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS sdk_messages (
    db_id        INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id   TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
    uuid         TEXT NOT NULL UNIQUE,
    msg_type     TEXT NOT NULL,
    payload_json TEXT NOT NULL,
    status       TEXT NOT NULL,
    timestamp    TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_sdk_messages_session ON sdk_messages(session_id);

CREATE TABLE IF NOT EXISTS tasks (
    id              TEXT PRIMARY KEY,
    room_id         TEXT NOT NULL,
    title           TEXT NOT NULL,
    description     TEXT NOT NULL DEFAULT '',
    priority        TEXT NOT NULL DEFAULT 'normal',
    execution_mode  TEXT NOT NULL DEFAULT 'single',
    assignments_json TEXT NOT NULL DEFAULT '[]',
    recurring_job_id TEXT,
    created_at      TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_tasks_room ON tasks(room_id);

CREATE TABLE IF NOT EXISTS recurring_jobs (
    id               TEXT PRIMARY KEY,
    room_id          TEXT NOT NULL,
    name             TEXT NOT NULL,
    description      TEXT NOT NULL DEFAULT '',
    schedule_json    TEXT NOT NULL,
    template_json    TEXT NOT NULL,
    enabled          INTEGER NOT NULL DEFAULT 1,
    max_runs         INTEGER,
    run_count        INTEGER NOT NULL DEFAULT 0,
    last_run_at      TEXT,
    next_run_at      TEXT
);
CREATE INDEX IF NOT EXISTS idx_recurring_jobs_room ON recurring_jobs(room_id);
CREATE INDEX IF NOT EXISTS idx_recurring_jobs_enabled ON recurring_jobs(enabled, next_run_at);

CREATE TABLE IF NOT EXISTS drafts (
    session_id TEXT NOT NULL,
    client_id  TEXT NOT NULL,
    text       TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (session_id, client_id)
);

CREATE TABLE IF NOT EXISTS goals (
    id               TEXT PRIMARY KEY,
    room_id          TEXT NOT NULL,
    title            TEXT NOT NULL,
    description      TEXT NOT NULL DEFAULT '',
    status           TEXT NOT NULL DEFAULT 'pending',
    priority         TEXT NOT NULL DEFAULT 'normal',
    progress         INTEGER NOT NULL DEFAULT 0,
    linked_tasks_json TEXT NOT NULL DEFAULT '[]',
    created_at       TEXT NOT NULL,
    updated_at       TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_goals_room ON goals(room_id);
";

/// Create every table used by the daemon if it does not already exist.
/// Idempotent — safe to call on every connection open.
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}
