// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod drafts;
mod error;
mod goals;
mod messages;
mod recurring_jobs;
mod schema;
mod sessions;
mod tasks;

pub use drafts::Draft;
pub use error::{Result, StoreError};
pub use goals::{Goal, GoalStatus};
pub use messages::MessageRow;
pub use recurring_jobs::RecurringJobRow;
pub use sessions::{SessionRow, SessionStatus};
pub use tasks::{ExecutionMode, TaskRow};

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::Connection;

/// A handle to the relational store backing the daemon. Cheap to clone —
/// the underlying connection is behind a mutex, matching the single-writer
/// discipline the runtime already enforces per session.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        schema::init_schema(&conn)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().expect("store connection mutex poisoned")
    }
}
