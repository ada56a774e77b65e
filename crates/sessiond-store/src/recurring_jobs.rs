// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use crate::error::{Result, StoreError};
use crate::Store;

#[derive(Debug, Clone)]
pub struct RecurringJobRow {
    pub id: String,
    pub room_id: String,
    pub name: String,
    pub description: String,
    /// Opaque serialized schedule — interpreted by `sessiond-scheduler`.
    pub schedule_json: String,
    /// Opaque serialized task template — interpreted by `sessiond-scheduler`.
    pub template_json: String,
    pub enabled: bool,
    pub max_runs: Option<i64>,
    pub run_count: i64,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
}

impl Store {
    pub fn create_recurring_job(&self, row: &RecurringJobRow) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO recurring_jobs (id, room_id, name, description, schedule_json, template_json,
                enabled, max_runs, run_count, last_run_at, next_run_at) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11)",
            params![
                row.id,
                row.room_id,
                row.name,
                row.description,
                row.schedule_json,
                row.template_json,
                row.enabled as i64,
                row.max_runs,
                row.run_count,
                row.last_run_at.map(|t| t.to_rfc3339()),
                row.next_run_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    pub fn get_recurring_job(&self, id: &str) -> Result<RecurringJobRow> {
        let conn = self.lock();
        conn.query_row(SELECT_ALL_BY_ID, params![id], row_from_sql)
            .optional()?
            .ok_or_else(|| StoreError::NotFound(format!("recurring job {id}")))
    }

    pub fn list_enabled_recurring_jobs(&self) -> Result<Vec<RecurringJobRow>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!("{SELECT_ALL} WHERE enabled = 1"))?;
        let rows = stmt.query_map([], row_from_sql)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    pub fn list_recurring_jobs_for_room(&self, room_id: &str) -> Result<Vec<RecurringJobRow>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!("{SELECT_ALL} WHERE room_id = ?1"))?;
        let rows = stmt.query_map(params![room_id], row_from_sql)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    pub fn set_recurring_job_enabled(&self, id: &str, enabled: bool) -> Result<()> {
        let conn = self.lock();
        conn.execute("UPDATE recurring_jobs SET enabled=?2 WHERE id=?1", params![id, enabled as i64])?;
        Ok(())
    }

    pub fn update_recurring_job_schedule(&self, id: &str, schedule_json: &str, next_run_at: Option<DateTime<Utc>>) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE recurring_jobs SET schedule_json=?2, next_run_at=?3 WHERE id=?1",
            params![id, schedule_json, next_run_at.map(|t| t.to_rfc3339())],
        )?;
        Ok(())
    }

    pub fn set_recurring_job_next_run(&self, id: &str, next_run_at: Option<DateTime<Utc>>) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE recurring_jobs SET next_run_at=?2 WHERE id=?1",
            params![id, next_run_at.map(|t| t.to_rfc3339())],
        )?;
        Ok(())
    }

    /// Record one firing: bump `run_count`, stamp `last_run_at`, and set the
    /// freshly computed `next_run_at` in a single write.
    pub fn record_recurring_job_firing(&self, id: &str, fired_at: DateTime<Utc>, next_run_at: Option<DateTime<Utc>>) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE recurring_jobs SET run_count = run_count + 1, last_run_at=?2, next_run_at=?3 WHERE id=?1",
            params![id, fired_at.to_rfc3339(), next_run_at.map(|t| t.to_rfc3339())],
        )?;
        Ok(())
    }

    pub fn delete_recurring_job(&self, id: &str) -> Result<()> {
        let conn = self.lock();
        conn.execute("DELETE FROM recurring_jobs WHERE id=?1", params![id])?;
        Ok(())
    }
}

const SELECT_ALL: &str = "SELECT id, room_id, name, description, schedule_json, template_json,
    enabled, max_runs, run_count, last_run_at, next_run_at FROM recurring_jobs";
const SELECT_ALL_BY_ID: &str = "SELECT id, room_id, name, description, schedule_json, template_json,
    enabled, max_runs, run_count, last_run_at, next_run_at FROM recurring_jobs WHERE id = ?1";

fn row_from_sql(r: &rusqlite::Row) -> rusqlite::Result<RecurringJobRow> {
    let last_run_at: Option<String> = r.get(9)?;
    let next_run_at: Option<String> = r.get(10)?;
    Ok(RecurringJobRow {
        id: r.get(0)?,
        room_id: r.get(1)?,
        name: r.get(2)?,
        description: r.get(3)?,
        schedule_json: r.get(4)?,
        template_json: r.get(5)?,
        enabled: r.get::<_, i64>(6)? != 0,
        max_runs: r.get(7)?,
        run_count: r.get(8)?,
        last_run_at: last_run_at.map(|s| DateTime::parse_from_rfc3339(&s).unwrap().with_timezone(&Utc)),
        next_run_at: next_run_at.map(|s| DateTime::parse_from_rfc3339(&s).unwrap().with_timezone(&Utc)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RecurringJobRow {
        RecurringJobRow {
            id: "j1".into(),
            room_id: "room-a".into(),
            name: "nightly".into(),
            description: String::new(),
            schedule_json: "{}".into(),
            template_json: "{}".into(),
            enabled: true,
            max_runs: None,
            run_count: 0,
            last_run_at: None,
            next_run_at: Some(Utc::now()),
        }
    }

    #[test]
    fn create_then_get_round_trips() {
        let store = Store::open_in_memory().unwrap();
        store.create_recurring_job(&sample()).unwrap();
        let row = store.get_recurring_job("j1").unwrap();
        assert_eq!(row.name, "nightly");
        assert!(row.enabled);
    }

    #[test]
    fn record_firing_increments_run_count() {
        let store = Store::open_in_memory().unwrap();
        store.create_recurring_job(&sample()).unwrap();
        store.record_recurring_job_firing("j1", Utc::now(), None).unwrap();
        let row = store.get_recurring_job("j1").unwrap();
        assert_eq!(row.run_count, 1);
        assert!(row.next_run_at.is_none());
    }

    #[test]
    fn list_enabled_excludes_disabled() {
        let store = Store::open_in_memory().unwrap();
        store.create_recurring_job(&sample()).unwrap();
        let mut disabled = sample();
        disabled.id = "j2".into();
        disabled.enabled = false;
        store.create_recurring_job(&disabled).unwrap();
        assert_eq!(store.list_enabled_recurring_jobs().unwrap().len(), 1);
    }
}
