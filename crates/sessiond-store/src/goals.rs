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
pub enum GoalStatus {
    Pending,
    Active,
    Blocked,
    Completed,
}

impl GoalStatus {
    fn as_str(self) -> &'static str {
        match self {
            GoalStatus::Pending => "pending",
            GoalStatus::Active => "active",
            GoalStatus::Blocked => "blocked",
            GoalStatus::Completed => "completed",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "active" => GoalStatus::Active,
            "blocked" => GoalStatus::Blocked,
            "completed" => GoalStatus::Completed,
            _ => GoalStatus::Pending,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Goal {
    pub id: String,
    pub room_id: String,
    pub title: String,
    pub description: String,
    pub status: GoalStatus,
    pub priority: String,
    pub progress: i64,
    pub linked_task_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Store {
    pub fn create_goal(&self, goal: &Goal) -> Result<()> {
        let conn = self.lock();
        let linked = serde_json::to_string(&goal.linked_task_ids)?;
        conn.execute(
            "INSERT INTO goals (id, room_id, title, description, status, priority, progress,
                linked_tasks_json, created_at, updated_at) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)",
            params![
                goal.id,
                goal.room_id,
                goal.title,
                goal.description,
                goal.status.as_str(),
                goal.priority,
                goal.progress,
                linked,
                goal.created_at.to_rfc3339(),
                goal.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_goal(&self, id: &str) -> Result<Goal> {
        let conn = self.lock();
        conn.query_row(SELECT_ALL_BY_ID, params![id], row_from_sql)
            .optional()?
            .ok_or_else(|| StoreError::NotFound(format!("goal {id}")))
    }

    pub fn list_goals_for_room(&self, room_id: &str) -> Result<Vec<Goal>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!("{SELECT_ALL} WHERE room_id = ?1 ORDER BY created_at ASC"))?;
        let rows = stmt.query_map(params![room_id], row_from_sql)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    pub fn update_goal_status(&self, id: &str, status: GoalStatus) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE goals SET status=?2, updated_at=?3 WHERE id=?1",
            params![id, status.as_str(), Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// `goal.start` — move a pending/blocked goal into `active`.
    pub fn start_goal(&self, id: &str) -> Result<()> {
        self.update_goal_status(id, GoalStatus::Active)
    }

    /// `goal.complete`.
    pub fn complete_goal(&self, id: &str) -> Result<()> {
        self.update_goal_status(id, GoalStatus::Completed)
    }

    /// `goal.block`.
    pub fn block_goal(&self, id: &str) -> Result<()> {
        self.update_goal_status(id, GoalStatus::Blocked)
    }

    /// `goal.unblock` — a blocked goal returns to `pending`, same as a goal
    /// that was never started.
    pub fn unblock_goal(&self, id: &str) -> Result<()> {
        self.update_goal_status(id, GoalStatus::Pending)
    }

    pub fn update_goal_progress(&self, id: &str, progress: i64) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE goals SET progress=?2, updated_at=?3 WHERE id=?1",
            params![id, progress.clamp(0, 100), Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn update_goal_priority(&self, id: &str, priority: &str) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE goals SET priority=?2, updated_at=?3 WHERE id=?1",
            params![id, priority, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// `goal.linkTask` — idempotent: linking an already-linked task id is a
    /// no-op rather than a duplicate entry.
    pub fn link_task_to_goal(&self, id: &str, task_id: &str) -> Result<()> {
        let mut goal = self.get_goal(id)?;
        if goal.linked_task_ids.iter().any(|t| t == task_id) {
            return Ok(());
        }
        goal.linked_task_ids.push(task_id.to_string());
        self.write_linked_tasks(id, &goal.linked_task_ids)
    }

    /// `goal.unlinkTask`.
    pub fn unlink_task_from_goal(&self, id: &str, task_id: &str) -> Result<()> {
        let mut goal = self.get_goal(id)?;
        goal.linked_task_ids.retain(|t| t != task_id);
        self.write_linked_tasks(id, &goal.linked_task_ids)
    }

    fn write_linked_tasks(&self, id: &str, linked_task_ids: &[String]) -> Result<()> {
        let conn = self.lock();
        let linked = serde_json::to_string(linked_task_ids)?;
        conn.execute(
            "UPDATE goals SET linked_tasks_json=?2, updated_at=?3 WHERE id=?1",
            params![id, linked, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// `goal.getActive` — every goal in `active` status for a room, oldest
    /// first.
    pub fn list_active_goals_for_room(&self, room_id: &str) -> Result<Vec<Goal>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!("{SELECT_ALL} WHERE room_id = ?1 AND status = 'active' ORDER BY created_at ASC"))?;
        let rows = stmt.query_map(params![room_id], row_from_sql)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// `goal.getNext` — the highest-priority not-yet-completed goal in a
    /// room, ties broken by creation order. `None` when every goal is
    /// completed or the room has none.
    pub fn get_next_goal_for_room(&self, room_id: &str) -> Result<Option<Goal>> {
        let conn = self.lock();
        conn.query_row(
            &format!(
                "{SELECT_ALL} WHERE room_id = ?1 AND status != 'completed'
                 ORDER BY CASE priority
                     WHEN 'urgent' THEN 0 WHEN 'high' THEN 1 WHEN 'normal' THEN 2 WHEN 'low' THEN 3 ELSE 4 END,
                     created_at ASC LIMIT 1"
            ),
            params![room_id],
            row_from_sql,
        )
        .optional()
        .map_err(Into::into)
    }

    pub fn delete_goal(&self, id: &str) -> Result<()> {
        let conn = self.lock();
        conn.execute("DELETE FROM goals WHERE id=?1", params![id])?;
        Ok(())
    }
}

const SELECT_ALL: &str = "SELECT id, room_id, title, description, status, priority, progress,
    linked_tasks_json, created_at, updated_at FROM goals";
const SELECT_ALL_BY_ID: &str = "SELECT id, room_id, title, description, status, priority, progress,
    linked_tasks_json, created_at, updated_at FROM goals WHERE id = ?1";

fn row_from_sql(r: &rusqlite::Row) -> rusqlite::Result<Goal> {
    let linked_json: String = r.get(7)?;
    let created_at: String = r.get(8)?;
    let updated_at: String = r.get(9)?;
    Ok(Goal {
        id: r.get(0)?,
        room_id: r.get(1)?,
        title: r.get(2)?,
        description: r.get(3)?,
        status: GoalStatus::parse(&r.get::<_, String>(4)?),
        priority: r.get(5)?,
        progress: r.get(6)?,
        linked_task_ids: serde_json::from_str(&linked_json).unwrap_or_default(),
        created_at: DateTime::parse_from_rfc3339(&created_at).unwrap().with_timezone(&Utc),
        updated_at: DateTime::parse_from_rfc3339(&updated_at).unwrap().with_timezone(&Utc),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Goal {
        let now = Utc::now();
        Goal {
            id: "g1".into(),
            room_id: "room-a".into(),
            title: "Ship it".into(),
            description: String::new(),
            status: GoalStatus::Pending,
            priority: "normal".into(),
            progress: 0,
            linked_task_ids: vec![],
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn create_then_get_round_trips() {
        let store = Store::open_in_memory().unwrap();
        store.create_goal(&sample()).unwrap();
        assert_eq!(store.get_goal("g1").unwrap().title, "Ship it");
    }

    #[test]
    fn update_progress_clamps_to_100() {
        let store = Store::open_in_memory().unwrap();
        store.create_goal(&sample()).unwrap();
        store.update_goal_progress("g1", 150).unwrap();
        assert_eq!(store.get_goal("g1").unwrap().progress, 100);
    }

    #[test]
    fn update_status_changes_row() {
        let store = Store::open_in_memory().unwrap();
        store.create_goal(&sample()).unwrap();
        store.update_goal_status("g1", GoalStatus::Active).unwrap();
        assert_eq!(store.get_goal("g1").unwrap().status, GoalStatus::Active);
    }

    #[test]
    fn start_complete_block_unblock_map_onto_status() {
        let store = Store::open_in_memory().unwrap();
        store.create_goal(&sample()).unwrap();

        store.start_goal("g1").unwrap();
        assert_eq!(store.get_goal("g1").unwrap().status, GoalStatus::Active);

        store.block_goal("g1").unwrap();
        assert_eq!(store.get_goal("g1").unwrap().status, GoalStatus::Blocked);

        store.unblock_goal("g1").unwrap();
        assert_eq!(store.get_goal("g1").unwrap().status, GoalStatus::Pending);

        store.complete_goal("g1").unwrap();
        assert_eq!(store.get_goal("g1").unwrap().status, GoalStatus::Completed);
    }

    #[test]
    fn update_priority_persists() {
        let store = Store::open_in_memory().unwrap();
        store.create_goal(&sample()).unwrap();
        store.update_goal_priority("g1", "urgent").unwrap();
        assert_eq!(store.get_goal("g1").unwrap().priority, "urgent");
    }

    #[test]
    fn link_task_is_idempotent_unlink_removes() {
        let store = Store::open_in_memory().unwrap();
        store.create_goal(&sample()).unwrap();

        store.link_task_to_goal("g1", "t1").unwrap();
        store.link_task_to_goal("g1", "t1").unwrap();
        assert_eq!(store.get_goal("g1").unwrap().linked_task_ids, vec!["t1".to_string()]);

        store.link_task_to_goal("g1", "t2").unwrap();
        assert_eq!(store.get_goal("g1").unwrap().linked_task_ids, vec!["t1".to_string(), "t2".to_string()]);

        store.unlink_task_from_goal("g1", "t1").unwrap();
        assert_eq!(store.get_goal("g1").unwrap().linked_task_ids, vec!["t2".to_string()]);
    }

    #[test]
    fn get_active_excludes_non_active_goals() {
        let store = Store::open_in_memory().unwrap();
        store.create_goal(&sample()).unwrap();
        store.start_goal("g1").unwrap();
        let mut other = sample();
        other.id = "g2".into();
        store.create_goal(&other).unwrap();

        let active = store.list_active_goals_for_room("room-a").unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, "g1");
    }

    #[test]
    fn get_next_prefers_higher_priority_then_creation_order() {
        let store = Store::open_in_memory().unwrap();
        let mut low = sample();
        low.id = "g-low".into();
        low.priority = "low".into();
        store.create_goal(&low).unwrap();

        let mut urgent = sample();
        urgent.id = "g-urgent".into();
        urgent.priority = "urgent".into();
        store.create_goal(&urgent).unwrap();

        let next = store.get_next_goal_for_room("room-a").unwrap().unwrap();
        assert_eq!(next.id, "g-urgent");
    }

    #[test]
    fn get_next_skips_completed_goals() {
        let store = Store::open_in_memory().unwrap();
        store.create_goal(&sample()).unwrap();
        store.complete_goal("g1").unwrap();
        assert!(store.get_next_goal_for_room("room-a").unwrap().is_none());
    }
}
