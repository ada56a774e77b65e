// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use sessiond_store::{Store, TaskRow};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::{Result, SchedulerError};
use crate::events::SchedulerEvent;
use crate::job::{job_from_row, row_from_job, RecurringJob, TaskTemplate};
use crate::schedule::Schedule;

/// Default broadcast capacity, matching the control-service event channel
/// sizing convention: generous enough that a slow subscriber lags rather
/// than blocking a firing.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

struct Inner {
    store: Store,
    event_tx: broadcast::Sender<SchedulerEvent>,
    timers: Mutex<HashMap<Uuid, JoinHandle<()>>>,
}

/// A cheap-clone handle to the scheduler. All jobs live in `store`; this
/// struct only owns the in-memory timer wheel and the event fan-out.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    pub fn new(store: Store) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { inner: Arc::new(Inner { store, event_tx, timers: Mutex::new(HashMap::new()) }) }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.inner.event_tx.subscribe()
    }

    /// Number of jobs with an armed timer — should equal the count of
    /// enabled, not-yet-exhausted jobs once `start()` has run.
    pub fn scheduled_job_count(&self) -> usize {
        self.inner.timers.lock().expect("scheduler timers mutex poisoned").len()
    }

    /// Load every enabled job and arm its timer. Jobs whose `next_run_at`
    /// is already in the past fire immediately (at most once) rather than
    /// catching up on missed intervals.
    pub async fn start(&self) -> Result<()> {
        for row in self.inner.store.list_enabled_recurring_jobs()? {
            let mut job = job_from_row(&row)?;
            if job.next_run_at.is_none() {
                let next = job.schedule.next_run_after(Utc::now())?;
                job.next_run_at = Some(next);
                self.inner.store.set_recurring_job_next_run(&row.id, Some(next))?;
            }
            if !job.has_reached_max_runs() {
                self.arm(job);
            }
        }
        Ok(())
    }

    pub fn stop(&self) {
        let mut timers = self.inner.timers.lock().expect("scheduler timers mutex poisoned");
        for (_, handle) in timers.drain() {
            handle.abort();
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create_job(
        &self,
        room_id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        schedule: Schedule,
        template: TaskTemplate,
        enabled: bool,
        max_runs: Option<i64>,
    ) -> Result<RecurringJob> {
        schedule.validate()?;
        let next_run_at = if enabled { Some(schedule.next_run_after(Utc::now())?) } else { None };
        let job = RecurringJob {
            id: Uuid::new_v4(),
            room_id: room_id.into(),
            name: name.into(),
            description: description.into(),
            schedule,
            template,
            enabled,
            max_runs,
            run_count: 0,
            last_run_at: None,
            next_run_at,
        };
        self.inner.store.create_recurring_job(&row_from_job(&job)?)?;
        let _ = self
            .inner
            .event_tx
            .send(SchedulerEvent::RecurringJobCreated { job_id: job.id, room_id: job.room_id.clone() });
        if enabled && !job.has_reached_max_runs() {
            self.arm(job.clone());
        }
        Ok(job)
    }

    pub async fn enable_job(&self, id: Uuid) -> Result<()> {
        let row = self.inner.store.get_recurring_job(&id.to_string())?;
        let mut job = job_from_row(&row)?;
        if job.enabled {
            return Ok(());
        }
        job.enabled = true;
        self.inner.store.set_recurring_job_enabled(&row.id, true)?;
        if job.next_run_at.is_none() {
            let next = job.schedule.next_run_after(Utc::now())?;
            job.next_run_at = Some(next);
            self.inner.store.set_recurring_job_next_run(&row.id, Some(next))?;
        }
        if !job.has_reached_max_runs() {
            self.arm(job);
        }
        Ok(())
    }

    pub async fn disable_job(&self, id: Uuid) -> Result<()> {
        self.inner.store.set_recurring_job_enabled(&id.to_string(), false)?;
        self.cancel(id);
        Ok(())
    }

    pub async fn update_schedule(&self, id: Uuid, schedule: Schedule) -> Result<()> {
        schedule.validate()?;
        let row = self.inner.store.get_recurring_job(&id.to_string())?;
        let mut job = job_from_row(&row)?;
        let next_run_at = if job.enabled { Some(schedule.next_run_after(Utc::now())?) } else { None };
        job.schedule = schedule;
        job.next_run_at = next_run_at;
        self.inner
            .store
            .update_recurring_job_schedule(&row.id, &serde_json::to_string(&job.schedule)?, next_run_at)?;
        self.cancel(id);
        if job.enabled && !job.has_reached_max_runs() {
            self.arm(job);
        }
        let _ = self
            .inner
            .event_tx
            .send(SchedulerEvent::RecurringJobUpdated { job_id: id, room_id: row.room_id });
        Ok(())
    }

    pub async fn delete_job(&self, id: Uuid) -> Result<()> {
        self.cancel(id);
        self.inner.store.delete_recurring_job(&id.to_string())?;
        Ok(())
    }

    /// Materialize a task immediately without touching `run_count` or
    /// `next_run_at` — a manual trigger, distinct from a scheduled firing.
    pub async fn trigger_job(&self, id: Uuid) -> Result<Uuid> {
        let row = self.inner.store.get_recurring_job(&id.to_string())?;
        let job = job_from_row(&row)?;
        let task_id = self.materialize_task(&job)?;
        let _ = self.inner.event_tx.send(SchedulerEvent::RecurringJobTriggered {
            session_id: format!("room:{}", job.room_id),
            room_id: job.room_id,
            job_id: job.id,
            task_id,
        });
        Ok(task_id)
    }

    fn arm(&self, job: RecurringJob) {
        let Some(next_run_at) = job.next_run_at else { return };
        let delay = (next_run_at - Utc::now()).to_std().unwrap_or(std::time::Duration::ZERO);
        let this = self.clone();
        let job_id = job.id;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            this.fire(job_id).await;
        });
        let mut timers = self.inner.timers.lock().expect("scheduler timers mutex poisoned");
        if let Some(old) = timers.insert(job_id, handle) {
            old.abort();
        }
    }

    fn cancel(&self, id: Uuid) {
        if let Some(handle) = self.inner.timers.lock().expect("scheduler timers mutex poisoned").remove(&id) {
            handle.abort();
        }
    }

    async fn fire(&self, id: Uuid) {
        if let Err(e) = self.fire_inner(id).await {
            tracing::warn!(job_id = %id, error = %e, "recurring job firing failed");
        }
    }

    async fn fire_inner(&self, id: Uuid) -> Result<()> {
        let row = self.inner.store.get_recurring_job(&id.to_string())?;
        let mut job = job_from_row(&row)?;
        if !job.enabled || job.has_reached_max_runs() {
            self.inner.timers.lock().expect("scheduler timers mutex poisoned").remove(&id);
            return Ok(());
        }

        let task_id = self.materialize_task(&job)?;
        let fired_at = Utc::now();
        job.run_count += 1;
        job.last_run_at = Some(fired_at);
        let next_run_at =
            if job.has_reached_max_runs() { None } else { Some(job.schedule.next_run_after(fired_at)?) };
        self.inner.store.record_recurring_job_firing(&job.id.to_string(), fired_at, next_run_at)?;

        let _ = self.inner.event_tx.send(SchedulerEvent::RecurringJobTriggered {
            session_id: format!("room:{}", job.room_id),
            room_id: job.room_id.clone(),
            job_id: job.id,
            task_id,
        });

        if let Some(next) = next_run_at {
            job.next_run_at = Some(next);
            self.arm(job);
        } else {
            self.inner.timers.lock().expect("scheduler timers mutex poisoned").remove(&id);
        }
        Ok(())
    }

    fn materialize_task(&self, job: &RecurringJob) -> Result<Uuid> {
        let task_id = Uuid::new_v4();
        let row = TaskRow {
            id: task_id.to_string(),
            room_id: job.room_id.clone(),
            title: job.template.title.clone(),
            description: job.template.description.clone(),
            priority: job.template.priority.clone(),
            execution_mode: job.template.execution_mode,
            session_assignments: job.template.initial_session_assignments.clone(),
            recurring_job_id: Some(job.id.to_string()),
            created_at: Utc::now(),
        };
        self.inner.store.create_task(&row)?;
        Ok(task_id)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration as StdDuration;

    use super::*;

    fn template() -> TaskTemplate {
        TaskTemplate {
            title: "Daily Task".into(),
            description: String::new(),
            priority: "high".into(),
            execution_mode: Default::default(),
            initial_session_assignments: vec![],
        }
    }

    #[tokio::test]
    async fn trigger_job_materializes_task_without_touching_run_count() {
        let store = Store::open_in_memory().unwrap();
        let scheduler = Scheduler::new(store.clone());
        let job = scheduler
            .create_job("room-a", "nightly", "", Schedule::Interval { minutes: 60 }, template(), true, None)
            .await
            .unwrap();

        let task_id = scheduler.trigger_job(job.id).await.unwrap();
        let task = store.get_task(&task_id.to_string()).unwrap();
        assert_eq!(task.title, "Daily Task");
        assert_eq!(task.priority, "high");
        assert_eq!(task.recurring_job_id, Some(job.id.to_string()));

        let row = store.get_recurring_job(&job.id.to_string()).unwrap();
        assert_eq!(row.run_count, 0);
        scheduler.stop();
    }

    #[tokio::test]
    async fn create_job_arms_a_timer() {
        let store = Store::open_in_memory().unwrap();
        let scheduler = Scheduler::new(store);
        scheduler
            .create_job("room-a", "nightly", "", Schedule::Interval { minutes: 60 }, template(), true, None)
            .await
            .unwrap();
        assert_eq!(scheduler.scheduled_job_count(), 1);
        scheduler.stop();
        assert_eq!(scheduler.scheduled_job_count(), 0);
    }

    #[tokio::test]
    async fn disabled_job_is_not_armed() {
        let store = Store::open_in_memory().unwrap();
        let scheduler = Scheduler::new(store);
        scheduler
            .create_job("room-a", "nightly", "", Schedule::Interval { minutes: 60 }, template(), false, None)
            .await
            .unwrap();
        assert_eq!(scheduler.scheduled_job_count(), 0);
    }

    #[tokio::test]
    async fn firing_immediately_reschedules_and_increments_run_count() {
        let store = Store::open_in_memory().unwrap();
        let scheduler = Scheduler::new(store.clone());
        let mut rx = scheduler.subscribe();
        let job = scheduler
            .create_job("room-a", "tick", "", Schedule::Interval { minutes: 0 }, template(), true, Some(1))
            .await
            .unwrap();

        let event = tokio::time::timeout(StdDuration::from_secs(2), rx.recv()).await.unwrap().unwrap();
        assert!(matches!(event, SchedulerEvent::RecurringJobTriggered { job_id, .. } if job_id == job.id));

        tokio::time::sleep(StdDuration::from_millis(50)).await;
        let row = store.get_recurring_job(&job.id.to_string()).unwrap();
        assert_eq!(row.run_count, 1);
        assert_eq!(scheduler.scheduled_job_count(), 0, "max_runs=1 reached, timer should not rearm");
    }

    #[tokio::test]
    async fn start_arms_jobs_missing_next_run_at() {
        let store = Store::open_in_memory().unwrap();
        {
            let scheduler = Scheduler::new(store.clone());
            scheduler
                .create_job("room-a", "nightly", "", Schedule::Interval { minutes: 60 }, template(), true, None)
                .await
                .unwrap();
        }
        let scheduler = Scheduler::new(store);
        scheduler.start().await.unwrap();
        assert_eq!(scheduler.scheduled_job_count(), 1);
        scheduler.stop();
    }

    #[tokio::test]
    async fn invalid_cron_expression_is_rejected_at_creation() {
        let store = Store::open_in_memory().unwrap();
        let scheduler = Scheduler::new(store);
        let result = scheduler
            .create_job(
                "room-a",
                "bad-cron",
                "",
                Schedule::Cron { expression: "garbage".into() },
                template(),
                true,
                None,
            )
            .await;
        assert!(result.is_err());
    }
}
