// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Cross-crate integration tests exercising the daemon's wiring end to end:
//! store → session manager → runtime → hub, and store → scheduler → hub.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use sessiond_core::SessionManager;
use sessiond_core::SessionConfig;
use sessiond_hub::{AutoSubscribeConfig, ClientConnection, Hub};
use sessiond_scheduler::{Schedule, Scheduler, SchedulerEvent, TaskTemplate};
use sessiond_sdk::mock::EchoSdk;
use sessiond_store::Store;
use tokio::sync::Mutex;

struct RecordingConnection {
    id: String,
    received: Mutex<Vec<serde_json::Value>>,
    open: AtomicBool,
}

impl RecordingConnection {
    fn new(id: &str) -> Arc<Self> {
        Arc::new(Self { id: id.to_string(), received: Mutex::new(Vec::new()), open: AtomicBool::new(true) })
    }
}

#[async_trait]
impl ClientConnection for RecordingConnection {
    fn id(&self) -> &str {
        &self.id
    }

    async fn send(&self, bytes: Vec<u8>) -> anyhow::Result<()> {
        let value: serde_json::Value = serde_json::from_slice(&bytes)?;
        self.received.lock().await.push(value);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

/// Enqueuing a message drives the EchoSdk to completion and the resulting
/// `sdk.message` events reach a Hub subscriber — the same path the hosting
/// binary wires at startup.
#[tokio::test]
async fn session_runtime_events_reach_hub_subscribers() {
    let store = Store::open_in_memory().unwrap();
    let manager = SessionManager::new(store, Arc::new(EchoSdk));
    manager.create_session("s1", "untitled", "/tmp/work", &SessionConfig::default()).await.unwrap();
    let runtime = manager.get_session("s1").await.unwrap();

    let hub = Hub::new(AutoSubscribeConfig { global_methods: vec![], session_methods: vec!["sdk.message".to_string()] });
    let conn = RecordingConnection::new("client-1");
    hub.register_connection(conn.clone());
    hub.auto_subscribe("s1", "client-1").unwrap();

    let mut events = runtime.subscribe();
    let hub_for_bridge = hub.clone();
    let bridge = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            let session_id = event.session_id().to_string();
            let method = event.method();
            let payload = serde_json::to_value(&event).unwrap();
            let is_final_result = method == "sdk.message" && payload["message"]["type"] == "result";
            hub_for_bridge.publish(&session_id, method, payload).await;
            if is_final_result {
                break;
            }
        }
    });

    let outcome_rx = runtime.enqueue(vec![sessiond_sdk::ContentBlock::text("hi")], false).await.unwrap();
    outcome_rx.await.unwrap();
    tokio::time::timeout(std::time::Duration::from_secs(2), bridge).await.unwrap().unwrap();

    let received = conn.received.lock().await;
    assert!(!received.is_empty(), "expected at least one sdk.message frame delivered to the subscriber");
    assert!(received.iter().any(|v| v["message"]["content"][0]["text"] == "echo: hi"));
}

/// Triggering a recurring job materializes a task row and emits
/// `recurringJob.triggered`, matching scenario (E).
#[tokio::test]
async fn scheduler_trigger_materializes_task_and_emits_event() {
    let store = Store::open_in_memory().unwrap();
    let scheduler = Scheduler::new(store.clone());
    let mut events = scheduler.subscribe();

    let job = scheduler
        .create_job(
            "room-1",
            "Daily Standup",
            "",
            Schedule::Interval { minutes: 60 },
            TaskTemplate { title: "Daily Task".to_string(), description: String::new(), priority: "high".to_string(), execution_mode: Default::default(), initial_session_assignments: vec![] },
            true,
            None,
        )
        .await
        .unwrap();

    // Drain the RecurringJobCreated event before triggering.
    let _created = events.recv().await.unwrap();

    let task_id = scheduler.trigger_job(job.id).await.unwrap();
    let task = store.get_task(&task_id.to_string()).unwrap();
    assert_eq!(task.title, "Daily Task");
    assert_eq!(task.priority, "high");
    assert_eq!(task.recurring_job_id.as_deref(), Some(job.id.to_string().as_str()));

    let event = events.recv().await.unwrap();
    assert!(matches!(event, SchedulerEvent::RecurringJobTriggered { task_id: tid, .. } if tid == task_id));
}
