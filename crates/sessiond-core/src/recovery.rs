// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use sessiond_store::{MessageRow, Store};

use crate::error::Result;

/// Number of rows reconciled by a single [`recover_orphans`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub orphans_found: usize,
}

/// Reconcile messages left `queued`/`sent` by a session whose process died
/// mid-turn. Any **user** row *newer* than the session's latest `system.init`
/// message was queued by the attempt that just crashed — the write already
/// landed, only the in-memory bookkeeping that would have marked it
/// complete was lost — and is promoted straight to `saved`. Rows at or
/// before the latest `init`, and non-user rows, belong to a prior,
/// already-settled epoch or a still-in-flight assistant turn and are left
/// alone.
pub async fn recover_orphans(store: &Store, session_id: &str) -> Result<RecoveryReport> {
    let init_cutoff = store.latest_system_init_timestamp(session_id)?;
    let unsaved = store.list_unsaved_messages(session_id)?;

    let mut orphans_found = 0;
    for row in unsaved {
        if is_orphan(&row, init_cutoff) {
            store.mark_message_saved(row.db_id)?;
            orphans_found += 1;
        }
    }
    Ok(RecoveryReport { orphans_found })
}

fn is_orphan(row: &MessageRow, init_cutoff: Option<chrono::DateTime<chrono::Utc>>) -> bool {
    if row.msg_type != "user" {
        return false;
    }
    match init_cutoff {
        Some(cutoff) => row.timestamp > cutoff,
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use sessiond_sdk::{ContentBlock, MessageBase, SdkMessage, SystemSubtype};
    use sessiond_store::SessionRow;

    use super::*;

    fn user_message(session_id: &str) -> SdkMessage {
        SdkMessage::User { base: MessageBase::new(session_id), content: vec![ContentBlock::text("hi")] }
    }

    fn init_message(session_id: &str) -> SdkMessage {
        SdkMessage::System { base: MessageBase::new(session_id), subtype: SystemSubtype::Init }
    }

    fn sample_session(id: &str) -> SessionRow {
        let now = Utc::now();
        SessionRow {
            id: id.into(),
            title: "untitled".into(),
            workspace_path: "/tmp/work".into(),
            status: sessiond_store::SessionStatus::Active,
            created_at: now,
            last_active_at: now,
            config_json: "{}".into(),
            message_count: 0,
            input_tokens: 0,
            output_tokens: 0,
            total_cost_usd: 0.0,
            tool_call_count: 0,
            title_generated: false,
        }
    }

    #[tokio::test]
    async fn promotes_rows_newer_than_latest_init_to_saved() {
        let store = Store::open_in_memory().unwrap();
        store.create_session(&sample_session("s1")).unwrap();

        store.save_sdk_message("s1", &init_message("s1")).unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let orphan = user_message("s1");
        store.save_sdk_message("s1", &orphan).unwrap();

        let report = recover_orphans(&store, "s1").await.unwrap();
        assert_eq!(report.orphans_found, 1);
        assert!(store.list_unsaved_messages("s1").unwrap().is_empty());
    }

    #[tokio::test]
    async fn leaves_rows_from_a_prior_settled_epoch_untouched() {
        let store = Store::open_in_memory().unwrap();
        store.create_session(&sample_session("s1")).unwrap();

        let settled = user_message("s1");
        store.save_sdk_message("s1", &settled).unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store.save_sdk_message("s1", &init_message("s1")).unwrap();

        let report = recover_orphans(&store, "s1").await.unwrap();
        assert_eq!(report.orphans_found, 0);
        assert_eq!(store.list_unsaved_messages("s1").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn no_init_message_treats_all_unsaved_user_rows_as_orphans() {
        let store = Store::open_in_memory().unwrap();
        store.create_session(&sample_session("s1")).unwrap();
        store.save_sdk_message("s1", &user_message("s1")).unwrap();

        let report = recover_orphans(&store, "s1").await.unwrap();
        assert_eq!(report.orphans_found, 1);
    }

    #[tokio::test]
    async fn non_user_rows_are_never_promoted() {
        let store = Store::open_in_memory().unwrap();
        store.create_session(&sample_session("s1")).unwrap();

        let assistant = SdkMessage::Assistant { base: MessageBase::new("s1"), content: vec![ContentBlock::text("hi")] };
        store.save_sdk_message("s1", &assistant).unwrap();

        let report = recover_orphans(&store, "s1").await.unwrap();
        assert_eq!(report.orphans_found, 0);
        assert_eq!(store.list_unsaved_messages("s1").unwrap().len(), 1);
    }
}
