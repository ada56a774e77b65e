// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use chrono::{DateTime, Utc};
use rusqlite::params;
use sessiond_sdk::{MessageStatus, SdkMessage};

use crate::error::Result;
use crate::Store;

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub db_id: i64,
    pub session_id: String,
    pub uuid: String,
    pub msg_type: String,
    pub payload_json: String,
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

impl Store {
    /// Persist a message. Returns `Ok(false)` instead of erroring when the
    /// uuid already exists (a replay) — the caller aborts fan-out for that
    /// message rather than treating this as a hard failure.
    pub fn save_sdk_message(&self, session_id: &str, msg: &SdkMessage) -> Result<bool> {
        let conn = self.lock();
        let payload_json = serde_json::to_string(msg)?;
        let msg_type = sdk_message_type(msg);
        let status = status_str(msg.base().status);
        let result = conn.execute(
            "INSERT INTO sdk_messages (session_id, uuid, msg_type, payload_json, status, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![session_id, msg.uuid().to_string(), msg_type, payload_json, status, msg.base().timestamp.to_rfc3339()],
        );
        match result {
            Ok(_) => Ok(true),
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == rusqlite::ErrorCode::ConstraintViolation => {
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn list_messages(&self, session_id: &str) -> Result<Vec<MessageRow>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT db_id, session_id, uuid, msg_type, payload_json, status, timestamp
             FROM sdk_messages WHERE session_id = ?1 ORDER BY db_id ASC",
        )?;
        let rows = stmt.query_map(params![session_id], row_from_sql)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// Messages with status `queued` or `sent` for a session — the recovery
    /// handler's candidate set.
    pub fn list_unsaved_messages(&self, session_id: &str) -> Result<Vec<MessageRow>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT db_id, session_id, uuid, msg_type, payload_json, status, timestamp
             FROM sdk_messages WHERE session_id = ?1 AND status IN ('queued','sent') ORDER BY db_id ASC",
        )?;
        let rows = stmt.query_map(params![session_id], row_from_sql)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    pub fn mark_message_saved(&self, db_id: i64) -> Result<()> {
        let conn = self.lock();
        conn.execute("UPDATE sdk_messages SET status='saved' WHERE db_id=?1", params![db_id])?;
        Ok(())
    }

    /// Timestamp of the most recent `system.init` message for a session, if
    /// any — the recovery handler's reference point.
    pub fn latest_system_init_timestamp(&self, session_id: &str) -> Result<Option<DateTime<Utc>>> {
        let conn = self.lock();
        let ts: Option<String> = conn
            .query_row(
                "SELECT timestamp FROM sdk_messages
                 WHERE session_id = ?1 AND msg_type = 'system' AND payload_json LIKE '%\"subtype\":\"init\"%'
                 ORDER BY timestamp DESC LIMIT 1",
                params![session_id],
                |r| r.get(0),
            )
            .optional_or_none()?;
        Ok(ts.map(|s| DateTime::parse_from_rfc3339(&s).unwrap().with_timezone(&Utc)))
    }
}

trait OptionalOrNone<T> {
    fn optional_or_none(self) -> rusqlite::Result<Option<T>>;
}

impl<T> OptionalOrNone<T> for rusqlite::Result<T> {
    fn optional_or_none(self) -> rusqlite::Result<Option<T>> {
        match self {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

fn sdk_message_type(msg: &SdkMessage) -> &'static str {
    match msg {
        SdkMessage::User { .. } => "user",
        SdkMessage::Assistant { .. } => "assistant",
        SdkMessage::System { .. } => "system",
        SdkMessage::Result { .. } => "result",
        SdkMessage::StreamEvent { .. } => "stream_event",
    }
}

fn status_str(status: MessageStatus) -> &'static str {
    match status {
        MessageStatus::Queued => "queued",
        MessageStatus::Sent => "sent",
        MessageStatus::Saved => "saved",
    }
}

fn row_from_sql(r: &rusqlite::Row) -> rusqlite::Result<MessageRow> {
    let timestamp: String = r.get(6)?;
    Ok(MessageRow {
        db_id: r.get(0)?,
        session_id: r.get(1)?,
        uuid: r.get(2)?,
        msg_type: r.get(3)?,
        payload_json: r.get(4)?,
        status: r.get(5)?,
        timestamp: DateTime::parse_from_rfc3339(&timestamp).unwrap().with_timezone(&Utc),
    })
}

#[cfg(test)]
mod tests {
    use sessiond_sdk::{ContentBlock, MessageBase};

    use super::*;

    fn user_msg(session_id: &str) -> SdkMessage {
        SdkMessage::User { base: MessageBase::new(session_id), content: vec![ContentBlock::text("hi")] }
    }

    #[test]
    fn save_then_list_round_trips() {
        let store = Store::open_in_memory().unwrap();
        let msg = user_msg("s1");
        assert!(store.save_sdk_message("s1", &msg).unwrap());
        let rows = store.list_messages("s1").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].msg_type, "user");
    }

    #[test]
    fn duplicate_uuid_is_reported_as_replay() {
        let store = Store::open_in_memory().unwrap();
        let msg = user_msg("s1");
        assert!(store.save_sdk_message("s1", &msg).unwrap());
        assert!(!store.save_sdk_message("s1", &msg).unwrap());
    }

    #[test]
    fn mark_saved_updates_status() {
        let store = Store::open_in_memory().unwrap();
        let msg = user_msg("s1");
        store.save_sdk_message("s1", &msg).unwrap();
        let row = &store.list_messages("s1").unwrap()[0];
        store.mark_message_saved(row.db_id).unwrap();
        let row = &store.list_messages("s1").unwrap()[0];
        assert_eq!(row.status, "saved");
    }

    #[test]
    fn latest_system_init_timestamp_finds_most_recent() {
        let store = Store::open_in_memory().unwrap();
        let mut base = MessageBase::new("s1");
        base.timestamp = Utc::now();
        let init = SdkMessage::System { base, subtype: sessiond_sdk::SystemSubtype::Init };
        store.save_sdk_message("s1", &init).unwrap();
        let ts = store.latest_system_init_timestamp("s1").unwrap();
        assert!(ts.is_some());
    }
}
