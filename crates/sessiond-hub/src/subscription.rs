// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::{HashMap, HashSet};

use crate::error::{HubError, Result};

/// Two-level `session → method → {clientId}` index plus the reverse
/// `clientId → session → {method}` map used for O(1) cleanup when a
/// connection drops. Every mutation that empties an inner set also removes
/// its parent entry — no empty containers are left behind (testable
/// property 5).
#[derive(Default)]
pub struct SubscriptionIndex {
    forward: HashMap<String, HashMap<String, HashSet<String>>>,
    reverse: HashMap<String, HashMap<String, HashSet<String>>>,
}

/// `method` (and a bare session id) must never contain `:` — it is reserved
/// for the one compound scope the wire format recognizes (§6 Scoping).
pub fn validate_no_colon(field: &str) -> Result<()> {
    if field.contains(':') {
        return Err(HubError::ReservedCharacter(field.to_string()));
    }
    Ok(())
}

/// Session scopes are either a colon-free id/`"global"`, or the compound
/// `"room:<roomId>"` form used for room-scoped events (§6 Scoping). Anything
/// else containing `:` is rejected.
pub fn validate_session_scope(session: &str) -> Result<()> {
    match session.split_once(':') {
        None => Ok(()),
        Some(("room", rest)) if !rest.is_empty() && !rest.contains(':') => Ok(()),
        Some(_) => Err(HubError::ReservedCharacter(session.to_string())),
    }
}

impl SubscriptionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `client_id` for `(session, method)`. Idempotent — a second
    /// call has no observable effect beyond the first.
    pub fn subscribe(&mut self, session: &str, method: &str, client_id: &str) -> Result<()> {
        validate_session_scope(session)?;
        validate_no_colon(method)?;
        self.forward
            .entry(session.to_string())
            .or_default()
            .entry(method.to_string())
            .or_default()
            .insert(client_id.to_string());
        self.reverse
            .entry(client_id.to_string())
            .or_default()
            .entry(session.to_string())
            .or_default()
            .insert(method.to_string());
        Ok(())
    }

    pub fn unsubscribe(&mut self, session: &str, method: &str, client_id: &str) {
        if let Some(methods) = self.forward.get_mut(session) {
            if let Some(clients) = methods.get_mut(method) {
                clients.remove(client_id);
                if clients.is_empty() {
                    methods.remove(method);
                }
            }
            if methods.is_empty() {
                self.forward.remove(session);
            }
        }
        if let Some(sessions) = self.reverse.get_mut(client_id) {
            if let Some(methods) = sessions.get_mut(session) {
                methods.remove(method);
                if methods.is_empty() {
                    sessions.remove(session);
                }
            }
            if sessions.is_empty() {
                self.reverse.remove(client_id);
            }
        }
    }

    /// Drop every subscription held by `client_id` — called on disconnect.
    pub fn unsubscribe_all(&mut self, client_id: &str) {
        let Some(sessions) = self.reverse.remove(client_id) else { return };
        for (session, methods) in sessions {
            for method in methods {
                if let Some(clients) = self.forward.get_mut(&session).and_then(|m| m.get_mut(&method)) {
                    clients.remove(client_id);
                    if clients.is_empty() {
                        self.forward.get_mut(&session).unwrap().remove(&method);
                    }
                }
            }
            if self.forward.get(&session).is_some_and(HashMap::is_empty) {
                self.forward.remove(&session);
            }
        }
    }

    pub fn subscribers(&self, session: &str, method: &str) -> Vec<String> {
        self.forward
            .get(session)
            .and_then(|m| m.get(method))
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Every outer `(session, method)` pair currently holding at least one
    /// subscriber — used to assert the no-empty-container invariant in
    /// tests and by callers enumerating active subscriptions.
    pub fn pairs(&self) -> Vec<(String, String)> {
        self.forward
            .iter()
            .flat_map(|(session, methods)| methods.keys().map(move |m| (session.clone(), m.clone())))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty() && self.reverse.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_then_lookup() {
        let mut idx = SubscriptionIndex::new();
        idx.subscribe("global", "session.created", "client-1").unwrap();
        assert_eq!(idx.subscribers("global", "session.created"), vec!["client-1".to_string()]);
    }

    #[test]
    fn duplicate_subscribe_is_idempotent() {
        let mut idx = SubscriptionIndex::new();
        idx.subscribe("s1", "sdk.message", "client-1").unwrap();
        idx.subscribe("s1", "sdk.message", "client-1").unwrap();
        assert_eq!(idx.subscribers("s1", "sdk.message").len(), 1);
    }

    #[test]
    fn rejects_colon_in_method_and_non_room_session() {
        let mut idx = SubscriptionIndex::new();
        assert!(idx.subscribe("sess:1", "sdk.message", "c1").is_err());
        assert!(idx.subscribe("s1", "bad:method", "c1").is_err());
        assert!(idx.subscribe("room:a:b", "sdk.message", "c1").is_err());
    }

    #[test]
    fn room_scoped_session_is_a_valid_subscription_target() {
        let mut idx = SubscriptionIndex::new();
        idx.subscribe("room:abc", "recurringJob.triggered", "c1").unwrap();
        assert_eq!(idx.subscribers("room:abc", "recurringJob.triggered"), vec!["c1".to_string()]);
    }

    #[test]
    fn unsubscribe_removes_empty_containers() {
        let mut idx = SubscriptionIndex::new();
        idx.subscribe("s1", "sdk.message", "client-1").unwrap();
        idx.unsubscribe("s1", "sdk.message", "client-1");
        assert!(idx.is_empty());
        assert!(idx.pairs().is_empty());
    }

    #[test]
    fn unsubscribe_all_cleans_every_subscription_for_client() {
        let mut idx = SubscriptionIndex::new();
        idx.subscribe("s1", "sdk.message", "client-1").unwrap();
        idx.subscribe("s1", "state.sdkMessages.delta", "client-1").unwrap();
        idx.subscribe("s2", "sdk.message", "client-1").unwrap();
        idx.subscribe("s1", "sdk.message", "client-2").unwrap();

        idx.unsubscribe_all("client-1");

        assert_eq!(idx.subscribers("s1", "sdk.message"), vec!["client-2".to_string()]);
        assert!(idx.subscribers("s1", "state.sdkMessages.delta").is_empty());
        assert!(idx.subscribers("s2", "sdk.message").is_empty());
    }

    #[test]
    fn multiple_clients_on_same_pair() {
        let mut idx = SubscriptionIndex::new();
        idx.subscribe("global", "session.updated", "c1").unwrap();
        idx.subscribe("global", "session.updated", "c2").unwrap();
        let mut subs = idx.subscribers("global", "session.updated");
        subs.sort();
        assert_eq!(subs, vec!["c1".to_string(), "c2".to_string()]);
    }
}
