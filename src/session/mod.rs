//! Per-conversation session state
//!
//! A [`SessionStore`] maps client-supplied session ids to the last accepted
//! trace, its compressed summary and the request sequence counter used to
//! drop out-of-order responses.
//!
//! Sessions are created on first write and live as long as the store. There
//! is no persistence and no eviction. Every entry is replaced under a single
//! write lock, so concurrent requests on one session are last-write-wins.

use crate::scene::format::format_value;
use crate::trace::Trace;
use log::{debug, warn};
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;

/// Longest summary sent back to the producer
const MAX_SUMMARY_CHARS: usize = 600;

/// Stdout lines kept in a summary
const SUMMARY_STDOUT_TAIL: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_summary: Option<String>,
}

/// Handle for one in-flight request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTicket {
    pub session_id: String,
    pub seq: u64,
}

/// A response arrived after a newer request was issued
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("response for request {seq} superseded by request {latest}")]
pub struct Superseded {
    pub seq: u64,
    pub latest: u64,
}

#[derive(Debug, Default)]
struct SessionEntry {
    summary: Option<String>,
    trace: Option<Arc<Trace>>,
    latest_seq: u64,
}

#[derive(Debug, Default)]
pub struct SessionStore {
    entries: RwLock<FxHashMap<String, SessionEntry>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, FxHashMap<String, SessionEntry>> {
        match self.entries.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Session lock poisoned while reading - recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, FxHashMap<String, SessionEntry>> {
        match self.entries.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Session lock poisoned while writing - recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Look up a session without creating it
    pub fn get(&self, session_id: &str) -> Option<Session> {
        self.read().get(session_id).map(|entry| Session {
            session_id: session_id.to_string(),
            previous_summary: entry.summary.clone(),
        })
    }

    /// Replace the session's summary, creating the session if needed
    pub fn update(&self, session_id: &str, summary: impl Into<String>) {
        let summary = summary.into();
        self.write()
            .entry(session_id.to_string())
            .or_default()
            .summary = Some(summary);
    }

    /// The last trace accepted for the session
    pub fn trace(&self, session_id: &str) -> Option<Arc<Trace>> {
        self.read()
            .get(session_id)
            .and_then(|entry| entry.trace.clone())
    }

    /// Issue the next sequence number for the session
    pub fn begin_request(&self, session_id: &str) -> RequestTicket {
        let mut entries = self.write();
        let entry = entries.entry(session_id.to_string()).or_default();
        entry.latest_seq += 1;
        debug!("session '{}': issued request {}", session_id, entry.latest_seq);
        RequestTicket {
            session_id: session_id.to_string(),
            seq: entry.latest_seq,
        }
    }

    /// Whether no newer request has been issued since `ticket`
    pub fn is_latest(&self, ticket: &RequestTicket) -> bool {
        self.read()
            .get(&ticket.session_id)
            .is_some_and(|entry| entry.latest_seq == ticket.seq)
    }

    /// Store the trace for `ticket` if it is still the latest request.
    ///
    /// The trace and its summary are replaced together. A stale ticket leaves
    /// the session untouched.
    pub fn complete(&self, ticket: &RequestTicket, trace: Trace) -> Result<Arc<Trace>, Superseded> {
        let summary = summarize(&trace);
        let mut entries = self.write();
        let entry = entries.entry(ticket.session_id.clone()).or_default();
        if entry.latest_seq != ticket.seq {
            return Err(Superseded {
                seq: ticket.seq,
                latest: entry.latest_seq,
            });
        }
        let trace = Arc::new(trace);
        entry.trace = Some(Arc::clone(&trace));
        entry.summary = Some(summary);
        Ok(trace)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

/// Compress a trace into a short text for the next request's context
pub fn summarize(trace: &Trace) -> String {
    let mut parts = vec![format!("steps: {}", trace.len())];

    if let Some(state) = &trace.final_state {
        if !state.variables.is_empty() {
            let vars: Vec<String> = state
                .variables
                .iter()
                .map(|(name, value)| format!("{} = {}", name, format_value(value)))
                .collect();
            parts.push(format!("variables: {}", vars.join(", ")));
        }
        if !state.stdout.is_empty() {
            let skip = state.stdout.len().saturating_sub(SUMMARY_STDOUT_TAIL);
            let tail: Vec<&str> = state.stdout[skip..].iter().map(String::as_str).collect();
            parts.push(format!("stdout: {}", tail.join(" | ")));
        }
        if !state.errors.is_empty() {
            parts.push(format!("errors: {}", state.errors.join(" | ")));
        }
    }

    let summary = parts.join("; ");
    if summary.chars().count() <= MAX_SUMMARY_CHARS {
        summary
    } else {
        let mut cut: String = summary.chars().take(MAX_SUMMARY_CHARS - 3).collect();
        cut.push_str("...");
        cut
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::normalize::normalize;
    use serde_json::json;

    #[test]
    fn test_get_unknown_session() {
        let store = SessionStore::new();
        assert_eq!(store.get("nope"), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_update_creates_and_overwrites() {
        let store = SessionStore::new();
        store.update("s1", "first");
        store.update("s1", "second");
        let session = store.get("s1").unwrap();
        assert_eq!(session.session_id, "s1");
        assert_eq!(session.previous_summary.as_deref(), Some("second"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_sequence_numbers_are_per_session() {
        let store = SessionStore::new();
        assert_eq!(store.begin_request("a").seq, 1);
        assert_eq!(store.begin_request("a").seq, 2);
        assert_eq!(store.begin_request("b").seq, 1);
    }

    #[test]
    fn test_latest_request_wins_regardless_of_arrival() {
        let store = SessionStore::new();
        let older = store.begin_request("s");
        let newer = store.begin_request("s");

        let newer_trace = normalize(&json!({"steps": [{"line": 2}]}));
        let stored = store.complete(&newer, newer_trace.clone()).unwrap();
        assert_eq!(*stored, newer_trace);

        // The older response arrives late and is dropped
        let older_trace = normalize(&json!({"steps": [{"line": 1}]}));
        let err = store.complete(&older, older_trace).unwrap_err();
        assert_eq!(err, Superseded { seq: 1, latest: 2 });
        assert_eq!(*store.trace("s").unwrap(), newer_trace);
        assert!(!store.is_latest(&older));
        assert!(store.is_latest(&newer));
    }

    #[test]
    fn test_complete_updates_summary() {
        let store = SessionStore::new();
        let ticket = store.begin_request("s");
        let trace = normalize(&json!({
            "steps": [{"variables": {"x": 7}, "stdout": ["7"]}]
        }));
        store.complete(&ticket, trace).unwrap();
        assert_eq!(
            store.get("s").unwrap().previous_summary.as_deref(),
            Some("steps: 1; variables: x = 7; stdout: 7")
        );
    }

    #[test]
    fn test_summary_is_bounded() {
        let lines: Vec<String> = (0..200).map(|i| format!("line {}", i)).collect();
        let trace = normalize(&json!({"steps": [{"errors": lines}]}));
        let summary = summarize(&trace);
        assert_eq!(summary.chars().count(), MAX_SUMMARY_CHARS);
        assert!(summary.ends_with("..."));
    }
}
