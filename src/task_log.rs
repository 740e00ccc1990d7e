//! In-process record of submitted tasks and the answers they got.
//!
//! Append-only and shared by every request handler. Nothing is persisted;
//! the log lives as long as the `AgentService` that owns it. There is no
//! retention limit, so a long-running `relay serve` keeps every entry until
//! the process exits.

use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Task,
    Response,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub at: DateTime<Utc>,
    pub task_id: String,
    pub kind: EntryKind,
    pub text: String,
}

#[derive(Debug, Default)]
pub struct TaskLog {
    entries: RwLock<Vec<LogEntry>>,
}

impl TaskLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, task_id: &str, kind: EntryKind, text: impl Into<String>) {
        let entry = LogEntry {
            at: Utc::now(),
            task_id: task_id.to_string(),
            kind,
            text: text.into(),
        };
        self.entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(entry);
    }

    pub fn task(&self, task_id: &str, text: &str) {
        self.record(task_id, EntryKind::Task, text);
    }

    pub fn response(&self, task_id: &str, text: &str) {
        self.record(task_id, EntryKind::Response, text);
    }

    pub fn failure(&self, task_id: &str, text: impl Into<String>) {
        self.record(task_id, EntryKind::Failure, text);
    }

    /// Snapshot of every entry, oldest first.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn for_task(&self, task_id: &str) -> Vec<LogEntry> {
        self.entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .filter(|entry| entry.task_id == task_id)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_entries_keep_insertion_order() {
        let log = TaskLog::new();
        log.task("a", "Explain this code");
        log.response("a", "It does X");
        log.failure("b", "timeout");

        let entries = log.entries();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].kind, EntryKind::Task);
        assert_eq!(entries[1].text, "It does X");
        assert_eq!(entries[2].kind, EntryKind::Failure);
        assert!(entries[0].at <= entries[2].at);
    }

    #[test]
    fn test_entries_are_never_evicted() {
        let log = TaskLog::new();
        for i in 0..5_000 {
            log.task(&format!("t{}", i), "work");
        }

        assert_eq!(log.len(), 5_000);
        assert_eq!(log.entries()[0].task_id, "t0");
    }

    #[test]
    fn test_for_task_filters() {
        let log = TaskLog::new();
        log.task("a", "one");
        log.task("b", "two");
        log.response("a", "three");

        let a = log.for_task("a");
        assert_eq!(a.len(), 2);
        assert!(a.iter().all(|e| e.task_id == "a"));
        assert!(log.for_task("missing").is_empty());
    }

    #[test]
    fn test_serializes_camel_case() {
        let log = TaskLog::new();
        log.response("t-1", "ok");
        let json = serde_json::to_value(&log.entries()[0]).unwrap();
        assert_eq!(json["taskId"], "t-1");
        assert_eq!(json["kind"], "response");
        assert!(json["at"].is_string());
    }

    #[test]
    fn test_concurrent_appends() {
        let log = Arc::new(TaskLog::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let log = log.clone();
                std::thread::spawn(move || {
                    for j in 0..25 {
                        log.task(&format!("t{}", i), &format!("entry {}", j));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(log.len(), 200);
        assert_eq!(log.for_task("t3").len(), 25);
    }
}
