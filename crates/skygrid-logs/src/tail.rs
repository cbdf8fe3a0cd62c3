//! Bounded buffer of recent log entries.

use std::collections::VecDeque;
use std::fmt::Write as _;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::Level;

/// Default number of entries kept.
pub const DEFAULT_CAPACITY: usize = 1000;

/// One captured log event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub at: DateTime<Utc>,
    pub level: Level,
    pub target: String,
    pub message: String,
    pub fields: Vec<(String, String)>,
}

impl LogEntry {
    /// `YYYY-MM-DDTHH:MM:SS LEVEL message key=value ...`, UTC.
    pub fn render(&self) -> String {
        let mut line = format!(
            "{} {} {}",
            self.at.format("%Y-%m-%dT%H:%M:%S"),
            self.level,
            self.message
        );
        for (key, value) in &self.fields {
            let _ = write!(line, " {key}={value}");
        }
        line
    }
}

/// A shared ring buffer of log entries. Clones share the same buffer.
///
/// When full, the oldest entry is evicted to make room.
#[derive(Clone)]
pub struct LogTail {
    inner: Arc<LogTailInner>,
}

struct LogTailInner {
    entries: RwLock<VecDeque<LogEntry>>,
    capacity: usize,
}

impl LogTail {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(LogTailInner {
                entries: RwLock::new(VecDeque::with_capacity(capacity)),
                capacity,
            }),
        }
    }

    pub fn push(&self, entry: LogEntry) {
        if self.inner.capacity == 0 {
            return;
        }
        let mut entries = self.inner.entries.write();
        if entries.len() >= self.inner.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Entries, newest first.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.inner.entries.read().iter().rev().cloned().collect()
    }

    /// Rendered lines, newest first.
    pub fn lines(&self) -> Vec<String> {
        self.inner
            .entries
            .read()
            .iter()
            .rev()
            .map(LogEntry::render)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.read().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    pub fn clear(&self) {
        self.inner.entries.write().clear();
    }
}

impl Default for LogTail {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry(message: &str) -> LogEntry {
        LogEntry {
            at: Utc.with_ymd_and_hms(2026, 3, 9, 14, 5, 7).unwrap(),
            level: Level::INFO,
            target: "skygrid_engine::engine".into(),
            message: message.into(),
            fields: vec![],
        }
    }

    #[test]
    fn renders_timestamp_level_message_fields() {
        let mut e = entry("grid allocated");
        e.fields = vec![("hub_id".into(), "i-00000001".into()), ("nodes".into(), "5".into())];
        assert_eq!(
            e.render(),
            "2026-03-09T14:05:07 INFO grid allocated hub_id=i-00000001 nodes=5"
        );
    }

    #[test]
    fn newest_first() {
        let tail = LogTail::new(10);
        tail.push(entry("one"));
        tail.push(entry("two"));
        tail.push(entry("three"));

        let messages: Vec<String> = tail.entries().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["three", "two", "one"]);
    }

    #[test]
    fn evicts_oldest_when_full() {
        let tail = LogTail::new(3);
        for i in 1..=4 {
            tail.push(entry(&format!("msg {i}")));
        }

        assert_eq!(tail.len(), 3);
        assert_eq!(tail.capacity(), 3);
        let entries = tail.entries();
        assert_eq!(entries[0].message, "msg 4");
        assert_eq!(entries[2].message, "msg 2");
    }

    #[test]
    fn zero_capacity_keeps_nothing() {
        let tail = LogTail::new(0);
        tail.push(entry("dropped"));
        assert!(tail.is_empty());
    }

    #[test]
    fn clones_share_entries() {
        let tail = LogTail::new(10);
        let other = tail.clone();
        other.push(entry("shared"));
        assert_eq!(tail.len(), 1);

        tail.clear();
        assert!(other.is_empty());
    }
}
