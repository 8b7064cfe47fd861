//! Bounded in-memory storage for captured process output.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Which output stream a log line was captured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStream {
    Stdout,
    Stderr,
}

impl std::fmt::Display for LogStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdout => write!(f, "stdout"),
            Self::Stderr => write!(f, "stderr"),
        }
    }
}

/// A single captured log line, newline stripped.
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub stream: LogStream,
    pub data: String,
}

impl LogEntry {
    /// Create an entry stamped with the current time.
    #[must_use]
    pub fn new(stream: LogStream, data: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            stream,
            data: data.into(),
        }
    }
}

/// Bounded most-recent-N line store.
///
/// Appends are O(1); once `capacity` entries are retained the oldest is
/// evicted. `snapshot` returns an owned ordered copy, so readers never
/// observe later mutation.
#[derive(Debug)]
pub struct LogBuffer {
    entries: Mutex<VecDeque<LogEntry>>,
    capacity: usize,
}

impl LogBuffer {
    /// Create a buffer retaining at most `capacity` entries.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            capacity,
        }
    }

    /// Append an entry, evicting the oldest one at capacity.
    pub fn append(&self, entry: LogEntry) {
        let mut entries = self.entries.lock().unwrap();
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Ordered copy of the currently retained entries.
    #[must_use]
    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.entries.lock().unwrap().iter().cloned().collect()
    }

    /// Number of retained entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// Whether the buffer holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(data: &str) -> LogEntry {
        LogEntry::new(LogStream::Stdout, data)
    }

    #[test]
    fn test_append_and_snapshot() {
        let buffer = LogBuffer::new(5);
        for i in 0..3 {
            buffer.append(entry(&format!("line{i}")));
        }

        let snapshot = buffer.snapshot();
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot[0].data, "line0");
        assert_eq!(snapshot[2].data, "line2");
    }

    #[test]
    fn test_eviction_keeps_most_recent() {
        let buffer = LogBuffer::new(3);
        for data in ["L1", "L2", "L3", "L4", "L5"] {
            buffer.append(entry(data));
        }

        let snapshot = buffer.snapshot();
        let data: Vec<&str> = snapshot.iter().map(|e| e.data.as_str()).collect();
        assert_eq!(data, vec!["L3", "L4", "L5"]);
    }

    #[test]
    fn test_len_never_exceeds_capacity() {
        let buffer = LogBuffer::new(4);
        for i in 0..100 {
            buffer.append(entry(&i.to_string()));
            assert!(buffer.len() <= 4);
        }
        assert_eq!(buffer.len(), 4);
    }

    #[test]
    fn test_snapshot_is_stable_copy() {
        let buffer = LogBuffer::new(10);
        buffer.append(entry("before"));

        let snapshot = buffer.snapshot();
        buffer.append(entry("after"));

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].data, "before");
    }

    #[test]
    fn test_stream_serialization() {
        assert_eq!(
            serde_json::to_string(&LogStream::Stdout).unwrap(),
            r#""stdout""#
        );
        assert_eq!(
            serde_json::to_string(&LogStream::Stderr).unwrap(),
            r#""stderr""#
        );
    }

    #[test]
    fn test_entry_serialization() {
        let json = serde_json::to_string(&entry("hello")).unwrap();
        assert!(json.contains(r#""stream":"stdout""#));
        assert!(json.contains(r#""data":"hello""#));
        assert!(json.contains(r#""timestamp""#));
    }
}
