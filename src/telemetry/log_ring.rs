//! Bounded, newest-first ring of user-facing log entries.

use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;

/// One timestamped log line
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    /// Position in the ring's history, assigned on push and never reused
    pub seq: u64,
    pub timestamp: DateTime<Local>,
    pub message: String,
}

impl LogEntry {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            seq: 0,
            timestamp: Local::now(),
            message: message.into(),
        }
    }
}

impl fmt::Display for LogEntry {
    /// `[HH:MM:SS.mmm] message`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.timestamp.format("%H:%M:%S%.3f"), self.message)
    }
}

/// Fixed-capacity log, newest entry first; the oldest entry is evicted
/// once the capacity is exceeded
#[derive(Debug, Clone)]
pub struct LogRing {
    entries: VecDeque<LogEntry>,
    capacity: usize,
    next_seq: u64,
}

impl LogRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            next_seq: 1,
        }
    }

    pub fn push(&mut self, mut entry: LogEntry) {
        entry.seq = self.next_seq;
        self.next_seq += 1;
        self.entries.push_front(entry);
        self.entries.truncate(self.capacity);
    }

    /// Entries, newest first
    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn to_vec(&self) -> Vec<LogEntry> {
        self.entries.iter().cloned().collect()
    }

    /// Drop every entry; sequence numbers keep counting
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_newest_first() {
        let mut ring = LogRing::new(3);
        ring.push(LogEntry::new("a"));
        ring.push(LogEntry::new("b"));

        let messages: Vec<_> = ring.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["b", "a"]);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let capacity = 200;
        let extra = 7;
        let mut ring = LogRing::new(capacity);
        for i in 0..capacity + extra {
            ring.push(LogEntry::new(i.to_string()));
        }

        assert_eq!(ring.len(), capacity);
        let entries = ring.to_vec();
        assert_eq!(entries[0].message, (capacity + extra - 1).to_string());
        assert_eq!(entries[capacity - 1].message, extra.to_string());
        assert!(!entries.iter().any(|e| e.message == (extra - 1).to_string()));
    }

    #[test]
    fn test_clear() {
        let mut ring = LogRing::new(4);
        ring.push(LogEntry::new("a"));
        ring.clear();
        assert!(ring.is_empty());
        assert_eq!(ring.capacity(), 4);
    }

    #[test]
    fn test_seq_survives_clear() {
        let mut ring = LogRing::new(4);
        ring.push(LogEntry::new("a"));
        ring.push(LogEntry::new("b"));
        assert_eq!(ring.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![2, 1]);

        ring.clear();
        ring.push(LogEntry::new("c"));
        assert_eq!(ring.to_vec()[0].seq, 3);
    }

    #[test]
    fn test_display_format() {
        let entry = LogEntry {
            seq: 0,
            timestamp: Local.with_ymd_and_hms(2024, 3, 1, 9, 5, 7).unwrap()
                + chrono::Duration::milliseconds(42),
            message: "Sending: START".to_string(),
        };
        assert_eq!(entry.to_string(), "[09:05:07.042] Sending: START");
    }
}
