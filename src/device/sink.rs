//! Append-only sink for operator-facing messages.
//!
//! The driver still emits everything through the `log` facade; a sink is an
//! optional second channel a UI can hand in to show recent activity.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Local};
use log::Level;

const MAX_LOG_ENTRIES: usize = 1000;

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub level: Level,
    pub message: String,
}

pub trait LogSink: Send {
    fn append(&mut self, entry: LogEntry);
}

/// A thread-safe, fixed-capacity log buffer. Clones share the same entries.
#[derive(Debug, Clone)]
pub struct LogBuffer(Arc<Mutex<VecDeque<LogEntry>>>);

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl LogBuffer {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(VecDeque::with_capacity(MAX_LOG_ENTRIES))))
    }

    pub fn read(&self) -> MutexGuard<'_, VecDeque<LogEntry>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn messages(&self) -> Vec<String> {
        self.read().iter().map(|e| e.message.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn clear(&self) {
        self.read().clear();
    }
}

impl LogSink for LogBuffer {
    fn append(&mut self, entry: LogEntry) {
        let mut entries = self.read();
        if entries.len() == MAX_LOG_ENTRIES {
            entries.pop_front();
        }
        entries.push_back(entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(message: &str) -> LogEntry {
        LogEntry { timestamp: Local::now(), level: Level::Info, message: message.to_string() }
    }

    #[test]
    fn clones_share_entries() {
        let buffer = LogBuffer::new();
        let mut sink = buffer.clone();
        sink.append(entry("moved to 3"));
        assert_eq!(buffer.messages(), vec!["moved to 3".to_string()]);
    }

    #[test]
    fn oldest_entries_are_dropped_at_capacity() {
        let mut buffer = LogBuffer::new();
        for i in 0..MAX_LOG_ENTRIES + 5 {
            buffer.append(entry(&format!("line {}", i)));
        }
        assert_eq!(buffer.len(), MAX_LOG_ENTRIES);
        assert_eq!(buffer.read().front().map(|e| e.message.as_str()), Some("line 5"));
    }
}
