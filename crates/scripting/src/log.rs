//! Bounded execution log

use std::collections::VecDeque;
use std::fmt;

/// Severity of a log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace,
    Info,
    Warn,
    Error,
}

/// One line of the execution log
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    /// Position in the run, counting evicted entries
    pub sequence: u64,
    /// Scope depth when the entry was written
    pub depth: usize,
    pub level: LogLevel,
    pub message: String,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} [{:?}] {}{}",
            self.sequence,
            self.level,
            "  ".repeat(self.depth),
            self.message
        )
    }
}

/// Ring buffer of log entries; the oldest entries are evicted at capacity
#[derive(Debug, Clone)]
pub struct ExecutionLog {
    entries: VecDeque<LogEntry>,
    capacity: usize,
    recorded: u64,
}

impl ExecutionLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            recorded: 0,
        }
    }

    pub fn push(&mut self, depth: usize, level: LogLevel, message: impl Into<String>) {
        let entry = LogEntry {
            sequence: self.recorded,
            depth,
            level,
            message: message.into(),
        };
        self.recorded += 1;

        if self.capacity == 0 {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Entries currently retained, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn to_vec(&self) -> Vec<LogEntry> {
        self.entries.iter().cloned().collect()
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

    /// Entries ever written, including evicted ones
    pub fn recorded(&self) -> u64 {
        self.recorded
    }

    pub fn evicted(&self) -> u64 {
        self.recorded - self.entries.len() as u64
    }
}
