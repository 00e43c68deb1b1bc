//! Per-process log bus and ring buffer
//!
//! Each process name owns a broadcast channel for live subscribers and a
//! bounded buffer of recent lines. Channels outlive the process so that a
//! subscriber keeps receiving output across restarts.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

/// Capacity of each live log channel
const CHANNEL_CAPACITY: usize = 1024;

/// Which output stream a line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStream {
    Out,
    Err,
}

impl fmt::Display for LogStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Out => f.write_str("out"),
            Self::Err => f.write_str("err"),
        }
    }
}

/// One line of process output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLine {
    pub stream: LogStream,
    pub line: String,
    pub timestamp: DateTime<Utc>,
}

impl LogLine {
    pub fn new(stream: LogStream, line: impl Into<String>) -> Self {
        Self {
            stream,
            line: line.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Renders as `[out] text`
impl fmt::Display for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.stream, self.line)
    }
}

struct LogChannel {
    sender: broadcast::Sender<LogLine>,
    buffer: Mutex<VecDeque<LogLine>>,
}

/// Log channels keyed by process name
pub struct LogHub {
    channels: DashMap<String, Arc<LogChannel>>,
    buffer_lines: usize,
}

impl LogHub {
    pub fn new(buffer_lines: usize) -> Self {
        Self {
            channels: DashMap::new(),
            buffer_lines,
        }
    }

    fn channel(&self, name: &str) -> Arc<LogChannel> {
        self.channels
            .entry(name.to_string())
            .or_insert_with(|| {
                let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
                Arc::new(LogChannel {
                    sender,
                    buffer: Mutex::new(VecDeque::new()),
                })
            })
            .clone()
    }

    /// Record a line and fan it out to live subscribers
    pub fn push(&self, name: &str, line: LogLine) {
        let channel = self.channel(name);
        if self.buffer_lines > 0 {
            if let Ok(mut buffer) = channel.buffer.lock() {
                if buffer.len() >= self.buffer_lines {
                    buffer.pop_front();
                }
                buffer.push_back(line.clone());
            }
        }
        // No receivers is fine
        let _ = channel.sender.send(line);
    }

    pub fn subscribe(&self, name: &str) -> broadcast::Receiver<LogLine> {
        self.channel(name).sender.subscribe()
    }

    pub fn recent(&self, name: &str, tail: usize) -> Vec<LogLine> {
        let Some(channel) = self.channels.get(name).map(|c| c.value().clone()) else {
            return Vec::new();
        };
        let Ok(buffer) = channel.buffer.lock() else {
            return Vec::new();
        };
        let skip = buffer.len().saturating_sub(tail);
        buffer.iter().skip(skip).cloned().collect()
    }

    pub fn clear(&self, name: &str) {
        if let Some(channel) = self.channels.get(name) {
            if let Ok(mut buffer) = channel.buffer.lock() {
                buffer.clear();
            }
        }
    }
}
