//! Operator info log
//!
//! Bounded list of timestamped messages for the operator: transport errors,
//! write results and strategy switches end up here as well as in the `log`
//! output, so nothing is swallowed.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Severity of an operator message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoLevel {
    Info,
    Error,
}

/// One operator-facing message
#[derive(Debug, Clone, PartialEq)]
pub struct InfoMessage {
    pub time: DateTime<Utc>,
    pub level: InfoLevel,
    pub text: String,
}

impl fmt::Display for InfoMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = match self.level {
            InfoLevel::Info => "",
            InfoLevel::Error => "ERROR: ",
        };
        write!(f, "[{}] {}{}", self.time.format("%H:%M:%S%.3f"), marker, self.text)
    }
}

/// Thread-safe bounded log; the oldest messages are dropped first
#[derive(Debug)]
pub struct InfoLog {
    messages: Mutex<VecDeque<InfoMessage>>,
    capacity: usize,
}

impl InfoLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            messages: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<InfoMessage>> {
        self.messages.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, level: InfoLevel, text: String) {
        let mut messages = self.lock();
        if messages.len() == self.capacity {
            messages.pop_front();
        }
        messages.push_back(InfoMessage {
            time: Utc::now(),
            level,
            text,
        });
    }

    pub fn info(&self, text: impl Into<String>) {
        self.push(InfoLevel::Info, text.into());
    }

    pub fn error(&self, text: impl Into<String>) {
        self.push(InfoLevel::Error, text.into());
    }

    /// Copy of all messages, oldest first
    pub fn messages(&self) -> Vec<InfoMessage> {
        self.lock().iter().cloned().collect()
    }

    /// Remove and return all messages, oldest first
    pub fn drain(&self) -> Vec<InfoMessage> {
        self.lock().drain(..).collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InfoLog {
    fn default() -> Self {
        Self::new(256)
    }
}
