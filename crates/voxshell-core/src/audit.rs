//! In-memory audit trail of what the shell was asked and what it did

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::intent::IntentId;

/// Audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub event: AuditEvent,
    pub intent: Option<IntentId>,
    pub details: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEvent {
    Matched,
    NotUnderstood,
    Rejected,
    AwaitingConfirmation,
    Confirmed,
    Declined,
    Executed,
    Failed,
}

/// Bounded audit log, cheap to clone and share
#[derive(Debug, Clone)]
pub struct AuditLog {
    entries: Arc<RwLock<Vec<AuditEntry>>>,
    max_entries: usize,
}

impl AuditLog {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(Vec::new())),
            max_entries,
        }
    }

    /// Log an audit event
    pub fn log(&self, event: AuditEvent, intent: Option<IntentId>, details: impl Into<String>) {
        let entry = AuditEntry {
            timestamp: Utc::now(),
            event,
            intent,
            details: details.into(),
        };

        let mut entries = self.entries.write();
        entries.push(entry);

        if entries.len() > self.max_entries {
            let remove_count = entries.len() - self.max_entries;
            entries.drain(0..remove_count);
        }
    }

    /// Most recent entries, newest first
    pub fn recent(&self, count: usize) -> Vec<AuditEntry> {
        let entries = self.entries.read();
        entries.iter().rev().take(count).cloned().collect()
    }

    pub fn all(&self) -> Vec<AuditEntry> {
        self.entries.read().clone()
    }

    pub fn count(&self, event: AuditEvent) -> usize {
        self.entries.read().iter().filter(|e| e.event == event).count()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new(1000)
    }
}
