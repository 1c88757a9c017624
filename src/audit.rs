//! Bounded audit trail: every optimizer decision, DDL/DML statement,
//! refresh, schedule fire, and attach/detach gets one entry. Oldest
//! entries are dropped once the ring buffer fills, since the audit log is
//! a diagnostic aid, not a durability guarantee.

use parking_lot::Mutex;
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditOperation {
    Optimizer,
    Ddl,
    Dml,
    Refresh,
    Schedule,
    Attach,
}

#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub timestamp: i64,
    pub operation: AuditOperation,
    pub subject: String,
    pub message: String,
    pub rows_affected: Option<usize>,
    pub plan_excerpt: Option<String>,
}

/// Fixed-capacity ring buffer of [`AuditEvent`]s, guarded by a
/// `parking_lot::Mutex` so both the foreground query path and the
/// scheduler's background thread can append without contending on a
/// heavier `std::sync::Mutex`.
pub struct AuditLog {
    capacity: usize,
    events: Mutex<VecDeque<AuditEvent>>,
}

impl AuditLog {
    pub fn new(capacity: usize) -> Self {
        AuditLog {
            capacity: capacity.max(1),
            events: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn record(&self, event: AuditEvent) {
        tracing::debug!(
            operation = ?event.operation,
            subject = %event.subject,
            "{}",
            event.message
        );
        let mut events = self.events.lock();
        if events.len() == self.capacity {
            events.pop_front();
        }
        events.push_back(event);
    }

    pub fn recent(&self, n: usize) -> Vec<AuditEvent> {
        let events = self.events.lock();
        events.iter().rev().take(n).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        AuditLog::new(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(subject: &str) -> AuditEvent {
        AuditEvent {
            timestamp: 0,
            operation: AuditOperation::Ddl,
            subject: subject.to_string(),
            message: "test".to_string(),
            rows_affected: None,
            plan_excerpt: None,
        }
    }

    #[test]
    fn ring_buffer_drops_oldest_once_full() {
        let log = AuditLog::new(2);
        log.record(event("a"));
        log.record(event("b"));
        log.record(event("c"));
        let recent = log.recent(10);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].subject, "c");
        assert_eq!(recent[1].subject, "b");
    }
}
