//! Structured events emitted by the engine on every state transition.
//!
//! Consumers poll the event stream to build dashboards, alerting, or
//! audit trails. The log is a bounded in-memory ring: old events are
//! dropped once capacity is reached, and the monotonic sequence numbers
//! let consumers detect the gap.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Events retained before the oldest are dropped.
const EVENT_CAPACITY: usize = 4096;

/// A structured event emitted by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Monotonic sequence number. Consumers can detect gaps.
    pub seq: u64,
    /// When this event occurred.
    pub timestamp: DateTime<Utc>,
    /// What happened.
    pub kind: EventKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    WorkflowCreated {
        workflow: String,
    },
    WorkflowResumed {
        workflow: String,
        admitted: usize,
    },
    WorkflowSuspended {
        workflow: String,
        withdrawn: usize,
    },
    /// All tasks completed; the workflow left the registry.
    WorkflowRetired {
        workflow: String,
        tasks: usize,
    },
    QueueCreated {
        queue: String,
    },
    QueueDeleted {
        queue: String,
    },
    TaskCreated {
        workflow: String,
        task: String,
        queue: String,
        /// False when the owning workflow was suspended at creation.
        admitted: bool,
    },
    DependencyAdded {
        workflow: String,
        prerequisite: String,
        dependent: String,
    },
    TaskDequeued {
        workflow: String,
        task: String,
        queue: String,
    },
    TaskCompleted {
        workflow: String,
        task: String,
        /// Dependents whose last outstanding prerequisite this was.
        unblocked: usize,
    },
}

/// Bounded in-memory event log.
///
/// The internal mutex is a leaf lock: it is taken and released entirely
/// inside each method, never while any registry or entity lock is being
/// acquired. The flip side is that operations record their event after
/// releasing their entity locks, so under contention sequence order can
/// differ from the order the mutations became visible. The stream is an
/// observation feed, not a replay log; consumers must not reconstruct
/// state from event order alone.
pub struct EventLog {
    inner: Mutex<EventLogState>,
}

struct EventLogState {
    next_seq: u64,
    events: VecDeque<Event>,
}

impl EventLog {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(EventLogState {
                next_seq: 1,
                events: VecDeque::new(),
            }),
        }
    }

    /// Record an event, returning its sequence number.
    pub(crate) fn record(&self, kind: EventKind) -> u64 {
        let mut log = self.inner.lock();
        let seq = log.next_seq;
        log.next_seq += 1;
        if log.events.len() == EVENT_CAPACITY {
            log.events.pop_front();
        }
        log.events.push_back(Event {
            seq,
            timestamp: Utc::now(),
            kind,
        });
        seq
    }

    /// Events with a sequence number strictly greater than `seq`.
    pub fn since(&self, seq: u64) -> Vec<Event> {
        let log = self.inner.lock();
        log.events.iter().filter(|e| e.seq > seq).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_numbers_are_monotonic() {
        let log = EventLog::new();
        let a = log.record(EventKind::QueueCreated {
            queue: "q1".into(),
        });
        let b = log.record(EventKind::QueueDeleted {
            queue: "q1".into(),
        });
        assert!(b > a);

        let events = log.since(0);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].seq, a);
        assert_eq!(events[1].seq, b);
        assert_eq!(log.since(a).len(), 1);
        assert!(log.since(b).is_empty());
    }

    #[test]
    fn ring_drops_oldest_beyond_capacity() {
        let log = EventLog::new();
        for i in 0..(EVENT_CAPACITY + 10) {
            log.record(EventKind::WorkflowCreated {
                workflow: format!("wf-{i}"),
            });
        }
        let events = log.since(0);
        assert_eq!(events.len(), EVENT_CAPACITY);
        // Oldest ten dropped; the gap is visible in the first seq.
        assert_eq!(events[0].seq, 11);
    }
}
