//! Application tracer: syslog emission plus bounded event and error
//! history rings.
//!
//! The rings mirror the switch's `show ... internal event-history`
//! machinery: the most recent [`HISTORY_MAX`] event and error records are
//! kept in memory and queryable by the application. Everything is also
//! forwarded to the `tracing` subscriber the hosting binary installed.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use switchlink_types::Severity;

/// Records kept per history ring before the oldest is dropped.
pub(crate) const HISTORY_MAX: usize = 1024;

/// One trace record in a history ring.
#[derive(Debug, Clone)]
pub struct TraceRecord {
    when: DateTime<Utc>,
    severity: Severity,
    message: String,
}

impl TraceRecord {
    pub fn when(&self) -> DateTime<Utc> {
        self.when
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Syslog and event-history tracer for one application.
pub struct Tracer {
    app_name: String,
    events: Mutex<VecDeque<TraceRecord>>,
    errors: Mutex<VecDeque<TraceRecord>>,
}

impl Tracer {
    pub(crate) fn new(app_name: &str) -> Tracer {
        Tracer {
            app_name: app_name.to_string(),
            events: Mutex::new(VecDeque::new()),
            errors: Mutex::new(VecDeque::new()),
        }
    }

    /// Emits a syslog at the given priority. Not recorded in either
    /// history ring.
    pub fn syslog(&self, severity: Severity, message: &str) {
        match severity {
            Severity::Emergency | Severity::Alert | Severity::Critical | Severity::Error => {
                error!(app = %self.app_name, severity = %severity, "{message}")
            }
            Severity::Warning => warn!(app = %self.app_name, "{message}"),
            Severity::Notice | Severity::Info => info!(app = %self.app_name, "{message}"),
            Severity::Debug => debug!(app = %self.app_name, "{message}"),
        }
    }

    /// Records one informational entry in the event history ring.
    pub fn event(&self, message: &str) {
        info!(app = %self.app_name, "{message}");
        push(&self.events, Severity::Info, message);
    }

    /// Records one entry in the error history ring.
    pub fn error(&self, message: &str) {
        error!(app = %self.app_name, "{message}");
        push(&self.errors, Severity::Error, message);
    }

    /// The event history, oldest first.
    pub fn event_history(&self) -> Vec<TraceRecord> {
        self.events.lock().unwrap().iter().cloned().collect()
    }

    /// The error history, oldest first.
    pub fn error_history(&self) -> Vec<TraceRecord> {
        self.errors.lock().unwrap().iter().cloned().collect()
    }
}

fn push(ring: &Mutex<VecDeque<TraceRecord>>, severity: Severity, message: &str) {
    let mut ring = ring.lock().unwrap();
    if ring.len() == HISTORY_MAX {
        ring.pop_front();
    }
    ring.push_back(TraceRecord {
        when: Utc::now(),
        severity,
        message: message.to_string(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_histories_are_separate() {
        let t = Tracer::new("testapp");
        t.event("came up");
        t.error("lost a lock");
        t.event("settled");

        let events = t.event_history();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].message(), "came up");
        assert_eq!(events[1].message(), "settled");

        let errors = t.error_history();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].severity(), Severity::Error);
    }

    #[test]
    fn test_ring_drops_oldest() {
        let t = Tracer::new("testapp");
        for n in 0..HISTORY_MAX + 5 {
            t.event(&format!("event {n}"));
        }
        let events = t.event_history();
        assert_eq!(events.len(), HISTORY_MAX);
        assert_eq!(events[0].message(), "event 5");
    }
}
