//! Observation sink for progress, retry and failure events.
//!
//! Core layers never log directly; they emit [`Event`]s to an injected
//! [`Observer`]. Production wiring uses [`TracingObserver`]; tests use
//! [`RecordingObserver`] to assert on what was emitted.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Something worth reporting while a run is in progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Info: a major step started or finished.
    Progress { step: String, detail: String },
    /// Warning: a retryable failure, the operation will run again after `delay`.
    RetryScheduled {
        attempt: u32,
        max_attempts: u32,
        delay: Duration,
        message: String,
    },
    /// Warning: a lookup failed and the resource is treated as absent.
    LookupDegraded { resource: String, message: String },
    /// Error: a contributor failed and the run continues without it.
    ContributorFailed { contributor: String, message: String },
}

impl Event {
    pub fn progress(step: &str, detail: impl Into<String>) -> Self {
        Self::Progress {
            step: step.to_string(),
            detail: detail.into(),
        }
    }
}

/// Event sink.
pub trait Observer: Send + Sync {
    fn emit(&self, event: Event);
}

/// Forwards events to `tracing` at the matching level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn emit(&self, event: Event) {
        match event {
            Event::Progress { step, detail } => {
                tracing::info!(step = %step, "{}", detail);
            }
            Event::RetryScheduled {
                attempt,
                max_attempts,
                delay,
                message,
            } => {
                tracing::warn!(
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "retrying after failure: {}",
                    message
                );
            }
            Event::LookupDegraded { resource, message } => {
                tracing::warn!(resource = %resource, "lookup failed, assuming absent: {}", message);
            }
            Event::ContributorFailed {
                contributor,
                message,
            } => {
                tracing::error!(contributor = %contributor, "contributor failed: {}", message);
            }
        }
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<Event>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Delays of every scheduled retry, in emission order.
    pub fn retry_delays(&self) -> Vec<Duration> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::RetryScheduled { delay, .. } => Some(delay),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, predicate: impl Fn(&Event) -> bool) -> usize {
        self.events().iter().filter(|e| predicate(e)).count()
    }
}

impl Observer for RecordingObserver {
    fn emit(&self, event: Event) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}
