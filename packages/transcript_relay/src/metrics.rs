//! Relay metrics for observability
//!
//! Runtime counters for monitoring relay health. Counters are process-wide
//! and lock-free; per-request reconciliation state never lives here.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Relay-wide metrics
#[derive(Debug, Default)]
pub struct RelayMetrics {
    /// Requests that passed validation and opened a stream
    pub requests_started: AtomicU64,
    /// Requests whose stream ran to completion
    pub requests_completed: AtomicU64,
    /// Requests terminated by an upstream failure
    pub requests_failed: AtomicU64,
    /// Requests rejected before streaming began
    pub validation_rejects: AtomicU64,
    /// Streams abandoned by the client mid-flight
    pub client_disconnects: AtomicU64,

    /// Wire frames written (sentinel included)
    pub frames_sent: AtomicU64,
    /// Text events that survived reconciliation
    pub text_events: AtomicU64,
    /// Text blocks the reconciler suppressed entirely
    pub blocks_suppressed: AtomicU64,

    /// Relay start time (for uptime calculation)
    start_time: Option<Instant>,
}

impl RelayMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    pub fn request_started(&self) {
        self.requests_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn request_completed(&self) {
        self.requests_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn request_failed(&self) {
        self.requests_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn validation_reject(&self) {
        self.validation_rejects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn client_disconnect(&self) {
        self.client_disconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frame_sent(&self) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn text_event(&self) {
        self.text_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn blocks_suppressed_add(&self, count: u64) {
        self.blocks_suppressed.fetch_add(count, Ordering::Relaxed);
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.map(|t| t.elapsed().as_secs()).unwrap_or(0)
    }

    /// Create a snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.uptime_secs(),
            requests: RequestMetrics {
                started: self.requests_started.load(Ordering::Relaxed),
                completed: self.requests_completed.load(Ordering::Relaxed),
                failed: self.requests_failed.load(Ordering::Relaxed),
                validation_rejects: self.validation_rejects.load(Ordering::Relaxed),
                client_disconnects: self.client_disconnects.load(Ordering::Relaxed),
            },
            stream: StreamMetrics {
                frames_sent: self.frames_sent.load(Ordering::Relaxed),
                text_events: self.text_events.load(Ordering::Relaxed),
                blocks_suppressed: self.blocks_suppressed.load(Ordering::Relaxed),
            },
        }
    }
}

/// Point-in-time view of all counters (for the metrics endpoint)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub requests: RequestMetrics,
    pub stream: StreamMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestMetrics {
    pub started: u64,
    pub completed: u64,
    pub failed: u64,
    pub validation_rejects: u64,
    pub client_disconnects: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamMetrics {
    pub frames_sent: u64,
    pub text_events: u64,
    pub blocks_suppressed: u64,
}
