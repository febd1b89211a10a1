//! Relay metrics for the Skein server.
//!
//! [`RelayMetrics`] is a bag of atomic counters shared by every connection
//! task. Reading it yields a [`MetricsSnapshot`], which serializes to JSON
//! for logs and status output.

use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use serde::Serialize;

/// A monotonically increasing counter.
///
/// Relaxed ordering throughout: these are statistics, not synchronization.
#[derive(Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Counter").field(&self.get()).finish()
    }
}

/// A value that moves both ways (e.g. live connections).
#[derive(Default)]
pub struct Gauge(AtomicI64);

impl Gauge {
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec(&self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> i64 {
        self.0.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for Gauge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Gauge").field(&self.get()).finish()
    }
}

/// Request kinds counted separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    GetId,
    SendTo,
    SendAll,
    GetClients,
}

/// Counters for one relay server instance.
#[derive(Debug, Default)]
pub struct RelayMetrics {
    pub sessions_accepted: Counter,
    pub connects: Counter,
    pub disconnects: Counter,
    pub live_connections: Gauge,
    pub get_id_requests: Counter,
    pub send_to_requests: Counter,
    pub send_all_requests: Counter,
    pub get_clients_requests: Counter,
    pub pushes_delivered: Counter,
    pub push_failures: Counter,
    /// SENDTO requests whose target was not connected.
    pub unknown_targets: Counter,
    pub decode_errors: Counter,
}

impl RelayMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self, kind: RequestKind) {
        match kind {
            RequestKind::GetId => self.get_id_requests.inc(),
            RequestKind::SendTo => self.send_to_requests.inc(),
            RequestKind::SendAll => self.send_all_requests.inc(),
            RequestKind::GetClients => self.get_clients_requests.inc(),
        }
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            sessions_accepted: self.sessions_accepted.get(),
            connects: self.connects.get(),
            disconnects: self.disconnects.get(),
            live_connections: self.live_connections.get(),
            requests: RequestCounts {
                get_id: self.get_id_requests.get(),
                send_to: self.send_to_requests.get(),
                send_all: self.send_all_requests.get(),
                get_clients: self.get_clients_requests.get(),
            },
            pushes_delivered: self.pushes_delivered.get(),
            push_failures: self.push_failures.get(),
            unknown_targets: self.unknown_targets.get(),
            decode_errors: self.decode_errors.get(),
        }
    }
}

/// Serializable view of [`RelayMetrics`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub sessions_accepted: u64,
    pub connects: u64,
    pub disconnects: u64,
    pub live_connections: i64,
    pub requests: RequestCounts,
    pub pushes_delivered: u64,
    pub push_failures: u64,
    pub unknown_targets: u64,
    pub decode_errors: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestCounts {
    pub get_id: u64,
    pub send_to: u64,
    pub send_all: u64,
    pub get_clients: u64,
}
