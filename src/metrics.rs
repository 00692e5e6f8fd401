//! Lightweight, lock-free counters for connection and listener statistics.
use std::fmt::{self, Display, Formatter};
use std::sync::atomic::{AtomicUsize, Ordering};

/// An increasing counter.
///
/// All operations correspond to [`Relaxed`](Ordering::Relaxed) atomic operations; the value
/// must not be relied upon for exact correctness under concurrent access.
#[derive(Debug, Default)]
#[repr(transparent)]
pub struct Counter(AtomicUsize);

impl Counter {
    #[inline]
    pub const fn new() -> Self {
        Self(AtomicUsize::new(0))
    }

    #[inline]
    pub fn add(&self, n: usize) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc(&self) {
        self.add(1);
    }

    #[inline]
    pub fn get(&self) -> usize {
        self.0.load(Ordering::Relaxed)
    }
}

impl Display for Counter {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.get().fmt(f)
    }
}

/// Per-connection packet/byte counters, split by control vs. data traffic.
#[derive(Debug, Default)]
pub struct ConnectionMetrics {
    pub ctrl_packets_sent: Counter,
    pub ctrl_packets_recv: Counter,
    pub data_packets_sent: Counter,
    pub data_packets_recv: Counter,
    pub data_packets_lost: Counter,
    pub data_bytes_sent: Counter,
    pub data_bytes_recv: Counter,
}

impl ConnectionMetrics {
    pub const fn new() -> Self {
        Self {
            ctrl_packets_sent: Counter::new(),
            ctrl_packets_recv: Counter::new(),
            data_packets_sent: Counter::new(),
            data_packets_recv: Counter::new(),
            data_packets_lost: Counter::new(),
            data_bytes_sent: Counter::new(),
            data_bytes_recv: Counter::new(),
        }
    }
}

/// Listener-wide counters, mostly useful for the handshake error taxonomy (scenario 2 in the
/// testable properties: a bad-encryption Induction must increment a counter instead of being
/// silently swallowed).
#[derive(Debug, Default)]
pub struct ListenerMetrics {
    pub handshakes_accepted: Counter,
    pub handshakes_rejected: Counter,
    pub bad_encryption: Counter,
    pub bad_cookie: Counter,
    pub bad_handshake: Counter,
    pub malformed_packets: Counter,
    pub unknown_connection: Counter,
    pub accept_overflow: Counter,
}

impl ListenerMetrics {
    pub const fn new() -> Self {
        Self {
            handshakes_accepted: Counter::new(),
            handshakes_rejected: Counter::new(),
            bad_encryption: Counter::new(),
            bad_cookie: Counter::new(),
            bad_handshake: Counter::new(),
            malformed_packets: Counter::new(),
            unknown_connection: Counter::new(),
            accept_overflow: Counter::new(),
        }
    }
}
