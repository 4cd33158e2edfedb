/// Session store module
///
/// Explicit registry of live capture sessions with TTL-based eviction,
/// replacing reliance on the transport's own expiry signal as the only
/// cleanup path. Ids are monotonic, so they double as a generation marker
/// for logs and event correlation.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Identifies one capture lifecycle
pub type SessionId = u64;

/// Default idle lifetime before a session is swept (5 minutes)
pub const DEFAULT_SESSION_TTL_SECS: u64 = 300;

/// TTL session store
///
/// Each registered session records its last-touched time; `sweep_expired`
/// evicts anything idle past the TTL. The lifecycle controller registers
/// its id on start and removes it on stop.
pub struct SessionStore {
    entries: Mutex<HashMap<SessionId, Instant>>,
    next_id: AtomicU64,
    ttl: Duration,
}

impl SessionStore {
    /// Create a store with the given idle TTL
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            ttl,
        }
    }

    /// Allocate a fresh session id and register it
    pub fn allocate(&self) -> SessionId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.entries.lock().insert(id, Instant::now());
        debug!("Session {} registered", id);
        id
    }

    /// Refresh a session's last-touched time
    ///
    /// Returns false if the session is no longer registered.
    pub fn touch(&self, id: SessionId) -> bool {
        match self.entries.lock().get_mut(&id) {
            Some(touched) => {
                *touched = Instant::now();
                true
            }
            None => false,
        }
    }

    /// Remove a session; returns whether it was present
    pub fn remove(&self, id: SessionId) -> bool {
        let removed = self.entries.lock().remove(&id).is_some();
        if removed {
            debug!("Session {} removed", id);
        }
        removed
    }

    /// Whether a session is currently registered
    pub fn contains(&self, id: SessionId) -> bool {
        self.entries.lock().contains_key(&id)
    }

    /// Evict sessions idle past the TTL; returns how many were dropped
    pub fn sweep_expired(&self) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, touched| touched.elapsed() < self.ttl);
        let swept = before - entries.len();

        if swept > 0 {
            info!("Swept {} expired session(s)", swept);
        }
        swept
    }

    /// Number of registered sessions
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether no sessions are registered
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Configured idle TTL
    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}
