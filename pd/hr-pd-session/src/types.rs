use std::net::Ipv6Addr;
use std::sync::{Arc, Mutex};

use hr_pd_codec::Lease;

/// Lifecycle states a subnet session moves through, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    New,
    Soliciting,
    Requesting,
    Bound,
    Renewing,
    Releasing,
    Terminated,
}

/// Identity and unicast address of the server chosen during SOLICITING.
#[derive(Debug, Clone)]
pub struct ServerRecord {
    pub server_duid: Vec<u8>,
    pub address: Ipv6Addr,
}

/// Shared, atomically-swapped view of a session's current state and lease,
/// read by `get` concurrently with the session task's own progress.
/// Matches the teacher's `watch`-style "publish the latest snapshot"
/// pattern (`hr-ipv6::pd_client::PrefixSender`) but as a plain mutex since
/// C5 wants point-in-time reads, not change notification.
#[derive(Debug, Clone)]
pub struct SharedStatus {
    inner: Arc<Mutex<StatusInner>>,
}

#[derive(Debug, Clone)]
struct StatusInner {
    state: SessionState,
    lease: Lease,
}

impl SharedStatus {
    pub fn new() -> Self {
        SharedStatus {
            inner: Arc::new(Mutex::new(StatusInner {
                state: SessionState::New,
                lease: Lease::NONE,
            })),
        }
    }

    pub fn set_state(&self, state: SessionState) {
        self.inner.lock().unwrap().state = state;
    }

    pub fn set_lease(&self, lease: Lease) {
        self.inner.lock().unwrap().lease = lease;
    }

    /// Point-in-time `(state, lease)` snapshot for the control RPC's `get`.
    pub fn snapshot(&self) -> (SessionState, Lease) {
        let guard = self.inner.lock().unwrap();
        (guard.state, guard.lease)
    }
}

impl Default for SharedStatus {
    fn default() -> Self {
        Self::new()
    }
}
