//! Inbound-frame demultiplexer: one RX task owns the socket, sessions
//! register waiters keyed by `(expected_msg_type, trid)` and drain them on
//! their own schedule.
//!
//! Replaces the module-level "last received frame" globals a naive port
//! would reach for with a value the caller constructs and passes around
//! (the `Demultiplexer`), matching the teacher's preference for owned
//! state over statics (c.f. `hr-registry::state::RegistryState`, which is
//! built once in `main` and handed out as an `Arc`, never a `static`).

use std::collections::HashMap;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::{mpsc, Mutex};

use hr_pd_codec::header_of;

/// A frame received on the shared socket, tagged with its sender.
#[derive(Debug, Clone)]
pub struct InboundFrame {
    pub data: Vec<u8>,
    pub from: std::net::SocketAddr,
}

/// Waiter key: the message type a waiter expects, paired with the
/// transaction id it was registered for — matching spec §3's `Transaction`
/// (`expected_msg_type`) and §4.3's waiter contract verbatim.
type WaiterKey = (u8, [u8; 3]);

type WaiterTable = Arc<Mutex<HashMap<WaiterKey, mpsc::Sender<InboundFrame>>>>;

/// Owns the shared receive half of the client socket and a table of
/// per-transaction waiters. Constructed once per agent process.
#[derive(Clone)]
pub struct Demultiplexer {
    waiters: WaiterTable,
}

impl Demultiplexer {
    /// Spawns the single RX task reading `socket` for the lifetime of the
    /// returned `Demultiplexer`'s last clone being dropped is not itself
    /// what stops the task — callers stop it by dropping the socket or
    /// the process exiting, matching the teacher's one-reader-task-per-
    /// process model (`hr-agent::connection::run_connection`).
    pub fn spawn(socket: Arc<UdpSocket>) -> Self {
        let waiters: WaiterTable = Arc::new(Mutex::new(HashMap::new()));
        let rx_waiters = waiters.clone();

        tokio::spawn(async move {
            let mut buf = vec![0u8; 1500];
            loop {
                let (len, from) = match socket.recv_from(&mut buf).await {
                    Ok(pair) => pair,
                    Err(err) => {
                        tracing::warn!(error = %err, "dhcpv6 recv failed");
                        continue;
                    }
                };

                let (msg_type, trid) = match header_of(&buf[..len]) {
                    Ok(header) => header,
                    Err(_) => continue,
                };
                let key = (msg_type, trid);
                let frame = InboundFrame {
                    data: buf[..len].to_vec(),
                    from,
                };

                let mut table = rx_waiters.lock().await;
                if let Some(sender) = table.get(&key) {
                    // A closed receiver means the session already gave up
                    // waiting on this transaction id; prune it rather than
                    // letting the table grow unbounded.
                    if sender.send(frame).await.is_err() {
                        table.remove(&key);
                    }
                } else {
                    tracing::debug!(msg_type, trid = ?trid, "dropping frame for unregistered transaction");
                }
            }
        });

        Demultiplexer { waiters }
    }

    /// Registers interest in frames of `expected_msg_type` carrying `trid`,
    /// returning the receive half of a channel the caller drains until its
    /// collection window elapses. Re-registering the same key replaces the
    /// prior waiter.
    pub async fn register(&self, expected_msg_type: u8, trid: [u8; 3]) -> mpsc::Receiver<InboundFrame> {
        let (tx, rx) = mpsc::channel(16);
        self.waiters.lock().await.insert((expected_msg_type, trid), tx);
        rx
    }

    /// Drops interest in `(expected_msg_type, trid)`. Sessions call this
    /// once they have bound or abandoned a transaction, so a late
    /// duplicate reply is dropped by the RX task instead of queued forever.
    pub async fn unregister(&self, expected_msg_type: u8, trid: &[u8; 3]) {
        self.waiters.lock().await.remove(&(expected_msg_type, *trid));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_then_unregister_drops_interest() {
        let waiters: WaiterTable = Arc::new(Mutex::new(HashMap::new()));
        let demux = Demultiplexer { waiters };
        let trid = [1, 2, 3];

        let _rx = demux.register(2, trid).await;
        assert!(demux.waiters.lock().await.contains_key(&(2, trid)));

        demux.unregister(2, &trid).await;
        assert!(!demux.waiters.lock().await.contains_key(&(2, trid)));
    }

    #[tokio::test]
    async fn re_registering_replaces_the_waiter() {
        let waiters: WaiterTable = Arc::new(Mutex::new(HashMap::new()));
        let demux = Demultiplexer { waiters };
        let trid = [7, 7, 7];

        let rx1 = demux.register(7, trid).await;
        let _rx2 = demux.register(7, trid).await;
        drop(rx1);

        // The table should hold exactly one sender, the second registration's.
        assert_eq!(demux.waiters.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn distinct_msg_types_do_not_collide_on_the_same_trid() {
        let waiters: WaiterTable = Arc::new(Mutex::new(HashMap::new()));
        let demux = Demultiplexer { waiters };
        let trid = [9, 9, 9];

        let _advertise_rx = demux.register(2, trid).await;
        let _reply_rx = demux.register(7, trid).await;
        assert_eq!(demux.waiters.lock().await.len(), 2);
    }
}
