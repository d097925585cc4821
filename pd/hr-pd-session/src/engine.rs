//! Per-subnet DHCPv6-PD state machine: one `tokio::spawn`ed task per
//! session, mirroring the teacher's `run_pd_client` loop-over-an-enum
//! shape (`hr-ipv6::pd_client::PdFsmState`) but driven by the
//! [`hr_pd_net::Demultiplexer`] instead of a socket the task owns alone.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use hr_pd_codec::{self as codec, Lease};
use hr_pd_net::{self as net, Demultiplexer, InboundFrame};

use crate::error::SessionError;
use crate::types::{ServerRecord, SessionState, SharedStatus};

const SOLICIT_ATTEMPTS: u32 = 3;
const REQUEST_ATTEMPTS: u32 = 3;
const RELEASE_ROUNDS: u32 = 3;

const PRE_SEND_SLEEP: Duration = Duration::from_secs(1);
const ADVERTISE_WINDOW: Duration = Duration::from_secs(5);
const REPLY_WINDOW: Duration = Duration::from_secs(2);
const RELEASE_WINDOW: Duration = Duration::from_secs(10);

/// Notification invoked exactly once, on the BOUND-from-REQUESTING
/// transition. Bound to the owning subnet by the registry before the
/// session is spawned, so the engine itself never sees an `owner_pid`.
pub type NotifyFn = Arc<dyn Fn() + Send + Sync>;

/// Everything a session task needs that it doesn't own: the shared socket,
/// demultiplexer, and orchestrator-notify hook. Constructed once by the
/// registry per enabled subnet.
pub struct SessionContext {
    pub subnet_id: Vec<u8>,
    pub socket: Arc<UdpSocket>,
    pub demux: Demultiplexer,
    pub notify: NotifyFn,
    pub status: SharedStatus,
}

/// Runs the session to completion: SOLICIT → REQUEST → BOUND ⇄ RENEWING,
/// exiting only on `shutdown` firing (RELEASING → TERMINATED) or on an
/// unrecoverable `SessionError` (also TERMINATED, without a lease).
pub async fn run(ctx: SessionContext, mut shutdown: watch::Receiver<bool>) {
    ctx.status.set_state(SessionState::Soliciting);
    let solicited = tokio::select! {
        result = solicit(&ctx) => result,
        _ = shutdown.changed() => {
            ctx.status.set_state(SessionState::Terminated);
            return;
        }
    };

    let (server, mut ia_prefix_value) = match solicited {
        Ok(pair) => pair,
        Err(err) => {
            warn!(subnet_id = ?ctx.subnet_id, error = %err, "SOLICIT phase failed");
            ctx.status.set_state(SessionState::Terminated);
            return;
        }
    };

    ctx.status.set_state(SessionState::Requesting);
    let requested = tokio::select! {
        result = request(&ctx, &server, &ia_prefix_value) => result,
        _ = shutdown.changed() => {
            ctx.status.set_state(SessionState::Terminated);
            return;
        }
    };

    let mut lease = match requested {
        Ok((lease, blob)) => {
            ia_prefix_value = blob;
            lease
        }
        Err(err) => {
            warn!(subnet_id = ?ctx.subnet_id, error = %err, "REQUEST phase failed");
            ctx.status.set_state(SessionState::Terminated);
            return;
        }
    };

    ctx.status.set_state(SessionState::Bound);
    ctx.status.set_lease(lease);
    (ctx.notify)();
    info!(
        subnet_id = ?ctx.subnet_id,
        lease = %lease,
        server_duid = hex::encode(&server.server_duid),
        "PD lease bound"
    );

    loop {
        let renew_in = Duration::from_secs(lease.preferred_lifetime as u64);
        tokio::select! {
            _ = tokio::time::sleep(renew_in) => {}
            _ = shutdown.changed() => break,
        }

        ctx.status.set_state(SessionState::Renewing);
        match renew(&ctx, &server, &ia_prefix_value).await {
            Ok((new_lease, blob)) => {
                lease = new_lease;
                ia_prefix_value = blob;
                ctx.status.set_state(SessionState::Bound);
                ctx.status.set_lease(lease);
                info!(subnet_id = ?ctx.subnet_id, lease = %lease, "PD lease renewed");
            }
            Err(err) => {
                warn!(subnet_id = ?ctx.subnet_id, error = %err, "RENEW failed, terminating session");
                ctx.status.set_state(SessionState::Terminated);
                return;
            }
        }
    }

    ctx.status.set_state(SessionState::Releasing);
    release(&ctx, &server, &ia_prefix_value).await;
    ctx.status.set_state(SessionState::Terminated);
}

fn random_trid() -> [u8; 3] {
    let mut trid = [0u8; 3];
    rand::rng().fill(&mut trid);
    trid
}

/// Drains `rx` until `window` elapses, collecting every frame delivered in
/// arrival order. This is the batch-not-first-match semantics required so
/// multiple ADVERTISEs can be compared by Preference.
async fn collect_batch(
    rx: &mut tokio::sync::mpsc::Receiver<InboundFrame>,
    window: Duration,
) -> Vec<InboundFrame> {
    let deadline = tokio::time::sleep(window);
    tokio::pin!(deadline);
    let mut batch = Vec::new();
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            frame = rx.recv() => {
                match frame {
                    Some(frame) => batch.push(frame),
                    None => break,
                }
            }
        }
    }
    batch
}

async fn solicit(ctx: &SessionContext) -> Result<(ServerRecord, Vec<u8>), SessionError> {
    for attempt in 1..=SOLICIT_ATTEMPTS {
        let trid = random_trid();
        let mut rx = ctx.demux.register(codec::message::MSG_ADVERTISE, trid).await;
        tokio::time::sleep(PRE_SEND_SLEEP).await;

        let frame = codec::message::encode_solicit(&trid, &ctx.subnet_id);
        debug!(subnet_id = ?ctx.subnet_id, attempt, "sending SOLICIT");
        net::send(&ctx.socket, &frame, net::multicast_dest()).await?;

        let batch = collect_batch(&mut rx, ADVERTISE_WINDOW).await;
        ctx.demux.unregister(codec::message::MSG_ADVERTISE, &trid).await;

        if let Some(result) = select_best_advertise(&batch) {
            return result;
        }
    }
    Err(SessionError::SolicitFailed)
}

/// Picks the ADVERTISE with the greatest Preference option value (7);
/// absent = 0, ties resolve to first-seen, matching arrival order in
/// `batch`.
fn select_best_advertise(
    batch: &[InboundFrame],
) -> Option<Result<(ServerRecord, Vec<u8>), SessionError>> {
    let mut best: Option<(u8, ServerRecord, Vec<u8>)> = None;

    for frame in batch {
        let options = match codec::option::parse_options(&frame.data, 4) {
            Ok(options) => options,
            Err(err) => {
                warn!(from = %frame.from, error = %err, "dropping malformed ADVERTISE");
                continue;
            }
        };
        let preference = codec::preference_of(&options);

        let (server_duid, ia_prefix_value) =
            match codec::extract_server_and_ia_prefix(&frame.data) {
                Ok(pair) => pair,
                Err(err) => {
                    warn!(from = %frame.from, error = %err, "dropping malformed ADVERTISE");
                    continue;
                }
            };

        let address = match frame.from {
            std::net::SocketAddr::V6(addr) => *addr.ip(),
            std::net::SocketAddr::V4(_) => continue,
        };

        let replace = match &best {
            None => true,
            Some((best_pref, _, _)) => preference > *best_pref,
        };
        if replace {
            best = Some((
                preference,
                ServerRecord { server_duid, address },
                ia_prefix_value,
            ));
        }
    }

    best.map(|(_, server, ia_prefix_value)| Ok((server, ia_prefix_value)))
}

async fn request(
    ctx: &SessionContext,
    server: &ServerRecord,
    ia_prefix_value: &[u8],
) -> Result<(Lease, Vec<u8>), SessionError> {
    for attempt in 1..=REQUEST_ATTEMPTS {
        let trid = random_trid();
        let mut rx = ctx.demux.register(codec::message::MSG_REPLY, trid).await;
        tokio::time::sleep(PRE_SEND_SLEEP).await;

        let frame = codec::message::encode_request(
            &trid,
            &ctx.subnet_id,
            &server.server_duid,
            ia_prefix_value,
        );
        debug!(subnet_id = ?ctx.subnet_id, attempt, "sending REQUEST");
        net::send(&ctx.socket, &frame, net::unicast_dest(server.address)).await?;

        let batch = collect_batch(&mut rx, REPLY_WINDOW).await;
        ctx.demux.unregister(codec::message::MSG_REPLY, &trid).await;

        if let Some(frame) = batch.first() {
            return install_lease(&frame.data);
        }
    }
    Err(SessionError::RequestFailed)
}

async fn renew(
    ctx: &SessionContext,
    server: &ServerRecord,
    ia_prefix_value: &[u8],
) -> Result<(Lease, Vec<u8>), SessionError> {
    let trid = random_trid();
    let mut rx = ctx.demux.register(codec::message::MSG_REPLY, trid).await;

    let frame = codec::message::encode_renew(
        &trid,
        &ctx.subnet_id,
        &server.server_duid,
        ia_prefix_value,
    );
    debug!(subnet_id = ?ctx.subnet_id, "sending RENEW");
    net::send(&ctx.socket, &frame, net::unicast_dest(server.address)).await?;

    let batch = collect_batch(&mut rx, REPLY_WINDOW).await;
    ctx.demux.unregister(codec::message::MSG_REPLY, &trid).await;

    match batch.first() {
        Some(frame) => install_lease(&frame.data),
        None => Err(SessionError::RenewFailed),
    }
}

/// RELEASE resends the exact same encoded buffer on every poll round,
/// matching the evident intent of the source's buggy re-send branch (it
/// calls an undefined lowercase `release(...)` rather than rebuilding a
/// fresh message) — preserved, not "fixed".
async fn release(ctx: &SessionContext, server: &ServerRecord, ia_prefix_value: &[u8]) {
    let trid = random_trid();
    let mut rx = ctx.demux.register(codec::message::MSG_REPLY, trid).await;

    let frame = codec::message::encode_release(
        &trid,
        &ctx.subnet_id,
        &server.server_duid,
        ia_prefix_value,
    );

    for round in 1..=RELEASE_ROUNDS {
        debug!(subnet_id = ?ctx.subnet_id, round, "sending RELEASE");
        if let Err(err) = net::send(&ctx.socket, &frame, net::unicast_dest(server.address)).await {
            warn!(subnet_id = ?ctx.subnet_id, error = %err, "RELEASE send failed");
        }

        let batch = collect_batch(&mut rx, RELEASE_WINDOW).await;
        if !batch.is_empty() {
            break;
        }
    }

    ctx.demux.unregister(codec::message::MSG_REPLY, &trid).await;
}

fn install_lease(frame: &[u8]) -> Result<(Lease, Vec<u8>), SessionError> {
    let (_server_duid, ia_prefix_value) = codec::extract_server_and_ia_prefix(frame)?;
    let lease = codec::parse_ia_prefix(&ia_prefix_value)?;
    Ok((lease, ia_prefix_value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{SocketAddr, SocketAddrV6};

    fn advertise_frame(server_id: &[u8], preference: u8, ia_prefix_value: &[u8]) -> Vec<u8> {
        let trid = [1, 2, 3];
        let mut buf = Vec::new();
        buf.push(codec::message::MSG_ADVERTISE);
        buf.extend_from_slice(&trid);
        codec::option::append_option(&mut buf, codec::option::OPT_SERVERID, server_id);
        codec::option::append_option(&mut buf, codec::option::OPT_PREFERENCE, &[preference]);
        let mut ia_pd = Vec::new();
        ia_pd.extend_from_slice(&[0u8; 4]); // IAID
        ia_pd.extend_from_slice(&3600u32.to_be_bytes());
        ia_pd.extend_from_slice(&5400u32.to_be_bytes());
        codec::option::append_option(&mut ia_pd, codec::option::OPT_IAPREFIX, ia_prefix_value);
        codec::option::append_option(&mut buf, codec::option::OPT_IA_PD, &ia_pd);
        buf
    }

    fn from_addr(ip: u16) -> std::net::SocketAddr {
        SocketAddr::V6(SocketAddrV6::new(
            std::net::Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, ip),
            547,
            0,
            0,
        ))
    }

    fn sample_ia_prefix_value() -> Vec<u8> {
        let mut v = Vec::new();
        v.extend_from_slice(&3600u32.to_be_bytes());
        v.extend_from_slice(&7200u32.to_be_bytes());
        v.push(64);
        v.extend_from_slice(&[0x20, 1, 0x0d, 0xb8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        v
    }

    #[test]
    fn picks_highest_preference() {
        let ia = sample_ia_prefix_value();
        let low = InboundFrame {
            data: advertise_frame(b"low", 1, &ia),
            from: from_addr(1),
        };
        let high = InboundFrame {
            data: advertise_frame(b"high", 200, &ia),
            from: from_addr(2),
        };
        let result = select_best_advertise(&[low, high]).unwrap().unwrap();
        assert_eq!(result.0.server_duid, b"high");
    }

    #[test]
    fn ties_resolve_to_first_seen() {
        let ia = sample_ia_prefix_value();
        let first = InboundFrame {
            data: advertise_frame(b"first", 50, &ia),
            from: from_addr(1),
        };
        let second = InboundFrame {
            data: advertise_frame(b"second", 50, &ia),
            from: from_addr(2),
        };
        let result = select_best_advertise(&[first, second]).unwrap().unwrap();
        assert_eq!(result.0.server_duid, b"first");
    }

    #[test]
    fn empty_batch_yields_none() {
        assert!(select_best_advertise(&[]).is_none());
    }

    #[tokio::test]
    async fn collect_batch_gathers_until_window_elapses() {
        let (tx, mut rx) = tokio::sync::mpsc::channel(4);
        tx.send(InboundFrame {
            data: vec![1, 2, 3],
            from: from_addr(1),
        })
        .await
        .unwrap();
        drop(tx);

        let batch = collect_batch(&mut rx, Duration::from_millis(50)).await;
        assert_eq!(batch.len(), 1);
    }
}
