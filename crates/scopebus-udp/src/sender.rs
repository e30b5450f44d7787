//! Multicast sender
//!
//! Sends are best effort: a failed datagram is logged and dropped, never
//! surfaced to the frame loop. Port changes go through a `DebounceGate` and
//! take effect for subsequent sends once committed.

use crate::group::MulticastGroup;
use scopebus_core::{DebounceGate, Error, Message, Result};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Handle for queueing messages onto a sender from another thread.
///
/// Background tasks post here instead of touching the sender's socket; the
/// owner drains the queue with [`UdpSender::flush_outbox`].
#[derive(Clone, Debug)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<Message>,
}

impl Outbox {
    /// Queue `message`. Returns false, after logging, if the sender is gone.
    pub fn post(&self, message: impl Into<Message>) -> bool {
        match self.tx.send(message.into()) {
            Ok(()) => true,
            Err(_) => {
                debug!("sender closed, dropping queued message");
                false
            }
        }
    }
}

pub struct UdpSender {
    socket: Option<UdpSocket>,
    group: MulticastGroup,
    port: DebounceGate<u16>,
    outbox_tx: mpsc::UnboundedSender<Message>,
    outbox_rx: mpsc::UnboundedReceiver<Message>,
}

impl UdpSender {
    pub fn new(port: u16) -> Result<Self> {
        Self::with_group(port, MulticastGroup::default())
    }

    pub fn with_group(port: u16, group: MulticastGroup) -> Result<Self> {
        let port = MulticastGroup::check_port(u32::from(port))?;
        let socket = open_socket(&group)?;
        let (outbox_tx, outbox_rx) = mpsc::unbounded_channel();
        info!(group = %group, port, "sender ready");
        Ok(Self {
            socket: Some(socket),
            group,
            port: DebounceGate::new(port, MulticastGroup::REBIND_DELAY),
            outbox_tx,
            outbox_rx,
        })
    }

    /// Override how long a port change must be requested before it applies.
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.port = DebounceGate::new(*self.port.committed(), settle);
        self
    }

    pub fn port(&self) -> u16 {
        *self.port.committed()
    }

    pub fn pending_port(&self) -> Option<u16> {
        self.port.pending().copied()
    }

    pub fn group(&self) -> &MulticastGroup {
        &self.group
    }

    pub fn is_closed(&self) -> bool {
        self.socket.is_none()
    }

    /// Send `message` to the group on the current port.
    ///
    /// Returns whether the datagram was handed to the OS. Failures are logged.
    pub fn send(&self, message: impl Into<Message>) -> bool {
        let message = message.into();
        let Some(socket) = &self.socket else {
            debug!("send on closed sender ignored");
            return false;
        };
        let payload = message.encode();
        let dest = SocketAddrV4::new(self.group.addr, self.port());
        match socket.send_to(&payload, dest) {
            Ok(_) => {
                debug!(port = dest.port(), bytes = payload.len(), "sent");
                true
            }
            Err(e) => {
                warn!(port = dest.port(), error = %e, "UDP send failed");
                false
            }
        }
    }

    pub fn update_port(&mut self, candidate: u32) {
        self.update_port_at(candidate, Instant::now());
    }

    /// Feed a requested port observed at `now`. The sender holds no binding,
    /// so a committed change only redirects subsequent sends.
    pub fn update_port_at(&mut self, candidate: u32, now: Instant) {
        let candidate = match MulticastGroup::check_port(candidate) {
            Ok(port) => port,
            Err(e) => {
                debug!(error = %e, "ignoring port request");
                return;
            }
        };
        let before = self.port();
        let after = *self.port.propose(candidate, now);
        if after != before {
            info!(from = before, to = after, "sender port changed");
        }
    }

    pub fn outbox(&self) -> Outbox {
        Outbox {
            tx: self.outbox_tx.clone(),
        }
    }

    /// Send everything queued through the outbox. Returns how many were sent.
    pub fn flush_outbox(&mut self) -> usize {
        let mut sent = 0;
        while let Ok(message) = self.outbox_rx.try_recv() {
            if self.send(message) {
                sent += 1;
            }
        }
        sent
    }

    /// Release the socket. Later sends and outbox posts become logged no-ops.
    pub fn close(&mut self) {
        if self.socket.take().is_some() {
            info!(port = self.port(), "sender closed");
        }
        self.outbox_rx.close();
    }
}

fn open_socket(group: &MulticastGroup) -> Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .map_err(|e| Error::transport("socket", e))?;
    socket
        .set_multicast_ttl_v4(group.ttl)
        .map_err(|e| Error::transport("set_multicast_ttl", e))?;
    socket
        .set_multicast_loop_v4(true)
        .map_err(|e| Error::transport("set_multicast_loop", e))?;
    if !group.interface.is_unspecified() {
        socket
            .set_multicast_if_v4(&group.interface)
            .map_err(|e| Error::transport("set_multicast_if", e))?;
    }
    socket
        .bind(&SockAddr::from(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0)))
        .map_err(|e| Error::transport("bind", e))?;
    socket
        .set_nonblocking(true)
        .map_err(|e| Error::transport("set_nonblocking", e))?;
    Ok(socket.into())
}
