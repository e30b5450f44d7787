//! Multicast receiver
//!
//! `poll` drains everything queued on the socket and keeps only the newest
//! datagram: consumers want current state, not a backlog. Any number of
//! receivers can share a port, and each one sees every message.

use crate::group::MulticastGroup;
use scopebus_core::{DebounceGate, Error, Message, Result};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Floor on how often an unbound receiver retries, whatever the settle window.
const MIN_RETRY: Duration = Duration::from_secs(1);

pub struct UdpReceiver {
    socket: Option<UdpSocket>,
    group: MulticastGroup,
    port: DebounceGate<u16>,
    last_bind_attempt: Instant,
    closed: bool,
    buf: Vec<u8>,
}

impl UdpReceiver {
    pub fn new(port: u16) -> Result<Self> {
        Self::with_group(port, MulticastGroup::default())
    }

    /// Bind to `port` and join `group`. A bind failure is returned so the
    /// caller can decide whether to run without a receiver.
    pub fn with_group(port: u16, group: MulticastGroup) -> Result<Self> {
        let port = MulticastGroup::check_port(u32::from(port))?;
        let socket = bind(&group, port)?;
        Ok(Self {
            socket: Some(socket),
            group,
            port: DebounceGate::new(port, MulticastGroup::REBIND_DELAY),
            last_bind_attempt: Instant::now(),
            closed: false,
            buf: vec![0u8; MulticastGroup::MAX_DATAGRAM],
        })
    }

    /// Override how long a port change must be requested before rebinding.
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

    pub fn is_bound(&self) -> bool {
        self.socket.is_some()
    }

    /// Drain queued datagrams and return the newest, decoded.
    ///
    /// Returns `None` when nothing arrived since the last poll, or while the
    /// receiver has no socket.
    pub fn poll(&mut self) -> Option<Message> {
        let socket = self.socket.as_ref()?;
        let mut latest_len = None;
        loop {
            match socket.recv_from(&mut self.buf) {
                Ok((len, _)) => latest_len = Some(len),
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(port = self.port(), error = %e, "UDP receive failed");
                    break;
                }
            }
        }
        latest_len.map(|len| Message::decode(&self.buf[..len]))
    }

    pub fn update_port(&mut self, candidate: u32) {
        self.update_port_at(candidate, Instant::now());
    }

    /// Feed a requested port observed at `now`. On commit the old binding is
    /// released and the receiver rejoins the group on the new port before the
    /// next poll. A receiver left without a socket retries once per settle
    /// window, and never more than once a second.
    pub fn update_port_at(&mut self, candidate: u32, now: Instant) {
        if self.closed {
            return;
        }
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
            info!(from = before, to = after, "receiver port changed, rejoining");
            self.rebind(now);
        } else if self.socket.is_none()
            && now.saturating_duration_since(self.last_bind_attempt)
                >= self.port.settle().max(MIN_RETRY)
        {
            self.rebind(now);
        }
    }

    fn rebind(&mut self, now: Instant) {
        // release the old binding before taking the new one
        self.socket = None;
        self.last_bind_attempt = now;
        match bind(&self.group, self.port()) {
            Ok(socket) => self.socket = Some(socket),
            Err(e) => error!(port = self.port(), error = %e, "UDP rebind failed"),
        }
    }

    /// Leave the group and release the socket. The receiver stays inert.
    pub fn close(&mut self) {
        self.closed = true;
        if self.socket.take().is_some() {
            info!(port = self.port(), "receiver closed");
        }
    }
}

fn bind(group: &MulticastGroup, port: u16) -> Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .map_err(|e| Error::transport("socket", e))?;
    socket
        .set_reuse_address(true)
        .map_err(|e| Error::transport("set_reuse_address", e))?;
    #[cfg(all(unix, not(any(target_os = "solaris", target_os = "illumos"))))]
    socket
        .set_reuse_port(true)
        .map_err(|e| Error::transport("set_reuse_port", e))?;
    socket
        .bind(&SockAddr::from(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port)))
        .map_err(|e| Error::transport("bind", e))?;
    socket
        .join_multicast_v4(&group.addr, &group.interface)
        .map_err(|e| Error::transport("join_multicast", e))?;
    socket
        .set_nonblocking(true)
        .map_err(|e| Error::transport("set_nonblocking", e))?;
    info!(group = %group, port, "receiver joined");
    Ok(socket.into())
}
