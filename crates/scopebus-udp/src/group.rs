//! Multicast group addressing shared by senders and receivers

use scopebus_core::{Error, Result};
use std::fmt;
use std::net::Ipv4Addr;
use std::time::Duration;

/// Where a channel's datagrams go. Each channel owns its copy, so tests can
/// isolate themselves with a different group or interface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MulticastGroup {
    pub addr: Ipv4Addr,
    /// Multicast TTL. 1 keeps traffic on the local host/link.
    pub ttl: u32,
    /// Interface used to join and send. `UNSPECIFIED` lets the OS choose.
    pub interface: Ipv4Addr,
}

impl MulticastGroup {
    pub const DEFAULT_ADDR: Ipv4Addr = Ipv4Addr::new(239, 255, 42, 99);
    pub const DEFAULT_TTL: u32 = 1;
    /// Default topic for captions/prompts.
    pub const DEFAULT_PORT: u16 = 9400;
    /// Default secondary topic.
    pub const SECONDARY_PORT: u16 = 9500;
    /// How long a new port must stay requested before a channel switches.
    pub const REBIND_DELAY: Duration = Duration::from_secs(3);
    pub const MIN_PORT: u32 = 1024;
    pub const MAX_DATAGRAM: usize = 65535;

    pub fn new(addr: Ipv4Addr) -> Self {
        Self {
            addr,
            ..Self::default()
        }
    }

    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_interface(mut self, interface: Ipv4Addr) -> Self {
        self.interface = interface;
        self
    }

    /// Check that `port` is a usable topic port.
    pub fn check_port(port: u32) -> Result<u16> {
        if port < Self::MIN_PORT {
            return Err(Error::InvalidPort(port));
        }
        u16::try_from(port).map_err(|_| Error::InvalidPort(port))
    }
}

impl Default for MulticastGroup {
    fn default() -> Self {
        Self {
            addr: Self::DEFAULT_ADDR,
            ttl: Self::DEFAULT_TTL,
            interface: Ipv4Addr::UNSPECIFIED,
        }
    }
}

impl fmt::Display for MulticastGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.addr)
    }
}
