//! Scopebus UDP - multicast pub/sub channels with debounced port switching
//!
//! The port selects the topic. Every sender and receiver on the same
//! group and port reaches every other; there is no subscriber bookkeeping.

pub mod group;
pub mod receiver;
pub mod sender;

pub use group::MulticastGroup;
pub use receiver::UdpReceiver;
pub use sender::{Outbox, UdpSender};
