//! Linux process connector plumbing
//!
//! This crate subscribes to the kernel's process events multicast group over a
//! `NETLINK_CONNECTOR` socket and decodes the datagrams it receives:
//! - Subscription and teardown of the `CN_IDX_PROC` group
//! - Decoding of fork, exec, exit and comm events
//!
//! Subscribing requires `CAP_NET_ADMIN`.

#[cfg(target_os = "linux")]
mod connector;
mod error;
mod wire;

#[cfg(target_os = "linux")]
pub use connector::ProcConnector;
pub use error::{ConnectorError, DecodeError};
pub use wire::{ProcEvent, decode_datagram};
