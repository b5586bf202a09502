mod config;
mod lease;
mod link;
mod peers;
mod transport;

pub mod wire;

pub use {
  bytes::Bytes,
  config::Config,
  lease::LeaseTask,
  link::Link,
  peers::{PeerEntry, PeerTable},
  transport::{Error, Multicast},
};
