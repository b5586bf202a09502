//! Transport-level messages exchanged between peers on a shared
//! multicast segment. The framing and the byte-level codec are owned
//! by the link layer; these types only describe the payloads.

use {
  bytes::Bytes,
  rand::RngCore,
  serde::{Deserialize, Serialize},
  std::{collections::HashSet, fmt, time::Duration},
};

/// Locator string understood by the link layer, such as an interface
/// name or a MAC address in textual form.
pub type Locator = String;

/// Opaque identity of a peer on the segment.
///
/// Identities are equality-comparable byte strings minted by the
/// peer itself and carried in its JOIN announcements.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerId(Bytes);

impl PeerId {
  /// Mints a fresh random identity for the local peer.
  pub fn random() -> Self {
    let mut id = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut id);
    Self(Bytes::copy_from_slice(&id))
  }

  pub fn as_bytes(&self) -> &[u8] {
    &self.0
  }
}

impl From<Bytes> for PeerId {
  fn from(bytes: Bytes) -> Self {
    Self(bytes)
  }
}

impl From<&[u8]> for PeerId {
  fn from(bytes: &[u8]) -> Self {
    Self(Bytes::copy_from_slice(bytes))
  }
}

impl fmt::Display for PeerId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for byte in self.0.iter() {
      write!(f, "{byte:02x}")?;
    }
    Ok(())
  }
}

impl fmt::Debug for PeerId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "PeerId({self})")
  }
}

/// Represents a member of the segment with all known locators that
/// can be used to reach it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddressablePeer {
  pub peer_id: PeerId,

  /// Not every locator is reachable from every point of the
  /// segment, so all of them are advertised.
  pub locators: HashSet<Locator>,
}

impl Eq for AddressablePeer {}
impl PartialEq for AddressablePeer {
  fn eq(&self, other: &Self) -> bool {
    self.peer_id == other.peer_id
  }
}

impl std::hash::Hash for AddressablePeer {
  fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
    self.peer_id.hash(state);
  }
}

impl From<PeerId> for AddressablePeer {
  fn from(peer_id: PeerId) -> Self {
    AddressablePeer {
      peer_id,
      locators: [].into_iter().collect(),
    }
  }
}

/// Announces a peer's identity, advertised lease and locators.
///
/// Sent on admission to the segment and re-sent periodically so that
/// peers which missed the first announcement still discover the
/// sender.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Join {
  /// Identity and locators of the announcing peer.
  pub peer: AddressablePeer,

  /// Maximum interval between two transmissions the announcing
  /// peer commits to. After this much silence observers drop it.
  pub lease: Duration,

  /// Sequence number the announcing peer will use for its next
  /// data frame.
  pub next_sn: u32,
}

/// An empty-payload message whose only purpose is to refresh the
/// lease timers of observers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeepAlive;

/// A data frame originated by the session layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
  pub sn: u32,
  pub payload: Bytes,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Body {
  Join(Join),
  KeepAlive(KeepAlive),
  Frame(Frame),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
  pub body: Body,
}

impl Message {
  pub fn join(peer: AddressablePeer, lease: Duration, next_sn: u32) -> Self {
    Self {
      body: Body::Join(Join {
        peer,
        lease,
        next_sn,
      }),
    }
  }

  pub fn keep_alive() -> Self {
    Self {
      body: Body::KeepAlive(KeepAlive),
    }
  }

  pub fn frame(sn: u32, payload: Bytes) -> Self {
    Self {
      body: Body::Frame(Frame { sn, payload }),
    }
  }

  pub fn is_join(&self) -> bool {
    matches!(self.body, Body::Join(_))
  }

  pub fn is_keep_alive(&self) -> bool {
    matches!(self.body, Body::KeepAlive(_))
  }
}
