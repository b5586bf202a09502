use {
  crate::wire::{AddressablePeer, PeerId},
  std::time::Duration,
};

/// Private per-peer record held by the transport for every known
/// remote peer on the segment.
#[derive(Debug, Clone)]
pub struct PeerEntry {
  /// Identity and known locators of the remote peer.
  pub peer: AddressablePeer,

  /// Maximum silent interval the peer advertised in its JOIN.
  /// Immutable after admission.
  pub lease: Duration,

  /// Remaining time in the current lease window, in milliseconds.
  /// Mutated only under the transport's peer mutex.
  pub(crate) next_lease: i64,

  /// Set by the receive path on any valid frame from this peer,
  /// cleared by the lease task when it renews the window.
  pub(crate) received: bool,

  /// Sequence number bookkeeping owned by the receive path.
  pub next_sn: u32,
}

impl PeerEntry {
  /// A freshly admitted peer starts with a full lease window. The
  /// frame that triggered admission does not count toward that
  /// window; the peer has to be heard from again before the window
  /// runs out.
  pub fn new(peer: AddressablePeer, lease: Duration, next_sn: u32) -> Self {
    Self {
      peer,
      next_lease: lease.as_millis() as i64,
      lease,
      received: false,
      next_sn,
    }
  }

  pub fn id(&self) -> &PeerId {
    &self.peer.peer_id
  }

  fn lease_millis(&self) -> i64 {
    self.lease.as_millis() as i64
  }
}

/// Insertion-ordered collection of peer entries with unique
/// identities.
///
/// A pure container: concurrent access is serialized by the peer
/// mutex of the owning transport, never in here.
#[derive(Debug, Default)]
pub struct PeerTable {
  entries: Vec<PeerEntry>,
}

impl PeerTable {
  /// The caller guarantees identity uniqueness.
  pub fn insert(&mut self, entry: PeerEntry) {
    self.entries.push(entry);
  }

  pub fn get(&self, id: &PeerId) -> Option<&PeerEntry> {
    self.entries.iter().find(|entry| entry.id() == id)
  }

  pub fn get_mut(&mut self, id: &PeerId) -> Option<&mut PeerEntry> {
    self.entries.iter_mut().find(|entry| entry.id() == id)
  }

  pub fn iter(&self) -> impl Iterator<Item = &PeerEntry> {
    self.entries.iter()
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Removes every entry matched by the predicate and returns how
  /// many were dropped. Non-matching entries keep their relative
  /// order.
  pub fn remove_where<F>(&mut self, mut pred: F) -> usize
  where
    F: FnMut(&PeerEntry) -> bool,
  {
    let before = self.entries.len();
    self.entries.retain(|entry| !pred(entry));
    before - self.entries.len()
  }

  /// The smallest lease any known peer advertised, or the local
  /// lease when no peer is known. Keep-alive cadence is derived
  /// from this value, so an empty table still announces liveness
  /// at a meaningful rate for observers that may admit this peer
  /// later.
  pub(crate) fn minimum_lease(&self, local_lease: Duration) -> i64 {
    self
      .entries
      .iter()
      .map(PeerEntry::lease_millis)
      .min()
      .unwrap_or_else(|| local_lease.as_millis() as i64)
  }

  /// The smallest remaining lease window across peers, or the
  /// representable maximum when no peer is known (no peer will
  /// expire soon).
  pub(crate) fn next_lease(&self) -> i64 {
    self
      .entries
      .iter()
      .map(|entry| entry.next_lease)
      .min()
      .unwrap_or(i64::MAX)
  }

  /// Shrinks every entry's remaining window by the time slept.
  pub(crate) fn elapse(&mut self, interval: i64) {
    for entry in &mut self.entries {
      entry.next_lease -= interval;
    }
  }

  /// One expiry pass: entries heard from since the previous sweep
  /// get a fresh window and a cleared flag, silent entries are
  /// unlinked and returned. Victims are collected in a single
  /// traversal, so every surviving entry is visited exactly once.
  pub(crate) fn sweep(&mut self) -> Vec<PeerEntry> {
    let mut expired = Vec::new();
    let mut kept = Vec::with_capacity(self.entries.len());

    for mut entry in self.entries.drain(..) {
      if entry.received {
        entry.received = false;
        entry.next_lease = entry.lease_millis();
        kept.push(entry);
      } else {
        expired.push(entry);
      }
    }

    self.entries = kept;
    expired
  }
}
