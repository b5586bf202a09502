use {
  crate::{
    link::Link,
    peers::{PeerEntry, PeerTable},
    wire::{AddressablePeer, Message, PeerId},
    Config,
  },
  metrics::{gauge, increment_counter},
  parking_lot::Mutex,
  std::{
    sync::{atomic::AtomicBool, Arc},
    time::Duration,
  },
  thiserror::Error,
  tracing::info,
};

#[derive(Debug, Error)]
pub enum Error {
  /// Transient failure of the underlying link. The lease task logs
  /// these and keeps going; only the standalone send entry points
  /// surface them.
  #[error("IO Error: {0}")]
  Io(#[from] std::io::Error),

  /// The host cannot spawn the lease task.
  #[error("failed to spawn the lease task: {0}")]
  Task(#[from] tokio::runtime::TryCurrentError),

  /// The raw-Ethernet transport backend is compiled out of this
  /// build.
  #[error("raw ethernet transport is not available in this build")]
  TransportUnavailable,
}

/// Everything guarded by the peer mutex. The receive path, the
/// session layer and the lease task serialize on it; it is never
/// held across a suspension point.
pub(crate) struct Shared {
  /// All peers currently considered alive on the segment.
  pub peers: PeerTable,

  /// True when any transport message went out since the last
  /// keep-alive tick. Every sender sets it through
  /// [`Multicast::send_t_msg`], so a busy transport never wastes
  /// bandwidth on explicit keep-alives.
  pub transmitted: bool,

  /// Sequence number advertised in locally originated JOINs for
  /// the next data frame.
  pub sn_tx: u32,
}

/// State of one multicast transport session over a shared segment.
///
/// Peers on the segment discover each other through periodic JOIN
/// announcements and observe each other's liveness through leases:
/// each peer advertises the maximum interval it may stay silent,
/// and everyone privately drops peers that overstay it. No global
/// agreement is attempted.
pub struct Multicast {
  pub(crate) config: Config,

  /// Local identity announced in JOIN frames.
  pub(crate) this: AddressablePeer,

  /// The transmit capability of the underlying medium.
  pub(crate) link: Arc<dyn Link>,

  pub(crate) shared: Mutex<Shared>,

  /// Single-writer flag observed by the lease task once per
  /// iteration. Staleness by one iteration is acceptable.
  pub(crate) lease_task_running: AtomicBool,
}

impl Multicast {
  pub fn new(
    config: Config,
    this: AddressablePeer,
    link: Arc<dyn Link>,
  ) -> Self {
    Self {
      config,
      this,
      link,
      shared: Mutex::new(Shared {
        peers: PeerTable::default(),
        transmitted: false,
        sn_tx: rand::random(),
      }),
      lease_task_running: AtomicBool::new(false),
    }
  }

  pub fn local_peer(&self) -> &AddressablePeer {
    &self.this
  }

  /// Sends one transport message over the link. On success the
  /// transmitted flag is raised on behalf of the sender, whoever
  /// it is; the lease task relies on this to decide whether an
  /// explicit keep-alive is still needed.
  pub fn send_t_msg(&self, msg: &Message) -> Result<(), Error> {
    let mut shared = self.shared.lock();
    self.send_locked(&mut shared, msg)
  }

  pub(crate) fn send_locked(
    &self,
    shared: &mut Shared,
    msg: &Message,
  ) -> Result<(), Error> {
    self.link.send(msg)?;
    shared.transmitted = true;
    Ok(())
  }

  /// Announces the local peer to the segment.
  pub fn send_join(&self) -> Result<(), Error> {
    if !cfg!(feature = "raweth") {
      return Err(Error::TransportUnavailable);
    }
    let mut shared = self.shared.lock();
    self.send_join_locked(&mut shared)
  }

  pub(crate) fn send_join_locked(
    &self,
    shared: &mut Shared,
  ) -> Result<(), Error> {
    let msg =
      Message::join(self.this.clone(), self.config.lease, shared.sn_tx);
    self.send_locked(shared, &msg)?;
    increment_counter!("join_sent");
    Ok(())
  }

  /// Refreshes observers' lease timers for the local peer without
  /// carrying any payload. Normally emitted by the lease task; also
  /// usable standalone by alternate schedulers.
  pub fn send_keep_alive(&self) -> Result<(), Error> {
    if !cfg!(feature = "raweth") {
      return Err(Error::TransportUnavailable);
    }
    let mut shared = self.shared.lock();
    self.send_keep_alive_locked(&mut shared)
  }

  pub(crate) fn send_keep_alive_locked(
    &self,
    shared: &mut Shared,
  ) -> Result<(), Error> {
    self.send_locked(shared, &Message::keep_alive())?;
    increment_counter!("keep_alive_sent");
    Ok(())
  }

  /// Invoked by the receive path on a valid JOIN. First contact
  /// admits the peer with a full lease window; a re-announcement
  /// from a known peer only counts as a sign of life.
  pub fn admit(&self, peer: AddressablePeer, lease: Duration, next_sn: u32) {
    let mut shared = self.shared.lock();

    if let Some(entry) = shared.peers.get_mut(&peer.peer_id) {
      entry.received = true;
      return;
    }

    info!(
      "admitting peer {} with a {}ms lease",
      peer.peer_id,
      lease.as_millis()
    );
    shared.peers.insert(PeerEntry::new(peer, lease, next_sn));
    gauge!("known_peers", shared.peers.len() as f64);
  }

  /// Invoked by the receive path on any valid frame from a known
  /// peer. Returns false for peers that are not (or no longer) in
  /// the table; the caller is expected to await their JOIN.
  pub fn mark_received(&self, id: &PeerId) -> bool {
    let mut shared = self.shared.lock();
    match shared.peers.get_mut(id) {
      Some(entry) => {
        entry.received = true;
        true
      }
      None => false,
    }
  }

  pub fn known_peers(&self) -> Vec<PeerId> {
    let shared = self.shared.lock();
    shared.peers.iter().map(|entry| entry.id().clone()).collect()
  }

  pub fn peer_count(&self) -> usize {
    self.shared.lock().peers.len()
  }
}
