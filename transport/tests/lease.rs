//! Liveness scenarios driven under virtual time: every sleep inside
//! the lease task resolves against tokio's paused clock, so the
//! millisecond arithmetic below is exact rather than approximate.

use {
  ethercast_transport::{
    wire::{AddressablePeer, Body, Message, PeerId},
    Config,
    Error,
    LeaseTask,
    Link,
    Multicast,
  },
  std::{
    io,
    sync::{
      atomic::{AtomicUsize, Ordering},
      Arc,
      Mutex,
    },
    time::Duration,
  },
  tokio::time::sleep,
};

/// Captures every message the transport pushes onto the segment.
#[derive(Default)]
struct RecordingLink {
  sent: Mutex<Vec<Message>>,
}

impl RecordingLink {
  fn count(&self, pred: fn(&Message) -> bool) -> usize {
    self.sent.lock().unwrap().iter().filter(|m| pred(m)).count()
  }

  fn joins(&self) -> usize {
    self.count(Message::is_join)
  }

  fn keep_alives(&self) -> usize {
    self.count(Message::is_keep_alive)
  }

  fn frames(&self) -> usize {
    self.count(|m| matches!(m.body, Body::Frame(_)))
  }
}

impl Link for RecordingLink {
  fn send(&self, msg: &Message) -> io::Result<()> {
    self.sent.lock().unwrap().push(msg.clone());
    Ok(())
  }
}

/// A segment that swallows nothing and fails every send.
#[derive(Default)]
struct DeadLink {
  attempts: AtomicUsize,
}

impl Link for DeadLink {
  fn send(&self, _: &Message) -> io::Result<()> {
    self.attempts.fetch_add(1, Ordering::SeqCst);
    Err(io::Error::new(io::ErrorKind::Other, "medium unreachable"))
  }
}

fn local_peer() -> AddressablePeer {
  AddressablePeer {
    peer_id: PeerId::random(),
    locators: ["reth/en0".to_string()].into_iter().collect(),
  }
}

fn config(lease_ms: u64, join_ms: u64) -> Config {
  Config {
    lease: Duration::from_millis(lease_ms),
    join_interval: Duration::from_millis(join_ms),
    lease_expire_factor: 4,
  }
}

fn remote(id: &[u8]) -> AddressablePeer {
  AddressablePeer::from(PeerId::from(id))
}

#[tokio::test(start_paused = true)]
async fn quiet_segment_announces_liveness() -> anyhow::Result<()> {
  let link = Arc::new(RecordingLink::default());
  let transport = Arc::new(Multicast::new(
    config(4000, 2500),
    local_peer(),
    link.clone(),
  ));

  let task = LeaseTask::start(&transport)?;
  sleep(Duration::from_millis(12_050)).await;

  // joins every 2500ms, keep-alives every 1000ms except when a
  // join already proved liveness within the window
  assert!(link.joins() >= 4, "got {} joins", link.joins());
  assert!(link.keep_alives() >= 4, "got {} keep-alives", link.keep_alives());
  assert_eq!(transport.peer_count(), 0);

  transport.stop_lease_task()?;
  task.await?;
  Ok(())
}

#[tokio::test(start_paused = true)]
async fn silent_peer_expires_after_its_lease() -> anyhow::Result<()> {
  let link = Arc::new(RecordingLink::default());
  let transport = Arc::new(Multicast::new(
    config(10_000, 2500),
    local_peer(),
    link.clone(),
  ));

  transport.admit(remote(b"peer-1"), Duration::from_millis(4000), 0);
  let task = LeaseTask::start(&transport)?;

  sleep(Duration::from_millis(3900)).await;
  assert_eq!(transport.peer_count(), 1);

  sleep(Duration::from_millis(200)).await;
  assert_eq!(transport.peer_count(), 0);

  transport.stop_lease_task()?;
  task.await?;
  Ok(())
}

#[tokio::test(start_paused = true)]
async fn heard_peer_gets_renewed_then_expires() -> anyhow::Result<()> {
  let link = Arc::new(RecordingLink::default());
  let transport = Arc::new(Multicast::new(
    config(10_000, 2500),
    local_peer(),
    link.clone(),
  ));

  let peer = remote(b"peer-1");
  transport.admit(peer.clone(), Duration::from_millis(4000), 0);
  let task = LeaseTask::start(&transport)?;

  sleep(Duration::from_millis(3100)).await;
  assert!(transport.mark_received(&peer.peer_id));

  // the sweep at ~4000ms observes the flag and renews the window
  sleep(Duration::from_millis(1400)).await;
  assert_eq!(transport.peer_count(), 1);

  // nothing further heard: gone one full window later
  sleep(Duration::from_millis(3700)).await;
  assert_eq!(transport.peer_count(), 0);
  assert!(!transport.mark_received(&peer.peer_id));

  transport.stop_lease_task()?;
  task.await?;
  Ok(())
}

#[tokio::test(start_paused = true)]
async fn outbound_traffic_suppresses_keep_alive() -> anyhow::Result<()> {
  let link = Arc::new(RecordingLink::default());
  let transport = Arc::new(Multicast::new(
    config(10_000, 60_000),
    local_peer(),
    link.clone(),
  ));

  let task = LeaseTask::start(&transport)?;

  sleep(Duration::from_millis(2400)).await;
  transport.send_t_msg(&Message::frame(7, b"payload".as_slice().into()))?;

  // the 2500ms tick sees recent traffic and sends nothing
  sleep(Duration::from_millis(200)).await;
  assert_eq!(link.frames(), 1);
  assert_eq!(link.keep_alives(), 0);

  // the transport stayed quiet for the next whole window
  sleep(Duration::from_millis(2500)).await;
  assert_eq!(link.keep_alives(), 1);

  transport.stop_lease_task()?;
  task.await?;
  Ok(())
}

#[tokio::test(start_paused = true)]
async fn keep_alive_cadence_tightens_on_admission() -> anyhow::Result<()> {
  let link = Arc::new(RecordingLink::default());
  let transport = Arc::new(Multicast::new(
    config(10_000, 60_000),
    local_peer(),
    link.clone(),
  ));

  let peer = remote(b"peer-1");
  let task = LeaseTask::start(&transport)?;

  // empty table: cadence is the local lease over the expire factor
  sleep(Duration::from_millis(2600)).await;
  assert_eq!(link.keep_alives(), 1);

  transport.admit(peer.clone(), Duration::from_millis(4000), 0);
  sleep(Duration::from_millis(3000)).await;
  assert!(transport.mark_received(&peer.peer_id));

  // after the next tick the 4000ms lease governs: one keep-alive
  // every 1000ms instead of every 2500ms
  sleep(Duration::from_millis(3500)).await;
  assert!(
    link.keep_alives() >= 5,
    "got {} keep-alives",
    link.keep_alives()
  );
  assert_eq!(transport.peer_count(), 1);

  transport.stop_lease_task()?;
  task.await?;
  Ok(())
}

#[tokio::test(start_paused = true)]
async fn stop_is_observed_at_the_next_wake() -> anyhow::Result<()> {
  let link = Arc::new(RecordingLink::default());
  let transport = Arc::new(Multicast::new(
    Config::default(),
    local_peer(),
    link.clone(),
  ));

  let task = LeaseTask::start(&transport)?;

  sleep(Duration::from_millis(100)).await;
  transport.stop_lease_task()?;
  transport.stop_lease_task()?; // twice is one

  // the task is mid-sleep until 2500ms; it must exit right there
  tokio::time::timeout(Duration::from_millis(3000), task)
    .await
    .expect("lease task outlived its sleep interval")?;
  Ok(())
}

#[tokio::test(start_paused = true)]
async fn stopped_transport_can_be_started_again() -> anyhow::Result<()> {
  let link = Arc::new(RecordingLink::default());
  let transport = Arc::new(Multicast::new(
    Config::default(),
    local_peer(),
    link.clone(),
  ));

  let task = LeaseTask::start(&transport)?;
  sleep(Duration::from_millis(2600)).await;
  assert_eq!(link.joins(), 1);

  transport.stop_lease_task()?;
  task.await?;

  let task = LeaseTask::start(&transport)?;
  sleep(Duration::from_millis(2600)).await;
  assert_eq!(link.joins(), 2);

  transport.stop_lease_task()?;
  task.await?;
  Ok(())
}

#[tokio::test(start_paused = true)]
async fn send_failures_do_not_kill_the_task() -> anyhow::Result<()> {
  let link = Arc::new(DeadLink::default());
  let transport = Arc::new(Multicast::new(
    config(10_000, 2500),
    local_peer(),
    link.clone(),
  ));

  let task = LeaseTask::start(&transport)?;
  sleep(Duration::from_millis(6100)).await;

  assert!(
    link.attempts.load(Ordering::SeqCst) >= 2,
    "got {} attempts",
    link.attempts.load(Ordering::SeqCst)
  );

  // still alive and responsive to stop
  transport.stop_lease_task()?;
  tokio::time::timeout(Duration::from_millis(3000), task)
    .await
    .expect("lease task died instead of retrying")?;
  Ok(())
}

#[test]
fn start_without_a_runtime_fails() -> anyhow::Result<()> {
  let link = Arc::new(RecordingLink::default());
  let transport = Arc::new(Multicast::new(
    Config::default(),
    local_peer(),
    link,
  ));

  let err = LeaseTask::start(&transport).unwrap_err();
  assert!(matches!(err, Error::Task(_)));

  // the failed start left no task behind; stop stays a no-op
  transport.stop_lease_task()?;
  Ok(())
}
