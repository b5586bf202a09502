//! The lease task: a long-running cooperative loop that announces
//! the local peer (JOIN), keeps it visibly alive (KEEP_ALIVE) and
//! expires remote peers that overstayed their advertised lease.
//!
//! The task owns three countdown timers. Each iteration it performs
//! whatever action just came due, sleeps until the earliest remaining
//! timer expires, and shrinks the rest by the time slept. The peer
//! mutex is released across the sleep so the receive path can flag
//! incoming frames in the meantime.

use {
  crate::transport::{Error, Multicast},
  futures::FutureExt,
  metrics::{gauge, increment_counter},
  std::{
    future::Future,
    pin::Pin,
    sync::{atomic::Ordering, Arc},
    task::{Context, Poll},
    time::Duration,
  },
  tokio::task::{JoinError, JoinHandle},
  tracing::{debug, info, warn},
};

/// Handle of the background lease task.
///
/// Stored by callers that need to block on task termination:
/// awaiting it joins the task, which exits at its first wake after
/// [`Multicast::stop_lease_task`].
#[derive(Debug)]
pub struct LeaseTask {
  handle: JoinHandle<()>,
}

impl LeaseTask {
  /// Spawns the lease task for a transport on the current runtime.
  ///
  /// Fails when no runtime context exists; in that case the running
  /// flag is rolled back and no handle is retained. Starting a
  /// second task without stopping the first is the caller's
  /// lifecycle bug.
  pub fn start(transport: &Arc<Multicast>) -> Result<Self, Error> {
    if !cfg!(feature = "raweth") {
      return Err(Error::TransportUnavailable);
    }

    transport.lease_task_running.store(true, Ordering::Release);
    let runtime = match tokio::runtime::Handle::try_current() {
      Ok(runtime) => runtime,
      Err(err) => {
        transport.lease_task_running.store(false, Ordering::Release);
        return Err(Error::Task(err));
      }
    };

    Ok(Self {
      handle: runtime.spawn(lease_task(Arc::clone(transport))),
    })
  }
}

impl Future for LeaseTask {
  type Output = Result<(), JoinError>;

  fn poll(
    mut self: Pin<&mut Self>,
    cx: &mut Context<'_>,
  ) -> Poll<Self::Output> {
    self.handle.poll_unpin(cx)
  }
}

impl Multicast {
  /// Signals the lease task to exit and returns immediately; the
  /// task observes the flag at its next wake, so worst-case
  /// shutdown latency equals the current sleep interval. Callers
  /// that need synchronous termination await the [`LeaseTask`]
  /// handle afterwards. Stopping twice is harmless.
  pub fn stop_lease_task(&self) -> Result<(), Error> {
    if !cfg!(feature = "raweth") {
      return Err(Error::TransportUnavailable);
    }

    self.lease_task_running.store(false, Ordering::Release);
    Ok(())
  }
}

/// How long to sleep so that the task wakes exactly when some timer
/// reaches zero. An expired lease timer is excluded: it stays at
/// zero until the post-sleep recomputation, and must not turn the
/// sleep into a busy spin.
fn sleep_interval(
  next_lease: i64,
  next_keep_alive: i64,
  next_join: i64,
) -> i64 {
  if next_lease > 0 {
    next_lease.min(next_keep_alive).min(next_join)
  } else {
    next_keep_alive.min(next_join)
  }
}

async fn lease_task(transport: Arc<Multicast>) {
  let join_interval = transport.config.join_interval.as_millis() as i64;
  let local_lease = transport.config.lease;

  let mut next_lease;
  let mut next_keep_alive;
  let mut next_join = join_interval;
  {
    let mut shared = transport.shared.lock();
    shared.transmitted = false;
    next_lease = shared.peers.minimum_lease(local_lease);
    next_keep_alive = transport.config.keep_alive_interval(next_lease);
  }

  debug!("lease task started");

  loop {
    let interval;
    {
      let mut shared = transport.shared.lock();

      // expire peers that stayed silent for a whole lease window,
      // renew the window of everyone else
      if next_lease <= 0 {
        for expired in shared.peers.sweep() {
          info!(
            "removing peer {}: expired after {}ms of silence",
            expired.id(),
            expired.lease.as_millis()
          );
          increment_counter!("peers_expired");
        }
        gauge!("known_peers", shared.peers.len() as f64);
      }

      if next_join <= 0 {
        if let Err(err) = transport.send_join_locked(&mut shared) {
          warn!("failed to send join: {err}");
        }
        // a join attempt counts as outbound traffic either way
        shared.transmitted = true;
        next_join = join_interval;
      }

      if next_keep_alive <= 0 {
        if !shared.transmitted {
          if let Err(err) = transport.send_keep_alive_locked(&mut shared) {
            warn!("failed to send keep alive: {err}");
          }
        }
        shared.transmitted = false;
        next_keep_alive = transport
          .config
          .keep_alive_interval(shared.peers.minimum_lease(local_lease));
      }

      interval = sleep_interval(next_lease, next_keep_alive, next_join);
    }

    tokio::time::sleep(Duration::from_millis(interval as u64)).await;

    {
      let mut shared = transport.shared.lock();
      shared.peers.elapse(interval);
      next_lease = shared.peers.next_lease();
      next_keep_alive -= interval;
      next_join -= interval;
    }

    if !transport.lease_task_running.load(Ordering::Acquire) {
      debug!("lease task stopped");
      break;
    }
  }
}
