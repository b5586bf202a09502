use std::time::Duration;

/// Transport wide liveness configuration.
#[derive(Debug, Clone)]
pub struct Config {
  /// Lease advertised by the local peer in its own JOIN frames.
  /// Observers consider this peer gone after this much silence.
  pub lease: Duration,

  /// How often the local peer re-announces itself with a JOIN.
  /// Independent of any lease.
  pub join_interval: Duration,

  /// Divisor of the observed minimum lease used to derive the
  /// keep-alive cadence. Must be at least 2 so that every peer
  /// gets several opportunities to hear the local peer before
  /// its lease runs out.
  pub lease_expire_factor: u32,
}

impl Config {
  /// The keep-alive period in milliseconds, derived from the
  /// shortest lease any known peer will tolerate. Floored at one
  /// millisecond so a degenerate lease cannot stall the scheduler.
  pub fn keep_alive_interval(&self, minimum_lease: i64) -> i64 {
    (minimum_lease / i64::from(self.lease_expire_factor.max(1))).max(1)
  }
}

impl Default for Config {
  fn default() -> Self {
    Self {
      lease: Duration::from_secs(10),
      join_interval: Duration::from_millis(2500),
      lease_expire_factor: 4,
    }
  }
}
