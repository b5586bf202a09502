use {crate::wire::Message, std::io};

/// The transmit capability of a transport: one synchronous "send one
/// transport message" operation with multiple implementations
/// (unicast, multicast, raw-Ethernet). The lease task depends only
/// on the operation, never on the implementation.
///
/// Sends are expected to either complete quickly or fail. Failures
/// are transient; callers retry on their own schedule.
pub trait Link: Send + Sync {
  fn send(&self, msg: &Message) -> io::Result<()>;
}
