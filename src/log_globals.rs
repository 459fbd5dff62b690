//! Global log stream instance.
//!
//! One stream shared by every event-path producer (processor thread,
//! sampler, trigger executor), drained by the control loop.

use crate::logging::LogStream;

/// Event-path log stream.
///
/// Multiple producers (coordinated via CAS), single consumer
/// ([`drain_into_log`](crate::log_drain::drain_into_log)).
pub static EVENT_LOG: LogStream = LogStream::new();
