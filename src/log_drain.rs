//! Event log output.
//!
//! Moves entries from [`EVENT_LOG`](crate::log_globals::EVENT_LOG) into the
//! `log` facade. Runs in the control loop, where blocking on UART output is
//! acceptable.

use crate::log_globals::EVENT_LOG;
use crate::logging::{LogEntry, LogStream};

/// Interval between "dropped" reports.
pub const DROPPED_REPORT_INTERVAL_MS: u64 = 10_000;

/// Drain state kept by the control loop between calls.
#[derive(Debug, Default)]
pub struct LogDrain {
    last_dropped_report_ms: u64,
}

impl LogDrain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain [`EVENT_LOG`] into `log`. Returns the number of entries written.
    pub fn drain_into_log(&mut self, now_ms: u64) -> usize {
        self.drain_stream(&EVENT_LOG, now_ms, &mut write_to_log)
    }

    /// Drain `stream` through `sink`, reporting dropped entries at most once
    /// per [`DROPPED_REPORT_INTERVAL_MS`].
    pub fn drain_stream<const N: usize>(
        &mut self,
        stream: &LogStream<N>,
        now_ms: u64,
        sink: &mut dyn FnMut(&LogEntry),
    ) -> usize {
        let mut written = 0;
        while let Some(entry) = stream.drain() {
            sink(&entry);
            written += 1;
        }

        if now_ms.saturating_sub(self.last_dropped_report_ms) >= DROPPED_REPORT_INTERVAL_MS {
            let dropped = stream.dropped();
            if dropped > 0 {
                log::warn!("Event log dropped {} entries", dropped);
                stream.reset_dropped();
            }
            self.last_dropped_report_ms = now_ms;
        }

        written
    }
}

fn write_to_log(entry: &LogEntry) {
    log::log!(
        target: "io::event",
        entry.level.to_log(),
        "[{:10}] {}",
        entry.timestamp_ms,
        entry.text()
    );
}
