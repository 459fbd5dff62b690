//! Non-blocking logging for the event path.
//!
//! # Architecture
//!
//! ```text
//! Event path               LogStream              Control loop
//! ──────────               ─────────              ────────────
//!
//! ev_info!() ──────────▶ [L0][L1][L2] ──────────▶ log::info!()
//! never blocks             MPSC ring               may block
//! never allocates          fixed entries           (UART, EspLogger)
//! ```
//!
//! # Rules
//!
//! - The processor and sampler never call `log::*` directly
//! - Messages longer than [`MAX_MSG_LEN`] are truncated
//! - Messages are dropped when the ring is full; drops are counted
//! - The interrupt producer does not log at all

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Maximum message length.
pub const MAX_MSG_LEN: usize = 96;

/// Log buffer size (number of entries).
pub const LOG_BUFFER_SIZE: usize = 64;

/// Log level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
        }
    }

    /// Matching `log` facade level.
    pub fn to_log(self) -> log::Level {
        match self {
            LogLevel::Error => log::Level::Error,
            LogLevel::Warn => log::Level::Warn,
            LogLevel::Info => log::Level::Info,
            LogLevel::Debug => log::Level::Debug,
        }
    }
}

/// A single log entry.
#[derive(Clone, Copy)]
pub struct LogEntry {
    /// Timestamp in milliseconds.
    pub timestamp_ms: u64,
    pub level: LogLevel,
    /// Message length.
    pub len: u8,
    /// Message bytes (not null-terminated).
    pub msg: [u8; MAX_MSG_LEN],
}

impl LogEntry {
    const EMPTY: Self = Self {
        timestamp_ms: 0,
        level: LogLevel::Info,
        len: 0,
        msg: [0; MAX_MSG_LEN],
    };

    /// Message text, lossy on invalid UTF-8 from truncation.
    pub fn text(&self) -> &str {
        let bytes = &self.msg[..self.len as usize];
        match core::str::from_utf8(bytes) {
            Ok(s) => s,
            // Truncation may split a multi-byte char: keep the valid prefix
            Err(e) => core::str::from_utf8(&bytes[..e.valid_up_to()]).unwrap_or(""),
        }
    }
}

impl Default for LogEntry {
    fn default() -> Self {
        Self::EMPTY
    }
}

struct Slot {
    /// Producer finished writing `entry`; cleared by the consumer.
    committed: AtomicBool,
    entry: UnsafeCell<LogEntry>,
}

#[allow(clippy::declare_interior_mutable_const)]
const EMPTY_SLOT: Slot = Slot {
    committed: AtomicBool::new(false),
    entry: UnsafeCell::new(LogEntry::EMPTY),
};

/// Lock-free log stream (MPSC: multiple producers, single consumer).
///
/// Producers reserve a slot with a CAS on `write_idx` (only when the ring has
/// room, so a reserved slot is always free), fill it, then publish it through
/// the slot's `committed` flag. The consumer only takes committed slots, in
/// order.
pub struct LogStream<const N: usize = LOG_BUFFER_SIZE> {
    slots: [Slot; N],
    write_idx: AtomicU32,
    read_idx: AtomicU32,
    dropped: AtomicU32,
}

// SAFETY: A slot's entry is written only by the producer that reserved its
// index and read only by the consumer after observing `committed`.
unsafe impl<const N: usize> Sync for LogStream<N> {}
unsafe impl<const N: usize> Send for LogStream<N> {}

impl<const N: usize> LogStream<N> {
    const MASK: usize = N - 1;

    /// Create a new empty log stream.
    pub const fn new() -> Self {
        assert!(N.is_power_of_two(), "Log buffer size must be power of 2");

        Self {
            slots: [EMPTY_SLOT; N],
            write_idx: AtomicU32::new(0),
            read_idx: AtomicU32::new(0),
            dropped: AtomicU32::new(0),
        }
    }

    /// Push a log entry. Never blocks.
    ///
    /// Returns `false` if the ring was full and the message was dropped.
    pub fn push(&self, timestamp_ms: u64, level: LogLevel, msg: &[u8]) -> bool {
        let mut write = self.write_idx.load(Ordering::Relaxed);
        loop {
            let read = self.read_idx.load(Ordering::Acquire);
            if write.wrapping_sub(read) >= N as u32 {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                return false;
            }
            match self.write_idx.compare_exchange_weak(
                write,
                write.wrapping_add(1),
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(current) => write = current,
            }
        }

        let slot = &self.slots[(write as usize) & Self::MASK];

        // SAFETY: index reserved exclusively by the CAS above, and the consumer
        // released this slot before advancing read_idx past it.
        unsafe {
            let entry = &mut *slot.entry.get();
            entry.timestamp_ms = timestamp_ms;
            entry.level = level;
            entry.len = msg.len().min(MAX_MSG_LEN) as u8;
            entry.msg[..entry.len as usize].copy_from_slice(&msg[..entry.len as usize]);
        }
        slot.committed.store(true, Ordering::Release);
        true
    }

    /// Take the next committed entry (consumer only).
    ///
    /// Returns `None` when empty or when the oldest reserved slot is still
    /// being written.
    pub fn drain(&self) -> Option<LogEntry> {
        let read = self.read_idx.load(Ordering::Relaxed);
        let write = self.write_idx.load(Ordering::Acquire);
        if read == write {
            return None;
        }

        let slot = &self.slots[(read as usize) & Self::MASK];
        if !slot.committed.load(Ordering::Acquire) {
            return None;
        }

        // SAFETY: committed, and no producer can reserve this index again
        // until read_idx moves past it.
        let entry = unsafe { *slot.entry.get() };

        slot.committed.store(false, Ordering::Relaxed);
        self.read_idx.store(read.wrapping_add(1), Ordering::Release);
        Some(entry)
    }

    #[inline]
    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Reset dropped counter (e.g., after reporting).
    #[inline]
    pub fn reset_dropped(&self) {
        self.dropped.store(0, Ordering::Relaxed);
    }

    /// Get number of entries waiting to be drained.
    #[inline]
    pub fn pending(&self) -> u32 {
        let read = self.read_idx.load(Ordering::Relaxed);
        let write = self.write_idx.load(Ordering::Acquire);
        write.wrapping_sub(read)
    }
}

impl<const N: usize> Default for LogStream<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Format a message into a buffer, truncating silently.
///
/// Returns the number of bytes written.
#[inline]
pub fn format_to_buffer(buf: &mut [u8], args: core::fmt::Arguments<'_>) -> usize {
    use core::fmt::Write;

    struct BufWriter<'a> {
        buf: &'a mut [u8],
        pos: usize,
    }

    impl Write for BufWriter<'_> {
        fn write_str(&mut self, s: &str) -> core::fmt::Result {
            let bytes = s.as_bytes();
            let to_write = bytes.len().min(self.buf.len() - self.pos);
            self.buf[self.pos..self.pos + to_write].copy_from_slice(&bytes[..to_write]);
            self.pos += to_write;
            Ok(())
        }
    }

    let mut writer = BufWriter { buf, pos: 0 };
    let _ = core::fmt::write(&mut writer, args);
    writer.pos
}

/// Event-path log macro. Writes to [`EVENT_LOG`](crate::log_globals::EVENT_LOG).
///
/// # Example
///
/// ```ignore
/// ev_log!(LogLevel::Info, now_ms, "GPIO{} -> {}", pin, value);
/// ```
#[macro_export]
macro_rules! ev_log {
    ($level:expr, $timestamp:expr, $($arg:tt)*) => {{
        let mut buf = [0u8; $crate::logging::MAX_MSG_LEN];
        let len = $crate::logging::format_to_buffer(&mut buf, format_args!($($arg)*));
        $crate::log_globals::EVENT_LOG.push($timestamp, $level, &buf[..len]);
    }};
}

#[macro_export]
macro_rules! ev_info {
    ($timestamp:expr, $($arg:tt)*) => {
        $crate::ev_log!($crate::logging::LogLevel::Info, $timestamp, $($arg)*)
    };
}

#[macro_export]
macro_rules! ev_warn {
    ($timestamp:expr, $($arg:tt)*) => {
        $crate::ev_log!($crate::logging::LogLevel::Warn, $timestamp, $($arg)*)
    };
}

#[macro_export]
macro_rules! ev_error {
    ($timestamp:expr, $($arg:tt)*) => {
        $crate::ev_log!($crate::logging::LogLevel::Error, $timestamp, $($arg)*)
    };
}

#[macro_export]
macro_rules! ev_debug {
    ($timestamp:expr, $($arg:tt)*) => {
        $crate::ev_log!($crate::logging::LogLevel::Debug, $timestamp, $($arg)*)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_stream_basic() {
        let stream = LogStream::<16>::new();

        assert!(stream.push(1000, LogLevel::Info, b"test message"));
        assert_eq!(stream.pending(), 1);

        let entry = stream.drain().unwrap();
        assert_eq!(entry.timestamp_ms, 1000);
        assert_eq!(entry.level, LogLevel::Info);
        assert_eq!(entry.text(), "test message");

        assert!(stream.drain().is_none());
    }

    #[test]
    fn test_log_stream_full_drops_newest() {
        let stream = LogStream::<4>::new();
        for i in 0..4 {
            assert!(stream.push(i, LogLevel::Info, b"x"));
        }
        assert!(!stream.push(5, LogLevel::Info, b"5"));
        assert_eq!(stream.dropped(), 1);

        assert_eq!(stream.drain().map(|e| e.timestamp_ms), Some(0));
        assert!(stream.push(6, LogLevel::Info, b"6"));
    }

    #[test]
    fn test_long_message_truncated() {
        let stream = LogStream::<4>::new();
        let long = [b'a'; MAX_MSG_LEN + 20];
        stream.push(0, LogLevel::Warn, &long);
        assert_eq!(stream.drain().unwrap().len as usize, MAX_MSG_LEN);
    }

    #[test]
    fn test_format_to_buffer() {
        let mut buf = [0u8; 32];
        let len = format_to_buffer(&mut buf, format_args!("GPIO{} -> {}", 4, 1));
        assert_eq!(&buf[..len], b"GPIO4 -> 1");

        let mut small = [0u8; 4];
        let len = format_to_buffer(&mut small, format_args!("truncated"));
        assert_eq!(&small[..len], b"trun");
    }

    #[test]
    fn test_mpsc_multiple_producers() {
        use std::sync::Arc;
        use std::thread;

        let stream = Arc::new(LogStream::<64>::new());
        let mut handles = vec![];

        for i in 0..4 {
            let stream = Arc::clone(&stream);
            handles.push(thread::spawn(move || {
                for j in 0..10 {
                    let msg = format!("thread {} msg {}", i, j);
                    stream.push(j, LogLevel::Info, msg.as_bytes());
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let mut count = 0;
        while stream.drain().is_some() {
            count += 1;
        }
        assert_eq!(count, 40, "All messages should be present");
    }

    #[test]
    fn test_mpsc_concurrent_drain() {
        use std::sync::atomic::AtomicBool;
        use std::sync::Arc;
        use std::thread;

        let stream = Arc::new(LogStream::<16>::new());
        let done = Arc::new(AtomicBool::new(false));

        let producers: Vec<_> = (0..4)
            .map(|i| {
                let stream = Arc::clone(&stream);
                thread::spawn(move || {
                    for j in 0..200 {
                        let msg = format!("T{}-{}", i, j);
                        let _ = stream.push(j, LogLevel::Debug, msg.as_bytes());
                    }
                })
            })
            .collect();

        let consumer = {
            let stream = Arc::clone(&stream);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut received = 0u32;
                loop {
                    match stream.drain() {
                        Some(entry) => {
                            assert!(entry.text().starts_with('T'));
                            received += 1;
                        }
                        None if done.load(Ordering::Acquire) && stream.pending() == 0 => break,
                        None => thread::yield_now(),
                    }
                }
                received
            })
        };

        for p in producers {
            p.join().unwrap();
        }
        done.store(true, Ordering::Release);
        let received = consumer.join().unwrap();

        assert_eq!(received + stream.dropped(), 800);
    }
}
