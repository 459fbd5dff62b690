//! Bounded MPSC handoff queue between the capture producers and the event processor.
//!
//! # Architecture
//!
//! ```text
//! GPIO ISR (per pin) ──┐
//!                      ├──▶ EventQueue ──────▶ EventProcessor
//! Periodic sampler ────┘    (32 slots)          (single consumer)
//!                           overwrite-oldest
//! ```
//!
//! # Rules
//!
//! - `try_push` never blocks, never allocates, completes in O(1)
//! - A full queue evicts its oldest entry: the newest state always wins
//! - Evictions are counted, never reported as errors
//! - `pop` is the only operation that sleeps
//!
//! Slots live in a `VecDeque` reserved once at construction. Every access
//! runs inside `Slots::with`:
//!
//! - Firmware: `IsrCriticalSection` (`portENTER_CRITICAL` spinlock), so an
//!   ISR on either core can push while the processor task is mid-pop
//! - Host: `critical_section::Mutex` over the `std` implementation

use core::sync::atomic::{AtomicU32, Ordering};
use std::collections::VecDeque;

use crate::event::IoEvent;
use crate::hal::signal::Signal;

#[cfg(target_os = "espidf")]
use isr_slots::Slots;

#[cfg(not(target_os = "espidf"))]
use host_slots::Slots;

#[cfg(target_os = "espidf")]
mod isr_slots {
    use core::cell::UnsafeCell;
    use std::collections::VecDeque;

    use esp_idf_hal::interrupt::IsrCriticalSection;

    use crate::event::IoEvent;

    /// Deque behind an ISR-safe spinlock section.
    pub struct Slots {
        lock: IsrCriticalSection,
        deque: UnsafeCell<VecDeque<IoEvent>>,
    }

    // SAFETY: `deque` is only reached through `with`, inside `lock`.
    unsafe impl Sync for Slots {}

    impl Slots {
        pub fn new(deque: VecDeque<IoEvent>) -> Self {
            Self {
                lock: IsrCriticalSection::new(),
                deque: UnsafeCell::new(deque),
            }
        }

        /// Run `f` with exclusive access. Keep `f` short: interrupts on this
        /// core are masked for its duration.
        #[inline]
        pub fn with<R>(&self, f: impl FnOnce(&mut VecDeque<IoEvent>) -> R) -> R {
            let _guard = self.lock.enter();
            // SAFETY: the guard excludes every other task and ISR
            f(unsafe { &mut *self.deque.get() })
        }
    }
}

#[cfg(not(target_os = "espidf"))]
mod host_slots {
    use core::cell::RefCell;
    use std::collections::VecDeque;

    use critical_section::Mutex;

    use crate::event::IoEvent;

    pub struct Slots(Mutex<RefCell<VecDeque<IoEvent>>>);

    impl Slots {
        pub fn new(deque: VecDeque<IoEvent>) -> Self {
            Self(Mutex::new(RefCell::new(deque)))
        }

        #[inline]
        pub fn with<R>(&self, f: impl FnOnce(&mut VecDeque<IoEvent>) -> R) -> R {
            critical_section::with(|cs| f(&mut self.0.borrow_ref_mut(cs)))
        }
    }
}

/// Default queue capacity.
pub const QUEUE_CAPACITY: usize = 32;

/// The queue could not be created. The capture subsystem must report itself
/// disabled rather than run without a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum QueueInitError {
    #[error("queue capacity must be non-zero")]
    ZeroCapacity,

    #[error("cannot allocate {0} queue slots")]
    Allocation(usize),
}

/// Fixed-capacity, overwrite-oldest event queue.
///
/// Multiple producers (interrupt context and task context), one consumer.
pub struct EventQueue {
    slots: Slots,
    capacity: usize,
    signal: Signal,

    /// Total accepted pushes.
    pushed: AtomicU32,

    /// Entries discarded to make room.
    evicted: AtomicU32,
}

impl EventQueue {
    /// Create a queue with the default 32 slots.
    pub fn new() -> Result<Self, QueueInitError> {
        Self::with_capacity(QUEUE_CAPACITY)
    }

    /// Create a queue with `capacity` slots, all reserved up front.
    pub fn with_capacity(capacity: usize) -> Result<Self, QueueInitError> {
        if capacity == 0 {
            return Err(QueueInitError::ZeroCapacity);
        }

        let mut slots = VecDeque::new();
        slots
            .try_reserve_exact(capacity)
            .map_err(|_| QueueInitError::Allocation(capacity))?;

        Ok(Self {
            slots: Slots::new(slots),
            capacity,
            signal: Signal::new(),
            pushed: AtomicU32::new(0),
            evicted: AtomicU32::new(0),
        })
    }

    /// Push an event, evicting the oldest one if the queue is full.
    ///
    /// Returns `true` if a free slot was used, `false` if an entry was evicted.
    ///
    /// # Timing
    ///
    /// O(1). Never blocks, never allocates: the deque never grows past the
    /// capacity reserved in the constructor. Safe from interrupt context.
    #[inline]
    pub fn try_push(&self, event: IoEvent) -> bool {
        let free_slot = self.slots.with(|slots| {
            let free = slots.len() < self.capacity;
            if !free {
                slots.pop_front();
            }
            slots.push_back(event);
            free
        });

        self.pushed.fetch_add(1, Ordering::Relaxed);
        if !free_slot {
            self.evicted.fetch_add(1, Ordering::Relaxed);
        }

        self.signal.notify();
        free_slot
    }

    /// Take the oldest event if there is one.
    #[inline]
    pub fn try_pop(&self) -> Option<IoEvent> {
        self.slots.with(|slots| slots.pop_front())
    }

    /// Take the oldest event, sleeping until one arrives.
    ///
    /// Only the event processor calls this. There is no timeout.
    pub fn pop(&self) -> IoEvent {
        self.signal.arm();
        loop {
            if let Some(event) = self.try_pop() {
                return event;
            }
            self.signal.wait();
        }
    }

    /// Number of queued events.
    #[inline]
    pub fn len(&self) -> usize {
        self.slots.with(|slots| slots.len())
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total pushes since creation.
    #[inline]
    pub fn pushed(&self) -> u32 {
        self.pushed.load(Ordering::Relaxed)
    }

    /// Total evictions since creation.
    #[inline]
    pub fn evicted(&self) -> u32 {
        self.evicted.load(Ordering::Relaxed)
    }
}
