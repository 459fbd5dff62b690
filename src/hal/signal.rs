//! Consumer wakeup for the event queue.
//!
//! One waiter (the event processor), many notifiers (interrupt producers and
//! the sampler). `notify()` never blocks and is safe from interrupt context;
//! a notification sent before the waiter sleeps is latched, not lost.
//!
//! - Firmware: FreeRTOS direct-to-task notification
//! - Host: mutex + condvar

#[cfg(target_os = "espidf")]
pub use esp_signal::Signal;

#[cfg(not(target_os = "espidf"))]
pub use host_signal::Signal;

#[cfg(target_os = "espidf")]
mod esp_signal {
    use core::num::NonZeroU32;
    use core::ptr;
    use core::sync::atomic::{AtomicPtr, Ordering};

    use esp_idf_hal::delay::BLOCK;
    use esp_idf_hal::task;
    use esp_idf_svc::sys::tskTaskControlBlock;

    /// Task-notification wakeup.
    pub struct Signal {
        waiter: AtomicPtr<tskTaskControlBlock>,
    }

    impl Signal {
        pub const fn new() -> Self {
            Self {
                waiter: AtomicPtr::new(ptr::null_mut()),
            }
        }

        /// Register the calling task as the waiter.
        ///
        /// Must run before the first emptiness check, otherwise a push between
        /// the check and the registration would go unnoticed.
        pub fn arm(&self) {
            if let Some(handle) = task::current() {
                self.waiter.store(handle, Ordering::Release);
            }
        }

        /// Wake the waiter. ISR-safe.
        #[inline]
        pub fn notify(&self) {
            let handle = self.waiter.load(Ordering::Acquire);
            if handle.is_null() {
                return;
            }
            // SAFETY: handle belongs to the long-lived processor task, which is
            // never deleted. notify_and_yield picks the FromISR variant itself.
            unsafe {
                task::notify_and_yield(handle, NonZeroU32::MIN);
            }
        }

        /// Sleep until notified.
        pub fn wait(&self) {
            let _ = task::wait_notification(BLOCK);
        }
    }

    impl Default for Signal {
        fn default() -> Self {
            Self::new()
        }
    }
}

#[cfg(not(target_os = "espidf"))]
mod host_signal {
    use std::sync::{Condvar, Mutex, PoisonError};

    /// Condvar wakeup with a latched flag.
    pub struct Signal {
        pending: Mutex<bool>,
        cond: Condvar,
    }

    impl Signal {
        pub const fn new() -> Self {
            Self {
                pending: Mutex::new(false),
                cond: Condvar::new(),
            }
        }

        /// No registration needed on the host.
        pub fn arm(&self) {}

        #[inline]
        pub fn notify(&self) {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            *pending = true;
            self.cond.notify_one();
        }

        pub fn wait(&self) {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            while !*pending {
                pending = self.cond.wait(pending).unwrap_or_else(PoisonError::into_inner);
            }
            *pending = false;
        }
    }

    impl Default for Signal {
        fn default() -> Self {
            Self::new()
        }
    }

}
