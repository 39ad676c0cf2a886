use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bevy::log::warn;
use parking_lot::RwLock;

pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(10);
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_millis(20);

/// Reader/writer guard with bounded acquisition.
///
/// A caller that cannot take the lock inside its timeout gets `None` back
/// and the shared container stays untouched; nothing is ever propagated as
/// an error. Timed-out acquisitions are counted for diagnostics.
pub struct TimedLock<T> {
    label: &'static str,
    inner: RwLock<T>,
    read_timeout: Duration,
    write_timeout: Duration,
    read_timeouts: AtomicU64,
    write_timeouts: AtomicU64,
}

impl<T> TimedLock<T> {
    pub fn new(label: &'static str, value: T) -> Self {
        Self::with_timeouts(label, value, DEFAULT_READ_TIMEOUT, DEFAULT_WRITE_TIMEOUT)
    }

    pub fn with_timeouts(
        label: &'static str,
        value: T,
        read_timeout: Duration,
        write_timeout: Duration,
    ) -> Self {
        Self {
            label,
            inner: RwLock::new(value),
            read_timeout,
            write_timeout,
            read_timeouts: AtomicU64::new(0),
            write_timeouts: AtomicU64::new(0),
        }
    }

    /// Run `f` under a shared guard, or `None` on timeout.
    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        match self.inner.try_read_for(self.read_timeout) {
            Some(guard) => Some(f(&guard)),
            None => {
                self.read_timeouts.fetch_add(1, Ordering::Relaxed);
                warn!("{}: read lock timed out", self.label);
                None
            }
        }
    }

    /// Run `f` under an exclusive guard, or `None` on timeout.
    pub fn write<R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        match self.inner.try_write_for(self.write_timeout) {
            Some(mut guard) => Some(f(&mut guard)),
            None => {
                self.write_timeouts.fetch_add(1, Ordering::Relaxed);
                warn!("{}: write lock timed out", self.label);
                None
            }
        }
    }

    pub fn read_timeout_count(&self) -> u64 {
        self.read_timeouts.load(Ordering::Relaxed)
    }

    pub fn write_timeout_count(&self) -> u64 {
        self.write_timeouts.load(Ordering::Relaxed)
    }

    pub fn timeout_count(&self) -> u64 {
        self.read_timeout_count() + self.write_timeout_count()
    }
}
