//! Fixed-capacity FIFO used for every cross-task and interrupt-to-task hand-off.
//!
//! Backed by an embassy `Channel` guarded by `CriticalSectionRawMutex`: each enqueue or
//! dequeue runs with interrupts masked for a handful of instructions, so `try_push` is
//! safe from interrupt context and can never meet a lock held by a preempted task.

use core::sync::atomic::{AtomicU32, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, TrySendError};
use embassy_time::{with_timeout, Duration};

/// "No space": the rejected item is handed back to the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Full<T>(pub T);

/// A timed push gave up; the item was dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimedOut;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct QueueStats {
    pub pushed: u32,
    pub popped: u32,
    /// Oldest entries evicted to make room for a newer one.
    pub overwritten: u32,
    /// Items that never entered the queue (full on a non-blocking push, or timed out).
    pub rejected: u32,
    /// Pushes that found the queue full and had to wait.
    pub stalls: u32,
}

#[derive(Default)]
struct Counters {
    pushed: AtomicU32,
    popped: AtomicU32,
    overwritten: AtomicU32,
    rejected: AtomicU32,
    stalls: AtomicU32,
}

impl Counters {
    const fn new() -> Self {
        Self {
            pushed: AtomicU32::new(0),
            popped: AtomicU32::new(0),
            overwritten: AtomicU32::new(0),
            rejected: AtomicU32::new(0),
            stalls: AtomicU32::new(0),
        }
    }

    fn bump(counter: &AtomicU32) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

pub struct BoundedQueue<T, const N: usize> {
    chan: Channel<CriticalSectionRawMutex, T, N>,
    counters: Counters,
}

impl<T, const N: usize> BoundedQueue<T, N> {
    pub const fn new() -> Self {
        Self { chan: Channel::new(), counters: Counters::new() }
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn len(&self) -> usize {
        self.chan.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chan.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.chan.is_full()
    }

    /// Non-blocking push. Interrupt safe.
    pub fn try_push(&self, item: T) -> Result<(), Full<T>> {
        match self.chan.try_send(item) {
            Ok(()) => {
                Counters::bump(&self.counters.pushed);
                Ok(())
            }
            Err(TrySendError::Full(item)) => {
                Counters::bump(&self.counters.rejected);
                Err(Full(item))
            }
        }
    }

    /// Push, suspending the caller for as long as the queue stays full.
    pub async fn push(&self, item: T) {
        let item = match self.chan.try_send(item) {
            Ok(()) => {
                Counters::bump(&self.counters.pushed);
                return;
            }
            Err(TrySendError::Full(item)) => item,
        };
        Counters::bump(&self.counters.stalls);
        self.chan.send(item).await;
        Counters::bump(&self.counters.pushed);
    }

    /// Push, waiting at most `timeout` for space. The item is dropped on timeout.
    pub async fn push_timeout(&self, item: T, timeout: Duration) -> Result<(), TimedOut> {
        let item = match self.chan.try_send(item) {
            Ok(()) => {
                Counters::bump(&self.counters.pushed);
                return Ok(());
            }
            Err(TrySendError::Full(item)) => item,
        };
        Counters::bump(&self.counters.stalls);
        match with_timeout(timeout, self.chan.send(item)).await {
            Ok(()) => {
                Counters::bump(&self.counters.pushed);
                Ok(())
            }
            Err(_) => {
                Counters::bump(&self.counters.rejected);
                Err(TimedOut)
            }
        }
    }

    /// Push, evicting the oldest entry when full. Returns the evicted entry.
    ///
    /// Intended for a single producer: another producer racing for the freed slot
    /// causes another eviction rather than a failure.
    pub fn push_overwrite(&self, mut item: T) -> Option<T> {
        let mut evicted = None;
        loop {
            match self.chan.try_send(item) {
                Ok(()) => {
                    Counters::bump(&self.counters.pushed);
                    return evicted;
                }
                Err(TrySendError::Full(back)) => {
                    item = back;
                    if let Ok(old) = self.chan.try_receive() {
                        Counters::bump(&self.counters.overwritten);
                        evicted = Some(old);
                    }
                }
            }
        }
    }

    /// Non-blocking pop: `None` means the queue was empty.
    pub fn try_pop(&self) -> Option<T> {
        let item = self.chan.try_receive().ok()?;
        Counters::bump(&self.counters.popped);
        Some(item)
    }

    /// Pop, suspending the caller until an item arrives.
    pub async fn pop(&self) -> T {
        let item = self.chan.receive().await;
        Counters::bump(&self.counters.popped);
        item
    }

    pub async fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        let item = with_timeout(timeout, self.chan.receive()).await.ok()?;
        Counters::bump(&self.counters.popped);
        Some(item)
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            pushed: self.counters.pushed.load(Ordering::Relaxed),
            popped: self.counters.popped.load(Ordering::Relaxed),
            overwritten: self.counters.overwritten.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
            stalls: self.counters.stalls.load(Ordering::Relaxed),
        }
    }
}

impl<T, const N: usize> Default for BoundedQueue<T, N> {
    fn default() -> Self {
        Self::new()
    }
}
