//! Operator command intake: the receive-complete handler on one side, the dispatcher's
//! wait on the other, a bounded queue and a wake signal in between.
use core::sync::atomic::{AtomicU32, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;

use crate::queue::BoundedQueue;
use crate::state::Command;

/// Re-arms single-byte reception on the command link.
pub trait RxArm {
    fn arm(&mut self);
}

/// What the receive handler did with one byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RxOutcome {
    pub command: Command,
    /// `false` when the queue was full and the command was dropped.
    pub enqueued: bool,
    /// The queue was empty before this byte, so the dispatcher was (or is about to be)
    /// parked waiting for it.
    pub woke_dispatcher: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CommandStats {
    pub received: u32,
    pub dropped: u32,
    pub queued: usize,
}

pub struct CommandChannel<const N: usize> {
    queue: BoundedQueue<Command, N>,
    ready: Signal<CriticalSectionRawMutex, ()>,
    received: AtomicU32,
    dropped: AtomicU32,
}

impl<const N: usize> CommandChannel<N> {
    pub const fn new() -> Self {
        Self {
            queue: BoundedQueue::new(),
            ready: Signal::new(),
            received: AtomicU32::new(0),
            dropped: AtomicU32::new(0),
        }
    }

    /// Receive-complete handler. Runs in interrupt context: never waits.
    ///
    /// Order matters: enqueue, re-arm reception, then wake the dispatcher. A full queue
    /// drops the command and counts it.
    pub fn on_receive_complete<A: RxArm>(&self, byte: u8, rx: &mut A) -> RxOutcome {
        let command = Command::from(byte);
        self.received.fetch_add(1, Ordering::Relaxed);

        let was_empty = self.queue.is_empty();
        let enqueued = self.queue.try_push(command).is_ok();
        if !enqueued {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }

        rx.arm();

        if enqueued {
            self.ready.signal(());
        } else {
            warn!("command queue full, dropped {:?}", command);
        }
        RxOutcome { command, enqueued, woke_dispatcher: enqueued && was_empty }
    }

    /// The link lost bytes before they reached this handler (receiver overrun). The
    /// number of lost bytes is unknown, so each overrun counts as one dropped command.
    pub fn record_overrun(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        warn!("command link overrun, bytes lost");
    }

    /// Next queued command, without waiting.
    pub fn try_next(&self) -> Option<Command> {
        self.queue.try_pop()
    }

    /// Next queued command, parking on the wake signal while the queue is empty.
    ///
    /// The signal latches, so a push that lands between the empty check and the wait
    /// still releases the wait.
    pub async fn next_command(&self) -> Command {
        loop {
            if let Some(cmd) = self.queue.try_pop() {
                return cmd;
            }
            self.ready.wait().await;
        }
    }

    pub fn stats(&self) -> CommandStats {
        CommandStats {
            received: self.received.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            queued: self.queue.len(),
        }
    }
}

impl<const N: usize> Default for CommandChannel<N> {
    fn default() -> Self {
        Self::new()
    }
}
