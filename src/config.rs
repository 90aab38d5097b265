//! Startup configuration. Queue depths are compile-time (they size static storage);
//! everything else is read once by the wiring code and never changes afterwards.
use core::cmp::Reverse;

use embassy_time::Duration;
use thiserror::Error;

use crate::drivers::tlv::RecordType;

// ── Queue depths ──────────────────────────────────────────────────────────────

pub const MOTOR_QUEUE_DEPTH: usize = 10;
pub const VELOCITY_QUEUE_DEPTH: usize = 10;
pub const GPS_QUEUE_DEPTH: usize = 10;
pub const COMMAND_QUEUE_DEPTH: usize = 5;

pub const MAX_SOURCES: usize = RecordType::ALL.len();

// ── Task parameters ───────────────────────────────────────────────────────────

/// Relative task priority; higher is spawned first.
///
/// Tasks share one cooperative executor, so this orders start-up only. Work that must
/// preempt them (command reception) runs on an interrupt executor instead.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Priority {
    Idle,
    Low,
    Normal,
    High,
}

/// What a producer does when its queue is full.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OverflowPolicy {
    /// Wait until the assembler frees a slot, however long that takes.
    Block,
    /// Wait up to the given time, then drop the new sample.
    BlockFor(Duration),
    /// Evict the oldest queued sample.
    DropOldest,
    /// Drop the new sample.
    DropNewest,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TaskConfig {
    pub period: Duration,
    pub priority: Priority,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SourceConfig {
    pub task: TaskConfig,
    pub policy: OverflowPolicy,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TaskId {
    Source(RecordType),
    Assembler,
    Dispatcher,
    Datalog,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CommConfig {
    pub motor: SourceConfig,
    pub velocity: SourceConfig,
    pub gps: SourceConfig,
    pub assembler: TaskConfig,
    pub datalog: TaskConfig,
    pub dispatcher_priority: Priority,
    /// NVIC priority of command reception and its UART (0 = most urgent, 15 = least).
    pub rx_irq_priority: u8,
    /// Block order inside every frame.
    pub registration_order: [RecordType; MAX_SOURCES],
    pub sim_seed: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    #[error("{0:?} has a zero period")]
    ZeroPeriod(TaskId),
    #[error("{0:?} blocks with a zero timeout")]
    ZeroTimeout(RecordType),
    #[error("{0:?} registered more than once")]
    DuplicateSource(RecordType),
    #[error("interrupt priority {0} out of range")]
    IrqPriority(u8),
}

impl CommConfig {
    pub const DEFAULT: CommConfig = CommConfig {
        motor: SourceConfig {
            task: TaskConfig { period: Duration::from_millis(10), priority: Priority::High },
            policy: OverflowPolicy::DropOldest,
        },
        velocity: SourceConfig {
            task: TaskConfig { period: Duration::from_millis(20), priority: Priority::Normal },
            policy: OverflowPolicy::DropOldest,
        },
        gps: SourceConfig {
            task: TaskConfig { period: Duration::from_millis(100), priority: Priority::Normal },
            policy: OverflowPolicy::BlockFor(Duration::from_millis(100)),
        },
        assembler: TaskConfig { period: Duration::from_millis(100), priority: Priority::High },
        datalog: TaskConfig { period: Duration::from_millis(1000), priority: Priority::Idle },
        dispatcher_priority: Priority::High,
        rx_irq_priority: 1,
        registration_order: [RecordType::Motor, RecordType::Velocity, RecordType::Gps],
        sim_seed: 0x5EED_0BAD_CAFE_F00D,
    };

    pub fn source(&self, kind: RecordType) -> &SourceConfig {
        match kind {
            RecordType::Motor => &self.motor,
            RecordType::Velocity => &self.velocity,
            RecordType::Gps => &self.gps,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for kind in RecordType::ALL {
            let src = self.source(kind);
            if src.task.period.as_ticks() == 0 {
                return Err(ConfigError::ZeroPeriod(TaskId::Source(kind)));
            }
            if let OverflowPolicy::BlockFor(timeout) = src.policy {
                if timeout.as_ticks() == 0 {
                    return Err(ConfigError::ZeroTimeout(kind));
                }
            }
        }
        if self.assembler.period.as_ticks() == 0 {
            return Err(ConfigError::ZeroPeriod(TaskId::Assembler));
        }
        if self.datalog.period.as_ticks() == 0 {
            return Err(ConfigError::ZeroPeriod(TaskId::Datalog));
        }
        if self.rx_irq_priority > 15 {
            return Err(ConfigError::IrqPriority(self.rx_irq_priority));
        }
        // With MAX_SOURCES slots, no duplicate also means no source is missing.
        for (i, kind) in self.registration_order.iter().enumerate() {
            if self.registration_order[..i].contains(kind) {
                return Err(ConfigError::DuplicateSource(*kind));
            }
        }
        Ok(())
    }

    /// Tasks in spawn order: descending priority, ties in declaration order.
    pub fn spawn_order(&self) -> [TaskId; MAX_SOURCES + 3] {
        let mut order = [
            (self.dispatcher_priority, TaskId::Dispatcher),
            (self.motor.task.priority, TaskId::Source(RecordType::Motor)),
            (self.velocity.task.priority, TaskId::Source(RecordType::Velocity)),
            (self.gps.task.priority, TaskId::Source(RecordType::Gps)),
            (self.assembler.priority, TaskId::Assembler),
            (self.datalog.priority, TaskId::Datalog),
        ]
        .map(Some);
        let mut out = [TaskId::Datalog; MAX_SOURCES + 3];
        for slot in out.iter_mut() {
            // Leftmost of the highest remaining priority keeps ties stable.
            let best = order
                .iter()
                .enumerate()
                .filter_map(|(i, e)| e.map(|(p, _)| (i, p)))
                .min_by_key(|&(i, p)| (Reverse(p), i));
            if let Some((i, _)) = best {
                if let Some((_, id)) = order[i].take() {
                    *slot = id;
                }
            }
        }
        out
    }
}

impl Default for CommConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}
