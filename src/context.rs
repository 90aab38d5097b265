//! The communication context: every queue, the command channel and the mode cell,
//! created once at startup and shared by reference with each task and the receive handler.
use core::cell::Cell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;

use crate::config::{COMMAND_QUEUE_DEPTH, GPS_QUEUE_DEPTH, MOTOR_QUEUE_DEPTH, VELOCITY_QUEUE_DEPTH};
use crate::drivers::tlv::RecordType;
use crate::queue::{BoundedQueue, QueueStats};
use crate::state::{GpsRecord, ModeCell, MotorRecord, Snapshot, VelocityRecord};
use crate::tasks::assembler::{FrameSource, TxCounters};
use crate::tasks::command_rx::CommandChannel;

pub type MotorQueue = BoundedQueue<MotorRecord, MOTOR_QUEUE_DEPTH>;
pub type VelocityQueue = BoundedQueue<VelocityRecord, VELOCITY_QUEUE_DEPTH>;
pub type GpsQueue = BoundedQueue<GpsRecord, GPS_QUEUE_DEPTH>;
pub type Commands = CommandChannel<COMMAND_QUEUE_DEPTH>;

/// Latest transmitted values, written by the assembler, read by the datalog.
pub type SnapshotCell = Mutex<CriticalSectionRawMutex, Cell<Snapshot>>;

pub struct CommContext {
    pub motor: MotorQueue,
    pub velocity: VelocityQueue,
    pub gps: GpsQueue,
    pub commands: Commands,
    pub mode: ModeCell,
    pub snapshot: SnapshotCell,
    pub tx: TxCounters,
}

impl CommContext {
    pub const fn new() -> Self {
        Self {
            motor: BoundedQueue::new(),
            velocity: BoundedQueue::new(),
            gps: BoundedQueue::new(),
            commands: CommandChannel::new(),
            mode: ModeCell::new(),
            snapshot: Mutex::new(Cell::new(Snapshot {
                speed: 0.0,
                motor_current: 0.0,
                pos_x: 0.0,
                pos_y: 0.0,
                heading: 0.0,
            })),
            tx: TxCounters::new(),
        }
    }

    pub fn frame_source(&self, kind: RecordType) -> &dyn FrameSource {
        match kind {
            RecordType::Motor => &self.motor,
            RecordType::Velocity => &self.velocity,
            RecordType::Gps => &self.gps,
        }
    }

    pub fn queue_stats(&self, kind: RecordType) -> QueueStats {
        match kind {
            RecordType::Motor => self.motor.stats(),
            RecordType::Velocity => self.velocity.stats(),
            RecordType::Gps => self.gps.stats(),
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        self.snapshot.lock(|c| c.get())
    }
}

impl Default for CommContext {
    fn default() -> Self {
        Self::new()
    }
}
