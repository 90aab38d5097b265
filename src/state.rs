/// Shared state types for inter-task communication.
///
/// Records are `Copy` so they move through the bounded queues by value; the mode is a
/// single atomic cell written by the dispatcher and read by everything downstream.
use core::sync::atomic::{AtomicU8, Ordering};

use crate::drivers::tlv::{DecodeError, Record, RecordType, WireReader, WireWriter};

// ── Records ───────────────────────────────────────────────────────────────────

/// Motor drive telemetry: per-phase currents, their references and the drive signals.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MotorRecord {
    pub timestamp: u64,
    pub current: [f32; 3],
    pub current_ref: [f32; 3],
    pub drive_signal: [i8; 3],
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct VelocityRecord {
    pub timestamp: u64,
    pub speed: f32,
    pub yaw_rate: f32,
    pub velocity_ref: [f32; 3],
}

/// Planar pose estimate (m, m, rad).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GpsRecord {
    pub timestamp: u64,
    pub x: f32,
    pub y: f32,
    pub heading: f32,
}

impl Record for MotorRecord {
    const TYPE: RecordType = RecordType::Motor;
    const PAYLOAD_LEN: usize = 8 + 3 * 4 + 3 * 4 + 3;

    fn timestamp(&self) -> u64 {
        self.timestamp
    }

    fn stamp(&mut self, ticks: u64) {
        self.timestamp = ticks;
    }

    fn encode(&self, out: &mut [u8]) {
        let mut w = WireWriter::new(out);
        w.put_u64(self.timestamp);
        self.current.iter().for_each(|&v| w.put_f32(v));
        self.current_ref.iter().for_each(|&v| w.put_f32(v));
        self.drive_signal.iter().for_each(|&v| w.put_i8(v));
    }

    fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let mut r = WireReader::for_record::<Self>(payload)?;
        let timestamp = r.get_u64();
        let current = [r.get_f32(), r.get_f32(), r.get_f32()];
        let current_ref = [r.get_f32(), r.get_f32(), r.get_f32()];
        let drive_signal = [r.get_i8(), r.get_i8(), r.get_i8()];
        Ok(Self { timestamp, current, current_ref, drive_signal })
    }

    fn fold_into(&self, snapshot: &mut Snapshot) {
        snapshot.motor_current = self.current.iter().sum::<f32>() / 3.0;
    }
}

impl Record for VelocityRecord {
    const TYPE: RecordType = RecordType::Velocity;
    const PAYLOAD_LEN: usize = 8 + 4 + 4 + 3 * 4;

    fn timestamp(&self) -> u64 {
        self.timestamp
    }

    fn stamp(&mut self, ticks: u64) {
        self.timestamp = ticks;
    }

    fn encode(&self, out: &mut [u8]) {
        let mut w = WireWriter::new(out);
        w.put_u64(self.timestamp);
        w.put_f32(self.speed);
        w.put_f32(self.yaw_rate);
        self.velocity_ref.iter().for_each(|&v| w.put_f32(v));
    }

    fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let mut r = WireReader::for_record::<Self>(payload)?;
        Ok(Self {
            timestamp: r.get_u64(),
            speed: r.get_f32(),
            yaw_rate: r.get_f32(),
            velocity_ref: [r.get_f32(), r.get_f32(), r.get_f32()],
        })
    }

    fn fold_into(&self, snapshot: &mut Snapshot) {
        snapshot.speed = self.speed;
    }
}

impl Record for GpsRecord {
    const TYPE: RecordType = RecordType::Gps;
    const PAYLOAD_LEN: usize = 8 + 3 * 4;

    fn timestamp(&self) -> u64 {
        self.timestamp
    }

    fn stamp(&mut self, ticks: u64) {
        self.timestamp = ticks;
    }

    fn encode(&self, out: &mut [u8]) {
        let mut w = WireWriter::new(out);
        w.put_u64(self.timestamp);
        w.put_f32(self.x);
        w.put_f32(self.y);
        w.put_f32(self.heading);
    }

    fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let mut r = WireReader::for_record::<Self>(payload)?;
        Ok(Self {
            timestamp: r.get_u64(),
            x: r.get_f32(),
            y: r.get_f32(),
            heading: r.get_f32(),
        })
    }

    fn fold_into(&self, snapshot: &mut Snapshot) {
        snapshot.pos_x = self.x;
        snapshot.pos_y = self.y;
        snapshot.heading = self.heading;
    }
}

/// Latest transmitted values, condensed for the text summary on the debug console.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Snapshot {
    pub speed: f32,
    pub motor_current: f32,
    pub pos_x: f32,
    pub pos_y: f32,
    pub heading: f32,
}

// ── Commands ──────────────────────────────────────────────────────────────────

/// Operator command, one raw byte on the wire (ordinal of the variant).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    Reset,
    EnterAutonomous,
    EnterManual,
    /// Any byte outside the defined set, kept so it can be logged and counted.
    Unknown(u8),
}

impl From<u8> for Command {
    fn from(byte: u8) -> Self {
        match byte {
            0 => Command::Reset,
            1 => Command::EnterAutonomous,
            2 => Command::EnterManual,
            other => Command::Unknown(other),
        }
    }
}

impl From<Command> for u8 {
    fn from(cmd: Command) -> u8 {
        match cmd {
            Command::Reset => 0,
            Command::EnterAutonomous => 1,
            Command::EnterManual => 2,
            Command::Unknown(b) => b,
        }
    }
}

// ── Operating mode ────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Mode {
    #[default]
    Reset = 0,
    Autonomous = 1,
    Manual = 2,
}

impl Mode {
    /// Transition taken on `cmd`. Total: unknown commands keep the current mode.
    pub fn on_command(self, cmd: Command) -> Mode {
        match cmd {
            Command::Reset => Mode::Reset,
            Command::EnterAutonomous => Mode::Autonomous,
            Command::EnterManual => Mode::Manual,
            Command::Unknown(_) => self,
        }
    }

    fn from_raw(raw: u8) -> Mode {
        match raw {
            1 => Mode::Autonomous,
            2 => Mode::Manual,
            _ => Mode::Reset,
        }
    }
}

/// Process-wide operating mode. Written only by the dispatcher.
pub struct ModeCell {
    raw: AtomicU8,
}

impl ModeCell {
    pub const fn new() -> Self {
        Self { raw: AtomicU8::new(Mode::Reset as u8) }
    }

    pub fn get(&self) -> Mode {
        Mode::from_raw(self.raw.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, mode: Mode) {
        self.raw.store(mode as u8, Ordering::Release);
    }
}

impl Default for ModeCell {
    fn default() -> Self {
        Self::new()
    }
}
