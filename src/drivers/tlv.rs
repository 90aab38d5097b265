//! Telemetry frame codec.
//!
//! A frame is a plain concatenation of blocks, each `[type:u8][len:u16 LE][payload]`.
//! There is no sync byte and no checksum: a receiver walks the blocks using the fixed
//! payload length it knows for every type, and gives up on the first mismatch.

use thiserror::Error;

use crate::state::{GpsRecord, MotorRecord, Snapshot, VelocityRecord};

/// Type byte + little-endian u16 length.
pub const BLOCK_HEADER_LEN: usize = 3;

/// Room for one block of every record type.
pub const MAX_FRAME_LEN: usize = 3 * BLOCK_HEADER_LEN
    + MotorRecord::PAYLOAD_LEN
    + VelocityRecord::PAYLOAD_LEN
    + GpsRecord::PAYLOAD_LEN;

/// Per-cycle frame storage. Lives on the assembler's stack and never grows.
pub type FrameBuffer = heapless::Vec<u8, MAX_FRAME_LEN>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum RecordType {
    Motor = 0x01,
    Velocity = 0x02,
    Gps = 0x03,
}

impl RecordType {
    pub const ALL: [RecordType; 3] = [RecordType::Motor, RecordType::Velocity, RecordType::Gps];

    pub const fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.code() == code)
    }

    /// Out-of-band payload length agreed with the receiver.
    pub const fn payload_len(self) -> usize {
        match self {
            RecordType::Motor => MotorRecord::PAYLOAD_LEN,
            RecordType::Velocity => VelocityRecord::PAYLOAD_LEN,
            RecordType::Gps => GpsRecord::PAYLOAD_LEN,
        }
    }

    pub const fn block_len(self) -> usize {
        BLOCK_HEADER_LEN + self.payload_len()
    }
}

/// A fixed-layout telemetry record carried as one block.
pub trait Record: Copy {
    const TYPE: RecordType;
    const PAYLOAD_LEN: usize;

    fn timestamp(&self) -> u64;

    /// Overwrite the timestamp with the producer's scheduler tick.
    fn stamp(&mut self, ticks: u64);

    /// Write exactly `PAYLOAD_LEN` little-endian bytes into `out`.
    fn encode(&self, out: &mut [u8]);

    fn decode(payload: &[u8]) -> Result<Self, DecodeError>;

    /// Fold the fields the debug summary cares about into `snapshot`.
    fn fold_into(&self, snapshot: &mut Snapshot);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameError {
    #[error("frame buffer full: block needs {needed} bytes, {remaining} left")]
    Overflow { needed: usize, remaining: usize },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DecodeError {
    #[error("unknown block type {0:#04x}")]
    UnknownType(u8),
    #[error("block type {code:#04x} carries {got} bytes, expected {expected}")]
    LengthMismatch { code: u8, expected: usize, got: usize },
    #[error("frame truncated")]
    Truncated,
}

/// Append one block holding `record`. The frame is left untouched on overflow.
pub fn append_block<R: Record>(frame: &mut FrameBuffer, record: &R) -> Result<usize, FrameError> {
    let needed = BLOCK_HEADER_LEN + R::PAYLOAD_LEN;
    let remaining = frame.capacity() - frame.len();
    if needed > remaining {
        return Err(FrameError::Overflow { needed, remaining });
    }

    let start = frame.len();
    frame
        .resize(start + needed, 0)
        .map_err(|_| FrameError::Overflow { needed, remaining })?;

    let block = &mut frame[start..];
    block[0] = R::TYPE.code();
    block[1..3].copy_from_slice(&(R::PAYLOAD_LEN as u16).to_le_bytes());
    record.encode(&mut block[BLOCK_HEADER_LEN..]);
    Ok(needed)
}

/// One block borrowed from a received frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Block<'a> {
    pub kind: RecordType,
    pub payload: &'a [u8],
}

/// A block decoded into its typed record.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AnyRecord {
    Motor(MotorRecord),
    Velocity(VelocityRecord),
    Gps(GpsRecord),
}

impl AnyRecord {
    pub fn kind(&self) -> RecordType {
        match self {
            AnyRecord::Motor(_) => RecordType::Motor,
            AnyRecord::Velocity(_) => RecordType::Velocity,
            AnyRecord::Gps(_) => RecordType::Gps,
        }
    }
}

impl<'a> Block<'a> {
    pub fn decode(&self) -> Result<AnyRecord, DecodeError> {
        Ok(match self.kind {
            RecordType::Motor => AnyRecord::Motor(MotorRecord::decode(self.payload)?),
            RecordType::Velocity => AnyRecord::Velocity(VelocityRecord::decode(self.payload)?),
            RecordType::Gps => AnyRecord::Gps(GpsRecord::decode(self.payload)?),
        })
    }
}

/// Receiver-side block iterator. Stops after the first error since a frame without
/// delimiters cannot be resynchronised.
pub struct FrameReader<'a> {
    rest: &'a [u8],
    failed: bool,
}

impl<'a> FrameReader<'a> {
    pub fn new(frame: &'a [u8]) -> Self {
        Self { rest: frame, failed: false }
    }

    fn next_block(&mut self) -> Result<Block<'a>, DecodeError> {
        if self.rest.len() < BLOCK_HEADER_LEN {
            return Err(DecodeError::Truncated);
        }
        let code = self.rest[0];
        let kind = RecordType::from_code(code).ok_or(DecodeError::UnknownType(code))?;
        let len = u16::from_le_bytes([self.rest[1], self.rest[2]]) as usize;
        if len != kind.payload_len() {
            return Err(DecodeError::LengthMismatch { code, expected: kind.payload_len(), got: len });
        }
        let body = &self.rest[BLOCK_HEADER_LEN..];
        if body.len() < len {
            return Err(DecodeError::Truncated);
        }
        let (payload, rest) = body.split_at(len);
        self.rest = rest;
        Ok(Block { kind, payload })
    }
}

impl<'a> Iterator for FrameReader<'a> {
    type Item = Result<Block<'a>, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.rest.is_empty() {
            return None;
        }
        let block = self.next_block();
        self.failed = block.is_err();
        Some(block)
    }
}

// ── Little-endian field cursors ───────────────────────────────────────────────

pub(crate) struct WireWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> WireWriter<'a> {
    pub(crate) fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn put(&mut self, bytes: &[u8]) {
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
    }

    pub(crate) fn put_u64(&mut self, v: u64) {
        self.put(&v.to_le_bytes());
    }

    pub(crate) fn put_f32(&mut self, v: f32) {
        self.put(&v.to_le_bytes());
    }

    pub(crate) fn put_i8(&mut self, v: i8) {
        self.put(&v.to_le_bytes());
    }
}

/// Reads fields from a payload whose length was checked up front.
pub(crate) struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub(crate) fn for_record<R: Record>(payload: &'a [u8]) -> Result<Self, DecodeError> {
        if payload.len() != R::PAYLOAD_LEN {
            return Err(DecodeError::LengthMismatch {
                code: R::TYPE.code(),
                expected: R::PAYLOAD_LEN,
                got: payload.len(),
            });
        }
        Ok(Self { buf: payload, pos: 0 })
    }

    fn take<const W: usize>(&mut self) -> [u8; W] {
        let mut out = [0u8; W];
        out.copy_from_slice(&self.buf[self.pos..self.pos + W]);
        self.pos += W;
        out
    }

    pub(crate) fn get_u64(&mut self) -> u64 {
        u64::from_le_bytes(self.take())
    }

    pub(crate) fn get_f32(&mut self) -> f32 {
        f32::from_le_bytes(self.take())
    }

    pub(crate) fn get_i8(&mut self) -> i8 {
        i8::from_le_bytes(self.take())
    }
}
