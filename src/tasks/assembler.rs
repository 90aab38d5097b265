use core::sync::atomic::{AtomicU32, Ordering};

use embassy_time::{Duration, Ticker};

use crate::config::MAX_SOURCES;
use crate::context::SnapshotCell;
use crate::drivers::tlv::{append_block, FrameBuffer, FrameError, Record, RecordType, BLOCK_HEADER_LEN};
use crate::drivers::transport::{Transport, TransportError};
use crate::queue::BoundedQueue;
use crate::state::Snapshot;

/// A queue the assembler can drain one record at a time into a frame.
pub trait FrameSource {
    fn kind(&self) -> RecordType;

    /// Pop at most one record and append it as a block. `Ok(false)` means the queue was
    /// empty. On overflow nothing is popped.
    fn poll_into(&self, frame: &mut FrameBuffer, snapshot: &mut Snapshot) -> Result<bool, FrameError>;
}

impl<R: Record, const N: usize> FrameSource for BoundedQueue<R, N> {
    fn kind(&self) -> RecordType {
        R::TYPE
    }

    fn poll_into(&self, frame: &mut FrameBuffer, snapshot: &mut Snapshot) -> Result<bool, FrameError> {
        let needed = BLOCK_HEADER_LEN + R::PAYLOAD_LEN;
        let remaining = frame.capacity() - frame.len();
        if needed > remaining {
            return Err(FrameError::Overflow { needed, remaining });
        }
        let Some(record) = self.try_pop() else {
            return Ok(false);
        };
        append_block(frame, &record)?;
        record.fold_into(snapshot);
        Ok(true)
    }
}

/// Sources in registration order; block order inside every frame.
pub type Registry<'a> = heapless::Vec<&'a dyn FrameSource, MAX_SOURCES>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TxStats {
    pub cycles: u32,
    pub frames_sent: u32,
    pub silent_cycles: u32,
    pub send_failures: u32,
    pub blocks_sent: u32,
}

/// Transmit-side counters, shared so the datalog can report them.
pub struct TxCounters {
    cycles: AtomicU32,
    frames_sent: AtomicU32,
    silent_cycles: AtomicU32,
    send_failures: AtomicU32,
    blocks_sent: AtomicU32,
}

impl TxCounters {
    pub const fn new() -> Self {
        Self {
            cycles: AtomicU32::new(0),
            frames_sent: AtomicU32::new(0),
            silent_cycles: AtomicU32::new(0),
            send_failures: AtomicU32::new(0),
            blocks_sent: AtomicU32::new(0),
        }
    }

    fn record(&self, outcome: &CycleOutcome) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        match *outcome {
            CycleOutcome::Silent => {
                self.silent_cycles.fetch_add(1, Ordering::Relaxed);
            }
            CycleOutcome::Sent { blocks, .. } => {
                self.frames_sent.fetch_add(1, Ordering::Relaxed);
                self.blocks_sent.fetch_add(blocks as u32, Ordering::Relaxed);
            }
            CycleOutcome::SendFailed { .. } => {
                self.send_failures.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn stats(&self) -> TxStats {
        TxStats {
            cycles: self.cycles.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            silent_cycles: self.silent_cycles.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            blocks_sent: self.blocks_sent.load(Ordering::Relaxed),
        }
    }
}

impl Default for TxCounters {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CycleOutcome {
    /// Every source was empty; nothing was sent.
    Silent,
    Sent { blocks: usize, bytes: usize },
    /// The frame was dropped. Records in it are lost; the next cycle starts fresh.
    SendFailed { blocks: usize, error: TransportError },
}

/// Frame assembler / transmitter.
///
/// Each cycle takes at most one record from every registered source, in registration
/// order, so a busy source cannot starve the others within a frame.
pub struct Assembler<'a> {
    sources: Registry<'a>,
    snapshot: &'a SnapshotCell,
    counters: &'a TxCounters,
}

impl<'a> Assembler<'a> {
    pub fn new(sources: Registry<'a>, snapshot: &'a SnapshotCell, counters: &'a TxCounters) -> Self {
        Self { sources, snapshot, counters }
    }

    pub fn registration_order(&self) -> impl Iterator<Item = RecordType> + '_ {
        self.sources.iter().map(|s| s.kind())
    }

    /// Poll every source once into `frame`.
    ///
    /// Returns the number of blocks appended and the stored snapshot with those records
    /// folded in. The shared snapshot itself is left untouched.
    pub fn assemble(&self, frame: &mut FrameBuffer) -> (usize, Snapshot) {
        let mut snapshot = self.snapshot.lock(|c| c.get());
        let mut blocks = 0;
        for source in self.sources.iter() {
            match source.poll_into(frame, &mut snapshot) {
                Ok(true) => blocks += 1,
                Ok(false) => {}
                Err(e) => warn!("{:?}: block skipped: {:?}", source.kind(), e),
            }
        }
        (blocks, snapshot)
    }

    /// One assembler cycle: build a frame and send it if it is non-empty.
    ///
    /// The snapshot only advances once the frame has actually gone out.
    pub async fn cycle<T: Transport>(&mut self, transport: &mut T) -> CycleOutcome {
        let mut frame = FrameBuffer::new();
        let (blocks, snapshot) = self.assemble(&mut frame);

        let outcome = if frame.is_empty() {
            CycleOutcome::Silent
        } else {
            match transport.send(&frame).await {
                Ok(()) => {
                    self.snapshot.lock(|c| c.set(snapshot));
                    CycleOutcome::Sent { blocks, bytes: frame.len() }
                }
                Err(error) => {
                    warn!("frame of {} blocks dropped: {:?}", blocks, error);
                    CycleOutcome::SendFailed { blocks, error }
                }
            }
        };
        self.counters.record(&outcome);
        outcome
    }

    pub async fn run<T: Transport>(mut self, mut transport: T, period: Duration) -> ! {
        let mut ticker = Ticker::every(period);
        loop {
            ticker.next().await;
            if let CycleOutcome::Sent { blocks, bytes } = self.cycle(&mut transport).await {
                trace!("frame sent: {} blocks, {} bytes", blocks, bytes);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::tlv::{AnyRecord, FrameReader, MAX_FRAME_LEN};
    use crate::state::{GpsRecord, MotorRecord, VelocityRecord};
    use core::cell::Cell;
    use embassy_futures::block_on;
    use embassy_sync::blocking_mutex::Mutex;

    #[derive(Default)]
    struct MockLink {
        frames: Vec<Vec<u8>>,
        calls: usize,
        fail: bool,
    }

    impl Transport for MockLink {
        async fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
            self.calls += 1;
            if self.fail {
                return Err(TransportError::Io);
            }
            self.frames.push(bytes.to_vec());
            Ok(())
        }
    }

    struct Rig {
        motor: BoundedQueue<MotorRecord, 4>,
        velocity: BoundedQueue<VelocityRecord, 4>,
        gps: BoundedQueue<GpsRecord, 4>,
        snapshot: SnapshotCell,
        counters: TxCounters,
    }

    impl Rig {
        fn new() -> Self {
            Self {
                motor: BoundedQueue::new(),
                velocity: BoundedQueue::new(),
                gps: BoundedQueue::new(),
                snapshot: Mutex::new(Cell::new(Snapshot::default())),
                counters: TxCounters::new(),
            }
        }

        fn assembler(&self, order: [RecordType; 3]) -> Assembler<'_> {
            let mut sources = Registry::new();
            for kind in order {
                let source: &dyn FrameSource = match kind {
                    RecordType::Motor => &self.motor,
                    RecordType::Velocity => &self.velocity,
                    RecordType::Gps => &self.gps,
                };
                assert!(sources.push(source).is_ok());
            }
            Assembler::new(sources, &self.snapshot, &self.counters)
        }
    }

    fn kinds(frame: &[u8]) -> Vec<RecordType> {
        FrameReader::new(frame).map(|b| b.unwrap().kind).collect()
    }

    #[test]
    fn empty_sources_send_nothing() {
        let rig = Rig::new();
        let mut asm = rig.assembler(RecordType::ALL);
        let mut link = MockLink::default();
        assert_eq!(block_on(asm.cycle(&mut link)), CycleOutcome::Silent);
        assert_eq!(link.calls, 0);
        assert_eq!(rig.counters.stats().silent_cycles, 1);
    }

    #[test]
    fn one_record_per_source_per_cycle() {
        let rig = Rig::new();
        for t in 0..3 {
            rig.motor.try_push(MotorRecord { timestamp: t, ..Default::default() }).unwrap();
        }
        let mut asm = rig.assembler(RecordType::ALL);
        let mut link = MockLink::default();

        let outcome = block_on(asm.cycle(&mut link));
        assert_eq!(outcome, CycleOutcome::Sent { blocks: 1, bytes: RecordType::Motor.block_len() });
        assert_eq!(rig.motor.len(), 2);

        let block = FrameReader::new(&link.frames[0]).next().unwrap().unwrap();
        assert_eq!(block.decode(), Ok(AnyRecord::Motor(MotorRecord { timestamp: 0, ..Default::default() })));
    }

    #[test]
    fn blocks_follow_registration_order() {
        let rig = Rig::new();
        let order = [RecordType::Gps, RecordType::Motor, RecordType::Velocity];
        let mut asm = rig.assembler(order);
        let mut link = MockLink::default();

        // Only velocity has data in the first cycle.
        rig.velocity.try_push(VelocityRecord::default()).unwrap();
        block_on(asm.cycle(&mut link));

        rig.motor.try_push(MotorRecord::default()).unwrap();
        rig.velocity.try_push(VelocityRecord::default()).unwrap();
        rig.gps.try_push(GpsRecord::default()).unwrap();
        let outcome = block_on(asm.cycle(&mut link));
        assert_eq!(outcome, CycleOutcome::Sent { blocks: 3, bytes: MAX_FRAME_LEN });

        assert_eq!(kinds(&link.frames[0]), [RecordType::Velocity]);
        assert_eq!(kinds(&link.frames[1]), order);
        assert_eq!(asm.registration_order().collect::<Vec<_>>(), order);
    }

    #[test]
    fn send_failure_drops_frame_and_continues() {
        let rig = Rig::new();
        rig.gps.try_push(GpsRecord { x: 1.0, ..Default::default() }).unwrap();
        rig.gps.try_push(GpsRecord { x: 2.0, ..Default::default() }).unwrap();
        let mut asm = rig.assembler(RecordType::ALL);
        let mut link = MockLink { fail: true, ..Default::default() };

        let outcome = block_on(asm.cycle(&mut link));
        assert_eq!(outcome, CycleOutcome::SendFailed { blocks: 1, error: TransportError::Io });
        assert_eq!(rig.gps.len(), 1);
        // Nothing reached the link, so the summary still shows the startup values.
        assert_eq!(rig.snapshot.lock(|c| c.get()).pos_x, 0.0);

        link.fail = false;
        block_on(asm.cycle(&mut link));
        let stats = rig.counters.stats();
        assert_eq!((stats.cycles, stats.send_failures, stats.frames_sent), (2, 1, 1));
        assert_eq!(rig.snapshot.lock(|c| c.get()).pos_x, 2.0);
    }
}
