//! A 1 ms producer feeding a 120-slot queue that the assembler drains once per 100 ms.
//!
//! Virtual time in 1 ms steps; at each step the assembler (when due) runs before the
//! producer. A producer under a waiting policy that finds its queue full stays parked on the
//! same record, so it misses its following deadlines exactly like a task suspended in push.
use core::cell::Cell;

use embassy_futures::block_on;
use embassy_sync::blocking_mutex::Mutex;
use rand_core::SeedableRng;
use rand_wyrand::WyRand;

use rover_comm::config::OverflowPolicy;
use rover_comm::context::SnapshotCell;
use rover_comm::drivers::sim::MotorSim;
use rover_comm::drivers::tlv::{AnyRecord, FrameReader};
use rover_comm::drivers::transport::{Transport, TransportError};
use rover_comm::queue::{BoundedQueue, QueueStats};
use rover_comm::state::{MotorRecord, Snapshot};
use rover_comm::tasks::assembler::{Assembler, Registry, TxCounters};
use rover_comm::tasks::source::{Producer, Publish};

const CAPACITY: usize = 120;
const ASSEMBLER_PERIOD_MS: u64 = 100;
const HORIZON_MS: u64 = 1000;

#[derive(Default)]
struct Link {
    frames: Vec<Vec<u8>>,
}

impl Transport for Link {
    async fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.frames.push(bytes.to_vec());
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Report {
    first_stall_ms: Option<u64>,
    stalled_ticks: u64,
    /// Records drawn from the source; one per met deadline.
    samples: u64,
    stats: QueueStats,
    sent: Vec<MotorRecord>,
}

fn simulate(policy: OverflowPolicy) -> Report {
    let queue: BoundedQueue<MotorRecord, CAPACITY> = BoundedQueue::new();
    let snapshot: SnapshotCell = Mutex::new(Cell::new(Snapshot::default()));
    let counters = TxCounters::new();

    let mut sources = Registry::new();
    assert!(sources.push(&queue).is_ok());
    let mut assembler = Assembler::new(sources, &snapshot, &counters);
    let mut producer = Producer::new(MotorSim, WyRand::seed_from_u64(42), &queue, policy);
    let mut link = Link::default();

    let mut report = Report::default();
    let mut parked: Option<MotorRecord> = None;

    for now in 1..=HORIZON_MS {
        if now % ASSEMBLER_PERIOD_MS == 0 {
            block_on(assembler.cycle(&mut link));
        }

        let record = match parked.take() {
            Some(record) => record,
            None => {
                report.samples += 1;
                producer.sample(now)
            }
        };
        if let Publish::WouldBlock(record) = producer.try_publish(record) {
            report.first_stall_ms.get_or_insert(now);
            report.stalled_ticks += 1;
            parked = Some(record);
        }
    }

    report.stats = queue.stats();
    for frame in &link.frames {
        for block in FrameReader::new(frame) {
            match block.and_then(|b| b.decode()) {
                Ok(AnyRecord::Motor(rec)) => report.sent.push(rec),
                other => panic!("unexpected block {other:?}"),
            }
        }
    }
    report
}

#[test]
fn blocking_policy_stalls_producer_once_queue_fills() {
    let report = simulate(OverflowPolicy::Block);

    // 120 pushes at 1 ms each, plus the single slot freed at t = 100 ms.
    let stall = report.first_stall_ms.expect("producer never stalled");
    assert!((120..=125).contains(&stall), "first stall at {stall} ms");

    // From then on the producer only advances when the assembler frees a slot.
    assert!(report.stalled_ticks > 850, "stalled for {} ticks", report.stalled_ticks);
    assert!(report.samples < 2 * CAPACITY as u64, "{} samples in {HORIZON_MS} ms", report.samples);
    assert_eq!(report.stats.pushed as usize, CAPACITY + report.sent.len());
    assert_eq!(report.stats.overwritten, 0);
}

#[test]
fn drop_oldest_policy_keeps_producer_on_schedule() {
    let report = simulate(OverflowPolicy::DropOldest);

    assert_eq!(report.first_stall_ms, None);
    assert_eq!(report.samples, HORIZON_MS);

    let s = report.stats;
    assert_eq!(s.pushed as u64, HORIZON_MS);
    assert_eq!(s.popped as usize, report.sent.len());
    assert_eq!(s.pushed - s.popped - s.overwritten, CAPACITY as u32);
    assert!(s.overwritten > 0);

    // Every transmitted sample is at most one queue's worth old.
    for (i, rec) in report.sent.iter().enumerate() {
        let sent_at = (i as u64 + 1) * ASSEMBLER_PERIOD_MS;
        assert!(sent_at - rec.timestamp <= CAPACITY as u64, "sample {i} is stale");
    }
}

#[test]
fn drop_newest_policy_never_waits_but_loses_fresh_samples() {
    let report = simulate(OverflowPolicy::DropNewest);

    assert_eq!(report.first_stall_ms, None);
    let s = report.stats;
    assert_eq!(s.pushed + s.rejected, HORIZON_MS as u32);
    assert_eq!(s.overwritten, 0);
    // FIFO kept: transmitted timestamps strictly increase.
    assert!(report.sent.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
}
