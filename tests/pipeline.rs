//! Producers, queues and assembler wired from the default configuration.
use embassy_futures::block_on;

use rover_comm::config::CommConfig;
use rover_comm::context::CommContext;
use rover_comm::drivers::tlv::{AnyRecord, FrameReader, RecordType};
use rover_comm::drivers::transport::{Transport, TransportError};
use rover_comm::setup::wire;
use rover_comm::tasks::assembler::CycleOutcome;
use rover_comm::tasks::source::Publish;

#[derive(Default)]
struct Capture {
    frames: Vec<Vec<u8>>,
}

impl Transport for Capture {
    async fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.frames.push(bytes.to_vec());
        Ok(())
    }
}

fn decode(frame: &[u8]) -> Vec<AnyRecord> {
    FrameReader::new(frame).map(|b| b.and_then(|b| b.decode()).unwrap()).collect()
}

#[test]
fn transmitted_records_match_what_producers_published() {
    let ctx = CommContext::new();
    let mut wiring = wire(&ctx, &CommConfig::DEFAULT).unwrap();
    let mut link = Capture::default();

    let motor = wiring.motor.sample(10);
    let velocity = wiring.velocity.sample(20);
    let gps = wiring.gps.sample(30);
    assert_eq!(wiring.motor.try_publish(motor), Publish::Enqueued);
    assert_eq!(wiring.velocity.try_publish(velocity), Publish::Enqueued);
    assert_eq!(wiring.gps.try_publish(gps), Publish::Enqueued);

    assert!(matches!(block_on(wiring.assembler.cycle(&mut link)), CycleOutcome::Sent { blocks: 3, .. }));
    assert_eq!(
        decode(&link.frames[0]),
        [AnyRecord::Motor(motor), AnyRecord::Velocity(velocity), AnyRecord::Gps(gps)]
    );

    let snap = ctx.snapshot();
    assert_eq!((snap.speed, snap.pos_x, snap.heading), (velocity.speed, gps.x, gps.heading));
}

#[test]
fn silent_cycle_then_partial_frame_keeps_order() {
    let ctx = CommContext::new();
    let mut cfg = CommConfig::DEFAULT;
    cfg.registration_order = [RecordType::Gps, RecordType::Velocity, RecordType::Motor];
    let mut wiring = wire(&ctx, &cfg).unwrap();
    let mut link = Capture::default();

    assert_eq!(block_on(wiring.assembler.cycle(&mut link)), CycleOutcome::Silent);
    assert!(link.frames.is_empty());

    for t in 0..3 {
        let m = wiring.motor.sample(t);
        wiring.motor.try_publish(m);
    }
    let g = wiring.gps.sample(5);
    wiring.gps.try_publish(g);

    block_on(wiring.assembler.cycle(&mut link));
    let kinds: Vec<RecordType> = decode(&link.frames[0]).iter().map(|r| r.kind()).collect();
    assert_eq!(kinds, [RecordType::Gps, RecordType::Motor]);
    assert_eq!(ctx.motor.len(), 2);

    block_on(wiring.assembler.cycle(&mut link));
    block_on(wiring.assembler.cycle(&mut link));
    assert_eq!(link.frames.len(), 3);
    assert!(ctx.motor.is_empty());
    assert_eq!(block_on(wiring.assembler.cycle(&mut link)), CycleOutcome::Silent);
    assert_eq!(ctx.tx.stats().silent_cycles, 2);
}
