//! Startup wiring: validate the configuration, register sources in order and build every
//! task body around the shared context. Spawning is left to the executor owner.
use rand_core::SeedableRng;
use rand_wyrand::WyRand;

use crate::config::{CommConfig, ConfigError, COMMAND_QUEUE_DEPTH, GPS_QUEUE_DEPTH, MOTOR_QUEUE_DEPTH, VELOCITY_QUEUE_DEPTH};
use crate::context::CommContext;
use crate::drivers::sim::{GpsSim, MotorSim, VelocitySim};
use crate::drivers::tlv::{Record, RecordType};
use crate::state::{GpsRecord, MotorRecord, VelocityRecord};
use crate::tasks::assembler::{Assembler, Registry};
use crate::tasks::dispatcher::Dispatcher;
use crate::tasks::source::Producer;

pub type MotorProducer<'a> = Producer<'a, MotorSim, WyRand, MOTOR_QUEUE_DEPTH>;
pub type VelocityProducer<'a> = Producer<'a, VelocitySim, WyRand, VELOCITY_QUEUE_DEPTH>;
pub type GpsProducer<'a> = Producer<'a, GpsSim, WyRand, GPS_QUEUE_DEPTH>;

/// Task bodies ready to spawn.
pub struct Wiring<'a> {
    pub motor: MotorProducer<'a>,
    pub velocity: VelocityProducer<'a>,
    pub gps: GpsProducer<'a>,
    pub assembler: Assembler<'a>,
    pub dispatcher: Dispatcher<'a, COMMAND_QUEUE_DEPTH>,
}

fn entropy_for<R: Record>(seed: u64) -> WyRand {
    // Distinct stream per source so adding one source does not reshuffle the others.
    WyRand::seed_from_u64(seed ^ ((R::TYPE.code() as u64) << 56))
}

pub fn registry<'a>(ctx: &'a CommContext, config: &CommConfig) -> Registry<'a> {
    let mut sources = Registry::new();
    for kind in config.registration_order {
        // Capacity equals the number of record types and `validate` forbids duplicates.
        let _ = sources.push(ctx.frame_source(kind));
    }
    sources
}

/// Build every task body. An invalid configuration is the one fatal startup error.
pub fn wire<'a>(ctx: &'a CommContext, config: &CommConfig) -> Result<Wiring<'a>, ConfigError> {
    config.validate()?;

    let seed = config.sim_seed;
    let wiring = Wiring {
        motor: Producer::new(MotorSim, entropy_for::<MotorRecord>(seed), &ctx.motor, config.motor.policy),
        velocity: Producer::new(
            VelocitySim,
            entropy_for::<VelocityRecord>(seed),
            &ctx.velocity,
            config.velocity.policy,
        ),
        gps: Producer::new(GpsSim, entropy_for::<GpsRecord>(seed), &ctx.gps, config.gps.policy),
        assembler: Assembler::new(registry(ctx, config), &ctx.snapshot, &ctx.tx),
        dispatcher: Dispatcher::new(&ctx.commands, &ctx.mode),
    };

    for kind in RecordType::ALL {
        let src = config.source(kind);
        info!(
            "{:?}: every {} ms, {:?}, {:?} priority",
            kind,
            src.task.period.as_millis(),
            src.policy,
            src.task.priority
        );
    }
    info!("frame order {:?}, tx every {} ms", config.registration_order, config.assembler.period.as_millis());
    Ok(wiring)
}
