//! Placeholder data sources used until the real drive / odometry / GNSS stack is wired in.
//!
//! Values mimic a slowly moving robot: random speeds and currents, fixed references and a
//! pose that advances a little every sample.
#[allow(unused_imports)]
use micromath::F32Ext;
use rand_core::RngCore;

use crate::config::CommConfig;
use crate::state::{GpsRecord, MotorRecord, VelocityRecord};
use crate::tasks::source::DataSource;

const CURRENT_REF: f32 = 0.5;
const VELOCITY_REF: f32 = 2.0;
const STEP_M: f32 = 0.1;
const HEADING_STEP_RAD: f32 = 0.05;

/// Turn rate of the simulated pose: one heading step per GPS sample, in rad/s.
fn turn_rate() -> f32 {
    let gps_period_ms = CommConfig::DEFAULT.gps.task.period.as_millis().max(1);
    HEADING_STEP_RAD * 1000.0 / gps_period_ms as f32
}

/// `base + U{0..span-1}`, matching the integer-step noise of the bench rig.
fn noisy(rng: &mut dyn RngCore, base: f32, span: u32) -> f32 {
    base + (rng.next_u32() % span) as f32
}

#[derive(Default)]
pub struct MotorSim;

impl DataSource for MotorSim {
    type Record = MotorRecord;

    fn next_record(&mut self, _previous: Option<&MotorRecord>, entropy: &mut dyn RngCore) -> MotorRecord {
        MotorRecord {
            timestamp: 0,
            current: [
                noisy(entropy, 0.5, 5),
                noisy(entropy, 0.5, 5),
                noisy(entropy, 0.5, 5),
            ],
            current_ref: [CURRENT_REF; 3],
            drive_signal: [1; 3],
        }
    }
}

#[derive(Default)]
pub struct VelocitySim;

impl DataSource for VelocitySim {
    type Record = VelocityRecord;

    fn next_record(
        &mut self,
        _previous: Option<&VelocityRecord>,
        entropy: &mut dyn RngCore,
    ) -> VelocityRecord {
        VelocityRecord {
            timestamp: 0,
            speed: noisy(entropy, 1.0, 10),
            yaw_rate: turn_rate(),
            velocity_ref: [VELOCITY_REF; 3],
        }
    }
}

/// Dead-reckoned pose: fixed step along a heading that turns at a constant rate.
#[derive(Default)]
pub struct GpsSim;

impl DataSource for GpsSim {
    type Record = GpsRecord;

    fn next_record(&mut self, previous: Option<&GpsRecord>, _entropy: &mut dyn RngCore) -> GpsRecord {
        let prev = previous.copied().unwrap_or_default();
        let heading = prev.heading + HEADING_STEP_RAD;
        GpsRecord {
            timestamp: 0,
            x: prev.x + STEP_M * heading.cos(),
            y: prev.y + STEP_M * heading.sin(),
            heading,
        }
    }
}
