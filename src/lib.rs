//! Telemetry framing and command intake for the rover controller.
//!
//! Periodic producers push typed records into bounded queues; the assembler drains at most
//! one record per queue each cycle into a TLV frame for the serial link. Operator command
//! bytes arrive through the receive-complete handler and drive the mode dispatcher.
#![cfg_attr(not(test), no_std)]

#[macro_use]
mod fmt;

pub mod config;
pub mod context;
pub mod drivers;
pub mod queue;
pub mod setup;
pub mod state;
pub mod tasks;
