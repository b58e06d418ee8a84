//! `fiducia-runtime` – drives the odometry pipeline.
//!
//! # Modules
//!
//! - [`node`] – [`FiducialOdometryNode`]: consumes camera captures one at a
//!   time, asks the detector for markers, turns the result into odometry via
//!   [`OdometryAssembler`][fiducia_perception::OdometryAssembler] and
//!   publishes it on the event bus.  [`pump_camera`] feeds it from any
//!   [`Camera`][fiducia_hal::Camera].
//! - [`telemetry`] – [`init_tracing`]: global `tracing` subscriber with an
//!   optional OTLP span exporter.

pub mod node;
pub mod telemetry;

pub use node::{CycleStats, FiducialOdometryNode, NodeConfig, pump_camera};
pub use telemetry::{LogFormat, TracerProviderGuard, init_tracing};
