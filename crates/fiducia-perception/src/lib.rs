//! `fiducia-perception` – marker poses to odometry.
//!
//! # Modules
//!
//! - [`transform`] – [`TfEngine`][transform::TfEngine]: graph of named
//!   reference frames answering [`FrameQuery`][transform::FrameQuery]
//!   lookups by composing the transforms along the path between two frames.
//! - [`correction`] – [`PoseCorrector`][correction::PoseCorrector]: moves a
//!   camera-relative marker pose into the platform frame.
//! - [`velocity`] – [`VelocityEstimator`][velocity::VelocityEstimator]:
//!   linear and angular velocity from two timestamped poses.
//! - [`odometry`] – [`OdometryAssembler`][odometry::OdometryAssembler]:
//!   gates detections, owns the last accepted pose and emits
//!   [`OdometryEstimate`][fiducia_types::OdometryEstimate]s.

pub mod correction;
pub mod odometry;
pub mod transform;
pub mod velocity;

pub use correction::PoseCorrector;
pub use odometry::{EstimatorState, FrameNames, OdometryAssembler};
pub use transform::{FrameQuery, LookupTime, SharedTfEngine, TfEngine};
pub use velocity::VelocityEstimator;
