//! `fiducia-types` – shared data model.
//!
//! Geometry primitives, pose/odometry messages, the event envelope routed
//! over the bus, and the [`OdomError`] taxonomy used by every crate.

pub mod geometry;
pub mod odometry;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub use geometry::{Quaternion, Transform3D, Vec3};
pub use odometry::{
    Covariance6, DetectionResult, FIXED_VARIANCE, OdometryEstimate, RigidPose, StampedTransform,
    Twist,
};

/// Unified event wrapper for the in-process event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g., "fiducia-runtime::node"
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    /// Wrap `payload` in a fresh event stamped with the current time.
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data that can be routed over the internal event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    /// A fresh odometry estimate.
    Odometry(OdometryEstimate),
    /// Transform broadcast mirroring an odometry estimate.
    Transform(StampedTransform),
    /// A pipeline cycle produced no output.
    CycleSkipped { reason: String },
}

/// Error type spanning detector failures, frame lookups and plumbing.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OdomError {
    #[error("Detection failed: {0}")]
    DetectionFailed(String),

    #[error("Transform {source_frame} -> {target_frame} unavailable: {reason}")]
    TransformUnavailable {
        target_frame: String,
        source_frame: String,
        reason: String,
    },

    #[error("Degenerate timing between samples (dt = {delta_t} s)")]
    DegenerateTiming { delta_t: f64 },

    #[error("Hardware Fault on {component}: {details}")]
    HardwareFault { component: String, details: String },
}
