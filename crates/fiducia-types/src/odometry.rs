//! Pose, twist and odometry message types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geometry::{Quaternion, Transform3D, Vec3};

/// Diagonal variance used for every entry of the fixed pose and twist
/// covariance models.
pub const FIXED_VARIANCE: f64 = 5e-3;

/// A timestamped position + orientation expressed in a named frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RigidPose {
    pub frame_id: String,
    pub stamp: DateTime<Utc>,
    pub position: Vec3,
    pub orientation: Quaternion,
}

impl RigidPose {
    pub fn new(
        frame_id: impl Into<String>,
        stamp: DateTime<Utc>,
        position: Vec3,
        orientation: Quaternion,
    ) -> Self {
        Self {
            frame_id: frame_id.into(),
            stamp,
            position,
            orientation,
        }
    }

    /// Origin pose at the Unix epoch with identity orientation.
    ///
    /// Stands in as the "previous" sample before any pose has been accepted.
    pub fn origin(frame_id: impl Into<String>) -> Self {
        Self::new(
            frame_id,
            DateTime::<Utc>::UNIX_EPOCH,
            Vec3::zero(),
            Quaternion::identity(),
        )
    }

    /// View the pose as the transform from its frame to the posed body.
    pub fn as_transform(&self) -> Transform3D {
        Transform3D::new(self.position, self.orientation)
    }

    /// Seconds elapsed from `earlier` to `self`.  Negative when `self` is
    /// older.
    pub fn seconds_since(&self, earlier: &RigidPose) -> f64 {
        let delta = self.stamp - earlier.stamp;
        match delta.num_nanoseconds() {
            Some(ns) => ns as f64 * 1e-9,
            None => delta.num_milliseconds() as f64 * 1e-3,
        }
    }
}

/// Linear and angular velocity in the platform frame.
///
/// `angular` holds roll, pitch and yaw rates in its x, y and z components.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Twist {
    /// Metres per second.
    pub linear: Vec3,
    /// Radians per second.
    pub angular: Vec3,
}

/// Row-major 6×6 covariance over `(x, y, z, roll, pitch, yaw)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Covariance6(pub [[f64; 6]; 6]);

impl Covariance6 {
    /// A diagonal matrix with `variance` on every diagonal entry.
    pub fn diagonal(variance: f64) -> Self {
        let mut m = [[0.0; 6]; 6];
        for (i, row) in m.iter_mut().enumerate() {
            row[i] = variance;
        }
        Self(m)
    }

    /// The static uncertainty model attached to every fiducial estimate.
    pub fn fixed() -> Self {
        Self::diagonal(FIXED_VARIANCE)
    }

    /// Flatten to the 36-element row-major layout used by odometry messages.
    pub fn to_row_major(&self) -> Vec<f64> {
        self.0.iter().flat_map(|row| row.iter().copied()).collect()
    }
}

/// Outcome of one detector invocation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DetectionResult {
    /// Number of markers recognised in the image.
    pub count: u32,
    /// Identifiers of the recognised markers, in detection order.
    pub marker_ids: Vec<u32>,
    /// Pose of the primary (first) marker relative to the camera frame.
    /// Present whenever `count > 0`.
    pub pose: Option<RigidPose>,
}

impl DetectionResult {
    /// A result with no markers.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A single-marker result.
    pub fn single(marker_id: u32, pose: RigidPose) -> Self {
        Self {
            count: 1,
            marker_ids: vec![marker_id],
            pose: Some(pose),
        }
    }

    /// The primary pose if at least one marker was found.
    pub fn primary(&self) -> Option<&RigidPose> {
        if self.count == 0 {
            return None;
        }
        self.pose.as_ref()
    }
}

/// A rigid transform between two named frames at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StampedTransform {
    pub frame_id: String,
    pub child_frame_id: String,
    pub stamp: DateTime<Utc>,
    pub transform: Transform3D,
}

/// A complete odometry estimate: pose, velocity and their uncertainty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OdometryEstimate {
    /// Frame the pose is reported in (the bin/target frame).
    pub frame_id: String,
    /// Frame of the moving body (the platform footprint).
    pub child_frame_id: String,
    pub stamp: DateTime<Utc>,
    pub pose: RigidPose,
    pub pose_covariance: Covariance6,
    pub twist: Twist,
    pub twist_covariance: Covariance6,
}

impl OdometryEstimate {
    /// Mirror of this estimate as a `frame_id -> child_frame_id` transform.
    pub fn to_transform(&self) -> StampedTransform {
        StampedTransform {
            frame_id: self.frame_id.clone(),
            child_frame_id: self.child_frame_id.clone(),
            stamp: self.stamp,
            transform: self.pose.as_transform(),
        }
    }
}
