//! Re-expression of raw marker poses in the platform frame.
//!
//! A detector reports the marker's pose relative to the camera.  The
//! [`PoseCorrector`] moves it into the platform's footprint frame with the
//! camera mount transform, restamps it with the processing time and then
//! mirrors the x axis.
//!
//! The x mirror is a fixed axis-convention correction for the handedness of
//! the marker frame.  It is unconditional and must not be removed without a
//! calibration review: downstream consumers expect it.

use chrono::{DateTime, Utc};
use fiducia_types::{RigidPose, Transform3D};

/// Moves detected poses into the platform frame.
#[derive(Debug, Clone)]
pub struct PoseCorrector {
    /// Frame the corrected pose is reported in.
    output_frame: String,
}

impl PoseCorrector {
    /// `output_frame` is the bin (target) frame the corrected pose is
    /// reported against.
    pub fn new(output_frame: impl Into<String>) -> Self {
        Self {
            output_frame: output_frame.into(),
        }
    }

    pub fn output_frame(&self) -> &str {
        &self.output_frame
    }

    /// Apply `camera_to_footprint` to `raw`, stamp the result with `now`, and
    /// negate the x translation.
    ///
    /// The stamp of `raw` (capture time) is deliberately discarded.  The
    /// returned orientation is always unit length.
    pub fn correct(
        &self,
        raw: &RigidPose,
        camera_to_footprint: &Transform3D,
        now: DateTime<Utc>,
    ) -> RigidPose {
        let moved = camera_to_footprint.compose(raw.as_transform());
        let mut position = moved.translation;
        position.x = -position.x;
        let orientation = moved.rotation.normalized();
        RigidPose::new(self.output_frame.clone(), now, position, orientation)
    }
}
