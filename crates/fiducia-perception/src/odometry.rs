//! Odometry assembly: gating, correction, differencing and state.
//!
//! [`OdometryAssembler`] is the single owner of the "last accepted pose".
//! One call to [`OdometryAssembler::assemble`] processes one detection:
//!
//! 1. no markers → `Ok(None)`, nothing changes;
//! 2. look up `camera → footprint` at the latest time, failing the cycle if
//!    the frame graph cannot answer;
//! 3. correct the raw pose ([`PoseCorrector`]);
//! 4. difference against the last accepted pose ([`VelocityEstimator`]);
//! 5. emit an [`OdometryEstimate`] with the fixed covariance model and
//!    remember the corrected pose.
//!
//! Every failure leaves the stored pose untouched, so a skipped cycle is
//! invisible to the next velocity estimate.

use chrono::{DateTime, Utc};
use fiducia_types::{Covariance6, DetectionResult, OdomError, OdometryEstimate, RigidPose};
use tracing::{debug, error};

use crate::correction::PoseCorrector;
use crate::transform::{FrameQuery, LookupTime};
use crate::velocity::VelocityEstimator;

/// Frame names the assembler works with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameNames {
    /// Frame the detector reports poses in.
    pub camera_frame: String,
    /// The platform's ground-projected frame.
    pub footprint_frame: String,
    /// Fixed target frame estimates are reported against.
    pub bin_frame: String,
}

impl Default for FrameNames {
    fn default() -> Self {
        Self {
            camera_frame: "camera_link".to_string(),
            footprint_frame: "footprint".to_string(),
            bin_frame: "bin_link".to_string(),
        }
    }
}

/// Last pose accepted by the assembler.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum EstimatorState {
    /// No estimate has been emitted yet.
    #[default]
    Uninitialized,
    Known(RigidPose),
}

impl EstimatorState {
    /// The pose to difference against.  Before the first estimate this is
    /// the origin at the Unix epoch with identity orientation.
    pub fn previous_pose(&self, frame_id: &str) -> RigidPose {
        match self {
            Self::Uninitialized => RigidPose::origin(frame_id),
            Self::Known(pose) => pose.clone(),
        }
    }

    pub fn is_initialized(&self) -> bool {
        matches!(self, Self::Known(_))
    }
}

/// Turns detections into odometry estimates.
#[derive(Debug)]
pub struct OdometryAssembler {
    frames: FrameNames,
    corrector: PoseCorrector,
    velocity: VelocityEstimator,
    state: EstimatorState,
}

impl OdometryAssembler {
    pub fn new(frames: FrameNames) -> Self {
        Self {
            corrector: PoseCorrector::new(frames.bin_frame.clone()),
            velocity: VelocityEstimator::new(),
            frames,
            state: EstimatorState::Uninitialized,
        }
    }

    pub fn frames(&self) -> &FrameNames {
        &self.frames
    }

    pub fn state(&self) -> &EstimatorState {
        &self.state
    }

    /// Process one detection.
    ///
    /// Returns `Ok(None)` when no marker was detected.
    ///
    /// # Errors
    ///
    /// * [`OdomError::TransformUnavailable`] – the camera → footprint
    ///   transform could not be resolved.
    /// * [`OdomError::DegenerateTiming`] – `now` is not after the previously
    ///   accepted pose.
    ///
    /// The stored pose is only replaced when an estimate is returned.
    pub fn assemble(
        &mut self,
        detection: &DetectionResult,
        frames: &dyn FrameQuery,
        now: DateTime<Utc>,
    ) -> Result<Option<OdometryEstimate>, OdomError> {
        let Some(raw) = detection.primary() else {
            debug!("no markers detected");
            return Ok(None);
        };

        let camera_to_footprint = frames.lookup(
            &self.frames.footprint_frame,
            &self.frames.camera_frame,
            LookupTime::Latest,
        )?;

        let corrected = self.corrector.correct(raw, &camera_to_footprint, now);
        let previous = self.state.previous_pose(&self.frames.bin_frame);

        let delta_t = corrected.seconds_since(&previous);
        if delta_t <= 0.0 {
            error!(delta_t, "non-increasing pose stamps; dropping sample");
            return Err(OdomError::DegenerateTiming { delta_t });
        }

        let twist = self.velocity.estimate(&previous, &corrected);

        let estimate = OdometryEstimate {
            frame_id: self.frames.bin_frame.clone(),
            child_frame_id: self.frames.footprint_frame.clone(),
            stamp: corrected.stamp,
            pose: corrected.clone(),
            pose_covariance: Covariance6::fixed(),
            twist,
            twist_covariance: Covariance6::fixed(),
        };

        self.state = EstimatorState::Known(corrected);
        Ok(Some(estimate))
    }
}
