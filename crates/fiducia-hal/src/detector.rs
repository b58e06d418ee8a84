//! Fiducial detector collaborator.
//!
//! Detection runs out of process or on another thread; the estimator only
//! sees an async request that resolves to a [`DetectionResult`] or an
//! [`OdomError::DetectionFailed`].  [`detect_with_timeout`] bounds the wait
//! so a hung detector costs one cycle instead of stalling the pipeline.

use std::time::Duration;

use async_trait::async_trait;
use fiducia_types::{DetectionResult, OdomError};
use tracing::debug;

use crate::camera::CameraCapture;

/// A marker detector.
///
/// # Contract
///
/// * `wait_ready` – resolves once the detector can accept requests.
/// * `detect` – returns every marker found in the capture; the pose of the
///   first marker is expressed in the capture's camera frame.
#[async_trait]
pub trait Detector: Send + Sync {
    /// Human readable name used in logs.
    fn name(&self) -> &str;

    /// Wait until the detector is reachable.
    async fn wait_ready(&self) -> Result<(), OdomError> {
        Ok(())
    }

    /// Detect markers in `capture`.
    async fn detect(&self, capture: &CameraCapture) -> Result<DetectionResult, OdomError>;
}

/// Run `detector` on `capture`, giving up after `timeout`.
///
/// Uncalibrated captures are rejected without calling the detector.
pub async fn detect_with_timeout(
    detector: &dyn Detector,
    capture: &CameraCapture,
    timeout: Duration,
) -> Result<DetectionResult, OdomError> {
    if !capture.info.is_calibrated() {
        return Err(OdomError::DetectionFailed(format!(
            "capture from '{}' has no usable calibration",
            capture.info.frame_id
        )));
    }

    match tokio::time::timeout(timeout, detector.detect(capture)).await {
        Ok(result) => {
            if let Ok(detection) = &result {
                debug!(detector = detector.name(), count = detection.count, "detection complete");
            }
            result
        }
        Err(_) => Err(OdomError::DetectionFailed(format!(
            "{} timed out after {} ms",
            detector.name(),
            timeout.as_millis()
        ))),
    }
}
