//! In-process simulated devices for CI and headless runs.
//!
//! * [`SimCamera`] – blank frames with a fixed, valid calibration.
//! * [`ScriptedDetector`] – replays a queue of canned detector responses.
//! * [`SimMarkerDetector`] – synthesises a marker moving at constant
//!   velocity in front of the camera, with periodic misses.
//!
//! # Example
//!
//! ```rust
//! use fiducia_hal::camera::Camera;
//! use fiducia_hal::sim::SimCamera;
//!
//! let mut camera = SimCamera::new("front_rgb", "camera_link");
//! let capture = camera.capture().expect("sim capture must succeed");
//! assert!(capture.info.is_calibrated());
//! ```

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fiducia_types::{DetectionResult, OdomError, Quaternion, RigidPose, Vec3};

use crate::camera::{Camera, CameraCapture, CameraFrame, CameraInfo};
use crate::detector::Detector;

// ────────────────────────────────────────────────────────────────────────────
// Stub camera
// ────────────────────────────────────────────────────────────────────────────

/// A simulated camera that returns a blank (all-zero) 4×4 greyscale frame.
/// Always succeeds.
pub struct SimCamera {
    id: String,
    info: CameraInfo,
}

impl SimCamera {
    /// Create a new simulated camera with the given identifier whose frames
    /// are tagged with `frame_id`.
    pub fn new(id: impl Into<String>, frame_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            info: CameraInfo {
                frame_id: frame_id.into(),
                width: 4,
                height: 4,
                fx: 2.0,
                fy: 2.0,
                cx: 2.0,
                cy: 2.0,
                distortion: vec![0.0; 5],
            },
        }
    }
}

impl Camera for SimCamera {
    fn id(&self) -> &str {
        &self.id
    }

    fn capture(&mut self) -> Result<CameraCapture, OdomError> {
        Ok(CameraCapture {
            stamp: Utc::now(),
            image: CameraFrame {
                width: self.info.width,
                height: self.info.height,
                data: vec![0u8; (self.info.width * self.info.height) as usize],
            },
            info: self.info.clone(),
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Scripted detector
// ────────────────────────────────────────────────────────────────────────────

/// Replays canned responses in order; returns empty detections once the
/// script runs out.
#[derive(Default)]
pub struct ScriptedDetector {
    script: Mutex<VecDeque<Result<DetectionResult, OdomError>>>,
    latency: Duration,
    calls: AtomicU64,
}

impl ScriptedDetector {
    pub fn new(script: impl IntoIterator<Item = Result<DetectionResult, OdomError>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            latency: Duration::ZERO,
            calls: AtomicU64::new(0),
        }
    }

    /// Delay every response by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Queue another response.
    pub fn push(&self, response: Result<DetectionResult, OdomError>) {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(response);
    }

    /// Number of `detect` calls served so far.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Detector for ScriptedDetector {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn detect(&self, _capture: &CameraCapture) -> Result<DetectionResult, OdomError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let next = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        next.unwrap_or_else(|| Ok(DetectionResult::empty()))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Moving-marker detector
// ────────────────────────────────────────────────────────────────────────────

/// Synthesises a single marker whose camera-relative pose moves at a
/// constant linear velocity and yaw rate from `start`.
///
/// Every `miss_every`-th request reports no markers (0 disables misses).
pub struct SimMarkerDetector {
    marker_id: u32,
    origin_time: DateTime<Utc>,
    start: Vec3,
    velocity: Vec3,
    yaw_rate: f64,
    miss_every: u64,
    requests: AtomicU64,
}

impl SimMarkerDetector {
    pub fn new(marker_id: u32, start: Vec3, velocity: Vec3, yaw_rate: f64) -> Self {
        Self {
            marker_id,
            origin_time: Utc::now(),
            start,
            velocity,
            yaw_rate,
            miss_every: 0,
            requests: AtomicU64::new(0),
        }
    }

    pub fn with_miss_every(mut self, miss_every: u64) -> Self {
        self.miss_every = miss_every;
        self
    }

    /// Marker pose at `stamp`, relative to `frame_id`.
    pub fn pose_at(&self, frame_id: &str, stamp: DateTime<Utc>) -> RigidPose {
        let t = (stamp - self.origin_time).num_microseconds().unwrap_or(0) as f64 * 1e-6;
        RigidPose::new(
            frame_id,
            stamp,
            self.start.add(self.velocity.scale(t)),
            Quaternion::from_rpy(0.0, 0.0, self.yaw_rate * t),
        )
    }
}

#[async_trait]
impl Detector for SimMarkerDetector {
    fn name(&self) -> &str {
        "sim-marker"
    }

    async fn detect(&self, capture: &CameraCapture) -> Result<DetectionResult, OdomError> {
        let n = self.requests.fetch_add(1, Ordering::SeqCst) + 1;
        if self.miss_every > 0 && n % self.miss_every == 0 {
            return Ok(DetectionResult::empty());
        }
        Ok(DetectionResult::single(
            self.marker_id,
            self.pose_at(&capture.info.frame_id, capture.stamp),
        ))
    }
}
