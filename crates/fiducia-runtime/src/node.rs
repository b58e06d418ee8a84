//! [`FiducialOdometryNode`] – the sequential estimation pipeline.
//!
//! Each capture drives exactly one cycle:
//!
//! 1. **Detect** – hand the image + calibration to the [`Detector`] and wait
//!    (bounded by [`NodeConfig::detection_timeout`]).
//! 2. **Assemble** – gate, correct and difference via the
//!    [`OdometryAssembler`], which owns the last accepted pose.
//! 3. **Publish** – the estimate goes to [`Topic::Odometry`] and its
//!    transform mirror to [`Topic::Transforms`].
//!
//! Cycles never overlap: [`FiducialOdometryNode::run`] is the single
//! consumer of a bounded capture queue and awaits each cycle before taking
//! the next capture, which keeps pose stamps strictly increasing.  Every
//! failure is reported on [`Topic::SystemAlerts`] and skips the cycle; none
//! stops the node.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use fiducia_hal::sim::{SimCamera, SimMarkerDetector};
//! use fiducia_middleware::EventBus;
//! use fiducia_perception::SharedTfEngine;
//! use fiducia_runtime::node::{FiducialOdometryNode, NodeConfig, pump_camera};
//! use fiducia_types::Vec3;
//!
//! # async fn demo() {
//! let start = Vec3::new(0.0, 0.0, 2.0);
//! let detector = Arc::new(SimMarkerDetector::new(0, start, Vec3::zero(), 0.0));
//! let node = FiducialOdometryNode::new(
//!     NodeConfig::default(),
//!     detector,
//!     SharedTfEngine::default(),
//!     EventBus::default(),
//! );
//! let (tx, rx) = tokio::sync::mpsc::channel(10);
//! let camera = SimCamera::new("front", "camera_link");
//! tokio::spawn(pump_camera(camera, std::time::Duration::from_millis(100), tx));
//! let stats = node.run(rx).await;
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use fiducia_hal::{Camera, CameraCapture, Detector, detect_with_timeout};
use fiducia_middleware::{EventBus, Topic};
use fiducia_perception::{EstimatorState, FrameNames, FrameQuery, OdometryAssembler};
use fiducia_types::{Event, EventPayload, OdomError, OdometryEstimate};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

const EVENT_SOURCE: &str = "fiducia-runtime::node";

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration bundle for [`FiducialOdometryNode`].
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub frames: FrameNames,
    /// Odometry frame name; reported in logs, not used by the estimator.
    pub odometry_frame: String,
    /// Longest wait for a single detection.
    pub detection_timeout: Duration,
    /// Pause after a failed transform lookup before taking the next capture.
    pub transform_backoff: Duration,
    /// Delay after the detector becomes ready, letting the frame graph fill.
    pub startup_settle: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            frames: FrameNames::default(),
            odometry_frame: "odom".to_string(),
            detection_timeout: Duration::from_secs(5),
            transform_backoff: Duration::from_secs(1),
            startup_settle: Duration::from_secs(2),
        }
    }
}

/// Per-outcome cycle counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleStats {
    pub emitted: u64,
    pub no_detections: u64,
    pub detection_failures: u64,
    pub transform_failures: u64,
    pub timing_rejections: u64,
}

impl CycleStats {
    pub fn cycles(&self) -> u64 {
        self.emitted
            + self.no_detections
            + self.detection_failures
            + self.transform_failures
            + self.timing_rejections
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// FiducialOdometryNode
// ─────────────────────────────────────────────────────────────────────────────

/// Drives detect → assemble → publish for one camera.
pub struct FiducialOdometryNode {
    config: NodeConfig,
    detector: Arc<dyn Detector>,
    frames: Box<dyn FrameQuery + Send + Sync>,
    bus: EventBus,
    assembler: OdometryAssembler,
    stats: CycleStats,
}

impl FiducialOdometryNode {
    pub fn new(
        config: NodeConfig,
        detector: Arc<dyn Detector>,
        frames: impl FrameQuery + Send + Sync + 'static,
        bus: EventBus,
    ) -> Self {
        Self {
            assembler: OdometryAssembler::new(config.frames.clone()),
            config,
            detector,
            frames: Box::new(frames),
            bus,
            stats: CycleStats::default(),
        }
    }

    pub fn stats(&self) -> CycleStats {
        self.stats
    }

    pub fn state(&self) -> &EstimatorState {
        self.assembler.state()
    }

    /// Wait for the detector, then give the frame graph time to fill.
    pub async fn start(&self) -> Result<(), OdomError> {
        info!(detector = self.detector.name(), "waiting for detector");
        self.detector.wait_ready().await?;
        info!(detector = self.detector.name(), "detector ready");
        if !self.config.startup_settle.is_zero() {
            tokio::time::sleep(self.config.startup_settle).await;
        }
        Ok(())
    }

    /// Run one full cycle for `capture`.
    ///
    /// Returns the emitted estimate, `Ok(None)` when no marker was seen, or
    /// the reason the cycle was skipped.  The stored pose only changes when
    /// an estimate is returned.
    #[instrument(skip_all, fields(stamp = %capture.stamp))]
    pub async fn process(
        &mut self,
        capture: &CameraCapture,
    ) -> Result<Option<OdometryEstimate>, OdomError> {
        let detection = match detect_with_timeout(
            self.detector.as_ref(),
            capture,
            self.config.detection_timeout,
        )
        .await
        {
            Ok(detection) => detection,
            Err(e) => {
                warn!(error = %e, "fiducial detection failed");
                self.stats.detection_failures += 1;
                self.alert(&e);
                return Err(e);
            }
        };

        match self
            .assembler
            .assemble(&detection, self.frames.as_ref(), Utc::now())
        {
            Ok(Some(estimate)) => {
                self.stats.emitted += 1;
                self.publish(&estimate);
                debug!(
                    x = estimate.pose.position.x,
                    y = estimate.pose.position.y,
                    vx = estimate.twist.linear.x,
                    wz = estimate.twist.angular.z,
                    "odometry emitted"
                );
                Ok(Some(estimate))
            }
            Ok(None) => {
                self.stats.no_detections += 1;
                Ok(None)
            }
            Err(e @ OdomError::TransformUnavailable { .. }) => {
                let backoff_ms = self.config.transform_backoff.as_millis() as u64;
                warn!(error = %e, backoff_ms, "skipping cycle");
                self.stats.transform_failures += 1;
                self.alert(&e);
                if !self.config.transform_backoff.is_zero() {
                    tokio::time::sleep(self.config.transform_backoff).await;
                }
                Err(e)
            }
            Err(e) => {
                self.stats.timing_rejections += 1;
                self.alert(&e);
                Err(e)
            }
        }
    }

    /// Consume captures until the sender side closes, then return the cycle
    /// counters.
    pub async fn run(mut self, mut captures: mpsc::Receiver<CameraCapture>) -> CycleStats {
        if let Err(e) = self.start().await {
            warn!(error = %e, "detector never became ready; node exiting");
            return self.stats;
        }
        info!(
            camera = %self.config.frames.camera_frame,
            footprint = %self.config.frames.footprint_frame,
            bin = %self.config.frames.bin_frame,
            odom = %self.config.odometry_frame,
            "fiducial odometry running"
        );

        while let Some(capture) = captures.recv().await {
            // Outcomes are logged and counted inside `process`.
            let _ = self.process(&capture).await;
        }

        info!(
            emitted = self.stats.emitted,
            cycles = self.stats.cycles(),
            "capture stream closed"
        );
        self.stats
    }

    fn publish(&self, estimate: &OdometryEstimate) {
        let transform = estimate.to_transform();
        self.bus.publish_to(
            Topic::Transforms,
            Event::new(EVENT_SOURCE, EventPayload::Transform(transform)),
        );
        self.bus.publish_to(
            Topic::Odometry,
            Event::new(EVENT_SOURCE, EventPayload::Odometry(estimate.clone())),
        );
    }

    fn alert(&self, error: &OdomError) {
        let event = Event::new(
            EVENT_SOURCE,
            EventPayload::CycleSkipped {
                reason: error.to_string(),
            },
        );
        self.bus.publish_to(Topic::SystemAlerts, event);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Capture pump
// ─────────────────────────────────────────────────────────────────────────────

/// Poll `camera` every `period` and queue captures for the node.
///
/// Captures are dropped (with a warning) while the queue is full so a slow
/// detector never builds an unbounded backlog.  Returns when the node side
/// of the queue is closed.
pub async fn pump_camera(
    mut camera: impl Camera,
    period: Duration,
    captures: mpsc::Sender<CameraCapture>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        let capture = match camera.capture() {
            Ok(capture) => capture,
            Err(e) => {
                warn!(camera = camera.id(), error = %e, "capture failed");
                continue;
            }
        };
        match captures.try_send(capture) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(camera = camera.id(), "capture queue full; dropping frame");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(camera = camera.id(), "capture queue closed");
                return;
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use fiducia_hal::sim::{ScriptedDetector, SimCamera};
    use fiducia_perception::{SharedTfEngine, TfEngine};
    use fiducia_types::{DetectionResult, Quaternion, RigidPose, Transform3D, Vec3};

    fn quick_config() -> NodeConfig {
        NodeConfig {
            detection_timeout: Duration::from_millis(200),
            transform_backoff: Duration::ZERO,
            startup_settle: Duration::ZERO,
            ..NodeConfig::default()
        }
    }

    fn mounted_frames() -> SharedTfEngine {
        let tf = SharedTfEngine::new(TfEngine::new());
        tf.set_transform("footprint", "camera_link", Transform3D::identity());
        tf
    }

    fn marker(x: f64) -> Result<DetectionResult, OdomError> {
        Ok(DetectionResult::single(
            3,
            RigidPose::new(
                "camera_link",
                Utc::now(),
                Vec3::new(x, 0.0, 1.0),
                Quaternion::identity(),
            ),
        ))
    }

    fn capture() -> CameraCapture {
        SimCamera::new("front", "camera_link").capture().unwrap()
    }

    fn node(
        detector: Arc<ScriptedDetector>,
        frames: SharedTfEngine,
        bus: EventBus,
    ) -> FiducialOdometryNode {
        FiducialOdometryNode::new(quick_config(), detector, frames, bus)
    }

    #[tokio::test]
    async fn estimate_and_transform_are_published() {
        let bus = EventBus::default();
        let mut odom_rx = bus.subscribe_to(Topic::Odometry);
        let mut tf_rx = bus.subscribe_to(Topic::Transforms);
        let detector = Arc::new(ScriptedDetector::new([marker(1.0)]));
        let mut node = node(detector, mounted_frames(), bus);

        let estimate = node.process(&capture()).await.unwrap().unwrap();

        match odom_rx.recv().await.unwrap().payload {
            EventPayload::Odometry(o) => assert_eq!(o, estimate),
            other => panic!("unexpected payload {other:?}"),
        }
        match tf_rx.recv().await.unwrap().payload {
            EventPayload::Transform(t) => {
                assert_eq!(t.frame_id, "bin_link");
                assert_eq!(t.child_frame_id, "footprint");
                assert_eq!(t.transform.translation, estimate.pose.position);
            }
            other => panic!("unexpected payload {other:?}"),
        }
        assert_eq!(node.stats().emitted, 1);
        assert_eq!(node.state(), &EstimatorState::Known(estimate.pose));
    }

    #[tokio::test]
    async fn emits_with_no_bus_subscribers() {
        let bus = EventBus::default();
        assert_eq!(bus.subscriber_count(Topic::Odometry), 0);
        let detector = Arc::new(ScriptedDetector::new([marker(1.0), marker(2.0)]));
        let mut node = node(detector, mounted_frames(), bus);

        assert!(node.process(&capture()).await.unwrap().is_some());
        assert!(node.process(&capture()).await.unwrap().is_some());
        assert_eq!(node.stats().emitted, 2);
    }

    #[tokio::test]
    async fn detector_failure_skips_without_mutation() {
        let bus = EventBus::default();
        let mut alerts = bus.subscribe_to(Topic::SystemAlerts);
        let detector = Arc::new(ScriptedDetector::new([
            marker(1.0),
            Err(OdomError::DetectionFailed("server unreachable".into())),
        ]));
        let mut node = node(detector, mounted_frames(), bus);

        node.process(&capture()).await.unwrap();
        let before = node.state().clone();
        assert!(node.process(&capture()).await.is_err());
        assert_eq!(node.state(), &before);
        assert_eq!(node.stats().detection_failures, 1);

        match alerts.recv().await.unwrap().payload {
            EventPayload::CycleSkipped { reason } => assert!(reason.contains("server unreachable")),
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[tokio::test]
    async fn detector_timeout_is_a_detection_failure() {
        let detector =
            Arc::new(ScriptedDetector::new([marker(1.0)]).with_latency(Duration::from_secs(5)));
        let mut node = node(detector, mounted_frames(), EventBus::default());
        let err = node.process(&capture()).await.unwrap_err();
        assert!(matches!(err, OdomError::DetectionFailed(_)));
        assert_eq!(node.state(), &EstimatorState::Uninitialized);
    }

    #[tokio::test]
    async fn missing_transform_skips_then_recovers() {
        let frames = SharedTfEngine::default();
        let detector = Arc::new(ScriptedDetector::new([marker(1.0), marker(2.0)]));
        let mut node = node(detector, frames.clone(), EventBus::default());

        let err = node.process(&capture()).await.unwrap_err();
        assert!(matches!(err, OdomError::TransformUnavailable { .. }));
        assert_eq!(node.state(), &EstimatorState::Uninitialized);

        frames.set_transform("footprint", "camera_link", Transform3D::identity());
        let estimate = node.process(&capture()).await.unwrap().unwrap();
        assert_eq!(estimate.pose.position.x, -2.0);
        assert_eq!(node.stats().transform_failures, 1);
        assert_eq!(node.stats().emitted, 1);
    }

    #[tokio::test]
    async fn empty_detection_publishes_nothing() {
        let bus = EventBus::default();
        let mut odom_rx = bus.subscribe_to(Topic::Odometry);
        let detector = Arc::new(ScriptedDetector::new([Ok(DetectionResult::empty())]));
        let mut node = node(detector, mounted_frames(), bus);

        assert_eq!(node.process(&capture()).await, Ok(None));
        assert_eq!(node.stats().no_detections, 1);
        let waited = tokio::time::timeout(Duration::from_millis(50), odom_rx.recv()).await;
        assert!(waited.is_err(), "nothing should be published for an empty detection");
    }

    #[tokio::test]
    async fn run_drains_queue_sequentially() {
        let detector = Arc::new(ScriptedDetector::new([
            marker(1.0),
            Ok(DetectionResult::empty()),
            Err(OdomError::DetectionFailed("glare".into())),
            marker(2.0),
        ]));
        let node = node(detector.clone(), mounted_frames(), EventBus::default());

        let (tx, rx) = mpsc::channel(8);
        for _ in 0..4 {
            tx.send(capture()).await.unwrap();
        }
        drop(tx);

        let stats = node.run(rx).await;
        assert_eq!(detector.calls(), 4);
        assert_eq!(stats.cycles(), 4);
        assert_eq!(stats.emitted, 2);
        assert_eq!(stats.no_detections, 1);
        assert_eq!(stats.detection_failures, 1);
    }

    #[tokio::test]
    async fn pump_stops_when_queue_closes() {
        let (tx, mut rx) = mpsc::channel(2);
        let pump = tokio::spawn(pump_camera(
            SimCamera::new("front", "camera_link"),
            Duration::from_millis(5),
            tx,
        ));
        assert!(rx.recv().await.is_some());
        drop(rx);
        tokio::time::timeout(Duration::from_secs(1), pump)
            .await
            .expect("pump must exit once the queue closes")
            .unwrap();
    }
}
