//! `fiducia-hal` – camera and detector collaborators.
//!
//! # Modules
//!
//! - [`camera`] – [`Camera`][camera::Camera] trait and the
//!   [`CameraCapture`][camera::CameraCapture] image + calibration pair.
//! - [`detector`] – async [`Detector`][detector::Detector] trait and
//!   [`detect_with_timeout`][detector::detect_with_timeout].
//! - [`sim`] – simulated camera and detectors for headless runs and tests.

pub mod camera;
pub mod detector;
pub mod sim;

pub use camera::{Camera, CameraCapture, CameraFrame, CameraInfo};
pub use detector::{Detector, detect_with_timeout};
