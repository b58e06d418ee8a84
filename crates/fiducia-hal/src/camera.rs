//! Generic `Camera` trait and the image + calibration pair it produces.

use chrono::{DateTime, Utc};
use fiducia_types::OdomError;

/// A raw image frame returned by a camera driver.
#[derive(Debug, Clone)]
pub struct CameraFrame {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Raw pixel data (e.g. RGB24 or greyscale).
    pub data: Vec<u8>,
}

/// Pinhole intrinsics and distortion for the camera that produced a frame.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraInfo {
    /// Optical frame of the camera, e.g. `"camera_link"`.
    pub frame_id: String,
    pub width: u32,
    pub height: u32,
    /// Focal lengths in pixels.
    pub fx: f64,
    pub fy: f64,
    /// Principal point in pixels.
    pub cx: f64,
    pub cy: f64,
    /// Plumb-bob distortion coefficients `(k1, k2, p1, p2, k3)`; may be empty.
    pub distortion: Vec<f64>,
}

impl CameraInfo {
    /// `true` when the intrinsics can be used for pose recovery.
    pub fn is_calibrated(&self) -> bool {
        self.fx > 0.0 && self.fy > 0.0 && self.width > 0 && self.height > 0
    }
}

/// One image paired with the calibration it was captured under.
#[derive(Debug, Clone)]
pub struct CameraCapture {
    /// Capture time.
    pub stamp: DateTime<Utc>,
    pub image: CameraFrame,
    pub info: CameraInfo,
}

/// A camera or image-capture device.
pub trait Camera: Send {
    /// Stable identifier for this camera, e.g. `"front_rgb"`.
    fn id(&self) -> &str;

    /// Capture the next available frame together with its calibration.
    ///
    /// # Errors
    ///
    /// Returns [`OdomError::HardwareFault`] if the frame cannot be captured
    /// (e.g. the device is disconnected or the buffer is unavailable).
    fn capture(&mut self) -> Result<CameraCapture, OdomError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info() -> CameraInfo {
        CameraInfo {
            frame_id: "camera_link".to_string(),
            width: 2,
            height: 2,
            fx: 1.0,
            fy: 1.0,
            cx: 1.0,
            cy: 1.0,
            distortion: vec![],
        }
    }

    struct MockCamera {
        id: String,
    }

    impl Camera for MockCamera {
        fn id(&self) -> &str {
            &self.id
        }

        fn capture(&mut self) -> Result<CameraCapture, OdomError> {
            Ok(CameraCapture {
                stamp: Utc::now(),
                image: CameraFrame {
                    width: 2,
                    height: 2,
                    data: vec![0u8; 4 * 3], // 2×2 RGB24
                },
                info: info(),
            })
        }
    }

    #[test]
    fn mock_camera_capture() {
        let mut cam = MockCamera {
            id: "front_rgb".to_string(),
        };
        assert_eq!(cam.id(), "front_rgb");
        let capture = cam.capture().unwrap();
        assert_eq!(capture.image.width, 2);
        assert_eq!(capture.image.data.len(), 12);
        assert_eq!(capture.info.frame_id, "camera_link");
    }

    struct UnpluggedCamera;

    impl Camera for UnpluggedCamera {
        fn id(&self) -> &str {
            "usb0"
        }

        fn capture(&mut self) -> Result<CameraCapture, OdomError> {
            Err(OdomError::HardwareFault {
                component: self.id().to_string(),
                details: "device disconnected".to_string(),
            })
        }
    }

    #[test]
    fn disconnected_camera_reports_hardware_fault() {
        let err = UnpluggedCamera.capture().unwrap_err();
        assert!(matches!(err, OdomError::HardwareFault { ref component, .. } if component == "usb0"));
        assert!(err.to_string().contains("device disconnected"));
    }

    #[test]
    fn uncalibrated_info_is_detected() {
        assert!(info().is_calibrated());
        let mut bad = info();
        bad.fx = 0.0;
        assert!(!bad.is_calibrated());
    }
}
