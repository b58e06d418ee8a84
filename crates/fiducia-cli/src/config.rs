//! Node configuration – reads/writes `~/.fiducia/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use fiducia_perception::FrameNames;
use fiducia_runtime::NodeConfig;
use fiducia_types::{Quaternion, Transform3D, Vec3};

/// Static footprint → camera mounting offset.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CameraMount {
    /// Translation in metres.
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub z: f64,
    /// Orientation in radians.
    #[serde(default)]
    pub roll: f64,
    #[serde(default)]
    pub pitch: f64,
    #[serde(default)]
    pub yaw: f64,
}

impl CameraMount {
    pub fn to_transform(&self) -> Transform3D {
        Transform3D::new(
            Vec3::new(self.x, self.y, self.z),
            Quaternion::from_rpy(self.roll, self.pitch, self.yaw),
        )
    }
}

/// Parameters of the simulated marker used by the headless binary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimMarker {
    #[serde(default)]
    pub marker_id: u32,
    /// Marker position relative to the camera at startup, metres.
    #[serde(default = "default_sim_start")]
    pub start: [f64; 3],
    /// Constant marker velocity in the camera frame, m/s.
    #[serde(default = "default_sim_velocity")]
    pub velocity: [f64; 3],
    /// rad/s about the camera z axis.
    #[serde(default)]
    pub yaw_rate: f64,
    /// Every n-th frame reports no marker; 0 never misses.
    #[serde(default = "default_sim_miss_every")]
    pub miss_every: u64,
}

impl Default for SimMarker {
    fn default() -> Self {
        Self {
            marker_id: 0,
            start: default_sim_start(),
            velocity: default_sim_velocity(),
            yaw_rate: 0.0,
            miss_every: default_sim_miss_every(),
        }
    }
}

/// Persisted configuration stored in `~/.fiducia/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_camera_frame")]
    pub camera_frame: String,

    #[serde(default = "default_footprint_frame")]
    pub footprint_frame: String,

    /// Frame the odometry is reported in.
    #[serde(default = "default_bin_frame")]
    pub bin_frame: String,

    #[serde(default = "default_odometry_frame")]
    pub odometry_frame: String,

    #[serde(default = "default_detection_timeout_ms")]
    pub detection_timeout_ms: u64,

    /// Pause after a failed transform lookup.
    #[serde(default = "default_transform_backoff_ms")]
    pub transform_backoff_ms: u64,

    /// Delay between detector readiness and the first capture.
    #[serde(default = "default_startup_settle_ms")]
    pub startup_settle_ms: u64,

    /// Captures buffered ahead of the node.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    #[serde(default = "default_capture_period_ms")]
    pub capture_period_ms: u64,

    #[serde(default)]
    pub camera_mount: CameraMount,

    #[serde(default)]
    pub sim: SimMarker,
}

fn default_camera_frame() -> String {
    "camera_link".to_string()
}
fn default_footprint_frame() -> String {
    "footprint".to_string()
}
fn default_bin_frame() -> String {
    "bin_link".to_string()
}
fn default_odometry_frame() -> String {
    "odom".to_string()
}
fn default_detection_timeout_ms() -> u64 {
    5000
}
fn default_transform_backoff_ms() -> u64 {
    1000
}
fn default_startup_settle_ms() -> u64 {
    2000
}
fn default_queue_capacity() -> usize {
    10
}
fn default_capture_period_ms() -> u64 {
    100
}
fn default_sim_start() -> [f64; 3] {
    [0.0, 0.0, 1.5]
}
fn default_sim_velocity() -> [f64; 3] {
    [0.1, 0.0, 0.0]
}
fn default_sim_miss_every() -> u64 {
    7
}

impl Default for Config {
    fn default() -> Self {
        Self {
            camera_frame: default_camera_frame(),
            footprint_frame: default_footprint_frame(),
            bin_frame: default_bin_frame(),
            odometry_frame: default_odometry_frame(),
            detection_timeout_ms: default_detection_timeout_ms(),
            transform_backoff_ms: default_transform_backoff_ms(),
            startup_settle_ms: default_startup_settle_ms(),
            queue_capacity: default_queue_capacity(),
            capture_period_ms: default_capture_period_ms(),
            camera_mount: CameraMount::default(),
            sim: SimMarker::default(),
        }
    }
}

impl Config {
    pub fn node_config(&self) -> NodeConfig {
        NodeConfig {
            frames: FrameNames {
                camera_frame: self.camera_frame.clone(),
                footprint_frame: self.footprint_frame.clone(),
                bin_frame: self.bin_frame.clone(),
            },
            odometry_frame: self.odometry_frame.clone(),
            detection_timeout: Duration::from_millis(self.detection_timeout_ms),
            transform_backoff: Duration::from_millis(self.transform_backoff_ms),
            startup_settle: Duration::from_millis(self.startup_settle_ms),
        }
    }

    /// A zero-capacity mpsc channel panics, so clamp to at least one slot.
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity.max(1)
    }

    pub fn capture_period(&self) -> Duration {
        Duration::from_millis(self.capture_period_ms.max(1))
    }
}

/// Return the path to `~/.fiducia/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".fiducia").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `FIDUCIA_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `FIDUCIA_CAMERA_FRAME` | `camera_frame` |
/// | `FIDUCIA_FOOTPRINT_FRAME` | `footprint_frame` |
/// | `FIDUCIA_BIN_FRAME` | `bin_frame` |
/// | `FIDUCIA_ODOM_FRAME` | `odometry_frame` |
/// | `FIDUCIA_DETECTION_TIMEOUT_MS` | `detection_timeout_ms` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("FIDUCIA_CAMERA_FRAME") {
        cfg.camera_frame = v;
    }
    if let Ok(v) = std::env::var("FIDUCIA_FOOTPRINT_FRAME") {
        cfg.footprint_frame = v;
    }
    if let Ok(v) = std::env::var("FIDUCIA_BIN_FRAME") {
        cfg.bin_frame = v;
    }
    if let Ok(v) = std::env::var("FIDUCIA_ODOM_FRAME") {
        cfg.odometry_frame = v;
    }
    if let Ok(v) = std::env::var("FIDUCIA_DETECTION_TIMEOUT_MS")
        && let Ok(ms) = v.trim().parse::<u64>()
    {
        cfg.detection_timeout_ms = ms;
    }
}

/// Save the config to disk, creating `~/.fiducia/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Env-var tests share process state; run them one at a time.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");

        let file_mode =
            std::fs::metadata(&path).expect("file metadata").permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600);
        let dir_mode = std::fs::metadata(path.parent().unwrap())
            .expect("dir metadata")
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(dir_mode, 0o700);
    }

    #[test]
    fn roundtrip_custom_config() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        let mut cfg = Config::default();
        cfg.bin_frame = "tote_link".into();
        cfg.camera_mount.z = 0.42;
        cfg.camera_mount.yaw = 1.5;
        cfg.sim.miss_every = 0;
        save_to(&cfg, &path).expect("save");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "bin_frame = \"shelf\"\n[camera_mount]\nx = 0.1\n").unwrap();

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.bin_frame, "shelf");
        assert_eq!(loaded.camera_frame, "camera_link");
        assert_eq!(loaded.detection_timeout_ms, 5000);
        assert_eq!(loaded.queue_capacity, 10);
        assert_eq!(loaded.camera_mount.x, 0.1);
        assert_eq!(loaded.camera_mount.roll, 0.0);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "detection_timeout_ms = \"soon\"").unwrap();
        assert!(load_from(&path).unwrap_err().contains("parse"));
    }

    #[test]
    fn config_path_points_to_fiducia_dir() {
        let p = config_path_for_home("/home/testuser");
        assert_eq!(p, PathBuf::from("/home/testuser/.fiducia/config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn env_overrides_frames_and_timeout() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        // SAFETY: env access is serialised by ENV_LOCK.
        unsafe {
            std::env::set_var("FIDUCIA_BIN_FRAME", "dock");
            std::env::set_var("FIDUCIA_ODOM_FRAME", "world");
            std::env::set_var("FIDUCIA_DETECTION_TIMEOUT_MS", "250");
        }
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        unsafe {
            std::env::remove_var("FIDUCIA_BIN_FRAME");
            std::env::remove_var("FIDUCIA_ODOM_FRAME");
            std::env::remove_var("FIDUCIA_DETECTION_TIMEOUT_MS");
        }
        assert_eq!(cfg.bin_frame, "dock");
        assert_eq!(cfg.odometry_frame, "world");
        assert_eq!(cfg.detection_timeout_ms, 250);
        assert_eq!(cfg.camera_frame, "camera_link");
    }

    #[test]
    fn env_override_ignores_invalid_timeout() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        // SAFETY: env access is serialised by ENV_LOCK.
        unsafe { std::env::set_var("FIDUCIA_DETECTION_TIMEOUT_MS", "forever") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        unsafe { std::env::remove_var("FIDUCIA_DETECTION_TIMEOUT_MS") };
        assert_eq!(cfg.detection_timeout_ms, 5000);
    }

    #[test]
    fn node_config_mirrors_fields() {
        let mut cfg = Config::default();
        cfg.footprint_frame = "base_footprint".into();
        cfg.transform_backoff_ms = 0;
        cfg.queue_capacity = 0;
        let node = cfg.node_config();
        assert_eq!(node.frames.footprint_frame, "base_footprint");
        assert_eq!(node.frames.bin_frame, "bin_link");
        assert_eq!(node.odometry_frame, "odom");
        assert_eq!(node.detection_timeout, Duration::from_secs(5));
        assert_eq!(node.transform_backoff, Duration::ZERO);
        assert_eq!(node.startup_settle, Duration::from_secs(2));
        assert_eq!(cfg.queue_capacity(), 1);
    }

    #[test]
    fn camera_mount_becomes_transform() {
        let mount = CameraMount {
            x: 0.2,
            z: 0.5,
            yaw: std::f64::consts::FRAC_PI_2,
            ..CameraMount::default()
        };
        let t = mount.to_transform();
        assert_eq!(t.translation, Vec3::new(0.2, 0.0, 0.5));
        let (_, _, yaw) = t.rotation.to_rpy();
        assert!((yaw - std::f64::consts::FRAC_PI_2).abs() < 1e-9);
    }
}
