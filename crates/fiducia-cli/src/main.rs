//! `fiducia` – headless fiducial odometry node.
//!
//! 1. Initialises logging / trace export and loads `~/.fiducia/config.toml`
//!    (writing the defaults on first run).
//! 2. Seeds the frame graph with the static camera mount.
//! 3. Runs the odometry node against the simulated camera and marker
//!    detector, printing every estimate.
//! 4. Stops on **Ctrl-C**: the capture pump is cancelled, the node drains
//!    its queue and a cycle summary is printed.

mod config;

use colored::Colorize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use fiducia_hal::sim::{SimCamera, SimMarkerDetector};
use fiducia_middleware::{EventBus, Topic};
use fiducia_perception::{SharedTfEngine, TfEngine};
use fiducia_runtime::{CycleStats, FiducialOdometryNode, init_tracing, pump_camera};
use fiducia_types::{EventPayload, Vec3};

fn main() {
    // Must run before the Tokio runtime exists; see `telemetry`.
    let _trace_guard = init_tracing("fiducia");

    print_banner();

    let cfg = load_config();

    let frames = SharedTfEngine::new(TfEngine::new());
    frames.set_transform(
        &cfg.footprint_frame,
        &cfg.camera_frame,
        cfg.camera_mount.to_transform(),
    );
    info!(
        parent = %cfg.footprint_frame,
        child = %cfg.camera_frame,
        "camera mount registered"
    );

    let bus = EventBus::default();

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping capture …".yellow().bold());
        shutdown_flag.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; stop with a signal instead");
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to start async runtime");
            std::process::exit(1);
        }
    };

    let stats = runtime.block_on(run(cfg, frames, bus, shutdown));
    print_summary(&stats);
}

// ─────────────────────────────────────────────────────────────────────────────
// Pipeline
// ─────────────────────────────────────────────────────────────────────────────

async fn run(
    cfg: config::Config,
    frames: SharedTfEngine,
    bus: EventBus,
    shutdown: Arc<AtomicBool>,
) -> CycleStats {
    let detector = Arc::new(
        SimMarkerDetector::new(
            cfg.sim.marker_id,
            vec3(cfg.sim.start),
            vec3(cfg.sim.velocity),
            cfg.sim.yaw_rate,
        )
        .with_miss_every(cfg.sim.miss_every),
    );

    let printer = tokio::spawn(print_odometry(bus.clone()));
    let alerts = tokio::spawn(print_alerts(bus.clone()));

    let (tx, rx) = mpsc::channel(cfg.queue_capacity());
    let camera = SimCamera::new("sim_camera", cfg.camera_frame.clone());
    let pump = tokio::spawn(pump_camera(camera, cfg.capture_period(), tx));

    let node = FiducialOdometryNode::new(cfg.node_config(), detector, frames, bus);
    let node_task = tokio::spawn(node.run(rx));

    while !shutdown.load(Ordering::SeqCst) {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    // Cancelling the pump drops the capture sender, which ends `run`.
    pump.abort();
    let stats = match node_task.await {
        Ok(stats) => stats,
        Err(e) => {
            error!(error = %e, "odometry node task failed");
            CycleStats::default()
        }
    };
    printer.abort();
    alerts.abort();
    stats
}

async fn print_odometry(bus: EventBus) {
    let mut odometry = bus.subscribe_to(Topic::Odometry);
    while let Some(event) = odometry.next().await {
        if let EventPayload::Odometry(estimate) = event.payload {
            let p = estimate.pose.position;
            let v = estimate.twist.linear;
            println!(
                "  {} {} → {}  pos ({:+.3}, {:+.3}, {:+.3})  vel ({:+.3}, {:+.3}, {:+.3})  ω_z {:+.3}",
                estimate.stamp.format("%H:%M:%S%.3f").to_string().dimmed(),
                estimate.frame_id.cyan(),
                estimate.child_frame_id.cyan(),
                p.x,
                p.y,
                p.z,
                v.x,
                v.y,
                v.z,
                estimate.twist.angular.z,
            );
        }
    }
}

async fn print_alerts(bus: EventBus) {
    let mut alerts = bus.subscribe_to(Topic::SystemAlerts);
    while let Some(event) = alerts.next().await {
        if let EventPayload::CycleSkipped { reason } = event.payload {
            println!("  {} {}", "skipped:".yellow(), reason);
        }
    }
}

fn vec3(v: [f64; 3]) -> Vec3 {
    Vec3::new(v[0], v[1], v[2])
}

// ─────────────────────────────────────────────────────────────────────────────
// Config
// ─────────────────────────────────────────────────────────────────────────────

fn load_config() -> config::Config {
    match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => {
            let mut cfg = config::Config::default();
            config::apply_env_overrides(&mut cfg);
            match config::save(&config::Config::default()) {
                Ok(()) => println!(
                    "  {} Default config written to {}",
                    "✓".green().bold(),
                    config::config_path().display().to_string().bold()
                ),
                Err(e) => println!("{}: {}", "Error saving config".red(), e),
            }
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            let mut cfg = config::Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner / summary
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!(
        "  {} {}",
        "Fiducia".bold().cyan(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Fiducial-marker relative odometry");
    println!();
}

fn print_summary(stats: &CycleStats) {
    println!();
    println!("  {}", "Session summary".bold());
    println!("    cycles            {}", stats.cycles());
    println!("    estimates         {}", stats.emitted.to_string().green());
    println!("    no marker         {}", stats.no_detections);
    println!("    detector errors   {}", stats.detection_failures);
    println!("    transform errors  {}", stats.transform_failures);
    println!("    timing rejections {}", stats.timing_rejections);
    println!();
}
