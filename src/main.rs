//! lod-sim: drives the LOD core with a synthetic render loop.
//!
//! ## CLI Subcommands
//!
//! - `lod-sim` or `lod-sim run` - Run the simulation and print a JSON report
//! - `lod-sim config` - Print the effective configuration as JSON
//! - `lod-sim help` - Show usage
//! - `lod-sim version` - Show version

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use glam::Vec3;
use tokio::time::Instant;

use lod_core::quality::{FnLoader, NullDisplay};
use lod_core::telemetry::{init_logging, LogConfig};
use lod_core::{
    AssetOptions, DeviceCapabilities, DeviceTier, LoadError, LodConfig, LodSystem, MemoryProbe,
    NoMemoryProbe, Quality, SystemMemoryProbe,
};

type Mesh = Arc<Vec<u8>>;

/// Simulation parameters parsed from the command line.
struct SimOptions {
    frames: usize,
    assets: usize,
    tier: DeviceTier,
    base_frame_ms: f64,
    system_memory: bool,
}

impl Default for SimOptions {
    fn default() -> Self {
        Self {
            frames: 600,
            assets: 24,
            tier: DeviceTier::Medium,
            base_frame_ms: 12.0,
            system_memory: false,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("run");

    match command {
        "run" | "" => run_command(&args[2.min(args.len())..]).await,
        "config" => {
            let tier = args
                .get(2)
                .and_then(|t| DeviceTier::parse(t))
                .unwrap_or(DeviceTier::Medium);
            let config = load_config(tier);
            if let Err(violations) = config.validate() {
                for violation in &violations {
                    eprintln!("invalid: {}", violation);
                }
                return ExitCode::FAILURE;
            }
            match serde_json::to_string_pretty(&config.effective()) {
                Ok(json) => {
                    println!("{}", json);
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    eprintln!("Failed to serialize config: {}", e);
                    ExitCode::FAILURE
                }
            }
        }
        "help" | "--help" | "-h" => {
            print_usage();
            ExitCode::SUCCESS
        }
        "version" | "--version" | "-V" => {
            println!("lod-sim {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        flag if flag.starts_with("--") => run_command(&args[1..]).await,
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            ExitCode::FAILURE
        }
    }
}

/// Flags without a command imply `run`.
async fn run_command(args: &[String]) -> ExitCode {
    let options = match parse_run_args(args) {
        Ok(options) => options,
        Err(message) => {
            eprintln!("{}", message);
            eprintln!("Run 'lod-sim help' for usage.");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = init_logging(&LogConfig::from_env()) {
        eprintln!("Logging disabled: {}", e);
    }
    match run_simulation(options).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Simulation error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn print_usage() {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        "lod-sim - adaptive LOD simulation v{}

USAGE:
    lod-sim [COMMAND] [OPTIONS]

COMMANDS:
    run          Run the simulated render loop (default)
    config       Print effective configuration [low|medium|high]
    version      Show version information
    help         Show this help message

RUN OPTIONS:
    --frames N       Frames to simulate (default 600)
    --assets N       Managed assets in the scene (default 24)
    --tier T         Device tier: low, medium, high (default medium)
    --frame-ms F     Base frame cost in milliseconds (default 12)
    --system-memory  Read host memory instead of estimating it

ENVIRONMENT:
    LOD_LOG, LOD_LOG_FORMAT, LOD_LOG_FILE   Logging
    LOD_TARGET_FPS, LOD_NEAR, LOD_MEDIUM, LOD_FAR, LOD_CACHE_MAX_BYTES,
    LOD_CACHE_MAX_ENTRIES, LOD_CACHE_MEMORY_THRESHOLD, LOD_SAMPLE_WINDOW,
    LOD_MEMORY_INTERVAL_MS, LOD_DEBOUNCE_MS, LOD_MAINTENANCE_INTERVAL_SECS",
        version
    );
}

fn parse_run_args(args: &[String]) -> Result<SimOptions, String> {
    let mut options = SimOptions::default();
    let mut i = 0;
    while i < args.len() {
        let value = args.get(i + 1);
        match args[i].as_str() {
            "--frames" => {
                let v = value.ok_or("Missing value for --frames")?;
                options.frames = v.parse().map_err(|_| format!("Invalid --frames: {}", v))?;
                i += 2;
            }
            "--assets" => {
                let v = value.ok_or("Missing value for --assets")?;
                options.assets = v.parse().map_err(|_| format!("Invalid --assets: {}", v))?;
                i += 2;
            }
            "--tier" => {
                let v = value.ok_or("Missing value for --tier")?;
                options.tier = DeviceTier::parse(v).ok_or(format!("Invalid --tier: {}", v))?;
                i += 2;
            }
            "--frame-ms" => {
                let v = value.ok_or("Missing value for --frame-ms")?;
                options.base_frame_ms = v
                    .parse::<f64>()
                    .ok()
                    .filter(|ms| *ms > 0.0 && ms.is_finite())
                    .ok_or(format!("Invalid --frame-ms: {}", v))?;
                i += 2;
            }
            "--system-memory" => {
                options.system_memory = true;
                i += 1;
            }
            other => return Err(format!("Unknown argument: {}", other)),
        }
    }
    Ok(options)
}

fn load_config(tier: DeviceTier) -> LodConfig {
    LodConfig::from_device(&DeviceCapabilities::for_tier(tier)).with_env_overrides()
}

/// Bytes of a simulated mesh at each tier.
fn mesh_size(quality: Quality) -> usize {
    match quality {
        Quality::Low => 64 * 1024,
        Quality::Medium => 512 * 1024,
        Quality::High => 2 * 1024 * 1024,
    }
}

/// Simulated per-frame render cost of one visible asset.
fn render_cost_ms(quality: Quality) -> f64 {
    match quality {
        Quality::Low => 0.15,
        Quality::Medium => 0.5,
        Quality::High => 1.4,
    }
}

async fn simulated_load(locator: String) -> Result<Mesh, LoadError> {
    let quality = if locator.ends_with("high.glb") {
        Quality::High
    } else if locator.ends_with("medium.glb") {
        Quality::Medium
    } else {
        Quality::Low
    };
    tokio::time::sleep(Duration::from_millis(match quality {
        Quality::Low => 1,
        Quality::Medium => 3,
        Quality::High => 6,
    }))
    .await;
    if locator.contains("broken") {
        return Err(LoadError::failed(locator, "corrupt mesh data"));
    }
    Ok(Arc::new(vec![0u8; mesh_size(quality)]))
}

async fn run_simulation(options: SimOptions) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(options.tier);
    let probe: Box<dyn MemoryProbe> = if options.system_memory {
        Box::new(SystemMemoryProbe::new())
    } else {
        Box::new(NoMemoryProbe)
    };
    let system: LodSystem<Mesh> = LodSystem::with_probe(
        config,
        Arc::new(FnLoader::<_, Mesh>::new(simulated_load)),
        Arc::new(NullDisplay),
        probe,
    )?;

    let spacing = 8.0f32;
    for i in 0..options.assets {
        // Every seventh asset ships a broken high tier to exercise fallback.
        let high = if i % 7 == 6 {
            format!("asset-{i}/broken-high.glb")
        } else {
            format!("asset-{i}/high.glb")
        };
        let sources = [
            (Quality::Low, format!("asset-{i}/low.glb")),
            (Quality::Medium, format!("asset-{i}/medium.glb")),
            (Quality::High, high),
        ];
        let position = Vec3::new(i as f32 * spacing, 0.0, (i % 3) as f32 * 4.0);
        let options = AssetOptions::default()
            .with_position(position)
            .with_priority((i % 4) as u32 + 1)
            .preloaded();
        system.manager.register(format!("asset-{i}"), sources, options)?;
    }

    system.start();
    let ids = system.manager.asset_ids();
    let track = options.assets.max(1) as f32 * spacing;
    let mut clock = Instant::now();

    for frame in 0..options.frames {
        let progress = frame as f32 / options.frames.max(1) as f32;
        let camera = Vec3::new(progress * track, 2.0, -6.0);
        for id in &ids {
            if let Err(e) = system.manager.update_for_viewpoint(id, camera).await {
                tracing::warn!(asset = %id, error = %e, "update failed");
            }
        }

        let stats = system.manager.stats();
        let frame_ms = options.base_frame_ms
            + stats.high as f64 * render_cost_ms(Quality::High)
            + stats.medium as f64 * render_cost_ms(Quality::Medium)
            + stats.low as f64 * render_cost_ms(Quality::Low);
        clock += Duration::from_secs_f64(frame_ms / 1000.0);
        system.observer.record_frame(clock);

        if frame % 30 == 0 {
            system.observer.sample_memory();
        }
        tokio::task::yield_now().await;
    }

    let report = system.report();
    system.shutdown(Duration::from_secs(5)).await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
