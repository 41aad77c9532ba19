//! ReplayTK playback CLI
//!
//! Loads a scenario manifest and plays it back headless (virtual clock) or in
//! real time, optionally exporting every played frame to JSON.

use clap::Parser;
use replaytk_env::{FsLogSource, ReplayContext, TokioContext};
use replaytk_sim::{
    LoadedSimulation, Manifest, PlaybackConfig, PlaybackEvent, PlaybackExport, PlaybackFrame,
    SceneGraph, SimContext, SimController, SimLoader,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Outcome of one playback run.
struct RunSummary {
    frames: u64,
    final_time: f64,
    state: String,
    scenario_events: usize,
    exported: Option<usize>,
}

/// Plays a loaded simulation against `context` until it pauses or the frame
/// cap is reached.
async fn play<C: ReplayContext>(
    context: Arc<C>,
    simulation: LoadedSimulation,
    config: &PlaybackConfig,
    export_path: Option<&Path>,
) -> RunSummary {
    let ids: Vec<_> = simulation
        .registry
        .history_ids()
        .into_iter()
        .chain(simulation.report.static_only.iter().cloned())
        .collect();
    let scene = SceneGraph::from_registry(&simulation.registry, &ids);

    let mut controller = SimController::new(context, scene);
    let mut events = controller.subscribe();
    controller.load(simulation);

    let mut export = export_path.map(|_| {
        let name = controller.history().map_or("", |h| h.name.as_str());
        PlaybackExport::new(name, controller.duration(), config.speed)
    });

    controller.set_speed(config.speed);
    controller.play();
    if config.start_progress > 0.0 {
        controller.set_progress(config.start_progress);
    }

    let mut scenario_events = 0;
    let interval = config.export_interval.max(1);
    let frames = controller
        .run_frames(config.frame_duration(), config.max_frames, |c, frame| {
            let mut reported = Vec::new();
            while let Ok(event) = events.try_recv() {
                if let PlaybackEvent::Updated {
                    scenario_events: passed,
                    ..
                } = event
                {
                    reported.extend(passed);
                }
            }
            for event in &reported {
                info!("  event {} [{}] at {}", event.uri, event.category, event.time);
            }
            scenario_events += reported.len();

            if frame % 30 == 0 {
                debug!("  t={:.2}s | progress={:.1}%", c.simulation_time(), c.progress() * 100.0);
            }

            if let Some(export) = export.as_mut() {
                if frame % interval == 0 {
                    let timestamp = c
                        .current_timestamp()
                        .map(|ts| ts.format("%Y-%m-%dT%H:%M:%S%.3f").to_string())
                        .unwrap_or_default();
                    let mut captured = PlaybackFrame::capture(c.simulation_time(), timestamp, c.sink());
                    captured.events = reported;
                    export.add_frame(captured);
                }
            }
        })
        .await;

    let exported = match (export, export_path) {
        (Some(export), Some(path)) => match export.write_to_file(path) {
            Ok(()) => {
                info!("Exported {} frames to {}", export.frames.len(), path.display());
                Some(export.frames.len())
            }
            Err(e) => {
                error!("Failed to write export: {:?}", e);
                None
            }
        },
        _ => None,
    };

    RunSummary {
        frames,
        final_time: controller.simulation_time(),
        state: controller.state().to_string(),
        scenario_events,
        exported,
    }
}

/// ReplayTK playback CLI
#[derive(Parser, Debug)]
#[command(name = "replaytk-play")]
#[command(about = "Play back recorded entity histories", long_about = None)]
struct Args {
    /// Scenario manifest (JSON)
    manifest: PathBuf,

    /// Directory entity logs are resolved against (default: the manifest's directory)
    #[arg(short = 'r', long)]
    data_root: Option<PathBuf>,

    /// Playback frame rate in Hz
    #[arg(short, long, default_value = "30")]
    fps: f64,

    /// Playback speed (negative plays backwards)
    #[arg(short, long, default_value = "1.0", allow_hyphen_values = true)]
    speed: f64,

    /// Progress in [0, 1] to start from
    #[arg(long, default_value = "0.0")]
    start: f64,

    /// Maximum number of frames to play (0 = until playback pauses)
    #[arg(long, default_value = "0")]
    frames: u64,

    /// Follow the wall clock instead of running as fast as possible
    #[arg(long)]
    realtime: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON summary output
    #[arg(long)]
    json: bool,

    /// Export played frames to a JSON file
    #[arg(long)]
    export: Option<PathBuf>,

    /// Export every n-th frame
    #[arg(long, default_value = "1")]
    export_interval: u64,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let builder = FmtSubscriber::builder().with_max_level(level);
    let installed = if std::env::var_os("RUST_LOG").is_some() {
        tracing::subscriber::set_global_default(
            builder.with_env_filter(EnvFilter::from_default_env()).finish(),
        )
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    };
    installed.expect("Failed to set tracing subscriber");

    if !args.json {
        info!("ReplayTK Player v{}", env!("CARGO_PKG_VERSION"));
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    if !args.start.is_finite() || !args.speed.is_finite() || !(args.fps.is_finite() && args.fps > 0.0) {
        error!("✗ --start and --speed must be finite and --fps positive");
        std::process::exit(1);
    }

    let manifest = match Manifest::load(&FsLogSource::new("."), &args.manifest.to_string_lossy()) {
        Ok(manifest) => manifest,
        Err(e) => {
            error!("✗ {}", e);
            std::process::exit(1);
        }
    };

    let data_root = args.data_root.clone().unwrap_or_else(|| {
        args.manifest
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default()
    });
    let source = FsLogSource::new(data_root);
    let simulation = match SimLoader::new(&source).load(&manifest) {
        Ok(simulation) => simulation,
        Err(e) => {
            error!("✗ Failed to load '{}': {}", manifest.name, e);
            std::process::exit(1);
        }
    };

    for failure in &simulation.report.failures {
        warn!("  ! {} ({}): {}", failure.entity, failure.log, failure.error);
    }
    if simulation.report.overlaps > 0 {
        warn!("  ! {} overlapping record pairs", simulation.report.overlaps);
    }
    let failures = simulation.report.failures.len();
    let entities = simulation.executors.len();
    let duration = simulation.history.duration_secs();
    let name = simulation.history.name.clone();

    let config = PlaybackConfig {
        frame_rate_hz: args.fps,
        speed: args.speed,
        start_progress: args.start.clamp(0.0, 1.0),
        max_frames: args.frames,
        export_interval: args.export_interval,
    };

    let summary = if args.realtime {
        play(TokioContext::shared(), simulation, &config, args.export.as_deref()).await
    } else {
        play(SimContext::shared(), simulation, &config, args.export.as_deref()).await
    };

    if args.json {
        let json = serde_json::json!({
            "simulation": name,
            "duration_secs": duration,
            "entities": entities,
            "load_failures": failures,
            "frames": summary.frames,
            "final_time_secs": summary.final_time,
            "state": summary.state,
            "scenario_events": summary.scenario_events,
            "exported_frames": summary.exported,
        });
        match serde_json::to_string_pretty(&json) {
            Ok(text) => println!("{}", text),
            Err(e) => error!("Failed to encode summary: {}", e),
        }
    } else {
        info!("");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        info!(
            "✓ {} | {} entities | {} frames | t={:.2}/{:.2}s ({})",
            name, entities, summary.frames, summary.final_time, duration, summary.state
        );
        if failures > 0 {
            error!("❌ {} log(s) failed to load", failures);
        }
    }

    if failures > 0 {
        std::process::exit(2);
    }
}
