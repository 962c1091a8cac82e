//! traffic_count - count vehicles in an image, a video file or a live camera.
//!
//! Video and camera runs keep one count per tracked vehicle, so a car seen in
//! many frames counts once. Images are counted box by box. Every run prints a
//! summary and writes a CSV report (`Vehicle Type,Count`).

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::io::IsTerminal;
use std::path::PathBuf;

use traffic_counter::{
    build_source, count_still_image, load_detector, summary_text, write_csv, CancelFlag,
    ClassCounts, CounterConfig, DetectorBackend, RunSummary, SessionSettings, SourceSpec,
    StreamSession, TrackingDetector,
};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(
    name = "traffic_count",
    version,
    about = "Count vehicles in images, video files and live cameras"
)]
struct Args {
    /// TOML config file (overrides TRAFFIC_COUNTER_CONFIG)
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Minimum detection confidence in [0, 1]
    #[arg(long, value_name = "F", global = true)]
    confidence: Option<f32>,

    /// Model variant (yolov8n|yolov8m|yolov8l|yolov8x)
    #[arg(long, value_name = "MODEL", global = true)]
    model: Option<String>,

    /// Detector backend (simulated|onnx)
    #[arg(long, value_name = "BACKEND", global = true)]
    backend: Option<String>,

    /// CSV report path
    #[arg(long, value_name = "PATH", global = true)]
    report: Option<PathBuf>,

    /// Print a JSON summary on stdout instead of text
    #[arg(long, global = true)]
    json: bool,

    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE", global = true)]
    ui: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Count every vehicle box in one image
    Image {
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },
    /// Count unique tracked vehicles in a video file
    Video {
        #[arg(value_name = "PATH")]
        path: PathBuf,
        /// Process every Nth frame
        #[arg(long, value_name = "N")]
        frame_skip: Option<u32>,
    },
    /// Count unique tracked vehicles from a live camera until Ctrl-C
    Camera {
        /// Device node or index (0 = /dev/video0)
        #[arg(long, value_name = "DEV")]
        device: Option<String>,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let cfg = load_config(&args)?;
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = ui::Ui::from_args(Some(&args.ui), is_tty, !stdout_is_tty);

    let mut loaded = {
        let _stage = ui.stage(&format!("Load model {}", cfg.model));
        load_detector(cfg.backend, cfg.model, &cfg.models_dir, 0)?
    };
    if let Some(fallback) = &loaded.fallback {
        eprintln!(
            "Error loading model {}: {}. using '{}' as fallback.",
            fallback.requested,
            fallback.reason,
            loaded.variant.weights_id()
        );
    }

    let summary = match &args.command {
        Command::Image { path } => {
            let spec = SourceSpec::Image(path.clone());
            let mut source = build_source(&spec)?;
            let still = {
                let _stage = ui.stage("Detecting");
                count_still_image(&mut source, &mut loaded.backend, cfg.confidence)?
            };
            RunSummary::from_still(&spec.location(), &still.counts)
        }
        Command::Video { path, .. } => {
            let spec = SourceSpec::Video(path.clone());
            run_stream(&spec, cfg.video_settings(), loaded.backend, &ui)?
        }
        Command::Camera { .. } => {
            let spec = SourceSpec::Camera(cfg.camera_device.clone());
            run_stream(&spec, cfg.camera_settings(), loaded.backend, &ui)?
        }
    };

    write_csv(&cfg.report_path, &summary.rows)?;
    if args.json {
        println!("{}", summary.to_json()?);
    } else {
        let counts: ClassCounts = summary
            .rows
            .iter()
            .map(|row| (row.class_label.as_str(), row.count))
            .collect();
        print!("{}", summary_text(&counts));
        println!("report: {}", cfg.report_path.display());
    }
    Ok(())
}

fn load_config(args: &Args) -> Result<CounterConfig> {
    let mut cfg = match &args.config {
        Some(path) => CounterConfig::load_from(path)?,
        None => CounterConfig::load()?,
    };
    if let Some(confidence) = args.confidence {
        cfg.confidence = confidence;
    }
    if let Some(model) = &args.model {
        cfg.model = model.parse()?;
    }
    if let Some(backend) = &args.backend {
        cfg.backend = backend.parse()?;
    }
    if let Some(report) = &args.report {
        cfg.report_path = report.clone();
    }
    match &args.command {
        Command::Video {
            frame_skip: Some(skip),
            ..
        } => cfg.frame_skip = *skip,
        Command::Camera {
            device: Some(device),
        } => cfg.camera_device = device.clone(),
        _ => {}
    }
    cfg.validate()?;
    Ok(cfg)
}

fn run_stream(
    spec: &SourceSpec,
    settings: SessionSettings,
    backend: Box<dyn DetectorBackend>,
    ui: &ui::Ui,
) -> Result<RunSummary> {
    let cancel = CancelFlag::new();
    let handler_flag = cancel.clone();
    ctrlc::set_handler(move || handler_flag.cancel())
        .map_err(|e| anyhow!("failed to install Ctrl-C handler: {}", e))?;

    let mut source = build_source(spec)?;
    let mut tracker = TrackingDetector::with_default_config(backend);
    let mut session = StreamSession::new(settings)?;

    let outcome = {
        let progress = ui.frames(&format!("Processing {}", spec.location()));
        session.run(&mut source, &mut tracker, &cancel, |step| {
            progress.update(step.frames_read, step.frames_processed, &step.counts());
        })?
    };
    if outcome.end.is_failure() {
        eprintln!("stream ended early: {}", outcome.end);
    }
    Ok(RunSummary::from_session(spec.mode(), &spec.location(), &outcome))
}
