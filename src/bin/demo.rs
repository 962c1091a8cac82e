//! demo - end-to-end synthetic run for the traffic counter
//!
//! Drives a `stub://` frame source through the simulated traffic detector,
//! the IoU tracker and the frame aggregator, then writes the CSV report and a
//! JSON summary. Needs no model files, camera or video.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::fs;
use std::io::IsTerminal;
use std::path::PathBuf;

use traffic_counter::detect::SimulatedTraffic;
use traffic_counter::{
    build_source, summary_text, write_csv, CancelFlag, RunSummary, SessionSettings, SourceSpec,
    StreamSession, TrackingDetector, REPORT_FILE_NAME,
};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Number of synthetic frames to read.
    #[arg(long, default_value_t = 900)]
    frames: u64,
    /// Seed for the simulated traffic scene.
    #[arg(long, default_value_t = 7)]
    seed: u64,
    /// Process every Nth frame.
    #[arg(long, default_value_t = 3)]
    frame_skip: u32,
    /// Minimum detection confidence.
    #[arg(long, default_value_t = 0.25)]
    confidence: f32,
    /// Output directory for the report and summary.
    #[arg(long, default_value = "demo_out")]
    out: String,
    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if args.frames == 0 {
        return Err(anyhow!("frames must be >= 1"));
    }

    let out_dir = PathBuf::from(&args.out);
    fs::create_dir_all(&out_dir)
        .with_context(|| format!("creating output directory {}", out_dir.display()))?;
    let ui = ui::Ui::from_args(
        Some(&args.ui),
        std::io::stderr().is_terminal(),
        !std::io::stdout().is_terminal(),
    );

    let cancel = CancelFlag::new();
    let handler_flag = cancel.clone();
    ctrlc::set_handler(move || handler_flag.cancel())
        .map_err(|e| anyhow!("failed to install Ctrl-C handler: {}", e))?;

    let spec = SourceSpec::Video(PathBuf::from(format!(
        "stub://demo?frames={}&width=320&height=240",
        args.frames
    )));
    let mut source = build_source(&spec)?;
    let mut tracker = TrackingDetector::with_default_config(SimulatedTraffic::new(args.seed));
    let mut session = StreamSession::new(SessionSettings::video(args.confidence, args.frame_skip))?;

    let outcome = {
        let progress = ui.frames("Counting synthetic traffic");
        session.run(&mut source, &mut tracker, &cancel, |step| {
            progress.update(step.frames_read, step.frames_processed, &step.counts());
        })?
    };

    let summary = RunSummary::from_session("video", &spec.location(), &outcome);
    let report_path = out_dir.join(REPORT_FILE_NAME);
    let summary_path = out_dir.join("summary.json");
    {
        let _stage = ui.stage("Write report");
        write_csv(&report_path, &summary.rows)?;
        fs::write(&summary_path, summary.to_json()?)
            .with_context(|| format!("writing summary to {}", summary_path.display()))?;
    }

    println!("demo summary:");
    println!("  stream end: {}", outcome.end);
    println!("  frames read: {}", outcome.frames_read);
    println!("  frames processed: {}", outcome.frames_processed);
    println!(
        "  vehicles simulated: {}",
        tracker
            .backend()
            .vehicles_visible_through(outcome.frames_read, args.confidence)
    );
    for line in summary_text(&outcome.counts).lines() {
        println!("  {}", line);
    }
    println!("  report: {}", report_path.display());
    println!("  summary: {}", summary_path.display());
    println!("next steps:");
    println!("  cat {}", report_path.display());
    println!("  cargo run --bin traffic_count -- --backend simulated video stub://road?frames=300");
    Ok(())
}
