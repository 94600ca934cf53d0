//! Dry-run a scan configuration against simulated hardware.
//!
//! Loads a JSON scan configuration, drives simulated PI stages and a simulated
//! lock-in through the full scan, and writes the reconstructed data as CSV.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::thread;

use anyhow::{Context, Result};
use clap::Parser;
use hardware::sim::{SimulatedAxis, SimulatedLockin, TriggerLine};
use scan::config::MainAxis;
use scan::stream;
use scan::{ClampToRange, Orchestrator, ScanConfig, ScanData, ScanOutcome, Stage};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "scan_sim")]
#[command(about = "Run a scan configuration against simulated stage and lock-in")]
#[command(version)]
struct Args {
    /// Path to the JSON scan configuration
    config: PathBuf,

    /// Output CSV path
    #[arg(short, long, default_value = "scan_data.csv")]
    output: PathBuf,

    #[arg(
        long,
        default_value = "0.0",
        help = "Lower travel limit of the simulated primary axis",
        long_help = "Lower travel limit of the simulated primary axis in stage units. \
            Scan edges outside [travel_min, travel_max] are rejected unless \
            --clamp-edges is given."
    )]
    travel_min: f64,

    /// Upper travel limit of the simulated primary axis
    #[arg(long, default_value = "25.0")]
    travel_max: f64,

    /// Lower travel limit of the simulated secondary axis
    #[arg(long, default_value = "0.0")]
    secondary_travel_min: f64,

    /// Upper travel limit of the simulated secondary axis
    #[arg(long, default_value = "25.0")]
    secondary_travel_max: f64,

    /// Clamp out-of-range scan edges to the travel limits
    #[arg(long)]
    clamp_edges: bool,

    #[arg(
        long,
        default_value = "1.0",
        help = "Width of the simulated Gaussian spot",
        long_help = "Width (sigma) of the Gaussian spot the simulated lock-in reports. \
            The spot is centered in the middle of the scan area."
    )]
    spot_width: f64,

    /// Make the given read call (0-based) time out
    #[arg(long)]
    timeout_on_read: Option<usize>,

    /// Make the given read call (0-based) return no data
    #[arg(long)]
    gap_on_read: Option<usize>,
}

fn spot_center(config: &ScanConfig) -> (f64, f64) {
    let mid = |edges: [f64; 2]| 0.5 * (edges[0] + edges[1]);
    let primary = mid(config.scan.edges);
    let secondary = config
        .scan
        .secondary
        .as_ref()
        .map_or(0.0, |s| mid(s.edges));
    (primary, secondary)
}

/// Whether the secondary axis sweeps (and drives the trigger line).
fn sweeps_secondary(config: &ScanConfig) -> bool {
    config.scan.dimension == 2 && config.scan.main_axis == MainAxis::Secondary
}

fn build_lockin(line: &TriggerLine, config: &ScanConfig, args: &Args) -> SimulatedLockin {
    let (cp, cs) = spot_center(config);
    let swapped = sweeps_secondary(config);
    let sigma2 = 2.0 * args.spot_width * args.spot_width;
    let is_raster = config.scan.dimension == 2;

    // The lock-in sees (sweep, step) positions; map back to (primary, secondary).
    let signal = Box::new(move |sweep: f64, step: f64| {
        let (p, s) = if swapped { (step, sweep) } else { (sweep, step) };
        let r2 = if is_raster {
            (p - cp).powi(2) + (s - cs).powi(2)
        } else {
            (p - cp).powi(2)
        };
        (-r2 / sigma2).exp()
    });

    let mut lockin = SimulatedLockin::new(line.clone(), signal);
    if let Some(n) = args.timeout_on_read {
        lockin = lockin.with_timeout_on_read(n);
    }
    if let Some(n) = args.gap_on_read {
        lockin = lockin.with_gap_on_read(n);
    }
    lockin
}

fn write_csv(path: &Path, outcome: &ScanOutcome, signals: &[String]) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut out = BufWriter::new(file);

    match &outcome.data {
        ScanData::Line(samples) => {
            writeln!(out, "position,{}", signals.join(","))?;
            for sample in samples {
                write!(out, "{:10.6}", sample.position)?;
                for v in &sample.values {
                    write!(out, ",{v:10.6}")?;
                }
                writeln!(out)?;
            }
        }
        ScanData::Raster(frames) => {
            writeln!(out, "primary,secondary,{}", signals.join(","))?;
            let Some(first) = frames.first() else {
                return Ok(());
            };
            for (r, &row_pos) in first.row_positions.iter().enumerate() {
                for (c, &col_pos) in first.column_positions.iter().enumerate() {
                    let (primary, secondary) = match first.main_axis {
                        MainAxis::Primary => (col_pos, row_pos),
                        MainAxis::Secondary => (row_pos, col_pos),
                    };
                    write!(out, "{primary:10.6},{secondary:10.6}")?;
                    for frame in frames {
                        write!(out, ",{:10.6}", frame.values[[r, c]])?;
                    }
                    writeln!(out)?;
                }
            }
        }
    }
    out.flush()?;
    Ok(())
}

fn main() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let args = Args::parse();
    let config = ScanConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    info!("Loaded scan configuration from {}", args.config.display());

    let line = TriggerLine::new();
    let lockin = build_lockin(&line, &config, &args);
    let (events_tx, events_rx) = stream::channel(config.run.event_buffer);

    let primary = SimulatedAxis::new(args.travel_min, args.travel_max);
    let secondary = SimulatedAxis::new(args.secondary_travel_min, args.secondary_travel_max);
    let (primary, secondary) = if sweeps_secondary(&config) {
        (
            primary.with_aux_line(line.clone()),
            secondary.with_trigger_line(line.clone()),
        )
    } else {
        (
            primary.with_trigger_line(line.clone()),
            secondary.with_aux_line(line.clone()),
        )
    };
    let stage = if config.scan.dimension == 2 {
        Stage::chain(primary, secondary)
    } else {
        Stage::single(primary)
    };

    let mut builder = Orchestrator::builder(config.clone())
        .stage(stage)
        .acquisition(lockin)
        .events(events_tx);
    if args.clamp_edges {
        builder = builder.remediation(ClampToRange);
    }
    let mut orchestrator = builder.build().context("invalid scan setup")?;

    let consumer = thread::spawn(move || stream::collect(&events_rx));
    let result = orchestrator.run();
    let (mut stage, _lockin) = orchestrator.into_parts();
    let collected = consumer
        .join()
        .map_err(|_| anyhow::anyhow!("event consumer panicked"))?;
    info!(
        "Live stream delivered {} samples over {} rows",
        collected.samples.len(),
        collected.rows_completed
    );
    if let Err(e) = stage.close() {
        warn!("Failed to close stage: {e}");
    }

    let outcome = result.context("scan failed")?;
    if let Some(abort) = &outcome.abort {
        warn!("Scan ended early: {abort}");
    }
    for gap in &outcome.gaps {
        warn!("Skipped sample {}: {gap}", gap.index());
    }

    write_csv(&args.output, &outcome, &config.daq.signals)?;
    info!(
        "Wrote {} points to {} (state: {}, partial: {})",
        outcome.data.len(),
        args.output.display(),
        outcome.state,
        outcome.partial
    );
    Ok(())
}
