//! Body Sim CLI
//!
//! Walk the synthetic body along named trajectories and check every pose.

use body_sim::{RerunLogger, ScenarioId, ScenarioResult, ScenarioRunner, StitchReport};
use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// Body Sim walk synthesis CLI
#[derive(Parser, Debug)]
#[command(name = "body-sim")]
#[command(about = "Walk a motion-capture body along synthetic trajectories", long_about = None)]
struct Args {
    /// Seed for marker noise
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Scenario to run (straight, circle, zigzag, diagonal, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Trajectory duration in seconds
    #[arg(short, long, default_value = "10")]
    duration: f64,

    /// Real-time length of one two-step gait cycle in seconds
    #[arg(long, default_value = "1.05")]
    step_period: f64,

    /// Body description JSON (defaults to the built-in body)
    #[arg(long)]
    body: Option<String>,

    /// Gaussian marker noise in centimeters
    #[arg(long, default_value = "0")]
    noise: f64,

    /// Export per-tick geometry to a JSON file
    #[arg(long)]
    export: Option<String>,

    /// Stitch the gait cycle along the scenario path instead of walking it
    #[arg(long)]
    stitch: bool,

    /// Stream poses to a Rerun viewer (needs the `visualization` feature)
    #[arg(long)]
    visualize: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }

    if !args.json {
        info!("Body Sim v0.1.0");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        match args.scenario.parse() {
            Ok(s) => vec![s],
            Err(e) => {
                eprintln!("Error: {}", e);
                eprintln!("Available scenarios: straight, circle, zigzag, diagonal, all");
                std::process::exit(1);
            }
        }
    };

    let mut runner = ScenarioRunner::new(args.seed)
        .with_duration(args.duration)
        .with_step_period(args.step_period)
        .with_noise(args.noise);
    if let Some(path) = &args.body {
        match std::fs::read_to_string(path) {
            Ok(json) => runner = runner.with_body(json),
            Err(e) => {
                eprintln!("Error: cannot read body description {}: {}", path, e);
                std::process::exit(1);
            }
        }
    }

    if args.stitch {
        std::process::exit(run_stitch(&runner, &scenarios, args.json));
    }

    if args.export.is_some() && scenarios.len() > 1 {
        eprintln!("Error: --export only supports a single scenario, not 'all'");
        std::process::exit(1);
    }

    let logger = if args.visualize {
        RerunLogger::new("body_sim")
    } else {
        RerunLogger::disabled()
    };

    let mut all_results: Vec<ScenarioResult> = Vec::new();
    for scenario in &scenarios {
        let result = runner.run_logged(*scenario, &logger, args.export.as_deref());

        if !args.json {
            if result.passed {
                info!(
                    "✓ {} (seed={}) PASSED: {} ticks, {:.1} m, basis error {:.1e}",
                    scenario.name(),
                    args.seed,
                    result.total_ticks,
                    result.metrics.distance_m,
                    result.metrics.max_orthonormality_error
                );
            } else {
                error!(
                    "✗ {} (seed={}) FAILED: {}",
                    scenario.name(),
                    args.seed,
                    result.failure_reason.as_deref().unwrap_or("unknown")
                );
            }
        }
        all_results.push(result);
    }

    let total = all_results.len();
    let failed_count = all_results.iter().filter(|r| !r.passed).count();

    if args.json {
        let summary = serde_json::json!({
            "total": total,
            "passed": total - failed_count,
            "failed": failed_count,
            "results": all_results.iter().map(|r| {
                serde_json::json!({
                    "scenario": r.scenario.name(),
                    "seed": r.seed,
                    "passed": r.passed,
                    "ticks": r.total_ticks,
                    "time_secs": r.final_time_secs,
                    "distance_m": r.metrics.distance_m,
                    "max_orthonormality_error": r.metrics.max_orthonormality_error,
                    "max_centroid_offset": r.metrics.max_centroid_offset,
                    "failure_reason": r.failure_reason,
                })
            }).collect::<Vec<_>>(),
        });
        print_json(&summary);
    } else {
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        if failed_count == 0 {
            info!("✅ All {} scenario runs passed!", total);
        } else {
            error!("❌ {}/{} scenario runs failed!", failed_count, total);
        }
    }

    if failed_count > 0 {
        std::process::exit(1);
    }
}

/// Stitches every scenario and returns the process exit code.
fn run_stitch(runner: &ScenarioRunner, scenarios: &[ScenarioId], json: bool) -> i32 {
    let mut reports: Vec<StitchReport> = Vec::new();
    let mut failed = 0;
    for scenario in scenarios {
        match runner.stitch(*scenario) {
            Ok(report) => {
                if !json {
                    info!(
                        "✓ {} stitched: {} segments, {} slices, {} frames, {} wraps",
                        scenario.name(),
                        report.segments,
                        report.slices,
                        report.frames,
                        report.wraps
                    );
                }
                reports.push(report);
            }
            Err(e) => {
                error!("✗ {} stitching FAILED: {}", scenario.name(), e);
                failed += 1;
            }
        }
    }

    if json {
        let summary = serde_json::json!({
            "failed": failed,
            "results": reports.iter().map(|r| {
                serde_json::json!({
                    "scenario": r.scenario.name(),
                    "segments": r.segments,
                    "slices": r.slices,
                    "frames": r.frames,
                    "wraps": r.wraps,
                })
            }).collect::<Vec<_>>(),
        });
        print_json(&summary);
    }
    i32::from(failed > 0)
}

fn print_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => eprintln!("Error: cannot serialize summary: {}", e),
    }
}
