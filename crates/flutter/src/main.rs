//! flutter - synthesize OpenTelemetry metrics and traces from a script
//!
//! Usage:
//!   flutter simulate config.yaml
//!   flutter simulate --timeline incident.json --dry-run --output debug base.yaml
//!   flutter simulate --dump-script base.yaml overrides.yaml
//!   flutter generators

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use flutter::{DebugEmitter, OtlpEmitter, TickerEmitter, load_configs, load_timeline};
use flutter_core::{EmitContext, Emitter, list_generators};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "flutter")]
#[command(about = "Synthetic OpenTelemetry metrics and traces driven by a timed script", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the merged configuration files
    Simulate(SimulateArgs),

    /// List the built-in generator kinds
    Generators,
}

#[derive(Args)]
struct SimulateArgs {
    /// Configuration files, merged in order
    #[arg(required = true, value_name = "CONFIG")]
    configs: Vec<PathBuf>,

    /// Timeline file to compile into the script (JSON, or YAML by extension)
    #[arg(long = "timeline", value_name = "FILE")]
    timelines: Vec<PathBuf>,

    /// Compute but do not emit batches before this offset (e.g. 5m)
    #[arg(long, value_parser = humantime::parse_duration)]
    from: Option<Duration>,

    /// Seed for the random source; overrides the configuration
    #[arg(long)]
    seed: Option<u64>,

    /// Run as fast as possible and skip the OTLP exporter
    #[arg(long)]
    dry_run: bool,

    /// Local output
    #[arg(long, value_enum, default_value_t = Output::Ticker)]
    output: Output,

    /// Print the prepared script as YAML and exit
    #[arg(long)]
    dump_script: bool,

    /// Dispatch every due action in the same tick
    #[arg(long)]
    drain_due_actions: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum Output {
    Debug,
    Ticker,
    None,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate(args) => run_simulate(args),
        Commands::Generators => {
            run_generators();
            Ok(())
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn run_simulate(args: SimulateArgs) -> Result<()> {
    init_logging(args.verbose);

    let mut config = load_configs(&args.configs).context("loading configuration")?;
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    config.dryrun |= args.dry_run;

    let mut script = config.to_script();
    for path in &args.timelines {
        let timeline = load_timeline(path)?;
        timeline
            .merge_into_script(&mut script)
            .with_context(|| format!("compiling timeline {}", path.display()))?;
    }
    script.prepare(config.duration).context("preparing script")?;

    if args.dump_script {
        script.dump(io::stdout().lock()).context("writing script")?;
        return Ok(());
    }

    let mut run = config.to_run_config();
    run.from = args.from.unwrap_or_default();
    run.drain_due_actions = args.drain_due_actions;

    let mut emitters: Vec<Box<dyn Emitter>> = Vec::new();
    match args.output {
        Output::Debug => emitters.push(Box::new(DebugEmitter::new(io::stdout()))),
        Output::Ticker => emitters.push(Box::new(TickerEmitter::stderr())),
        Output::None => {}
    }
    if config.otlp_destination.is_configured() && !config.dryrun {
        let otlp = OtlpEmitter::new(&config.otlp_destination).context("building OTLP exporter")?;
        info!(endpoint = %config.otlp_destination.endpoint, "exporting to collector");
        emitters.push(Box::new(otlp));
    }

    let summary = script.run(&run, &mut emitters, &EmitContext::new())?;
    info!(
        ticks = summary.ticks,
        actions = summary.actions_dispatched,
        datapoints = summary.datapoints,
        spans = summary.spans,
        "simulation complete"
    );
    Ok(())
}

fn run_generators() {
    println!("Available generators:");
    for (kind, description) in list_generators() {
        println!("  {:<12} {}", kind, description);
    }
}
