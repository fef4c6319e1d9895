use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use log::LevelFilter;

use flibench_core::experiment::{ExperimentBuilder, ExperimentKind, ExperimentSpec};
use flibench_core::imbalance::{EliCase, ImbalanceSpec};

mod batch;
mod meta;
mod trace;

#[derive(Parser, Debug)]
#[command(
    name = "flibench",
    about = "Benchmark experiment setup for particle-in-fluid simulations"
)]
struct Cli {
    /// Logging level
    #[arg(short = 'v', long = "log", value_enum, default_value_t = LogLevel::Warning, global = true)]
    log: LogLevel,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl From<LogLevel> for LevelFilter {
    fn from(value: LogLevel) -> Self {
        match value {
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Warning => LevelFilter::Warn,
            LogLevel::Error | LogLevel::Critical => LevelFilter::Error,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a single experiment directory
    Setup(SetupArgs),
    /// Generate a sweep of experiments from a TOML description
    Batch(BatchArgs),
    /// Write the metadata YAML stored with each experiment
    Meta(meta::MetaArgs),
    /// Convert Score-P trace summaries to annotated CSV
    Trace(trace::TraceArgs),
}

#[derive(Args, Debug)]
struct SetupArgs {
    /// Location of all input (template) files
    #[arg(short, long, default_value = "./")]
    input_dir: PathBuf,

    /// Location of the output directory
    #[arg(short, long, default_value = "./")]
    output_dir: PathBuf,

    /// Name of the experiment
    #[arg(short, long, default_value = "cube")]
    name: String,

    /// Number of processes
    #[arg(short = 'p', long)]
    np: Option<u64>,

    /// Size of the domain, format x,y,z
    #[arg(short, long, value_parser = parse_u64_triple)]
    size: Option<[u64; 3]>,

    /// Size of an atomic block, format x,y,z
    #[arg(short, long, value_parser = parse_f64_triple)]
    atomic_block_size: Option<[f64; 3]>,

    /// Number of iterations
    #[arg(short = 't', long, default_value_t = 1)]
    iterations: u64,

    /// Fractional fluid imbalance (enlarges one slab of the decomposition)
    #[arg(long)]
    fli_fluid: Option<f64>,

    /// Fractional particle imbalance (skews per-process particle counts)
    #[arg(long)]
    fli_part: Option<f64>,

    /// Baseline particle count per process
    #[arg(long, default_value_t = 0)]
    fli_part_base: u64,

    /// Stack each process's particles at a single point
    #[arg(long)]
    fli_part_stack: bool,

    /// Imbalance-handling case (1, 2 or 3)
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(1..=3))]
    eli_case: u8,
}

#[derive(Args, Debug)]
struct BatchArgs {
    /// Path to a TOML batch description (must contain a [batch] section)
    #[arg(short, long)]
    config: PathBuf,

    /// Expand and list the experiments without generating anything
    #[arg(long)]
    dry_run: bool,
}

fn parse_u64_triple(s: &str) -> Result<[u64; 3], String> {
    let parts: Vec<&str> = s.split(',').collect();
    if parts.len() != 3 {
        return Err(format!("expected x,y,z, got '{s}'"));
    }
    let mut out = [0u64; 3];
    for (slot, part) in out.iter_mut().zip(&parts) {
        *slot = part
            .trim()
            .parse()
            .map_err(|e| format!("invalid component '{part}': {e}"))?;
    }
    Ok(out)
}

fn parse_f64_triple(s: &str) -> Result<[f64; 3], String> {
    let parts: Vec<&str> = s.split(',').collect();
    if parts.len() != 3 {
        return Err(format!("expected x,y,z, got '{s}'"));
    }
    let mut out = [0f64; 3];
    for (slot, part) in out.iter_mut().zip(&parts) {
        *slot = part
            .trim()
            .parse()
            .map_err(|e| format!("invalid component '{part}': {e}"))?;
    }
    Ok(out)
}

impl SetupArgs {
    fn into_spec(self) -> Result<ExperimentSpec, String> {
        let imbalance = ImbalanceSpec {
            fli_fluid: self.fli_fluid,
            fli_part: self.fli_part,
            fli_part_base: self.fli_part_base,
            fli_part_stack: self.fli_part_stack,
            eli_case: EliCase::try_from(self.eli_case)?,
        };
        let kind = if imbalance.is_active() {
            ExperimentKind::Imbalanced(imbalance)
        } else {
            ExperimentKind::Uniform
        };
        Ok(ExperimentSpec {
            name: self.name,
            input_dir: self.input_dir,
            output_dir: self.output_dir,
            processes: self.np,
            domain_size: self.size,
            atomic_block: self.atomic_block_size,
            iterations: self.iterations,
            kind,
        })
    }
}

fn run_setup(args: SetupArgs) -> Result<(), Box<dyn std::error::Error>> {
    let spec = args.into_spec()?;
    let summary = ExperimentBuilder::new(spec).build()?;
    if let Some(grid) = summary.resolution.grid {
        eprintln!("[setup] process grid {}x{}x{}", grid[0], grid[1], grid[2]);
    }
    if summary.particles > 0 {
        eprintln!("[setup] wrote {} particle positions", summary.particles);
    }
    println!("created {}", summary.experiment_dir.display());
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    env_logger::Builder::new()
        .filter_level(cli.log.into())
        .init();

    match cli.command {
        Command::Setup(args) => run_setup(args),
        Command::Batch(args) => batch::run(args.config, args.dry_run),
        Command::Meta(args) => meta::run(args),
        Command::Trace(args) => trace::run(args),
    }
}
