//! TOML-driven batch generation of experiment directories.
//!
//! A batch file describes one base experiment plus value lists to sweep
//! (process counts and imbalance fractions). Every combination becomes one
//! experiment directory; generation runs on a thread pool since the
//! directories are disjoint.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, error};
use rayon::prelude::*;
use serde::Deserialize;

use flibench_core::experiment::{
    BuildError, ExperimentBuilder, ExperimentKind, ExperimentSpec,
};
use flibench_core::imbalance::{EliCase, ImbalanceSpec};

// ============================================================================
// Configuration
// ============================================================================

/// The `[batch]` section that marks a TOML file as a batch request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BatchSection {
    /// Number of threads to use (default: all available cores)
    #[serde(default)]
    pub threads: Option<usize>,
}

/// Base experiment parameters shared by every generated experiment.
#[derive(Debug, Clone, Deserialize)]
pub struct BaseExperiment {
    /// Location of the template input files
    pub input_dir: PathBuf,

    /// Directory the experiment directories are created under
    pub output_dir: PathBuf,

    /// Experiment name prefix; swept values are appended
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Number of iterations written as `tmax`
    #[serde(default = "default_iterations")]
    pub iterations: u64,

    /// Domain size, takes priority over the atomic block size
    #[serde(default)]
    pub domain_size: Option<[u64; 3]>,

    /// Atomic block size, used with the process count when no domain size
    /// is given
    #[serde(default)]
    pub atomic_block: Option<[f64; 3]>,

    /// Process count (used when not swept)
    #[serde(default)]
    pub processes: Option<u64>,

    /// Baseline particle count per process
    #[serde(default)]
    pub fli_part_base: u64,

    /// Stack each process's particles at a single point
    #[serde(default)]
    pub fli_part_stack: bool,

    /// Imbalance-handling case (1, 2 or 3)
    #[serde(default)]
    pub eli_case: EliCase,
}

fn default_prefix() -> String {
    "cube".to_string()
}

fn default_iterations() -> u64 {
    1
}

/// Value lists to sweep. Every list multiplies the experiment count.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SweepRanges {
    /// Process counts
    #[serde(default)]
    pub processes: Option<Vec<u64>>,

    /// Fractional fluid imbalance values
    #[serde(default)]
    pub fli_fluid: Option<Vec<f64>>,

    /// Fractional particle imbalance values
    #[serde(default)]
    pub fli_part: Option<Vec<f64>>,
}

impl SweepRanges {
    /// Total number of experiments the sweep expands to.
    pub fn total_experiments(&self) -> usize {
        let mut count = 1usize;
        if let Some(v) = &self.processes {
            count *= v.len().max(1);
        }
        if let Some(v) = &self.fli_fluid {
            count *= v.len().max(1);
        }
        if let Some(v) = &self.fli_part {
            count *= v.len().max(1);
        }
        count
    }
}

/// Complete batch description.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchConfig {
    /// Batch execution settings (presence marks this as a batch request)
    pub batch: BatchSection,

    /// Base experiment parameters
    pub experiment: BaseExperiment,

    /// Parameter value lists to sweep
    #[serde(default)]
    pub sweep: SweepRanges,
}

impl BatchConfig {
    /// Load a batch description from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, BatchError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse a batch description from a TOML string.
    pub fn from_str(s: &str) -> Result<Self, BatchError> {
        if !s.contains("[batch]") {
            return Err(BatchError::NotBatchConfig);
        }
        let config: BatchConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), BatchError> {
        if self.experiment.processes.is_none()
            && self.sweep.processes.as_ref().map_or(true, Vec::is_empty)
        {
            return Err(BatchError::Invalid(
                "a process count is required, either in [experiment] or swept in [sweep]".into(),
            ));
        }
        for (name, values) in [
            ("fli_fluid", &self.sweep.fli_fluid),
            ("fli_part", &self.sweep.fli_part),
        ] {
            if let Some(values) = values {
                if values.iter().any(|&v| v < 0.0) {
                    return Err(BatchError::Invalid(format!(
                        "{name} values must be >= 0"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Effective thread count for generation.
    pub fn effective_threads(&self) -> usize {
        self.batch.threads.unwrap_or_else(num_cpus::get)
    }
}

// ============================================================================
// Expansion
// ============================================================================

/// Expand a batch description into concrete experiment specifications.
///
/// The experiment name encodes the swept values so that directories from one
/// sweep never collide: `<prefix>-p<np>[-ff<fli_fluid>][-fp<fli_part>]`.
pub fn expand_experiments(config: &BatchConfig) -> Vec<ExperimentSpec> {
    let base = &config.experiment;

    let process_values: Vec<Option<u64>> = match &config.sweep.processes {
        Some(v) if !v.is_empty() => v.iter().copied().map(Some).collect(),
        _ => vec![base.processes],
    };
    let fluid_values: Vec<Option<f64>> = match &config.sweep.fli_fluid {
        Some(v) if !v.is_empty() => v.iter().copied().map(Some).collect(),
        _ => vec![None],
    };
    let part_values: Vec<Option<f64>> = match &config.sweep.fli_part {
        Some(v) if !v.is_empty() => v.iter().copied().map(Some).collect(),
        _ => vec![None],
    };

    let mut specs = Vec::new();
    for &np in &process_values {
        for &fli_fluid in &fluid_values {
            for &fli_part in &part_values {
                let mut name = base.prefix.clone();
                if let Some(np) = np {
                    name.push_str(&format!("-p{np}"));
                }
                if let Some(f) = fli_fluid {
                    name.push_str(&format!("-ff{f}"));
                }
                if let Some(f) = fli_part {
                    name.push_str(&format!("-fp{f}"));
                }

                let imbalance = ImbalanceSpec {
                    fli_fluid,
                    fli_part,
                    fli_part_base: base.fli_part_base,
                    fli_part_stack: base.fli_part_stack,
                    eli_case: base.eli_case,
                };
                let kind = if imbalance.is_active() {
                    ExperimentKind::Imbalanced(imbalance)
                } else {
                    ExperimentKind::Uniform
                };

                specs.push(ExperimentSpec {
                    name,
                    input_dir: base.input_dir.clone(),
                    output_dir: base.output_dir.clone(),
                    processes: np,
                    domain_size: base.domain_size,
                    atomic_block: base.atomic_block,
                    iterations: base.iterations,
                    kind,
                });
            }
        }
    }
    specs
}

// ============================================================================
// Execution
// ============================================================================

/// One failed experiment within a batch.
#[derive(Debug)]
pub struct ExperimentFailure {
    pub name: String,
    pub error: BuildError,
}

/// Batch errors.
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("TOML file does not contain a [batch] section")]
    NotBatchConfig,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid batch description: {0}")]
    Invalid(String),

    #[error("could not build the thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("{failed} of {total} experiments failed")]
    Failed { failed: usize, total: usize },
}

/// Generate every experiment of a batch description.
pub fn run(config_path: PathBuf, dry_run: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = BatchConfig::from_file(&config_path)?;
    let specs = expand_experiments(&config);

    if dry_run {
        println!("{} experiments:", specs.len());
        for spec in &specs {
            println!("  {}", spec.experiment_dir().display());
        }
        return Ok(());
    }

    let threads = config.effective_threads();
    debug!("generating {} experiments on {} threads", specs.len(), threads);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .map_err(BatchError::from)?;

    let bar = ProgressBar::new(specs.len() as u64);
    bar.set_style(
        ProgressStyle::with_template("[{elapsed_precise}] {bar:40} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let failures: Mutex<Vec<ExperimentFailure>> = Mutex::new(Vec::new());
    let total = specs.len();

    pool.install(|| {
        specs.par_iter().for_each(|spec| {
            bar.set_message(spec.name.clone());
            if let Err(e) = ExperimentBuilder::new(spec.clone()).build() {
                error!("experiment {} failed: {e}", spec.name);
                if let Ok(mut failures) = failures.lock() {
                    failures.push(ExperimentFailure {
                        name: spec.name.clone(),
                        error: e,
                    });
                }
            }
            bar.inc(1);
        });
    });
    bar.finish_and_clear();

    let failures = failures.into_inner().unwrap_or_default();
    if failures.is_empty() {
        println!("generated {total} experiments in {}", config.experiment.output_dir.display());
        Ok(())
    } else {
        for failure in &failures {
            eprintln!("  {}: {}", failure.name, failure.error);
        }
        Err(Box::new(BatchError::Failed {
            failed: failures.len(),
            total,
        }))
    }
}

// ============================================================================
// Tests
// ============================================================================
