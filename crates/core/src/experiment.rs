//! Experiment directory assembly.
//!
//! An experiment is a directory holding a copied set of template input files
//! plus a mutated configuration document and, for imbalance experiments, a
//! generated particle-position file. Generation is meant to run unattended
//! and idempotently across reruns (possibly in parallel over *distinct*
//! directories), so filesystem hiccups are logged warnings rather than
//! fatal errors; only the particle-position file write fails hard.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::configdoc::ConfigDocument;
use crate::imbalance::{ImbalanceInjector, ImbalanceSpec, InjectError};
use crate::partition::{self, PartitionError, Resolution};

/// Template input files copied verbatim into every experiment directory.
pub const TEMPLATE_FILES: [&str; 6] = [
    "RBC.xml",
    "RBC.pos",
    "PLT.xml",
    "PLT.pos",
    "config.xml",
    "filter.filter",
];

/// Build errors.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Partition(#[from] PartitionError),

    #[error(transparent)]
    Inject(#[from] InjectError),

    #[error("precondition violated: {0}")]
    Precondition(String),

    #[error("cannot write {path}: {source}")]
    Resource {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Whether an experiment runs balanced or with deliberate imbalance.
///
/// Resolved once at build start; there is no dynamic dispatch between the
/// two flows.
#[derive(Debug, Clone)]
pub enum ExperimentKind {
    Uniform,
    Imbalanced(ImbalanceSpec),
}

/// Everything needed to generate one experiment directory.
#[derive(Debug, Clone)]
pub struct ExperimentSpec {
    pub name: String,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub processes: Option<u64>,
    pub domain_size: Option<[u64; 3]>,
    pub atomic_block: Option<[f64; 3]>,
    pub iterations: u64,
    pub kind: ExperimentKind,
}

impl ExperimentSpec {
    pub fn experiment_dir(&self) -> PathBuf {
        self.output_dir.join(&self.name)
    }
}

/// Outcome of a successful build.
#[derive(Debug)]
pub struct BuildSummary {
    pub experiment_dir: PathBuf,
    pub resolution: Resolution,
    /// Particles written to the position file (0 for uniform experiments).
    pub particles: usize,
}

/// Orchestrates directory creation, template copying, partitioning and
/// imbalance injection for a single experiment.
pub struct ExperimentBuilder {
    spec: ExperimentSpec,
}

impl ExperimentBuilder {
    pub fn new(spec: ExperimentSpec) -> Self {
        Self { spec }
    }

    pub fn build(&self) -> Result<BuildSummary, BuildError> {
        let dir = self.spec.experiment_dir();
        create_experiment_dir(&dir);
        self.copy_templates(&dir);

        let config_path = dir.join("config.xml");
        let mut doc = match ConfigDocument::load(&config_path) {
            Ok(doc) => doc,
            Err(e) => {
                warn!(
                    "could not read {}: {e}; starting from an empty document",
                    config_path.display()
                );
                ConfigDocument::default()
            }
        };

        doc.set_or_insert("sim", "tmax", self.spec.iterations);

        let resolution = partition::resolve(
            self.spec.domain_size,
            self.spec.atomic_block,
            self.spec.processes,
        )?;
        resolution.write_domain(&mut doc);

        let mut particles = 0;
        if let ExperimentKind::Imbalanced(imbalance) = &self.spec.kind {
            if imbalance.is_active() {
                particles = self.inject(imbalance, &resolution, &dir, &mut doc)?;
            }
        }

        if let Err(e) = doc.save(&config_path) {
            warn!("could not update {}: {e}", config_path.display());
        }

        Ok(BuildSummary {
            experiment_dir: dir,
            resolution,
            particles,
        })
    }

    fn copy_templates(&self, dir: &Path) {
        for name in TEMPLATE_FILES {
            let from = self.spec.input_dir.join(name);
            if let Err(e) = fs::copy(&from, dir.join(name)) {
                warn!("could not copy template {}: {e}", from.display());
            }
        }
    }

    /// Run the injector and write the particle-position file.
    fn inject(
        &self,
        imbalance: &ImbalanceSpec,
        resolution: &Resolution,
        dir: &Path,
        doc: &mut ConfigDocument,
    ) -> Result<usize, BuildError> {
        let (domain, atomic_block, grid) = match (
            resolution.domain,
            resolution.atomic_block,
            resolution.grid,
        ) {
            (Some(d), Some(ab), Some(g)) => (d, ab, g),
            _ => {
                return Err(BuildError::Precondition(
                    "imbalance injection requires a resolvable domain geometry \
                     (give a domain size or an atomic-block size, plus a process count)"
                        .into(),
                ))
            }
        };

        let mut injector = ImbalanceInjector::new(grid, domain, atomic_block, imbalance.clone());
        injector.write_parameters(doc);
        let placement = injector.run()?;

        let pos_path = dir.join("RBC.pos");
        let file = fs::File::create(&pos_path).map_err(|e| BuildError::Resource {
            path: pos_path.clone(),
            source: e,
        })?;
        let mut writer = io::BufWriter::new(file);
        placement
            .write_to(&mut writer)
            .and_then(|_| writer.flush())
            .map_err(|e| BuildError::Resource {
                path: pos_path,
                source: e,
            })?;

        Ok(placement.len())
    }
}

/// Create the experiment directory. Pre-existing directories and permission
/// failures are tolerated so that batch generation can rerun or race over
/// disjoint targets.
fn create_experiment_dir(dir: &Path) {
    match fs::create_dir(dir) {
        Ok(()) => info!("created experiment directory {}", dir.display()),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            warn!("experiment '{}' already exists", dir.display());
        }
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            warn!("permission denied: unable to create '{}'", dir.display());
        }
        Err(e) => warn!("could not create '{}': {e}", dir.display()),
    }
}
