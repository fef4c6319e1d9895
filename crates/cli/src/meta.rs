//! Metadata YAML assembly.
//!
//! Every experiment ships a `meta.yml` recording where and how it was run:
//! scheduler allocation, the benchmark and simulation checkouts (commit,
//! origin, last tag) and the energy-management policy. Section and field
//! order is preserved, so the file diffs cleanly between runs.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use clap::Args;
use log::warn;
use serde_yaml::{Mapping, Value};

#[derive(Args, Debug)]
pub struct MetaArgs {
    /// Simulation (HemoCell) checkout directory
    pub hemocell_dir: PathBuf,

    /// Benchmark checkout directory (holds the existing meta.yml)
    pub benchmark_dir: PathBuf,

    /// Which platform we are running on
    #[arg(short, long)]
    pub platform: Option<String>,

    /// Experiment id
    #[arg(short, long)]
    pub id: Option<String>,

    /// Name of the output file
    #[arg(short = 'f', long, default_value = "meta.yml")]
    pub out_file: PathBuf,
}

/// Metadata errors. Missing git data or environment variables are tolerated
/// (the field stays null); only writing the output file fails hard.
#[derive(Debug, thiserror::Error)]
pub enum MetaError {
    #[error("cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML serialization failed: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub fn run(args: MetaArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut meta = Mapping::new();
    meta.insert("General".into(), Value::Mapping(general_section(&args)));
    meta.insert(
        "Benchmark".into(),
        Value::Mapping(benchmark_section(&args.benchmark_dir)),
    );
    meta.insert(
        "Hemocell".into(),
        Value::Mapping(hemocell_section(&args.hemocell_dir)),
    );
    meta.insert("Ear".into(), Value::Mapping(ear_section()));

    let yaml = serde_yaml::to_string(&meta).map_err(MetaError::from)?;
    fs::write(&args.out_file, yaml).map_err(|e| MetaError::Write {
        path: args.out_file.clone(),
        source: e,
    })?;
    println!("wrote {}", args.out_file.display());
    Ok(())
}

fn general_section(args: &MetaArgs) -> Mapping {
    let mut section = Mapping::new();
    section.insert("Id".into(), optional(args.id.clone()));
    section.insert("Platform".into(), optional(args.platform.clone()));
    section.insert("Date".into(), optional(current_date()));
    section.insert("Node_list".into(), env_value("SLURM_JOB_NODELIST"));
    section.insert("Tasks".into(), env_value("SLURM_NTASKS"));
    section.insert("Nodes".into(), env_value("SLURM_NNODES"));
    section
}

/// Benchmark section: the fields of the checkout's own meta.yml, with the
/// git state merged on top.
fn benchmark_section(dir: &Path) -> Mapping {
    let mut section = match fs::read_to_string(dir.join("meta.yml")) {
        Ok(text) => match serde_yaml::from_str::<Mapping>(&text) {
            Ok(mapping) => mapping,
            Err(e) => {
                warn!("could not parse {}/meta.yml: {e}", dir.display());
                Mapping::new()
            }
        },
        Err(e) => {
            warn!("could not read {}/meta.yml: {e}", dir.display());
            Mapping::new()
        }
    };
    merge_git_state(&mut section, dir);
    section
}

fn hemocell_section(dir: &Path) -> Mapping {
    let mut section = Mapping::new();
    merge_git_state(&mut section, dir);
    section.insert("Version".into(), optional(last_git_tag(dir)));
    section
}

fn ear_section() -> Mapping {
    let mut section = Mapping::new();
    section.insert("Policy".into(), Value::String("monitoring".into()));
    section
}

/// Overwrite Git_commit and Git_origin with the checkout's current state.
fn merge_git_state(section: &mut Mapping, dir: &Path) {
    section.insert(
        "Git_commit".into(),
        optional(git_output(dir, &["rev-parse", "HEAD"])),
    );
    section.insert(
        "Git_origin".into(),
        optional(git_output(dir, &["ls-remote", "--get-url", "origin"])),
    );
}

/// Run git in the given directory and return trimmed stdout, or None when
/// the command fails (no git, not a repository).
fn git_output(dir: &Path, args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).current_dir(dir).output();
    match output {
        Ok(out) if out.status.success() => {
            Some(String::from_utf8_lossy(&out.stdout).trim().to_string())
        }
        Ok(out) => {
            warn!("git {} failed in {}: {}", args.join(" "), dir.display(), out.status);
            None
        }
        Err(e) => {
            warn!("could not run git in {}: {e}", dir.display());
            None
        }
    }
}

/// Last tag of the checkout, in `git tag -l` order.
fn last_git_tag(dir: &Path) -> Option<String> {
    git_output(dir, &["tag", "-l"])
        .and_then(|tags| tags.lines().last().map(str::to_string))
        .filter(|tag| !tag.is_empty())
}

/// Current local time as `YYYY-MM-DD HH:MM`.
fn current_date() -> Option<String> {
    let output = Command::new("date").arg("+%Y-%m-%d %H:%M").output();
    match output {
        Ok(out) if out.status.success() => {
            Some(String::from_utf8_lossy(&out.stdout).trim().to_string())
        }
        _ => {
            warn!("could not determine the current date");
            None
        }
    }
}

fn env_value(name: &str) -> Value {
    optional(env::var(name).ok())
}

fn optional(value: Option<String>) -> Value {
    match value {
        Some(v) => Value::String(v),
        None => Value::Null,
    }
}

// ============================================================================
// Tests
// ============================================================================
