//! Score-P trace post-processing.
//!
//! Each experiment directory holds a `*SCOREP*` subdirectory produced by an
//! instrumented run. The Cube toolchain (`square`, `cube_canonize`,
//! `cube_cut`, `cube_dump`, `cube_calltree`) condenses those measurements
//! into a single `.cubex` file and a CSV dump; this module drives that
//! pipeline and annotates the CSV with a cleaned region name and the
//! iteration each call node belongs to.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use clap::Args;
use log::{debug, info, warn};

#[derive(Args, Debug)]
pub struct TraceArgs {
    /// Directory holding the experiment directories. Each experiment is
    /// expected to contain a subdirectory with SCOREP in its name.
    pub expdir: PathBuf,

    /// Name of the .csv and .cubex output files
    #[arg(short, long, default_value = "results")]
    pub outputname: String,

    /// Name of the .cubex output file, defaults to the --outputname value
    #[arg(short, long)]
    pub cubexname: Option<String>,

    /// Treat the given directory as one specific experiment
    #[arg(short, long)]
    pub single: bool,

    /// Regenerate already existing cubex and csv files
    #[arg(short, long)]
    pub force: bool,

    /// Fallback cutpoint for re-rooting the call tree when no iteration
    /// slices are present
    #[arg(long, default_value = "void hemo::hemocell::iterate")]
    pub cutpoint: String,
}

/// Trace conversion errors.
#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no *SCOREP* subdirectory in {0}")]
    MissingScorepDir(PathBuf),

    #[error("{command} failed with {status}")]
    Command { command: String, status: String },

    #[error("malformed CSV {path}: {reason}")]
    Csv { path: PathBuf, reason: String },
}

pub fn run(args: TraceArgs) -> Result<(), Box<dyn std::error::Error>> {
    let cubexname = args.cubexname.clone().unwrap_or_else(|| args.outputname.clone());

    if args.single {
        convert_experiment(&args, &args.expdir, &cubexname)?;
        return Ok(());
    }

    let mut entries: Vec<PathBuf> = fs::read_dir(&args.expdir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    entries.sort();

    for exp_dir in entries {
        if let Err(e) = convert_experiment(&args, &exp_dir, &cubexname) {
            warn!("skipping {}: {e}", exp_dir.display());
        }
    }
    Ok(())
}

fn convert_experiment(args: &TraceArgs, exp_dir: &Path, cubexname: &str) -> Result<(), TraceError> {
    info!("entering {}", exp_dir.display());
    let scoredir = find_scorep_dir(exp_dir)?;
    let cubexfile = scoredir.join(format!("{cubexname}.cubex"));
    let csvfile = exp_dir.join(format!("{}.csv", args.outputname));

    if csvfile.exists() && !args.force {
        info!("{} already exists, skipping", csvfile.display());
        return Ok(());
    }

    if !cubexfile.exists() || args.force {
        generate_cubex(&scoredir, &cubexfile, &args.cutpoint)?;
    }

    run_command(Command::new("cube_dump").args([
        "-m",
        "comp,mpi,execution",
        "-s",
        "csv2",
        "-z",
        "incl",
        "-o",
    ])
    .arg(&csvfile)
    .arg(&cubexfile))?;

    annotate_csv_file(&csvfile, &cubexfile)?;
    println!("wrote {}", csvfile.display());
    Ok(())
}

/// The measurement subdirectory, identified by SCOREP in its name.
fn find_scorep_dir(exp_dir: &Path) -> Result<PathBuf, TraceError> {
    for entry in fs::read_dir(exp_dir)? {
        let path = entry?.path();
        if path.is_dir()
            && path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.contains("SCOREP"))
        {
            return Ok(path);
        }
    }
    Err(TraceError::MissingScorepDir(exp_dir.to_path_buf()))
}

/// Condense the raw measurement into a canonicalized, re-rooted cubex file.
fn generate_cubex(scoredir: &Path, cubexfile: &Path, cutpoint: &str) -> Result<(), TraceError> {
    debug!("generating {}", cubexfile.display());
    run_command(Command::new("square").arg("-s").arg(scoredir))?;
    run_command(
        Command::new("cube_canonize")
            .arg("-cfl")
            .arg(scoredir.join("summary.cubex"))
            .arg(cubexfile),
    )?;

    // Re-root at the iteration slices when present, else at the configured
    // cutpoint; a cubex without either is left whole.
    let calltree = calltree_output(cubexfile)?;
    let root = if calltree.contains("slice") {
        Some("slice")
    } else if calltree.contains(cutpoint) {
        Some(cutpoint)
    } else {
        None
    };
    if let Some(root) = root {
        run_command(
            Command::new("cube_cut")
                .args(["-r", root, "-o"])
                .arg(cubexfile)
                .arg(cubexfile),
        )?;
    }
    Ok(())
}

fn calltree_output(cubexfile: &Path) -> Result<String, TraceError> {
    let output = Command::new("cube_calltree")
        .arg(cubexfile)
        .output()
        .map_err(TraceError::Io)?;
    if !output.status.success() {
        return Err(TraceError::Command {
            command: format!("cube_calltree {}", cubexfile.display()),
            status: output.status.to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn run_command(command: &mut Command) -> Result<(), TraceError> {
    let rendered = format!("{command:?}");
    debug!("running {rendered}");
    let status = command.status().map_err(TraceError::Io)?;
    if status.success() {
        Ok(())
    } else {
        Err(TraceError::Command {
            command: rendered,
            status: status.to_string(),
        })
    }
}

// ============================================================================
// CSV annotation
// ============================================================================

/// Append regionName and iteration columns to the dumped CSV.
///
/// The call-node listing is in cnode-id order, so the line index in the
/// `cube_calltree` output is the cnode id the CSV rows refer to.
fn annotate_csv_file(csvfile: &Path, cubexfile: &Path) -> Result<(), TraceError> {
    let calltree = calltree_output(cubexfile)?;
    let regions = region_table(&calltree);
    let csv = fs::read_to_string(csvfile)?;
    let annotated = annotate_csv(&csv, &regions).map_err(|reason| TraceError::Csv {
        path: csvfile.to_path_buf(),
        reason,
    })?;
    fs::write(csvfile, annotated)?;
    Ok(())
}

/// Region name and iteration number per cnode id.
///
/// The iteration counter increments at every `iteration=` region after the
/// first, so all call nodes between two iteration markers share a number.
fn region_table(calltree: &str) -> Vec<(String, usize)> {
    let mut table = Vec::new();
    let mut iteration = 0usize;
    let mut first_iter = true;

    for line in calltree.lines() {
        let name = clean_region_name(line.trim());
        if name.contains("iteration=") {
            if first_iter {
                first_iter = false;
            } else {
                iteration += 1;
            }
        }
        table.push((name, iteration));
    }
    table
}

/// Strip the argument list and namespace qualifiers from a region name.
fn clean_region_name(name: &str) -> String {
    let mut name = name;
    if let Some(paren) = name.find('(') {
        name = &name[..paren];
    }
    if let Some(colon) = name.rfind(':') {
        name = &name[colon + 1..];
    }
    name.to_string()
}

/// Append the two annotation columns, looking each row's cnode id up in the
/// region table.
fn annotate_csv(csv: &str, regions: &[(String, usize)]) -> Result<String, String> {
    let mut lines = csv.lines();
    let header = lines.next().ok_or_else(|| "empty file".to_string())?;
    let cnode_column = header
        .split(',')
        .position(|col| col.trim() == "Cnode ID")
        .ok_or_else(|| "no 'Cnode ID' column".to_string())?;

    let mut out = String::with_capacity(csv.len());
    out.push_str(header);
    out.push_str(",regionName,iteration\n");

    for line in lines {
        if line.is_empty() {
            continue;
        }
        let cnode: usize = line
            .split(',')
            .nth(cnode_column)
            .and_then(|v| v.trim().parse().ok())
            .ok_or_else(|| format!("unreadable cnode id in row '{line}'"))?;
        let (name, iteration) = regions
            .get(cnode)
            .ok_or_else(|| format!("cnode id {cnode} not in the call tree"))?;
        out.push_str(line);
        out.push_str(&format!(",{name},{iteration}\n"));
    }
    Ok(out)
}

// ============================================================================
// Tests
// ============================================================================
