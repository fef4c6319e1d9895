#![cfg(test)]

use std::fs;
use std::path::Path;

use tempfile::TempDir;

use super::experiment::{
    BuildError, ExperimentBuilder, ExperimentKind, ExperimentSpec, TEMPLATE_FILES,
};
use super::imbalance::ImbalanceSpec;

const CONFIG_TEMPLATE: &str = "\
<hemocell>
<domain>
\t<nx> 1 </nx>
\t<ny> 1 </ny>
\t<nz> 1 </nz>
</domain>
<sim>
\t<tmax> 100 </tmax>
</sim>
</hemocell>
";

fn template_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    for name in TEMPLATE_FILES {
        let content = if name == "config.xml" {
            CONFIG_TEMPLATE.to_string()
        } else {
            format!("template {name}\n")
        };
        fs::write(dir.path().join(name), content).unwrap();
    }
    dir
}

fn spec(input: &Path, output: &Path, kind: ExperimentKind) -> ExperimentSpec {
    ExperimentSpec {
        name: "cube".into(),
        input_dir: input.to_path_buf(),
        output_dir: output.to_path_buf(),
        processes: Some(8),
        domain_size: Some([64, 64, 64]),
        atomic_block: None,
        iterations: 5,
        kind,
    }
}

#[test]
fn uniform_build_copies_templates_and_rewrites_the_config() {
    let input = template_dir();
    let output = TempDir::new().unwrap();
    let spec = spec(input.path(), output.path(), ExperimentKind::Uniform);

    let summary = ExperimentBuilder::new(spec).build().unwrap();
    assert_eq!(summary.experiment_dir, output.path().join("cube"));
    assert_eq!(summary.particles, 0);
    assert_eq!(summary.resolution.grid, Some([2, 2, 2]));

    for name in TEMPLATE_FILES {
        assert!(summary.experiment_dir.join(name).exists(), "missing {name}");
    }

    let config = fs::read_to_string(summary.experiment_dir.join("config.xml")).unwrap();
    assert!(config.contains("\t<tmax> 5 </tmax>"));
    assert!(config.contains("\t<nx> 64 </nx>"));
    assert!(config.contains("\t<ny> 64 </ny>"));
    assert!(config.contains("\t<nz> 64 </nz>"));
    assert!(!config.contains("FLIpart"));

    // uniform experiments keep the template positions untouched
    let pos = fs::read_to_string(summary.experiment_dir.join("RBC.pos")).unwrap();
    assert_eq!(pos, "template RBC.pos\n");
}

#[test]
fn imbalanced_build_writes_positions_and_parameters() {
    let input = template_dir();
    let output = TempDir::new().unwrap();
    let imbalance = ImbalanceSpec {
        fli_part: Some(1.0),
        fli_part_base: 100,
        fli_part_stack: true,
        ..Default::default()
    };
    let spec = spec(
        input.path(),
        output.path(),
        ExperimentKind::Imbalanced(imbalance),
    );

    let summary = ExperimentBuilder::new(spec).build().unwrap();
    // 8 processes have an empty hot set, so every process keeps the baseline.
    assert_eq!(summary.particles, 800);

    let pos = fs::read_to_string(summary.experiment_dir.join("RBC.pos")).unwrap();
    assert_eq!(pos.lines().next(), Some("800"));
    assert_eq!(pos.lines().count(), 801);

    let config = fs::read_to_string(summary.experiment_dir.join("config.xml")).unwrap();
    assert!(config.contains("\t<FLIpart> 1 </FLIpart>"));
}

#[test]
fn inactive_imbalance_behaves_like_uniform() {
    let input = template_dir();
    let output = TempDir::new().unwrap();
    let spec = spec(
        input.path(),
        output.path(),
        ExperimentKind::Imbalanced(ImbalanceSpec::default()),
    );

    let summary = ExperimentBuilder::new(spec).build().unwrap();
    assert_eq!(summary.particles, 0);
    let pos = fs::read_to_string(summary.experiment_dir.join("RBC.pos")).unwrap();
    assert_eq!(pos, "template RBC.pos\n");
}

#[test]
fn active_imbalance_without_geometry_is_a_precondition_error() {
    let input = template_dir();
    let output = TempDir::new().unwrap();
    let imbalance = ImbalanceSpec {
        fli_part: Some(1.0),
        fli_part_base: 100,
        ..Default::default()
    };
    let mut spec = spec(
        input.path(),
        output.path(),
        ExperimentKind::Imbalanced(imbalance),
    );
    spec.domain_size = None;

    let err = ExperimentBuilder::new(spec).build().unwrap_err();
    assert!(matches!(err, BuildError::Precondition(_)));
}

#[test]
fn partition_errors_propagate() {
    let input = template_dir();
    let output = TempDir::new().unwrap();
    let mut spec = spec(input.path(), output.path(), ExperimentKind::Uniform);
    spec.processes = None;

    let err = ExperimentBuilder::new(spec).build().unwrap_err();
    assert!(matches!(err, BuildError::Partition(_)));
}

#[test]
fn rebuilding_an_existing_experiment_succeeds() {
    let input = template_dir();
    let output = TempDir::new().unwrap();
    let spec = spec(input.path(), output.path(), ExperimentKind::Uniform);

    ExperimentBuilder::new(spec.clone()).build().unwrap();
    let summary = ExperimentBuilder::new(spec).build().unwrap();
    let config = fs::read_to_string(summary.experiment_dir.join("config.xml")).unwrap();
    assert!(config.contains("\t<tmax> 5 </tmax>"));
}

#[test]
fn missing_templates_are_tolerated() {
    let input = TempDir::new().unwrap(); // empty, nothing to copy
    let output = TempDir::new().unwrap();
    let spec = spec(input.path(), output.path(), ExperimentKind::Uniform);

    // config.xml cannot be read either, so the document starts empty and
    // is written out with just the mutated fields.
    let summary = ExperimentBuilder::new(spec).build().unwrap();
    let config = fs::read_to_string(summary.experiment_dir.join("config.xml")).unwrap();
    assert!(config.contains("<sim>"));
    assert!(config.contains("\t<tmax> 5 </tmax>"));
}
