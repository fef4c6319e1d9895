//! Per-process particle quotas and placement under deliberate load imbalance.
//!
//! To study how a simulation copes with uneven work, an experiment can skew
//! either the spatial decomposition (one enlarged "hot" block along the
//! longest domain axis) or the particle counts (a small hot set of processes
//! receiving a boosted quota while the rest split the remainder). Placement
//! is either *stacked* (all of a process's particles co-located at one point,
//! which is intentional for that mode) or packed on a regular lattice inside
//! the process's sub-volume.

use std::io::{self, Write};

use log::warn;
use serde::{Deserialize, Serialize};

use crate::configdoc::ConfigDocument;

/// Reference particle volume, in domain volume units.
pub const RBC_VOLUME: f64 = 90.0;

/// Per-particle lattice footprint for non-stacked placement.
pub const RBC_SIZE: [f64; 3] = [8.0, 4.0, 8.0];

/// Margin kept between the lattice and the block boundary.
pub const LATTICE_MARGIN: [f64; 3] = [10.0, 5.0, 10.0];

/// Offset applied to stacked placement points.
pub const STACK_MARGIN: f64 = 5.0;

/// Injection errors. A degenerate result is never returned silently.
#[derive(Debug, thiserror::Error)]
pub enum InjectError {
    #[error("invalid imbalance parameters: {0}")]
    Precondition(String),
}

// ============================================================================
// Imbalance Specification
// ============================================================================

/// Placement policy variant (cases 1-3 of the imbalance-handling
/// methodology).
///
/// Cases 1 and 2 share the default placement behavior. Under case 3, stacked
/// placement emits every block's own volume-derived count instead of the
/// skewed per-process quotas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum EliCase {
    #[default]
    Case1,
    Case2,
    Case3,
}

impl TryFrom<u8> for EliCase {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(EliCase::Case1),
            2 => Ok(EliCase::Case2),
            3 => Ok(EliCase::Case3),
            other => Err(format!("ELI case must be 1, 2 or 3, got {other}")),
        }
    }
}

impl From<EliCase> for u8 {
    fn from(value: EliCase) -> Self {
        match value {
            EliCase::Case1 => 1,
            EliCase::Case2 => 2,
            EliCase::Case3 => 3,
        }
    }
}

/// Fractional load imbalance (FLI) parameters for one experiment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImbalanceSpec {
    /// Fractional enlargement of the hot spatial block.
    #[serde(default)]
    pub fli_fluid: Option<f64>,

    /// Skew applied to particle counts.
    #[serde(default)]
    pub fli_part: Option<f64>,

    /// Baseline particle count per process.
    #[serde(default)]
    pub fli_part_base: u64,

    /// Stack every particle of a process at a single point.
    #[serde(default)]
    pub fli_part_stack: bool,

    /// Placement policy variant.
    #[serde(default)]
    pub eli_case: EliCase,
}

impl ImbalanceSpec {
    /// Whether any imbalance parameter is set at all.
    pub fn is_active(&self) -> bool {
        self.fli_fluid.is_some() || self.fli_part.is_some()
    }

    fn validate(&self) -> Result<(), InjectError> {
        if let Some(f) = self.fli_fluid {
            if f < 0.0 {
                return Err(InjectError::Precondition(format!(
                    "fli_fluid must be >= 0, got {f}"
                )));
            }
        }
        if let Some(f) = self.fli_part {
            if f < 0.0 {
                return Err(InjectError::Precondition(format!(
                    "fli_part must be >= 0, got {f}"
                )));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Blocks and Placement
// ============================================================================

/// One process's assigned sub-volume and particle quota.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    /// Spatial origin of the block.
    pub origin: [f64; 3],
    /// Extent of the block along each axis.
    pub size: [f64; 3],
    /// Volume-derived particle quota.
    pub quota: usize,
}

/// An ordered particle placement ready to be written to a position file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Placement {
    positions: Vec<[f64; 3]>,
}

impl Placement {
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn positions(&self) -> &[[f64; 3]] {
        &self.positions
    }

    /// Write the count-prefixed position rows.
    ///
    /// Each row is `x y z 0 0 0` with coordinates to one decimal place; the
    /// trailing zeros are placeholder orientation/velocity fields. An empty
    /// placement still emits the count line.
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        writeln!(w, "{}", self.positions.len())?;
        for p in &self.positions {
            writeln!(w, "{:.1} {:.1} {:.1} 0 0 0", p[0], p[1], p[2])?;
        }
        Ok(())
    }
}

// ============================================================================
// Injector
// ============================================================================

/// Computes per-process blocks, quotas and particle placement for one
/// experiment. The block arena is owned by the injector instance and never
/// shared across experiments.
pub struct ImbalanceInjector {
    grid: [u64; 3],
    domain: [u64; 3],
    atomic_block: [f64; 3],
    spec: ImbalanceSpec,
    blocks: Vec<Block>,
}

impl ImbalanceInjector {
    pub fn new(
        grid: [u64; 3],
        domain: [u64; 3],
        atomic_block: [f64; 3],
        spec: ImbalanceSpec,
    ) -> Self {
        Self {
            grid,
            domain,
            atomic_block,
            spec,
            blocks: Vec::new(),
        }
    }

    /// Blocks built by the last [`run`](Self::run) call, in grid traversal
    /// order (x outermost, z innermost).
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Write the imbalance parameters into the `<benchmark>` section.
    pub fn write_parameters(&self, doc: &mut ConfigDocument) {
        if let Some(f) = self.spec.fli_fluid {
            doc.set_or_insert("benchmark", "FLIfluid", f);
        }
        if let Some(f) = self.spec.fli_part {
            doc.set_or_insert("benchmark", "FLIpart", f);
        }
    }

    /// Build the block arena and compute the full particle placement.
    pub fn run(&mut self) -> Result<Placement, InjectError> {
        self.spec.validate()?;
        self.build_blocks();
        let counts = self.particle_counts()?;

        let placement = if self.spec.fli_part_stack {
            self.place_stacked(&counts)
        } else {
            self.place_lattice(&counts)
        };
        Ok(placement)
    }

    /// Number of processes in the grid.
    fn process_count(&self) -> u64 {
        self.grid[0] * self.grid[1] * self.grid[2]
    }

    /// Particle quota for a block of the given extent.
    ///
    /// Only the interior half of each axis is eligible for placement, hence
    /// the halved extents.
    fn volume_quota(&self, size: [f64; 3]) -> usize {
        let volume = (size[0] / 2.0) * (size[1] / 2.0) * (size[2] / 2.0);
        ((volume / 100.0 * self.spec.fli_part_base as f64) / RBC_VOLUME).floor() as usize
    }

    // ------------------------------------------------------------------
    // Step A: spatial (fluid) imbalance
    // ------------------------------------------------------------------

    /// Build one block per grid cell, in x -> y -> z traversal order.
    ///
    /// With `fli_fluid` set, the cell at index 0 along the longest domain
    /// axis is enlarged by `(1 + fli_fluid)` and the remaining cells along
    /// that axis share the leftover space equally. Otherwise every block is
    /// one plain atomic block.
    fn build_blocks(&mut self) {
        self.blocks.clear();

        let ab = self.atomic_block;
        let (stack_axis, large, small) = match self.spec.fli_fluid {
            Some(f) => {
                let si = argmax(self.domain);
                let mut large = ab;
                large[si] = ab[si] * (1.0 + f);
                let mut small = ab;
                let others = self.grid[si].saturating_sub(1);
                if others > 0 {
                    small[si] = (self.domain[si] as f64 - large[si]) / others as f64;
                }
                (Some(si), large, small)
            }
            None => (None, ab, ab),
        };

        for ix in 0..self.grid[0] {
            for iy in 0..self.grid[1] {
                for iz in 0..self.grid[2] {
                    let cell = [ix, iy, iz];
                    let mut origin = [
                        ix as f64 * ab[0],
                        iy as f64 * ab[1],
                        iz as f64 * ab[2],
                    ];
                    let mut size = ab;
                    if let Some(si) = stack_axis {
                        if cell[si] == 0 {
                            size = large;
                            origin[si] = 0.0;
                        } else {
                            size = small;
                            origin[si] = large[si] + (cell[si] - 1) as f64 * small[si];
                        }
                    }
                    let quota = self.volume_quota(size);
                    self.blocks.push(Block {
                        origin,
                        size,
                        quota,
                    });
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Step B: particle-count skew
    // ------------------------------------------------------------------

    /// Per-process particle counts in grid traversal order.
    ///
    /// With `fli_part` set, 10% of the processes (the hot set, first in
    /// traversal order) each receive a boosted quota; the remaining
    /// processes split what is left of `fli_part_base * np`, with the
    /// rounding remainder handed out one particle at a time. The total is
    /// conserved exactly.
    fn particle_counts(&self) -> Result<Vec<usize>, InjectError> {
        let np = self.process_count() as i64;
        let base_per_proc = self.spec.fli_part_base as i64;

        let skew = match self.spec.fli_part {
            Some(f) => f,
            None => return Ok(vec![base_per_proc as usize; np as usize]),
        };

        let total = base_per_proc * np;
        let peak_count = (base_per_proc as f64 * (skew + 1.0)) as i64;
        let peak_procs = (np as f64 * 0.1) as i64;
        let rest = np - peak_procs;

        let base = ((total - peak_count * peak_procs) as f64 / rest as f64) as i64;
        if base < 0 {
            return Err(InjectError::Precondition(format!(
                "fli_part {skew} too large: hot set would consume more than \
                 the {total} available particles"
            )));
        }
        let left = total - (base * rest + peak_count * peak_procs);

        let counts = (0..np)
            .map(|i| {
                if i < peak_procs {
                    peak_count as usize
                } else if i - peak_procs < left {
                    (base + 1) as usize
                } else {
                    base as usize
                }
            })
            .collect();
        Ok(counts)
    }

    // ------------------------------------------------------------------
    // Step C: placement
    // ------------------------------------------------------------------

    /// Stacked placement: one point per process, repeated quota times.
    ///
    /// Under case 3 every block emits its own volume-derived quota instead
    /// of the skewed counts.
    fn place_stacked(&self, counts: &[usize]) -> Placement {
        let mut positions = Vec::new();
        for (block, &count) in self.blocks.iter().zip(counts) {
            let n = if self.spec.eli_case == EliCase::Case3 {
                block.quota
            } else {
                count
            };
            let point = [
                0.5 * block.origin[0] + STACK_MARGIN,
                0.5 * block.origin[1] + STACK_MARGIN,
                0.5 * block.origin[2] + STACK_MARGIN,
            ];
            positions.extend(std::iter::repeat(point).take(n));
        }
        Placement { positions }
    }

    /// Lattice placement: particles packed on a regular grid inside each
    /// block, spaced by [`RBC_SIZE`] with [`LATTICE_MARGIN`] kept from the
    /// boundary, filling x -> y -> z until the quota is reached.
    fn place_lattice(&self, counts: &[usize]) -> Placement {
        let mut positions = Vec::new();
        for (block, &count) in self.blocks.iter().zip(counts) {
            let dims = lattice_dims(block.size);
            let capacity = dims[0] * dims[1] * dims[2];
            if count > capacity {
                warn!(
                    "block at {:?}: quota {} exceeds lattice capacity {}, placing {}",
                    block.origin, count, capacity, capacity
                );
            }
            let target = count.min(capacity);
            if target == 0 {
                continue;
            }

            let mut placed = 0;
            'block: for iz in 0..dims[2] {
                for iy in 0..dims[1] {
                    for ix in 0..dims[0] {
                        positions.push([
                            block.origin[0] + LATTICE_MARGIN[0] + ix as f64 * RBC_SIZE[0],
                            block.origin[1] + LATTICE_MARGIN[1] + iy as f64 * RBC_SIZE[1],
                            block.origin[2] + LATTICE_MARGIN[2] + iz as f64 * RBC_SIZE[2],
                        ]);
                        placed += 1;
                        if placed == target {
                            break 'block;
                        }
                    }
                }
            }
        }
        Placement { positions }
    }
}

/// Lattice point count per axis for a block of the given extent.
fn lattice_dims(size: [f64; 3]) -> [usize; 3] {
    let mut dims = [0usize; 3];
    for a in 0..3 {
        let usable = size[a] - 2.0 * LATTICE_MARGIN[a];
        dims[a] = if usable > 0.0 {
            (usable / RBC_SIZE[a]).floor() as usize
        } else {
            0
        };
    }
    dims
}

fn argmax(v: [u64; 3]) -> usize {
    let mut best = 0;
    for a in 1..3 {
        if v[a] > v[best] {
            best = a;
        }
    }
    best
}
