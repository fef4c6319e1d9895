//! Domain partitioning across the process grid.
//!
//! Given any two of {domain size, atomic-block size, process count}, the
//! partitioner derives the missing geometry and can push the resolved domain
//! size into the experiment's configuration document.

use crate::configdoc::ConfigDocument;
use crate::factor;

/// Resolution errors. Geometry that cannot be derived aborts the build.
#[derive(Debug, thiserror::Error)]
pub enum PartitionError {
    #[error("missing parameter: {0}")]
    MissingParameter(&'static str),

    #[error("invalid parameter: {0}")]
    Precondition(String),
}

/// Fully or partially resolved partition geometry.
///
/// `domain` stays `None` when neither a domain size nor an atomic-block size
/// was supplied; in that case the domain is treated as externally fixed and
/// no configuration fields are written.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// Global domain extent (lattice cells per axis).
    pub domain: Option<[u64; 3]>,
    /// Per-process sub-domain extent.
    pub atomic_block: Option<[f64; 3]>,
    /// 3-axis process grid.
    pub grid: Option<[u64; 3]>,
}

/// Derive the missing geometry quantity.
///
/// Priority order:
/// 1. Domain size given: requires a process count; the atomic-block size is
///    the component-wise quotient over the process grid.
/// 2. Atomic-block size and process count given: the scalar product
///    `round(abx*aby*abz*np)` is factorized and the resulting factor grid is
///    read back as a size per axis. This is *not* the inverse of branch 1;
///    downstream tooling depends on these exact sizes, so the behavior is
///    kept as-is.
/// 3. Otherwise the domain stays unresolved (no error).
pub fn resolve(
    domain: Option<[u64; 3]>,
    atomic_block: Option<[f64; 3]>,
    processes: Option<u64>,
) -> Result<Resolution, PartitionError> {
    if processes == Some(0) {
        return Err(PartitionError::Precondition(
            "process count must be positive".into(),
        ));
    }

    if let Some(size) = domain {
        if size.iter().any(|&x| x == 0) {
            return Err(PartitionError::Precondition(format!(
                "domain size must be positive on every axis, got {:?}",
                size
            )));
        }
        let np = processes.ok_or(PartitionError::MissingParameter("process count"))?;
        let grid = factor::process_grid(np);
        let ab = quotient(size, grid);
        return Ok(Resolution {
            domain: Some(size),
            atomic_block: Some(ab),
            grid: Some(grid),
        });
    }

    if let (Some(ab), Some(np)) = (atomic_block, processes) {
        if ab.iter().any(|&x| x <= 0.0) {
            return Err(PartitionError::Precondition(format!(
                "atomic-block size must be positive on every axis, got {:?}",
                ab
            )));
        }
        let product = (ab[0] * ab[1] * ab[2] * np as f64).round() as u64;
        let size = factor::process_grid(product);
        let grid = factor::process_grid(np);
        let ab = quotient(size, grid);
        return Ok(Resolution {
            domain: Some(size),
            atomic_block: Some(ab),
            grid: Some(grid),
        });
    }

    Ok(Resolution {
        domain: None,
        atomic_block,
        grid: processes.map(factor::process_grid),
    })
}

fn quotient(size: [u64; 3], grid: [u64; 3]) -> [f64; 3] {
    [
        size[0] as f64 / grid[0] as f64,
        size[1] as f64 / grid[1] as f64,
        size[2] as f64 / grid[2] as f64,
    ]
}

impl Resolution {
    /// Write the resolved domain size into the `<domain>` section.
    ///
    /// No-op when the domain is unresolved.
    pub fn write_domain(&self, doc: &mut ConfigDocument) {
        if let Some(size) = self.domain {
            doc.set_or_insert("domain", "nx", size[0]);
            doc.set_or_insert("domain", "ny", size[1]);
            doc.set_or_insert("domain", "nz", size[2]);
        }
    }
}
