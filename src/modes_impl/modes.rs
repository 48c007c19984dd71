use crate::error::{LtmdError, Result};
use crate::linalg::{multiply, symmetrize, Eigensolver};
use crate::projection_impl::BlockModes;
use crate::system::{ScopedPositions, SimulationContext};
use itertools::Itertools;
use nalgebra::{DMatrix, Vector3};
use tracing::{debug, info};

/// Selected block eigenvectors embedded in the full 3N space
#[derive(Debug, Clone)]
pub struct CoarseBasis {
    /// E, 3N x m
    pub basis: DMatrix<f64>,
    /// Eᵗ, m x 3N
    pub transpose: DMatrix<f64>,
    /// Block eigenvalue of each column
    pub eigenvalues: Vec<f64>,
    /// Magnitude that excluded the remaining vectors, if any were excluded
    pub cutoff: Option<f64>,
}

impl CoarseBasis {
    /// Number of columns, m
    pub fn dimension(&self) -> usize {
        self.basis.ncols()
    }
}

/// Merge block eigenvectors into E, keeping at most `quota` of the smallest |λ|
pub fn assemble_coarse_basis(blocks: &[BlockModes], dimension: usize, quota: usize) -> Result<CoarseBasis> {
    if let Some(outside) = blocks.iter().find(|b| b.block.dof_range().end > dimension) {
        return Err(LtmdError::dimension(
            format!("coarse basis rows for block {}", outside.block.index),
            format!("at most {}", dimension),
            outside.block.dof_range().end,
        ));
    }
    if let Some(bad) = blocks.iter().find(|b| b.vectors.shape() != (b.block.dof(), b.len())) {
        return Err(LtmdError::dimension(
            format!("eigenvectors of block {}", bad.block.index),
            format!("{}x{}", bad.block.dof(), bad.len()),
            format!("{}x{}", bad.vectors.nrows(), bad.vectors.ncols()),
        ));
    }

    // (block, column, eigenvalue) in block order
    let survivors: Vec<(usize, usize, f64)> = blocks
        .iter()
        .enumerate()
        .flat_map(|(b, modes)| {
            modes
                .eigenvalues
                .iter()
                .enumerate()
                .map(move |(col, &lambda)| (b, col, lambda))
        })
        .collect();

    let cutoff = if survivors.len() > quota {
        let magnitudes: Vec<f64> = survivors
            .iter()
            .map(|s| s.2.abs())
            .sorted_by(f64::total_cmp)
            .collect();
        Some(magnitudes[quota])
    } else {
        None
    };

    let selected: Vec<&(usize, usize, f64)> = survivors
        .iter()
        .filter(|s| cutoff.map_or(true, |c| s.2.abs() < c))
        .collect();
    let m = selected.len();
    info!(
        "Coarse basis: {} of {} surviving vectors selected (quota {}, cutoff {})",
        m,
        survivors.len(),
        quota,
        cutoff.map_or("none".to_string(), |c| format!("{:.6e}", c))
    );

    let mut basis = DMatrix::<f64>::zeros(dimension, m);
    for (k, &&(b, col, _)) in selected.iter().enumerate() {
        let modes = &blocks[b];
        basis
            .view_mut((modes.block.first_dof(), k), (modes.block.dof(), 1))
            .copy_from(&modes.vectors.column(col));
    }

    Ok(CoarseBasis {
        transpose: basis.transpose(),
        basis,
        eigenvalues: selected.iter().map(|s| s.2).collect(),
        cutoff,
    })
}

/// S = Eᵗ H E by central differences of the forces in `context`.
///
/// Positions are restored before returning, including on failure.
pub fn reduced_stiffness<C: SimulationContext + ?Sized>(
    context: &mut C,
    coarse: &CoarseBasis,
    eps: f64,
) -> Result<DMatrix<f64>> {
    let n = context.num_particles();
    if coarse.basis.nrows() != 3 * n {
        return Err(LtmdError::dimension(
            "coarse basis rows",
            3 * n,
            coarse.basis.nrows(),
        ));
    }

    let m = coarse.dimension();
    let sqrt_masses: Vec<f64> = context.masses().iter().map(|m| m.sqrt()).collect();
    let mut stiffness = DMatrix::<f64>::zeros(m, m);

    let mut scope = ScopedPositions::new(context);
    let initial = scope.original().to_vec();
    for k in 0..m {
        let column = coarse.basis.column(k);
        let displaced = |sign: f64| -> Vec<Vector3<f64>> {
            initial
                .iter()
                .enumerate()
                .map(|(i, p)| {
                    let e = Vector3::new(column[3 * i], column[3 * i + 1], column[3 * i + 2]);
                    p + e * (sign * eps / sqrt_masses[i])
                })
                .collect()
        };

        let forces_plus = scope.forces_at(&displaced(1.0))?;
        let forces_minus = scope.forces_at(&displaced(-1.0))?;

        let force_diff = DMatrix::from_fn(3 * n, 1, |row, _| {
            let (i, c) = (row / 3, row % 3);
            (forces_minus[i][c] - forces_plus[i][c]) / (2.0 * eps * sqrt_masses[i])
        });
        let projected = multiply(&coarse.transpose, &force_diff)?;
        stiffness.set_column(k, &projected.column(0));
    }
    scope.restore()?;

    symmetrize(&mut stiffness);
    debug!("Reduced stiffness: {}x{}", m, m);
    Ok(stiffness)
}

/// The published result of one rebuild
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModeSet {
    /// One per-particle displacement field per mode, ascending |λ|
    pub modes: Vec<Vec<Vector3<f64>>>,
    /// Eigenvalue of each retained mode
    pub eigenvalues: Vec<f64>,
    /// Largest |λ| over every eigenvalue of S
    pub max_eigenvalue: f64,
    /// Columns of the coarse basis, m
    pub coarse_dimension: usize,
}

impl ModeSet {
    pub fn len(&self) -> usize {
        self.modes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modes.is_empty()
    }

    pub fn mode(&self, index: usize) -> Option<&[Vector3<f64>]> {
        self.modes.get(index).map(|m| m.as_slice())
    }
}

/// Result of diagonalizing S, with the intermediate matrices kept for diagnostics
#[derive(Debug, Clone)]
pub struct Refinement {
    pub modes: ModeSet,
    /// Eigenvectors of S in solver order, as returned by the eigensolver
    pub stiffness_eigenvectors: DMatrix<f64>,
    /// U = E Q with Q reordered by ascending |λ|, 3N x m
    pub approximate_eigenvectors: DMatrix<f64>,
}

/// Diagonalize S and back-project the `num_modes` softest directions
pub fn refine(
    stiffness: &DMatrix<f64>,
    coarse: &CoarseBasis,
    num_modes: usize,
    solver: &dyn Eigensolver,
) -> Result<Refinement> {
    let m = coarse.dimension();
    if num_modes == 0 {
        return Err(LtmdError::config("Number of requested modes must be positive"));
    }
    if num_modes > m {
        return Err(LtmdError::config(format!(
            "Requested {} modes but the coarse basis only has {} vectors",
            num_modes, m
        )));
    }
    if stiffness.shape() != (m, m) {
        return Err(LtmdError::dimension(
            "reduced stiffness",
            format!("{0}x{0}", m),
            format!("{}x{}", stiffness.nrows(), stiffness.ncols()),
        ));
    }

    let decomposition = solver.eigendecompose(stiffness)?;
    let order = decomposition.magnitude_order();
    let max_eigenvalue = order
        .last()
        .map_or(0.0, |&i| decomposition.eigenvalues[i].abs());

    let q = &decomposition.eigenvectors;
    let sorted_q = DMatrix::from_fn(m, m, |row, col| q[(row, order[col])]);
    let u = multiply(&coarse.basis, &sorted_q)?;

    let num_particles = u.nrows() / 3;
    let modes = (0..num_modes)
        .map(|k| {
            (0..num_particles)
                .map(|j| Vector3::new(u[(3 * j, k)], u[(3 * j + 1, k)], u[(3 * j + 2, k)]))
                .collect()
        })
        .collect();
    let eigenvalues = order[..num_modes]
        .iter()
        .map(|&i| decomposition.eigenvalues[i])
        .collect();

    Ok(Refinement {
        modes: ModeSet {
            modes,
            eigenvalues,
            max_eigenvalue,
            coarse_dimension: m,
        },
        stiffness_eigenvectors: decomposition.eigenvectors,
        approximate_eigenvectors: u,
    })
}
