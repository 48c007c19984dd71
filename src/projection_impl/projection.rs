use crate::error::{LtmdError, Result};
use crate::hessian_impl::BlockHessian;
use crate::linalg::Eigensolver;
use crate::partition::Block;
use nalgebra::{DMatrix, DVector, Vector3};
use rayon::prelude::*;
use tracing::debug;

/// Squared residual norm below which an orthogonalized eigenvector is dropped
pub const DISCARD_THRESHOLD: f64 = 0.05;

/// Relative size below which a rotational column counts as degenerate
const RIGID_TOLERANCE: f64 = 1e-10;

/// Mass-weighted rigid-body basis of one block, as orthonormal columns.
///
/// Columns 0-2 are translations along x, y, z. The remaining columns are the
/// rotations about x, y, z through the center of mass, with any rotation that
/// vanishes or falls into the span of the previous ones left out.
pub fn rigid_body_basis(positions: &[Vector3<f64>], masses: &[f64], block: &Block) -> DMatrix<f64> {
    let size = block.dof();
    let particles = block.particles();
    let total_mass: f64 = masses[particles.clone()].iter().sum();
    let center = particles
        .clone()
        .fold(Vector3::zeros(), |acc, p| acc + positions[p] * masses[p])
        / total_mass;
    let norm = total_mass.sqrt();

    let mut translations = vec![DVector::<f64>::zeros(size); 3];
    let mut rotations = vec![DVector::<f64>::zeros(size); 3];
    let mut extent = 0.0;
    for (local, p) in particles.enumerate() {
        let row = 3 * local;
        let factor = masses[p].sqrt() / norm;
        let d = positions[p] - center;
        extent += factor * factor * d.norm_squared();

        for (axis, column) in translations.iter_mut().enumerate() {
            column[row + axis] = factor;
        }

        // axis × d, mass weighted
        rotations[0][row + 1] = d.z * factor;
        rotations[0][row + 2] = -d.y * factor;
        rotations[1][row] = -d.z * factor;
        rotations[1][row + 2] = d.x * factor;
        rotations[2][row] = d.y * factor;
        rotations[2][row + 1] = -d.x * factor;
    }

    let mut columns = translations;
    let first_rotation = columns.len();
    for mut candidate in rotations {
        let raw_sq = candidate.norm_squared();
        if raw_sq <= RIGID_TOLERANCE * extent {
            continue;
        }
        for previous in &columns[first_rotation..] {
            let dot = previous.dot(&candidate);
            candidate.axpy(-dot, previous, 1.0);
        }
        let residual_sq = candidate.norm_squared();
        if residual_sq <= RIGID_TOLERANCE * raw_sq {
            continue;
        }
        candidate /= residual_sq.sqrt();
        columns.push(candidate);
    }

    DMatrix::from_columns(&columns)
}

/// Vibrational eigenvectors that survived projection for one block
#[derive(Debug, Clone)]
pub struct BlockModes {
    pub block: Block,
    /// Columns in the rigid basis the vectors were orthogonalized against
    pub rigid_count: usize,
    /// Eigenvalue of each accepted vector, ascending |λ|
    pub eigenvalues: Vec<f64>,
    /// Accepted vectors as columns, local to the block (dof rows)
    pub vectors: DMatrix<f64>,
    /// Candidates dropped by the residual-norm test
    pub discarded: usize,
}

impl BlockModes {
    pub fn len(&self) -> usize {
        self.eigenvalues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.eigenvalues.is_empty()
    }

    /// Slots left for vibrational vectors once rigid motion is excluded
    pub fn quota(&self) -> usize {
        self.block.dof() - self.rigid_count
    }
}

/// Diagonalize one block sub-Hessian and keep the eigenvectors orthogonal to rigid motion
pub fn diagonalize_block(
    hessian: &DMatrix<f64>,
    block: &Block,
    positions: &[Vector3<f64>],
    masses: &[f64],
    solver: &dyn Eigensolver,
) -> Result<BlockModes> {
    let size = block.dof();
    if hessian.shape() != (size, size) {
        return Err(LtmdError::dimension(
            format!("sub-hessian of block {}", block.index),
            format!("{0}x{0}", size),
            format!("{}x{}", hessian.nrows(), hessian.ncols()),
        ));
    }
    if block.end > positions.len() || block.end > masses.len() {
        return Err(LtmdError::dimension(
            format!("particles of block {}", block.index),
            block.end,
            positions.len().min(masses.len()),
        ));
    }

    let decomposition = solver.eigendecompose(hessian)?;
    let rigid = rigid_body_basis(positions, masses, block);
    let rigid_count = rigid.ncols();

    let mut basis: Vec<DVector<f64>> = rigid.column_iter().map(|c| c.into_owned()).collect();
    let mut eigenvalues = Vec::with_capacity(size - rigid_count);
    let mut discarded = 0;

    for col in decomposition.magnitude_order() {
        if basis.len() == size {
            break;
        }
        let original = decomposition.eigenvectors.column(col);
        let mut residual = original.into_owned();
        for previous in &basis {
            let dot = previous.dot(&original);
            residual.axpy(-dot, previous, 1.0);
        }

        let norm_sq = residual.norm_squared();
        if norm_sq < DISCARD_THRESHOLD {
            debug!(
                "Block {}: dropping eigenvector with eigenvalue {:.6e} (residual {:.3e})",
                block.index, decomposition.eigenvalues[col], norm_sq
            );
            discarded += 1;
            continue;
        }
        residual /= norm_sq.sqrt();
        basis.push(residual);
        eigenvalues.push(decomposition.eigenvalues[col]);
    }

    let accepted = &basis[rigid_count..];
    let vectors = if accepted.is_empty() {
        DMatrix::zeros(size, 0)
    } else {
        DMatrix::from_columns(accepted)
    };
    debug!(
        "Block {}: {} rigid columns, {} accepted, {} discarded",
        block.index,
        rigid_count,
        eigenvalues.len(),
        discarded
    );

    Ok(BlockModes {
        block: *block,
        rigid_count,
        eigenvalues,
        vectors,
        discarded,
    })
}

/// Diagonalize every block of `hessian` in parallel; results keep block order
pub fn diagonalize_blocks(
    hessian: &BlockHessian,
    positions: &[Vector3<f64>],
    masses: &[f64],
    solver: &dyn Eigensolver,
) -> Result<Vec<BlockModes>> {
    let blocks: Vec<Block> = hessian.partition().blocks().collect();
    blocks
        .into_par_iter()
        .map(|block| diagonalize_block(hessian.block(block.index), &block, positions, masses, solver))
        .collect()
}
