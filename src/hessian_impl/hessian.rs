use crate::error::{LtmdError, Result};
use crate::linalg::symmetrize;
use crate::partition::{Block, BlockPartition};
use crate::system::{ScopedPositions, SimulationContext};
use nalgebra::DMatrix;
use tracing::debug;

/// Finite-difference step settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FiniteDifference {
    pub delta: f64,
    pub adaptive: bool,
}

impl FiniteDifference {
    pub fn fixed(delta: f64) -> Self {
        FiniteDifference {
            delta,
            adaptive: false,
        }
    }
}

/// Step used to perturb a coordinate currently at `value`
pub fn perturbation_delta(value: f64, step: &FiniteDifference) -> f64 {
    let scaled = step.delta.sqrt() * value.abs().max(0.1);
    // exactly representable increment of `value`
    let adaptive = (value + scaled) - value;
    if step.adaptive {
        adaptive
    } else {
        step.delta
    }
}

/// Mass-weighted Hessian of a block-restricted force field, stored per block
#[derive(Debug, Clone)]
pub struct BlockHessian {
    partition: BlockPartition,
    blocks: Vec<DMatrix<f64>>,
}

impl BlockHessian {
    pub fn new(partition: BlockPartition, blocks: Vec<DMatrix<f64>>) -> Result<Self> {
        if blocks.len() != partition.num_blocks() {
            return Err(LtmdError::dimension(
                "block hessian",
                partition.num_blocks(),
                blocks.len(),
            ));
        }
        for (block, matrix) in partition.blocks().zip(&blocks) {
            if matrix.shape() != (block.dof(), block.dof()) {
                return Err(LtmdError::dimension(
                    format!("sub-hessian of block {}", block.index),
                    format!("{0}x{0}", block.dof()),
                    format!("{}x{}", matrix.nrows(), matrix.ncols()),
                ));
            }
        }
        Ok(BlockHessian { partition, blocks })
    }

    pub fn partition(&self) -> &BlockPartition {
        &self.partition
    }

    /// Square sub-Hessian of block `b`
    pub fn block(&self, b: usize) -> &DMatrix<f64> {
        &self.blocks[b]
    }

    pub fn blocks(&self) -> &[DMatrix<f64>] {
        &self.blocks
    }

    /// Full dimension, 3N
    pub fn dimension(&self) -> usize {
        3 * self.partition.num_particles()
    }

    /// Entry of the full matrix; zero between different blocks
    pub fn get(&self, i: usize, j: usize) -> f64 {
        let (Some(bi), Some(bj)) = (self.partition.block_of(i / 3), self.partition.block_of(j / 3))
        else {
            return 0.0;
        };
        if bi != bj {
            return 0.0;
        }
        let first = self.partition.block(bi).first_dof();
        self.blocks[bi][(i - first, j - first)]
    }

    /// Dense 3N x 3N copy with explicit zeros off the diagonal blocks
    pub fn to_dense(&self) -> DMatrix<f64> {
        let n = self.dimension();
        let mut dense = DMatrix::zeros(n, n);
        for (block, matrix) in self.partition.blocks().zip(&self.blocks) {
            let first = block.first_dof();
            dense
                .view_mut((first, first), (block.dof(), block.dof()))
                .copy_from(matrix);
        }
        dense
    }
}

/// Flat degree-of-freedom index to (particle, component)
fn split_dof(dof: usize) -> (usize, usize) {
    (dof / 3, dof % 3)
}

/// Finite-difference Hessian of the forces in `context`, one sub-matrix per block.
///
/// The context must already hold a block-restricted force field. Positions are
/// restored before returning, including on failure.
pub fn build_block_hessian<C: SimulationContext + ?Sized>(
    context: &mut C,
    partition: &BlockPartition,
    step: &FiniteDifference,
) -> Result<BlockHessian> {
    let n = context.num_particles();
    if partition.num_particles() != n {
        return Err(LtmdError::dimension(
            "block partition",
            format!("{} particles", n),
            format!("{} particles", partition.num_particles()),
        ));
    }

    let masses = context.masses().to_vec();
    let blocks: Vec<Block> = partition.blocks().collect();
    let mut matrices: Vec<DMatrix<f64>> = blocks
        .iter()
        .map(|b| DMatrix::zeros(b.dof(), b.dof()))
        .collect();

    let mut scope = ScopedPositions::new(context);
    let initial = scope.original().to_vec();
    let largest = partition.largest_block_dof();
    debug!(
        "Building block Hessian: {} blocks, {} perturbation offsets",
        blocks.len(),
        largest
    );

    for offset in 0..largest {
        // blocks smaller than `offset` sit this step out
        let active: Vec<(usize, f64)> = blocks
            .iter()
            .filter(|b| offset < b.dof())
            .map(|b| {
                let (atom, c) = split_dof(b.first_dof() + offset);
                (b.index, perturbation_delta(initial[atom][c], step))
            })
            .collect();

        let mut minus = initial.clone();
        let mut plus = initial.clone();
        for &(b, delta) in &active {
            let (atom, c) = split_dof(blocks[b].first_dof() + offset);
            minus[atom][c] -= delta;
            plus[atom][c] += delta;
        }

        let forces_minus = scope.forces_at(&minus)?;
        let forces_plus = scope.forces_at(&plus)?;

        for &(b, delta) in &active {
            let block = &blocks[b];
            let (atom, _) = split_dof(block.first_dof() + offset);
            let column = &mut matrices[b];
            for row in 0..block.dof() {
                let (other, c) = split_dof(block.first_dof() + row);
                let scale = 2.0 * delta * (masses[atom] * masses[other]).sqrt();
                column[(row, offset)] = (forces_minus[other][c] - forces_plus[other][c]) / scale;
            }
        }
    }
    scope.restore()?;

    for matrix in &mut matrices {
        symmetrize(matrix);
    }
    BlockHessian::new(partition.clone(), matrices)
}
