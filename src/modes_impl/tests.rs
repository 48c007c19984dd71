//! Tests for coarse basis assembly and refinement

use super::*;
use crate::error::{LtmdError, Result};
use crate::linalg::{JacobiSolver, NalgebraSolver};
use crate::partition::Block;
use crate::projection_impl::BlockModes;
use crate::system::{ForceProvider, Simulation, SimulationContext};
use approx::{assert_abs_diff_eq, assert_relative_eq};
use nalgebra::{DMatrix, Vector3};

/// F = −K x for a fixed 3N x 3N stiffness matrix
struct LinearSpring {
    stiffness: DMatrix<f64>,
}

impl ForceProvider for LinearSpring {
    fn compute_forces(&self, positions: &[Vector3<f64>]) -> Result<Vec<Vector3<f64>>> {
        let x = DMatrix::from_fn(3 * positions.len(), 1, |row, _| positions[row / 3][row % 3]);
        let f = -(&self.stiffness * x);
        Ok((0..positions.len())
            .map(|i| Vector3::new(f[3 * i], f[3 * i + 1], f[3 * i + 2]))
            .collect())
    }
}

fn block_modes(index: usize, start: usize, end: usize, eigenvalues: Vec<f64>) -> BlockModes {
    let block = Block { index, start, end };
    let k = eigenvalues.len();
    BlockModes {
        block,
        rigid_count: block.dof() - k,
        vectors: DMatrix::identity(block.dof(), k),
        eigenvalues,
        discarded: 0,
    }
}

fn spd_stiffness(n: usize) -> DMatrix<f64> {
    let a = DMatrix::from_fn(n, n, |i, j| ((i * 7 + j * 3) % 11) as f64 / 11.0 - 0.4);
    &a * a.transpose() + DMatrix::identity(n, n) * 0.5
}

#[test]
fn test_all_survivors_kept_under_quota() {
    let blocks = vec![
        block_modes(0, 0, 2, vec![1.0, -2.0]),
        block_modes(1, 2, 4, vec![0.5]),
    ];
    let coarse = assemble_coarse_basis(&blocks, 12, 6).unwrap();
    assert_eq!(coarse.dimension(), 3);
    assert_eq!(coarse.cutoff, None);
    assert_eq!(coarse.eigenvalues, vec![1.0, -2.0, 0.5]);

    // block 1 starts at row 6
    assert_eq!(coarse.basis[(6, 2)], 1.0);
    assert_eq!(coarse.basis.column(2).sum(), 1.0);
    assert_eq!(coarse.transpose, coarse.basis.transpose());
}

#[test]
fn test_cutoff_selects_smallest_magnitudes() {
    let blocks = vec![
        block_modes(0, 0, 2, vec![0.1, -3.0, 5.0]),
        block_modes(1, 2, 4, vec![-0.2, 4.0, 6.0]),
    ];
    let coarse = assemble_coarse_basis(&blocks, 12, 3).unwrap();
    // sorted magnitudes 0.1 0.2 3 4 5 6, cutoff at index 3
    assert_eq!(coarse.cutoff, Some(4.0));
    assert_eq!(coarse.eigenvalues, vec![0.1, -3.0, -0.2]);
    assert!(coarse.dimension() <= 3);
}

#[test]
fn test_ties_at_cutoff_are_excluded() {
    let blocks = vec![
        block_modes(0, 0, 2, vec![1.0, 2.0, 3.0]),
        block_modes(1, 2, 4, vec![1.0, -2.0, 3.0]),
    ];
    let coarse = assemble_coarse_basis(&blocks, 12, 3).unwrap();
    // sorted 1 1 2 2 3 3, cutoff 2 keeps only the two |λ| = 1 vectors
    assert_eq!(coarse.cutoff, Some(2.0));
    assert_eq!(coarse.dimension(), 2);
}

#[test]
fn test_block_outside_dimension_is_rejected() {
    let blocks = vec![block_modes(0, 0, 3, vec![1.0])];
    let result = assemble_coarse_basis(&blocks, 6, 3);
    assert!(matches!(result, Err(LtmdError::DimensionMismatch { .. })));
}

#[test]
fn test_reduced_stiffness_of_linear_forces() {
    let n = 3;
    let k = spd_stiffness(3 * n);
    let masses = vec![2.0, 5.0, 1.5];
    let positions = vec![
        Vector3::new(0.1, 0.2, 0.3),
        Vector3::new(-0.4, 0.0, 0.2),
        Vector3::new(0.3, -0.1, 0.0),
    ];
    let mut sim = Simulation::new(masses.clone(), positions.clone(), LinearSpring { stiffness: k.clone() }).unwrap();

    let blocks = vec![
        block_modes(0, 0, 2, vec![1.0, 2.0, 3.0, 4.0]),
        block_modes(1, 2, 3, vec![1.5, 2.5]),
    ];
    let coarse = assemble_coarse_basis(&blocks, 3 * n, 6).unwrap();
    let s = reduced_stiffness(&mut sim, &coarse, 1e-4).unwrap();

    let inv_sqrt_m = DMatrix::from_fn(3 * n, 3 * n, |i, j| {
        if i == j {
            1.0 / masses[i / 3].sqrt()
        } else {
            0.0
        }
    });
    let hessian = &inv_sqrt_m * &k * &inv_sqrt_m;
    let expected = &coarse.transpose * hessian * &coarse.basis;

    assert_eq!(s, s.transpose());
    assert_abs_diff_eq!(s, expected, epsilon = 1e-8);
    assert_eq!(sim.positions(), positions.as_slice());
}

#[test]
fn test_refine_orders_and_back_projects() {
    let blocks = vec![
        block_modes(0, 0, 2, vec![1.0, 2.0, 3.0]),
        block_modes(1, 2, 4, vec![1.0, 2.0]),
    ];
    let coarse = assemble_coarse_basis(&blocks, 12, 5).unwrap();
    let s = DMatrix::from_diagonal(&nalgebra::DVector::from_vec(vec![4.0, -0.5, 2.0, -7.0, 1.0]));

    let refinement = refine(&s, &coarse, 3, &JacobiSolver::default()).unwrap();
    let modes = &refinement.modes;
    assert_eq!(modes.len(), 3);
    assert_eq!(modes.coarse_dimension, 5);
    assert_relative_eq!(modes.max_eigenvalue, 7.0, epsilon = 1e-12);

    let expected = [-0.5, 1.0, 2.0];
    for (&got, &want) in modes.eigenvalues.iter().zip(&expected) {
        assert_relative_eq!(got, want, epsilon = 1e-12);
    }

    let u = &refinement.approximate_eigenvectors;
    assert_eq!(u.shape(), (12, 5));
    // U = E Q keeps m independent, orthonormal columns
    assert_abs_diff_eq!(u.transpose() * u, DMatrix::identity(5, 5), epsilon = 1e-10);

    // softest mode is the second column of E
    let first = modes.mode(0).unwrap();
    assert_eq!(first.len(), 4);
    assert_relative_eq!(first[0].y.abs(), 1.0, epsilon = 1e-12);
}

#[test]
fn test_refine_rejects_too_many_modes() {
    let blocks = vec![block_modes(0, 0, 2, vec![1.0, 2.0])];
    let coarse = assemble_coarse_basis(&blocks, 6, 4).unwrap();
    let s = DMatrix::identity(2, 2);

    let result = refine(&s, &coarse, 3, &NalgebraSolver);
    assert!(matches!(result, Err(LtmdError::Configuration(_))));
    assert!(refine(&s, &coarse, 0, &NalgebraSolver).is_err());
    assert!(refine(&s, &coarse, 2, &NalgebraSolver).is_ok());
}
