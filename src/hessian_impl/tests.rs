//! Tests for the finite-difference block Hessian

use super::*;
use crate::forcefield::{ForceField, ForceTerm, HarmonicAngle, HarmonicBond};
use crate::partition::BlockPartition;
use crate::system::{Simulation, SimulationContext};
use approx::{assert_abs_diff_eq, assert_relative_eq};
use nalgebra::Vector3;

fn bond(i: usize, j: usize, length: f64, k: f64) -> HarmonicBond {
    HarmonicBond {
        particles: [i, j],
        length,
        k,
    }
}

fn diatomic() -> Simulation<ForceField> {
    let field = ForceField::new(vec![ForceTerm::HarmonicBond {
        bonds: vec![bond(0, 1, 0.12, 1000.0)],
    }]);
    Simulation::new(
        vec![12.0, 16.0],
        vec![Vector3::new(0.3, 0.2, 0.1), Vector3::new(0.42, 0.2, 0.1)],
        field,
    )
    .unwrap()
}

/// Two bent triatomics joined by a bond between particles 2 and 3
fn two_residues() -> (Vec<f64>, Vec<Vector3<f64>>, Vec<ForceTerm>) {
    let masses = vec![16.0, 1.0, 1.0, 16.0, 1.0, 1.0];
    let positions = vec![
        Vector3::new(0.0, 0.0, 0.0),
        Vector3::new(0.1, 0.0, 0.0),
        Vector3::new(-0.03, 0.095, 0.0),
        Vector3::new(0.3, 0.05, 0.02),
        Vector3::new(0.4, 0.06, 0.0),
        Vector3::new(0.27, 0.14, 0.05),
    ];
    let terms = vec![
        ForceTerm::HarmonicBond {
            bonds: vec![
                bond(0, 1, 0.1, 3000.0),
                bond(0, 2, 0.1, 3000.0),
                bond(3, 4, 0.1, 3000.0),
                bond(3, 5, 0.1, 3000.0),
                bond(2, 3, 0.3, 500.0),
            ],
        },
        ForceTerm::HarmonicAngle {
            angles: vec![
                HarmonicAngle {
                    particles: [1, 0, 2],
                    angle: 1.82,
                    k: 400.0,
                },
                HarmonicAngle {
                    particles: [4, 3, 5],
                    angle: 1.82,
                    k: 400.0,
                },
            ],
        },
    ];
    (masses, positions, terms)
}

#[test]
fn test_fixed_delta_is_returned() {
    let step = FiniteDifference::fixed(1e-4);
    assert_eq!(perturbation_delta(0.0, &step), 1e-4);
    assert_eq!(perturbation_delta(-37.5, &step), 1e-4);
    assert_eq!(perturbation_delta(1e6, &step), 1e-4);
}

#[test]
fn test_adaptive_delta_scales_with_coordinate() {
    let step = FiniteDifference {
        delta: 1e-4,
        adaptive: true,
    };
    // floor of 0.1 on the coordinate magnitude
    assert_relative_eq!(perturbation_delta(0.0, &step), 1e-3, max_relative = 1e-12);
    assert_relative_eq!(perturbation_delta(0.05, &step), 1e-3, max_relative = 1e-12);
    assert_relative_eq!(perturbation_delta(-2.0, &step), 2e-2, max_relative = 1e-12);
}

#[test]
fn test_diatomic_hessian() {
    let mut sim = diatomic();
    let partition = BlockPartition::from_residues(2, &[2], 1).unwrap();
    let hessian = build_block_hessian(&mut sim, &partition, &FiniteDifference::fixed(1e-4)).unwrap();

    let k = 1000.0;
    let (m1, m2) = (12.0_f64, 16.0_f64);
    assert_eq!(hessian.dimension(), 6);
    assert_relative_eq!(hessian.get(0, 0), k / m1, max_relative = 1e-6);
    assert_relative_eq!(hessian.get(3, 3), k / m2, max_relative = 1e-6);
    assert_relative_eq!(hessian.get(0, 3), -k / (m1 * m2).sqrt(), max_relative = 1e-6);
    // transverse directions are soft at equilibrium
    assert_abs_diff_eq!(hessian.get(1, 1), 0.0, epsilon = 1e-3);
    assert_abs_diff_eq!(hessian.get(2, 5), 0.0, epsilon = 1e-3);
}

#[test]
fn test_sub_hessians_are_exactly_symmetric() {
    let (masses, positions, terms) = two_residues();
    let partition = BlockPartition::from_residues(6, &[3, 3], 1).unwrap();
    let restricted = ForceField::new(partition.restrict(&terms));
    let mut sim = Simulation::new(masses, positions, restricted).unwrap();

    let hessian = build_block_hessian(&mut sim, &partition, &FiniteDifference::fixed(1e-4)).unwrap();
    for block in hessian.blocks() {
        assert_eq!(block, &block.transpose());
    }
}

#[test]
fn test_cross_block_entries_are_zero() {
    let (masses, positions, terms) = two_residues();
    let partition = BlockPartition::from_residues(6, &[3, 3], 1).unwrap();
    let restricted = ForceField::new(partition.restrict(&terms));
    let mut sim = Simulation::new(masses, positions.clone(), restricted).unwrap();

    let hessian = build_block_hessian(&mut sim, &partition, &FiniteDifference::fixed(1e-4)).unwrap();
    let dense = hessian.to_dense();
    for i in 0..9 {
        for j in 9..18 {
            assert_eq!(dense[(i, j)], 0.0);
            assert_eq!(dense[(j, i)], 0.0);
        }
    }
    assert_eq!(dense[(4, 2)], hessian.get(4, 2));
    assert_eq!(sim.positions(), positions.as_slice());
}

#[test]
fn test_blocks_of_different_sizes() {
    let (masses, positions, terms) = two_residues();
    // 4 + 2 particles: offsets 6..12 only touch the first block
    let partition = BlockPartition::from_starts(vec![0, 4], 6).unwrap();
    let restricted = ForceField::new(partition.restrict(&terms));
    let mut sim = Simulation::new(masses, positions, restricted).unwrap();

    let hessian = build_block_hessian(&mut sim, &partition, &FiniteDifference::fixed(1e-4)).unwrap();
    assert_eq!(hessian.block(0).shape(), (12, 12));
    assert_eq!(hessian.block(1).shape(), (6, 6));
    // every interaction of particles 4 and 5 crosses into the first block
    assert!(hessian.block(1).iter().all(|&h| h == 0.0));
    assert!(hessian.block(0).iter().any(|&h| h != 0.0));
}

#[test]
fn test_partition_must_match_context() {
    let mut sim = diatomic();
    let partition = BlockPartition::from_residues(3, &[3], 1).unwrap();
    let result = build_block_hessian(&mut sim, &partition, &FiniteDifference::fixed(1e-4));
    assert!(matches!(result, Err(crate::error::LtmdError::DimensionMismatch { .. })));
}
