//! End-to-end subspace construction on small molecules

use approx::{assert_abs_diff_eq, assert_relative_eq};
use ltmd::config::Config;
use ltmd::forcefield::{HarmonicAngle, HarmonicBond, NonbondedException, NonbondedParticle};
use ltmd::hessian_impl::{build_block_hessian, FiniteDifference};
use ltmd::linalg::{JacobiSolver, NalgebraSolver};
use ltmd::modes_impl::{assemble_coarse_basis, reduced_stiffness, refine};
use ltmd::projection_impl::diagonalize_blocks;
use ltmd::{
    BlockPartition, EigenBackend, ForceField, ForceTerm, LtmdError, LtmdParameters, ModeProjection,
    ModeSet, Simulation, SimulationContext, SubspaceBuilder,
};
use nalgebra::{DMatrix, DVector, Vector3};

fn bond(i: usize, j: usize, length: f64, k: f64) -> HarmonicBond {
    HarmonicBond {
        particles: [i, j],
        length,
        k,
    }
}

fn angle(i: usize, j: usize, k: usize) -> HarmonicAngle {
    HarmonicAngle {
        particles: [i, j, k],
        angle: 1.83,
        k: 350.0,
    }
}

/// Two bent triatomics, optionally bonded to each other through particles 2 and 3
fn two_triatomics(linked: bool) -> (Simulation<ForceField>, Vec<ForceTerm>) {
    let masses = vec![16.0, 1.0, 1.0, 16.0, 1.0, 1.0];
    let positions = vec![
        Vector3::new(0.0, 0.0, 0.0),
        Vector3::new(0.1, 0.0, 0.0),
        Vector3::new(-0.026, 0.097, 0.0),
        Vector3::new(0.05, 0.35, 0.03),
        Vector3::new(0.15, 0.35, 0.03),
        Vector3::new(0.024, 0.447, 0.03),
    ];
    let mut bonds = vec![
        bond(0, 1, 0.1, 4000.0),
        bond(0, 2, 0.1, 4000.0),
        bond(3, 4, 0.1, 4000.0),
        bond(3, 5, 0.1, 4000.0),
    ];
    if linked {
        bonds.push(bond(2, 3, 0.26, 800.0));
    }
    let terms = vec![
        ForceTerm::HarmonicBond { bonds },
        ForceTerm::HarmonicAngle {
            angles: vec![angle(1, 0, 2), angle(4, 3, 5)],
        },
        ForceTerm::Nonbonded {
            particles: [-0.8, 0.4, 0.4, -0.8, 0.4, 0.4]
                .iter()
                .map(|&charge| NonbondedParticle {
                    charge,
                    sigma: 0.2,
                    epsilon: 0.3,
                })
                .collect(),
            // intramolecular pairs are excluded
            exceptions: [[0, 1], [0, 2], [1, 2], [3, 4], [3, 5], [4, 5]]
                .iter()
                .map(|&particles| NonbondedException {
                    particles,
                    charge_product: 0.0,
                    sigma: 1.0,
                    epsilon: 0.0,
                })
                .collect(),
        },
        ForceTerm::CenterOfMassMotion,
    ];
    let sim = Simulation::new(masses, positions, ForceField::new(terms.clone())).unwrap();
    (sim, terms)
}

fn flatten(mode: &[Vector3<f64>]) -> DVector<f64> {
    DVector::from_iterator(3 * mode.len(), mode.iter().flat_map(|v| v.iter().copied()))
}

#[test]
fn test_diatomic_stretch_mode() {
    let (k, m1, m2) = (1000.0, 12.0_f64, 16.0_f64);
    let terms = vec![ForceTerm::HarmonicBond {
        bonds: vec![bond(0, 1, 0.12, k)],
    }];
    let start = vec![Vector3::new(0.0, 0.0, 0.0), Vector3::new(0.12, 0.0, 0.0)];

    for backend in [EigenBackend::Nalgebra, EigenBackend::Jacobi] {
        let mut sim = Simulation::new(vec![m1, m2], start.clone(), ForceField::new(terms.clone())).unwrap();
        let mut params = LtmdParameters::new(1, vec![2]);
        params.eigen_backend = backend;
        let builder = SubspaceBuilder::new(params).unwrap();

        let modes = builder.build(&mut sim, &terms).unwrap();
        assert_eq!(modes.len(), 1);
        assert_eq!(modes.coarse_dimension, 1);
        assert_relative_eq!(modes.max_eigenvalue, k * (1.0 / m1 + 1.0 / m2), max_relative = 1e-6);

        let expected = DVector::from_vec(vec![m2.sqrt(), 0.0, 0.0, -m1.sqrt(), 0.0, 0.0]) / (m1 + m2).sqrt();
        let mode = flatten(modes.mode(0).unwrap());
        assert_relative_eq!(mode.dot(&expected).abs(), 1.0, epsilon = 1e-8);
        assert_eq!(sim.positions(), start.as_slice());
    }
}

#[test]
fn test_single_residue_blocks_give_block_diagonal_hessian() {
    let (sim, terms) = two_triatomics(false);
    let partition = BlockPartition::from_residues(6, &[3, 3], 1).unwrap();
    let mut block_sim = Simulation::new(
        sim.masses().to_vec(),
        sim.positions().to_vec(),
        ForceField::new(partition.restrict(&terms)),
    )
    .unwrap();

    let dense = build_block_hessian(&mut block_sim, &partition, &FiniteDifference::fixed(1e-4))
        .unwrap()
        .to_dense();
    assert_eq!(dense, dense.transpose());
    for i in 0..9 {
        for j in 9..18 {
            assert_eq!(dense[(i, j)], 0.0);
        }
    }
}

#[test]
fn test_too_many_modes_is_fatal() {
    let (mut sim, terms) = two_triatomics(true);
    let before = sim.positions().to_vec();

    // three vibrations per triatomic block
    let mut projection = ModeProjection::new(100);
    let fine = SubspaceBuilder::new(LtmdParameters::new(2, vec![3, 3])).unwrap();
    projection.rebuild(&fine, &mut sim, &terms).unwrap();
    let published = projection.modes().unwrap().clone();
    assert_eq!(published.coarse_dimension, 6);

    let greedy = SubspaceBuilder::new(LtmdParameters::new(7, vec![3, 3])).unwrap();
    let result = projection.rebuild(&greedy, &mut sim, &terms);
    assert!(matches!(result, Err(LtmdError::Configuration(_))));
    assert_eq!(sim.positions(), before.as_slice());
    assert_eq!(projection.modes().unwrap(), &published);
}

#[test]
fn test_rebuild_is_deterministic() {
    let (mut sim, terms) = two_triatomics(true);
    let builder = SubspaceBuilder::new(LtmdParameters::new(4, vec![3, 3])).unwrap();

    let first: ModeSet = builder.build(&mut sim, &terms).unwrap();
    let second: ModeSet = builder.build(&mut sim, &terms).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_coarse_dimension_respects_quota() {
    let (mut sim, terms) = two_triatomics(true);
    let mut params = LtmdParameters::new(2, vec![3, 3]);
    params.bdof = 2;
    let builder = SubspaceBuilder::new(params).unwrap();

    let modes = builder.build(&mut sim, &terms).unwrap();
    assert!(modes.coarse_dimension <= 2 * 2);
    assert!(modes.len() <= modes.coarse_dimension);
    assert_eq!(modes.len(), 2);
}

#[test]
fn test_modes_are_orthonormal_and_free_of_translation() {
    let (mut sim, terms) = two_triatomics(true);
    let builder = SubspaceBuilder::new(LtmdParameters::new(6, vec![3, 3])).unwrap();
    let modes = builder.build(&mut sim, &terms).unwrap();

    let columns: Vec<DVector<f64>> = modes.modes.iter().map(|m| flatten(m)).collect();
    let u = DMatrix::from_columns(&columns);
    assert_abs_diff_eq!(u.transpose() * &u, DMatrix::identity(6, 6), epsilon = 1e-9);

    let masses = sim.masses();
    let total: f64 = masses.iter().sum();
    for axis in 0..3 {
        let mut translation = DVector::zeros(18);
        for (p, m) in masses.iter().enumerate() {
            translation[3 * p + axis] = (m / total).sqrt();
        }
        for column in &columns {
            assert_abs_diff_eq!(column.dot(&translation), 0.0, epsilon = 1e-9);
        }
    }

    for pair in modes.eigenvalues.windows(2) {
        assert!(pair[0].abs() <= pair[1].abs());
    }
    let largest = modes.eigenvalues.iter().fold(0.0_f64, |a, l| a.max(l.abs()));
    assert_relative_eq!(modes.max_eigenvalue, largest, max_relative = 1e-12);
}

#[test]
fn test_stages_compose_into_independent_vectors() {
    let (mut sim, terms) = two_triatomics(true);
    let partition = BlockPartition::from_residues(6, &[3, 3], 1).unwrap();

    let hessian = {
        let mut block_sim = Simulation::new(
            sim.masses().to_vec(),
            sim.positions().to_vec(),
            ForceField::new(partition.restrict(&terms)),
        )
        .unwrap();
        build_block_hessian(&mut block_sim, &partition, &FiniteDifference::fixed(1e-4)).unwrap()
    };
    let blocks = diagonalize_blocks(&hessian, sim.positions(), sim.masses(), &JacobiSolver::default()).unwrap();
    for b in &blocks {
        assert!(b.len() <= b.block.dof());
        if b.discarded == 0 {
            assert_eq!(b.len(), b.quota());
        }
    }

    let coarse = assemble_coarse_basis(&blocks, 18, 12 * partition.num_blocks()).unwrap();
    let s = reduced_stiffness(&mut sim, &coarse, 1e-4).unwrap();
    assert_eq!(s, s.transpose());

    let refinement = refine(&s, &coarse, 3, &NalgebraSolver).unwrap();
    let u = &refinement.approximate_eigenvectors;
    assert_eq!(u.ncols(), coarse.dimension());
    let singular = u.clone().svd(false, false).singular_values;
    assert!(singular.iter().all(|&sv| sv > 1e-6));
}

#[test]
fn test_larger_blocks_by_residue_grouping() {
    let (mut sim, terms) = two_triatomics(true);
    let mut params = LtmdParameters::new(3, vec![3, 3]);
    params.residues_per_block = 2;
    let builder = SubspaceBuilder::new(params).unwrap();

    // one block holding both molecules: at most 18 dof minus 6 rigid
    let modes = builder.build(&mut sim, &terms).unwrap();
    assert!(modes.coarse_dimension <= 12);
    assert!(modes.coarse_dimension >= 6);
    assert_eq!(modes.len(), 3);
}

#[test]
fn test_sample_configuration_runs() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/configs/water_dimer.yaml");
    let config = Config::from_file(path).unwrap();
    let mut sim = config.build_simulation().unwrap();

    let builder = SubspaceBuilder::new(config.ltmd.clone()).unwrap();
    let mut projection = ModeProjection::new(config.ltmd.rediagonalize_frequency);
    projection.rebuild(&builder, &mut sim, &config.force_field).unwrap();

    let modes = projection.modes().unwrap();
    assert_eq!(modes.len(), 4);
    assert_eq!(modes.coarse_dimension, 6);
    assert!(projection.changed());
    assert_eq!(sim.positions(), config.positions().as_slice());
}
