//! Energy and force of a single interaction. Each kernel returns the energy and
//! the force on every participant, in participant order.

use nalgebra::Vector3;
use std::f64::consts::PI;

/// Coulomb prefactor in kJ mol^-1 nm e^-2
pub const COULOMB: f64 = 138.935456;

const EPS: f64 = 1e-12;

pub fn harmonic_bond(p0: Vector3<f64>, p1: Vector3<f64>, length: f64, k: f64) -> (f64, [Vector3<f64>; 2]) {
    let diff = p0 - p1;
    let r = diff.norm();
    let dr = r - length;
    let energy = 0.5 * k * dr * dr;
    if r < EPS {
        return (energy, [Vector3::zeros(); 2]);
    }
    let f0 = diff * (-k * dr / r);
    (energy, [f0, -f0])
}

pub fn harmonic_angle(p: [Vector3<f64>; 3], angle: f64, k: f64) -> (f64, [Vector3<f64>; 3]) {
    let u = p[0] - p[1];
    let v = p[2] - p[1];
    let u_len = u.norm();
    let v_len = v.norm();
    if u_len < EPS || v_len < EPS {
        return (0.0, [Vector3::zeros(); 3]);
    }

    let cos_theta = (u.dot(&v) / (u_len * v_len)).clamp(-1.0, 1.0);
    let theta = cos_theta.acos();
    let d_theta = theta - angle;
    let energy = 0.5 * k * d_theta * d_theta;

    let sin_theta = (1.0 - cos_theta * cos_theta).sqrt();
    if sin_theta < EPS {
        // gradient of θ is undefined for a straight angle
        return (energy, [Vector3::zeros(); 3]);
    }

    // ∂θ/∂r0 = −∂cosθ/∂r0 / sinθ, with ∂cosθ/∂r0 = v/(|u||v|) − cosθ·u/|u|²
    let dtheta_0 = (u * (cos_theta / (u_len * u_len)) - v / (u_len * v_len)) / sin_theta;
    let dtheta_2 = (v * (cos_theta / (v_len * v_len)) - u / (u_len * v_len)) / sin_theta;

    let f0 = dtheta_0 * (-k * d_theta);
    let f2 = dtheta_2 * (-k * d_theta);
    (energy, [f0, -(f0 + f2), f2])
}

/// Dihedral angle (IUPAC sign convention) and its gradient with respect to each particle
pub fn dihedral(p: [Vector3<f64>; 4]) -> Option<(f64, [Vector3<f64>; 4])> {
    let b1 = p[1] - p[0];
    let b2 = p[2] - p[1];
    let b3 = p[3] - p[2];

    let n1 = b1.cross(&b2);
    let n2 = b2.cross(&b3);
    let n1_sq = n1.norm_squared();
    let n2_sq = n2.norm_squared();
    let b2_sq = b2.norm_squared();
    if n1_sq < EPS || n2_sq < EPS || b2_sq < EPS {
        return None;
    }
    let b2_len = b2_sq.sqrt();

    let phi = (b2_len * b1.dot(&n2)).atan2(n1.dot(&n2));

    let g0 = n1 * (-b2_len / n1_sq);
    let g3 = n2 * (b2_len / n2_sq);
    let s1 = b1.dot(&b2) / b2_sq;
    let s3 = b3.dot(&b2) / b2_sq;
    let g1 = g0 * (-s1 - 1.0) + g3 * s3;
    let g2 = g3 * (-s3 - 1.0) + g0 * s1;

    Some((phi, [g0, g1, g2, g3]))
}

fn torsion_forces(gradient: &[Vector3<f64>; 4], de_dphi: f64) -> [Vector3<f64>; 4] {
    [
        gradient[0] * -de_dphi,
        gradient[1] * -de_dphi,
        gradient[2] * -de_dphi,
        gradient[3] * -de_dphi,
    ]
}

pub fn periodic_torsion(
    p: [Vector3<f64>; 4],
    periodicity: u32,
    phase: f64,
    k: f64,
) -> (f64, [Vector3<f64>; 4]) {
    let Some((phi, gradient)) = dihedral(p) else {
        return (0.0, [Vector3::zeros(); 4]);
    };
    let n = periodicity as f64;
    let arg = n * phi - phase;
    let energy = k * (1.0 + arg.cos());
    let de_dphi = -k * n * arg.sin();
    (energy, torsion_forces(&gradient, de_dphi))
}

pub fn rb_torsion(p: [Vector3<f64>; 4], c: &[f64; 6]) -> (f64, [Vector3<f64>; 4]) {
    let Some((phi, gradient)) = dihedral(p) else {
        return (0.0, [Vector3::zeros(); 4]);
    };
    let psi = phi - PI;
    let cos_psi = psi.cos();
    let sin_psi = psi.sin();

    let mut energy = 0.0;
    let mut de_dpsi = 0.0;
    for (n, &coefficient) in c.iter().enumerate() {
        energy += coefficient * cos_psi.powi(n as i32);
        if n > 0 {
            de_dpsi -= n as f64 * coefficient * cos_psi.powi(n as i32 - 1) * sin_psi;
        }
    }
    (energy, torsion_forces(&gradient, de_dpsi))
}

pub fn lennard_jones_coulomb(
    p0: Vector3<f64>,
    p1: Vector3<f64>,
    charge_product: f64,
    sigma: f64,
    epsilon: f64,
) -> (f64, [Vector3<f64>; 2]) {
    let diff = p0 - p1;
    let r2 = diff.norm_squared();
    if r2 < EPS {
        return (0.0, [Vector3::zeros(); 2]);
    }
    let r = r2.sqrt();
    let sr2 = sigma * sigma / r2;
    let sr6 = sr2 * sr2 * sr2;
    let coulomb = COULOMB * charge_product / r;

    let energy = 4.0 * epsilon * (sr6 * sr6 - sr6) + coulomb;
    // -dE/dr * 1/r
    let f_over_r = (24.0 * epsilon * (2.0 * sr6 * sr6 - sr6) + coulomb) / r2;
    let f0 = diff * f_over_r;
    (energy, [f0, -f0])
}
