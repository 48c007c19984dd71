//! Dense linear algebra used by the subspace pipeline
//!
//! Matrix multiply with shape checking, plus a pluggable symmetric eigensolver.
//! Two backends are available: a portable cyclic Jacobi solver and nalgebra's
//! implicit-QR `SymmetricEigen`. Both return eigenvalues in solver order and
//! eigenvectors as the columns of an orthonormal matrix.

use crate::error::{LtmdError, Result};
use itertools::Itertools;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Multiply two dense matrices, failing when they are not conformable
pub fn multiply(a: &DMatrix<f64>, b: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    if a.ncols() != b.nrows() {
        return Err(LtmdError::dimension(
            "matrix multiply",
            format!("{} rows in right operand", a.ncols()),
            format!("{}x{} * {}x{}", a.nrows(), a.ncols(), b.nrows(), b.ncols()),
        ));
    }
    Ok(a * b)
}

/// Make a square matrix exactly symmetric by averaging mirrored entries
pub fn symmetrize(matrix: &mut DMatrix<f64>) {
    let n = matrix.nrows().min(matrix.ncols());
    for i in 0..n {
        for j in 0..i {
            let avg = 0.5 * (matrix[(i, j)] + matrix[(j, i)]);
            matrix[(i, j)] = avg;
            matrix[(j, i)] = avg;
        }
    }
}

/// Eigenvalues and eigenvectors (as columns) of a symmetric matrix
#[derive(Debug, Clone)]
pub struct Eigendecomposition {
    pub eigenvalues: DVector<f64>,
    pub eigenvectors: DMatrix<f64>,
}

impl Eigendecomposition {
    /// Column indices ordered by ascending |eigenvalue|; ties keep solver order
    pub fn magnitude_order(&self) -> Vec<usize> {
        self.eigenvalues
            .iter()
            .enumerate()
            .sorted_by(|a, b| a.1.abs().total_cmp(&b.1.abs()).then(a.0.cmp(&b.0)))
            .map(|(idx, _)| idx)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.eigenvalues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.eigenvalues.is_empty()
    }
}

/// Symmetric eigensolver backend
pub trait Eigensolver: Send + Sync {
    fn name(&self) -> &'static str;

    fn eigendecompose(&self, matrix: &DMatrix<f64>) -> Result<Eigendecomposition>;
}

fn check_square(matrix: &DMatrix<f64>) -> Result<()> {
    if !matrix.is_square() {
        return Err(LtmdError::dimension(
            "eigendecomposition",
            "square matrix",
            format!("{}x{}", matrix.nrows(), matrix.ncols()),
        ));
    }
    Ok(())
}

/// Cyclic Jacobi rotations; slow but dependable for small blocks
#[derive(Debug, Clone)]
pub struct JacobiSolver {
    pub max_sweeps: usize,
    pub tolerance: f64,
}

impl Default for JacobiSolver {
    fn default() -> Self {
        JacobiSolver {
            max_sweeps: 100,
            tolerance: 1e-14,
        }
    }
}

impl JacobiSolver {
    fn off_diagonal_norm_sq(a: &DMatrix<f64>) -> f64 {
        let n = a.nrows();
        let mut sum = 0.0;
        for p in 0..n {
            for q in (p + 1)..n {
                sum += a[(p, q)] * a[(p, q)];
            }
        }
        sum
    }
}

impl Eigensolver for JacobiSolver {
    fn name(&self) -> &'static str {
        "jacobi"
    }

    fn eigendecompose(&self, matrix: &DMatrix<f64>) -> Result<Eigendecomposition> {
        check_square(matrix)?;
        let n = matrix.nrows();
        let mut a = matrix.clone();
        let mut v = DMatrix::<f64>::identity(n, n);

        let scale = matrix.norm_squared();
        let threshold = self.tolerance * self.tolerance * scale;
        let mut converged = false;

        for _sweep in 0..self.max_sweeps {
            if Self::off_diagonal_norm_sq(&a) <= threshold {
                converged = true;
                break;
            }

            for p in 0..n {
                for q in (p + 1)..n {
                    let apq = a[(p, q)];
                    if apq == 0.0 {
                        continue;
                    }

                    let theta = (a[(q, q)] - a[(p, p)]) / (2.0 * apq);
                    let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                    let c = 1.0 / (t * t + 1.0).sqrt();
                    let s = t * c;

                    for k in 0..n {
                        let akp = a[(k, p)];
                        let akq = a[(k, q)];
                        a[(k, p)] = c * akp - s * akq;
                        a[(k, q)] = s * akp + c * akq;
                    }
                    for k in 0..n {
                        let apk = a[(p, k)];
                        let aqk = a[(q, k)];
                        a[(p, k)] = c * apk - s * aqk;
                        a[(q, k)] = s * apk + c * aqk;
                    }
                    for k in 0..n {
                        let vkp = v[(k, p)];
                        let vkq = v[(k, q)];
                        v[(k, p)] = c * vkp - s * vkq;
                        v[(k, q)] = s * vkp + c * vkq;
                    }
                }
            }
        }

        if !converged && Self::off_diagonal_norm_sq(&a) > threshold {
            return Err(LtmdError::eigensolver(format!(
                "Jacobi iteration did not converge in {} sweeps",
                self.max_sweeps
            )));
        }

        Ok(Eigendecomposition {
            eigenvalues: a.diagonal(),
            eigenvectors: v,
        })
    }
}

/// nalgebra's Householder tridiagonalization + implicit QR
#[derive(Debug, Clone, Default)]
pub struct NalgebraSolver;

impl Eigensolver for NalgebraSolver {
    fn name(&self) -> &'static str {
        "nalgebra"
    }

    fn eigendecompose(&self, matrix: &DMatrix<f64>) -> Result<Eigendecomposition> {
        check_square(matrix)?;
        if matrix.nrows() == 0 {
            return Ok(Eigendecomposition {
                eigenvalues: DVector::zeros(0),
                eigenvectors: DMatrix::zeros(0, 0),
            });
        }

        let eigen = matrix
            .clone()
            .try_symmetric_eigen(f64::EPSILON, 0)
            .ok_or_else(|| LtmdError::eigensolver("symmetric QR iteration did not converge"))?;

        Ok(Eigendecomposition {
            eigenvalues: eigen.eigenvalues,
            eigenvectors: eigen.eigenvectors,
        })
    }
}

/// Selects which eigensolver backs a rebuild
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EigenBackend {
    #[default]
    Nalgebra,
    Jacobi,
}

impl EigenBackend {
    pub fn solver(self) -> Box<dyn Eigensolver> {
        match self {
            EigenBackend::Nalgebra => Box::new(NalgebraSolver),
            EigenBackend::Jacobi => Box::new(JacobiSolver::default()),
        }
    }
}

impl FromStr for EigenBackend {
    type Err = LtmdError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "nalgebra" | "qr" => Ok(EigenBackend::Nalgebra),
            "jacobi" => Ok(EigenBackend::Jacobi),
            _ => Err(LtmdError::config(format!("Unknown eigensolver backend: {}", s))),
        }
    }
}

impl fmt::Display for EigenBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EigenBackend::Nalgebra => write!(f, "nalgebra"),
            EigenBackend::Jacobi => write!(f, "jacobi"),
        }
    }
}
