//! Linear algebra helpers shared by the models, filters, and simulators.
//!
//! Public API:
//!     pub fn ensure_shape(what, matrix, rows, cols) -> Result<()>
//!     pub fn ensure_len(what, vector, len) -> Result<()>
//!     pub fn symmetrize(matrix) -> DMatrix<f64>
//!     pub fn matrix_square_root(matrix) -> Result<DMatrix<f64>>
//!     pub fn spd_solve(a, b) -> Result<DMatrix<f64>>
//!
//! The square root is used to colour Gaussian noise with a covariance, the solver is used for the
//! Kalman gain.
//!
//! Square root ladder:
//! 1) Symmetrize P ← 0.5 (P + Pᵀ)
//! 2) Cholesky
//! 3) Jittered Cholesky (geometric ramp)
//! 4) Symmetric EVD with negative eigenvalues floored at zero
//!
//! The solver symmetrizes, tries Cholesky, then LU, and never perturbs its input.

use crate::{Error, Result};

use nalgebra::{DMatrix, DVector};
use nalgebra::linalg::{Cholesky, SymmetricEigen};

/// Check that `matrix` has exactly `rows`×`cols` entries.
pub fn ensure_shape(what: &'static str, matrix: &DMatrix<f64>, rows: usize, cols: usize) -> Result<()> {
    if matrix.shape() != (rows, cols) {
        return Err(Error::DimensionMismatch {
            what,
            expected: (rows, cols),
            found: matrix.shape(),
        });
    }
    Ok(())
}

/// Check that a column vector has `len` entries.
pub fn ensure_len(what: &'static str, v: &DVector<f64>, len: usize) -> Result<()> {
    if v.len() != len {
        return Err(Error::DimensionMismatch {
            what,
            expected: (len, 1),
            found: (v.len(), 1),
        });
    }
    Ok(())
}

/// Check that `matrix` is square and return its dimension.
pub fn ensure_square(what: &'static str, matrix: &DMatrix<f64>) -> Result<usize> {
    if !matrix.is_square() {
        return Err(Error::NotSquare {
            what,
            shape: matrix.shape(),
        });
    }
    Ok(matrix.nrows())
}

/// Symmetrize a matrix: P ← 0.5 (P + Pᵀ)
///
/// Removes the round-off asymmetry that accumulates in covariance recursions.
#[inline]
pub fn symmetrize(m: &DMatrix<f64>) -> DMatrix<f64> {
    0.5 * (m + m.transpose())
}

/// Compute a square root `S` of a symmetric positive semi-definite matrix such that `matrix ≈ S * Sᵀ`.
///
/// The Cholesky factor is returned when it exists (lower triangular). Near-singular matrices get a
/// small diagonal jitter, and anything still failing falls back to the symmetric eigen-decomposition
/// with negative eigenvalues floored, which always succeeds.
///
/// # Errors
/// * [`Error::NotSquare`] if `matrix` is not square.
pub fn matrix_square_root(matrix: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    ensure_square("matrix_square_root input", matrix)?;
    let p = symmetrize(matrix);
    if let Some(s) = chol_sqrt(&p) {
        return Ok(s);
    }
    let opt = SolveOptions::default();
    if let Some(s) = chol_sqrt_with_jitter(&p, opt) {
        return Ok(s);
    }
    Ok(evd_symmetric_sqrt_with_floor(&p, 0.0))
}

fn chol_sqrt(p: &DMatrix<f64>) -> Option<DMatrix<f64>> {
    Cholesky::new(p.clone()).map(|ch| ch.l())
}

fn chol_sqrt_with_jitter(p: &DMatrix<f64>, opt: SolveOptions) -> Option<DMatrix<f64>> {
    let mut jitter = opt.initial_jitter;
    for _ in 0..opt.max_tries {
        let pj = p + DMatrix::<f64>::identity(p.nrows(), p.ncols()) * jitter;
        if let Some(ch) = Cholesky::new(pj) {
            return Some(ch.l());
        }
        jitter *= 10.0;
        if jitter > opt.max_jitter {
            break;
        }
    }
    None
}

/// S = U * sqrt(max(λ, floor)) * Uᵀ
fn evd_symmetric_sqrt_with_floor(p: &DMatrix<f64>, floor: f64) -> DMatrix<f64> {
    let se = SymmetricEigen::new(p.clone());
    let sqrt_vals = se.eigenvalues.map(|l| l.max(floor).sqrt());
    let u = se.eigenvectors;
    &u * DMatrix::<f64>::from_diagonal(&sqrt_vals) * u.transpose()
}

/// Jitter schedule for the Cholesky retries of [`matrix_square_root`]
#[derive(Debug, Clone, Copy)]
pub struct SolveOptions {
    pub initial_jitter: f64,
    pub max_jitter: f64,
    pub max_tries: usize,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            initial_jitter: 1e-12,
            max_jitter: 1e-6,
            max_tries: 6,
        }
    }
}

/// Solve A X = B for a symmetric positive (semi-)definite A.
///
/// Tries Cholesky on the symmetrized A and falls back to a general LU solve, which copes with
/// nearly-singular or slightly indefinite matrices. A is never perturbed: when both factorizations
/// fail the matrix is reported as singular.
///
/// # Errors
/// * [`Error::NotSquare`] if A is not square.
/// * [`Error::DimensionMismatch`] if B does not have as many rows as A.
/// * [`Error::SingularMatrix`] if neither factorization succeeds.
pub fn spd_solve(a: &DMatrix<f64>, b: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    let n = ensure_square("spd_solve left-hand side", a)?;
    ensure_shape("spd_solve right-hand side", b, n, b.ncols())?;
    let a_sym = symmetrize(a);

    if let Some(ch) = Cholesky::new(a_sym.clone()) {
        return Ok(ch.solve(b));
    }
    a_sym
        .lu()
        .solve(b)
        .ok_or(Error::SingularMatrix("spd_solve"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: &DMatrix<f64>, b: &DMatrix<f64>, tol: f64) -> bool {
        a.shape() == b.shape() && (a - b).amax() <= tol
    }

    #[test]
    fn t_symmetrize() {
        let m = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 0.0, 3.0]);
        let s_expected = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, 3.0]);
        assert!(approx_eq(&symmetrize(&m), &s_expected, 1e-15));
    }

    #[test]
    fn t_ensure_shape() {
        let m = DMatrix::<f64>::zeros(2, 3);
        assert!(ensure_shape("m", &m, 2, 3).is_ok());
        match ensure_shape("m", &m, 3, 2) {
            Err(Error::DimensionMismatch { expected, found, .. }) => {
                assert_eq!(expected, (3, 2));
                assert_eq!(found, (2, 3));
            }
            other => panic!("unexpected result {other:?}"),
        }
        assert!(matches!(ensure_square("m", &m), Err(Error::NotSquare { .. })));
    }

    #[test]
    fn t_square_root_spd() {
        let a = DMatrix::from_row_slice(3, 3, &[1.0, 2.0, 0.5, 0.0, 1.0, -1.0, 0.0, 0.0, 0.2]);
        let p = &a * a.transpose();
        let s = matrix_square_root(&p).unwrap();
        assert!(approx_eq(&(&s * s.transpose()), &p, 1e-12));
    }

    #[test]
    fn t_square_root_of_zero_is_zero() {
        let z = DMatrix::<f64>::zeros(3, 3);
        let s = matrix_square_root(&z).unwrap();
        assert!(s.amax() < 1e-5);
    }

    #[test]
    fn t_square_root_semidefinite() {
        // rank one, Cholesky fails without help
        let v = DMatrix::from_row_slice(3, 1, &[1.0, 2.0, 3.0]);
        let p = &v * v.transpose();
        let s = matrix_square_root(&p).unwrap();
        assert!(approx_eq(&(&s * s.transpose()), &p, 1e-5));
    }

    #[test]
    fn t_square_root_non_square() {
        let m = DMatrix::<f64>::zeros(3, 2);
        assert!(matches!(matrix_square_root(&m), Err(Error::NotSquare { .. })));
    }

    #[test]
    fn t_spd_solve_basic() {
        let a = DMatrix::from_row_slice(2, 2, &[4.0, 2.0, 2.0, 3.0]);
        let b = DMatrix::from_row_slice(2, 1, &[6.0, 5.0]);
        let x = spd_solve(&a, &b).unwrap();
        assert!(approx_eq(&(&a * &x), &b, 1e-10));
    }

    #[test]
    fn t_spd_solve_indefinite_falls_back_to_lu() {
        let a = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 1.0]);
        let b = DMatrix::from_row_slice(2, 1, &[3.0, 3.0]);
        let x = spd_solve(&a, &b).unwrap();
        assert!(approx_eq(&(&a * &x), &b, 1e-10));
    }

    #[test]
    fn t_spd_solve_singular() {
        let a = DMatrix::<f64>::zeros(2, 2);
        let b = DMatrix::from_row_slice(2, 1, &[1.0, 1.0]);
        assert!(matches!(spd_solve(&a, &b), Err(Error::SingularMatrix(_))));
    }

    #[test]
    fn t_spd_solve_incompatible() {
        let a = DMatrix::<f64>::identity(2, 2);
        let b = DMatrix::<f64>::zeros(3, 1);
        assert!(matches!(
            spd_solve(&a, &b),
            Err(Error::DimensionMismatch { .. })
        ));
    }
}
