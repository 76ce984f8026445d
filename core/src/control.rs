//! Full-state feedback for single-input linear models.
//!
//! The gain is placed with Ackermann's formula
//!
//! $$
//! K = \begin{bmatrix} 0 & \cdots & 0 & 1 \end{bmatrix} \mathcal{C}^{-1} \phi(A), \qquad
//! \mathcal{C} = \begin{bmatrix} B & AB & \cdots & A^{n-1}B \end{bmatrix}
//! $$
//!
//! where $\phi$ is the desired characteristic polynomial. The control law is $u = -K (x - x_d)$.
use crate::linalg::ensure_len;
use crate::state_space::StateSpaceLinear;
use crate::{Error, Result};

use nalgebra::{Complex, DMatrix, DVector};

/// Imaginary residue above which a pole set is not closed under conjugation
const CONJUGATE_TOLERANCE: f64 = 1e-9;

/// Gain K (1×n) such that the eigenvalues of A − B K are `desired_poles`.
///
/// Complex poles must come in conjugate pairs.
///
/// # Errors
/// * [`Error::DimensionMismatch`] if B has more than one column or the pole count is not n.
/// * [`Error::SingularMatrix`] if the model is not controllable.
/// * [`Error::InvalidConfig`] if the poles do not form conjugate pairs.
pub fn full_state_feedback(
    state_space: &StateSpaceLinear,
    desired_poles: &[Complex<f64>],
) -> Result<DMatrix<f64>> {
    let a = state_space.a();
    let b = state_space.b();
    let n = state_space.state_dim();
    if b.ncols() != 1 {
        return Err(Error::DimensionMismatch {
            what: "B (single input)",
            expected: (n, 1),
            found: b.shape(),
        });
    }
    if desired_poles.len() != n {
        return Err(Error::DimensionMismatch {
            what: "desired poles",
            expected: (n, 1),
            found: (desired_poles.len(), 1),
        });
    }

    let coefficients = characteristic_polynomial(desired_poles)?;

    // controllability matrix, one column per power of A
    let mut ctrb = DMatrix::<f64>::zeros(n, n);
    let mut column = b.clone();
    for k in 0..n {
        ctrb.set_column(k, &column.column(0));
        column = a * column;
    }

    // φ(A) = A^n + c_{n-1} A^{n-1} + ... + c_0 I, by Horner's scheme
    let eye = DMatrix::<f64>::identity(n, n);
    let mut phi = eye.clone();
    for c in coefficients.iter().skip(1) {
        phi = a * phi + &eye * *c;
    }

    // last row of 𝒞⁻¹ is the solution y of 𝒞ᵀ y = e_n
    let mut e_n = DVector::<f64>::zeros(n);
    e_n[n - 1] = 1.0;
    let y = ctrb
        .transpose()
        .lu()
        .solve(&e_n)
        .ok_or(Error::SingularMatrix("controllability matrix"))?;
    Ok(DMatrix::from_row_slice(1, n, y.as_slice()) * phi)
}

/// Real coefficients of Π (s − p_i), highest power first.
fn characteristic_polynomial(poles: &[Complex<f64>]) -> Result<Vec<f64>> {
    let mut coefficients = vec![Complex::new(1.0, 0.0)];
    for p in poles {
        let mut next = vec![Complex::new(0.0, 0.0); coefficients.len() + 1];
        for (i, c) in coefficients.iter().enumerate() {
            next[i] += c;
            next[i + 1] -= c * p;
        }
        coefficients = next;
    }
    coefficients
        .into_iter()
        .map(|c| {
            if c.im.abs() > CONJUGATE_TOLERANCE {
                Err(Error::InvalidConfig(
                    "desired poles must come in complex-conjugate pairs".to_string(),
                ))
            } else {
                Ok(c.re)
            }
        })
        .collect()
}

/// u = −K (x − x_d)
///
/// # Errors
/// * [`Error::DimensionMismatch`] if x, the desired state, and K disagree on the state dimension.
pub fn get_control_input(
    x: &DVector<f64>,
    desired: &DVector<f64>,
    gain_matrix: &DMatrix<f64>,
) -> Result<DVector<f64>> {
    ensure_len("state", x, gain_matrix.ncols())?;
    ensure_len("desired state", desired, gain_matrix.ncols())?;
    Ok(-(gain_matrix * (x - desired)))
}
