//! Linear state-space models
//!
//! $$
//! x_{k+1} = A x_k + B u_k, \qquad z_k = C x_k + D u_k
//! $$
//!
//! A [`StateSpaceLinear`] validates its matrix shapes once, at construction, and is immutable
//! afterwards: discretization returns a new model instead of rewriting A and B, so a filter and a
//! simulator can each hold their own copy without aliasing.
use crate::history::StateSpaceData;
use crate::linalg::{ensure_shape, ensure_square};
use crate::{Error, Result};

use std::fmt::{self, Display};

use nalgebra::{DMatrix, DVector};

/// Mass of the reference mass-spring-damper system (kg)
pub const MASS: f64 = 1.0;
/// Spring constant of the reference mass-spring-damper system (N/m)
pub const SPRING_CONSTANT: f64 = 1.0;
/// Damping coefficient of the reference mass-spring-damper system (N·s/m)
pub const DAMPING: f64 = 0.5;

#[derive(Clone, Debug, PartialEq)]
pub struct StateSpaceLinear {
    a: DMatrix<f64>,
    b: DMatrix<f64>,
    c: DMatrix<f64>,
    d: DMatrix<f64>,
}

impl Display for StateSpaceLinear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "StateSpaceLinear {{ states: {}, inputs: {}, outputs: {} }}",
            self.state_dim(),
            self.input_dim(),
            self.output_dim()
        )
    }
}

impl StateSpaceLinear {
    /// Full-state output model: C = I, D = 0.
    ///
    /// # Errors
    /// * [`Error::NotSquare`] if A is not square.
    /// * [`Error::DimensionMismatch`] if B does not have A's row count.
    pub fn new(a: DMatrix<f64>, b: DMatrix<f64>) -> Result<StateSpaceLinear> {
        let n = a.nrows();
        StateSpaceLinear::with_output(a, b, DMatrix::identity(n, n), None)
    }
    /// Model with an explicit output matrix; D defaults to zero when `None`.
    ///
    /// An empty (0×n) C is accepted and describes a model without measurements.
    pub fn with_output(
        a: DMatrix<f64>,
        b: DMatrix<f64>,
        c: DMatrix<f64>,
        d: Option<DMatrix<f64>>,
    ) -> Result<StateSpaceLinear> {
        let n = ensure_square("A", &a)?;
        ensure_shape("B", &b, n, b.ncols())?;
        let m = b.ncols();
        ensure_shape("C", &c, c.nrows(), n)?;
        let p = c.nrows();
        let d = match d {
            Some(d) => {
                ensure_shape("D", &d, p, m)?;
                d
            }
            None => DMatrix::zeros(p, m),
        };
        Ok(StateSpaceLinear { a, b, c, d })
    }
    pub fn a(&self) -> &DMatrix<f64> {
        &self.a
    }
    pub fn b(&self) -> &DMatrix<f64> {
        &self.b
    }
    pub fn c(&self) -> &DMatrix<f64> {
        &self.c
    }
    pub fn d(&self) -> &DMatrix<f64> {
        &self.d
    }
    pub fn state_dim(&self) -> usize {
        self.a.nrows()
    }
    pub fn input_dim(&self) -> usize {
        self.b.ncols()
    }
    pub fn output_dim(&self) -> usize {
        self.c.nrows()
    }
    /// Convert a continuous-time model to discrete time.
    ///
    /// Second-order series of the matrix exponential:
    ///
    /// $$
    /// A_d = I + A \Delta t + \tfrac{1}{2} A^2 \Delta t^2, \qquad B_d = \left(I \Delta t + \tfrac{1}{2} A \Delta t^2\right) B
    /// $$
    ///
    /// C and D are carried over unchanged.
    ///
    /// # Errors
    /// * [`Error::InvalidTimeStep`] if `dt` is not strictly positive and finite.
    pub fn continuous_to_discrete(&self, dt: f64) -> Result<StateSpaceLinear> {
        if !(dt.is_finite() && dt > 0.0) {
            return Err(Error::InvalidTimeStep(dt));
        }
        let n = self.state_dim();
        let eye = DMatrix::<f64>::identity(n, n);
        let a_dt = &self.a * dt;
        let a_d = &eye + &a_dt + 0.5 * &a_dt * &a_dt;
        let b_d = (&eye * dt + 0.5 * &self.a * dt * dt) * &self.b;
        Ok(StateSpaceLinear {
            a: a_d,
            b: b_d,
            c: self.c.clone(),
            d: self.d.clone(),
        })
    }
    /// x' = A x + B u
    pub fn step(&self, x: &DVector<f64>, u: &DVector<f64>) -> DVector<f64> {
        &self.a * x + &self.b * u
    }
    /// z = C x + D u
    pub fn output(&self, x: &DVector<f64>, u: &DVector<f64>) -> DVector<f64> {
        &self.c * x + &self.d * u
    }
    /// Open-loop response to a constant unit input on every channel, starting from rest.
    pub fn step_response(&self, dt: f64, steps: usize) -> StateSpaceData {
        let u = DVector::from_element(self.input_dim(), 1.0);
        self.response(dt, steps, |_| u.clone())
    }
    /// Open-loop response to a unit impulse at t = 0 followed by zero input, starting from rest.
    pub fn impulse_response(&self, dt: f64, steps: usize) -> StateSpaceData {
        let m = self.input_dim();
        self.response(dt, steps, |k| {
            if k == 0 {
                DVector::from_element(m, 1.0)
            } else {
                DVector::zeros(m)
            }
        })
    }
    fn response<F>(&self, dt: f64, steps: usize, input: F) -> StateSpaceData
    where
        F: Fn(usize) -> DVector<f64>,
    {
        let mut data = StateSpaceData::new();
        let mut x = DVector::zeros(self.state_dim());
        for k in 0..steps {
            let u = input(k);
            data.append_step(k as f64 * dt, &x, None, &u, None);
            x = self.step(&x, &u);
        }
        data
    }
}

/// Discrete mass-spring-damper: state [position, velocity], force input, position output.
///
/// $$
/// A = \begin{bmatrix} 0 & 1 \\\\ -k/m & -b/m \end{bmatrix}, \quad B = \begin{bmatrix} 0 \\\\ 1/m \end{bmatrix}, \quad C = \begin{bmatrix} 1 & 0 \end{bmatrix}
/// $$
pub fn mass_spring_damper_model(dt: f64) -> Result<StateSpaceLinear> {
    let a = DMatrix::from_row_slice(
        2,
        2,
        &[0.0, 1.0, -SPRING_CONSTANT / MASS, -DAMPING / MASS],
    );
    let b = DMatrix::from_row_slice(2, 1, &[0.0, 1.0 / MASS]);
    let c = DMatrix::from_row_slice(1, 2, &[1.0, 0.0]);
    StateSpaceLinear::with_output(a, b, c, None)?.continuous_to_discrete(dt)
}
