//! Nonlinear state-space models and their numerical linearization
//!
//! A [`StateSpaceNonlinear`] is an ordered list of scalar motion functions, one per state, and an
//! optional ordered list of scalar measurement functions. Each function is a [`ScalarField`] taking
//! the state, the control input, and an auxiliary argument vector (for a landmark measurement, the
//! landmark position). The model itself is stateless: linearization evaluates the functions and
//! never mutates anything.
//!
//! Jacobians use symmetric central differences with step ε:
//!
//! $$
//! \frac{\partial f_i}{\partial x_k} \approx \frac{f_i(x + \epsilon e_k, u) - f_i(x - \epsilon e_k, u)}{2 \epsilon}
//! $$
use crate::Result;
use crate::state_space::StateSpaceLinear;

use std::fmt::{self, Debug};

use nalgebra::{DMatrix, DVector};

/// Default central-difference step
pub const EPSILON: f64 = 1e-3;

/// A scalar-valued function of (state, input, auxiliary arguments)
pub trait ScalarField {
    fn evaluate(&self, x: &DVector<f64>, u: &DVector<f64>, aux: &DVector<f64>) -> f64;
}

impl<F> ScalarField for F
where
    F: Fn(&DVector<f64>, &DVector<f64>, &DVector<f64>) -> f64,
{
    fn evaluate(&self, x: &DVector<f64>, u: &DVector<f64>, aux: &DVector<f64>) -> f64 {
        self(x, u, aux)
    }
}

/// Box a function for use in a motion or measurement list.
pub fn field<F>(f: F) -> Box<dyn ScalarField>
where
    F: ScalarField + 'static,
{
    Box::new(f)
}

pub struct StateSpaceNonlinear {
    motion: Vec<Box<dyn ScalarField>>,
    measurement: Vec<Box<dyn ScalarField>>,
    epsilon: f64,
    input_dim: Option<usize>,
    aux_dim: usize,
}

/// Jacobians of a [`StateSpaceNonlinear`] about an operating point.
///
/// A is `motion_dim × n` and need not be square; [`Linearization::into_state_space`] requires it.
#[derive(Clone, Debug, PartialEq)]
pub struct Linearization {
    pub a: DMatrix<f64>,
    pub b: DMatrix<f64>,
    pub c: DMatrix<f64>,
}

impl Linearization {
    /// # Errors
    /// * [`crate::Error::NotSquare`] if A is not square.
    pub fn into_state_space(self) -> Result<StateSpaceLinear> {
        StateSpaceLinear::with_output(self.a, self.b, self.c, None)
    }
}

impl Debug for StateSpaceNonlinear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateSpaceNonlinear")
            .field("motion_functions", &self.motion.len())
            .field("measurement_functions", &self.measurement.len())
            .field("epsilon", &self.epsilon)
            .field("input_dim", &self.input_dim)
            .field("aux_dim", &self.aux_dim)
            .finish()
    }
}

impl StateSpaceNonlinear {
    pub fn new(motion: Vec<Box<dyn ScalarField>>) -> StateSpaceNonlinear {
        StateSpaceNonlinear {
            motion,
            measurement: Vec::new(),
            epsilon: EPSILON,
            input_dim: None,
            aux_dim: 0,
        }
    }
    pub fn with_measurement(mut self, measurement: Vec<Box<dyn ScalarField>>) -> StateSpaceNonlinear {
        self.measurement = measurement;
        self
    }
    pub fn with_epsilon(mut self, epsilon: f64) -> StateSpaceNonlinear {
        self.epsilon = epsilon;
        self
    }
    /// Number of control inputs the motion functions index into.
    pub fn with_input_dim(mut self, input_dim: usize) -> StateSpaceNonlinear {
        self.input_dim = Some(input_dim);
        self
    }
    /// Minimum length of the auxiliary arguments the measurement functions read.
    pub fn with_aux_dim(mut self, aux_dim: usize) -> StateSpaceNonlinear {
        self.aux_dim = aux_dim;
        self
    }
    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }
    /// `None` when the model was built without declaring its inputs
    pub fn input_dim(&self) -> Option<usize> {
        self.input_dim
    }
    pub fn aux_dim(&self) -> usize {
        self.aux_dim
    }
    pub fn motion_dim(&self) -> usize {
        self.motion.len()
    }
    pub fn measurement_dim(&self) -> usize {
        self.measurement.len()
    }
    pub fn has_measurement(&self) -> bool {
        !self.measurement.is_empty()
    }
    /// Evaluate every motion function: `[f_0(x,u), f_1(x,u), ...]`
    pub fn propagate(&self, x: &DVector<f64>, u: &DVector<f64>) -> DVector<f64> {
        let none = DVector::zeros(0);
        DVector::from_iterator(self.motion.len(), self.motion.iter().map(|f| f.evaluate(x, u, &none)))
    }
    /// Evaluate every measurement function: `[h_0(x,a), h_1(x,a), ...]`
    pub fn expected_measurement(&self, x: &DVector<f64>, aux: &DVector<f64>) -> DVector<f64> {
        let none = DVector::zeros(0);
        DVector::from_iterator(
            self.measurement.len(),
            self.measurement.iter().map(|h| h.evaluate(x, &none, aux)),
        )
    }
    /// Jacobians of the motion functions with respect to the state (A) and the input (B).
    pub fn motion_jacobians(&self, x: &DVector<f64>, u: &DVector<f64>) -> (DMatrix<f64>, DMatrix<f64>) {
        let none = DVector::zeros(0);
        let a = central_difference(&self.motion, x, self.epsilon, |f, xp| f.evaluate(xp, u, &none));
        let b = central_difference(&self.motion, u, self.epsilon, |f, up| f.evaluate(x, up, &none));
        (a, b)
    }
    /// Jacobian of the measurement functions with respect to the state, with `aux` passed through.
    pub fn measurement_jacobian(&self, x: &DVector<f64>, aux: &DVector<f64>) -> DMatrix<f64> {
        let none = DVector::zeros(0);
        central_difference(&self.measurement, x, self.epsilon, |h, xp| h.evaluate(xp, &none, aux))
    }
    /// Jacobians about (x, u).
    ///
    /// A and B come from [`Self::motion_jacobians`]; C from [`Self::measurement_jacobian`] with no
    /// auxiliary arguments, or 0×n when the model has no measurement functions. A is
    /// `motion_dim × n`, so a model with fewer motion functions than states gives a rectangular A.
    pub fn linearize(&self, x: &DVector<f64>, u: &DVector<f64>) -> Linearization {
        let (a, b) = self.motion_jacobians(x, u);
        let c = if self.has_measurement() {
            self.measurement_jacobian(x, &DVector::zeros(0))
        } else {
            DMatrix::zeros(0, x.len())
        };
        Linearization { a, b, c }
    }
}

/// Row i, column k: (g_i(v + εe_k) − g_i(v − εe_k)) / 2ε
fn central_difference<G>(
    functions: &[Box<dyn ScalarField>],
    v: &DVector<f64>,
    eps: f64,
    eval: G,
) -> DMatrix<f64>
where
    G: Fn(&dyn ScalarField, &DVector<f64>) -> f64,
{
    let mut jac = DMatrix::zeros(functions.len(), v.len());
    for k in 0..v.len() {
        let mut plus = v.clone();
        let mut minus = v.clone();
        plus[k] += eps;
        minus[k] -= eps;
        for (i, f) in functions.iter().enumerate() {
            jac[(i, k)] = (eval(f.as_ref(), &plus) - eval(f.as_ref(), &minus)) / (2.0 * eps);
        }
    }
    jac
}

/// Unicycle kinematics over state `[x, y, θ]` and input `[v, ω]`:
/// x' = x + v cos θ Δt, y' = y + v sin θ Δt, θ' = θ + ω Δt
pub fn unicycle_model(dt: f64) -> StateSpaceNonlinear {
    StateSpaceNonlinear::new(vec![
        field(move |x: &DVector<f64>, u: &DVector<f64>, _: &DVector<f64>| {
            x[0] + u[0] * x[2].cos() * dt
        }),
        field(move |x: &DVector<f64>, u: &DVector<f64>, _: &DVector<f64>| {
            x[1] + u[0] * x[2].sin() * dt
        }),
        field(move |x: &DVector<f64>, u: &DVector<f64>, _: &DVector<f64>| x[2] + u[1] * dt),
    ])
    .with_input_dim(2)
}

// Feature position from the auxiliary arguments. Missing components read as zero, which only
// happens through `linearize`; the filter checks `aux_dim` before evaluating.
fn feature_xy(aux: &DVector<f64>) -> (f64, f64) {
    (
        aux.get(0).copied().unwrap_or(0.0),
        aux.get(1).copied().unwrap_or(0.0),
    )
}

/// Unicycle motion plus distance and bearing to the feature given as `aux = [fx, fy, (fz)]`.
///
/// The bearing is a signed angle relative to the heading and is not wrapped.
pub fn range_bearing_model(dt: f64) -> StateSpaceNonlinear {
    unicycle_model(dt).with_measurement(vec![
        field(|x: &DVector<f64>, _: &DVector<f64>, aux: &DVector<f64>| {
            let (fx, fy) = feature_xy(aux);
            (fx - x[0]).hypot(fy - x[1])
        }),
        field(|x: &DVector<f64>, _: &DVector<f64>, aux: &DVector<f64>| {
            let (fx, fy) = feature_xy(aux);
            (fy - x[1]).atan2(fx - x[0]) - x[2]
        }),
    ])
    .with_aux_dim(2)
}

/// Unicycle motion with a sensor that reads the state directly: h_j(x) = x_j
pub fn direct_readout_model(dt: f64) -> StateSpaceNonlinear {
    let readouts = (0..3)
        .map(|j| field(move |x: &DVector<f64>, _: &DVector<f64>, _: &DVector<f64>| x[j]))
        .collect();
    unicycle_model(dt).with_measurement(readouts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn scalar_field_jacobian_matches_analytic() {
        let model = StateSpaceNonlinear::new(vec![field(
            |x: &DVector<f64>, _: &DVector<f64>, _: &DVector<f64>| x[0] * x[0] + x[1],
        )]);
        let x = DVector::from_vec(vec![3.0, 2.0]);
        let lin = model.linearize(&x, &DVector::zeros(2));
        assert_eq!(lin.a.shape(), (1, 2));
        assert_approx_eq!(lin.a[(0, 0)], 6.0, 1e-2);
        assert_approx_eq!(lin.a[(0, 1)], 1.0, 1e-2);
        assert_approx_eq!(lin.b[(0, 0)], 0.0, 1e-12);
        assert_eq!(lin.c.shape(), (0, 2));
        // one function for two states is not a square system
        assert!(matches!(
            lin.into_state_space(),
            Err(crate::Error::NotSquare { .. })
        ));
    }

    #[test]
    fn unicycle_linearization() {
        let robot = unicycle_model(1.0);
        for (v, theta) in [(0.0_f64, 0.0_f64), (1.0, 1.0), (5.0, 5.0)] {
            let x = DVector::from_vec(vec![0.0, 0.0, theta]);
            let u = DVector::from_vec(vec![v, 0.0]);
            let ss = robot.linearize(&x, &u).into_state_space().unwrap();
            let a_expected = DMatrix::from_row_slice(
                3,
                3,
                &[1.0, 0.0, -v * theta.sin(), 0.0, 1.0, v * theta.cos(), 0.0, 0.0, 1.0],
            );
            let b_expected = DMatrix::from_row_slice(
                3,
                2,
                &[theta.cos(), 0.0, theta.sin(), 0.0, 0.0, 1.0],
            );
            assert!((ss.a() - a_expected).amax() < 1e-2, "A at theta = {theta}");
            assert!((ss.b() - b_expected).amax() < 1e-2, "B at theta = {theta}");
            assert_eq!(ss.c().shape(), (0, 3));
        }
    }

    #[test]
    fn propagate_uses_true_functions() {
        let robot = unicycle_model(0.5);
        let x = DVector::from_vec(vec![1.0, 2.0, std::f64::consts::FRAC_PI_2]);
        let u = DVector::from_vec(vec![2.0, 0.4]);
        let next = robot.propagate(&x, &u);
        assert_approx_eq!(next[0], 1.0, 1e-12);
        assert_approx_eq!(next[1], 3.0, 1e-12);
        assert_approx_eq!(next[2], std::f64::consts::FRAC_PI_2 + 0.2, 1e-12);
    }

    #[test]
    fn range_bearing_expected_measurement_and_jacobian() {
        let model = range_bearing_model(1.0);
        assert_eq!(model.measurement_dim(), 2);
        let x = DVector::from_vec(vec![1.0, 1.0, 0.0]);
        let feature = DVector::from_vec(vec![4.0, 5.0, 0.0]);
        let z = model.expected_measurement(&x, &feature);
        assert_approx_eq!(z[0], 5.0, 1e-12);
        assert_approx_eq!(z[1], 4.0_f64.atan2(3.0), 1e-12);

        // analytic: d r/dx = -dx/r, d r/dy = -dy/r, d b/dx = dy/r², d b/dy = -dx/r², d b/dθ = -1
        let c = model.measurement_jacobian(&x, &feature);
        assert_eq!(c.shape(), (2, 3));
        assert_approx_eq!(c[(0, 0)], -0.6, 1e-5);
        assert_approx_eq!(c[(0, 1)], -0.8, 1e-5);
        assert_approx_eq!(c[(0, 2)], 0.0, 1e-9);
        assert_approx_eq!(c[(1, 0)], 4.0 / 25.0, 1e-5);
        assert_approx_eq!(c[(1, 1)], -3.0 / 25.0, 1e-5);
        assert_approx_eq!(c[(1, 2)], -1.0, 1e-9);
    }

    #[test]
    fn direct_readout_is_identity() {
        let model = direct_readout_model(1.0).with_epsilon(1e-4);
        assert_eq!(model.epsilon(), 1e-4);
        let x = DVector::from_vec(vec![0.3, -0.2, 1.0]);
        let lin = model.linearize(&x, &DVector::from_vec(vec![1.0, 0.0]));
        assert!((&lin.c - DMatrix::<f64>::identity(3, 3)).amax() < 1e-9);
        assert_eq!(model.input_dim(), Some(2));
        assert_eq!(model.aux_dim(), 0);
        assert_eq!(model.expected_measurement(&x, &DVector::zeros(0)), x);
    }

    #[test]
    fn models_declare_their_arguments() {
        let model = range_bearing_model(1.0);
        assert_eq!(model.input_dim(), Some(2));
        assert_eq!(model.aux_dim(), 2);
        let bare = StateSpaceNonlinear::new(vec![field(
            |x: &DVector<f64>, _: &DVector<f64>, _: &DVector<f64>| x[0],
        )]);
        assert_eq!(bare.input_dim(), None);
        assert_eq!(bare.aux_dim(), 0);
    }
}
