//! Kalman-style estimators (KF/EKF)
//!
//! This module contains the linear Kalman filter over a [`StateSpaceLinear`] model and the extended
//! Kalman filter over a [`StateSpaceNonlinear`] model. Both share the same correction step:
//!
//! $$
//! \begin{aligned}
//! S &= C P C^T + R \\\\
//! K &= P C^T S^{-1} \\\\
//! x &= x + K y \\\\
//! P &= (I - K C) P (I - K C)^T + K R K^T
//! \end{aligned}
//! $$
//!
//! where $y$ is the innovation. The Joseph form keeps P symmetric positive semi-definite under
//! round-off; a final symmetrization removes any residual asymmetry. Neither filter retries or
//! regularizes: a singular innovation covariance is returned as [`Error::SingularMatrix`].

use crate::config::Config;
use crate::linalg::{ensure_len, ensure_shape, ensure_square, spd_solve, symmetrize};
use crate::nonlinear::StateSpaceNonlinear;
use crate::state_space::StateSpaceLinear;
use crate::{Error, Result, StateEstimator, wrap_to_pi};

use std::fmt::{self, Debug, Display};

use log::debug;
use nalgebra::{DMatrix, DVector};

/// Shared measurement correction. Returns the corrected (mean, covariance).
fn correct(
    x: &DVector<f64>,
    cov: &DMatrix<f64>,
    c: &DMatrix<f64>,
    r: &DMatrix<f64>,
    innovation: &DVector<f64>,
) -> Result<(DVector<f64>, DMatrix<f64>)> {
    let n = x.len();
    let s = c * cov * c.transpose() + r;
    // K = P Cᵀ S⁻¹ = (S⁻¹ C P)ᵀ since P and S are symmetric
    let k = spd_solve(&s, &(c * cov))?.transpose();
    let x_new = x + &k * innovation;
    let i_kc = DMatrix::<f64>::identity(n, n) - &k * c;
    let cov_new = &i_kc * cov * i_kc.transpose() + &k * r * k.transpose();
    Ok((x_new, symmetrize(&cov_new)))
}

/// Linear Kalman filter
#[derive(Clone)]
pub struct KalmanFilter {
    state_space: StateSpaceLinear,
    mean_state: DVector<f64>,
    covariance: DMatrix<f64>,
    process_noise: DMatrix<f64>,
    measurement_noise: DMatrix<f64>,
    history: Vec<(DVector<f64>, DMatrix<f64>)>,
}
impl Debug for KalmanFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KF")
            .field("mean_state", &self.mean_state)
            .field("covariance", &self.covariance)
            .field("process_noise", &self.process_noise)
            .field("measurement_noise", &self.measurement_noise)
            .finish()
    }
}
impl Display for KalmanFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KalmanFilter")
            .field("state_space", &format_args!("{}", self.state_space))
            .field("mean_state", &self.mean_state)
            .field("covariance", &self.covariance)
            .field("updates", &self.history.len())
            .finish()
    }
}
impl KalmanFilter {
    /// Build a filter over a discrete-time model.
    ///
    /// # Errors
    /// * [`Error::DimensionMismatch`] if Q is not n×n, R is not p×p, x0 is not n×1, or P0 is not n×n,
    ///   where n and p are the model's state and output dimensions.
    pub fn new(
        state_space: StateSpaceLinear,
        process_noise: DMatrix<f64>,
        measurement_noise: DMatrix<f64>,
        initial_state: DVector<f64>,
        initial_covariance: DMatrix<f64>,
    ) -> Result<KalmanFilter> {
        let n = state_space.state_dim();
        let p = state_space.output_dim();
        ensure_shape("Q", &process_noise, n, n)?;
        ensure_shape("R", &measurement_noise, p, p)?;
        ensure_len("initial state", &initial_state, n)?;
        ensure_shape("initial covariance", &initial_covariance, n, n)?;
        Ok(KalmanFilter {
            state_space,
            mean_state: initial_state,
            covariance: initial_covariance,
            process_noise,
            measurement_noise,
            history: Vec::new(),
        })
    }
    /// Q = variance·I, R = variance·I
    pub fn from_config(
        state_space: StateSpaceLinear,
        initial_state: DVector<f64>,
        initial_covariance: DMatrix<f64>,
        config: &Config,
    ) -> Result<KalmanFilter> {
        let n = state_space.state_dim();
        let p = state_space.output_dim();
        KalmanFilter::new(
            state_space,
            DMatrix::identity(n, n) * config.variance,
            DMatrix::identity(p, p) * config.variance,
            initial_state,
            initial_covariance,
        )
    }
    pub fn state_space(&self) -> &StateSpaceLinear {
        &self.state_space
    }
    pub fn process_noise(&self) -> &DMatrix<f64> {
        &self.process_noise
    }
    pub fn measurement_noise(&self) -> &DMatrix<f64> {
        &self.measurement_noise
    }
    /// x ← A x + B u, P ← A P Aᵀ + Q. A missing control input is treated as zero.
    pub fn predict(&mut self, control_input: Option<&DVector<f64>>) -> Result<()> {
        let m = self.state_space.input_dim();
        let zero;
        let u = match control_input {
            Some(u) => {
                ensure_len("control input", u, m)?;
                u
            }
            None => {
                zero = DVector::zeros(m);
                &zero
            }
        };
        let a = self.state_space.a();
        self.mean_state = self.state_space.step(&self.mean_state, u);
        self.covariance = a * &self.covariance * a.transpose() + &self.process_noise;
        Ok(())
    }
    /// Correct the estimate with a measurement z = C x + v.
    ///
    /// # Errors
    /// * [`Error::DimensionMismatch`] if z does not match C's row count.
    /// * [`Error::SingularMatrix`] if the innovation covariance cannot be inverted.
    pub fn update(&mut self, measurement: &DVector<f64>) -> Result<()> {
        let c = self.state_space.c();
        ensure_len("measurement", measurement, c.nrows())?;
        let innovation = measurement - c * &self.mean_state;
        debug!("KF innovation norm {:.6}", innovation.norm());
        let (x, cov) = correct(
            &self.mean_state,
            &self.covariance,
            c,
            &self.measurement_noise,
            &innovation,
        )?;
        self.mean_state = x;
        self.covariance = cov;
        self.history
            .push((self.mean_state.clone(), self.covariance.clone()));
        Ok(())
    }
}
impl StateEstimator for KalmanFilter {
    fn get_estimate(&self) -> &DVector<f64> {
        &self.mean_state
    }
    fn get_certainty(&self) -> &DMatrix<f64> {
        &self.covariance
    }
    fn history(&self) -> &[(DVector<f64>, DMatrix<f64>)] {
        &self.history
    }
}

/// Extended Kalman filter
///
/// The mean is propagated through the true motion functions and the expected measurement through
/// the true measurement functions; the Jacobians are only used for the covariance and the gain.
/// The measurement Jacobian is re-derived at the current (predicted) state on every update, with the
/// caller's auxiliary arguments passed through to every measurement function.
pub struct ExtendedKalmanFilter {
    model: StateSpaceNonlinear,
    mean_state: DVector<f64>,
    covariance: DMatrix<f64>,
    process_noise: DMatrix<f64>,
    measurement_noise: DMatrix<f64>,
    angular_residuals: Vec<usize>,
    history: Vec<(DVector<f64>, DMatrix<f64>)>,
}
impl Debug for ExtendedKalmanFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EKF")
            .field("model", &self.model)
            .field("mean_state", &self.mean_state)
            .field("covariance", &self.covariance)
            .field("process_noise", &self.process_noise)
            .field("measurement_noise", &self.measurement_noise)
            .finish()
    }
}
impl Display for ExtendedKalmanFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtendedKalmanFilter")
            .field("mean_state", &self.mean_state)
            .field("covariance", &self.covariance)
            .field("updates", &self.history.len())
            .finish()
    }
}
impl ExtendedKalmanFilter {
    /// # Errors
    /// * [`Error::NotSquare`] if the model does not have one motion function per state.
    /// * [`Error::DimensionMismatch`] if Q, R, x0, or P0 have the wrong shape. R is sized by the
    ///   number of measurement functions.
    pub fn new(
        model: StateSpaceNonlinear,
        process_noise: DMatrix<f64>,
        measurement_noise: DMatrix<f64>,
        initial_state: DVector<f64>,
        initial_covariance: DMatrix<f64>,
    ) -> Result<ExtendedKalmanFilter> {
        let n = initial_state.len();
        if model.motion_dim() != n {
            return Err(Error::NotSquare {
                what: "motion Jacobian",
                shape: (model.motion_dim(), n),
            });
        }
        let p = model.measurement_dim();
        ensure_shape("Q", &process_noise, n, n)?;
        ensure_square("R", &measurement_noise)?;
        ensure_shape("R", &measurement_noise, p, p)?;
        ensure_shape("initial covariance", &initial_covariance, n, n)?;
        Ok(ExtendedKalmanFilter {
            model,
            mean_state: initial_state,
            covariance: initial_covariance,
            process_noise,
            measurement_noise,
            angular_residuals: Vec::new(),
            history: Vec::new(),
        })
    }
    /// Q = variance·I, R = variance·I, central-difference step from the config
    pub fn from_config(
        model: StateSpaceNonlinear,
        initial_state: DVector<f64>,
        initial_covariance: DMatrix<f64>,
        config: &Config,
    ) -> Result<ExtendedKalmanFilter> {
        let n = initial_state.len();
        let p = model.measurement_dim();
        ExtendedKalmanFilter::new(
            model.with_epsilon(config.epsilon),
            DMatrix::identity(n, n) * config.variance,
            DMatrix::identity(p, p) * config.variance,
            initial_state,
            initial_covariance,
        )
    }
    /// Wrap the listed innovation components to [-π, π] before the correction (bearings).
    pub fn with_angular_residuals(mut self, indices: Vec<usize>) -> ExtendedKalmanFilter {
        self.angular_residuals = indices;
        self
    }
    pub fn model(&self) -> &StateSpaceNonlinear {
        &self.model
    }
    /// Propagate the mean through f(x, u) and the covariance through the Jacobian at the prior x.
    ///
    /// # Errors
    /// * [`Error::DimensionMismatch`] if the model declares its input dimension and u disagrees.
    pub fn predict(&mut self, control_input: &DVector<f64>) -> Result<()> {
        if let Some(m) = self.model.input_dim() {
            ensure_len("control input", control_input, m)?;
        }
        let (a, _) = self.model.motion_jacobians(&self.mean_state, control_input);
        self.mean_state = self.model.propagate(&self.mean_state, control_input);
        self.covariance = &a * &self.covariance * a.transpose() + &self.process_noise;
        Ok(())
    }
    /// Correct the estimate with a measurement of the landmark described by `measurement_args`.
    ///
    /// # Errors
    /// * [`Error::DimensionMismatch`] if z does not have one entry per measurement function, or the
    ///   measurement arguments are shorter than the model's `aux_dim`.
    /// * [`Error::SingularMatrix`] if the innovation covariance cannot be inverted.
    pub fn update(
        &mut self,
        measurement: &DVector<f64>,
        measurement_args: &DVector<f64>,
    ) -> Result<()> {
        ensure_len("measurement", measurement, self.model.measurement_dim())?;
        if measurement_args.len() < self.model.aux_dim() {
            return Err(Error::DimensionMismatch {
                what: "measurement arguments",
                expected: (self.model.aux_dim(), 1),
                found: (measurement_args.len(), 1),
            });
        }
        let c = self
            .model
            .measurement_jacobian(&self.mean_state, measurement_args);
        let expected = self
            .model
            .expected_measurement(&self.mean_state, measurement_args);
        let mut innovation = measurement - expected;
        for &i in &self.angular_residuals {
            if i < innovation.len() {
                innovation[i] = wrap_to_pi(innovation[i]);
            }
        }
        debug!(
            "EKF innovation {:?} (norm {:.6})",
            innovation.as_slice(),
            innovation.norm()
        );
        let (x, cov) = correct(
            &self.mean_state,
            &self.covariance,
            &c,
            &self.measurement_noise,
            &innovation,
        )?;
        self.mean_state = x;
        self.covariance = cov;
        self.history
            .push((self.mean_state.clone(), self.covariance.clone()));
        Ok(())
    }
}
impl StateEstimator for ExtendedKalmanFilter {
    fn get_estimate(&self) -> &DVector<f64> {
        &self.mean_state
    }
    fn get_certainty(&self) -> &DMatrix<f64> {
        &self.covariance
    }
    fn history(&self) -> &[(DVector<f64>, DMatrix<f64>)] {
        &self.history
    }
}
