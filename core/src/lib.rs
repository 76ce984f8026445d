//! State-space modelling and recursive Bayesian estimation toolbox
//!
//! This crate provides the pieces needed to model linear and nonlinear dynamical systems, estimate
//! their hidden state from noisy measurements with Kalman-family filters, and simulate a ground truth
//! with consistent noisy sensor feedback so the estimators can be validated against it. A landmark
//! based localization scenario (a unicycle robot ranging and bearing to known features) is included
//! as the nonlinear test case.
//!
//! Primarily built off of [`nalgebra`](https://crates.io/crates/nalgebra), which provides the dense
//! linear algebra, and [`rand`](https://crates.io/crates/rand) / [`rand_distr`](https://crates.io/crates/rand_distr)
//! for the seeded noise generation. All vectors are column vectors (`DVector<f64>`, shape n×1) and all
//! system matrices are `DMatrix<f64>`.
//!
//! # Discrete-time state-space model
//!
//! The linear model used throughout is
//!
//! $$
//! x_{k+1} = A x_k + B u_k + w_k, \qquad z_k = C x_k + D u_k + v_k
//! $$
//!
//! where $w_k \sim \mathcal{N}(0, Q)$ is the process noise and $v_k \sim \mathcal{N}(0, R)$ is the
//! measurement noise. Continuous-time models are converted with a second-order series of the matrix
//! exponential:
//!
//! $$
//! A_d = I + A \Delta t + \tfrac{1}{2} A^2 \Delta t^2, \qquad B_d = \left(I \Delta t + \tfrac{1}{2} A \Delta t^2\right) B
//! $$
//!
//! # Nonlinear model
//!
//! A nonlinear model is an ordered list of scalar motion functions $f_i(x, u)$, one per state, and an
//! optional ordered list of scalar measurement functions $h_j(x, a)$ where $a$ is an auxiliary
//! argument (for example the position of the landmark being observed). Jacobians are computed by
//! central differences:
//!
//! $$
//! \frac{\partial f_i}{\partial x_k} \approx \frac{f_i(x + \epsilon e_k, u) - f_i(x - \epsilon e_k, u)}{2 \epsilon}
//! $$
//!
//! # Estimation loop
//!
//! A driver owns time. Each iteration it advances the simulator (truth plus measurement), then calls
//! `predict` with the same control input and `update` with the synthesized measurement. Filters and
//! simulators never reference each other.
pub mod config;
pub mod control;
pub mod history;
pub mod kalman;
pub mod linalg;
pub mod map;
pub mod nonlinear;
pub mod pipeline;
pub mod pose;
pub mod sim;
pub mod state_space;

use nalgebra::{DMatrix, DVector};

pub use config::Config;
pub use history::{SimulationHistory, StateSpaceData};
pub use kalman::{ExtendedKalmanFilter, KalmanFilter};
pub use nonlinear::{Linearization, ScalarField, StateSpaceNonlinear};
pub use pose::Pose;
pub use state_space::StateSpaceLinear;

/// Errors produced by model construction, the filter recursions, and the supporting data layers.
///
/// Shape errors indicate a caller programming error and are never recovered from inside the crate.
/// Numerical errors come from the underlying linear algebra and are propagated as-is, the filters do
/// not retry or perturb their inputs.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{what}: expected a {}x{} matrix, found {}x{}", .expected.0, .expected.1, .found.0, .found.1)]
    DimensionMismatch {
        what: &'static str,
        expected: (usize, usize),
        found: (usize, usize),
    },
    #[error("{what} must be square, found {}x{}", .shape.0, .shape.1)]
    NotSquare {
        what: &'static str,
        shape: (usize, usize),
    },
    #[error("time step must be positive and finite, got {0}")]
    InvalidTimeStep(f64),
    #[error("singular matrix encountered in {0}")]
    SingularMatrix(&'static str),
    #[error("no feature with id {0} in the map")]
    UnknownFeature(u32),
    #[error("invalid pipeline: {0}")]
    InvalidPipeline(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Generic recursive Bayesian estimator interface
///
/// The predict and update signatures differ between the linear and the extended filter (the latter
/// needs the auxiliary measurement arguments), so only the read side of the estimator is shared.
pub trait StateEstimator {
    /// Current mean estimate (n×1)
    fn get_estimate(&self) -> &DVector<f64>;
    /// Current estimate covariance (n×n)
    fn get_certainty(&self) -> &DMatrix<f64>;
    /// (mean, covariance) pairs recorded after every update, oldest first
    fn history(&self) -> &[(DVector<f64>, DMatrix<f64>)];
}

/// Wrap an angle to the range $\pm\pi$ radians
///
/// Bearing measurements are signed angles and their residuals can land a full turn away from the
/// predicted value; this helper is used to bring them back before they are fed to a filter. It runs
/// in constant time for any magnitude, and a non-finite angle comes back as NaN.
///
/// # Example
/// ```rust
/// use statespace::wrap_to_pi;
/// use std::f64::consts::PI;
/// let wrapped_angle = wrap_to_pi(3.0 * PI / 2.0);
/// assert!((wrapped_angle + PI / 2.0).abs() < 1e-12);
/// ```
pub fn wrap_to_pi(angle: f64) -> f64 {
    use std::f64::consts::{PI, TAU};
    let wrapped = angle % TAU;
    if wrapped > PI {
        wrapped - TAU
    } else if wrapped < -PI {
        wrapped + TAU
    } else {
        wrapped
    }
}
/// Wrap an angle to the range 0 to $2 \pi$ radians
///
/// # Example
/// ```rust
/// use statespace::wrap_to_2pi;
/// use std::f64::consts::PI;
/// assert!((wrap_to_2pi(5.0 * PI) - PI).abs() < 1e-12);
/// ```
pub fn wrap_to_2pi(angle: f64) -> f64 {
    let wrapped = angle % std::f64::consts::TAU;
    if wrapped < 0.0 {
        wrapped + std::f64::consts::TAU
    } else {
        wrapped
    }
}
