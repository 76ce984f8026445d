//! Ground-truth simulation and measurement synthesis.
//!
//! This module provides:
//! - [`GaussianNoise`], zero-mean Gaussian draws coloured by a covariance
//! - [`LinearSimulator`], truth propagation and noisy output for a [`StateSpaceLinear`] model
//! - [`SlamSimulator`], a unicycle robot whose ground truth is an SE3 [`Pose`], observing landmarks
//!   with a direct pose sensor or a distance-and-bearing sensor
//!
//! Every simulator owns a seeded [`StdRng`]. Two simulators built from the same inputs and seed
//! produce identical trajectories and measurements. Each call draws fresh, independent noise.
use crate::linalg::{ensure_len, ensure_shape, ensure_square, matrix_square_root};
use crate::map::Feature;
use crate::pose::Pose;
use crate::state_space::StateSpaceLinear;
use crate::{Error, Result};

use std::fmt::{self, Display};

use log::debug;
use nalgebra::{DMatrix, DVector, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

/// Zero-mean Gaussian noise with a fixed covariance
#[derive(Clone, Debug)]
pub struct GaussianNoise {
    covariance: DMatrix<f64>,
    sqrt: DMatrix<f64>,
}

impl GaussianNoise {
    /// An all-zero covariance gives exactly zero noise.
    ///
    /// # Errors
    /// * [`Error::NotSquare`] if the covariance is not square.
    pub fn new(covariance: DMatrix<f64>) -> Result<GaussianNoise> {
        let sqrt = if covariance.iter().all(|v| *v == 0.0) {
            ensure_square("noise covariance", &covariance)?;
            covariance.clone()
        } else {
            matrix_square_root(&covariance)?
        };
        Ok(GaussianNoise { covariance, sqrt })
    }
    pub fn covariance(&self) -> &DMatrix<f64> {
        &self.covariance
    }
    pub fn dim(&self) -> usize {
        self.covariance.nrows()
    }
    /// One draw: S·w with S Sᵀ = Σ and w ~ N(0, I)
    pub fn sample<R: Rng>(&self, rng: &mut R) -> DVector<f64> {
        let w = DVector::from_fn(self.dim(), |_, _| rng.sample::<f64, _>(StandardNormal));
        &self.sqrt * w
    }
}

/// Ground truth and noisy outputs for a linear model
#[derive(Clone, Debug)]
pub struct LinearSimulator {
    state_space: StateSpaceLinear,
    state: DVector<f64>,
    process_noise: GaussianNoise,
    measurement_noise: GaussianNoise,
    rng: StdRng,
}

impl LinearSimulator {
    /// Use the same Q and R as the filter under test.
    ///
    /// # Errors
    /// * [`Error::DimensionMismatch`] if Q, R, or x0 do not match the model.
    pub fn new(
        state_space: StateSpaceLinear,
        process_noise: DMatrix<f64>,
        measurement_noise: DMatrix<f64>,
        initial_state: DVector<f64>,
        seed: u64,
    ) -> Result<LinearSimulator> {
        let n = state_space.state_dim();
        let p = state_space.output_dim();
        ensure_shape("Q", &process_noise, n, n)?;
        ensure_shape("R", &measurement_noise, p, p)?;
        ensure_len("initial state", &initial_state, n)?;
        Ok(LinearSimulator {
            state_space,
            state: initial_state,
            process_noise: GaussianNoise::new(process_noise)?,
            measurement_noise: GaussianNoise::new(measurement_noise)?,
            rng: StdRng::seed_from_u64(seed),
        })
    }
    pub fn state(&self) -> &DVector<f64> {
        &self.state
    }
    /// x ← A x + B u + w, w ~ N(0, Q)
    pub fn step(&mut self, control_input: &DVector<f64>) -> Result<()> {
        ensure_len("control input", control_input, self.state_space.input_dim())?;
        let w = self.process_noise.sample(&mut self.rng);
        self.state = self.state_space.step(&self.state, control_input) + w;
        Ok(())
    }
    /// z = C x + v, v ~ N(0, R)
    pub fn get_measurement(&mut self) -> DVector<f64> {
        let v = self.measurement_noise.sample(&mut self.rng);
        self.state_space.c() * &self.state + v
    }
}

/// Which sensor produced a [`Measurement`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SensorType {
    /// Noisy readout of the planar pose `[x, y, θ]`
    Direct,
    /// `[distance, bearing]` to a landmark, bearing signed and relative to the heading
    DistanceAndBearing,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Measurement {
    pub sensor_type: SensorType,
    /// Landmark the reading refers to; `None` for the direct sensor
    pub feature_id: Option<u32>,
    pub values: DVector<f64>,
}

impl Measurement {
    pub fn as_vector(&self) -> DVector<f64> {
        self.values.clone()
    }
}

impl Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.sensor_type)?;
        if let Some(id) = self.feature_id {
            write!(f, " (feature {id})")?;
        }
        write!(f, ": {:?}", self.values.as_slice())
    }
}

/// Measurement noise covariances, one per sensor
#[derive(Clone, Debug)]
pub struct SensorNoise {
    /// 3×3, on `[x, y, θ]`
    pub direct: DMatrix<f64>,
    /// 2×2, on `[distance, bearing]`
    pub distance_and_bearing: DMatrix<f64>,
}

impl SensorNoise {
    pub fn isotropic(variance: f64) -> SensorNoise {
        SensorNoise {
            direct: DMatrix::identity(3, 3) * variance,
            distance_and_bearing: DMatrix::identity(2, 2) * variance,
        }
    }
}

/// Unicycle robot ground truth with landmark observations
///
/// The truth is an SE3 pose advanced by composing the body-frame increment (translation
/// `[v·dt, 0, 0]`, yaw `ω·dt`) for input `[v, ω]`, followed by process noise on `[x, y, θ]`.
#[derive(Clone, Debug)]
pub struct SlamSimulator {
    pose: Pose,
    process_noise: GaussianNoise,
    direct_noise: GaussianNoise,
    distance_and_bearing_noise: GaussianNoise,
    controls: Vec<f64>,
    dt: f64,
    truth: Vec<Pose>,
    estimates: Vec<Pose>,
    rng: StdRng,
}

impl SlamSimulator {
    /// # Errors
    /// * [`Error::InvalidTimeStep`] if `dt` is not strictly positive and finite.
    /// * [`Error::DimensionMismatch`] if Q is not 3×3 or a sensor covariance has the wrong shape.
    pub fn new(
        process_noise: DMatrix<f64>,
        sensor_noise: SensorNoise,
        initial_pose: Pose,
        steps: usize,
        turn_rate_amplitude: f64,
        dt: f64,
        seed: u64,
    ) -> Result<SlamSimulator> {
        if !(dt.is_finite() && dt > 0.0) {
            return Err(Error::InvalidTimeStep(dt));
        }
        ensure_shape("Q", &process_noise, 3, 3)?;
        ensure_shape("direct sensor noise", &sensor_noise.direct, 3, 3)?;
        ensure_shape(
            "distance and bearing sensor noise",
            &sensor_noise.distance_and_bearing,
            2,
            2,
        )?;
        let controls = (0..steps)
            .map(|k| turn_rate_amplitude * (2.0 * std::f64::consts::PI * k as f64 / steps as f64).sin())
            .collect();
        Ok(SlamSimulator {
            pose: initial_pose,
            process_noise: GaussianNoise::new(process_noise)?,
            direct_noise: GaussianNoise::new(sensor_noise.direct)?,
            distance_and_bearing_noise: GaussianNoise::new(sensor_noise.distance_and_bearing)?,
            controls,
            dt,
            truth: vec![initial_pose],
            estimates: Vec::new(),
            rng: StdRng::seed_from_u64(seed),
        })
    }
    /// Scripted yaw-rate profile ω_k = amplitude·sin(2πk/steps)
    pub fn controls(&self) -> &[f64] {
        &self.controls
    }
    pub fn pose(&self) -> &Pose {
        &self.pose
    }
    /// Every true pose so far, starting with the initial one
    pub fn truth(&self) -> &[Pose] {
        &self.truth
    }
    pub fn estimates(&self) -> &[Pose] {
        &self.estimates
    }
    /// Advance the truth by one step with input `[v, ω]`.
    pub fn step(&mut self, control_input: &DVector<f64>) -> Result<()> {
        ensure_len("control input", control_input, 2)?;
        let increment = Pose::new(
            Vector3::new(control_input[0] * self.dt, 0.0, 0.0),
            Vector3::new(0.0, 0.0, control_input[1] * self.dt),
        );
        let moved = self.pose.compose(&increment).to_planar();
        let w = self.process_noise.sample(&mut self.rng);
        self.pose = Pose::from_planar(&(moved + w))?;
        self.truth.push(self.pose);
        Ok(())
    }
    /// Synthesize a reading of `feature` from the current true pose.
    ///
    /// The bearing is `atan2(Δy, Δx) − θ` plus noise and is not wrapped; consumers wrap the
    /// residual themselves when needed.
    pub fn get_measurement(&mut self, feature: &Feature, sensor_type: SensorType) -> Measurement {
        let measurement = match sensor_type {
            SensorType::Direct => Measurement {
                sensor_type,
                feature_id: None,
                values: self.pose.to_planar() + self.direct_noise.sample(&mut self.rng),
            },
            SensorType::DistanceAndBearing => {
                let delta = feature.position() - self.pose.translation();
                let exact = DVector::from_vec(vec![
                    delta.norm(),
                    delta[1].atan2(delta[0]) - self.pose.yaw(),
                ]);
                Measurement {
                    sensor_type,
                    feature_id: Some(feature.id),
                    values: exact + self.distance_and_bearing_noise.sample(&mut self.rng),
                }
            }
        };
        debug!("Measurement = {measurement}");
        measurement
    }
    /// Record an estimated pose next to the truth trail.
    pub fn append_estimate(&mut self, estimated_pose: Pose) {
        self.estimates.push(estimated_pose);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_space::mass_spring_damper_model;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn gaussian_noise_matches_covariance() {
        let cov = DMatrix::from_row_slice(2, 2, &[2.0, 0.6, 0.6, 1.0]);
        let noise = GaussianNoise::new(cov.clone()).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let n = 20_000;
        let mut acc = DMatrix::<f64>::zeros(2, 2);
        let mut mean = DVector::<f64>::zeros(2);
        for _ in 0..n {
            let w = noise.sample(&mut rng);
            acc += &w * w.transpose();
            mean += w;
        }
        let sample_cov = acc / n as f64;
        assert!((mean / n as f64).amax() < 0.05);
        assert!((sample_cov - cov).amax() < 0.1);
    }

    #[test]
    fn zero_noise_linear_simulator_follows_model() {
        let ss = mass_spring_damper_model(0.05).unwrap();
        let x0 = DVector::from_vec(vec![1.0, -1.0]);
        let mut sim = LinearSimulator::new(
            ss.clone(),
            DMatrix::zeros(2, 2),
            DMatrix::zeros(1, 1),
            x0.clone(),
            0,
        )
        .unwrap();
        let u = DVector::from_vec(vec![0.5]);
        sim.step(&u).unwrap();
        let expected = ss.step(&x0, &u);
        assert_approx_eq!(sim.state()[0], expected[0], 1e-5);
        assert_approx_eq!(sim.state()[1], expected[1], 1e-5);
        let z = sim.get_measurement();
        assert_approx_eq!(z[0], expected[0], 1e-5);
        assert!(sim.step(&DVector::zeros(3)).is_err());
    }

    #[test]
    fn linear_simulator_rejects_bad_shapes() {
        let ss = mass_spring_damper_model(0.05).unwrap();
        let r = LinearSimulator::new(ss, DMatrix::zeros(2, 2), DMatrix::zeros(2, 2), DVector::zeros(2), 0);
        assert!(matches!(r, Err(Error::DimensionMismatch { what: "R", .. })));
    }

    fn slam_sim(seed: u64) -> SlamSimulator {
        SlamSimulator::new(
            DMatrix::identity(3, 3) * 1e-3,
            SensorNoise::isotropic(1e-3),
            Pose::identity(),
            100,
            0.1,
            1.0,
            seed,
        )
        .unwrap()
    }

    #[test]
    fn same_seed_same_run() {
        let feature = Feature::new(0, 5.0, 5.0);
        let mut a = slam_sim(42);
        let mut b = slam_sim(42);
        let controls = a.controls().to_vec();
        for omega in controls {
            let u = DVector::from_vec(vec![0.5, omega]);
            a.step(&u).unwrap();
            b.step(&u).unwrap();
            let za = a.get_measurement(&feature, SensorType::DistanceAndBearing);
            let zb = b.get_measurement(&feature, SensorType::DistanceAndBearing);
            assert_eq!(za, zb);
        }
        assert_eq!(a.truth(), b.truth());

        let mut c = slam_sim(43);
        c.step(&DVector::from_vec(vec![0.5, 0.0])).unwrap();
        assert_ne!(c.pose(), &a.truth()[1]);
    }

    #[test]
    fn controls_profile() {
        let sim = slam_sim(0);
        let controls = sim.controls();
        assert_eq!(controls.len(), 100);
        assert_eq!(controls[0], 0.0);
        assert_approx_eq!(controls[25], 0.1, 1e-12);
        assert_approx_eq!(controls[75], -0.1, 1e-12);
    }

    #[test]
    fn noiseless_truth_follows_unicycle() {
        let mut sim = SlamSimulator::new(
            DMatrix::zeros(3, 3),
            SensorNoise::isotropic(0.0),
            Pose::identity(),
            10,
            0.0,
            0.5,
            1,
        )
        .unwrap();
        sim.step(&DVector::from_vec(vec![2.0, std::f64::consts::FRAC_PI_2])).unwrap();
        sim.step(&DVector::from_vec(vec![2.0, 0.0])).unwrap();
        // one unit along x, turn 45°, then one unit along the new heading
        let h = std::f64::consts::FRAC_1_SQRT_2;
        let p = sim.pose().to_planar();
        assert_approx_eq!(p[0], 1.0 + h, 1e-9);
        assert_approx_eq!(p[1], h, 1e-9);
        assert_approx_eq!(p[2], std::f64::consts::FRAC_PI_4, 1e-9);
        assert_eq!(sim.truth().len(), 3);

        let feature = Feature::new(3, 4.0 + h, 4.0 + h);
        let m = sim.get_measurement(&feature, SensorType::DistanceAndBearing);
        assert_eq!(m.feature_id, Some(3));
        assert_approx_eq!(m.values[0], 5.0, 1e-9);
        assert_approx_eq!(
            m.values[1],
            4.0_f64.atan2(3.0) - std::f64::consts::FRAC_PI_4,
            1e-9
        );
        let d = sim.get_measurement(&feature, SensorType::Direct);
        assert_eq!(d.feature_id, None);
        assert_approx_eq!(d.as_vector()[2], std::f64::consts::FRAC_PI_4, 1e-9);

        sim.append_estimate(Pose::identity());
        assert_eq!(sim.estimates().len(), 1);
    }

    #[test]
    fn slam_simulator_rejects_bad_inputs() {
        let r = SlamSimulator::new(
            DMatrix::zeros(3, 3),
            SensorNoise::isotropic(0.0),
            Pose::identity(),
            10,
            0.0,
            0.0,
            1,
        );
        assert!(matches!(r, Err(Error::InvalidTimeStep(_))));
        let mut sim = slam_sim(0);
        assert!(sim.step(&DVector::zeros(3)).is_err());
    }
}
