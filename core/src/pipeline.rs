//! End-to-end estimation scenarios.
//!
//! Each pipeline owns time: it builds a model, a filter, and a simulator from a [`Config`], then
//! loops over the simulator and the filter, recording one history record per step. The filter and
//! the simulator never see each other.
//!
//! - `STATE_SPACE`: open-loop step and impulse responses of the mass-spring-damper model
//! - `KF`: closed-loop mass-spring-damper with pole-placement control on the filter estimate
//! - `EKF`: unicycle robot localizing against a random landmark map with distance/bearing readings
use crate::config::Config;
use crate::control::{full_state_feedback, get_control_input};
use crate::history::{SimulationHistory, StateSpaceData};
use crate::kalman::{ExtendedKalmanFilter, KalmanFilter};
use crate::map::{Map, make_random_map_planar};
use crate::nonlinear::range_bearing_model;
use crate::pose::Pose;
use crate::sim::{LinearSimulator, Measurement, SensorNoise, SensorType, SlamSimulator};
use crate::state_space::mass_spring_damper_model;
use crate::{Error, Result, StateEstimator};

use std::fmt::{self, Display};
use std::str::FromStr;

use log::{debug, info};
use nalgebra::{Complex, DMatrix, DVector};
use rand::SeedableRng;
use rand::rngs::StdRng;

/// Closed-loop poles for the KF scenario
pub const KF_DESIRED_POLES: [Complex<f64>; 2] = [Complex::new(0.89, 0.29), Complex::new(0.89, -0.29)];
/// Initial estimate (and truth) for the KF scenario
pub const KF_INITIAL_STATE: [f64; 2] = [5.0, 5.0];
/// Initial covariance scale for the KF scenario
pub const KF_INITIAL_COVARIANCE: f64 = 5.0;
/// Initial covariance scale for the EKF scenario
pub const EKF_INITIAL_COVARIANCE: f64 = 3.0;
/// Added to the configured seed for the landmark map, so map placement and simulator noise come
/// from different streams
pub const MAP_SEED_OFFSET: u64 = 1;

/// Which scenario to run
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pipeline {
    Kf,
    Ekf,
    StateSpace,
}

impl Pipeline {
    pub const ALL: [Pipeline; 3] = [Pipeline::Kf, Pipeline::Ekf, Pipeline::StateSpace];
}

impl Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Pipeline::Kf => "KF",
            Pipeline::Ekf => "EKF",
            Pipeline::StateSpace => "STATE_SPACE",
        };
        write!(f, "{name}")
    }
}

impl FromStr for Pipeline {
    type Err = Error;
    /// Case-insensitive, `-` and `_` are interchangeable.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().replace('-', "_").as_str() {
            "KF" => Ok(Pipeline::Kf),
            "EKF" => Ok(Pipeline::Ekf),
            "STATE_SPACE" => Ok(Pipeline::StateSpace),
            _ => Err(Error::InvalidPipeline(s.to_string())),
        }
    }
}

/// Open-loop step and impulse responses of the mass-spring-damper model.
pub fn run_state_space_pipeline(config: &Config) -> Result<(StateSpaceData, StateSpaceData)> {
    config.validate()?;
    info!("Running state space pipeline");
    let dt = config.discretization_dt;
    let ss = mass_spring_damper_model(dt)?;
    let step = ss.step_response(dt, config.num_steps);
    let impulse = ss.impulse_response(dt, config.num_steps);
    info!(
        "Step response settled at {:?}, impulse response at {:?}",
        step.state.last().map(|x| x.as_slice().to_vec()),
        impulse.state.last().map(|x| x.as_slice().to_vec())
    );
    Ok((step, impulse))
}

/// Closed-loop Kalman filter on the mass-spring-damper model.
///
/// Each iteration: control from the current estimate, record, advance truth, measure, predict,
/// update. The recorded truth is the simulator state before it is advanced.
pub fn run_kf_pipeline(config: &Config) -> Result<SimulationHistory> {
    config.validate()?;
    info!("Running Kalman filter pipeline");
    let dt = config.discretization_dt;
    let ss = mass_spring_damper_model(dt)?;
    let gain_matrix = full_state_feedback(&ss, &KF_DESIRED_POLES)?;
    let desired_state = DVector::zeros(ss.state_dim());

    let mut kf = KalmanFilter::from_config(
        ss.clone(),
        DVector::from_column_slice(&KF_INITIAL_STATE),
        DMatrix::identity(2, 2) * KF_INITIAL_COVARIANCE,
        config,
    )?;
    let mut sim = LinearSimulator::new(
        ss,
        kf.process_noise().clone(),
        kf.measurement_noise().clone(),
        kf.get_estimate().clone(),
        config.seed,
    )?;

    let mut history = SimulationHistory::new();
    for k in 0..config.num_steps {
        let t = k as f64 * dt;
        let u = get_control_input(kf.get_estimate(), &desired_state, &gain_matrix)?;
        history.append_step(
            t,
            kf.get_estimate(),
            Some(kf.get_certainty()),
            &u,
            Some(sim.state()),
        );

        sim.step(&u)?;
        let measurement = sim.get_measurement();

        kf.predict(Some(&u))?;
        kf.update(&measurement)?;
        debug!("t = {t:.2}: estimate {:?}", kf.get_estimate().as_slice());
    }
    info!(
        "Kalman filter pipeline complete, final estimate {:?}",
        kf.get_estimate().as_slice()
    );
    Ok(history)
}

/// Output of the EKF scenario
#[derive(Clone, Debug)]
pub struct SlamRun {
    /// Planar estimate `[x, y, θ]`, its covariance, the control, and the planar truth per step
    pub history: SimulationHistory,
    pub map: Map,
    pub truth: Vec<Pose>,
    pub estimates: Vec<Pose>,
    /// Every landmark reading fed to the filter, in order
    pub measurements: Vec<Measurement>,
}

/// Unicycle robot localizing against a random landmark map.
///
/// The robot drives at constant speed with the scripted yaw-rate profile. The filter predicts
/// every step and, every `measurement_interval` steps after the first, updates once per landmark
/// with a distance-and-bearing reading. Data association is by landmark id.
pub fn run_ekf_pipeline(config: &Config) -> Result<SlamRun> {
    config.validate()?;
    info!("Running extended Kalman filter pipeline");
    let dt = config.dt;
    let initial_pose = Pose::identity();

    let mut ekf = ExtendedKalmanFilter::from_config(
        range_bearing_model(dt),
        initial_pose.to_planar(),
        DMatrix::identity(3, 3) * EKF_INITIAL_COVARIANCE,
        config,
    )?
    .with_angular_residuals(vec![1]);

    let mut sim = SlamSimulator::new(
        DMatrix::identity(3, 3) * config.variance,
        SensorNoise::isotropic(config.variance),
        initial_pose,
        config.slam_steps,
        config.turn_rate_amplitude,
        dt,
        config.seed,
    )?;

    let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(MAP_SEED_OFFSET));
    let map = make_random_map_planar(config.map_num_features, config.map_dim, &mut rng)?;

    let mut history = SimulationHistory::new();
    let mut measurements = Vec::new();
    let controls = sim.controls().to_vec();
    for (k, omega) in controls.into_iter().enumerate() {
        let u = DVector::from_vec(vec![config.robot_speed, omega]);
        sim.step(&u)?;
        ekf.predict(&u)?;

        if k != 0 && k % config.measurement_interval == 0 {
            for feature in &map.features {
                let measurement = sim.get_measurement(feature, SensorType::DistanceAndBearing);
                let feature_position = DVector::from_column_slice(feature.position().as_slice());
                ekf.update(&measurement.as_vector(), &feature_position)?;
                measurements.push(measurement);
            }
        }

        let estimate = Pose::from_planar(ekf.get_estimate())?;
        sim.append_estimate(estimate);
        history.append_step(
            k as f64 * dt,
            ekf.get_estimate(),
            Some(ekf.get_certainty()),
            &u,
            Some(&sim.pose().to_planar()),
        );
    }
    info!(
        "Extended Kalman filter pipeline complete, {} landmark updates",
        measurements.len()
    );
    Ok(SlamRun {
        history,
        map,
        truth: sim.truth().to_vec(),
        estimates: sim.estimates().to_vec(),
        measurements,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pipeline_names() {
        assert_eq!("KF".parse::<Pipeline>().unwrap(), Pipeline::Kf);
        assert_eq!("ekf".parse::<Pipeline>().unwrap(), Pipeline::Ekf);
        assert_eq!("STATE_SPACE".parse::<Pipeline>().unwrap(), Pipeline::StateSpace);
        assert_eq!("state-space".parse::<Pipeline>().unwrap(), Pipeline::StateSpace);
        for p in Pipeline::ALL {
            assert_eq!(p.to_string().parse::<Pipeline>().unwrap(), p);
        }
    }

    #[test]
    fn rejects_unknown_pipeline() {
        match "EKF_SLAM".parse::<Pipeline>() {
            Err(Error::InvalidPipeline(name)) => assert_eq!(name, "EKF_SLAM"),
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn state_space_pipeline_lengths() {
        let config = Config {
            num_steps: 40,
            ..Config::default()
        };
        let (step, impulse) = run_state_space_pipeline(&config).unwrap();
        assert_eq!(step.len(), 40);
        assert_eq!(impulse.len(), 40);
    }

    #[test]
    fn map_and_simulator_use_separate_streams() {
        let config = Config {
            slam_steps: 5,
            ..Config::default()
        };
        let run = run_ekf_pipeline(&config).unwrap();
        let mut rng = StdRng::seed_from_u64(config.seed + MAP_SEED_OFFSET);
        let expected = make_random_map_planar(config.map_num_features, config.map_dim, &mut rng).unwrap();
        assert_eq!(run.map.features, expected.features);
        let mut same_seed = StdRng::seed_from_u64(config.seed);
        let shared = make_random_map_planar(config.map_num_features, config.map_dim, &mut same_seed).unwrap();
        assert_ne!(run.map.features, shared.features);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = Config {
            discretization_dt: -1.0,
            ..Config::default()
        };
        assert!(matches!(run_kf_pipeline(&config), Err(Error::InvalidConfig(_))));
    }
}
