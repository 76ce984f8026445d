//! End-to-end tests for the estimation pipelines
//!
//! These tests run each scenario exactly as the command line tool does, from a [`Config`], and
//! check the recorded histories against the simulated ground truth.
//!
//! ## Error Metrics
//!
//! - **Terminal estimate error**: distance between the last recorded estimate and the truth
//! - **Regulation error**: distance between the last estimate and the regulated set point
//!
//! The bounds in the assertions are loose regression checks. With the default noise levels the
//! observed errors are an order of magnitude smaller.
use statespace::pipeline::{Pipeline, run_ekf_pipeline, run_kf_pipeline, run_state_space_pipeline};
use statespace::sim::SensorType;
use statespace::{Config, Error};

use assert_approx_eq::assert_approx_eq;

/// Bound on the closed-loop estimate distance from the origin after the KF run
const KF_REGULATION_TOLERANCE: f64 = 0.5;
/// Bound on the estimate-to-truth distance at the end of the KF run
const KF_TRACKING_TOLERANCE: f64 = 0.5;
/// Bound on the planar position error at the end of the EKF run (m)
const EKF_POSITION_TOLERANCE: f64 = 5.0;

#[test]
fn test_kf_pipeline_regulates_to_origin() {
    let config = Config::default();
    let history = run_kf_pipeline(&config).expect("KF pipeline failed");

    assert_eq!(history.len(), config.num_steps);
    assert_eq!(history.covariance.len(), config.num_steps);
    assert_eq!(history.truth.len(), config.num_steps);
    assert_approx_eq!(history.time[1] - history.time[0], config.discretization_dt, 1e-12);

    // first record is the prior
    assert_eq!(history.state[0].as_slice(), &[5.0, 5.0]);
    assert_eq!(history.truth[0].as_slice(), &[5.0, 5.0]);

    let last = history.state.last().unwrap();
    let truth = history.truth.last().unwrap();
    assert!(
        last.norm() < KF_REGULATION_TOLERANCE,
        "estimate did not converge: {last:?}"
    );
    assert!(
        (last - truth).norm() < KF_TRACKING_TOLERANCE,
        "estimate {last:?} far from truth {truth:?}"
    );

    // position uncertainty shrinks from the prior
    let first_var = history.covariance[0][(0, 0)];
    let last_var = history.covariance.last().unwrap()[(0, 0)];
    assert!(last_var < first_var);
}

#[test]
fn test_ekf_pipeline_localizes() {
    let config = Config::default();
    let run = run_ekf_pipeline(&config).expect("EKF pipeline failed");

    assert_eq!(run.history.len(), config.slam_steps);
    assert_eq!(run.estimates.len(), config.slam_steps);
    assert_eq!(run.truth.len(), config.slam_steps + 1);
    assert_eq!(run.map.len(), config.map_num_features);

    let sightings = (1..config.slam_steps)
        .filter(|k| k % config.measurement_interval == 0)
        .count();
    assert_eq!(run.measurements.len(), sightings * config.map_num_features);
    for (i, m) in run.measurements.iter().enumerate() {
        assert_eq!(m.sensor_type, SensorType::DistanceAndBearing);
        assert_eq!(m.feature_id, Some((i % config.map_num_features) as u32));
        assert_eq!(m.values.len(), 2);
        assert!(m.values.iter().all(|v| v.is_finite()));
    }

    for x in &run.history.state {
        assert!(x.iter().all(|v| v.is_finite()));
    }

    let estimate = run.estimates.last().unwrap().translation();
    let truth = run.truth.last().unwrap().translation();
    let error = (estimate - truth).xy().norm();
    assert!(
        error < EKF_POSITION_TOLERANCE,
        "final position error {error} m"
    );
}

#[test]
fn test_pipelines_are_reproducible() {
    let config = Config {
        num_steps: 50,
        slam_steps: 45,
        ..Config::default()
    };
    let a = run_kf_pipeline(&config).unwrap();
    let b = run_kf_pipeline(&config).unwrap();
    assert_eq!(a.state, b.state);
    assert_eq!(a.truth, b.truth);

    let a = run_ekf_pipeline(&config).unwrap();
    let b = run_ekf_pipeline(&config).unwrap();
    assert_eq!(a.history.state, b.history.state);
    assert_eq!(a.map.features, b.map.features);

    let other = Config { seed: 7, ..config };
    let c = run_kf_pipeline(&other).unwrap();
    assert_ne!(run_kf_pipeline(&config).unwrap().truth[1..], c.truth[1..]);
}

#[test]
fn test_state_space_pipeline_responses() {
    let config = Config::default();
    let (step, impulse) = run_state_space_pipeline(&config).unwrap();
    assert_eq!(step.len(), config.num_steps);
    assert_eq!(impulse.len(), config.num_steps);
    assert!(step.covariance.is_empty());
    assert_eq!(step.state[0].as_slice(), &[0.0, 0.0]);
    assert_approx_eq!(*step.time.last().unwrap(), 9.95, 1e-9);

    // underdamped unit step heads to x = 1/k; the impulse response decays back to rest
    let settled = step.state.last().unwrap();
    assert!((settled[0] - 1.0).abs() < 0.2, "step response at {settled:?}");
    let peak = impulse.state.iter().map(|x| x[0].abs()).fold(0.0, f64::max);
    assert!(impulse.state.last().unwrap()[0].abs() < peak);
}

#[test]
fn test_unknown_pipeline_name() {
    assert!(matches!(
        "UKF".parse::<Pipeline>(),
        Err(Error::InvalidPipeline(_))
    ));
}

#[test]
fn test_history_export() {
    let config = Config {
        num_steps: 10,
        ..Config::default()
    };
    let history = run_kf_pipeline(&config).unwrap();
    let path = std::env::temp_dir().join(format!("statespace_kf_{}.csv", std::process::id()));
    history.to_csv(&path).unwrap();

    let mut reader = csv::Reader::from_path(&path).unwrap();
    let headers: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
    assert_eq!(
        headers,
        vec!["t", "x0", "x1", "var0", "var1", "u0", "truth0", "truth1"]
    );
    assert_eq!(reader.records().count(), 10);
    std::fs::remove_file(&path).unwrap();
}
