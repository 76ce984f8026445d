//! Run configuration
//!
//! Every tunable constant used by the models, filters, simulators, and pipelines lives on [`Config`]
//! and is passed in explicitly. Configurations can be written to and read from JSON or TOML files;
//! missing fields fall back to their defaults.
use crate::{Error, Result};

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Default noise variance for process and measurement covariances
pub const DEFAULT_VARIANCE: f64 = 1e-3;
/// Default time step for a standalone discretization (s)
pub const DEFAULT_DT: f64 = 1.0;
/// Default pipeline time step (s)
pub const DEFAULT_DISCRETIZATION: f64 = 0.05;
/// Default RNG seed
pub const DEFAULT_SEED: u64 = 42;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Discretization step for models built outside a pipeline (s)
    pub dt: f64,
    /// Pipeline time step (s)
    pub discretization_dt: f64,
    /// Iterations of the KF and state-space pipelines
    pub num_steps: usize,
    /// Iterations of the EKF pipeline
    pub slam_steps: usize,
    /// Process and measurement noise variance
    pub variance: f64,
    /// Central-difference step for numerical Jacobians
    pub epsilon: f64,
    /// Number of landmarks in the EKF pipeline map
    pub map_num_features: usize,
    /// Planar extent of the map (x, y)
    pub map_dim: [f64; 2],
    /// Forward speed of the robot (m/s)
    pub robot_speed: f64,
    /// Amplitude of the scripted yaw-rate profile (rad/s)
    pub turn_rate_amplitude: f64,
    /// Steps between landmark sightings in the EKF pipeline
    pub measurement_interval: usize,
    pub seed: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            dt: DEFAULT_DT,
            discretization_dt: DEFAULT_DISCRETIZATION,
            num_steps: 200,
            slam_steps: 100,
            variance: DEFAULT_VARIANCE,
            epsilon: crate::nonlinear::EPSILON,
            map_num_features: 3,
            map_dim: [15.0, 15.0],
            robot_speed: 0.5,
            turn_rate_amplitude: 0.1,
            measurement_interval: 20,
            seed: DEFAULT_SEED,
        }
    }
}

impl Config {
    /// Check the values that would otherwise fail deep inside a pipeline.
    pub fn validate(&self) -> Result<()> {
        for (name, dt) in [("dt", self.dt), ("discretization_dt", self.discretization_dt)] {
            if !(dt.is_finite() && dt > 0.0) {
                return Err(Error::InvalidConfig(format!("{name} must be positive, got {dt}")));
            }
        }
        if !(self.variance.is_finite() && self.variance > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "variance must be positive, got {}",
                self.variance
            )));
        }
        if !(self.epsilon.is_finite() && self.epsilon > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "epsilon must be positive, got {}",
                self.epsilon
            )));
        }
        if self.map_dim.iter().any(|d| !(d.is_finite() && *d > 0.0)) {
            return Err(Error::InvalidConfig(format!(
                "map_dim must be positive, got {:?}",
                self.map_dim
            )));
        }
        if self.measurement_interval == 0 {
            return Err(Error::InvalidConfig(
                "measurement_interval must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
    /// Write the configuration as pretty JSON.
    pub fn to_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, self).map_err(|e| Error::InvalidConfig(e.to_string()))
    }
    /// Read the configuration from a JSON file.
    pub fn from_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        serde_json::from_reader(file).map_err(|e| Error::InvalidConfig(e.to_string()))
    }
    /// Write the configuration as TOML.
    pub fn to_toml<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut file = File::create(path)?;
        let s = toml::to_string(self).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        file.write_all(s.as_bytes())?;
        Ok(())
    }
    /// Read the configuration from TOML.
    pub fn from_toml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut s = String::new();
        let mut file = File::open(path)?;
        file.read_to_string(&mut s)?;
        toml::from_str(&s).map_err(|e| Error::InvalidConfig(e.to_string()))
    }
    /// Generic write: choose format by file extension (.json/.toml)
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let p = path.as_ref();
        match extension(p).as_deref() {
            Some("json") => self.to_json(p),
            Some("toml") => self.to_toml(p),
            _ => Err(Error::InvalidConfig(format!(
                "unsupported file extension: {}",
                p.display()
            ))),
        }
    }
    /// Generic read: choose format by file extension (.json/.toml)
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let p = path.as_ref();
        match extension(p).as_deref() {
            Some("json") => Self::from_json(p),
            Some("toml") => Self::from_toml(p),
            _ => Err(Error::InvalidConfig(format!(
                "unsupported file extension: {}",
                p.display()
            ))),
        }
    }
}

fn extension(p: &Path) -> Option<String> {
    p.extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_lowercase())
}
