//! Landmark registry for the localization scenario.
//!
//! Features are identified by an integer id. Adding an id that is already present is not an error:
//! the map keeps the first entry, logs a warning, and reports that nothing was added.
use crate::{Error, Result};

use log::{info, warn};
use nalgebra::Vector3;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// A landmark with a known position
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub id: u32,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
}

impl Feature {
    /// Planar feature (z = 0)
    pub fn new(id: u32, x: f64, y: f64) -> Feature {
        Feature { id, x, y, z: 0.0 }
    }
    pub fn position(&self) -> Vector3<f64> {
        Vector3::new(self.x, self.y, self.z)
    }
}

#[derive(Clone, Debug, Default)]
pub struct Map {
    pub features: Vec<Feature>,
    pub past_feature_ids: Vec<u32>,
}

impl Map {
    pub fn new() -> Map {
        Map::default()
    }
    /// Add a feature unless its id is already known. Returns whether it was added.
    pub fn append_feature(&mut self, feature: Feature) -> bool {
        if self.feature_already_found(&feature) {
            warn!("Revisited landmark with id {}", feature.id);
            return false;
        }
        self.features.push(feature);
        self.past_feature_ids.push(feature.id);
        info!("Added landmark with id {}", feature.id);
        true
    }
    pub fn feature_already_found(&self, feature: &Feature) -> bool {
        self.past_feature_ids.contains(&feature.id)
    }
    pub fn get(&self, id: u32) -> Option<&Feature> {
        self.features.iter().find(|f| f.id == id)
    }
    pub fn len(&self) -> usize {
        self.features.len()
    }
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
    /// Move a known feature to the position carried by `feature`.
    ///
    /// # Errors
    /// * [`Error::UnknownFeature`] if no feature with that id was added.
    pub fn update_feature_location(&mut self, feature: &Feature) -> Result<()> {
        let existing = self
            .features
            .iter_mut()
            .find(|f| f.id == feature.id)
            .ok_or(Error::UnknownFeature(feature.id))?;
        existing.x = feature.x;
        existing.y = feature.y;
        existing.z = feature.z;
        Ok(())
    }
}

fn ensure_extent(dim: [f64; 2]) -> Result<()> {
    if dim.iter().any(|d| !(d.is_finite() && *d > 0.0)) {
        return Err(Error::InvalidConfig(format!(
            "map extent must be positive, got {dim:?}"
        )));
    }
    Ok(())
}

/// `num_features` landmarks scattered uniformly over `[0, dim.0) × [0, dim.1)`, ids 0..n.
///
/// # Errors
/// * [`Error::InvalidConfig`] if either extent is not strictly positive and finite.
pub fn make_random_map_planar<R: Rng>(
    num_features: usize,
    dim: [f64; 2],
    rng: &mut R,
) -> Result<Map> {
    ensure_extent(dim)?;
    let mut map = Map::new();
    for id in 0..num_features {
        let x = rng.random_range(0.0..dim[0]);
        let y = rng.random_range(0.0..dim[1]);
        map.append_feature(Feature::new(id as u32, x, y));
    }
    Ok(map)
}

/// Landmarks spread along the four edges of the box `[0, dim.0] × [0, dim.1]`.
///
/// The count is rounded to the nearest multiple of four, ties to even, so every edge gets the same
/// number: 2 gives no landmarks, 6 gives 8, 10 gives 8.
///
/// # Errors
/// * [`Error::InvalidConfig`] if either extent is not strictly positive and finite.
pub fn make_box_map_planar<R: Rng>(
    num_features: usize,
    dim: [f64; 2],
    rng: &mut R,
) -> Result<Map> {
    ensure_extent(dim)?;
    let per_side = (num_features as f64 / 4.0).round_ties_even() as usize;
    let mut map = Map::new();
    let mut id = 0u32;
    for side in 0..4 {
        for _ in 0..per_side {
            let feature = match side {
                0 => Feature::new(id, rng.random_range(0.0..dim[0]), 0.0),
                1 => Feature::new(id, dim[0], rng.random_range(0.0..dim[1])),
                2 => Feature::new(id, rng.random_range(0.0..dim[0]), dim[1]),
                _ => Feature::new(id, 0.0, rng.random_range(0.0..dim[1])),
            };
            map.append_feature(feature);
            id += 1;
        }
    }
    Ok(map)
}
