//! Rigid 3D pose (SE3) used for the robot ground truth.
//!
//! A [`Pose`] is a translation plus an orientation stored as an `Isometry3`. It converts to and from
//! the flat state vector `[x, y, z, roll, pitch, yaw]` and, for planar scenarios, to and from the
//! unicycle state `[x, y, θ]` (z, roll, and pitch held at zero).
//!
//! Composition is the usual group operation: `a.compose(&b)` applies `b` expressed in `a`'s body
//! frame, i.e. the translation of `b` is rotated by `a` before being added.

use crate::{Error, Result};

use std::fmt::{self, Display};
use std::ops::Mul;

use nalgebra::{DVector, Isometry3, Point3, Translation3, UnitQuaternion, Vector3};

/// Length of the flat SE3 state vector
pub const POSE_VECTOR_DIM: usize = 6;
/// Length of the planar unicycle state vector
pub const PLANAR_DIM: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pose {
    isometry: Isometry3<f64>,
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

impl Display for Pose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let t = self.translation();
        let (roll, pitch, yaw) = self.roll_pitch_yaw();
        write!(
            f,
            "Pose {{ xyz: [{:.4}, {:.4}, {:.4}], rpy: [{:.4}, {:.4}, {:.4}] }}",
            t[0], t[1], t[2], roll, pitch, yaw
        )
    }
}

impl Pose {
    /// Build a pose from a translation and XYZ Euler angles (radians).
    pub fn new(xyz: Vector3<f64>, roll_pitch_yaw: Vector3<f64>) -> Pose {
        let rotation =
            UnitQuaternion::from_euler_angles(roll_pitch_yaw[0], roll_pitch_yaw[1], roll_pitch_yaw[2]);
        Pose {
            isometry: Isometry3::from_parts(Translation3::from(xyz), rotation),
        }
    }
    pub fn identity() -> Pose {
        Pose {
            isometry: Isometry3::identity(),
        }
    }
    pub fn from_isometry(isometry: Isometry3<f64>) -> Pose {
        Pose { isometry }
    }
    pub fn isometry(&self) -> &Isometry3<f64> {
        &self.isometry
    }
    /// Build a pose from `[x, y, z, roll, pitch, yaw]`.
    ///
    /// # Errors
    /// * [`Error::DimensionMismatch`] if the vector does not have six entries.
    pub fn from_vector(state: &DVector<f64>) -> Result<Pose> {
        if state.len() != POSE_VECTOR_DIM {
            return Err(Error::DimensionMismatch {
                what: "pose vector",
                expected: (POSE_VECTOR_DIM, 1),
                found: (state.len(), 1),
            });
        }
        Ok(Pose::new(
            Vector3::new(state[0], state[1], state[2]),
            Vector3::new(state[3], state[4], state[5]),
        ))
    }
    /// Flatten to `[x, y, z, roll, pitch, yaw]`.
    pub fn as_vector(&self) -> DVector<f64> {
        let t = self.translation();
        let (roll, pitch, yaw) = self.roll_pitch_yaw();
        DVector::from_vec(vec![t[0], t[1], t[2], roll, pitch, yaw])
    }
    /// Lift a planar `[x, y, θ]` state into SE3.
    ///
    /// # Errors
    /// * [`Error::DimensionMismatch`] if the vector does not have three entries.
    pub fn from_planar(state: &DVector<f64>) -> Result<Pose> {
        if state.len() != PLANAR_DIM {
            return Err(Error::DimensionMismatch {
                what: "planar pose vector",
                expected: (PLANAR_DIM, 1),
                found: (state.len(), 1),
            });
        }
        Ok(Pose::new(
            Vector3::new(state[0], state[1], 0.0),
            Vector3::new(0.0, 0.0, state[2]),
        ))
    }
    /// Project onto the plane as `[x, y, yaw]`.
    pub fn to_planar(&self) -> DVector<f64> {
        let t = self.translation();
        DVector::from_vec(vec![t[0], t[1], self.yaw()])
    }
    pub fn translation(&self) -> Vector3<f64> {
        self.isometry.translation.vector
    }
    pub fn roll_pitch_yaw(&self) -> (f64, f64, f64) {
        self.isometry.rotation.euler_angles()
    }
    pub fn yaw(&self) -> f64 {
        self.roll_pitch_yaw().2
    }
    /// `self ∘ other`: rotate `other`'s translation into this frame, then translate.
    pub fn compose(&self, other: &Pose) -> Pose {
        Pose {
            isometry: self.isometry * other.isometry,
        }
    }
    pub fn inverse(&self) -> Pose {
        Pose {
            isometry: self.isometry.inverse(),
        }
    }
    /// Map a point from this pose's body frame into the parent frame.
    pub fn transform_point(&self, point: &Vector3<f64>) -> Vector3<f64> {
        self.isometry.transform_point(&Point3::from(*point)).coords
    }
}

impl Mul for Pose {
    type Output = Pose;
    fn mul(self, rhs: Pose) -> Pose {
        self.compose(&rhs)
    }
}

impl Mul<&Pose> for &Pose {
    type Output = Pose;
    fn mul(self, rhs: &Pose) -> Pose {
        self.compose(rhs)
    }
}
