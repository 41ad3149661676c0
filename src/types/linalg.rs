//! Linear algebra type aliases for pose fusion
//!
//! Poses are flattened to a 7-vector `[x, y, z, qw, qx, qy, qz]` for
//! delta computation and componentwise blending.

use nalgebra::{Quaternion, SVector, UnitQuaternion, Vector3};

// ===== Pose Element Layout =====
pub const POSE_ELEMENTS: usize = 7;

pub const X: usize = 0;
pub const Y: usize = 1;
pub const Z: usize = 2;
pub const WQ: usize = 3;
pub const XQ: usize = 4;
pub const YQ: usize = 5;
pub const ZQ: usize = 6;

// ===== Pose Types =====
pub type PoseVec7 = SVector<f64, POSE_ELEMENTS>;
pub type Translation3 = Vector3<f64>;

/// Raw (not necessarily unit) quaternion, stored (w, x, y, z)
pub type Quat = Quaternion<f64>;
pub type UnitQuat = UnitQuaternion<f64>;

/// Below this angle (rad) two rotations are treated as coincident.
pub const EPS_ANGLE: f64 = 1e-7;
