pub mod linalg;

pub use linalg::*;

use serde::{Deserialize, Serialize};

/// Tracker confidence for a single pose sample.
///
/// Codes follow the tracker-confidence convention: 0 = lost, 3 = high.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Quality {
    #[default]
    Lost,
    Low,
    Med,
    Ok,
}

impl Quality {
    pub fn from_code(code: u32) -> Self {
        match code {
            0 => Quality::Lost,
            1 => Quality::Low,
            2 => Quality::Med,
            _ => Quality::Ok,
        }
    }

    /// Binary tracking state of a SLAM tracker (tracking or not).
    pub fn from_tracking_ok(tracking: bool) -> Self {
        if tracking {
            Quality::Ok
        } else {
            Quality::Lost
        }
    }

    pub fn code(self) -> u32 {
        match self {
            Quality::Lost => 0,
            Quality::Low => 1,
            Quality::Med => 2,
            Quality::Ok => 3,
        }
    }

    pub fn is_lost(self) -> bool {
        self == Quality::Lost
    }
}

/// Engine lifecycle. One-way transition on the first completed step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FuserStatus {
    #[default]
    Uninitialized,
    Running,
}

/// Flip all four components when `w < 0` (double-cover resolution).
pub fn canonical(q: Quat) -> Quat {
    if q.w < 0.0 {
        -q
    } else {
        q
    }
}

/// Translation + rotation + tracker quality.
///
/// The rotation is kept as a raw quaternion: fused poses are integrated
/// componentwise and are not renormalized.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(into = "PoseRecord", from = "PoseRecord")]
pub struct Pose {
    pub translation: Translation3,
    pub rotation: Quat,
    pub quality: Quality,
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

impl Pose {
    pub fn new(translation: Translation3, rotation: Quat, quality: Quality) -> Self {
        Self { translation, rotation, quality }
    }

    pub fn identity() -> Self {
        Self {
            translation: Translation3::zeros(),
            rotation: Quat::identity(),
            quality: Quality::Lost,
        }
    }

    /// Build from `(x, y, z)` and `(w, qx, qy, qz)`.
    pub fn from_parts(t: (f64, f64, f64), q: (f64, f64, f64, f64), quality: Quality) -> Self {
        Self {
            translation: Translation3::new(t.0, t.1, t.2),
            rotation: Quat::new(q.0, q.1, q.2, q.3),
            quality,
        }
    }

    pub fn with_quality(mut self, quality: Quality) -> Self {
        self.quality = quality;
        self
    }

    /// Flatten to `[x, y, z, qw, qx, qy, qz]`.
    pub fn to_vector(&self) -> PoseVec7 {
        PoseVec7::from_column_slice(&[
            self.translation.x,
            self.translation.y,
            self.translation.z,
            self.rotation.w,
            self.rotation.i,
            self.rotation.j,
            self.rotation.k,
        ])
    }

    pub fn from_vector(v: &PoseVec7, quality: Quality) -> Self {
        Self {
            translation: Translation3::new(v[X], v[Y], v[Z]),
            rotation: Quat::new(v[WQ], v[XQ], v[YQ], v[ZQ]),
            quality,
        }
    }

    pub fn canonicalize(&mut self) {
        self.rotation = canonical(self.rotation);
    }

    /// Re-express this pose in the frame anchored at (`translation`, `rotation`):
    /// `t := R·t + t_anchor`, `q := q_anchor ⊗ q`.
    pub fn re_anchor(&mut self, translation: &Translation3, rotation: &Quat) {
        if let Some(r) = UnitQuat::try_new(*rotation, f64::EPSILON) {
            self.translation = r.transform_vector(&self.translation) + translation;
        } else {
            self.translation += translation;
        }
        self.rotation = canonical(rotation * self.rotation);
    }

    pub fn re_anchor_to(&mut self, anchor: &Pose) {
        self.re_anchor(&anchor.translation, &anchor.rotation);
    }

    pub fn has_nan_rotation(&self) -> bool {
        self.rotation.coords.iter().any(|c| c.is_nan())
    }

    /// Geodesic angle (rad) between the normalized rotations of two poses.
    pub fn angular_distance(&self, other: &Pose) -> f64 {
        match (
            UnitQuat::try_new(self.rotation, f64::EPSILON),
            UnitQuat::try_new(other.rotation, f64::EPSILON),
        ) {
            (Some(a), Some(b)) => a.angle_to(&b),
            _ => f64::NAN,
        }
    }
}

/// Flat, human-readable pose layout used in session logs.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct PoseRecord {
    /// (x, y, z) [m]
    pub translation: (f64, f64, f64),
    /// (w, x, y, z)
    pub rotation: (f64, f64, f64, f64),
    #[serde(default)]
    pub quality: Quality,
}

impl From<Pose> for PoseRecord {
    fn from(p: Pose) -> Self {
        Self {
            translation: (p.translation.x, p.translation.y, p.translation.z),
            rotation: (p.rotation.w, p.rotation.i, p.rotation.j, p.rotation.k),
            quality: p.quality,
        }
    }
}

impl From<PoseRecord> for Pose {
    fn from(r: PoseRecord) -> Self {
        Pose::from_parts(r.translation, r.rotation, r.quality)
    }
}

/// A pose sample stamped on the shared tracker clock [s].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimedPose {
    pub timestamp: f64,
    pub pose: Pose,
}

impl TimedPose {
    pub fn new(timestamp: f64, pose: Pose) -> Self {
        Self { timestamp, pose }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_quality_codes() {
        assert_eq!(Quality::from_code(0), Quality::Lost);
        assert_eq!(Quality::from_code(2), Quality::Med);
        assert_eq!(Quality::from_code(7), Quality::Ok);
        assert_eq!(Quality::Low.code(), 1);
        assert_eq!(Quality::from_tracking_ok(false), Quality::Lost);
    }

    #[test]
    fn test_canonical_flips_negative_w() {
        let q = canonical(Quat::new(-0.5, 0.5, -0.5, 0.5));
        assert_eq!(q, Quat::new(0.5, -0.5, 0.5, -0.5));
        let q = canonical(Quat::new(0.5, 0.5, 0.5, 0.5));
        assert_eq!(q, Quat::new(0.5, 0.5, 0.5, 0.5));
    }

    #[test]
    fn test_vector_layout() {
        let p = Pose::from_parts((1.0, 2.0, 3.0), (0.4, 0.5, 0.6, 0.7), Quality::Ok);
        let v = p.to_vector();
        assert_eq!(v[X], 1.0);
        assert_eq!(v[WQ], 0.4);
        assert_eq!(v[ZQ], 0.7);
        assert_eq!(Pose::from_vector(&v, Quality::Ok), p);
    }

    #[test]
    fn test_re_anchor_rotates_then_translates() {
        // Anchor: 90° yaw, offset (10, 0, 0)
        let yaw = UnitQuat::from_euler_angles(0.0, 0.0, FRAC_PI_2);
        let anchor = Pose::new(Translation3::new(10.0, 0.0, 0.0), *yaw.quaternion(), Quality::Ok);

        let mut p = Pose::from_parts((1.0, 0.0, 0.0), (1.0, 0.0, 0.0, 0.0), Quality::Ok);
        p.re_anchor_to(&anchor);

        assert!((p.translation.x - 10.0).abs() < 1e-12);
        assert!((p.translation.y - 1.0).abs() < 1e-12);
        assert!(p.angular_distance(&anchor) < 1e-12);
        assert!(p.rotation.w >= 0.0);
    }

    #[test]
    fn test_pose_json_layout() {
        let p = Pose::from_parts((1.0, 2.0, 3.0), (1.0, 0.0, 0.0, 0.0), Quality::Med);
        let json = serde_json::to_value(p).unwrap();
        assert_eq!(json["rotation"][0], 1.0);
        assert_eq!(json["quality"], "MED");
        let back: Pose = serde_json::from_value(json).unwrap();
        assert_eq!(back, p);
    }
}
