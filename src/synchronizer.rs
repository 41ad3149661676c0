//! Temporal alignment of the secondary pose stream onto primary timestamps.

use std::f64::consts::PI;

use crate::interpolation::SplineInterpolator;
use crate::types::{canonical, Pose, Quat, Translation3, UnitQuat};

/// Timestamp of the "previous secondary sample" before any sample arrived.
pub const UNINITIALIZED_TIMESTAMP: f64 = -1.0;

/// Estimate the secondary pose at `t3` from samples `(t1, s1)` and `(t2, s2)`.
///
/// Clamping rules, in order:
/// 1. `t1` is [`UNINITIALIZED_TIMESTAMP`] -> `s2`
/// 2. `t3 < t1` -> `s1`
/// 3. `t3 < t2` or `t1 == t2` -> `s2`
/// 4. otherwise translation follows the spline through both samples and
///    rotation scales the `s1 -> s2` relative rotation by
///    `(t3 - t1) / (t2 - t1)`.
///
/// In case 4 the rotation is only propagated when no component of either
/// sample rotation is exactly zero; otherwise the output keeps the identity
/// rotation. The result carries `s2`'s quality.
pub fn synchronize(t1: f64, t2: f64, t3: f64, s1: &Pose, s2: &Pose) -> Pose {
    if t1 == UNINITIALIZED_TIMESTAMP {
        return *s2;
    }
    if t3 < t1 {
        return *s1;
    }
    if t3 < t2 || t1 == t2 {
        return *s2;
    }

    let mut s3 = Pose::identity().with_quality(s2.quality);
    s3.translation = interpolate_translation(&[t1, t2], &[*s1, *s2], t3).unwrap_or(s2.translation);

    // TODO: the exact-zero guard drops rotation propagation for any sample
    // lying on a coordinate plane; confirm with downstream consumers before
    // replacing it with a norm check.
    if no_zero_component(&s1.rotation) && no_zero_component(&s2.rotation) {
        let dt = (t3 - t1) / (t2 - t1);
        s3.rotation = scale_rotation(&s1.rotation, &s2.rotation, dt);
    }
    s3
}

/// Per-axis spline through any number of timestamped poses, evaluated at `t`.
pub fn interpolate_translation(times: &[f64], poses: &[Pose], t: f64) -> Option<Translation3> {
    let mut out = Translation3::zeros();
    for axis in 0..3 {
        let values: Vec<f64> = poses.iter().map(|p| p.translation[axis]).collect();
        out[axis] = SplineInterpolator::fit(times, &values)?.eval(t);
    }
    Some(out)
}

/// `(q2 ⊗ q1⁻¹)^dt ⊗ q1`, with the relative angle wrapped into `(-π, π]`.
pub fn scale_rotation(q1: &Quat, q2: &Quat, dt: f64) -> Quat {
    let q1 = UnitQuat::new_normalize(*q1);
    let q2 = UnitQuat::new_normalize(*q2);
    let relative = q2 * q1.inverse();

    match relative.axis_angle() {
        Some((axis, angle)) => {
            let mut angle = angle;
            if angle > PI {
                angle -= 2.0 * PI;
            }
            let scaled = UnitQuat::from_axis_angle(&axis, (angle * dt) % (2.0 * PI));
            canonical((scaled * q1).into_inner())
        }
        None => canonical(q1.into_inner()),
    }
}

fn no_zero_component(q: &Quat) -> bool {
    q.coords.iter().all(|c| *c != 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Quality;
    use approx::assert_relative_eq;

    fn pose(t: (f64, f64, f64), rpy: (f64, f64, f64), quality: Quality) -> Pose {
        let q = UnitQuat::from_euler_angles(rpy.0, rpy.1, rpy.2);
        Pose::new(Translation3::new(t.0, t.1, t.2), *q.quaternion(), quality)
    }

    fn samples() -> (Pose, Pose) {
        (
            pose((0.0, 1.0, 2.0), (0.1, 0.2, 0.3), Quality::Ok),
            pose((1.0, 1.5, 1.0), (0.15, 0.25, 0.4), Quality::Med),
        )
    }

    #[test]
    fn test_uninitialized_returns_second() {
        let (s1, s2) = samples();
        let s3 = synchronize(UNINITIALIZED_TIMESTAMP, 2.0, 5.0, &s1, &s2);
        assert_eq!(s3, s2);
    }

    #[test]
    fn test_target_before_interval_clamps_to_first() {
        let (s1, s2) = samples();
        assert_eq!(synchronize(1.0, 2.0, 0.5, &s1, &s2), s1);
    }

    #[test]
    fn test_target_inside_interval_returns_second() {
        let (s1, s2) = samples();
        assert_eq!(synchronize(1.0, 2.0, 1.5, &s1, &s2), s2);
        assert_eq!(synchronize(1.0, 1.0, 3.0, &s1, &s2), s2);
    }

    #[test]
    fn test_target_at_second_sample() {
        let (s1, s2) = samples();
        let s3 = synchronize(1.0, 2.0, 2.0, &s1, &s2);
        assert_relative_eq!(s3.translation, s2.translation, epsilon = 1e-12);
        assert!(s3.angular_distance(&s2) < 1e-9);
        assert_eq!(s3.quality, Quality::Med);
    }

    #[test]
    fn test_translation_on_line_through_samples() {
        let (s1, s2) = samples();
        for t3 in [2.0, 2.3, 2.9, 4.0] {
            let s3 = synchronize(1.0, 2.0, t3, &s1, &s2);
            let dt = t3 - 1.0;
            let expected = s1.translation + (s2.translation - s1.translation) * dt;
            assert_relative_eq!(s3.translation, expected, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_rotation_distance_grows_with_target_time() {
        let (s1, s2) = samples();
        let step = s1.angular_distance(&s2);
        let mut last = 0.0;
        for i in 0..10 {
            let t3 = 2.0 + 0.1 * i as f64;
            let d = synchronize(1.0, 2.0, t3, &s1, &s2).angular_distance(&s1);
            assert!(d + 1e-12 >= last);
            assert_relative_eq!(d, step * (t3 - 1.0), epsilon = 1e-9);
            last = d;
        }
    }

    #[test]
    fn test_zero_component_keeps_identity_rotation() {
        let s1 = Pose::from_parts((0.0, 0.0, 0.0), (1.0, 0.0, 0.0, 0.0), Quality::Ok);
        let (_, s2) = samples();
        let s3 = synchronize(1.0, 2.0, 3.0, &s1, &s2);
        assert_eq!(s3.rotation, Quat::identity());
        assert_relative_eq!(s3.translation.x, 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_interpolate_translation_many_samples() {
        let times = [0.0, 1.0, 2.0, 3.0];
        let poses: Vec<Pose> = times
            .iter()
            .map(|t| Pose::from_parts((*t, t * t, 0.0), (1.0, 0.0, 0.0, 0.0), Quality::Ok))
            .collect();
        let t = interpolate_translation(&times, &poses, 1.5).unwrap();
        assert_relative_eq!(t.x, 1.5, epsilon = 1e-9);
        assert_relative_eq!(t.y, 2.25, epsilon = 1e-9);
    }
}
