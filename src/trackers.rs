//! Simulated upstream trackers for the live binary.
//!
//! Both trackers follow the same planar circuit. The camera VO reports it
//! in the world frame with a slow scale drift; the SLAM tracker reports it
//! relative to wherever it (re)acquired tracking, and drops out periodically.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::Sender;
use tokio::time::{interval, Duration, Instant};

use crate::types::{Pose, Quality, TimedPose, Translation3, UnitQuat};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    /// Circuit radius [m]
    pub radius: f64,
    /// Yaw rate [rad/s]
    pub angular_rate: f64,
}

impl Default for Trajectory {
    fn default() -> Self {
        Self {
            radius: 2.0,
            angular_rate: 0.2,
        }
    }
}

impl Trajectory {
    /// Ground-truth pose at `t` seconds; identity at `t = 0`.
    pub fn pose_at(&self, t: f64) -> (Translation3, UnitQuat) {
        let yaw = self.angular_rate * t;
        let translation = Translation3::new(
            self.radius * yaw.sin(),
            self.radius * (1.0 - yaw.cos()),
            0.0,
        );
        (translation, UnitQuat::from_euler_angles(0.0, 0.0, yaw))
    }
}

/// Dropout pattern: LOST for `len` samples out of every `every`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Dropout {
    pub every: u64,
    pub len: u64,
}

impl Dropout {
    fn is_lost(&self, sample: u64) -> bool {
        self.every > 0 && self.len > 0 && sample % self.every >= self.every.saturating_sub(self.len)
    }
}

#[derive(Clone, Debug)]
pub struct SimulatedCamera {
    trajectory: Trajectory,
    /// Translation scale error per second of runtime
    scale_drift: f64,
}

impl SimulatedCamera {
    pub fn new(trajectory: Trajectory, scale_drift: f64) -> Self {
        Self { trajectory, scale_drift }
    }

    pub fn sample(&self, t: f64) -> Pose {
        let (translation, rotation) = self.trajectory.pose_at(t);
        Pose::new(
            translation * (1.0 + self.scale_drift * t),
            *rotation.quaternion(),
            Quality::Ok,
        )
    }
}

#[derive(Clone, Debug)]
pub struct SimulatedSecondary {
    trajectory: Trajectory,
    dropout: Dropout,
    samples: u64,
    origin: Option<(Translation3, UnitQuat)>,
}

impl SimulatedSecondary {
    pub fn new(trajectory: Trajectory, dropout: Dropout) -> Self {
        Self {
            trajectory,
            dropout,
            samples: 0,
            origin: None,
        }
    }

    /// Pose relative to the frame the tracker last (re)acquired in.
    /// LOST samples report the identity pose.
    pub fn sample(&mut self, t: f64) -> Pose {
        let quality = Quality::from_tracking_ok(!self.dropout.is_lost(self.samples));
        self.samples += 1;

        if quality.is_lost() {
            self.origin = None;
            return Pose::identity().with_quality(quality);
        }

        let (translation, rotation) = self.trajectory.pose_at(t);
        let (origin_t, origin_r) = *self.origin.get_or_insert((translation, rotation));
        let inverse = origin_r.inverse();
        Pose::new(
            inverse.transform_vector(&(translation - origin_t)),
            *(inverse * rotation).quaternion(),
            quality,
        )
    }
}

/// Map points on a ring `offset` meters outside the circuit, `count` of them.
pub fn landmark_ring(trajectory: &Trajectory, offset: f64, count: usize) -> Vec<Translation3> {
    let center = Translation3::new(0.0, trajectory.radius, 0.0);
    let ring = trajectory.radius + offset;
    (0..count)
        .map(|i| {
            let a = std::f64::consts::TAU * i as f64 / count as f64;
            center + Translation3::new(ring * a.sin(), -ring * a.cos(), 0.0)
        })
        .collect()
}

pub async fn camera_loop(tx: Sender<TimedPose>, camera: SimulatedCamera, period: Duration, clock: Instant) {
    let mut interval = interval(period);
    let mut sample_count = 0u64;

    loop {
        interval.tick().await;

        let t = clock.elapsed().as_secs_f64();
        match tx.try_send(TimedPose::new(t, camera.sample(t))) {
            Ok(_) => {
                sample_count += 1;
                if sample_count % 100 == 0 {
                    log::debug!("[camera] {} samples", sample_count);
                }
            }
            Err(TrySendError::Closed(_)) => {
                log::warn!("[camera] Channel closed after {} samples", sample_count);
                break;
            }
            Err(TrySendError::Full(_)) => {
                // Channel full, drop this sample
            }
        }
    }
}

pub async fn secondary_loop(
    tx: Sender<TimedPose>,
    mut secondary: SimulatedSecondary,
    period: Duration,
    clock: Instant,
) {
    let mut interval = interval(period);
    let mut sample_count = 0u64;

    loop {
        interval.tick().await;

        let t = clock.elapsed().as_secs_f64();
        match tx.try_send(TimedPose::new(t, secondary.sample(t))) {
            Ok(_) => {
                sample_count += 1;
                if sample_count % 100 == 0 {
                    log::debug!("[secondary] {} samples", sample_count);
                }
            }
            Err(TrySendError::Closed(_)) => {
                log::warn!("[secondary] Channel closed after {} samples", sample_count);
                break;
            }
            Err(TrySendError::Full(_)) => {
                // Channel full, drop this sample
            }
        }
    }
}
