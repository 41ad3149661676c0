//! Host-side pipeline around the fuser.
//!
//! Keeps the previous secondary sample for synchronization, drives one
//! fusion step per camera frame and hands the result to publishing sinks.
//! Sink failures are logged and never feed back into the fuser.

use crossbeam::channel::{Sender, TrySendError};
use serde::{Deserialize, Serialize};

use crate::error::{FuserError, Result};
use crate::fuser::{Fuser, FuserConfig, FuserEvent};
use crate::synchronizer::{synchronize, UNINITIALIZED_TIMESTAMP};
use crate::types::{Pose, TimedPose, Translation3};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Point-cloud crop radius around the secondary pose [m]
    pub point_cloud_radius: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { point_cloud_radius: 1.0 }
    }
}

/// One published output: fused pose + camera tracking state code.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PublishedPose {
    pub timestamp: f64,
    pub pose: Pose,
    pub state: u32,
}

pub trait PoseSink: Send {
    fn publish(&mut self, pose: &PublishedPose) -> Result<()>;
}

/// Collects everything it is given.
#[derive(Debug, Default)]
pub struct VecSink {
    pub poses: Vec<PublishedPose>,
}

impl PoseSink for VecSink {
    fn publish(&mut self, pose: &PublishedPose) -> Result<()> {
        self.poses.push(*pose);
        Ok(())
    }
}

/// Forwards to a crossbeam channel; a full channel drops the pose.
pub struct ChannelSink {
    tx: Sender<PublishedPose>,
    dropped: u64,
}

impl ChannelSink {
    pub fn new(tx: Sender<PublishedPose>) -> Self {
        Self { tx, dropped: 0 }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl PoseSink for ChannelSink {
    fn publish(&mut self, pose: &PublishedPose) -> Result<()> {
        match self.tx.try_send(*pose) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.dropped += 1;
                log::debug!("Pose channel full, dropped {} so far", self.dropped);
                Ok(())
            }
            Err(TrySendError::Disconnected(_)) => {
                Err(FuserError::SinkClosed("pose channel receiver dropped".into()))
            }
        }
    }
}

pub struct Pipeline {
    fuser: Fuser,
    config: PipelineConfig,
    secondary_prev: Pose,
    secondary_prev_ts: f64,
    sinks: Vec<Box<dyn PoseSink>>,
    last_events: Vec<FuserEvent>,
}

impl Pipeline {
    pub fn new(fuser_config: FuserConfig, config: PipelineConfig) -> Result<Self> {
        Ok(Self::with_fuser(Fuser::try_new(fuser_config)?, config))
    }

    pub fn with_fuser(fuser: Fuser, config: PipelineConfig) -> Self {
        Self {
            fuser,
            config,
            secondary_prev: Pose::identity(),
            secondary_prev_ts: UNINITIALIZED_TIMESTAMP,
            sinks: Vec::new(),
            last_events: Vec::new(),
        }
    }

    pub fn add_sink(&mut self, sink: Box<dyn PoseSink>) {
        self.sinks.push(sink);
    }

    /// Synchronize `secondary` onto the camera timestamp, fuse and publish.
    pub fn process(&mut self, camera: &TimedPose, secondary: &TimedPose) -> PublishedPose {
        let synced = synchronize(
            self.secondary_prev_ts,
            secondary.timestamp,
            camera.timestamp,
            &self.secondary_prev,
            &secondary.pose,
        )
        .with_quality(secondary.pose.quality);

        self.last_events = self.fuser.step(&camera.pose, &synced);

        self.secondary_prev = secondary.pose;
        self.secondary_prev_ts = secondary.timestamp;

        let published = PublishedPose {
            timestamp: camera.timestamp,
            pose: self.fuser.fused_pose(),
            state: camera.pose.quality.code(),
        };
        for sink in self.sinks.iter_mut() {
            if let Err(e) = sink.publish(&published) {
                log::warn!("Publishing failed: {}", e);
            }
        }
        published
    }

    /// Events raised by the most recent `process` call.
    pub fn last_events(&self) -> &[FuserEvent] {
        &self.last_events
    }

    pub fn fuser(&self) -> &Fuser {
        &self.fuser
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Crop a map point cloud around the latest raw secondary sample.
    pub fn crop_around_secondary(&self, points: &[Translation3]) -> Vec<Translation3> {
        crop_point_cloud(points, &self.secondary_prev.translation, self.config.point_cloud_radius)
    }
}

/// Points strictly within `radius` of `center`.
pub fn crop_point_cloud(points: &[Translation3], center: &Translation3, radius: f64) -> Vec<Translation3> {
    points
        .iter()
        .filter(|p| (*p - center).norm() < radius)
        .copied()
        .collect()
}
