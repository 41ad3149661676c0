use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::Result;
use crate::fuser::FuserSnapshot;
use crate::types::{FuserStatus, Pose, Quality};

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct LiveStatus {
    pub timestamp: f64,
    pub uptime_seconds: u64,
    pub camera_samples: u64,
    pub secondary_samples: u64,
    pub fused_steps: u64,
    pub status: FuserStatus,
    // Tracker state
    pub camera_quality: Quality,
    pub secondary_quality: Quality,
    pub alpha: f64,
    // Recovery
    pub recoveries: u64,
    pub recovered: bool,
    pub recover_steps: usize,
    pub fused_filter_active: bool,
    pub nan_events: u64,
    // Output
    pub published: Pose,
    pub raw_fused: Pose,
    /// Map points within the crop radius of the secondary pose
    pub cloud_points: usize,
}

impl Default for LiveStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl LiveStatus {
    pub fn new() -> Self {
        Self {
            timestamp: current_timestamp(),
            uptime_seconds: 0,
            camera_samples: 0,
            secondary_samples: 0,
            fused_steps: 0,
            status: FuserStatus::Uninitialized,
            camera_quality: Quality::Lost,
            secondary_quality: Quality::Lost,
            alpha: 0.0,
            recoveries: 0,
            recovered: false,
            recover_steps: 0,
            fused_filter_active: false,
            nan_events: 0,
            published: Pose::identity(),
            raw_fused: Pose::identity(),
            cloud_points: 0,
        }
    }

    /// Copy engine-side fields from a fuser snapshot.
    pub fn apply_snapshot(&mut self, snapshot: &FuserSnapshot) {
        self.fused_steps = snapshot.counter;
        self.status = snapshot.status;
        self.camera_quality = snapshot.camera_quality;
        self.secondary_quality = snapshot.secondary_quality;
        self.alpha = snapshot.alpha;
        self.recovered = snapshot.recovered;
        self.recover_steps = snapshot.recover_steps;
        self.fused_filter_active = snapshot.fused_filter_active;
        self.published = snapshot.published;
        self.raw_fused = snapshot.raw_fused;
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

pub fn current_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
