// fuser.rs: pure computation layer for the VO fuser
//
// Everything in this module is independent of:
//   - tokio / async runtime
//   - the upstream trackers and their drivers
//   - file I/O and publishing sinks
//
// It takes one camera-VO pose and one synchronized SLAM pose per step and
// produces one published pose. Calls must be serialized by the caller.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{FuserError, Result};
use crate::filters::{PoseWindow, RotationMedian};
use crate::recovery::RecoveryTracker;
use crate::types::{FuserStatus, Pose, PoseVec7, Quality};

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FuserConfig {
    // ── Windows ──
    /// Median window length (poses) for both filter banks
    pub filter_window: usize,
    /// Quality history length for recovery detection
    pub recovery_buffer: usize,

    // ── Blending ──
    pub alpha_blending: f64,
    /// Scale on `alpha_blending` when the camera reports MED quality
    pub alpha_weight: f64,

    // ── Reset smoothing ──
    pub reduction_factor: f64,

    // ── Rotation median ──
    pub median_exponent: f64,
    pub median_max_angular_update: f64,
    pub median_max_iterations: usize,
}

impl Default for FuserConfig {
    fn default() -> Self {
        Self {
            filter_window: 5,
            recovery_buffer: 20,
            alpha_blending: 0.75,
            alpha_weight: 0.7,
            reduction_factor: 0.01,
            median_exponent: 1.0,
            median_max_angular_update: 1e-4,
            median_max_iterations: 1000,
        }
    }
}

impl FuserConfig {
    pub fn validate(&self) -> Result<()> {
        if self.filter_window == 0 {
            return Err(FuserError::InvalidConfig("filter_window must be >= 1".into()));
        }
        if self.recovery_buffer < 2 {
            return Err(FuserError::InvalidConfig("recovery_buffer must be >= 2".into()));
        }
        for (name, value) in [("alpha_blending", self.alpha_blending), ("alpha_weight", self.alpha_weight)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(FuserError::InvalidConfig(format!("{name} must be in [0, 1], got {value}")));
            }
        }
        if !self.reduction_factor.is_finite() || self.reduction_factor < 0.0 {
            return Err(FuserError::InvalidConfig(format!(
                "reduction_factor must be finite and >= 0, got {}",
                self.reduction_factor
            )));
        }
        if !(self.median_exponent > 0.0 && self.median_exponent <= 2.0) {
            return Err(FuserError::InvalidConfig(format!(
                "median_exponent must be in (0, 2], got {}",
                self.median_exponent
            )));
        }
        if self.median_max_angular_update < 0.0 || self.median_max_iterations == 0 {
            return Err(FuserError::InvalidConfig(
                "median_max_angular_update must be >= 0 and median_max_iterations >= 1".into(),
            ));
        }
        Ok(())
    }

    /// Load a JSON config; missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn rotation_median(&self) -> RotationMedian {
        RotationMedian::new(
            self.median_exponent,
            self.median_max_angular_update,
            self.median_max_iterations,
        )
    }

    /// Camera weight for delta blending.
    ///
    /// LOST/LOW camera -> 0, MED -> `alpha_blending * alpha_weight`,
    /// OK -> `alpha_blending`; a LOST secondary forces 1.
    pub fn alpha_for(&self, camera: Quality, secondary: Quality) -> f64 {
        if secondary.is_lost() {
            return 1.0;
        }
        match camera {
            Quality::Lost | Quality::Low => 0.0,
            Quality::Med => self.alpha_blending * self.alpha_weight,
            Quality::Ok => self.alpha_blending,
        }
    }
}

// ─── Events ──────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq)]
pub enum FuserEvent {
    /// Secondary tracker re-anchored on the last published pose
    Recovered { anchor: Pose },
    RecoveryAborted,
    /// Fused-pose median pipeline switched off (smoothing takes over)
    FusedFilterReset,
    NanDetected { slot: &'static str },
}

// ─── Snapshot ────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FuserSnapshot {
    pub status: FuserStatus,
    pub counter: u64,
    pub camera_quality: Quality,
    pub secondary_quality: Quality,
    pub alpha: f64,
    pub recovered: bool,
    pub recover_steps: usize,
    pub fused_filter_active: bool,
    pub published: Pose,
    pub raw_fused: Pose,
    pub secondary: Pose,
    pub recovery_anchor: Pose,
    pub camera_delta: [f64; 7],
    pub secondary_delta: [f64; 7],
}

// ─── The fusion engine ───────────────────────────────────────────────────────

pub struct Fuser {
    config: FuserConfig,
    status: FuserStatus,
    counter: u64,

    // Per-step qualities (secondary after the recovery override)
    camera_quality: Quality,
    secondary_quality: Quality,
    alpha: f64,

    // Frame anchors and per-stream previous values
    first_camera: Pose,
    camera_prev: Pose,
    secondary_prev: Pose,
    secondary: Pose,

    // Fused output: raw integrated pose and published (filtered) pose
    fused: Pose,
    published: Pose,

    recovery: RecoveryTracker,
    secondary_window: PoseWindow,
    fused_window: PoseWindow,
    fused_filter_active: bool,

    camera_delta: PoseVec7,
    secondary_delta: PoseVec7,
}

impl Default for Fuser {
    fn default() -> Self {
        Self::new(FuserConfig::default())
    }
}

impl Fuser {
    pub fn new(config: FuserConfig) -> Self {
        let median = config.rotation_median();
        Self {
            status: FuserStatus::Uninitialized,
            counter: 0,
            camera_quality: Quality::Lost,
            secondary_quality: Quality::Lost,
            alpha: 0.0,
            first_camera: Pose::identity(),
            camera_prev: Pose::identity(),
            secondary_prev: Pose::identity(),
            secondary: Pose::identity(),
            fused: Pose::identity(),
            published: Pose::identity(),
            recovery: RecoveryTracker::new(config.recovery_buffer, config.filter_window),
            secondary_window: PoseWindow::new(config.filter_window, median),
            fused_window: PoseWindow::new(config.filter_window, median),
            fused_filter_active: false,
            camera_delta: PoseVec7::zeros(),
            secondary_delta: PoseVec7::zeros(),
            config,
        }
    }

    /// Validating constructor.
    pub fn try_new(config: FuserConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(config))
    }

    /// Run one fusion step. Always succeeds.
    pub fn fuse(&mut self, camera: &Pose, secondary: &Pose) -> bool {
        let _ = self.step(camera, secondary);
        true
    }

    /// Run one fusion step and report what happened.
    pub fn step(&mut self, camera: &Pose, secondary: &Pose) -> Vec<FuserEvent> {
        let mut events = Vec::new();
        let window = self.config.filter_window;

        // Qualities
        self.camera_quality = camera.quality;
        let secondary_now = secondary.quality;
        if self.status == FuserStatus::Uninitialized {
            self.first_camera = *camera;
        }

        // Recovery detection + re-anchoring
        let check = self.recovery.check(secondary_now, &self.published);
        self.secondary_quality = check.effective_quality;
        if check.recovered_now {
            events.push(FuserEvent::Recovered { anchor: *self.recovery.anchor_pose() });
        }
        if check.aborted_now {
            events.push(FuserEvent::RecoveryAborted);
        }

        let mut secondary_pose = *secondary;
        self.recovery.anchor(
            &mut secondary_pose,
            &mut self.secondary_prev,
            &self.first_camera,
            check.effective_quality,
        );

        // Secondary spike filtering (buffer-fill only until the window is full)
        let secondary_ready = self.secondary_window.is_full();
        self.secondary_window.push(secondary_pose);
        if secondary_ready {
            if let Some(filtered) = self.secondary_window.median() {
                secondary_pose = filtered;
            }
        }
        self.secondary = secondary_pose;
        let filters_ready = self.secondary_window.is_full();

        // Per-stream deltas; the first step measures from the identity pose
        let (camera_base, secondary_base) = match self.status {
            FuserStatus::Uninitialized => (Pose::identity(), Pose::identity()),
            FuserStatus::Running => (self.camera_prev, self.secondary_prev),
        };
        self.camera_delta = camera.to_vector() - camera_base.to_vector();
        self.secondary_delta = secondary_pose.to_vector() - secondary_base.to_vector();

        // Complementary blend of deltas, integrated componentwise
        self.alpha = self.config.alpha_for(self.camera_quality, self.secondary_quality);
        let blended = self.camera_delta * self.alpha + self.secondary_delta * (1.0 - self.alpha);
        let mut fused = Pose::from_vector(&(self.fused.to_vector() + blended), self.camera_quality);
        fused.canonicalize();

        // Published pose
        self.fused_window.push(fused);
        let median_active = filters_ready && self.recovery.recover_steps() > window;
        let mut published = fused;
        if median_active {
            if let Some(filtered) = self.fused_window.median() {
                published = filtered;
            }
        } else {
            if self.fused_filter_active {
                log::debug!("Fused median filter reset at step {}", self.counter);
                events.push(FuserEvent::FusedFilterReset);
            }
            if self.counter > window as u64 {
                published = self.smooth_reset(&fused);
            }
        }
        self.fused_filter_active = median_active;
        published.quality = self.camera_quality;
        published.canonicalize();

        // Bookkeeping
        self.camera_prev = *camera;
        self.secondary_prev = secondary_pose;
        self.fused = fused;
        self.published = published;
        events.extend(self.check_nan());

        self.recovery.record(secondary_now);
        if self.status == FuserStatus::Uninitialized {
            self.status = FuserStatus::Running;
        }
        self.counter += 1;

        events
    }

    /// Pull toward the previous published pose while the fused median
    /// pipeline refills; hold it outright if the secondary was lost at
    /// the start of the reset window.
    fn smooth_reset(&self, fused: &Pose) -> Pose {
        if self.recovery.reset_history_oldest() == Some(Quality::Lost) {
            return self.published;
        }
        match self.fused_window.get_back(1) {
            Some(buffered_prev) => {
                let pull = (buffered_prev.to_vector() - fused.to_vector()) * self.config.reduction_factor;
                Pose::from_vector(&(self.published.to_vector() + pull), fused.quality)
            }
            None => *fused,
        }
    }

    fn check_nan(&self) -> Vec<FuserEvent> {
        let slots: [(&'static str, &Pose); 4] = [
            ("camera_prev", &self.camera_prev),
            ("secondary_prev", &self.secondary_prev),
            ("fused_prev", &self.fused),
            ("published_prev", &self.published),
        ];

        let mut events = Vec::new();
        for (slot, pose) in slots {
            if pose.has_nan_rotation() {
                log::error!(
                    "NaN in {}: {},{},{},{}",
                    slot,
                    pose.rotation.w,
                    pose.rotation.i,
                    pose.rotation.j,
                    pose.rotation.k
                );
                events.push(FuserEvent::NanDetected { slot });
            }
        }
        events
    }

    // ── Queries ──────────────────────────────────────────────────────────

    /// Published (filtered) fused pose.
    pub fn fused_pose(&self) -> Pose {
        self.published
    }

    /// Raw delta-integrated fused pose, before output filtering.
    pub fn raw_fused_pose(&self) -> Pose {
        self.fused
    }

    /// Secondary pose after re-anchoring and median filtering.
    pub fn secondary_pose(&self) -> Pose {
        self.secondary
    }

    pub fn recovery_anchor(&self) -> Pose {
        *self.recovery.anchor_pose()
    }

    pub fn camera_delta(&self) -> PoseVec7 {
        self.camera_delta
    }

    pub fn secondary_delta(&self) -> PoseVec7 {
        self.secondary_delta
    }

    pub fn status(&self) -> FuserStatus {
        self.status
    }

    pub fn counter(&self) -> u64 {
        self.counter
    }

    pub fn last_alpha(&self) -> f64 {
        self.alpha
    }

    pub fn is_recovered(&self) -> bool {
        self.recovery.is_recovered()
    }

    pub fn config(&self) -> &FuserConfig {
        &self.config
    }

    pub fn snapshot(&self) -> FuserSnapshot {
        FuserSnapshot {
            status: self.status,
            counter: self.counter,
            camera_quality: self.camera_quality,
            secondary_quality: self.secondary_quality,
            alpha: self.alpha,
            recovered: self.recovery.is_recovered(),
            recover_steps: self.recovery.recover_steps(),
            fused_filter_active: self.fused_filter_active,
            published: self.published,
            raw_fused: self.fused,
            secondary: self.secondary,
            recovery_anchor: *self.recovery.anchor_pose(),
            camera_delta: self.camera_delta.into(),
            secondary_delta: self.secondary_delta.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Quat, Translation3, WQ, X};
    use approx::assert_relative_eq;

    fn cam(x: f64, quality: Quality) -> Pose {
        Pose::from_parts((x, 0.0, 0.0), (1.0, 0.0, 0.0, 0.0), quality)
    }

    #[test]
    fn test_alpha_table() {
        let config = FuserConfig::default();
        assert_eq!(config.alpha_for(Quality::Lost, Quality::Ok), 0.0);
        assert_eq!(config.alpha_for(Quality::Low, Quality::Ok), 0.0);
        assert_relative_eq!(config.alpha_for(Quality::Med, Quality::Ok), 0.525, epsilon = 1e-12);
        assert_eq!(config.alpha_for(Quality::Ok, Quality::Ok), 0.75);
        assert_eq!(config.alpha_for(Quality::Lost, Quality::Lost), 1.0);
        assert_eq!(config.alpha_for(Quality::Ok, Quality::Lost), 1.0);
    }

    #[test]
    fn test_config_validation() {
        assert!(FuserConfig::default().validate().is_ok());

        let bad = FuserConfig { filter_window: 0, ..FuserConfig::default() };
        assert!(matches!(bad.validate(), Err(FuserError::InvalidConfig(_))));

        let bad = FuserConfig { alpha_blending: 1.5, ..FuserConfig::default() };
        assert!(bad.validate().is_err());

        let bad = FuserConfig { median_exponent: 0.0, ..FuserConfig::default() };
        assert!(bad.validate().is_err());

        assert!(Fuser::try_new(FuserConfig { recovery_buffer: 1, ..FuserConfig::default() }).is_err());
    }

    #[test]
    fn test_config_partial_json_uses_defaults() {
        let config: FuserConfig = serde_json::from_str(r#"{ "filter_window": 7 }"#).unwrap();
        assert_eq!(config.filter_window, 7);
        assert_eq!(config.recovery_buffer, FuserConfig::default().recovery_buffer);
    }

    #[test]
    fn test_config_file_is_validated_on_load() {
        let path = std::env::temp_dir().join(format!("vo_fuser_config_{}.json", std::process::id()));
        std::fs::write(&path, r#"{ "alpha_blending": 0.4 }"#).unwrap();
        assert_eq!(FuserConfig::from_json_file(&path).unwrap().alpha_blending, 0.4);

        std::fs::write(&path, r#"{ "filter_window": 0 }"#).unwrap();
        assert!(matches!(FuserConfig::from_json_file(&path), Err(FuserError::InvalidConfig(_))));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_first_step_measures_from_identity() {
        let mut fuser = Fuser::default();
        assert_eq!(fuser.status(), FuserStatus::Uninitialized);

        let camera = Pose::from_parts((1.0, 2.0, 3.0), (0.9, 0.1, 0.3, 0.2), Quality::Ok);
        assert!(fuser.fuse(&camera, &Pose::identity()));

        assert_eq!(fuser.status(), FuserStatus::Running);
        assert_eq!(fuser.counter(), 1);
        assert_relative_eq!(fuser.camera_delta()[X], 1.0, epsilon = 1e-12);
        assert_relative_eq!(fuser.camera_delta()[WQ], -0.1, epsilon = 1e-12);
        // Secondary LOST -> camera only
        assert_eq!(fuser.last_alpha(), 1.0);
        assert_relative_eq!(fuser.raw_fused_pose().translation, camera.translation, epsilon = 1e-12);
        assert_relative_eq!(fuser.fused_pose().rotation.w, 0.9, epsilon = 1e-12);
    }

    #[test]
    fn test_blend_weights_camera_and_secondary() {
        let mut fuser = Fuser::default();
        fuser.fuse(&cam(0.0, Quality::Ok), &cam(0.0, Quality::Ok));
        // Camera moves 1.0, secondary moves 2.0
        fuser.fuse(&cam(1.0, Quality::Ok), &cam(2.0, Quality::Ok));

        assert_relative_eq!(fuser.last_alpha(), 0.75, epsilon = 1e-12);
        assert_relative_eq!(fuser.raw_fused_pose().translation.x, 0.75 + 0.25 * 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_secondary_anchored_on_first_camera() {
        let mut fuser = Fuser::default();
        let first = cam(3.0, Quality::Ok);
        fuser.fuse(&first, &cam(0.5, Quality::Ok));
        assert_relative_eq!(fuser.secondary_pose().translation.x, 3.5, epsilon = 1e-12);
    }

    #[test]
    fn test_nan_reported_not_fatal() {
        let mut fuser = Fuser::default();
        let bad = Pose::new(Translation3::zeros(), Quat::new(f64::NAN, 0.0, 0.0, 0.0), Quality::Ok);
        let events = fuser.step(&bad, &Pose::identity());
        assert!(events.contains(&FuserEvent::NanDetected { slot: "camera_prev" }));
        assert!(fuser.fuse(&cam(0.0, Quality::Ok), &Pose::identity()));
        assert_eq!(fuser.counter(), 2);
    }

    #[test]
    fn test_median_output_after_warm_up() {
        let config = FuserConfig { filter_window: 3, ..FuserConfig::default() };
        let mut fuser = Fuser::new(config);
        for i in 0..3 {
            fuser.fuse(&cam(i as f64, Quality::Ok), &Pose::identity());
            assert!(!fuser.snapshot().fused_filter_active || i == 2);
        }
        // Window [0, 1, 2] -> median 1
        assert!(fuser.snapshot().fused_filter_active);
        assert_relative_eq!(fuser.fused_pose().translation.x, 1.0, epsilon = 1e-12);
        assert_relative_eq!(fuser.raw_fused_pose().translation.x, 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_reset_smoothing_pulls_then_holds() {
        let config = FuserConfig {
            filter_window: 3,
            recovery_buffer: 4,
            reduction_factor: 0.5,
            ..FuserConfig::default()
        };
        let mut fuser = Fuser::new(config);
        let lost_at = [4, 9];

        let mut prev_published = Pose::identity();
        let mut prev_raw = Pose::identity();
        for i in 0..14 {
            let secondary = if lost_at.contains(&i) {
                Pose::identity()
            } else {
                cam(0.03 * i as f64, Quality::Ok)
            };
            let events = fuser.step(&cam(0.1 * i as f64, Quality::Ok), &secondary);
            let published = fuser.fused_pose();
            let raw = fuser.raw_fused_pose();

            match i {
                // Recovery turns the fused median off; output is pulled toward
                // the previous published pose by the buffered raw step
                8 => {
                    assert!(events.contains(&FuserEvent::FusedFilterReset));
                    assert!(!fuser.snapshot().fused_filter_active);
                    let expected = prev_published.translation + (prev_raw.translation - raw.translation) * 0.5;
                    assert_relative_eq!(published.translation, expected, epsilon = 1e-12);
                    assert!((published.translation - raw.translation).norm() > 1e-6);
                }
                // Oldest reset slot is the LOST sample from step 9: hold
                12 => {
                    assert!((raw.translation - prev_raw.translation).norm() > 1e-6);
                    assert_eq!(published.translation, prev_published.translation);
                }
                _ => {}
            }

            prev_published = published;
            prev_raw = raw;
        }
    }

    #[test]
    fn test_snapshot_serializes() {
        let mut fuser = Fuser::default();
        fuser.fuse(&cam(1.0, Quality::Med), &cam(1.0, Quality::Ok));
        let json = serde_json::to_value(fuser.snapshot()).unwrap();
        assert_eq!(json["counter"], 1);
        assert_eq!(json["camera_quality"], "MED");
    }
}
