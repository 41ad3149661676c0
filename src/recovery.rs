//! Secondary-tracker loss / re-acquisition handling.
//!
//! After the SLAM tracker loses and regains tracking its poses live in a
//! fresh, unrelated frame. Once a sustained OK run follows a loss, the
//! tracker is re-anchored onto the last published fused pose; until then,
//! any recent loss forces the secondary stream to be treated as LOST.

use crate::buffer::RingBuffer;
use crate::types::{Pose, Quality};

/// What the detection pass concluded for the current step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RecoveryCheck {
    /// Secondary quality after the trailing-loss override
    pub effective_quality: Quality,
    /// NORMAL -> RECOVERED fired this step
    pub recovered_now: bool,
    /// RECOVERED -> NORMAL fired this step
    pub aborted_now: bool,
}

#[derive(Clone, Debug)]
pub struct RecoveryTracker {
    history: RingBuffer<Quality>,
    reset_history: RingBuffer<Quality>,
    recovered: bool,
    first_recover: bool,
    recover_steps: usize,
    anchor: Pose,
}

impl RecoveryTracker {
    /// `recovery_buffer` sizes the quality history used for detection,
    /// `filter_window` the reset history used for output smoothing.
    pub fn new(recovery_buffer: usize, filter_window: usize) -> Self {
        Self {
            history: RingBuffer::new(recovery_buffer),
            reset_history: RingBuffer::new(filter_window),
            recovered: false,
            first_recover: true,
            recover_steps: filter_window + 1,
            anchor: Pose::identity(),
        }
    }

    /// Detection pass, run before the current quality is recorded.
    ///
    /// Fires RECOVERED when the history is full, `current` is OK, the oldest
    /// recorded sample is LOST and every other recorded sample is OK.
    /// Any LOST among the recorded samples after the oldest clears the
    /// recovered state and downgrades the effective quality to LOST.
    pub fn check(&mut self, current: Quality, last_published: &Pose) -> RecoveryCheck {
        let mut check = RecoveryCheck {
            effective_quality: current,
            recovered_now: false,
            aborted_now: false,
        };

        if !self.history.is_full() {
            return check;
        }

        let oldest_lost = self.history.oldest().is_some_and(|q| q.is_lost());
        let trailing_ok = self.history.iter().skip(1).all(|q| *q == Quality::Ok);
        if current == Quality::Ok && oldest_lost && trailing_ok {
            self.recovered = true;
            self.first_recover = true;
            self.anchor = *last_published;
            check.recovered_now = true;
            log::info!(
                "Secondary tracker recovered @ t=({:.4}, {:.4}, {:.4}) q=({:.4}, {:.4}, {:.4}, {:.4})",
                self.anchor.translation.x,
                self.anchor.translation.y,
                self.anchor.translation.z,
                self.anchor.rotation.w,
                self.anchor.rotation.i,
                self.anchor.rotation.j,
                self.anchor.rotation.k,
            );
        }

        if self.history.iter().skip(1).any(|q| q.is_lost()) {
            check.effective_quality = Quality::Lost;
            if self.recovered {
                check.aborted_now = true;
                log::debug!("Recovery cleared: loss inside trailing history");
            }
            self.recovered = false;
        }

        check
    }

    /// Re-express the secondary pose in the common frame.
    ///
    /// While recovered, both `secondary` and (on the first recovered step)
    /// `secondary_prev` are anchored on the recovery anchor. Otherwise a
    /// non-LOST pose is anchored on `first_camera`.
    pub fn anchor(
        &mut self,
        secondary: &mut Pose,
        secondary_prev: &mut Pose,
        first_camera: &Pose,
        effective_quality: Quality,
    ) {
        if self.recovered {
            secondary.re_anchor_to(&self.anchor);
            if self.first_recover {
                secondary_prev.re_anchor_to(&self.anchor);
                self.first_recover = false;
                self.recover_steps = 0;
            }
            self.recover_steps += 1;
        } else if !effective_quality.is_lost() {
            secondary.re_anchor_to(first_camera);
        }
    }

    /// Record the raw secondary quality of the completed step.
    pub fn record(&mut self, quality: Quality) {
        self.history.push(quality);
        self.reset_history.push(quality);
    }

    pub fn is_recovered(&self) -> bool {
        self.recovered
    }

    /// Steps spent in RECOVERED since the last transition.
    pub fn recover_steps(&self) -> usize {
        self.recover_steps
    }

    pub fn anchor_pose(&self) -> &Pose {
        &self.anchor
    }

    /// Oldest sample of the reset history (LOST gates output smoothing).
    pub fn reset_history_oldest(&self) -> Option<Quality> {
        self.reset_history.oldest().copied()
    }

    pub fn history(&self) -> &RingBuffer<Quality> {
        &self.history
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Quality::{Lost, Ok};

    const BUFFER: usize = 4;
    const WINDOW: usize = 3;

    /// Run a quality sequence through check + record, returning the step
    /// indices at which recovery fired.
    fn run(tracker: &mut RecoveryTracker, sequence: &[Quality]) -> Vec<usize> {
        let mut fired = Vec::new();
        for (i, q) in sequence.iter().enumerate() {
            if tracker.check(*q, &Pose::identity()).recovered_now {
                fired.push(i);
            }
            tracker.record(*q);
        }
        fired
    }

    #[test]
    fn test_no_detection_before_history_full() {
        let mut tracker = RecoveryTracker::new(BUFFER, WINDOW);
        assert!(run(&mut tracker, &[Lost, Ok, Ok, Ok]).is_empty());
        assert!(!tracker.is_recovered());
    }

    #[test]
    fn test_sustained_reacquisition_fires_once() {
        let mut tracker = RecoveryTracker::new(BUFFER, WINDOW);
        let mut seq = vec![Ok; BUFFER];
        seq.push(Lost);
        seq.extend(std::iter::repeat(Ok).take(BUFFER + 3));
        let fired = run(&mut tracker, &seq);
        // LOST at index 4; it is the oldest slot once BUFFER-1 OKs follow it,
        // so the check at the BUFFER-th OK (index 4 + BUFFER) fires.
        assert_eq!(fired, vec![BUFFER + BUFFER]);
        assert!(tracker.is_recovered());
    }

    #[test]
    fn test_flicker_does_not_recover() {
        let mut tracker = RecoveryTracker::new(BUFFER, WINDOW);
        let mut seq = vec![Ok; BUFFER];
        seq.extend([Lost, Ok]);
        assert!(run(&mut tracker, &seq).is_empty());
        assert!(!tracker.is_recovered());
    }

    #[test]
    fn test_trailing_loss_forces_lost_and_clears() {
        let mut tracker = RecoveryTracker::new(BUFFER, WINDOW);
        let mut seq = vec![Ok; BUFFER];
        seq.push(Lost);
        seq.extend(std::iter::repeat(Ok).take(BUFFER));
        run(&mut tracker, &seq);
        assert!(tracker.is_recovered());

        tracker.record(Lost);
        let check = tracker.check(Ok, &Pose::identity());
        assert_eq!(check.effective_quality, Lost);
        assert!(check.aborted_now);
        assert!(!tracker.is_recovered());
    }

    #[test]
    fn test_anchor_uses_captured_pose_and_counts_steps() {
        let mut tracker = RecoveryTracker::new(BUFFER, WINDOW);
        let anchor = Pose::from_parts((5.0, 0.0, 0.0), (1.0, 0.0, 0.0, 0.0), Ok);
        let mut seq = vec![Ok; BUFFER];
        seq.push(Lost);
        seq.extend(std::iter::repeat(Ok).take(BUFFER - 1));
        run(&mut tracker, &seq);

        let check = tracker.check(Ok, &anchor);
        assert!(check.recovered_now);
        assert_eq!(tracker.anchor_pose(), &anchor);

        let first_camera = Pose::identity();
        let mut secondary = Pose::from_parts((1.0, 0.0, 0.0), (1.0, 0.0, 0.0, 0.0), Ok);
        let mut secondary_prev = Pose::identity();
        tracker.anchor(&mut secondary, &mut secondary_prev, &first_camera, check.effective_quality);
        assert_eq!(secondary.translation.x, 6.0);
        assert_eq!(secondary_prev.translation.x, 5.0);
        assert_eq!(tracker.recover_steps(), 1);

        // Subsequent steps leave the previous pose alone
        let mut secondary_prev = Pose::identity();
        let mut secondary = Pose::identity();
        tracker.anchor(&mut secondary, &mut secondary_prev, &first_camera, Ok);
        assert_eq!(secondary_prev.translation.x, 0.0);
        assert_eq!(tracker.recover_steps(), 2);
    }

    #[test]
    fn test_normal_anchor_on_first_camera_unless_lost() {
        let mut tracker = RecoveryTracker::new(BUFFER, WINDOW);
        let first_camera = Pose::from_parts((0.0, 2.0, 0.0), (1.0, 0.0, 0.0, 0.0), Ok);
        let mut prev = Pose::identity();

        let mut secondary = Pose::identity();
        tracker.anchor(&mut secondary, &mut prev, &first_camera, Ok);
        assert_eq!(secondary.translation.y, 2.0);

        let mut lost = Pose::identity();
        tracker.anchor(&mut lost, &mut prev, &first_camera, Lost);
        assert_eq!(lost.translation.y, 0.0);
        assert_eq!(tracker.recover_steps(), WINDOW + 1);
    }

    #[test]
    fn test_reset_history_tracks_window() {
        let mut tracker = RecoveryTracker::new(BUFFER, WINDOW);
        assert_eq!(tracker.reset_history_oldest(), None);
        for q in [Lost, Ok, Ok, Ok] {
            tracker.record(q);
        }
        assert_eq!(tracker.reset_history_oldest(), Some(Ok));
        assert_eq!(tracker.history().oldest(), Some(&Lost));
    }
}
