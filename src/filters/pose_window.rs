use crate::buffer::RingBuffer;
use crate::filters::median::ScalarMedianFilter;
use crate::filters::rotation::RotationMedian;
use crate::types::{Pose, Quat};

/// Ring buffer of the last N poses with a median bank on top:
/// one [`ScalarMedianFilter`] per translation axis and a
/// [`RotationMedian`] over the buffered rotations.
#[derive(Clone, Debug)]
pub struct PoseWindow {
    poses: RingBuffer<Pose>,
    axes: [ScalarMedianFilter; 3],
    rotation_median: RotationMedian,
    rotations: Vec<Quat>,
}

impl PoseWindow {
    pub fn new(window_size: usize, rotation_median: RotationMedian) -> Self {
        Self {
            poses: RingBuffer::new(window_size),
            axes: [
                ScalarMedianFilter::new(window_size),
                ScalarMedianFilter::new(window_size),
                ScalarMedianFilter::new(window_size),
            ],
            rotation_median,
            rotations: Vec::with_capacity(window_size.max(1)),
        }
    }

    pub fn push(&mut self, pose: Pose) {
        self.poses.push(pose);
        for (axis, filter) in self.axes.iter_mut().enumerate() {
            filter.add_sample(pose.translation[axis]);
        }
    }

    /// Median pose of the window. Quality and any rotation the median
    /// cannot resolve are taken from the newest sample.
    pub fn median(&mut self) -> Option<Pose> {
        let newest = *self.poses.newest()?;

        self.rotations.clear();
        self.rotations.extend(self.poses.iter().map(|p| p.rotation));

        let mut filtered = newest;
        for (axis, filter) in self.axes.iter_mut().enumerate() {
            filtered.translation[axis] = filter.median();
        }
        if let Some(rotation) = self.rotation_median.median(&self.rotations) {
            filtered.rotation = rotation;
        }
        Some(filtered)
    }

    /// `i` steps back from the newest pose (0 = newest).
    pub fn get_back(&self, i: usize) -> Option<&Pose> {
        self.poses.get_back(i)
    }

    pub fn len(&self) -> usize {
        self.poses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.poses.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.poses.is_full()
    }

    pub fn capacity(&self) -> usize {
        self.poses.capacity()
    }
}
