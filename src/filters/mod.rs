pub mod median;
pub mod pose_window;
pub mod rotation;

pub use median::ScalarMedianFilter;
pub use pose_window::PoseWindow;
pub use rotation::{MedianSolution, RotationAverager, RotationMedian};
