//! Visual-odometry pose fuser.
//!
//! Blends a camera-VO pose stream with a SLAM pose stream into one
//! published 6-DoF pose per camera frame: secondary samples are
//! extrapolated onto camera timestamps, both streams contribute
//! quality-weighted pose deltas, median filters suppress spikes, and a
//! lost-then-reacquired SLAM tracker is re-anchored on the fused pose.

pub mod buffer;
pub mod error;
pub mod filters;
pub mod fuser;
pub mod interpolation;
pub mod live_status;
pub mod pipeline;
pub mod recovery;
pub mod session;
pub mod synchronizer;
pub mod trackers;
pub mod types;

pub use error::{FuserError, Result};
pub use fuser::{Fuser, FuserConfig, FuserEvent, FuserSnapshot};
pub use pipeline::{crop_point_cloud, ChannelSink, Pipeline, PipelineConfig, PoseSink, PublishedPose, VecSink};
pub use synchronizer::synchronize;
pub use types::{FuserStatus, Pose, Quality, TimedPose};
