//! Recorded sessions: the raw tracker frames fed to the pipeline plus what
//! it published, so a run can be replayed offline with another config.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::fuser::FuserConfig;
use crate::pipeline::PublishedPose;
use crate::types::TimedPose;

/// One pipeline input: a camera frame and the latest secondary sample.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionFrame {
    pub camera: TimedPose,
    pub secondary: TimedPose,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SessionLog {
    #[serde(default)]
    pub started_at: String,
    #[serde(default)]
    pub config: FuserConfig,
    pub frames: Vec<SessionFrame>,
    #[serde(default)]
    pub published: Vec<PublishedPose>,
}

impl SessionLog {
    pub fn new(started_at: impl Into<String>, config: FuserConfig) -> Self {
        Self {
            started_at: started_at.into(),
            config,
            frames: Vec::new(),
            published: Vec::new(),
        }
    }

    /// Load a `.json` or gzip-compressed `.json.gz` session.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        if path.extension().map(|e| e == "gz").unwrap_or(false) {
            let reader = BufReader::new(GzDecoder::new(file));
            Ok(serde_json::from_reader(reader)?)
        } else {
            Ok(serde_json::from_reader(BufReader::new(file))?)
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }
}
