//! bayerlink couples two independently-driven GStreamer pipelines: an
//! upstream source producing raw Bayer frames and a downstream sink
//! consuming converted RGB frames. The [`bridge::FrameBridge`] in between
//! negotiates the downstream format off the first frame, times a pluggable
//! [`transform::PixelTransform`] per frame and forwards the result.

pub mod bridge;
pub mod capture;
pub mod display;
pub mod frame;
pub mod stats;
pub mod transform;
pub mod utils;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::transform::Algorithm;

/// Run configuration, assembled once from the command line and handed by
/// reference to whoever needs it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub source: SourceConfig,
    pub sink: SinkConfig,
    pub algorithm: Algorithm,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Image file to decode into a Bayer stream; a synthetic test pattern
    /// is generated when absent.
    pub input: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// PNG file pattern to write converted frames to; frames go to a live
    /// display window when absent.
    pub output: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source: SourceConfig { input: None },
            sink: SinkConfig { output: None },
            algorithm: Algorithm::NearestNeighbor,
        }
    }
}
