//! vpcc - A video-based point cloud codec written in Rust
//!
//! vpcc implements the patch/occupancy metadata protocol of a video-based
//! point cloud codec: point clouds are projected onto 2D patches, packed into
//! video frames, and the per-frame patch layout, block ownership, and
//! occupancy map travel in an arithmetic-coded side stream next to the video
//! sub-streams.
//!
//! # Architecture
//!
//! vpcc is organized into several key modules:
//!
//! - `bitstream`: Plain little-endian byte stream reading and writing
//! - `entropy`: Adaptive binary/multi-symbol arithmetic coding engine
//! - `patch`: Patch geometry and projection-axis handling
//! - `metadata`: Scale/offset/rotation metadata shared by GOF, frame, and patch
//! - `context`: Decoded state of a group of frames
//! - `video`: Video sub-stream collaborator interface
//! - `reconstruct`: Point cloud reconstruction collaborator interface
//! - `decoder`: Patch/occupancy protocol decoder
//! - `encoder`: Patch/occupancy protocol encoder

pub mod bitstream;
pub mod context;
pub mod decoder;
pub mod encoder;
pub mod entropy;
pub mod error;
pub mod metadata;
pub mod patch;
pub mod reconstruct;
pub mod video;

pub use context::{FrameContext, GofContext, MissedPointsPatch};
pub use decoder::{Decoder, DecoderParams};
pub use encoder::{Encoder, EncoderParams};
pub use error::{Error, Result};
pub use patch::Patch;

/// vpcc version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const VERSION_MAJOR: u32 = 0;
pub const VERSION_MINOR: u32 = 1;
pub const VERSION_PATCH: u32 = 0;

/// Configuration for the vpcc library
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum number of threads to use for parallel processing
    pub max_threads: Option<usize>,
    /// Enable verbose logging
    pub verbose: bool,
    /// Enable debug output
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_threads: None,
            verbose: false,
            debug: false,
        }
    }
}

/// Initialize the vpcc library with the given configuration
pub fn init(config: Config) -> Result<()> {
    // Initialize thread pool if max_threads is specified
    if let Some(threads) = config.max_threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .map_err(|e| Error::Init(format!("Failed to initialize thread pool: {}", e)))?;
    }

    // Initialize logging
    if config.verbose || config.debug {
        let level = if config.debug { "debug" } else { "info" };
        tracing_subscriber::fmt().with_env_filter(level).init();
    }

    Ok(())
}
