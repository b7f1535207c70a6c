//! HapFlow Media - Hap movie sessions
//!
//! This crate connects a decode source to the upload path:
//! - Frame slot hand-off between decode and render threads
//! - The movie session and its lifecycle
//! - Decode collaborator traits and a test pattern source
//! - Playback framerate sampling

use hapflow_core::FourCc;
use hapflow_render::UploadError;
use thiserror::Error;

pub mod framerate;
pub mod movie;
pub mod slot;
pub mod source;

pub use framerate::FramerateTracker;
pub use movie::{HapMovie, MovieEvent, MovieStats, SourceInfo};
pub use slot::FrameSlot;
pub use source::{pixel_format_for, DecodeSource, FrameSink, SourceDescriptor, TestPatternSource};

/// Media errors
#[derive(Error, Debug)]
pub enum MediaError {
    #[error("Unsupported codec: {0}")]
    UnsupportedCodec(FourCc),

    #[error("Invalid source: {0}")]
    InvalidSource(String),

    #[error("Source already running")]
    AlreadyRunning,

    #[error("Failed to spawn decode thread: {0}")]
    DecodeThread(String),

    #[error(transparent)]
    Upload(#[from] UploadError),
}

/// Result type for media operations
pub type Result<T> = std::result::Result<T, MediaError>;
