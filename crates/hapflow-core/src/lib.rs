//! HapFlow Core - Data model and configuration
//!
//! This crate holds the types shared between the upload path and the
//! playback session:
//! - Frame descriptors handed over by the decode collaborator
//! - Hap codec variants and pixel format tags
//! - Viewport geometry used when drawing frames
//! - Configuration for logging and streaming

pub mod codec;
pub mod config;
pub mod frame;
pub mod geometry;

pub use codec::{CodecVariant, FourCc};
pub use config::{ConfigError, LogConfig, PlaybackConfig, PlayerConfig, StreamConfig};
pub use frame::{FrameDescriptor, PixelFormatTag, BLOCK_DIMENSION};
pub use geometry::Rect;
