//! HapFlow Render - Compressed frame upload and drawing
//!
//! This crate moves block-compressed Hap frames into GPU textures without
//! expanding pixels on the host:
//! - Pixel format to GPU format resolution
//! - Power-of-two backing texture allocation
//! - Bounds-checked sub-image upload into owned or host-supplied textures
//! - Program selection and the textured quad draw
//!
//! GPU access goes through the [`TextureDevice`] trait, implemented by the
//! wgpu backend and by a headless CPU-side device.

use hapflow_core::PixelFormatTag;
use thiserror::Error;

pub mod backend;
pub mod backing;
pub mod device;
pub mod external;
pub mod format;
pub mod headless;
pub mod program;
pub mod renderer;
pub mod upload;

pub use backend::{WgpuDevice, WgpuTexture};
pub use backing::{backing_dimension, BackingAllocator, BackingTexture, FrameExtent};
pub use device::{BackingDescriptor, BlockRegion, DeviceError, TextureDevice};
pub use external::{ExternalTarget, ExternalTextureAdapter, ExternalTextureBinding, GraphicsApiKind};
pub use format::{check_bc_support, resolve, DxtFormat, ResolvedFormat};
pub use headless::{HeadlessDevice, HeadlessTexture};
pub use program::{select_program, DrawCommand, ProgramKind, PLACEHOLDER_COLOR};
pub use renderer::FrameRenderer;
pub use upload::{DestinationKind, FailureTracker, FrameTexture, UploadEngine, UploadTarget};

/// Upload and binding errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UploadError {
    #[error("Unsupported pixel format: {0}")]
    UnsupportedFormat(PixelFormatTag),

    #[error("Frame {width}x{height} is not a whole number of 4x4 blocks")]
    MisalignedFrame { width: u32, height: u32 },

    #[error("Frame buffer too small: needed {expected} bytes, got {actual}")]
    TruncatedFrame { expected: usize, actual: usize },

    #[error("Frame {frame_width}x{frame_height} does not fit external texture {target_width}x{target_height}")]
    DestinationTooSmall {
        frame_width: u32,
        frame_height: u32,
        target_width: u32,
        target_height: u32,
    },

    #[error("External texture is {expected:?} but frame is {actual:?}")]
    IncompatibleFormat { expected: DxtFormat, actual: DxtFormat },

    #[error("No external texture bound")]
    NotBound,

    #[error("External texture already received frames; reset the session before rebinding")]
    RebindNotSupported,

    #[error("Graphics API failure: {0}")]
    GraphicsApiFailure(String),

    #[error("Playback degraded after {consecutive_failures} consecutive upload failures: {message}")]
    PlaybackDegraded {
        consecutive_failures: u32,
        message: String,
    },

    #[error("Graphics device lost")]
    DeviceLost,
}

impl UploadError {
    /// Validation failures drop the frame and leave the previous one displayed
    pub fn is_frame_local(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedFormat(_)
                | Self::MisalignedFrame { .. }
                | Self::TruncatedFrame { .. }
                | Self::DestinationTooSmall { .. }
                | Self::IncompatibleFormat { .. }
                | Self::NotBound
        )
    }

    /// Level the error is reported at when a frame is dropped
    pub fn severity(&self) -> tracing::Level {
        match self {
            Self::MisalignedFrame { .. } | Self::PlaybackDegraded { .. } | Self::DeviceLost => {
                tracing::Level::ERROR
            }
            Self::RebindNotSupported => tracing::Level::ERROR,
            _ => tracing::Level::WARN,
        }
    }
}

/// Result type for upload operations
pub type Result<T> = std::result::Result<T, UploadError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_errors_are_frame_local() {
        assert!(UploadError::MisalignedFrame {
            width: 5,
            height: 4
        }
        .is_frame_local());
        assert!(UploadError::NotBound.is_frame_local());
        assert!(!UploadError::GraphicsApiFailure("oom".into()).is_frame_local());
        assert!(!UploadError::RebindNotSupported.is_frame_local());
        assert!(!UploadError::DeviceLost.is_frame_local());
    }

    #[test]
    fn test_misaligned_reported_as_error() {
        assert_eq!(
            UploadError::MisalignedFrame {
                width: 5,
                height: 4
            }
            .severity(),
            tracing::Level::ERROR
        );
        assert_eq!(
            UploadError::TruncatedFrame {
                expected: 8,
                actual: 4
            }
            .severity(),
            tracing::Level::WARN
        );
    }
}
