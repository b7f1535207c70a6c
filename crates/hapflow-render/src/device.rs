//! Texture device abstraction.
//!
//! The upload path only needs two things from a graphics API: create an
//! empty compressed texture and overwrite its top-left region with blocks.

use crate::format::DxtFormat;
use thiserror::Error;

/// Errors reported by a texture device
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeviceError {
    #[error("Graphics API error: {0}")]
    Api(String),

    #[error("Device lost")]
    Lost,

    #[error("Unsupported: {0}")]
    Unsupported(String),
}

/// Parameters of a backing texture allocation.
///
/// The texture is declared without initial contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackingDescriptor<'a> {
    pub label: Option<&'a str>,
    pub width: u32,
    pub height: u32,
    pub format: DxtFormat,
}

/// Region written by a compressed sub-image update, anchored at (0, 0).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRegion {
    pub width: u32,
    pub height: u32,
    pub format: DxtFormat,
}

impl BlockRegion {
    pub fn bytes_per_row(&self) -> u32 {
        self.format.bytes_per_block_row(self.width)
    }

    pub fn block_rows(&self) -> u32 {
        self.height.div_ceil(hapflow_core::BLOCK_DIMENSION)
    }

    pub fn byte_length(&self) -> usize {
        self.format.calculate_size(self.width, self.height)
    }
}

/// Trait for texture devices
pub trait TextureDevice: Send + Sync + 'static {
    /// Texture handle; cloning yields another reference to the same texture
    type Texture: Clone + Send + Sync + std::fmt::Debug + 'static;

    fn create_texture(&self, desc: &BackingDescriptor<'_>) -> Result<Self::Texture, DeviceError>;

    /// Overwrite `region` of `texture` with tightly packed block rows.
    fn write_blocks(
        &self,
        texture: &Self::Texture,
        region: &BlockRegion,
        data: &[u8],
    ) -> Result<(), DeviceError>;
}
