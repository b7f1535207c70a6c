//! DXT/BCn format resolution
//!
//! Hap frames arrive in one of two block-compressed families:
//! - BC1 (DXT1) - Hap, 4 bits per pixel
//! - BC3 (DXT5) - Hap Alpha and Hap Q, 8 bits per pixel
//!
//! Hap Q shares the BC3 representation; its YCoCg channel layout is decoded
//! in the fragment shader, never during upload.

use crate::{Result, UploadError};
use hapflow_core::{PixelFormatTag, BLOCK_DIMENSION};

/// Bytes per 4x4 block
pub const BC1_BLOCK_BYTES: u32 = 8;
pub const BC3_BLOCK_BYTES: u32 = 16;

/// Block-compressed layout of an uploaded frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DxtFormat {
    Bc1,
    /// Also carries Hap Q's scaled YCoCg
    Bc3,
}

impl DxtFormat {
    pub fn wgpu_format(&self) -> wgpu::TextureFormat {
        match self {
            Self::Bc1 => wgpu::TextureFormat::Bc1RgbaUnorm,
            Self::Bc3 => wgpu::TextureFormat::Bc3RgbaUnorm,
        }
    }

    /// Map a wgpu texture format back, for validating host textures
    pub fn from_wgpu_format(format: wgpu::TextureFormat) -> Option<Self> {
        match format {
            wgpu::TextureFormat::Bc1RgbaUnorm | wgpu::TextureFormat::Bc1RgbaUnormSrgb => {
                Some(Self::Bc1)
            }
            wgpu::TextureFormat::Bc3RgbaUnorm | wgpu::TextureFormat::Bc3RgbaUnormSrgb => {
                Some(Self::Bc3)
            }
            _ => None,
        }
    }

    pub fn block_size(&self) -> u32 {
        match self {
            Self::Bc1 => BC1_BLOCK_BYTES,
            Self::Bc3 => BC3_BLOCK_BYTES,
        }
    }

    pub fn bits_per_pixel(&self) -> u32 {
        self.block_size() * 8 / (BLOCK_DIMENSION * BLOCK_DIMENSION)
    }

    /// Bytes in one row of blocks spanning `width` pixels
    pub fn bytes_per_block_row(&self, width: u32) -> u32 {
        width.div_ceil(BLOCK_DIMENSION) * self.block_size()
    }

    /// Bytes of block data covering `width`x`height`, partial blocks rounded up
    pub fn calculate_size(&self, width: u32, height: u32) -> usize {
        let blocks_x = width.div_ceil(BLOCK_DIMENSION) as usize;
        let blocks_y = height.div_ceil(BLOCK_DIMENSION) as usize;
        blocks_x * blocks_y * self.block_size() as usize
    }
}

/// GPU representation of a frame's pixel format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedFormat {
    pub format: DxtFormat,
    pub bits_per_pixel: u32,
    /// Blocks hold scaled YCoCg rather than RGB(A)
    pub ycocg: bool,
}

/// Resolve a decoder pixel format to its GPU format.
///
/// Unknown formats are rejected; the caller drops the frame.
pub fn resolve(tag: PixelFormatTag) -> Result<ResolvedFormat> {
    let (format, ycocg) = match tag {
        PixelFormatTag::RgbDxt1 => (DxtFormat::Bc1, false),
        PixelFormatTag::RgbaDxt5 => (DxtFormat::Bc3, false),
        PixelFormatTag::YCoCgDxt5 => (DxtFormat::Bc3, true),
        PixelFormatTag::Other(_) => return Err(UploadError::UnsupportedFormat(tag)),
    };
    Ok(ResolvedFormat {
        format,
        bits_per_pixel: format.bits_per_pixel(),
        ycocg,
    })
}

/// Whether `adapter` can sample BCn textures at all
pub fn check_bc_support(adapter: &wgpu::Adapter) -> bool {
    adapter
        .features()
        .contains(wgpu::Features::TEXTURE_COMPRESSION_BC)
}
