//! Decoded frame descriptors
//!
//! A [`FrameDescriptor`] describes one block-compressed frame exactly as the
//! decode collaborator hands it over. It borrows the decoder's buffer, so it
//! cannot outlive the new-frame callback it was created in.

use crate::codec::FourCc;
use std::fmt;

/// Compressed formats store 4x4 pixel blocks
pub const BLOCK_DIMENSION: u32 = 4;

/// Pixel format of a decoded frame buffer.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormatTag {
    /// `DXt1` - RGB in DXT1
    RgbDxt1,
    /// `DXT5` - RGBA in DXT5
    RgbaDxt5,
    /// `DYt5` - scaled YCoCg in DXT5
    YCoCgDxt5,
    /// Anything the decoder reports that is not a Hap texture format
    Other(FourCc),
}

impl PixelFormatTag {
    pub const RGB_DXT1: FourCc = FourCc::from_bytes(*b"DXt1");
    pub const RGBA_DXT5: FourCc = FourCc::from_bytes(*b"DXT5");
    pub const YCOCG_DXT5: FourCc = FourCc::from_bytes(*b"DYt5");

    pub fn from_fourcc(code: FourCc) -> Self {
        match code {
            Self::RGB_DXT1 => Self::RgbDxt1,
            Self::RGBA_DXT5 => Self::RgbaDxt5,
            Self::YCOCG_DXT5 => Self::YCoCgDxt5,
            other => Self::Other(other),
        }
    }

    pub fn fourcc(&self) -> FourCc {
        match self {
            Self::RgbDxt1 => Self::RGB_DXT1,
            Self::RgbaDxt5 => Self::RGBA_DXT5,
            Self::YCoCgDxt5 => Self::YCOCG_DXT5,
            Self::Other(code) => *code,
        }
    }
}

impl fmt::Debug for PixelFormatTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RgbDxt1 => f.write_str("RgbDxt1"),
            Self::RgbaDxt5 => f.write_str("RgbaDxt5"),
            Self::YCoCgDxt5 => f.write_str("YCoCgDxt5"),
            Self::Other(code) => write!(f, "Other('{}')", code),
        }
    }
}

impl fmt::Display for PixelFormatTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.fourcc())
    }
}

/// One decoded, still block-compressed frame.
///
/// `width`/`height` are the visible size; the padded size adds the decoder's
/// extra right/bottom pixels and is what actually gets uploaded.
#[derive(Clone, Copy)]
pub struct FrameDescriptor<'a> {
    pub width: u32,
    pub height: u32,
    pub padded_width: u32,
    pub padded_height: u32,
    pub pixel_format: PixelFormatTag,
    /// Compressed blocks, valid until the callback returns
    pub data: &'a [u8],
}

impl<'a> FrameDescriptor<'a> {
    /// Describe a frame whose padding is the visible size rounded up to
    /// whole blocks.
    pub fn new(width: u32, height: u32, pixel_format: PixelFormatTag, data: &'a [u8]) -> Self {
        Self {
            width,
            height,
            padded_width: align_to_block(width),
            padded_height: align_to_block(height),
            pixel_format,
            data,
        }
    }

    /// Describe a frame with explicit extended pixels on the right and bottom.
    ///
    /// Sizes that overflow saturate, which leaves the frame misaligned.
    pub fn with_extended_pixels(
        width: u32,
        height: u32,
        extra_right: u32,
        extra_bottom: u32,
        pixel_format: PixelFormatTag,
        data: &'a [u8],
    ) -> Self {
        Self {
            width,
            height,
            padded_width: width.saturating_add(extra_right),
            padded_height: height.saturating_add(extra_bottom),
            pixel_format,
            data,
        }
    }

    pub fn byte_length(&self) -> usize {
        self.data.len()
    }

    /// Valid block-compressed data is a multiple of 4 wide and high
    pub fn is_block_aligned(&self) -> bool {
        self.padded_width > 0
            && self.padded_height > 0
            && self.padded_width % BLOCK_DIMENSION == 0
            && self.padded_height % BLOCK_DIMENSION == 0
    }

    /// Bytes the padded frame occupies at `bits_per_pixel`.
    ///
    /// The decoder's reported bytes-per-row is ignored; rows are tightly
    /// packed blocks.
    pub fn expected_byte_length(&self, bits_per_pixel: u32) -> usize {
        let bytes_per_row = (self.padded_width as usize * bits_per_pixel as usize) / 8;
        bytes_per_row * self.padded_height as usize
    }
}

impl fmt::Debug for FrameDescriptor<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameDescriptor")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("padded_width", &self.padded_width)
            .field("padded_height", &self.padded_height)
            .field("pixel_format", &self.pixel_format)
            .field("byte_length", &self.data.len())
            .finish()
    }
}

/// Round a dimension up to whole compression blocks
pub fn align_to_block(value: u32) -> u32 {
    value.div_ceil(BLOCK_DIMENSION).saturating_mul(BLOCK_DIMENSION)
}
