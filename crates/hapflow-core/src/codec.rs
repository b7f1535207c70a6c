//! Hap codec identification
//!
//! A Hap stream is one of three variants:
//! - Hap: DXT1 (BC1), RGB, no alpha
//! - Hap Alpha: DXT5 (BC3), RGBA
//! - Hap Q: scaled YCoCg stored in DXT5, decoded to RGB in the fragment shader

use serde::{Deserialize, Serialize};
use std::fmt;

/// Four-character code as found in container sample descriptions and
/// decoder pixel buffers.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourCc(pub u32);

impl FourCc {
    pub const fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(u32::from_be_bytes(bytes))
    }

    pub const fn to_bytes(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.to_bytes() {
            if byte.is_ascii_graphic() || byte == b' ' {
                write!(f, "{}", byte as char)?;
            } else {
                write!(f, "\\x{:02x}", byte)?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FourCc('{}')", self)
    }
}

/// Hap codec variant of an opened source.
///
/// Resolved once per source from the video track's codec type and immutable
/// for the lifetime of that source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodecVariant {
    /// `Hap1` - DXT1, RGB
    Base,
    /// `Hap5` - DXT5, RGBA
    Alpha,
    /// `HapY` - scaled YCoCg in DXT5
    Quality,
    #[default]
    Unsupported,
}

impl CodecVariant {
    pub const HAP: FourCc = FourCc::from_bytes(*b"Hap1");
    pub const HAP_ALPHA: FourCc = FourCc::from_bytes(*b"Hap5");
    pub const HAP_Q: FourCc = FourCc::from_bytes(*b"HapY");

    /// Classify a container codec type.
    pub fn from_fourcc(code: FourCc) -> Self {
        match code {
            Self::HAP => Self::Base,
            Self::HAP_ALPHA => Self::Alpha,
            Self::HAP_Q => Self::Quality,
            _ => Self::Unsupported,
        }
    }

    /// Classify a decoder codec name (as reported by FFmpeg-style demuxers).
    pub fn from_codec_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "hap" => Self::Base,
            "hap_alpha" => Self::Alpha,
            "hapq" | "hap_q" => Self::Quality,
            _ => Self::Unsupported,
        }
    }

    /// The container codec type of this variant.
    pub fn fourcc(&self) -> Option<FourCc> {
        match self {
            Self::Base => Some(Self::HAP),
            Self::Alpha => Some(Self::HAP_ALPHA),
            Self::Quality => Some(Self::HAP_Q),
            Self::Unsupported => None,
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Unsupported)
    }

    /// Returns true if frames must be converted from YCoCg in the shader
    pub fn needs_ycocg_conversion(&self) -> bool {
        matches!(self, Self::Quality)
    }

    pub fn has_alpha(&self) -> bool {
        matches!(self, Self::Alpha)
    }
}

impl fmt::Display for CodecVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Base => "Hap",
            Self::Alpha => "Hap Alpha",
            Self::Quality => "Hap Q",
            Self::Unsupported => "unsupported",
        };
        f.write_str(name)
    }
}
