//! Program selection and draw planning

use crate::upload::FrameTexture;
use glam::Vec2;
use hapflow_core::{CodecVariant, Rect};

/// Solid color shown while no frame has been published
pub const PLACEHOLDER_COLOR: [f32; 4] = [0.0, 1.0, 0.0, 1.0];

/// Fragment program used to sample a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgramKind {
    /// Sample RGB(A) blocks directly
    Passthrough,
    /// Rebuild RGB from scaled YCoCg stored in DXT5 blocks
    YCoCgDecode,
}

impl ProgramKind {
    pub fn fragment_entry_point(&self) -> &'static str {
        match self {
            Self::Passthrough => "fs_passthrough",
            Self::YCoCgDecode => "fs_ycocg",
        }
    }
}

/// Pick the program for a codec variant
pub fn select_program(codec: CodecVariant) -> ProgramKind {
    if codec.needs_ycocg_conversion() {
        ProgramKind::YCoCgDecode
    } else {
        ProgramKind::Passthrough
    }
}

/// What a single draw call does
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DrawCommand {
    Placeholder {
        rect: Rect,
    },
    Textured {
        program: ProgramKind,
        rect: Rect,
        uv_scale: [f32; 2],
    },
}

impl DrawCommand {
    /// Plan the draw of `frame` (if any) into `viewport`.
    ///
    /// The frame keeps its aspect ratio and is centered; texture coordinates
    /// stop at the visible size so backing padding is never sampled.
    pub fn plan<T>(frame: Option<&FrameTexture<T>>, program: ProgramKind, viewport: Rect) -> Self {
        match frame {
            None => Self::Placeholder { rect: viewport },
            Some(frame) => {
                let (width, height) = frame.visible_size();
                Self::Textured {
                    program,
                    rect: viewport.centered_fit(Vec2::new(width as f32, height as f32)),
                    uv_scale: frame.uv_scale(),
                }
            }
        }
    }

    pub fn rect(&self) -> Rect {
        match self {
            Self::Placeholder { rect } | Self::Textured { rect, .. } => *rect,
        }
    }
}
