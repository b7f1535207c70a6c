//! Host-owned texture targets
//!
//! When running inside a foreign host (a game engine loading us as a plugin),
//! frames are written into a texture the host created and shared with us.
//! We never resize or free it. The host can revoke it at any time through a
//! device-lost or shutdown notification, after which the handle is dropped
//! and no further uploads touch it.

use crate::format::DxtFormat;
use crate::{Result, UploadError};
use tracing::{info, warn};

/// Graphics API the host texture belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GraphicsApiKind {
    OpenGl,
    Direct3D11,
    Direct3D12,
    Metal,
    Vulkan,
}

/// A texture handle supplied by the host, with the size it was created at
#[derive(Debug, Clone)]
pub struct ExternalTextureBinding<T> {
    pub handle: T,
    pub width: u32,
    pub height: u32,
    pub api: GraphicsApiKind,
    /// Compressed format the host created the texture with, if it told us
    pub format: Option<DxtFormat>,
}

/// A bound host texture plus the state the upload path tracks for it
#[derive(Debug)]
pub struct ExternalTarget<T> {
    handle: Option<T>,
    width: u32,
    height: u32,
    api: GraphicsApiKind,
    format: Option<DxtFormat>,
    has_content: bool,
}

impl<T: Clone> ExternalTarget<T> {
    fn new(binding: ExternalTextureBinding<T>) -> Self {
        Self {
            handle: Some(binding.handle),
            width: binding.width,
            height: binding.height,
            api: binding.api,
            format: binding.format,
            has_content: false,
        }
    }

    /// False once the host revoked the texture
    pub fn is_valid(&self) -> bool {
        self.handle.is_some()
    }

    pub fn has_content(&self) -> bool {
        self.has_content
    }

    pub fn declared_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn api(&self) -> GraphicsApiKind {
        self.api
    }

    /// Check that a padded frame in `format` can be written, returning the
    /// handle to write into.
    pub fn check_capacity(
        &self,
        padded_width: u32,
        padded_height: u32,
        format: DxtFormat,
    ) -> Result<&T> {
        let handle = self.handle.as_ref().ok_or(UploadError::DeviceLost)?;

        if let Some(expected) = self.format {
            if expected != format {
                return Err(UploadError::IncompatibleFormat {
                    expected,
                    actual: format,
                });
            }
        }

        if padded_width > self.width || padded_height > self.height {
            return Err(UploadError::DestinationTooSmall {
                frame_width: padded_width,
                frame_height: padded_height,
                target_width: self.width,
                target_height: self.height,
            });
        }

        Ok(handle)
    }

    pub(crate) fn mark_has_content(&mut self) {
        self.has_content = true;
    }
}

/// Holds at most one host texture binding for a session
#[derive(Debug)]
pub struct ExternalTextureAdapter<T> {
    target: Option<ExternalTarget<T>>,
}

impl<T: Clone> Default for ExternalTextureAdapter<T> {
    fn default() -> Self {
        Self { target: None }
    }
}

impl<T: Clone> ExternalTextureAdapter<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a host texture.
    ///
    /// Replacing a live binding that already received frames is refused
    /// until the session is reset.
    pub fn bind(&mut self, binding: ExternalTextureBinding<T>) -> Result<()> {
        if let Some(target) = &self.target {
            if target.is_valid() && target.has_content() {
                warn!("Rejected rebind of external texture that already holds frames");
                return Err(UploadError::RebindNotSupported);
            }
        }

        info!(
            "Bound external {:?} texture {}x{} (format: {:?})",
            binding.api, binding.width, binding.height, binding.format
        );
        self.target = Some(ExternalTarget::new(binding));
        Ok(())
    }

    pub fn is_bound(&self) -> bool {
        self.target.is_some()
    }

    pub fn target(&self) -> Option<&ExternalTarget<T>> {
        self.target.as_ref()
    }

    pub fn target_mut(&mut self) -> Option<&mut ExternalTarget<T>> {
        self.target.as_mut()
    }

    /// Host revoked the texture; drop our reference.
    pub fn invalidate(&mut self) {
        if let Some(target) = &mut self.target {
            if target.handle.take().is_some() {
                warn!("External texture invalidated by host");
            }
        }
    }

    /// Forget that frames were written, allowing a rebind
    pub fn reset(&mut self) {
        if let Some(target) = &mut self.target {
            target.has_content = false;
        }
    }

    pub fn unbind(&mut self) {
        if self.target.take().is_some() {
            info!("Unbound external texture");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binding(handle: u32, width: u32, height: u32) -> ExternalTextureBinding<u32> {
        ExternalTextureBinding {
            handle,
            width,
            height,
            api: GraphicsApiKind::OpenGl,
            format: None,
        }
    }

    #[test]
    fn test_capacity_check() {
        let mut adapter = ExternalTextureAdapter::new();
        adapter.bind(binding(7, 64, 64)).unwrap();
        let target = adapter.target().unwrap();

        assert_eq!(target.check_capacity(64, 64, DxtFormat::Bc1), Ok(&7));
        assert_eq!(
            target.check_capacity(128, 64, DxtFormat::Bc1),
            Err(UploadError::DestinationTooSmall {
                frame_width: 128,
                frame_height: 64,
                target_width: 64,
                target_height: 64,
            })
        );
    }

    #[test]
    fn test_declared_format_is_enforced() {
        let mut adapter = ExternalTextureAdapter::new();
        adapter
            .bind(ExternalTextureBinding {
                format: Some(DxtFormat::Bc1),
                ..binding(1, 256, 256)
            })
            .unwrap();
        assert_eq!(
            adapter
                .target()
                .unwrap()
                .check_capacity(64, 64, DxtFormat::Bc3),
            Err(UploadError::IncompatibleFormat {
                expected: DxtFormat::Bc1,
                actual: DxtFormat::Bc3,
            })
        );
    }

    #[test]
    fn test_rebind_rules() {
        let mut adapter = ExternalTextureAdapter::new();
        adapter.bind(binding(1, 64, 64)).unwrap();
        // Nothing written yet, replacing is fine
        adapter.bind(binding(2, 64, 64)).unwrap();

        adapter.target_mut().unwrap().mark_has_content();
        assert_eq!(
            adapter.bind(binding(3, 64, 64)),
            Err(UploadError::RebindNotSupported)
        );

        adapter.reset();
        adapter.bind(binding(3, 64, 64)).unwrap();
        assert_eq!(adapter.target().unwrap().check_capacity(4, 4, DxtFormat::Bc1), Ok(&3));
    }

    #[test]
    fn test_invalidate_drops_handle_and_allows_rebind() {
        let mut adapter = ExternalTextureAdapter::new();
        adapter.bind(binding(1, 64, 64)).unwrap();
        adapter.target_mut().unwrap().mark_has_content();

        adapter.invalidate();
        let target = adapter.target().unwrap();
        assert!(!target.is_valid());
        assert_eq!(
            target.check_capacity(4, 4, DxtFormat::Bc1),
            Err(UploadError::DeviceLost)
        );

        adapter.bind(binding(2, 64, 64)).unwrap();
        assert!(adapter.target().unwrap().is_valid());
    }
}
