//! Backing texture allocation
//!
//! Frames are uploaded into a texture at least as large as the padded frame.
//! The texture is created lazily, rounded up to powers of two per axis, and
//! only replaced when a frame no longer fits (or needs a different format).
//! It never shrinks.

use crate::device::{BackingDescriptor, DeviceError, TextureDevice};
use crate::format::DxtFormat;
use hapflow_core::FrameDescriptor;
use tracing::{debug, info};

/// Round a requested dimension up to the next power of two.
pub fn backing_dimension(requested: u32) -> u32 {
    let mut backing = 1u32;
    while backing < requested {
        backing <<= 1;
    }
    backing
}

/// Visible and padded size of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameExtent {
    pub width: u32,
    pub height: u32,
    pub padded_width: u32,
    pub padded_height: u32,
}

impl From<&FrameDescriptor<'_>> for FrameExtent {
    fn from(frame: &FrameDescriptor<'_>) -> Self {
        Self {
            width: frame.width,
            height: frame.height,
            padded_width: frame.padded_width,
            padded_height: frame.padded_height,
        }
    }
}

/// A self-owned texture and the part of it holding the current frame
#[derive(Debug, Clone)]
pub struct BackingTexture<T> {
    pub texture: T,
    pub backing_width: u32,
    pub backing_height: u32,
    pub format: DxtFormat,
    /// Visible (non-padded) size of the latest frame
    pub visible_width: u32,
    pub visible_height: u32,
}

impl<T> BackingTexture<T> {
    pub fn fits(&self, padded_width: u32, padded_height: u32) -> bool {
        padded_width <= self.backing_width && padded_height <= self.backing_height
    }
}

/// Lazily sized owner of the backing texture
#[derive(Debug)]
pub struct BackingAllocator<T> {
    current: Option<BackingTexture<T>>,
    power_of_two: bool,
    allocations: u64,
}

impl<T: Clone> BackingAllocator<T> {
    pub fn new(power_of_two: bool) -> Self {
        Self {
            current: None,
            power_of_two,
            allocations: 0,
        }
    }

    /// Make sure a texture large enough for `extent` in `format` exists and
    /// record the visible size.
    pub fn ensure<D>(
        &mut self,
        device: &D,
        extent: FrameExtent,
        format: DxtFormat,
    ) -> Result<&BackingTexture<T>, DeviceError>
    where
        D: TextureDevice<Texture = T>,
    {
        let reusable = self
            .current
            .as_ref()
            .is_some_and(|b| b.format == format && b.fits(extent.padded_width, extent.padded_height));

        if !reusable {
            let (min_width, min_height) = self
                .current
                .as_ref()
                .map(|b| (b.backing_width, b.backing_height))
                .unwrap_or((0, 0));

            let width = self.round(extent.padded_width).max(min_width);
            let height = self.round(extent.padded_height).max(min_height);

            let texture = device.create_texture(&BackingDescriptor {
                label: Some("Hap Backing Texture"),
                width,
                height,
                format,
            })?;
            self.allocations += 1;

            info!(
                "Allocated backing texture {}x{} ({:?}) for frame {}x{} (padded {}x{})",
                width,
                height,
                format,
                extent.width,
                extent.height,
                extent.padded_width,
                extent.padded_height
            );

            self.current = Some(BackingTexture {
                texture,
                backing_width: width,
                backing_height: height,
                format,
                visible_width: extent.width,
                visible_height: extent.height,
            });
        }

        // Checked above: either reusable or just created
        let Some(backing) = self.current.as_mut() else {
            return Err(DeviceError::Api("backing texture missing".to_string()));
        };
        if backing.visible_width != extent.width || backing.visible_height != extent.height {
            debug!(
                "Visible region {}x{} -> {}x{}",
                backing.visible_width, backing.visible_height, extent.width, extent.height
            );
            backing.visible_width = extent.width;
            backing.visible_height = extent.height;
        }
        Ok(backing)
    }

    pub fn current(&self) -> Option<&BackingTexture<T>> {
        self.current.as_ref()
    }

    /// Backing size, if a texture exists
    pub fn backing_size(&self) -> Option<(u32, u32)> {
        self.current
            .as_ref()
            .map(|b| (b.backing_width, b.backing_height))
    }

    /// Number of textures created so far
    pub fn allocations(&self) -> u64 {
        self.allocations
    }

    /// Drop the texture; the next frame allocates a new one
    pub fn release(&mut self) {
        if self.current.take().is_some() {
            debug!("Released backing texture");
        }
    }

    fn round(&self, requested: u32) -> u32 {
        if self.power_of_two {
            backing_dimension(requested)
        } else {
            requested
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::HeadlessDevice;
    use proptest::prelude::*;

    fn extent(width: u32, height: u32) -> FrameExtent {
        FrameExtent {
            width,
            height,
            padded_width: hapflow_core::frame::align_to_block(width),
            padded_height: hapflow_core::frame::align_to_block(height),
        }
    }

    #[test]
    fn test_backing_dimension() {
        assert_eq!(backing_dimension(0), 1);
        assert_eq!(backing_dimension(1), 1);
        assert_eq!(backing_dimension(4), 4);
        assert_eq!(backing_dimension(5), 8);
        assert_eq!(backing_dimension(1920), 2048);
        assert_eq!(backing_dimension(1080), 2048);
        assert_eq!(backing_dimension(1024), 1024);
    }

    #[test]
    fn test_ensure_allocates_lazily_and_reuses() {
        let device = HeadlessDevice::new();
        let mut allocator = BackingAllocator::new(true);
        assert!(allocator.current().is_none());

        let first = allocator
            .ensure(&device, extent(1920, 1080), DxtFormat::Bc1)
            .unwrap()
            .texture
            .clone();
        assert_eq!(allocator.backing_size(), Some((2048, 2048)));

        let second = allocator
            .ensure(&device, extent(1280, 720), DxtFormat::Bc1)
            .unwrap();
        assert_eq!(second.texture, first);
        assert_eq!((second.visible_width, second.visible_height), (1280, 720));
        assert_eq!(allocator.allocations(), 1);
        assert_eq!(device.textures_created(), 1);
    }

    #[test]
    fn test_ensure_grows_without_shrinking_other_axis() {
        let device = HeadlessDevice::new();
        let mut allocator = BackingAllocator::new(true);
        allocator
            .ensure(&device, extent(100, 1000), DxtFormat::Bc1)
            .unwrap();
        assert_eq!(allocator.backing_size(), Some((128, 1024)));

        allocator
            .ensure(&device, extent(600, 20), DxtFormat::Bc1)
            .unwrap();
        assert_eq!(allocator.backing_size(), Some((1024, 1024)));
        assert_eq!(allocator.allocations(), 2);
    }

    #[test]
    fn test_format_change_recreates() {
        let device = HeadlessDevice::new();
        let mut allocator = BackingAllocator::new(true);
        allocator
            .ensure(&device, extent(64, 64), DxtFormat::Bc1)
            .unwrap();
        let backing = allocator
            .ensure(&device, extent(32, 32), DxtFormat::Bc3)
            .unwrap();
        assert_eq!(backing.format, DxtFormat::Bc3);
        assert_eq!((backing.backing_width, backing.backing_height), (64, 64));
        assert_eq!(allocator.allocations(), 2);
    }

    #[test]
    fn test_exact_backing_when_power_of_two_disabled() {
        let device = HeadlessDevice::new();
        let mut allocator = BackingAllocator::new(false);
        allocator
            .ensure(&device, extent(1918, 1078), DxtFormat::Bc1)
            .unwrap();
        assert_eq!(allocator.backing_size(), Some((1920, 1080)));
        allocator
            .ensure(&device, extent(640, 480), DxtFormat::Bc1)
            .unwrap();
        assert_eq!(allocator.backing_size(), Some((1920, 1080)));
    }

    #[test]
    fn test_release_drops_texture() {
        let device = HeadlessDevice::new();
        let mut allocator = BackingAllocator::new(true);
        allocator
            .ensure(&device, extent(64, 64), DxtFormat::Bc1)
            .unwrap();
        allocator.release();
        assert!(allocator.current().is_none());
        allocator
            .ensure(&device, extent(64, 64), DxtFormat::Bc1)
            .unwrap();
        assert_eq!(device.textures_created(), 2);
    }

    #[test]
    fn test_failed_allocation_keeps_previous_texture() {
        let device = HeadlessDevice::new();
        let mut allocator = BackingAllocator::new(true);
        allocator
            .ensure(&device, extent(64, 64), DxtFormat::Bc1)
            .unwrap();
        device.set_lost(true);
        let err = allocator
            .ensure(&device, extent(256, 256), DxtFormat::Bc1)
            .unwrap_err();
        assert_eq!(err, DeviceError::Lost);
        assert_eq!(allocator.backing_size(), Some((64, 64)));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_backing_is_power_of_two_and_monotonic(
            sizes in proptest::collection::vec((1u32..2048, 1u32..2048), 1..12)
        ) {
            let device = HeadlessDevice::new();
            let mut allocator = BackingAllocator::new(true);
            let mut previous = (0u32, 0u32);
            for (w, h) in sizes {
                let backing = allocator.ensure(&device, extent(w, h), DxtFormat::Bc1).unwrap();
                let size = (backing.backing_width, backing.backing_height);
                prop_assert!(size.0.is_power_of_two() && size.1.is_power_of_two());
                prop_assert!(size.0 >= backing.visible_width && size.1 >= backing.visible_height);
                prop_assert!(size.0 >= previous.0 && size.1 >= previous.1);
                previous = size;
            }
        }
    }
}
