//! Headless texture device
//!
//! Keeps compressed texture contents in host memory. Used when no GPU is
//! available and for exercising the upload path in tests, including
//! injected API failures and device loss.

use crate::device::{BackingDescriptor, BlockRegion, DeviceError, TextureDevice};
use crate::format::DxtFormat;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

struct TextureInner {
    id: u64,
    width: u32,
    height: u32,
    format: DxtFormat,
    data: Mutex<Vec<u8>>,
    writes: AtomicU64,
    bytes_written: AtomicU64,
}

/// Reference-counted handle to a host-memory texture
#[derive(Clone)]
pub struct HeadlessTexture(Arc<TextureInner>);

impl HeadlessTexture {
    fn new(id: u64, width: u32, height: u32, format: DxtFormat) -> Self {
        Self(Arc::new(TextureInner {
            id,
            width,
            height,
            format,
            data: Mutex::new(vec![0; format.calculate_size(width, height)]),
            writes: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
        }))
    }

    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn width(&self) -> u32 {
        self.0.width
    }

    pub fn height(&self) -> u32 {
        self.0.height
    }

    pub fn format(&self) -> DxtFormat {
        self.0.format
    }

    /// Number of successful block writes
    pub fn write_count(&self) -> u64 {
        self.0.writes.load(Ordering::Relaxed)
    }

    /// Bytes copied by the most recent write
    pub fn bytes_written(&self) -> u64 {
        self.0.bytes_written.load(Ordering::Relaxed)
    }

    /// Copy of the full block storage
    pub fn snapshot(&self) -> Vec<u8> {
        self.0.data.lock().clone()
    }
}

impl PartialEq for HeadlessTexture {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for HeadlessTexture {}

impl fmt::Debug for HeadlessTexture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeadlessTexture")
            .field("id", &self.0.id)
            .field("width", &self.0.width)
            .field("height", &self.0.height)
            .field("format", &self.0.format)
            .finish()
    }
}

/// CPU-side [`TextureDevice`]
#[derive(Debug, Default)]
pub struct HeadlessDevice {
    next_id: AtomicU64,
    created: AtomicU64,
    lost: AtomicBool,
    failing_writes: AtomicU32,
}

impl HeadlessDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Textures created through [`TextureDevice::create_texture`]
    pub fn textures_created(&self) -> u64 {
        self.created.load(Ordering::Relaxed)
    }

    /// Simulate a lost device; every call fails with [`DeviceError::Lost`]
    pub fn set_lost(&self, lost: bool) {
        self.lost.store(lost, Ordering::Relaxed);
    }

    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::Relaxed)
    }

    /// Make the next `count` writes fail with an API error
    pub fn fail_next_writes(&self, count: u32) {
        self.failing_writes.store(count, Ordering::Relaxed);
    }

    /// Create a texture the way a host application would, outside our
    /// allocation path.
    pub fn create_external_texture(
        &self,
        width: u32,
        height: u32,
        format: DxtFormat,
    ) -> HeadlessTexture {
        HeadlessTexture::new(self.allocate_id(), width, height, format)
    }

    fn allocate_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn take_injected_failure(&self) -> bool {
        self.failing_writes
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl TextureDevice for HeadlessDevice {
    type Texture = HeadlessTexture;

    fn create_texture(&self, desc: &BackingDescriptor<'_>) -> Result<HeadlessTexture, DeviceError> {
        if self.is_lost() {
            return Err(DeviceError::Lost);
        }
        if desc.width == 0 || desc.height == 0 {
            return Err(DeviceError::Api(format!(
                "invalid texture size {}x{}",
                desc.width, desc.height
            )));
        }
        self.created.fetch_add(1, Ordering::Relaxed);
        Ok(HeadlessTexture::new(
            self.allocate_id(),
            desc.width,
            desc.height,
            desc.format,
        ))
    }

    fn write_blocks(
        &self,
        texture: &HeadlessTexture,
        region: &BlockRegion,
        data: &[u8],
    ) -> Result<(), DeviceError> {
        if self.is_lost() {
            return Err(DeviceError::Lost);
        }
        if self.take_injected_failure() {
            return Err(DeviceError::Api("injected write failure".to_string()));
        }
        if region.format != texture.format() {
            return Err(DeviceError::Api(format!(
                "format mismatch: texture is {:?}, region is {:?}",
                texture.format(),
                region.format
            )));
        }
        if region.width > texture.width() || region.height > texture.height() {
            return Err(DeviceError::Api(format!(
                "region {}x{} exceeds texture {}x{}",
                region.width,
                region.height,
                texture.width(),
                texture.height()
            )));
        }

        let src_row = region.bytes_per_row() as usize;
        let rows = region.block_rows() as usize;
        if data.len() < src_row * rows {
            return Err(DeviceError::Api(format!(
                "expected {} bytes, got {}",
                src_row * rows,
                data.len()
            )));
        }

        let dst_row = texture.format().bytes_per_block_row(texture.width()) as usize;
        let mut storage = texture.0.data.lock();
        for (row, src) in data.chunks_exact(src_row).take(rows).enumerate() {
            let start = row * dst_row;
            storage[start..start + src_row].copy_from_slice(src);
        }
        drop(storage);

        texture.0.writes.fetch_add(1, Ordering::Relaxed);
        texture
            .0
            .bytes_written
            .store((src_row * rows) as u64, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_places_rows_at_texture_pitch() {
        let device = HeadlessDevice::new();
        let texture = device
            .create_texture(&BackingDescriptor {
                label: None,
                width: 8,
                height: 8,
                format: DxtFormat::Bc1,
            })
            .unwrap();

        // 4x8 region: one block wide, two block rows
        let region = BlockRegion {
            width: 4,
            height: 8,
            format: DxtFormat::Bc1,
        };
        let data: Vec<u8> = (1..=16).collect();
        device.write_blocks(&texture, &region, &data).unwrap();

        let contents = texture.snapshot();
        assert_eq!(&contents[0..8], &data[0..8]);
        assert_eq!(&contents[8..16], &[0; 8]);
        assert_eq!(&contents[16..24], &data[8..16]);
        assert_eq!(texture.write_count(), 1);
    }

    #[test]
    fn test_rejects_oversized_region_and_wrong_format() {
        let device = HeadlessDevice::new();
        let texture = device.create_external_texture(4, 4, DxtFormat::Bc1);
        let too_big = BlockRegion {
            width: 8,
            height: 4,
            format: DxtFormat::Bc1,
        };
        assert!(matches!(
            device.write_blocks(&texture, &too_big, &[0; 16]),
            Err(DeviceError::Api(_))
        ));

        let wrong_format = BlockRegion {
            width: 4,
            height: 4,
            format: DxtFormat::Bc3,
        };
        assert!(device.write_blocks(&texture, &wrong_format, &[0; 16]).is_err());
        assert_eq!(texture.write_count(), 0);
        assert_eq!(device.textures_created(), 0);
    }

    #[test]
    fn test_injected_failures_run_out() {
        let device = HeadlessDevice::new();
        let texture = device.create_external_texture(4, 4, DxtFormat::Bc1);
        let region = BlockRegion {
            width: 4,
            height: 4,
            format: DxtFormat::Bc1,
        };
        device.fail_next_writes(2);
        assert!(device.write_blocks(&texture, &region, &[0; 8]).is_err());
        assert!(device.write_blocks(&texture, &region, &[0; 8]).is_err());
        assert!(device.write_blocks(&texture, &region, &[0; 8]).is_ok());
    }
}
