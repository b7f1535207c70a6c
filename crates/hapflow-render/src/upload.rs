//! Compressed frame upload
//!
//! One algorithm serves both destinations. Only the capacity step differs:
//! an owned backing texture grows as needed, a host texture must already be
//! large enough.
//!
//! Graphics API failures are counted. When `degrade_after` of them happen in
//! a row the failure is reported once as [`UploadError::PlaybackDegraded`];
//! the streak ends with the next successful upload.

use crate::backing::{BackingAllocator, FrameExtent};
use crate::device::{BlockRegion, DeviceError, TextureDevice};
use crate::external::ExternalTarget;
use crate::format::{resolve, DxtFormat};
use crate::{Result, UploadError};
use hapflow_core::FrameDescriptor;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Where a frame ends up
pub enum UploadTarget<'a, T> {
    /// Backing texture we allocate and resize ourselves
    Owned(&'a mut BackingAllocator<T>),
    /// Texture owned by the host, never resized
    External(&'a mut ExternalTarget<T>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestinationKind {
    Owned,
    External,
}

/// A texture holding a fully uploaded frame
#[derive(Debug, Clone)]
pub struct FrameTexture<T> {
    pub texture: T,
    pub destination: DestinationKind,
    pub width: u32,
    pub height: u32,
    pub padded_width: u32,
    pub padded_height: u32,
    pub backing_width: u32,
    pub backing_height: u32,
    pub format: DxtFormat,
    /// Blocks hold scaled YCoCg
    pub ycocg: bool,
    /// Upload counter, increasing per successful upload
    pub sequence: u64,
}

impl<T> FrameTexture<T> {
    pub fn visible_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Texture coordinate scale that excludes backing padding
    pub fn uv_scale(&self) -> [f32; 2] {
        [
            self.width as f32 / self.backing_width.max(1) as f32,
            self.height as f32 / self.backing_height.max(1) as f32,
        ]
    }
}

/// Counts consecutive graphics API failures
#[derive(Debug, Clone)]
pub struct FailureTracker {
    threshold: u32,
    consecutive: u32,
}

impl FailureTracker {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            consecutive: 0,
        }
    }

    /// Record a failure; returns true exactly when the streak reaches the
    /// threshold.
    pub fn record_failure(&mut self) -> bool {
        self.consecutive = self.consecutive.saturating_add(1);
        self.consecutive == self.threshold
    }

    pub fn record_success(&mut self) {
        self.consecutive = 0;
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }
}

/// Validates frames and writes them into their destination
pub struct UploadEngine<D: TextureDevice> {
    device: Arc<D>,
    failures: FailureTracker,
    sequence: u64,
}

impl<D: TextureDevice> UploadEngine<D> {
    pub fn new(device: Arc<D>, degrade_after: u32) -> Self {
        Self {
            device,
            failures: FailureTracker::new(degrade_after),
            sequence: 0,
        }
    }

    pub fn device(&self) -> &Arc<D> {
        &self.device
    }

    /// Swap in a new device after the host recreated it
    pub fn replace_device(&mut self, device: Arc<D>) {
        self.device = device;
        self.failures.record_success();
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.failures.consecutive()
    }

    pub fn reset_failures(&mut self) {
        self.failures.record_success();
    }

    /// Upload `frame` into `target`.
    ///
    /// Must complete before the decoder's callback returns: the frame's
    /// buffer is not retained.
    pub fn upload(
        &mut self,
        frame: &FrameDescriptor<'_>,
        target: UploadTarget<'_, D::Texture>,
    ) -> Result<FrameTexture<D::Texture>> {
        let resolved = resolve(frame.pixel_format)?;

        if !frame.is_block_aligned() {
            return Err(UploadError::MisalignedFrame {
                width: frame.padded_width,
                height: frame.padded_height,
            });
        }

        let expected = frame.expected_byte_length(resolved.bits_per_pixel);
        if frame.byte_length() < expected {
            return Err(UploadError::TruncatedFrame {
                expected,
                actual: frame.byte_length(),
            });
        }

        let region = BlockRegion {
            width: frame.padded_width,
            height: frame.padded_height,
            format: resolved.format,
        };
        let data = &frame.data[..expected];

        match target {
            UploadTarget::Owned(allocator) => {
                let backing = match allocator.ensure(
                    self.device.as_ref(),
                    FrameExtent::from(frame),
                    resolved.format,
                ) {
                    Ok(backing) => backing,
                    Err(e) => return Err(self.device_failure(e)),
                };

                if let Err(e) = self.device.write_blocks(&backing.texture, &region, data) {
                    return Err(self.device_failure(e));
                }

                let uploaded = FrameTexture {
                    texture: backing.texture.clone(),
                    destination: DestinationKind::Owned,
                    width: frame.width,
                    height: frame.height,
                    padded_width: frame.padded_width,
                    padded_height: frame.padded_height,
                    backing_width: backing.backing_width,
                    backing_height: backing.backing_height,
                    format: resolved.format,
                    ycocg: resolved.ycocg,
                    sequence: self.next_sequence(),
                };
                Ok(self.succeeded(uploaded, expected))
            }
            UploadTarget::External(target) => {
                let handle = target
                    .check_capacity(frame.padded_width, frame.padded_height, resolved.format)?
                    .clone();
                let (backing_width, backing_height) = target.declared_size();

                if let Err(e) = self.device.write_blocks(&handle, &region, data) {
                    return Err(self.device_failure(e));
                }
                target.mark_has_content();

                let uploaded = FrameTexture {
                    texture: handle,
                    destination: DestinationKind::External,
                    width: frame.width,
                    height: frame.height,
                    padded_width: frame.padded_width,
                    padded_height: frame.padded_height,
                    backing_width,
                    backing_height,
                    format: resolved.format,
                    ycocg: resolved.ycocg,
                    sequence: self.next_sequence(),
                };
                Ok(self.succeeded(uploaded, expected))
            }
        }
    }

    fn next_sequence(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }

    fn succeeded(
        &mut self,
        uploaded: FrameTexture<D::Texture>,
        bytes: usize,
    ) -> FrameTexture<D::Texture> {
        self.failures.record_success();
        debug!(
            "Uploaded frame #{} {}x{} (padded {}x{}, {} bytes) into {:?} {}x{}",
            uploaded.sequence,
            uploaded.width,
            uploaded.height,
            uploaded.padded_width,
            uploaded.padded_height,
            bytes,
            uploaded.destination,
            uploaded.backing_width,
            uploaded.backing_height
        );
        uploaded
    }

    fn device_failure(&mut self, err: DeviceError) -> UploadError {
        match err {
            DeviceError::Lost => UploadError::DeviceLost,
            DeviceError::Api(message) | DeviceError::Unsupported(message) => {
                if self.failures.record_failure() {
                    error!(
                        "Upload failed {} times in a row, playback degraded: {}",
                        self.failures.consecutive(),
                        message
                    );
                    UploadError::PlaybackDegraded {
                        consecutive_failures: self.failures.consecutive(),
                        message,
                    }
                } else {
                    warn!(
                        "Upload failed ({} in a row): {}",
                        self.failures.consecutive(),
                        message
                    );
                    UploadError::GraphicsApiFailure(message)
                }
            }
        }
    }
}
