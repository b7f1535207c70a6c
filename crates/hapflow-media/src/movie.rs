//! Hap movie session
//!
//! [`HapMovie`] owns everything a playing Hap source needs on the GPU side:
//! the upload engine, the backing texture or host texture binding, and the
//! frame slot the render path reads from. It is shared between the decode
//! thread (as a [`FrameSink`]) and the render thread.
//!
//! Locking: the frame slot lock is always taken before the session and
//! upload state locks, and none of them is held while drawing.
//!
//! Lifecycle events (degradation, device loss and restore) displace the
//! oldest queued event when the queue is full; dropped-frame events are
//! discarded instead. Degradation is also latched until the next open,
//! reset or device restore.

use crate::framerate::FramerateTracker;
use crate::slot::FrameSlot;
use crate::source::{FrameSink, SourceDescriptor};
use crate::{MediaError, Result};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use hapflow_core::{CodecVariant, FrameDescriptor, Rect, StreamConfig};
use hapflow_render::{
    select_program, BackingAllocator, DrawCommand, ExternalTextureAdapter,
    ExternalTextureBinding, FrameTexture, ProgramKind, TextureDevice, UploadEngine, UploadError,
    UploadTarget,
};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Session events for the surrounding application
#[derive(Debug, Clone, PartialEq)]
pub enum MovieEvent {
    FrameDropped { reason: UploadError },
    PlaybackDegraded { consecutive_failures: u32 },
    DeviceLost,
    DeviceRestored,
}

impl MovieEvent {
    /// Lifecycle events are never dropped in favour of older events
    pub fn is_lifecycle(&self) -> bool {
        !matches!(self, Self::FrameDropped { .. })
    }
}

/// Counters since the movie was created
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MovieStats {
    pub frames_received: u64,
    pub frames_uploaded: u64,
    pub frames_dropped: u64,
    pub upload_failures: u64,
    pub degradations: u64,
}

/// Metadata of the open source
#[derive(Debug, Clone, PartialEq)]
pub struct SourceInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub frame_count: u64,
    pub codec: CodecVariant,
}

struct Session {
    info: SourceInfo,
    program: ProgramKind,
}

struct UploadState<D: TextureDevice> {
    engine: UploadEngine<D>,
    backing: BackingAllocator<D::Texture>,
    external: ExternalTextureAdapter<D::Texture>,
}

impl<D: TextureDevice> UploadState<D> {
    fn upload(
        &mut self,
        frame: &FrameDescriptor<'_>,
    ) -> std::result::Result<FrameTexture<D::Texture>, UploadError> {
        let target = if self.external.is_bound() {
            UploadTarget::External(self.external.target_mut().ok_or(UploadError::NotBound)?)
        } else {
            UploadTarget::Owned(&mut self.backing)
        };
        self.engine.upload(frame, target)
    }

    fn release(&mut self) {
        self.backing.release();
        self.external.reset();
        self.engine.reset_failures();
    }
}

/// A Hap movie bound to a texture device
pub struct HapMovie<D: TextureDevice> {
    slot: FrameSlot<FrameTexture<D::Texture>>,
    upload: Mutex<UploadState<D>>,
    session: RwLock<Option<Session>>,
    stats: Mutex<MovieStats>,
    framerate: Mutex<FramerateTracker>,
    /// Consecutive failures of the last escalation, until cleared
    degraded: Mutex<Option<u32>>,
    events_tx: Sender<MovieEvent>,
    events_rx: Receiver<MovieEvent>,
}

impl<D: TextureDevice> HapMovie<D> {
    pub fn new(device: Arc<D>, config: &StreamConfig) -> Self {
        let (events_tx, events_rx) = bounded(config.event_queue_depth.max(1));
        Self {
            slot: FrameSlot::new(),
            upload: Mutex::new(UploadState {
                engine: UploadEngine::new(device, config.degrade_after_failures),
                backing: BackingAllocator::new(config.power_of_two_backing),
                external: ExternalTextureAdapter::new(),
            }),
            session: RwLock::new(None),
            stats: Mutex::new(MovieStats::default()),
            framerate: Mutex::new(FramerateTracker::new(Duration::from_millis(
                config.framerate_sample_interval_ms,
            ))),
            degraded: Mutex::new(None),
            events_tx,
            events_rx,
        }
    }

    /// Open a source, replacing any previous one.
    ///
    /// Fails for non-Hap codecs.
    pub fn open(&self, source: &SourceDescriptor) -> Result<SourceInfo> {
        let codec = source.codec();
        if !codec.is_supported() {
            warn!("Refusing to open non-Hap source '{}'", source.codec_type);
            return Err(MediaError::UnsupportedCodec(source.codec_type));
        }
        if source.width == 0 || source.height == 0 {
            return Err(MediaError::InvalidSource(format!(
                "empty frame size {}x{}",
                source.width, source.height
            )));
        }

        let info = SourceInfo {
            width: source.width,
            height: source.height,
            fps: source.fps,
            frame_count: source.frame_count,
            codec,
        };

        self.slot.clear_with(|| self.upload.lock().release());
        self.framerate.lock().reset();
        self.degraded.lock().take();
        *self.session.write() = Some(Session {
            info: info.clone(),
            program: select_program(codec),
        });

        info!(
            "Opened {} source {}x{} @ {:.2} fps ({} frames)",
            codec, info.width, info.height, info.fps, info.frame_count
        );
        Ok(info)
    }

    /// Close the source and drop every texture reference, including the host
    /// binding.
    pub fn close(&self) {
        self.session.write().take();
        self.slot.clear_with(|| {
            let mut state = self.upload.lock();
            state.release();
            state.external.unbind();
        });
        self.framerate.lock().reset();
        self.degraded.lock().take();
        info!("Closed movie");
    }

    /// Return to the "no frame yet" state, keeping the source and the host
    /// binding. A new host texture may be bound afterwards.
    pub fn reset(&self) {
        self.slot.clear_with(|| self.upload.lock().release());
        self.framerate.lock().reset();
        self.degraded.lock().take();
        debug!("Reset movie");
    }

    pub fn is_open(&self) -> bool {
        self.session.read().is_some()
    }

    /// Upload a decoded frame and publish it.
    ///
    /// Frames arriving with no open source are ignored; the check happens
    /// under the slot lock so an upload racing `close` never lands after it.
    /// Errors are also logged, counted and sent as events; the previous
    /// frame stays current.
    pub fn on_new_frame(
        &self,
        frame: &FrameDescriptor<'_>,
    ) -> std::result::Result<(), UploadError> {
        let published = self.slot.publish_with(|| {
            if !self.is_open() {
                return Ok(None);
            }
            self.stats.lock().frames_received += 1;
            self.upload.lock().upload(frame).map(Some)
        });

        match published {
            Ok(true) => {
                self.stats.lock().frames_uploaded += 1;
                self.framerate.lock().record(Instant::now());
                Ok(())
            }
            Ok(false) => {
                debug!("Ignoring frame with no open source");
                Ok(())
            }
            Err(e) => {
                self.frame_dropped(&e);
                Err(e)
            }
        }
    }

    /// Write subsequent frames into a host-owned texture
    pub fn bind_external_target(
        &self,
        binding: ExternalTextureBinding<D::Texture>,
    ) -> std::result::Result<(), UploadError> {
        let result = self.upload.lock().external.bind(binding);
        if let Err(e) = &result {
            error!("External texture bind failed: {}", e);
        }
        result
    }

    /// The host's device is gone: forget every texture it owned
    pub fn on_host_device_lost(&self) {
        self.slot.clear_with(|| {
            let mut state = self.upload.lock();
            state.external.invalidate();
            state.backing.release();
        });
        warn!("Host device lost, textures released");
        self.emit(MovieEvent::DeviceLost);
    }

    /// Continue on a recreated device.
    ///
    /// A host texture binding must be renewed before uploads succeed again.
    pub fn on_host_device_restored(&self, device: Arc<D>) {
        self.upload.lock().engine.replace_device(device);
        self.degraded.lock().take();
        info!("Host device restored");
        self.emit(MovieEvent::DeviceRestored);
    }

    /// Latest uploaded frame; `None` until the first upload succeeds
    pub fn acquire_current_texture(&self) -> Option<FrameTexture<D::Texture>> {
        self.slot.acquire()
    }

    /// Plan the draw of the current frame into `viewport`
    pub fn plan_draw(&self, viewport: Rect) -> (DrawCommand, Option<FrameTexture<D::Texture>>) {
        let frame = self.acquire_current_texture();
        let command = DrawCommand::plan(frame.as_ref(), self.program(), viewport);
        (command, frame)
    }

    pub fn codec(&self) -> CodecVariant {
        self.session
            .read()
            .as_ref()
            .map_or(CodecVariant::Unsupported, |s| s.info.codec)
    }

    pub fn program(&self) -> ProgramKind {
        self.session
            .read()
            .as_ref()
            .map_or(ProgramKind::Passthrough, |s| s.program)
    }

    pub fn source_info(&self) -> Option<SourceInfo> {
        self.session.read().as_ref().map(|s| s.info.clone())
    }

    /// Whether upload failures escalated since the last open, reset or
    /// device restore
    pub fn is_degraded(&self) -> bool {
        self.degraded.lock().is_some()
    }

    /// Consecutive failures reported by the latched escalation
    pub fn degradation(&self) -> Option<u32> {
        *self.degraded.lock()
    }

    pub fn stats(&self) -> MovieStats {
        *self.stats.lock()
    }

    /// Frames per second actually published
    pub fn playback_framerate(&self) -> f64 {
        self.framerate.lock().rate()
    }

    pub fn events(&self) -> Receiver<MovieEvent> {
        self.events_rx.clone()
    }

    fn frame_dropped(&self, reason: &UploadError) {
        let mut degraded = None;
        {
            let mut stats = self.stats.lock();
            stats.frames_dropped += 1;
            match reason {
                UploadError::GraphicsApiFailure(_) => stats.upload_failures += 1,
                UploadError::PlaybackDegraded {
                    consecutive_failures,
                    ..
                } => {
                    stats.upload_failures += 1;
                    stats.degradations += 1;
                    degraded = Some(*consecutive_failures);
                }
                _ => {}
            }
        }

        if reason.is_frame_local() {
            if reason.severity() == tracing::Level::ERROR {
                error!("Dropped frame: {}", reason);
            } else {
                warn!("Dropped frame: {}", reason);
            }
        }

        self.emit(MovieEvent::FrameDropped {
            reason: reason.clone(),
        });
        if let Some(consecutive_failures) = degraded {
            *self.degraded.lock() = Some(consecutive_failures);
            self.emit(MovieEvent::PlaybackDegraded {
                consecutive_failures,
            });
        }
    }

    fn emit(&self, mut event: MovieEvent) {
        loop {
            match self.events_tx.try_send(event) {
                Err(TrySendError::Full(rejected)) if rejected.is_lifecycle() => {
                    if let Ok(oldest) = self.events_rx.try_recv() {
                        debug!("Event queue full, discarding oldest {:?}", oldest);
                    }
                    event = rejected;
                }
                Err(TrySendError::Full(rejected)) => {
                    debug!("Event queue full, dropping {:?}", rejected);
                    return;
                }
                _ => return,
            }
        }
    }
}

impl<D: TextureDevice> FrameSink for HapMovie<D> {
    fn on_new_frame(&self, frame: &FrameDescriptor<'_>) {
        // Failures surface through logs, stats, events and the degradation latch
        let _ = HapMovie::on_new_frame(self, frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hapflow_core::{FourCc, PixelFormatTag};
    use hapflow_render::{DxtFormat, HeadlessDevice};

    fn movie() -> (Arc<HeadlessDevice>, HapMovie<HeadlessDevice>) {
        let device = Arc::new(HeadlessDevice::new());
        let movie = HapMovie::new(device.clone(), &StreamConfig::default());
        (device, movie)
    }

    fn source(codec: CodecVariant) -> SourceDescriptor {
        SourceDescriptor {
            codec_type: codec.fourcc().unwrap_or(FourCc::from_bytes(*b"avc1")),
            width: 64,
            height: 64,
            fps: 30.0,
            frame_count: 10,
        }
    }

    #[test]
    fn test_open_rejects_non_hap_codec() {
        let (_, movie) = movie();
        assert!(matches!(
            movie.open(&source(CodecVariant::Unsupported)),
            Err(MediaError::UnsupportedCodec(_))
        ));
        assert!(!movie.is_open());
        assert_eq!(movie.codec(), CodecVariant::Unsupported);
    }

    #[test]
    fn test_open_records_source_info() {
        let (_, movie) = movie();
        let info = movie.open(&source(CodecVariant::Alpha)).unwrap();
        assert_eq!(movie.source_info(), Some(info));
        assert_eq!(movie.codec(), CodecVariant::Alpha);
        assert_eq!(movie.program(), ProgramKind::Passthrough);
    }

    #[test]
    fn test_frames_ignored_until_open() {
        let (device, movie) = movie();
        let data = vec![0u8; DxtFormat::Bc1.calculate_size(64, 64)];
        let frame = FrameDescriptor::new(64, 64, PixelFormatTag::RgbDxt1, &data);
        movie.on_new_frame(&frame).unwrap();
        assert!(movie.acquire_current_texture().is_none());
        assert_eq!(device.textures_created(), 0);
        assert_eq!(movie.stats().frames_received, 0);
    }

    #[test]
    fn test_close_unbinds_external_target() {
        let (device, movie) = movie();
        movie.open(&source(CodecVariant::Base)).unwrap();
        let host = device.create_external_texture(64, 64, DxtFormat::Bc1);
        movie
            .bind_external_target(ExternalTextureBinding {
                handle: host,
                width: 64,
                height: 64,
                api: hapflow_render::GraphicsApiKind::Vulkan,
                format: None,
            })
            .unwrap();
        movie.close();
        assert!(!movie.upload.lock().external.is_bound());
        assert!(!movie.is_open());
    }
}
