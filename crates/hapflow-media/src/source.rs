//! Decode collaborator boundary
//!
//! A [`DecodeSource`] owns demuxing and bitstream decoding and hands each
//! decoded, still block-compressed frame to a [`FrameSink`] from its own
//! thread. The frame buffer is only valid for the duration of the call.
//!
//! [`TestPatternSource`] stands in for a real decoder: it synthesizes valid
//! BC1/BC3 frames at a fixed rate.

use crate::{MediaError, Result};
use hapflow_core::{CodecVariant, FourCc, FrameDescriptor, PixelFormatTag};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Receives decoded frames
pub trait FrameSink: Send + Sync {
    /// Called once per decoded frame, never concurrently with itself.
    fn on_new_frame(&self, frame: &FrameDescriptor<'_>);
}

/// Track metadata reported by the decoder when a source is opened
#[derive(Debug, Clone, PartialEq)]
pub struct SourceDescriptor {
    /// Container codec type of the video track
    pub codec_type: FourCc,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    /// Total frames, 0 if unknown
    pub frame_count: u64,
}

impl SourceDescriptor {
    pub fn codec(&self) -> CodecVariant {
        CodecVariant::from_fourcc(self.codec_type)
    }
}

/// A running decoder feeding a [`FrameSink`]
pub trait DecodeSource: Send {
    fn descriptor(&self) -> &SourceDescriptor;

    /// Start delivering frames to `sink`
    fn start(&mut self, sink: Arc<dyn FrameSink>) -> Result<()>;

    /// Stop delivering frames; returns once no callback is in flight
    fn stop(&mut self);
}

/// Pixel format a decoder emits for a codec variant
pub fn pixel_format_for(codec: CodecVariant, codec_type: FourCc) -> PixelFormatTag {
    match codec {
        CodecVariant::Base => PixelFormatTag::RgbDxt1,
        CodecVariant::Alpha => PixelFormatTag::RgbaDxt5,
        CodecVariant::Quality => PixelFormatTag::YCoCgDxt5,
        CodecVariant::Unsupported => PixelFormatTag::Other(codec_type),
    }
}

/// Synthetic decoder producing moving color bars
pub struct TestPatternSource {
    descriptor: SourceDescriptor,
    /// Frames to emit before stopping, 0 for no limit
    frame_limit: u64,
    running: Arc<AtomicBool>,
    frames_emitted: Arc<AtomicU64>,
    thread: Option<JoinHandle<()>>,
}

impl TestPatternSource {
    pub fn new(descriptor: SourceDescriptor, frame_limit: u64) -> Self {
        Self {
            descriptor,
            frame_limit,
            running: Arc::new(AtomicBool::new(false)),
            frames_emitted: Arc::new(AtomicU64::new(0)),
            thread: None,
        }
    }

    /// True while the decode thread is delivering frames
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn frames_emitted(&self) -> u64 {
        self.frames_emitted.load(Ordering::Relaxed)
    }

    /// Wait for the decode thread to finish on its own
    pub fn join(&mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Test pattern thread panicked");
            }
        }
        self.running.store(false, Ordering::Release);
    }
}

impl DecodeSource for TestPatternSource {
    fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    fn start(&mut self, sink: Arc<dyn FrameSink>) -> Result<()> {
        if self.thread.is_some() {
            return Err(MediaError::AlreadyRunning);
        }
        if !(self.descriptor.fps.is_finite() && self.descriptor.fps > 0.0) {
            return Err(MediaError::InvalidSource(format!(
                "frame rate {} is not positive",
                self.descriptor.fps
            )));
        }

        self.running.store(true, Ordering::Release);
        let running = self.running.clone();
        let frames_emitted = self.frames_emitted.clone();
        let descriptor = self.descriptor.clone();
        let frame_limit = self.frame_limit;

        let thread = thread::Builder::new()
            .name("hap-decode".to_string())
            .spawn(move || {
                info!(
                    "Test pattern started: {}x{} @ {:.2} fps ({})",
                    descriptor.width,
                    descriptor.height,
                    descriptor.fps,
                    descriptor.codec()
                );
                let frame_duration = Duration::from_secs_f64(1.0 / descriptor.fps);
                let pixel_format = pixel_format_for(descriptor.codec(), descriptor.codec_type);
                let mut pattern = PatternGenerator::new(&descriptor, pixel_format);
                let mut index = 0u64;

                while running.load(Ordering::Acquire) && (frame_limit == 0 || index < frame_limit)
                {
                    let start = Instant::now();
                    let frame = pattern.frame(index);
                    sink.on_new_frame(&frame);
                    index += 1;
                    frames_emitted.store(index, Ordering::Relaxed);

                    let elapsed = start.elapsed();
                    if elapsed < frame_duration {
                        thread::sleep(frame_duration - elapsed);
                    }
                }

                running.store(false, Ordering::Release);
                info!("Test pattern stopped after {} frames", index);
            })
            .map_err(|e| MediaError::DecodeThread(e.to_string()))?;

        self.thread = Some(thread);
        Ok(())
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            debug!("Stopping test pattern thread");
            if thread.join().is_err() {
                warn!("Test pattern thread panicked");
            }
        }
    }
}

impl Drop for TestPatternSource {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Fills a reusable buffer with block-compressed bars
struct PatternGenerator {
    width: u32,
    height: u32,
    pixel_format: PixelFormatTag,
    buffer: Vec<u8>,
}

impl PatternGenerator {
    fn new(descriptor: &SourceDescriptor, pixel_format: PixelFormatTag) -> Self {
        Self {
            width: descriptor.width,
            height: descriptor.height,
            pixel_format,
            buffer: Vec::new(),
        }
    }

    fn block_size(&self) -> usize {
        match self.pixel_format {
            PixelFormatTag::RgbDxt1 => 8,
            _ => 16,
        }
    }

    fn frame(&mut self, index: u64) -> FrameDescriptor<'_> {
        let padded_width = hapflow_core::frame::align_to_block(self.width);
        let padded_height = hapflow_core::frame::align_to_block(self.height);
        let blocks_x = (padded_width / hapflow_core::BLOCK_DIMENSION) as usize;
        let blocks_y = (padded_height / hapflow_core::BLOCK_DIMENSION) as usize;
        let block_size = self.block_size();

        self.buffer.resize(blocks_x * blocks_y * block_size, 0);
        for (i, block) in self.buffer.chunks_exact_mut(block_size).enumerate() {
            let column = (i % blocks_x) as u64;
            let color = bar_color(column * 8 / blocks_x.max(1) as u64 + index / 4);
            let color_block = if block_size == 16 {
                // Opaque alpha: both endpoints 255, all indices 0
                block[..8].copy_from_slice(&[0xFF, 0xFF, 0, 0, 0, 0, 0, 0]);
                &mut block[8..]
            } else {
                block
            };
            color_block[0..2].copy_from_slice(&color.to_le_bytes());
            color_block[2..4].copy_from_slice(&color.to_le_bytes());
            color_block[4..8].fill(0);
        }

        FrameDescriptor::new(self.width, self.height, self.pixel_format, &self.buffer)
    }
}

/// RGB565 color of bar `n`
fn bar_color(n: u64) -> u16 {
    const BARS: [u16; 8] = [
        0xFFFF, // white
        0xFFE0, // yellow
        0x07FF, // cyan
        0x07E0, // green
        0xF81F, // magenta
        0xF800, // red
        0x001F, // blue
        0x0000, // black
    ];
    BARS[(n % BARS.len() as u64) as usize]
}
