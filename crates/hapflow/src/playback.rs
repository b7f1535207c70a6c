//! Playback loop: a test pattern decode thread feeding a movie, drawn from
//! the main thread at display rate.

use anyhow::{bail, Context, Result};
use hapflow_core::{PlayerConfig, Rect};
use hapflow_media::{
    DecodeSource, FrameSink, HapMovie, MovieEvent, SourceDescriptor, TestPatternSource,
};
use hapflow_render::{
    DrawCommand, FrameRenderer, FrameTexture, HeadlessDevice, HeadlessTexture, TextureDevice,
    WgpuDevice, WgpuTexture,
};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

const DISPLAY_INTERVAL: Duration = Duration::from_millis(16);
const REPORT_INTERVAL: Duration = Duration::from_secs(2);

/// Draws counted over a run
#[derive(Debug, Default, Clone, Copy)]
pub struct DrawCounts {
    pub placeholder: u64,
    pub textured: u64,
}

/// Something that executes draw plans
trait Presenter<D: TextureDevice> {
    fn present(&mut self, command: &DrawCommand, frame: Option<&FrameTexture<D::Texture>>);

    /// Called once per display tick to detect and recover from device loss
    fn poll_device(&mut self, _movie: &HapMovie<D>) -> Result<()> {
        Ok(())
    }
}

/// Only plans draws
struct HeadlessPresenter;

impl Presenter<HeadlessDevice> for HeadlessPresenter {
    fn present(&mut self, _command: &DrawCommand, _frame: Option<&FrameTexture<HeadlessTexture>>) {}
}

/// Renders into an offscreen target on the GPU
struct GpuPresenter {
    device: Arc<WgpuDevice>,
    renderer: FrameRenderer,
    target: wgpu::TextureView,
    viewport: Rect,
}

impl GpuPresenter {
    const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

    fn new(device: Arc<WgpuDevice>, viewport: Rect) -> Self {
        let renderer = FrameRenderer::new(device.device.clone(), Self::TARGET_FORMAT);
        let target = Self::create_target(&device, viewport);
        Self {
            device,
            renderer,
            target,
            viewport,
        }
    }

    fn create_target(device: &WgpuDevice, viewport: Rect) -> wgpu::TextureView {
        let texture = device.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Playback Target"),
            size: wgpu::Extent3d {
                width: viewport.width().max(1.0) as u32,
                height: viewport.height().max(1.0) as u32,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::TARGET_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        texture.create_view(&wgpu::TextureViewDescriptor::default())
    }
}

impl Presenter<WgpuDevice> for GpuPresenter {
    fn present(&mut self, command: &DrawCommand, frame: Option<&FrameTexture<WgpuTexture>>) {
        let mut encoder = self
            .device
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Playback Encoder"),
            });
        self.renderer.draw(
            &self.device.queue,
            &mut encoder,
            &self.target,
            self.viewport,
            command,
            frame.map(|f| &f.texture),
        );
        self.device.queue.submit(Some(encoder.finish()));
    }

    fn poll_device(&mut self, movie: &HapMovie<WgpuDevice>) -> Result<()> {
        if !self.device.is_lost() {
            return Ok(());
        }
        movie.on_host_device_lost();

        warn!("Recreating GPU device");
        let device = Arc::new(
            pollster::block_on(WgpuDevice::new()).context("Failed to recreate GPU device")?,
        );
        movie.on_host_device_restored(device.clone());
        *self = Self::new(device, self.viewport);
        Ok(())
    }
}

/// Play the configured test pattern, on the GPU unless `headless`
pub fn run(config: &PlayerConfig, headless: bool) -> Result<DrawCounts> {
    let viewport = Rect::from_size(
        config.playback.width as f32,
        config.playback.height as f32,
    );

    if !headless {
        match pollster::block_on(WgpuDevice::new()) {
            Ok(device) => {
                let device = Arc::new(device);
                let presenter = GpuPresenter::new(device.clone(), viewport);
                return play(config, device, presenter, viewport);
            }
            Err(e) => warn!("GPU unavailable ({}), falling back to headless playback", e),
        }
    }

    play(config, Arc::new(HeadlessDevice::new()), HeadlessPresenter, viewport)
}

fn play<D, P>(
    config: &PlayerConfig,
    device: Arc<D>,
    mut presenter: P,
    viewport: Rect,
) -> Result<DrawCounts>
where
    D: TextureDevice,
    P: Presenter<D>,
{
    let playback = &config.playback;
    let codec_type = playback
        .codec
        .fourcc()
        .context("playback.codec must be a Hap variant")?;
    let descriptor = SourceDescriptor {
        codec_type,
        width: playback.width,
        height: playback.height,
        fps: playback.fps,
        frame_count: playback.frames,
    };

    let movie = Arc::new(HapMovie::new(device, &config.stream));
    movie.open(&descriptor).context("Failed to open source")?;
    let events = movie.events();

    let mut source = TestPatternSource::new(descriptor, playback.frames);
    source
        .start(movie.clone() as Arc<dyn FrameSink>)
        .context("Failed to start decoding")?;

    let mut counts = DrawCounts::default();
    let mut last_report = Instant::now();

    let degraded = loop {
        let tick = Instant::now();
        presenter.poll_device(&movie)?;

        let (command, frame) = movie.plan_draw(viewport);
        presenter.present(&command, frame.as_ref());
        match command {
            DrawCommand::Placeholder { .. } => counts.placeholder += 1,
            DrawCommand::Textured { .. } => counts.textured += 1,
        }

        for event in events.try_iter() {
            if let MovieEvent::FrameDropped { reason } = &event {
                debug!("Frame dropped: {}", reason);
            }
        }
        if let Some(failures) = movie.degradation() {
            error!("Stopping playback after {} consecutive upload failures", failures);
            break Some(failures);
        }

        if last_report.elapsed() >= REPORT_INTERVAL {
            let stats = movie.stats();
            info!(
                "Playback {:.1} fps, {} uploaded, {} dropped",
                movie.playback_framerate(),
                stats.frames_uploaded,
                stats.frames_dropped
            );
            last_report = Instant::now();
        }

        if !source.is_running() {
            break None;
        }
        let elapsed = tick.elapsed();
        if elapsed < DISPLAY_INTERVAL {
            thread::sleep(DISPLAY_INTERVAL - elapsed);
        }
    };

    source.stop();
    movie.close();

    let stats = movie.stats();
    info!(
        "Finished: {} frames received, {} uploaded, {} dropped, {} draws ({} placeholder)",
        stats.frames_received,
        stats.frames_uploaded,
        stats.frames_dropped,
        counts.placeholder + counts.textured,
        counts.placeholder
    );

    if let Some(failures) = degraded {
        bail!("playback degraded after {} consecutive upload failures", failures);
    }
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hapflow_core::CodecVariant;

    #[test]
    fn test_headless_playback_draws_frames() {
        let mut config = PlayerConfig::default();
        config.playback.width = 130;
        config.playback.height = 70;
        config.playback.fps = 120.0;
        config.playback.frames = 24;
        config.playback.codec = CodecVariant::Quality;

        let counts = run(&config, true).unwrap();
        assert!(counts.textured > 0);
    }
}
