//! wgpu texture device.

use crate::device::{BackingDescriptor, BlockRegion, DeviceError, TextureDevice};
use crate::format::{check_bc_support, DxtFormat};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

/// A BC texture on the GPU and its default view
#[derive(Clone)]
pub struct WgpuTexture {
    pub id: u64,
    pub texture: Arc<wgpu::Texture>,
    pub view: Arc<wgpu::TextureView>,
    pub width: u32,
    pub height: u32,
    pub format: DxtFormat,
}

impl WgpuTexture {
    /// Wrap a texture created by the host.
    ///
    /// Fails if the texture is not BC1/BC3 or cannot be written to.
    pub fn from_external(texture: Arc<wgpu::Texture>) -> Result<Self, DeviceError> {
        let format = DxtFormat::from_wgpu_format(texture.format()).ok_or_else(|| {
            DeviceError::Unsupported(format!(
                "external texture format {:?} is not BC1/BC3",
                texture.format()
            ))
        })?;
        if !texture.usage().contains(wgpu::TextureUsages::COPY_DST) {
            return Err(DeviceError::Unsupported(
                "external texture lacks COPY_DST usage".to_string(),
            ));
        }
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Ok(Self {
            id: next_texture_id(),
            width: texture.width(),
            height: texture.height(),
            texture,
            view: Arc::new(view),
            format,
        })
    }
}

impl PartialEq for WgpuTexture {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl fmt::Debug for WgpuTexture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WgpuTexture")
            .field("id", &self.id)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .finish()
    }
}

fn next_texture_id() -> u64 {
    static NEXT_ID: AtomicU64 = AtomicU64::new(1);
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// GPU device that uploads compressed blocks through the wgpu queue
pub struct WgpuDevice {
    pub device: Arc<wgpu::Device>,
    pub queue: Arc<wgpu::Queue>,
    pub adapter_info: Option<wgpu::AdapterInfo>,
    lost: Arc<AtomicBool>,
}

impl WgpuDevice {
    /// Create a device on the best adapter with BC texture support.
    ///
    /// Vulkan, Metal and DX12 are tried first; GL only if none of them
    /// yields a usable adapter.
    pub async fn new() -> Result<Self, DeviceError> {
        let primary = wgpu::Backends::all() & !wgpu::Backends::GL;
        match Self::new_with_backends(primary).await {
            Ok(device) => Ok(device),
            Err(e) => {
                info!("Primary backend initialization failed ({}), attempting GL fallback...", e);
                Self::new_with_backends(wgpu::Backends::GL).await
            }
        }
    }

    pub async fn new_with_backends(backends: wgpu::Backends) -> Result<Self, DeviceError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends,
            ..Default::default()
        });

        // Prefer discrete > integrated > virtual > cpu among BC-capable adapters
        let mut best: Option<(i32, wgpu::Adapter)> = None;
        for adapter in instance.enumerate_adapters(backends) {
            if !check_bc_support(&adapter) {
                continue;
            }
            let score = match adapter.get_info().device_type {
                wgpu::DeviceType::DiscreteGpu => 3,
                wgpu::DeviceType::IntegratedGpu => 2,
                wgpu::DeviceType::VirtualGpu => 1,
                wgpu::DeviceType::Cpu | wgpu::DeviceType::Other => 0,
            };
            if best.as_ref().map_or(true, |(s, _)| score > *s) {
                best = Some((score, adapter));
            }
        }

        let (_, adapter) = best.ok_or_else(|| {
            DeviceError::Unsupported("no adapter with BC texture compression".to_string())
        })?;

        let adapter_info = adapter.get_info();
        info!(
            "Selected adapter: {} ({:?}, {:?})",
            adapter_info.name, adapter_info.backend, adapter_info.device_type
        );

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("HapFlow Device"),
                required_features: wgpu::Features::TEXTURE_COMPRESSION_BC,
                required_limits: wgpu::Limits::default(),
                memory_hints: Default::default(),
                ..Default::default()
            })
            .await
            .map_err(|e: wgpu::RequestDeviceError| DeviceError::Api(e.to_string()))?;

        let mut created = Self::from_existing(Arc::new(device), Arc::new(queue))?;
        created.adapter_info = Some(adapter_info);
        Ok(created)
    }

    /// Use a device owned by the host application.
    ///
    /// The device must have `TEXTURE_COMPRESSION_BC` enabled.
    pub fn from_existing(
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
    ) -> Result<Self, DeviceError> {
        if !device
            .features()
            .contains(wgpu::Features::TEXTURE_COMPRESSION_BC)
        {
            return Err(DeviceError::Unsupported(
                "device was created without TEXTURE_COMPRESSION_BC".to_string(),
            ));
        }

        let lost = Arc::new(AtomicBool::new(false));
        let flag = lost.clone();
        device.set_device_lost_callback(move |reason, message| {
            error!("wgpu device lost ({:?}): {}", reason, message);
            flag.store(true, Ordering::Release);
        });

        Ok(Self {
            device,
            queue,
            adapter_info: None,
            lost,
        })
    }

    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::Acquire)
    }

    fn check_lost(&self) -> Result<(), DeviceError> {
        if self.is_lost() {
            Err(DeviceError::Lost)
        } else {
            Ok(())
        }
    }

    /// Run `f` inside a validation error scope
    fn scoped<R>(&self, f: impl FnOnce() -> R) -> Result<R, DeviceError> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = f();
        match pollster::block_on(self.device.pop_error_scope()) {
            None => Ok(value),
            Some(e) => {
                self.check_lost()?;
                warn!("wgpu validation error: {}", e);
                Err(DeviceError::Api(e.to_string()))
            }
        }
    }
}

impl TextureDevice for WgpuDevice {
    type Texture = WgpuTexture;

    fn create_texture(&self, desc: &BackingDescriptor<'_>) -> Result<WgpuTexture, DeviceError> {
        self.check_lost()?;

        let texture = self.scoped(|| {
            self.device.create_texture(&wgpu::TextureDescriptor {
                label: desc.label,
                size: wgpu::Extent3d {
                    width: desc.width,
                    height: desc.height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: desc.format.wgpu_format(),
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            })
        })?;
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        Ok(WgpuTexture {
            id: next_texture_id(),
            texture: Arc::new(texture),
            view: Arc::new(view),
            width: desc.width,
            height: desc.height,
            format: desc.format,
        })
    }

    fn write_blocks(
        &self,
        texture: &WgpuTexture,
        region: &BlockRegion,
        data: &[u8],
    ) -> Result<(), DeviceError> {
        self.check_lost()?;

        self.scoped(|| {
            self.queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &texture.texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                data,
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(region.bytes_per_row()),
                    rows_per_image: Some(region.block_rows()),
                },
                wgpu::Extent3d {
                    width: region.width,
                    height: region.height,
                    depth_or_array_layers: 1,
                },
            );
        })
    }
}
