use anyhow::{bail, Context, Result};
use wgpu;

/// Headless device for drawing the point field into an offscreen target
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

impl GpuContext {
    /// Open a device able to hold a `width` x `height` render target.
    pub fn new(width: u32, height: u32) -> Result<Self> {
        pollster::block_on(Self::init_async(width, height))
    }

    async fn init_async(width: u32, height: u32) -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        // Machines without a GPU (CI, servers) still get a software adapter
        let adapter = match request_adapter(&instance, false).await {
            Some(adapter) => adapter,
            None => {
                log::warn!("No hardware adapter found, trying a fallback adapter");
                request_adapter(&instance, true)
                    .await
                    .context("No GPU adapter available for offscreen rendering")?
            }
        };

        let info = adapter.get_info();
        log::info!("Using GPU: {} ({:?})", info.name, info.backend);

        let limits = required_limits(width, height, &adapter.limits())?;
        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("nebula_device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: limits,
                    ..Default::default()
                },
                None,
            )
            .await
            .context("Failed to create GPU device")?;

        Ok(Self { device, queue })
    }
}

async fn request_adapter(instance: &wgpu::Instance, fallback: bool) -> Option<wgpu::Adapter> {
    instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: fallback,
        })
        .await
}

/// Downlevel limits, raised just enough for the frame size. Fails early when
/// the adapter cannot hold a target that large.
pub fn required_limits(width: u32, height: u32, adapter: &wgpu::Limits) -> Result<wgpu::Limits> {
    let side = width.max(height);
    if side > adapter.max_texture_dimension_2d {
        bail!(
            "{}x{} exceeds the adapter's {}px texture limit",
            width,
            height,
            adapter.max_texture_dimension_2d
        );
    }
    let base = wgpu::Limits::downlevel_defaults();
    Ok(wgpu::Limits {
        max_texture_dimension_2d: base.max_texture_dimension_2d.max(side),
        ..base
    })
}
