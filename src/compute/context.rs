use std::sync::Arc;
use wgpu::{Device, Queue};

use crate::compute::program::{build_program, Binding, Kernel, Program};
use crate::compute::source::KernelSource;
use crate::compute::UTIL_KERNEL;
use crate::config::ComputeConfig;
use crate::constants::{self, kernels};
use crate::error::{ComputeErrorContext, KarstError, KarstResult};

/// One command-queue lane over the shared device
#[derive(Debug, Clone)]
pub struct Lane {
    index: usize,
    queue: Arc<Queue>,
    adapter_name: String,
    limits: wgpu::Limits,
}

impl Lane {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn queue(&self) -> &Arc<Queue> {
        &self.queue
    }

    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    pub fn limits(&self) -> &wgpu::Limits {
        &self.limits
    }
}

/// Owns the device, its queue lanes and the kernels shared by every grid.
///
/// wgpu exposes a single queue per device, so the lanes are handles to that
/// queue. Work split across lanes is still issued as independent submissions
/// and waited on together.
pub struct Context {
    device: Arc<Device>,
    lanes: Vec<Lane>,
    source: KernelSource,
    wgsl_header: String,
    blob_capacity: u32,
    mem_set: Arc<Kernel>,
}

impl Context {
    /// Discover an adapter, open a device on it and build the shared kernels
    pub fn new(config: &ComputeConfig) -> KarstResult<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = request_adapter(&instance, config)?;
        let info = adapter.get_info();
        log::info!("[Context] Adapter: {} ({:?})", info.name, info.device_type);
        log::info!("[Context] Backend: {:?}", info.backend);
        log::info!("[Context] Vendor: 0x{:04x}, Device: 0x{:04x}", info.vendor, info.device);
        log::info!("[Context] Driver: {} {}", info.driver, info.driver_info);

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("Karstgen Device"),
                required_features: wgpu::Features::empty(),
                required_limits: adapter.limits(),
            },
            None,
        ))
        .compute_context("request_device")?;

        Self::assemble(Arc::new(device), Arc::new(queue), info.name, config)
    }

    /// Wrap a device already opened on the adapter described by `info`
    pub fn from_device(
        device: Arc<Device>,
        queue: Arc<Queue>,
        info: &wgpu::AdapterInfo,
        config: &ComputeConfig,
    ) -> KarstResult<Self> {
        Self::assemble(device, queue, info.name.clone(), config)
    }

    fn assemble(
        device: Arc<Device>,
        queue: Arc<Queue>,
        adapter_name: String,
        config: &ComputeConfig,
    ) -> KarstResult<Self> {
        let limits = device.limits();
        let lanes: Vec<Lane> = (0..config.queue_lanes.max(1))
            .map(|index| Lane {
                index,
                queue: queue.clone(),
                adapter_name: adapter_name.clone(),
                limits: limits.clone(),
            })
            .collect();

        let blob_capacity = constants::blob_capacity(limits.max_uniform_buffer_binding_size);
        let wgsl_header = constants::generate_wgsl_constants(blob_capacity);
        let source = KernelSource::from_dir(config.kernel_dir.clone());

        let util = build_program(&device, &lanes, &source, &wgsl_header, UTIL_KERNEL)?;
        let mem_set = util.kernel(
            "memSet",
            &[Binding::Uniform, Binding::Storage],
            kernels::MEMSET_THREADS_PER_WG,
        )?;

        log::info!(
            "[Context] Ready with {} lane(s), blob chunk capacity {}",
            lanes.len(),
            blob_capacity
        );

        Ok(Self {
            device,
            lanes,
            source,
            wgsl_header,
            blob_capacity,
            mem_set: Arc::new(mem_set),
        })
    }

    /// Compile a kernel source file for every lane
    pub fn build_program(&self, path: &str) -> KarstResult<Program> {
        build_program(&self.device, &self.lanes, &self.source, &self.wgsl_header, path)
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    pub fn lanes(&self) -> &[Lane] {
        &self.lanes
    }

    /// Lane used for transfers and single-queue launches
    pub fn first_lane(&self) -> &Lane {
        &self.lanes[0]
    }

    /// Blob records that fit in one uniform upload
    pub fn blob_capacity(&self) -> u32 {
        self.blob_capacity
    }

    pub fn mem_set_kernel(&self) -> &Arc<Kernel> {
        &self.mem_set
    }
}

/// Request an adapter, degrading from the preferred power mode to the
/// fallback adapter
fn request_adapter(instance: &wgpu::Instance, config: &ComputeConfig) -> KarstResult<wgpu::Adapter> {
    let mut options = wgpu::RequestAdapterOptions {
        power_preference: config.power_preference.into(),
        force_fallback_adapter: config.force_fallback_adapter,
        compatible_surface: None,
    };

    if let Some(adapter) = pollster::block_on(instance.request_adapter(&options)) {
        return Ok(adapter);
    }

    log::warn!("[Context] No {:?} adapter found, trying low power...", options.power_preference);
    options.power_preference = wgpu::PowerPreference::LowPower;
    if let Some(adapter) = pollster::block_on(instance.request_adapter(&options)) {
        return Ok(adapter);
    }

    log::warn!("[Context] No low-power adapter found, trying fallback...");
    options.force_fallback_adapter = true;
    pollster::block_on(instance.request_adapter(&options)).ok_or_else(|| {
        KarstError::DeviceCapability {
            component: "Context".to_string(),
            requirement: "a compute-capable adapter".to_string(),
        }
    })
}
