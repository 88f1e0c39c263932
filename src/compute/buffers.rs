//! Device buffer allocation with runtime errors captured instead of panicking

use crate::error::{runtime_error, KarstResult};
use wgpu::util::DeviceExt;
use wgpu::{Buffer, BufferUsages, Device};

/// Allocate an uninitialised (zero-filled) device buffer
pub fn create_buffer(
    device: &Device,
    label: &str,
    size: u64,
    usage: BufferUsages,
) -> KarstResult<Buffer> {
    push_allocation_scopes(device);
    let buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size: align_size(size),
        usage,
        mapped_at_creation: false,
    });
    pop_allocation_scopes(device, label)?;

    log::debug!("[buffers] Allocated {} ({} bytes)", label, size);
    Ok(buffer)
}

/// Allocate a device buffer holding `contents`
pub fn create_buffer_init(
    device: &Device,
    label: &str,
    contents: &[u8],
    usage: BufferUsages,
) -> KarstResult<Buffer> {
    push_allocation_scopes(device);
    let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(label),
        contents,
        usage,
    });
    pop_allocation_scopes(device, label)?;

    log::debug!("[buffers] Uploaded {} ({} bytes)", label, contents.len());
    Ok(buffer)
}

/// Round a byte size up to the copy alignment; bindings may not be empty
fn align_size(size: u64) -> u64 {
    let align = wgpu::COPY_BUFFER_ALIGNMENT;
    size.max(align).div_ceil(align) * align
}

fn push_allocation_scopes(device: &Device) {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
}

fn pop_allocation_scopes(device: &Device, label: &str) -> KarstResult<()> {
    let out_of_memory = pollster::block_on(device.pop_error_scope());
    let validation = pollster::block_on(device.pop_error_scope());
    match out_of_memory.or(validation) {
        Some(error) => Err(runtime_error(label, error)),
        None => Ok(()),
    }
}
