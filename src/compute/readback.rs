use bytemuck::Pod;
use wgpu::{Buffer, Device, Queue};

use crate::compute::buffers::create_buffer;
use crate::error::{runtime_error, ComputeErrorContext, KarstResult};

/// Blocking copy of `len` elements starting at element `offset` of a device
/// buffer. The source buffer needs `COPY_SRC` usage.
pub fn read_buffer<T: Pod>(
    device: &Device,
    queue: &Queue,
    buffer: &Buffer,
    offset: u64,
    len: usize,
) -> KarstResult<Vec<T>> {
    if len == 0 {
        return Ok(Vec::new());
    }

    let element = std::mem::size_of::<T>() as u64;
    let size = element * len as u64;
    let download_buffer = create_buffer(
        device,
        "Readback Staging Buffer",
        size,
        wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
    )?;

    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("Readback Encoder"),
    });
    encoder.copy_buffer_to_buffer(buffer, offset * element, &download_buffer, 0, size);
    queue.submit(std::iter::once(encoder.finish()));
    if let Some(error) = pollster::block_on(device.pop_error_scope()) {
        return Err(runtime_error("readback copy", error));
    }

    let buffer_slice = download_buffer.slice(..);
    let (tx, rx) = futures::channel::oneshot::channel();
    buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
        if tx.send(result).is_err() {
            log::error!("[readback] Failed to send map_async result - receiver dropped");
        }
    });

    let _ = device.poll(wgpu::Maintain::Wait);

    match pollster::block_on(rx) {
        Ok(map_result) => map_result.compute_context("readback map")?,
        Err(_) => return Err(runtime_error("readback map", "map_async sender dropped")),
    }

    let data = buffer_slice.get_mapped_range();
    let values = bytemuck::cast_slice::<u8, T>(&data)[..len].to_vec();
    drop(data);
    download_buffer.unmap();

    Ok(values)
}

/// Blocking read of a single element
pub fn read_element<T: Pod>(
    device: &Device,
    queue: &Queue,
    buffer: &Buffer,
    index: u64,
) -> KarstResult<T> {
    read_buffer::<T>(device, queue, buffer, index, 1)?
        .into_iter()
        .next()
        .compute_context("read_element")
}
