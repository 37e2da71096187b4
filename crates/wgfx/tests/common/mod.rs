//! Shared helpers for `wgfx` integration tests.

#![allow(dead_code)]

use std::sync::Once;

pub fn require_gpu() -> bool {
    let Ok(raw) = std::env::var("WGFX_REQUIRE_GPU") else {
        return false;
    };

    let v = raw.trim();
    v == "1" || v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("yes")
}

pub fn skip_or_panic(test_name: &str, reason: &str) {
    if require_gpu() {
        panic!("WGFX_REQUIRE_GPU is enabled but {test_name} cannot run: {reason}");
    }
    eprintln!("skipping {test_name}: {reason}");
}

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt().with_max_level(tracing::Level::DEBUG).with_test_writer().try_init();
    });
}

/// Requests a device, or returns `None` (after logging why) when no adapter is available
pub fn device(test_name: &str) -> Option<(wgpu::Device, wgpu::Queue)> {
    init_logging();

    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
    let adapter = match pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::LowPower,
        compatible_surface: None,
        force_fallback_adapter: false,
    })) {
        Ok(adapter) => adapter,
        Err(e) => {
            skip_or_panic(test_name, &format!("wgpu adapter not found: {e}"));
            return None;
        }
    };

    match pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
        label: Some(test_name),
        required_features: wgpu::Features::empty(),
        required_limits: wgpu::Limits::downlevel_defaults(),
        memory_hints: wgpu::MemoryHints::Performance,
        trace: wgpu::Trace::Off,
    })) {
        Ok(pair) => Some(pair),
        Err(e) => {
            skip_or_panic(test_name, &format!("request_device failed: {e}"));
            None
        }
    }
}

/// Creates an `Rgba8Unorm` input texture that accepts uploads
pub fn input_texture(device: &wgpu::Device, width: u32, height: u32) -> wgpu::Texture {
    texture(device, "INPUT", width, height, wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST | wgpu::TextureUsages::COPY_SRC)
}

/// Creates an `Rgba8Unorm` output texture that can be read back
pub fn output_texture(device: &wgpu::Device, width: u32, height: u32) -> wgpu::Texture {
    texture(device, "OUTPUT", width, height, wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_SRC)
}

fn texture(device: &wgpu::Device, label: &str, width: u32, height: u32, usage: wgpu::TextureUsages) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8Unorm,
        usage,
        view_formats: &[],
    })
}

/// Waits for a mapped read of `buffer` and returns its contents
fn read_mapped(device: &wgpu::Device, buffer: &wgpu::Buffer) -> Vec<u8> {
    let buffer_slice = buffer.slice(..);
    let (sender, receiver) = futures_intrusive::channel::shared::oneshot_channel();
    buffer_slice.map_async(wgpu::MapMode::Read, move |v| sender.send(v).unwrap());

    device.poll(wgpu::PollType::Wait).unwrap();
    pollster::block_on(receiver.receive()).unwrap().unwrap();

    let data = buffer_slice.get_mapped_range().to_vec();
    buffer.unmap();
    data
}

/// Reads an `Rgba8Unorm` texture back as an image
pub fn read_texture(device: &wgpu::Device, queue: &wgpu::Queue, texture: &wgpu::Texture) -> image::RgbaImage {
    let (width, height) = (texture.width(), texture.height());
    let unpadded = width * 4;
    let bytes_per_row = unpadded.next_multiple_of(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);

    let buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Readback Buffer"),
        size: (bytes_per_row * height) as u64,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("Copy Encoder") });
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &buffer,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(bytes_per_row),
                rows_per_image: Some(height),
            },
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
    queue.submit(std::iter::once(encoder.finish()));

    let data = read_mapped(device, &buffer);
    let pixels = data.chunks(bytes_per_row as usize).flat_map(|row| row[..unpadded as usize].iter().copied()).collect();
    image::RgbaImage::from_raw(width, height, pixels).unwrap()
}

/// Reads a buffer that has `COPY_SRC` usage
pub fn read_buffer(device: &wgpu::Device, queue: &wgpu::Queue, source: &wgpu::Buffer) -> Vec<u8> {
    let buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Readback Buffer"),
        size: source.size(),
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });
    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("Copy Encoder") });
    encoder.copy_buffer_to_buffer(source, 0, &buffer, 0, source.size());
    queue.submit(std::iter::once(encoder.finish()));
    read_mapped(device, &buffer)
}
