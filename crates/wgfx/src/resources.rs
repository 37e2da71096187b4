//! GPU resources of a compiled effect
//!
//! The [`ResourceManager`] owns every texture, sampler and uniform buffer an effect
//! needs. Declared textures are sized by evaluating their size expressions against
//! the caller's `INPUT` and `OUTPUT` textures, which are registered but never owned.

use crate::error::WgfxError;
use bytemuck::{Pod, Zeroable};
use bytes::Bytes;
use std::collections::HashMap;
use tracing::Level;
use wgfx_build::ir::{AddressMode, FilterMode, INPUT, OUTPUT, SamplerInfo};
use wgfx_build::layout::DEFAULT_SAMPLER_NAME;
use wgfx_build::{CompileError, LogConfig, ParameterBlock, ParameterValue, SizeContext, TextureFormat, WgfxShaderInfo};

/// Usage flags of textures allocated for `TEXTURE` declarations
pub const TEXTURE_USAGE_INTERMEDIATE: wgpu::TextureUsages = wgpu::TextureUsages::STORAGE_BINDING
    .union(wgpu::TextureUsages::TEXTURE_BINDING)
    .union(wgpu::TextureUsages::COPY_DST)
    .union(wgpu::TextureUsages::COPY_SRC);

/// Converts an effect texture format to its wgpu counterpart
pub fn wgpu_format(format: TextureFormat) -> wgpu::TextureFormat {
    match format {
        TextureFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        TextureFormat::Rgba8Snorm => wgpu::TextureFormat::Rgba8Snorm,
        TextureFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
        TextureFormat::R32Float => wgpu::TextureFormat::R32Float,
        TextureFormat::Rg32Float => wgpu::TextureFormat::Rg32Float,
        TextureFormat::Rgba32Float => wgpu::TextureFormat::Rgba32Float,
    }
}

/// Converts a wgpu texture format to an effect format, if it is one an effect can write
pub fn effect_format(format: wgpu::TextureFormat) -> Option<TextureFormat> {
    match format {
        wgpu::TextureFormat::Rgba8Unorm => Some(TextureFormat::Rgba8Unorm),
        wgpu::TextureFormat::Rgba8Snorm => Some(TextureFormat::Rgba8Snorm),
        wgpu::TextureFormat::Rgba16Float => Some(TextureFormat::Rgba16Float),
        wgpu::TextureFormat::R32Float => Some(TextureFormat::R32Float),
        wgpu::TextureFormat::Rg32Float => Some(TextureFormat::Rg32Float),
        wgpu::TextureFormat::Rgba32Float => Some(TextureFormat::Rgba32Float),
        _ => None,
    }
}

/// How a texture view will be bound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewMode {
    /// Bound as `texture_2d<f32>`
    Sampled,
    /// Bound as a write-only storage texture
    Storage,
}

/// Caller-owned textures an effect reads from and writes to
#[derive(Debug, Clone)]
pub struct ExternalResources {
    /// Bound as `INPUT`; needs `TEXTURE_BINDING`, and `COPY_DST` for uploads
    pub input: wgpu::Texture,
    /// Bound as `OUTPUT`; needs `STORAGE_BINDING`
    pub output: wgpu::Texture,
}

impl ExternalResources {
    fn input_size(&self) -> (u32, u32) {
        (self.input.width(), self.input.height())
    }

    fn output_size(&self) -> (u32, u32) {
        (self.output.width(), self.output.height())
    }
}

/// Tightly packed pixel data to upload into a texture
#[derive(Debug, Clone, PartialEq)]
pub struct ImageSource {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Texel format of `data`
    pub format: TextureFormat,
    /// Rows of `width * format.bytes_per_texel()` bytes, top to bottom
    pub data: Bytes,
}

impl From<&image::RgbaImage> for ImageSource {
    fn from(image: &image::RgbaImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
            format: TextureFormat::Rgba8Unorm,
            data: Bytes::copy_from_slice(image.as_raw()),
        }
    }
}

impl From<&image::Rgba32FImage> for ImageSource {
    fn from(image: &image::Rgba32FImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
            format: TextureFormat::Rgba32Float,
            data: Bytes::copy_from_slice(bytemuck::cast_slice::<f32, u8>(image.as_raw().as_slice())),
        }
    }
}

/// Contents of the scene uniform, laid out like the generated `WgfxScene` struct
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct SceneConstants {
    pub input_size: [u32; 2],
    pub output_size: [u32; 2],
    /// Size of one input pixel in normalized coordinates
    pub input_pt: [f32; 2],
    /// Size of one output pixel in normalized coordinates
    pub output_pt: [f32; 2],
    pub frame_count: u32,
    /// Seconds, as reported by the caller
    pub time: f32,
    pub _padding: [u32; 2],
}

impl SceneConstants {
    fn set_sizes(&mut self, input: (u32, u32), output: (u32, u32)) {
        self.input_size = [input.0, input.1];
        self.output_size = [output.0, output.1];
        self.input_pt = [1.0 / input.0 as f32, 1.0 / input.1 as f32];
        self.output_pt = [1.0 / output.0 as f32, 1.0 / output.1 as f32];
    }
}

/// A texture together with the views handed out for it
#[derive(Debug)]
struct ManagedTexture {
    texture: wgpu::Texture,
    sampled_view: wgpu::TextureView,
    storage_view: wgpu::TextureView,
    /// Whether the caller owns the texture
    external: bool,
}

impl ManagedTexture {
    fn new(name: &str, texture: wgpu::Texture, external: bool) -> Self {
        let sampled_view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(&format!("{name} (sampled)")),
            ..Default::default()
        });
        let storage_view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(&format!("{name} (storage)")),
            ..Default::default()
        });
        Self {
            texture,
            sampled_view,
            storage_view,
            external,
        }
    }

    fn size(&self) -> (u32, u32) {
        (self.texture.width(), self.texture.height())
    }
}

/// Owner of an effect's textures, samplers and uniform buffers
#[derive(Debug)]
pub struct ResourceManager {
    device: wgpu::Device,
    queue: wgpu::Queue,
    log: LogConfig,
    info: WgfxShaderInfo,
    textures: HashMap<String, ManagedTexture>,
    samplers: HashMap<String, wgpu::Sampler>,
    nearest_samplers: HashMap<String, wgpu::Sampler>,
    parameters: ParameterBlock,
    parameter_buffer: Option<wgpu::Buffer>,
    scene: SceneConstants,
    scene_buffer: wgpu::Buffer,
}

impl ResourceManager {
    /// Allocates every resource an effect declares
    ///
    /// # Arguments
    /// * `device` - The wgpu device for resource creation
    /// * `queue` - The queue used for uploads
    /// * `info` - Parsed effect
    /// * `externals` - Caller-owned `INPUT` and `OUTPUT` textures
    /// * `log` - Logging configuration
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue, info: &WgfxShaderInfo, externals: &ExternalResources, log: LogConfig) -> Result<Self, WgfxError> {
        let parameters = ParameterBlock::new(&info.parameters);
        let parameter_buffer = (!parameters.layout().is_empty()).then(|| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("wgfx parameters"),
                size: parameters.layout().size as u64,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC,
                mapped_at_creation: false,
            })
        });
        let scene_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("wgfx scene"),
            size: std::mem::size_of::<SceneConstants>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut samplers = HashMap::new();
        let mut nearest_samplers = HashMap::new();
        let default_sampler = SamplerInfo {
            name: DEFAULT_SAMPLER_NAME.to_string(),
            filter: FilterMode::Linear,
            address: AddressMode::ClampToEdge,
        };
        for sampler in std::iter::once(&default_sampler).chain(&info.samplers) {
            samplers.insert(sampler.name.clone(), create_sampler(device, sampler));
            let nearest = SamplerInfo {
                filter: FilterMode::Nearest,
                ..sampler.clone()
            };
            nearest_samplers.insert(sampler.name.clone(), create_sampler(device, &nearest));
        }

        let mut manager = Self {
            device: device.clone(),
            queue: queue.clone(),
            log,
            info: info.clone(),
            textures: HashMap::new(),
            samplers,
            nearest_samplers,
            parameters,
            parameter_buffer,
            scene: SceneConstants::default(),
            scene_buffer,
        };
        manager.resize(externals)?;
        if let Some(buffer) = &manager.parameter_buffer {
            manager.queue.write_buffer(buffer, 0, manager.parameters.as_bytes());
        }
        Ok(manager)
    }

    /// Re-evaluates every size expression against new external textures
    ///
    /// Textures whose size changed are reallocated; views obtained before the call
    /// refer to the old textures and must not be used again.
    pub fn resize(&mut self, externals: &ExternalResources) -> Result<(), WgfxError> {
        // generated modules declare the OUTPUT storage format
        if let Some(current) = self.textures.get(OUTPUT).filter(|t| t.texture.format() != externals.output.format()) {
            return Err(CompileError::resolution(None, OUTPUT, format!("format changed from {:?} to {:?}, recompile the effect", current.texture.format(), externals.output.format())).into());
        }
        let mut context = SizeContext::new(externals.input_size(), externals.output_size());
        let sizes = context.evaluate_all(&self.info.textures)?;

        self.textures.insert(INPUT.to_string(), ManagedTexture::new(INPUT, externals.input.clone(), true));
        self.textures.insert(OUTPUT.to_string(), ManagedTexture::new(OUTPUT, externals.output.clone(), true));

        for (texture, (width, height)) in self.info.textures.iter().zip(sizes) {
            if self.textures.get(&texture.name).is_some_and(|t| t.size() == (width, height)) {
                continue;
            }
            if self.log.enabled(Level::DEBUG) {
                tracing::debug!("allocating texture {} ({width}x{height}, {})", texture.name, texture.format_or_default());
            }
            let allocated = self.device.create_texture(&wgpu::TextureDescriptor {
                label: Some(&texture.name),
                size: wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu_format(texture.format_or_default()),
                usage: TEXTURE_USAGE_INTERMEDIATE,
                view_formats: &[],
            });
            if let Some(old) = self.textures.insert(texture.name.clone(), ManagedTexture::new(&texture.name, allocated, false)) {
                old.texture.destroy();
            }
        }

        self.scene.set_sizes(externals.input_size(), externals.output_size());
        self.write_scene();
        Ok(())
    }

    /// Returns the texture registered under `name`, sentinels included
    pub fn get_texture(&self, name: &str) -> Option<&wgpu::Texture> {
        self.textures.get(name).map(|t| &t.texture)
    }

    /// Returns a view of the texture registered under `name`
    pub fn get_texture_view(&self, name: &str, mode: ViewMode) -> Option<&wgpu::TextureView> {
        self.textures.get(name).map(|t| match mode {
            ViewMode::Sampled => &t.sampled_view,
            ViewMode::Storage => &t.storage_view,
        })
    }

    /// Current size of a texture
    pub fn texture_size(&self, name: &str) -> Option<(u32, u32)> {
        self.textures.get(name).map(ManagedTexture::size)
    }

    /// Returns a sampler by name; the default sampler is `wgfx_sampler`
    pub fn get_sampler(&self, name: &str) -> Option<&wgpu::Sampler> {
        self.samplers.get(name)
    }

    /// Returns the nearest-filtering variant of a sampler, for passes that sample non-filterable textures
    pub fn get_nearest_sampler(&self, name: &str) -> Option<&wgpu::Sampler> {
        self.nearest_samplers.get(name)
    }

    /// Parameter uniform buffer, if the effect declares parameters
    pub fn get_uniform_buffer(&self) -> Option<&wgpu::Buffer> {
        self.parameter_buffer.as_ref()
    }

    /// Scene uniform buffer
    pub fn get_scene_buffer(&self) -> &wgpu::Buffer {
        &self.scene_buffer
    }

    /// Current scene constants
    pub fn scene(&self) -> &SceneConstants {
        &self.scene
    }

    /// Current parameter values and their packed image
    pub fn parameters(&self) -> &ParameterBlock {
        &self.parameters
    }

    /// Current value of a parameter
    pub fn parameter_value(&self, name: &str) -> Option<&ParameterValue> {
        self.parameters.get(name)
    }

    /// Updates a parameter and uploads the packed block
    ///
    /// # Returns
    /// The stored value after coercion and clamping
    pub fn set_parameter(&mut self, name: &str, value: ParameterValue) -> Result<ParameterValue, WgfxError> {
        let stored = self.parameters.set(name, value)?;
        if let Some(buffer) = &self.parameter_buffer {
            self.queue.write_buffer(buffer, 0, self.parameters.as_bytes());
        }
        if self.log.enabled(Level::TRACE) {
            tracing::trace!("parameter {name} = {stored}");
        }
        Ok(stored)
    }

    /// Uploads pixel data into a texture
    ///
    /// The image must match the texture's size and format exactly.
    pub fn update_texture_from_image(&self, name: &str, image: &ImageSource) -> Result<(), WgfxError> {
        let texture = self.get_texture(name).ok_or_else(|| CompileError::resolution(None, name, "no texture with this name"))?;
        let expected = (texture.width(), texture.height());
        if expected != (image.width, image.height) {
            return Err(WgfxError::DimensionMismatch {
                name: name.to_string(),
                expected,
                actual: (image.width, image.height),
            });
        }
        if texture.format() != wgpu_format(image.format) {
            return Err(CompileError::resolution(None, name, format!("image format {} does not match texture format {:?}", image.format, texture.format())).into());
        }
        let bytes_per_row = image.width * image.format.bytes_per_texel();
        if image.data.len() as u64 != bytes_per_row as u64 * image.height as u64 {
            return Err(WgfxError::DimensionMismatch {
                name: name.to_string(),
                expected,
                actual: (image.width, (image.data.len() as u64 / bytes_per_row.max(1) as u64) as u32),
            });
        }

        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &image.data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(bytes_per_row),
                rows_per_image: Some(image.height),
            },
            wgpu::Extent3d {
                width: image.width,
                height: image.height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    /// Sets the frame counter and time of the scene uniform
    pub fn update_scene(&mut self, frame_count: u32, time: f32) {
        self.scene.frame_count = frame_count;
        self.scene.time = time;
        self.write_scene();
    }

    fn write_scene(&self) {
        self.queue.write_buffer(&self.scene_buffer, 0, bytemuck::bytes_of(&self.scene));
    }

    /// Releases every owned resource; external textures are left alone
    pub fn dispose(&mut self) {
        for (_, texture) in self.textures.drain() {
            if !texture.external {
                texture.texture.destroy();
            }
        }
        self.samplers.clear();
        self.nearest_samplers.clear();
        if let Some(buffer) = self.parameter_buffer.take() {
            buffer.destroy();
        }
        self.scene_buffer.destroy();
    }
}

/// Creates a sampler for a `SAMPLER` declaration
fn create_sampler(device: &wgpu::Device, sampler: &SamplerInfo) -> wgpu::Sampler {
    let filter = match sampler.filter {
        FilterMode::Nearest => wgpu::FilterMode::Nearest,
        FilterMode::Linear => wgpu::FilterMode::Linear,
    };
    let address = match sampler.address {
        AddressMode::ClampToEdge => wgpu::AddressMode::ClampToEdge,
        AddressMode::Repeat => wgpu::AddressMode::Repeat,
        AddressMode::MirrorRepeat => wgpu::AddressMode::MirrorRepeat,
    };
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some(&sampler.name),
        address_mode_u: address,
        address_mode_v: address,
        address_mode_w: address,
        mag_filter: filter,
        min_filter: filter,
        mipmap_filter: wgpu::FilterMode::Nearest,
        lod_min_clamp: 0.0,
        lod_max_clamp: 0.0,
        compare: None,
        anisotropy_clamp: 1,
        border_color: None,
    })
}
