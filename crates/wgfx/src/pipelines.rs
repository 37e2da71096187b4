//! Compute pipeline creation and dispatch
//!
//! Each generated module becomes one compute pipeline with an explicit bind group
//! layout derived from its binding slots. Bind groups are built at dispatch time
//! from the resource manager's live resources, so a resize never leaves a pass
//! bound to a released texture.
//!
//! A pass that samples a texture the device cannot filter gets non-filtering
//! sampler slots and is bound to the nearest variants of its samplers.

use crate::error::WgfxError;
use crate::resources::{ResourceManager, ViewMode, wgpu_format};
use std::collections::BTreeMap;
use tracing::Level;
use wgfx_build::layout::{BindingKind, BindingSlot};
use wgfx_build::ir::PassInfo;
use wgfx_build::{CompileError, GeneratedModule, LogConfig, WgfxShaderInfo};

/// Entry point of every generated module
const ENTRY_POINT: &str = "main";

/// Number of workgroups needed to cover a `width` x `height` texture
///
/// # Arguments
/// * `width` - Output width in pixels
/// * `height` - Output height in pixels
/// * `block_size` - Pixels covered by one workgroup
pub fn dispatch_grid(width: u32, height: u32, block_size: [u32; 2]) -> (u32, u32) {
    (width.div_ceil(block_size[0].max(1)), height.div_ceil(block_size[1].max(1)))
}

/// A compute pipeline created for one pass
#[derive(Debug)]
pub struct StoredPipeline {
    /// Runtime name of the pass (`PASS_<index>`)
    pub name: String,
    /// Pass the pipeline implements
    pub pass: PassInfo,
    /// Module the pipeline was created from
    pub module: GeneratedModule,
    /// Whether samplers are bound as filtering; false once the pass samples a non-filterable texture
    pub filtering: bool,
    /// Layout of bind group 0
    pub bind_group_layout: wgpu::BindGroupLayout,
    /// The compiled compute pipeline
    pub pipeline: wgpu::ComputePipeline,
}

/// Cache of compute pipelines, keyed by pass index
#[derive(Debug)]
pub struct PipelineManager {
    device: wgpu::Device,
    log: LogConfig,
    pipelines: BTreeMap<u32, StoredPipeline>,
}

impl PipelineManager {
    /// Creates an empty manager
    pub fn new(device: &wgpu::Device, log: LogConfig) -> Self {
        Self {
            device: device.clone(),
            log,
            pipelines: BTreeMap::new(),
        }
    }

    /// Creates one pipeline per module, replacing the cache
    ///
    /// Every pass is created inside its own validation error scope; all scopes are
    /// awaited together once every pass has been submitted. Shader diagnostics are
    /// collected on a background thread and only logged.
    ///
    /// # Arguments
    /// * `info` - Parsed effect
    /// * `modules` - Generated modules, one per pass
    /// * `resources` - Resources the pipelines will be bound to
    pub async fn create_pipelines(&mut self, info: &WgfxShaderInfo, modules: &[GeneratedModule], resources: &ResourceManager) -> Result<(), WgfxError> {
        self.pipelines.clear();

        let features = self.device.features();
        let prepared = modules
            .iter()
            .map(|module| {
                let pass = info
                    .passes
                    .get(module.pass_index as usize)
                    .ok_or_else(|| WgfxError::from(CompileError::resolution(Some(module.pass_index), format!("PASS_{}", module.pass_index), "module has no matching pass")))?;
                let filtering = samples_filterable(module, resources, features)?;
                if !filtering && self.log.enabled(Level::DEBUG) {
                    tracing::debug!("{} samples a non-filterable texture, binding nearest samplers", pass.name());
                }
                let entries = module.bindings.iter().map(|slot| layout_entry(slot, resources, features, filtering)).collect::<Result<Vec<_>, _>>()?;
                Ok((module, pass, filtering, entries))
            })
            .collect::<Result<Vec<_>, WgfxError>>()?;

        let mut created = Vec::with_capacity(prepared.len());
        for (module, pass, filtering, entries) in prepared {
            let name = pass.name();
            self.device.push_error_scope(wgpu::ErrorFilter::Validation);

            let shader_module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&name),
                source: wgpu::ShaderSource::Wgsl(module.code.as_str().into()),
            });

            let bind_group_layout = self.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor { label: Some(&name), entries: &entries });

            let pipeline_layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(&name),
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            });

            let pipeline = self.device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(&name),
                layout: Some(&pipeline_layout),
                module: &shader_module,
                entry_point: Some(ENTRY_POINT),
                compilation_options: Default::default(),
                cache: None,
            });

            report_diagnostics(name.clone(), shader_module, self.log);

            created.push(StoredPipeline {
                name,
                pass: pass.clone(),
                module: module.clone(),
                filtering,
                bind_group_layout,
                pipeline,
            });
        }

        // scopes pop in reverse push order
        let scopes: Vec<_> = (0..created.len()).map(|_| self.device.pop_error_scope()).collect();
        let mut failures = Vec::new();
        for (scope, stored) in scopes.into_iter().zip(created.iter().rev()) {
            if let Some(error) = scope.await {
                failures.push((stored.module.pass_index, error.to_string()));
            }
        }
        if let Some((pass, message)) = failures.into_iter().min_by_key(|(pass, _)| *pass) {
            if self.log.enabled(Level::ERROR) {
                tracing::error!("pipeline creation failed for pass {pass}: {message}");
            }
            return Err(WgfxError::device(Some(pass), message));
        }

        if self.log.enabled(Level::DEBUG) {
            tracing::debug!("created {} compute pipeline(s)", created.len());
        }
        self.pipelines = created.into_iter().map(|stored| (stored.module.pass_index, stored)).collect();
        Ok(())
    }

    /// Returns the pipeline of a pass
    pub fn get(&self, pass: u32) -> Option<&StoredPipeline> {
        self.pipelines.get(&pass)
    }

    /// Number of cached pipelines
    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    /// Returns true if no pipeline is cached
    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    /// Cached pipelines in pass order
    pub fn iter(&self) -> impl Iterator<Item = &StoredPipeline> {
        self.pipelines.values()
    }

    /// Records one pass into `encoder`
    ///
    /// # Arguments
    /// * `pass` - Pass index
    /// * `encoder` - The command encoder to record commands into
    /// * `resources` - Live resources to bind
    pub fn dispatch_pass(&self, pass: u32, encoder: &mut wgpu::CommandEncoder, resources: &ResourceManager) -> Result<(), WgfxError> {
        let stored = self.pipelines.get(&pass).ok_or_else(|| WgfxError::state(format!("a pipeline for pass {pass}"), "pipeline not found"))?;

        let entries = stored.module.bindings.iter().map(|slot| bind_group_entry(slot, resources, stored.filtering)).collect::<Result<Vec<_>, _>>()?;
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&stored.name),
            layout: &stored.bind_group_layout,
            entries: &entries,
        });

        let (width, height) = resources
            .texture_size(&stored.module.output)
            .ok_or_else(|| CompileError::resolution(Some(pass), &stored.module.output, "output texture is not allocated"))?;
        let (workgroup_x, workgroup_y) = dispatch_grid(width, height, stored.module.block_size);

        let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(&stored.name),
            timestamp_writes: None,
        });
        compute_pass.set_pipeline(&stored.pipeline);
        compute_pass.set_bind_group(0, &bind_group, &[]);
        compute_pass.dispatch_workgroups(workgroup_x, workgroup_y, 1);

        if self.log.enabled(Level::TRACE) {
            tracing::trace!("dispatched {} as {workgroup_x}x{workgroup_y} workgroups", stored.name);
        }
        Ok(())
    }

    /// Drops every cached pipeline
    pub fn dispose(&mut self) {
        self.pipelines.clear();
    }
}

fn missing(slot: &BindingSlot) -> WgfxError {
    CompileError::resolution(None, slot.kind.resource_name(), format!("no resource for binding {}", slot.binding)).into()
}

/// Sample type of the texture behind a sampled-texture slot
fn sample_type(slot: &BindingSlot, name: &str, resources: &ResourceManager, features: wgpu::Features) -> Result<wgpu::TextureSampleType, WgfxError> {
    let texture = resources.get_texture(name).ok_or_else(|| missing(slot))?;
    Ok(texture.format().sample_type(None, Some(features)).unwrap_or(wgpu::TextureSampleType::Float { filterable: true }))
}

/// Returns false if any texture the module samples cannot be filtered on this device
fn samples_filterable(module: &GeneratedModule, resources: &ResourceManager, features: wgpu::Features) -> Result<bool, WgfxError> {
    for slot in &module.bindings {
        if let BindingKind::SampledTexture { name } = &slot.kind {
            if matches!(sample_type(slot, name, resources, features)?, wgpu::TextureSampleType::Float { filterable: false }) {
                return Ok(false);
            }
        }
    }
    Ok(true)
}

/// Derives the layout entry of a binding slot
fn layout_entry(slot: &BindingSlot, resources: &ResourceManager, features: wgpu::Features, filtering: bool) -> Result<wgpu::BindGroupLayoutEntry, WgfxError> {
    let ty = match &slot.kind {
        BindingKind::DefaultSampler | BindingKind::Sampler { .. } if filtering => wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
        BindingKind::DefaultSampler | BindingKind::Sampler { .. } => wgpu::BindingType::Sampler(wgpu::SamplerBindingType::NonFiltering),
        BindingKind::Parameters | BindingKind::Scene => wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        BindingKind::SampledTexture { name } => wgpu::BindingType::Texture {
            sample_type: sample_type(slot, name, resources, features)?,
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        BindingKind::StorageTexture { format, .. } => wgpu::BindingType::StorageTexture {
            access: wgpu::StorageTextureAccess::WriteOnly,
            format: wgpu_format(*format),
            view_dimension: wgpu::TextureViewDimension::D2,
        },
    };
    Ok(wgpu::BindGroupLayoutEntry {
        binding: slot.binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty,
        count: None,
    })
}

/// Resolves a binding slot to the live resource it refers to
fn bind_group_entry<'a>(slot: &BindingSlot, resources: &'a ResourceManager, filtering: bool) -> Result<wgpu::BindGroupEntry<'a>, WgfxError> {
    let resource = match &slot.kind {
        BindingKind::DefaultSampler | BindingKind::Sampler { .. } => {
            let name = slot.kind.resource_name();
            let sampler = if filtering { resources.get_sampler(name) } else { resources.get_nearest_sampler(name) };
            wgpu::BindingResource::Sampler(sampler.ok_or_else(|| missing(slot))?)
        }
        BindingKind::Parameters => resources.get_uniform_buffer().ok_or_else(|| missing(slot))?.as_entire_binding(),
        BindingKind::Scene => resources.get_scene_buffer().as_entire_binding(),
        BindingKind::SampledTexture { name } => wgpu::BindingResource::TextureView(resources.get_texture_view(name, ViewMode::Sampled).ok_or_else(|| missing(slot))?),
        BindingKind::StorageTexture { name, .. } => wgpu::BindingResource::TextureView(resources.get_texture_view(name, ViewMode::Storage).ok_or_else(|| missing(slot))?),
    };
    Ok(wgpu::BindGroupEntry { binding: slot.binding, resource })
}

/// Logs shader compilation messages from a detached thread
fn report_diagnostics(name: String, shader_module: wgpu::ShaderModule, log: LogConfig) {
    if !log.enabled(Level::WARN) {
        return;
    }
    let spawned = std::thread::Builder::new().name(format!("wgfx diagnostics {name}")).spawn({ let name = name.clone(); move || {
        let info = pollster::block_on(shader_module.get_compilation_info());
        for message in info.messages {
            let location = message.location.map(|l| format!(" at {}:{}", l.line_number, l.line_position)).unwrap_or_default();
            match message.message_type {
                wgpu::CompilationMessageType::Error => tracing::error!("{name}{location}: {}", message.message),
                wgpu::CompilationMessageType::Warning => tracing::warn!("{name}{location}: {}", message.message),
                wgpu::CompilationMessageType::Info if log.enabled(Level::INFO) => tracing::info!("{name}{location}: {}", message.message),
                wgpu::CompilationMessageType::Info => {}
            }
        }
    }});
    if let Err(e) = spawned {
        tracing::warn!("could not start diagnostics thread for {name}: {e}");
    }
}
