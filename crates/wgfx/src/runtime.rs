//! Effect runtime
//!
//! [`EffectRuntime`] ties the compiler to the GPU: it compiles effect source into
//! fresh resource and pipeline managers, swaps them in only when every stage
//! succeeded, and then dispatches passes, uploads images and updates uniforms.

use crate::error::WgfxError;
use crate::options::RuntimeOptions;
use crate::pipelines::PipelineManager;
use crate::resources::{ExternalResources, ImageSource, ResourceManager, effect_format};
use std::fmt;
use tracing::Level;
use wgfx_build::ir::{INPUT, OUTPUT};
use wgfx_build::{CodeGenerator, CodegenOptions, CompileError, GeneratedModule, ParameterBlock, ParameterValue, WgfxShaderInfo, parse_effect};

/// Lifecycle state of an [`EffectRuntime`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuntimeState {
    /// No effect has been compiled yet
    Uninitialized,
    /// A compile is in progress
    Compiling,
    /// An effect is compiled and can be dispatched
    Ready,
    /// The runtime has been disposed
    Disposed,
}

impl fmt::Display for RuntimeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Uninitialized => "Uninitialized",
            Self::Compiling => "Compiling",
            Self::Ready => "Ready",
            Self::Disposed => "Disposed",
        })
    }
}

/// Restores the previous stable state unless the compile completed
struct CompileGuard<'a> {
    state: &'a mut RuntimeState,
    previous: RuntimeState,
    succeeded: bool,
}

impl<'a> CompileGuard<'a> {
    fn enter(state: &'a mut RuntimeState) -> Self {
        let previous = std::mem::replace(state, RuntimeState::Compiling);
        Self { state, previous, succeeded: false }
    }

    fn finish(mut self, succeeded: bool) {
        self.succeeded = succeeded;
    }
}

impl Drop for CompileGuard<'_> {
    fn drop(&mut self) {
        *self.state = if self.succeeded { RuntimeState::Ready } else { self.previous };
    }
}

/// Everything produced by one successful compile
#[derive(Debug)]
struct CompiledState {
    info: WgfxShaderInfo,
    modules: Vec<GeneratedModule>,
    resources: ResourceManager,
    pipelines: PipelineManager,
}

/// Compiles and runs a WGFX effect on a wgpu device
#[derive(Debug)]
pub struct EffectRuntime {
    device: wgpu::Device,
    queue: wgpu::Queue,
    options: RuntimeOptions,
    state: RuntimeState,
    compiled: Option<CompiledState>,
    frame_count: u32,
}

impl EffectRuntime {
    /// Creates a runtime with no effect loaded
    ///
    /// # Arguments
    /// * `device` - The wgpu device for resource and pipeline creation
    /// * `queue` - The queue used for uploads
    /// * `options` - Logging and code generation options
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue, options: RuntimeOptions) -> Self {
        Self {
            device: device.clone(),
            queue: queue.clone(),
            options,
            state: RuntimeState::Uninitialized,
            compiled: None,
            frame_count: 0,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> RuntimeState {
        self.state
    }

    /// Compiles an effect and makes it current
    ///
    /// The previous effect, if any, stays active until every stage of the new one
    /// has succeeded. On failure, or if the returned future is dropped before it
    /// completes, the runtime returns to its previous state.
    ///
    /// # Arguments
    /// * `source` - Effect source text
    /// * `externals` - Caller-owned `INPUT` and `OUTPUT` textures
    pub async fn compile(&mut self, source: &str, externals: ExternalResources) -> Result<(), WgfxError> {
        match self.state {
            RuntimeState::Compiling | RuntimeState::Disposed => return Err(WgfxError::state("Uninitialized or Ready", self.state)),
            RuntimeState::Uninitialized | RuntimeState::Ready => {}
        }

        let guard = CompileGuard::enter(&mut self.state);
        let result = build(&self.device, &self.queue, &self.options, source, &externals).await;
        guard.finish(result.is_ok());

        let compiled = result.inspect_err(|e| {
            if self.options.log.enabled(Level::WARN) {
                tracing::warn!("effect compile failed: {e}");
            }
        })?;
        if self.options.log.enabled(Level::INFO) {
            tracing::info!("compiled effect with {} pass(es)", compiled.modules.len());
        }
        if let Some(mut old) = self.compiled.replace(compiled) {
            old.pipelines.dispose();
            old.resources.dispose();
        }
        self.frame_count = 0;
        Ok(())
    }

    fn ready(&self) -> Result<&CompiledState, WgfxError> {
        match (&self.state, &self.compiled) {
            (RuntimeState::Ready, Some(compiled)) => Ok(compiled),
            _ => Err(WgfxError::state("Ready", self.state)),
        }
    }

    fn ready_mut(&mut self) -> Result<&mut CompiledState, WgfxError> {
        match (&self.state, &mut self.compiled) {
            (RuntimeState::Ready, Some(compiled)) => Ok(compiled),
            (state, _) => Err(WgfxError::state("Ready", state)),
        }
    }

    /// Records one pass, addressed by its runtime name `PASS_<index>`
    pub fn dispatch_pass(&self, pass_name: &str, encoder: &mut wgpu::CommandEncoder) -> Result<(), WgfxError> {
        let compiled = self.ready()?;
        let pass = compiled.info.pass_by_name(pass_name).ok_or_else(|| CompileError::resolution(None, pass_name, "no pass with this name"))?;
        compiled.pipelines.dispatch_pass(pass.index, encoder, &compiled.resources)
    }

    /// Records every pass in order
    pub fn dispatch_all(&self, encoder: &mut wgpu::CommandEncoder) -> Result<(), WgfxError> {
        let compiled = self.ready()?;
        for pass in &compiled.info.passes {
            compiled.pipelines.dispatch_pass(pass.index, encoder, &compiled.resources)?;
        }
        Ok(())
    }

    /// Updates a parameter
    ///
    /// # Returns
    /// The stored value after coercion and clamping
    pub fn update_uniform(&mut self, name: &str, value: impl Into<ParameterValue>) -> Result<ParameterValue, WgfxError> {
        self.ready_mut()?.resources.set_parameter(name, value.into())
    }

    /// The texture the effect writes its result to
    pub fn get_output(&self) -> Result<&wgpu::Texture, WgfxError> {
        let compiled = self.ready()?;
        compiled.resources.get_texture(OUTPUT).ok_or_else(|| CompileError::resolution(None, OUTPUT, "output texture is not registered").into())
    }

    /// Looks up a texture by name; `None` unless the runtime is ready
    pub fn get_resource(&self, name: &str) -> Option<&wgpu::Texture> {
        self.ready().ok()?.resources.get_texture(name)
    }

    /// Uploads pixel data into the `INPUT` texture
    pub fn update_input(&self, image: &ImageSource) -> Result<(), WgfxError> {
        self.ready()?.resources.update_texture_from_image(INPUT, image)
    }

    /// Switches to new external textures, reallocating textures whose size changes
    pub fn resize(&mut self, externals: ExternalResources) -> Result<(), WgfxError> {
        self.ready_mut()?.resources.resize(&externals)
    }

    /// Advances the frame counter and updates the scene time
    ///
    /// # Returns
    /// The new frame count
    pub fn advance_frame(&mut self, time: f32) -> Result<u32, WgfxError> {
        let frame_count = self.frame_count.wrapping_add(1);
        self.ready_mut()?.resources.update_scene(frame_count, time);
        self.frame_count = frame_count;
        Ok(frame_count)
    }

    /// Current parameter declarations and values
    pub fn parameters(&self) -> Result<&ParameterBlock, WgfxError> {
        Ok(self.ready()?.resources.parameters())
    }

    /// Parsed metadata of the current effect
    pub fn info(&self) -> Option<&WgfxShaderInfo> {
        self.ready().ok().map(|c| &c.info)
    }

    /// Generated modules of the current effect
    pub fn modules(&self) -> Option<&[GeneratedModule]> {
        self.ready().ok().map(|c| c.modules.as_slice())
    }

    /// Pipeline cache of the current effect
    pub fn pipelines(&self) -> Option<&PipelineManager> {
        self.ready().ok().map(|c| &c.pipelines)
    }

    /// Resources of the current effect
    pub fn resources(&self) -> Option<&ResourceManager> {
        self.ready().ok().map(|c| &c.resources)
    }

    /// Releases every resource and pipeline
    ///
    /// Every later call fails with a state error.
    pub fn dispose(&mut self) {
        if let Some(mut compiled) = self.compiled.take() {
            compiled.pipelines.dispose();
            compiled.resources.dispose();
        }
        self.state = RuntimeState::Disposed;
    }
}

/// Runs every compile stage into fresh managers
async fn build(device: &wgpu::Device, queue: &wgpu::Queue, options: &RuntimeOptions, source: &str, externals: &ExternalResources) -> Result<CompiledState, WgfxError> {
    let output_format = effect_format(externals.output.format())
        .ok_or_else(|| CompileError::resolution(None, OUTPUT, format!("format {:?} cannot be written by an effect", externals.output.format())))?;

    let info = parse_effect(source)?;
    let codegen = CodegenOptions {
        output_format,
        ..options.codegen.clone()
    };
    let modules = CodeGenerator::new(codegen).generate(&info)?;

    let resources = ResourceManager::new(device, queue, &info, externals, options.log)?;
    let mut pipelines = PipelineManager::new(device, options.log);
    pipelines.create_pipelines(&info, &modules, &resources).await?;

    Ok(CompiledState { info, modules, resources, pipelines })
}
