//! WGFX effect runtime on wgpu
//!
//! This crate compiles WGFX effects with `wgfx-build` and runs them as a chain of
//! compute passes on a caller-supplied wgpu device. The caller owns the `INPUT`
//! and `OUTPUT` textures; the runtime owns every intermediate texture, sampler and
//! uniform buffer the effect declares.

mod error;
mod options;
mod runtime;

pub mod pipelines;
pub mod resources;

pub use error::{ErrorKind, WgfxError};
pub use options::RuntimeOptions;
pub use pipelines::{PipelineManager, StoredPipeline, dispatch_grid};
pub use resources::{ExternalResources, ImageSource, ResourceManager, SceneConstants, ViewMode};
pub use runtime::{EffectRuntime, RuntimeState};
pub use wgfx_build::{CompileError, LogConfig, ParameterValue, TextureFormat};
