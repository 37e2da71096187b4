//! WGFX effect compiler
//!
//! This crate turns a WGFX effect (WGSL code annotated with `//!` directives) into
//! one self-contained WGSL compute module per pass. Each module carries its own
//! binding layout, resource usage and dispatch geometry so a runtime can build
//! pipelines without looking at the effect source again.
//!
//! The stages are:
//! 1. [`parse_effect`] reads directives and code into a [`WgfxShaderInfo`]
//! 2. [`CodeGenerator`] expands macros, resolves overloads and emits the modules
//! 3. [`compile_effect`] runs both and validates every module with naga
//! 4. [`EffectBundle`] packages the result for offline use

mod scan;

pub mod bundle;
pub mod codegen;
pub mod error;
pub mod ir;
pub mod layout;
pub mod log;
pub mod macros;
pub mod minify;
pub mod overload;
pub mod parser;
pub mod size_expr;
pub mod uniforms;

pub use bundle::{BundleError, BundleOptions, EffectBundle};
pub use codegen::{CodeGenerator, CodegenOptions, GeneratedModule, generate_modules, recover_metadata};
pub use error::{CompileError, CompileErrorKind};
pub use ir::{ParameterValue, TextureFormat, WgfxShaderInfo};
pub use log::LogConfig;
pub use minify::{minify_wgsl, validate_wgsl};
pub use parser::parse_effect;
pub use size_expr::{Axis, SizeContext};
pub use uniforms::{ParameterBlock, ParameterLayout};

/// An effect compiled to per-pass WGSL modules
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledEffect {
    /// Parsed effect
    pub info: WgfxShaderInfo,
    /// One module per pass, in pass order
    pub modules: Vec<GeneratedModule>,
}

/// Compiles effect source to validated WGSL modules
///
/// # Arguments
/// * `source` - Effect source text
/// * `options` - Code generation options
///
/// # Returns
/// The parsed effect and one module per pass. Every module has been parsed and
/// validated by naga.
pub fn compile_effect(source: &str, options: &CodegenOptions) -> Result<CompiledEffect, CompileError> {
    let info = parse_effect(source)?;
    let modules = generate_modules(&info, options)?;
    for module in &modules {
        validate_wgsl(module.pass_index, &module.code)?;
    }
    Ok(CompiledEffect { info, modules })
}
