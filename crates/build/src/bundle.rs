//! Offline effect bundles
//!
//! A bundle is the packaged result of compiling an effect ahead of time: a JSON
//! manifest describing the effect and its passes, plus one WGSL file per pass.
//! Loading a bundle gives back the [`GeneratedModule`]s without running the parser
//! or the code generator again.

use crate::codegen::GeneratedModule;
use crate::error::CompileError;
use crate::ir::WgfxShaderInfo;
use crate::layout::{BindingSlot, ResourceUsage};
use crate::minify::minify_wgsl;
use crate::{CompiledEffect, uniforms::ParameterLayout};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Manifest format version written by this crate
pub const BUNDLE_VERSION: u32 = 1;

/// File name of the manifest inside a bundle directory
pub const MANIFEST_FILE: &str = "effect.json";

/// Errors raised while writing or reading bundles
#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    #[error("bundle I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid bundle manifest: {0}")]
    Manifest(#[from] serde_json::Error),
    #[error("unsupported bundle version {found}, expected {BUNDLE_VERSION}")]
    Version { found: u32 },
    #[error(transparent)]
    Compile(#[from] CompileError),
}

/// Options for building a bundle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BundleOptions {
    /// Minify the WGSL of every pass
    pub minify: bool,
}

/// Manifest entry of one pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundlePass {
    pub index: u32,
    /// WGSL file, relative to the bundle directory
    pub file: String,
    pub usage: ResourceUsage,
    pub bindings: Vec<BindingSlot>,
    pub output: String,
    pub block_size: [u32; 2],
    pub workgroup_size: [u32; 3],
}

/// The JSON manifest of a bundle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleManifest {
    pub version: u32,
    /// Effect metadata; pass code lives in the WGSL files
    pub effect: WgfxShaderInfo,
    /// Byte layout of the parameter uniform
    pub parameter_layout: ParameterLayout,
    pub passes: Vec<BundlePass>,
}

/// A compiled effect ready to be written to disk
#[derive(Debug, Clone, PartialEq)]
pub struct EffectBundle {
    pub manifest: BundleManifest,
    /// WGSL sources, indexed like `manifest.passes`
    pub sources: Vec<String>,
}

impl EffectBundle {
    /// Packages a compiled effect
    ///
    /// # Arguments
    /// * `compiled` - Result of [`crate::compile_effect`]
    /// * `options` - Packaging options
    pub fn new(compiled: &CompiledEffect, options: &BundleOptions) -> Result<Self, CompileError> {
        let mut effect = compiled.info.clone();
        effect.common_code.clear();
        for pass in &mut effect.passes {
            pass.code.clear();
        }

        let mut passes = Vec::with_capacity(compiled.modules.len());
        let mut sources = Vec::with_capacity(compiled.modules.len());
        for module in &compiled.modules {
            let source = if options.minify {
                // minification drops comments, so keep the metadata header in front
                let header: String = module.metadata().map(|line| format!("{line}\n")).collect();
                format!("{header}{}", minify_wgsl(module.pass_index, &module.code)?)
            } else {
                module.code.clone()
            };
            passes.push(BundlePass {
                index: module.pass_index,
                file: format!("pass_{}.wgsl", module.pass_index),
                usage: module.usage.clone(),
                bindings: module.bindings.clone(),
                output: module.output.clone(),
                block_size: module.block_size,
                workgroup_size: module.workgroup_size,
            });
            sources.push(source);
        }

        Ok(Self {
            manifest: BundleManifest {
                version: BUNDLE_VERSION,
                parameter_layout: ParameterLayout::new(&effect.parameters),
                effect,
                passes,
            },
            sources,
        })
    }

    /// Serializes the manifest as pretty-printed JSON
    pub fn manifest_json(&self) -> Result<String, BundleError> {
        Ok(serde_json::to_string_pretty(&self.manifest)?)
    }

    /// Writes the manifest and every pass source into `dir`, creating it if needed
    pub fn write_to_dir(&self, dir: &Path) -> Result<(), BundleError> {
        std::fs::create_dir_all(dir)?;
        std::fs::write(dir.join(MANIFEST_FILE), self.manifest_json()?)?;
        for (pass, source) in self.manifest.passes.iter().zip(&self.sources) {
            std::fs::write(dir.join(&pass.file), source)?;
        }
        Ok(())
    }

    /// Reads a bundle previously written with [`EffectBundle::write_to_dir`]
    pub fn read_from_dir(dir: &Path) -> Result<Self, BundleError> {
        let manifest: BundleManifest = serde_json::from_str(&std::fs::read_to_string(dir.join(MANIFEST_FILE))?)?;
        if manifest.version != BUNDLE_VERSION {
            return Err(BundleError::Version { found: manifest.version });
        }
        let sources = manifest.passes.iter().map(|pass| std::fs::read_to_string(dir.join(&pass.file))).collect::<Result<Vec<_>, _>>()?;
        Ok(Self { manifest, sources })
    }

    /// Rebuilds the generated modules stored in the bundle
    pub fn modules(&self) -> Vec<GeneratedModule> {
        self.manifest
            .passes
            .iter()
            .zip(&self.sources)
            .map(|(pass, code)| GeneratedModule {
                pass_index: pass.index,
                code: code.clone(),
                usage: pass.usage.clone(),
                bindings: pass.bindings.clone(),
                output: pass.output.clone(),
                block_size: pass.block_size,
                workgroup_size: pass.workgroup_size,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::{CodegenOptions, recover_metadata};
    use crate::compile_effect;

    const EFFECT: &str = "\
//! TEXTURE Blurred (INPUT_WIDTH / 2) (INPUT_HEIGHT / 2)
//! PARAMETER Radius int 2 1 8
//! PASS 0
//! IN INPUT
//! OUT Blurred
fn pass0(pos: vec2f) -> vec4f {
    var sum = vec4f(0.0);
    for (var i = -Radius; i <= Radius; i++) {
        sum += textureSampleLevel(INPUT, wgfx_sampler, pos + vec2f(f32(i) * INPUT_PT_X, 0.0), 0.0);
    }
    return sum / f32(Radius * 2 + 1);
}
//! PASS 1
//! IN Blurred
//! OUT OUTPUT
fn pass1(pos: vec2f) -> vec4f { return textureSampleLevel(Blurred, wgfx_sampler, pos, 0.0); }
";

    fn compiled() -> CompiledEffect {
        compile_effect(EFFECT, &CodegenOptions::default()).unwrap()
    }

    #[test]
    fn test_bundle_describes_every_pass() {
        let compiled = compiled();
        let bundle = EffectBundle::new(&compiled, &BundleOptions::default()).unwrap();
        assert_eq!(bundle.manifest.passes.len(), 2);
        assert_eq!(bundle.manifest.passes[1].file, "pass_1.wgsl");
        assert_eq!(bundle.manifest.parameter_layout.size, 16);
        assert!(bundle.manifest.effect.passes.iter().all(|p| p.code.is_empty()));
        assert_eq!(bundle.modules(), compiled.modules);

        let json = bundle.manifest_json().unwrap();
        let manifest: BundleManifest = serde_json::from_str(&json).unwrap();
        assert_eq!(manifest, bundle.manifest);
    }

    #[test]
    fn test_minified_bundle_keeps_metadata() {
        let bundle = EffectBundle::new(&compiled(), &BundleOptions { minify: true }).unwrap();
        let recovered = recover_metadata(&bundle.modules()).unwrap();
        assert_eq!(recovered.textures, bundle.manifest.effect.textures);
        assert_eq!(recovered.parameters, bundle.manifest.effect.parameters);
    }

    #[test]
    fn test_write_and_read_back() {
        let dir = std::env::temp_dir().join(format!("wgfx-bundle-test-{}", std::process::id()));
        let bundle = EffectBundle::new(&compiled(), &BundleOptions::default()).unwrap();
        bundle.write_to_dir(&dir).unwrap();
        let loaded = EffectBundle::read_from_dir(&dir).unwrap();
        std::fs::remove_dir_all(&dir).unwrap();
        assert_eq!(loaded, bundle);
    }
}
