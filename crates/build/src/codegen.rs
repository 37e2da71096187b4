//! Per-pass WGSL module generation
//!
//! For each pass the generator expands macros, resolves overloads, works out which
//! resources the pass touches, assigns binding slots and wraps the pass function in
//! a compute entry point. A pass function comes in one of two styles:
//!
//! - pixel style, `fn passN(pos: vec2f) -> vec4f`: called once per output pixel
//!   with normalized coordinates; the result is stored to the single output
//! - compute style, `fn passN(block_start: vec2u, thread_id: vec3u)`: called once
//!   per invocation; the function stores its results itself

use crate::error::CompileError;
use crate::ir::{Dims, INPUT, OUTPUT, PassInfo, TextureFormat, WgfxShaderInfo, is_identifier};
use crate::layout::{self, BindingKind, BindingSlot, DEFAULT_SAMPLER_NAME, PARAMETERS_NAME, ResourceUsage, SCENE_NAME};
use crate::log::LogConfig;
use crate::macros::MacroExpander;
use crate::overload::OverloadResolver;
use crate::parser::parse_effect;
use crate::scan::{Segment, call_arguments, is_member_access, mask_comments, rewrite_idents, segments, skip_whitespace, split_top_level};
use crate::uniforms::{PARAMETERS_STRUCT, ParameterLayout};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::LazyLock;
use tracing::Level;

/// WGSL name of the scene struct
pub const SCENE_STRUCT: &str = "WgfxScene";

/// Scene uniform declaration shared by every module
///
/// Must stay in sync with the runtime's `SceneConstants`.
const SCENE_STRUCT_WGSL: &str = "struct WgfxScene {
    input_size: vec2u,
    output_size: vec2u,
    input_pt: vec2f,
    output_pt: vec2f,
    frame_count: u32,
    time: f32,
    _padding: vec2u,
}
";

/// Maximum invocations per workgroup guaranteed by the default device limits
const MAX_INVOCATIONS: u32 = 256;
/// Maximum workgroup size per axis guaranteed by the default device limits
const MAX_WORKGROUP_SIZE: [u32; 3] = [256, 256, 64];

static FN_PARAMS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bfn\s+([A-Za-z_]\w*)\s*\(([^)]*)\)").expect("valid regex"));
static LOCAL_BINDING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b(?:let|const|var(?:<[^>]*>)?)\s+([A-Za-z_]\w*)").expect("valid regex"));

/// Options controlling code generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodegenOptions {
    /// Logging for the generator and the overload resolver
    pub log: LogConfig,
    /// Storage format of the caller-supplied `OUTPUT` texture
    pub output_format: TextureFormat,
    /// Block size of passes that declare neither `BLOCK_SIZE` nor `NUM_THREADS`
    pub default_block_size: [u32; 2],
}

impl Default for CodegenOptions {
    fn default() -> Self {
        Self {
            log: LogConfig::default(),
            output_format: TextureFormat::Rgba8Unorm,
            default_block_size: [8, 8],
        }
    }
}

/// The compilable module of one pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedModule {
    /// Index of the pass this module implements
    pub pass_index: u32,
    /// Complete WGSL source, entry point `main`
    pub code: String,
    /// Resources the module touches
    pub usage: ResourceUsage,
    /// Bind group 0 entries, sorted by binding
    pub bindings: Vec<BindingSlot>,
    /// Texture whose size determines the dispatch grid
    pub output: String,
    /// Pixels covered by one workgroup
    pub block_size: [u32; 2],
    /// `@workgroup_size` of the entry point
    pub workgroup_size: [u32; 3],
}

impl GeneratedModule {
    /// Metadata directive lines at the top of the module
    pub fn metadata(&self) -> impl Iterator<Item = &str> {
        self.code.lines().take_while(|line| line.starts_with("//!"))
    }
}

/// Shape of a pass function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PassStyle {
    Pixel,
    Compute,
}

/// How a texture builtin touches its texture argument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    Read,
    Write,
    Query,
}

/// Returns how a builtin touches its texture argument and whether a sampler follows it
fn texture_builtin(name: &str) -> Option<(Access, bool)> {
    match name {
        "textureLoad" => Some((Access::Read, false)),
        "textureStore" => Some((Access::Write, false)),
        "textureDimensions" | "textureNumLevels" => Some((Access::Query, false)),
        "textureSample" | "textureSampleLevel" | "textureSampleBias" | "textureSampleGrad" | "textureSampleBaseClampToEdge" | "textureGather" => Some((Access::Read, true)),
        _ => None,
    }
}

/// Generates the WGSL modules of an effect
#[derive(Debug, Clone, Default)]
pub struct CodeGenerator {
    options: CodegenOptions,
    macros: MacroExpander,
    overloads: OverloadResolver,
}

impl CodeGenerator {
    /// Creates a generator with the given options
    pub fn new(options: CodegenOptions) -> Self {
        Self {
            macros: MacroExpander::new(options.log),
            overloads: OverloadResolver::new(options.log),
            options,
        }
    }

    /// Generates one module per pass, in pass order
    ///
    /// # Arguments
    /// * `info` - Parsed effect
    ///
    /// # Returns
    /// Modules indexed like `info.passes`
    pub fn generate(&mut self, info: &WgfxShaderInfo) -> Result<Vec<GeneratedModule>, CompileError> {
        self.overloads.reset();
        let parameters = ParameterLayout::new(&info.parameters);
        let modules = info.passes.iter().map(|pass| self.generate_pass(info, pass, &parameters)).collect::<Result<Vec<_>, _>>()?;
        if self.options.log.enabled(Level::DEBUG) {
            tracing::debug!("generated {} module(s), {} bytes of WGSL", modules.len(), modules.iter().map(|m| m.code.len()).sum::<usize>());
        }
        Ok(modules)
    }

    fn generate_pass(&mut self, info: &WgfxShaderInfo, pass: &PassInfo, parameters: &ParameterLayout) -> Result<GeneratedModule, CompileError> {
        let mut code = String::with_capacity(info.common_code.len() + pass.code.len() + 1);
        code.push_str(&info.common_code);
        if !code.is_empty() && !code.ends_with('\n') {
            code.push('\n');
        }
        code.push_str(&pass.code);

        let code = self.macros.expand(&code);
        let style = pass_style(&code, pass)?;

        let mut globals: Vec<(String, String)> = info.parameters.iter().map(|p| (p.name.clone(), p.ty.wgsl_name())).collect();
        globals.push((SCENE_NAME.to_string(), SCENE_STRUCT.to_string()));
        let code = self.overloads.resolve(&code, pass.index, &globals)?;

        let locals = local_names(&code);
        if let Some(shadowed) = info.parameters.iter().find(|p| locals.contains(p.name.as_str())) {
            return Err(CompileError::resolution(Some(pass.index), &shadowed.name, "a local declaration shadows this parameter"));
        }

        let (usage, output) = resource_usage(info, pass, &code, &locals, style)?;
        let bindings = layout::assign_bindings(info, pass, &usage, self.options.output_format)?;
        let (block_size, workgroup_size) = group_sizes(pass, self.options.default_block_size)?;
        let code = rewrite_parameters(info, &code);

        let mut module = String::new();
        module.push_str(&info.declarations());
        module.push_str(&pass.directives());
        module.push('\n');
        module.push_str(SCENE_STRUCT_WGSL);
        if let Some(params) = parameters.wgsl_struct() {
            module.push_str(&params);
        }
        module.push('\n');
        for slot in &bindings {
            module.push_str(&binding_declaration(slot));
            module.push('\n');
        }
        module.push('\n');
        module.push_str(&code);
        module.push('\n');
        module.push_str(&entry_point(pass, style, &output, block_size, workgroup_size));

        if self.options.log.enabled(Level::TRACE) {
            tracing::trace!("pass {} module:\n{module}", pass.index);
        }
        check_identifiers(pass.index, &module)?;

        Ok(GeneratedModule {
            pass_index: pass.index,
            code: module,
            usage,
            bindings,
            output,
            block_size,
            workgroup_size,
        })
    }
}

/// Generates one module per pass with a fresh generator
pub fn generate_modules(info: &WgfxShaderInfo, options: &CodegenOptions) -> Result<Vec<GeneratedModule>, CompileError> {
    CodeGenerator::new(options.clone()).generate(info)
}

/// Rebuilds the metadata of an effect from the headers of its generated modules
///
/// Pass code is not recovered; every other field equals the original IR.
pub fn recover_metadata(modules: &[GeneratedModule]) -> Result<WgfxShaderInfo, CompileError> {
    let mut source = String::new();
    for (i, module) in modules.iter().enumerate() {
        let mut in_pass = false;
        for line in module.metadata() {
            in_pass |= line.starts_with("//! PASS");
            // every header repeats the declarations; keep the first copy
            if in_pass || i == 0 {
                source.push_str(line);
                source.push('\n');
            }
        }
    }
    parse_effect(&source)
}

/// naga's parse message for a reference to a name with no definition
const UNKNOWN_IDENTIFIER: &str = "no definition in scope for identifier: ";

/// Parses a generated module with naga and reports undefined names as resolution errors
///
/// Any other parse failure is left to validation.
fn check_identifiers(pass: u32, module: &str) -> Result<(), CompileError> {
    let Err(error) = naga::front::wgsl::parse_str(module) else {
        return Ok(());
    };
    match error.message().strip_prefix(UNKNOWN_IDENTIFIER) {
        Some(name) => Err(CompileError::resolution(Some(pass), name.trim_matches('`'), "undeclared identifier")),
        None => Ok(()),
    }
}

/// Determines the style of the pass function from its signature
fn pass_style(code: &str, pass: &PassInfo) -> Result<PassStyle, CompileError> {
    let masked = mask_comments(code);
    let function = pass.function_name();
    let signatures: Vec<_> = FN_PARAMS.captures_iter(&masked).filter(|caps| caps[1] == function).map(|caps| split_top_level(&caps[2]).len()).collect();
    match signatures.as_slice() {
        [] => Err(CompileError::resolution(Some(pass.index), &function, "the pass function is not defined")),
        [1] => Ok(PassStyle::Pixel),
        [2] => Ok(PassStyle::Compute),
        [_] => Err(CompileError::resolution(
            Some(pass.index),
            &function,
            "expected `(pos: vec2f) -> vec4f` or `(block_start: vec2u, thread_id: vec3u)`",
        )),
        _ => Err(CompileError::resolution(Some(pass.index), &function, "the pass function cannot be overloaded")),
    }
}

/// Names bound by function parameters and local or module declarations
fn local_names(code: &str) -> HashSet<String> {
    let masked = mask_comments(code);
    let mut names: HashSet<String> = LOCAL_BINDING.captures_iter(&masked).map(|caps| caps[1].to_string()).collect();
    for caps in FN_PARAMS.captures_iter(&masked) {
        for param in split_top_level(&caps[2]) {
            let param = param.rsplit(')').next().unwrap_or(param);
            if let Some((name, _)) = param.split_once(':') {
                names.insert(name.trim().to_string());
            }
        }
    }
    names
}

/// Collects the resources a pass touches and picks the texture that sizes its dispatch
fn resource_usage(info: &WgfxShaderInfo, pass: &PassInfo, code: &str, locals: &HashSet<String>, style: PassStyle) -> Result<(ResourceUsage, String), CompileError> {
    let unresolved = |name: &str, message: &str| CompileError::resolution(Some(pass.index), name, message);
    let mut reads = HashSet::new();
    let mut writes = HashSet::new();
    let mut queries = HashSet::new();
    let mut samplers = HashSet::new();

    for name in &pass.inputs {
        if info.is_texture(name) {
            reads.insert(name.clone());
        } else {
            samplers.insert(name.clone());
        }
    }
    writes.extend(pass.outputs.iter().cloned());

    let masked = mask_comments(code);
    for segment in segments(&masked) {
        let Segment::Ident(start, builtin) = segment else { continue };
        let Some((access, takes_sampler)) = texture_builtin(builtin) else { continue };
        if is_member_access(&masked, start) {
            continue;
        }
        let open = skip_whitespace(&masked, start + builtin.len());
        let Some((args, _)) = call_arguments(&masked, open) else { continue };

        // textureGather takes an optional leading component index
        let texture_arg = usize::from(builtin == "textureGather" && args.first().is_some_and(|a| !is_identifier(a)));
        if let Some(&texture) = args.get(texture_arg).filter(|a| is_identifier(a) && !locals.contains(**a)) {
            if !info.is_texture(texture) {
                let message = if info.is_declared(texture) { "used as a texture but not declared as one" } else { "undeclared identifier" };
                return Err(unresolved(texture, message));
            }
            match access {
                Access::Read => reads.insert(texture.to_string()),
                Access::Write => writes.insert(texture.to_string()),
                Access::Query => queries.insert(texture.to_string()),
            };
        }
        if takes_sampler {
            if let Some(&sampler) = args.get(texture_arg + 1).filter(|a| is_identifier(a) && **a != DEFAULT_SAMPLER_NAME && !locals.contains(**a)) {
                if info.sampler(sampler).is_none() {
                    let message = if info.is_declared(sampler) { "used as a sampler but not declared as one" } else { "undeclared identifier" };
                    return Err(unresolved(sampler, message));
                }
                samplers.insert(sampler.to_string());
            }
        }
    }

    if writes.contains(INPUT) {
        return Err(unresolved(INPUT, "INPUT is read-only"));
    }
    if reads.contains(OUTPUT) {
        return Err(unresolved(OUTPUT, "OUTPUT is write-only"));
    }

    let function = pass.function_name();
    let output = match style {
        PassStyle::Pixel => match pass.outputs.as_slice() {
            [output] => output.clone(),
            outputs => {
                let message = format!("a pixel-style pass needs exactly one OUT texture, found {}", outputs.len());
                return Err(unresolved(function.as_str(), message.as_str()));
            }
        },
        PassStyle::Compute => match pass.outputs.first() {
            Some(output) => output.clone(),
            // fall back to the first written texture in binding order
            None => std::iter::once(INPUT)
                .chain(info.textures.iter().map(|t| t.name.as_str()))
                .chain(std::iter::once(OUTPUT))
                .find(|name| writes.contains(*name))
                .map(str::to_string)
                .ok_or_else(|| unresolved(function.as_str(), "the pass writes no texture; declare one with OUT"))?,
        },
    };

    reads.extend(queries.into_iter().filter(|name| !writes.contains(name)));
    let usage = ResourceUsage {
        sampled_textures: reads.into_iter().collect(),
        storage_textures: writes.into_iter().collect(),
        samplers: samplers.into_iter().collect(),
        uses_parameters: !info.parameters.is_empty(),
    };
    Ok((usage, output))
}

/// Resolves the block size and workgroup size of a pass
fn group_sizes(pass: &PassInfo, default_block: [u32; 2]) -> Result<([u32; 2], [u32; 3]), CompileError> {
    let error = |message: String| CompileError::layout(pass.index, None, message);
    let derived_threads = |block: [u32; 2]| [block[0].min(16), block[1].min(16), 1];

    let block = match pass.block_size {
        Some(Dims::D1(n)) => Some([n, n]),
        Some(Dims::D2(x, y)) | Some(Dims::D3(x, y, 1)) => Some([x, y]),
        Some(Dims::D3(..)) => return Err(error("BLOCK_SIZE must have a depth of 1".to_string())),
        None => None,
    };
    let (block, threads) = match (block, pass.num_threads) {
        (Some(block), Some(Dims::D1(x))) => (block, [x, 1, 1]),
        (Some(block), Some(Dims::D2(x, y))) => (block, [x, y, 1]),
        (Some(block), Some(Dims::D3(x, y, z))) => (block, [x, y, z]),
        (Some(block), None) => (block, derived_threads(block)),
        (None, Some(Dims::D1(_))) => return Err(error("a one-dimensional NUM_THREADS needs an explicit BLOCK_SIZE".to_string())),
        (None, Some(Dims::D2(x, y))) => ([x, y], [x, y, 1]),
        (None, Some(Dims::D3(x, y, z))) => ([x, y], [x, y, z]),
        (None, None) => (default_block, derived_threads(default_block)),
    };

    for (axis, (&size, &limit)) in threads.iter().zip(&MAX_WORKGROUP_SIZE).enumerate() {
        if size > limit {
            return Err(error(format!("workgroup size {size} exceeds the limit of {limit} on axis {axis}")));
        }
    }
    let invocations = threads.iter().product::<u32>();
    if invocations > MAX_INVOCATIONS {
        return Err(error(format!("{invocations} invocations per workgroup exceed the limit of {MAX_INVOCATIONS}")));
    }
    Ok((block, threads))
}

/// Points parameter identifiers at the parameter uniform
fn rewrite_parameters(info: &WgfxShaderInfo, code: &str) -> String {
    if info.parameters.is_empty() {
        return code.to_string();
    }
    rewrite_idents(code, |name, start| {
        if info.parameter(name).is_none() || is_member_access(code, start) {
            return None;
        }
        Some((format!("{PARAMETERS_NAME}.{name}"), start + name.len()))
    })
}

fn binding_declaration(slot: &BindingSlot) -> String {
    let resource = match &slot.kind {
        BindingKind::DefaultSampler => format!("{DEFAULT_SAMPLER_NAME}: sampler"),
        BindingKind::Sampler { name } => format!("{name}: sampler"),
        BindingKind::Parameters => format!("<uniform> {PARAMETERS_NAME}: {PARAMETERS_STRUCT}"),
        BindingKind::Scene => format!("<uniform> {SCENE_NAME}: {SCENE_STRUCT}"),
        BindingKind::SampledTexture { name } => format!("{name}: texture_2d<f32>"),
        BindingKind::StorageTexture { name, format } => format!("{name}: texture_storage_2d<{format}, write>"),
    };
    let separator = if resource.starts_with('<') { "" } else { " " };
    format!("@group(0) @binding({}) var{separator}{resource};", slot.binding)
}

fn entry_point(pass: &PassInfo, style: PassStyle, output: &str, block: [u32; 2], threads: [u32; 3]) -> String {
    let function = pass.function_name();
    let [bw, bh] = block;
    let [tx, ty, tz] = threads;
    let mut out = format!(
        "@compute @workgroup_size({tx}, {ty}, {tz})
fn main(@builtin(workgroup_id) wgfx_group: vec3u, @builtin(local_invocation_id) wgfx_thread: vec3u) {{
    let wgfx_block_start = wgfx_group.xy * vec2u({bw}u, {bh}u);
"
    );
    match style {
        PassStyle::Compute => out.push_str(&format!("    {function}(wgfx_block_start, wgfx_thread);\n")),
        PassStyle::Pixel => {
            if tz > 1 {
                out.push_str("    if wgfx_thread.z != 0u {\n        return;\n    }\n");
            }
            out.push_str(&format!(
                "    let wgfx_size = textureDimensions({output});
    for (var wgfx_y = wgfx_thread.y; wgfx_y < {bh}u; wgfx_y += {ty}u) {{
        for (var wgfx_x = wgfx_thread.x; wgfx_x < {bw}u; wgfx_x += {tx}u) {{
            let wgfx_pixel = wgfx_block_start + vec2u(wgfx_x, wgfx_y);
            if all(wgfx_pixel < wgfx_size) {{
                let wgfx_pos = (vec2f(wgfx_pixel) + 0.5) / vec2f(wgfx_size);
                textureStore({output}, wgfx_pixel, {function}(wgfx_pos));
            }}
        }}
    }}
"
            ));
        }
    }
    out.push_str("}\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CompileErrorKind;

    const SHARPEN: &str = "\
//! TEXTURE Temp INPUT_WIDTH INPUT_HEIGHT
//! PARAMETER Sharpness float 0.5 0.0 1.0 0.01
//! PASS 0
//! IN INPUT
//! OUT OUTPUT
fn pass0(pos: vec2f) -> vec4f {
    let c = textureSampleLevel(INPUT, wgfx_sampler, pos, 0.0);
    let n = textureSampleLevel(INPUT, wgfx_sampler, pos + vec2f(INPUT_PT_X, 0.0), 0.0);
    return mix(c, c + (c - n), Sharpness);
}
";

    fn generate(source: &str) -> Result<Vec<GeneratedModule>, CompileError> {
        generate_modules(&parse_effect(source)?, &CodegenOptions::default())
    }

    #[test]
    fn test_single_pixel_pass() {
        let modules = generate(SHARPEN).unwrap();
        assert_eq!(modules.len(), 1);
        let module = &modules[0];

        assert_eq!(module.output, "OUTPUT");
        assert_eq!(module.block_size, [8, 8]);
        assert_eq!(module.workgroup_size, [8, 8, 1]);
        assert!(module.usage.uses_parameters);
        assert!(module.usage.sampled_textures.contains("INPUT"));
        assert!(module.usage.storage_textures.contains("OUTPUT"));

        let code = &module.code;
        assert!(code.starts_with("//! TEXTURE Temp INPUT_WIDTH INPUT_HEIGHT\n"));
        assert!(code.contains("@group(0) @binding(0) var wgfx_sampler: sampler;"), "{code}");
        assert!(code.contains("@group(0) @binding(1) var<uniform> wgfx_params: WgfxParams;"), "{code}");
        assert!(code.contains("@group(0) @binding(2) var INPUT: texture_2d<f32>;"), "{code}");
        assert!(code.contains("@group(0) @binding(3) var OUTPUT: texture_storage_2d<rgba8unorm, write>;"), "{code}");
        assert!(code.contains("@group(0) @binding(4) var<uniform> wgfx_scene: WgfxScene;"), "{code}");
        assert!(code.contains("mix(c, c + (c - n), wgfx_params.Sharpness)"), "{code}");
        assert!(code.contains("wgfx_scene.input_pt.x"), "{code}");
        assert!(code.contains("textureStore(OUTPUT, wgfx_pixel, pass0(wgfx_pos));"), "{code}");
    }

    #[test]
    fn test_generation_is_deterministic() {
        let first = generate(SHARPEN).unwrap();
        let second = generate(SHARPEN).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_undeclared_texture_names_identifier_and_pass() {
        let source = "//! PASS 0\n//! OUT OUTPUT\nfn pass0(pos: vec2f) -> vec4f { return vec4f(0.0); }\n//! PASS 1\n//! OUT OUTPUT\nfn pass1(pos: vec2f) -> vec4f { return textureSampleLevel(Missing, wgfx_sampler, pos, 0.0); }\n";
        match generate(source) {
            Err(CompileError::Resolution { pass, identifier, .. }) => {
                assert_eq!(pass, Some(1));
                assert_eq!(identifier, "Missing");
            }
            other => panic!("expected resolution error, got {other:?}"),
        }
    }

    #[test]
    fn test_undeclared_identifier_in_expression() {
        let source = SHARPEN.replace("c - n), Sharpness", "c - n), Sharpnes");
        match generate(&source) {
            Err(CompileError::Resolution { pass, identifier, message }) => {
                assert_eq!(pass, Some(0));
                assert_eq!(identifier, "Sharpnes");
                assert!(message.contains("undeclared"), "{message}");
            }
            other => panic!("expected resolution error, got {other:?}"),
        }

        let source = "//! PASS 0\n//! OUT OUTPUT\nfn pass0(pos: vec2f) -> vec4f { return vec4f(helper(pos.x)); }\n";
        match generate(source) {
            Err(CompileError::Resolution { identifier, .. }) => assert_eq!(identifier, "helper"),
            other => panic!("expected resolution error, got {other:?}"),
        }
    }

    #[test]
    fn test_sampler_references_are_checked() {
        let source = "//! PARAMETER P float\n//! PASS 0\n//! OUT OUTPUT\nfn pass0(pos: vec2f) -> vec4f { return textureSampleLevel(INPUT, P, pos, 0.0); }\n";
        let err = generate(source).unwrap_err();
        assert!(err.to_string().contains("'P'"), "{err}");

        let source = "//! SAMPLER pointSampler POINT\n//! PASS 0\n//! OUT OUTPUT\nfn pass0(pos: vec2f) -> vec4f { return textureSampleLevel(INPUT, pointSampler, pos, 0.0); }\n";
        let modules = generate(source).unwrap();
        assert!(modules[0].usage.samplers.contains("pointSampler"));
        assert!(modules[0].code.contains("var pointSampler: sampler;"));
    }

    #[test]
    fn test_compute_style_pass() {
        let source = "\
//! TEXTURE Half (INPUT_WIDTH / 2) (INPUT_HEIGHT / 2) rgba16float
//! PASS 0
//! BLOCK_SIZE 16
//! NUM_THREADS 8, 8
fn pass0(block_start: vec2u, thread_id: vec3u) {
    for (var y = thread_id.y; y < 16u; y += 8u) {
        for (var x = thread_id.x; x < 16u; x += 8u) {
            let p = block_start + vec2u(x, y);
            textureStore(Half, p, textureLoad(INPUT, p * 2u, 0));
        }
    }
}
//! PASS 1
//! IN Half
//! OUT OUTPUT
fn pass1(pos: vec2f) -> vec4f { return textureSampleLevel(Half, wgfx_sampler, pos, 0.0); }
";
        let modules = generate(source).unwrap();
        let first = &modules[0];
        assert_eq!(first.output, "Half");
        assert_eq!(first.block_size, [16, 16]);
        assert_eq!(first.workgroup_size, [8, 8, 1]);
        assert!(first.usage.storage_textures.contains("Half"));
        assert!(first.usage.sampled_textures.contains("INPUT"));
        assert!(!first.usage.uses_parameters);
        assert!(first.code.contains("var Half: texture_storage_2d<rgba16float, write>;"));
        assert!(first.code.contains("pass0(wgfx_block_start, wgfx_thread);"));

        assert!(modules[1].usage.sampled_textures.contains("Half"));
    }

    #[test]
    fn test_group_size_rules() {
        let pass = |block_size, num_threads| PassInfo {
            index: 0,
            inputs: vec![],
            outputs: vec![OUTPUT.to_string()],
            block_size,
            num_threads,
            code: String::new(),
        };
        assert_eq!(group_sizes(&pass(None, None), [8, 8]).unwrap(), ([8, 8], [8, 8, 1]));
        assert_eq!(group_sizes(&pass(Some(Dims::D2(32, 8)), None), [8, 8]).unwrap(), ([32, 8], [16, 8, 1]));
        assert_eq!(group_sizes(&pass(None, Some(Dims::D2(16, 4))), [8, 8]).unwrap(), ([16, 4], [16, 4, 1]));
        assert_eq!(group_sizes(&pass(Some(Dims::D1(16)), Some(Dims::D1(64))), [8, 8]).unwrap(), ([16, 16], [64, 1, 1]));

        let err = group_sizes(&pass(None, Some(Dims::D1(64))), [8, 8]).unwrap_err();
        assert_eq!(err.kind(), CompileErrorKind::Layout);
        assert!(group_sizes(&pass(None, Some(Dims::D2(32, 32))), [8, 8]).is_err());
        assert!(group_sizes(&pass(Some(Dims::D3(8, 8, 2)), None), [8, 8]).is_err());
    }

    #[test]
    fn test_pixel_pass_needs_single_output() {
        let err = generate("//! TEXTURE A 4 4\n//! PASS 0\n//! OUT A, OUTPUT\nfn pass0(pos: vec2f) -> vec4f { return vec4f(0.0); }\n").unwrap_err();
        assert!(err.to_string().contains("exactly one OUT"), "{err}");
    }

    #[test]
    fn test_missing_pass_function() {
        let err = generate("//! PASS 0\n//! OUT OUTPUT\nfn helper() {}\n").unwrap_err();
        assert_eq!(err.kind(), CompileErrorKind::Resolution);
        assert!(err.to_string().contains("pass0"));
    }

    #[test]
    fn test_common_code_and_overloads() {
        let source = "\
//! COMMON
fn luma(c: float3) -> float { return dot(c, float3(0.299, 0.587, 0.114)); }
fn luma(c: float4) -> float { return luma(c.rgb); }
//! PASS 0
//! OUT OUTPUT
fn pass0(pos: vec2f) -> vec4f { return vec4f(luma(textureSampleLevel(INPUT, wgfx_sampler, pos, 0.0))); }
";
        let code = &generate(source).unwrap()[0].code;
        assert!(code.contains("fn luma_vec3f(c: vec3f) -> f32"), "{code}");
        assert!(code.contains("return luma_vec3f(c.rgb);"), "{code}");
        assert!(code.contains("vec4f(luma_vec4f(textureSampleLevel(INPUT"), "{code}");
        assert!(code.find("fn luma_vec3f").unwrap() < code.find("fn pass0").unwrap());
    }

    #[test]
    fn test_shadowed_parameter_is_rejected() {
        let err = generate("//! PARAMETER Strength float\n//! PASS 0\n//! OUT OUTPUT\nfn pass0(pos: vec2f) -> vec4f { let Strength = 1.0; return vec4f(Strength); }\n").unwrap_err();
        assert!(err.to_string().contains("Strength"));
    }

    #[test]
    fn test_metadata_is_recoverable_from_modules() {
        let source = "\
//! TEXTURE Half (INPUT_WIDTH / 2) (INPUT_HEIGHT / 2)
//! SAMPLER nearest POINT
//! PARAMETER Strength float 1.5 0 4
//! PASS 0
//! IN INPUT
//! OUT Half
fn pass0(pos: vec2f) -> vec4f { return textureSampleLevel(INPUT, nearest, pos, 0.0) * Strength; }
//! PASS 1
//! IN Half
//! OUT OUTPUT
//! BLOCK_SIZE 16, 8
fn pass1(pos: vec2f) -> vec4f { return textureSampleLevel(Half, wgfx_sampler, pos, 0.0); }
";
        let info = parse_effect(source).unwrap();
        let modules = generate_modules(&info, &CodegenOptions::default()).unwrap();
        let recovered = recover_metadata(&modules).unwrap();
        assert_eq!(recovered.textures, info.textures);
        assert_eq!(recovered.samplers, info.samplers);
        assert_eq!(recovered.parameters, info.parameters);
        let strip = |passes: &[PassInfo]| passes.iter().map(|p| PassInfo { code: String::new(), ..p.clone() }).collect::<Vec<_>>();
        assert_eq!(strip(&recovered.passes), strip(&info.passes));
    }
}
