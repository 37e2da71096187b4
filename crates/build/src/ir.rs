//! Intermediate representation of a parsed effect
//!
//! [`WgfxShaderInfo`] is the root object produced by the parser and consumed by the
//! code generator and the runtime. It is a plain data model: every name is kept as
//! written in the source, size expressions stay opaque until the resource manager
//! evaluates them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Reserved name of the caller-supplied source texture
pub const INPUT: &str = "INPUT";
/// Reserved name of the caller-supplied result texture
pub const OUTPUT: &str = "OUTPUT";

/// Returns true if `name` is one of the two sentinel textures
pub fn is_reserved_name(name: &str) -> bool {
    name == INPUT || name == OUTPUT
}

/// Returns true if `name` is a valid effect identifier
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => chars.all(|c| c.is_ascii_alphanumeric() || c == '_'),
        _ => false,
    }
}

/// A texture dimension as written in the source, evaluated later
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeExpr(String);

impl SizeExpr {
    /// Wraps an expression string
    pub fn new(source: impl Into<String>) -> Self {
        Self(source.into())
    }

    /// Returns the expression text exactly as written
    pub fn source(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SizeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Pixel formats an effect may request for its intermediate textures
///
/// Only formats usable as write-only storage textures are accepted, since every
/// declared texture is written by some pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextureFormat {
    Rgba8Unorm,
    Rgba8Snorm,
    Rgba16Float,
    R32Float,
    Rg32Float,
    Rgba32Float,
}

impl TextureFormat {
    /// Format used when a `TEXTURE` directive omits one
    pub const DEFAULT: Self = Self::Rgba16Float;

    /// Parses a WGSL storage format name or its DXGI-style alias
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "rgba8unorm" | "r8g8b8a8_unorm" => Some(Self::Rgba8Unorm),
            "rgba8snorm" | "r8g8b8a8_snorm" => Some(Self::Rgba8Snorm),
            "rgba16float" | "r16g16b16a16_float" => Some(Self::Rgba16Float),
            "r32float" | "r32_float" => Some(Self::R32Float),
            "rg32float" | "r32g32_float" => Some(Self::Rg32Float),
            "rgba32float" | "r32g32b32a32_float" => Some(Self::Rgba32Float),
            _ => None,
        }
    }

    /// Name of the format in WGSL storage texture declarations
    pub fn wgsl_name(self) -> &'static str {
        match self {
            Self::Rgba8Unorm => "rgba8unorm",
            Self::Rgba8Snorm => "rgba8snorm",
            Self::Rgba16Float => "rgba16float",
            Self::R32Float => "r32float",
            Self::Rg32Float => "rg32float",
            Self::Rgba32Float => "rgba32float",
        }
    }

    /// Whether the format can be sampled with a filtering sampler without extra device features
    pub fn is_filterable(self) -> bool {
        !matches!(self, Self::R32Float | Self::Rg32Float | Self::Rgba32Float)
    }

    /// Size of one texel in bytes
    pub fn bytes_per_texel(self) -> u32 {
        match self {
            Self::Rgba8Unorm | Self::Rgba8Snorm | Self::R32Float => 4,
            Self::Rgba16Float | Self::Rg32Float => 8,
            Self::Rgba32Float => 16,
        }
    }
}

impl fmt::Display for TextureFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wgsl_name())
    }
}

/// An intermediate texture declared with `//! TEXTURE`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextureInfo {
    /// Identifier, unique within the effect
    pub name: String,
    /// Width expression
    pub width: SizeExpr,
    /// Height expression
    pub height: SizeExpr,
    /// Explicit format, if one was given
    pub format: Option<TextureFormat>,
}

impl TextureInfo {
    /// Returns the declared format or the default one
    pub fn format_or_default(&self) -> TextureFormat {
        self.format.unwrap_or(TextureFormat::DEFAULT)
    }
}

/// Texture sampling filter modes
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterMode {
    /// Nearest neighbor filtering
    Nearest,
    /// Linear interpolation filtering
    #[default]
    Linear,
}

/// Texture coordinate addressing outside `[0, 1]`
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressMode {
    #[default]
    ClampToEdge,
    Repeat,
    MirrorRepeat,
}

/// A sampler declared with `//! SAMPLER`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplerInfo {
    /// Identifier, unique within the effect
    pub name: String,
    /// Filter used for magnification and minification
    pub filter: FilterMode,
    /// Addressing used on all axes
    pub address: AddressMode,
}

/// Scalar kind of a parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarType {
    Float,
    Int,
}

/// Type of an adjustable parameter: a scalar kind and 1 to 4 components
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParameterType {
    /// Scalar kind of every component
    pub scalar: ScalarType,
    /// Component count, 1 to 4
    pub components: u8,
}

impl ParameterType {
    /// Scalar `float`
    pub const FLOAT: Self = Self {
        scalar: ScalarType::Float,
        components: 1,
    };
    /// Scalar `int`
    pub const INT: Self = Self {
        scalar: ScalarType::Int,
        components: 1,
    };

    /// Parses `float`, `int`, `floatN` or `intN`
    pub fn parse(s: &str) -> Option<Self> {
        let (scalar, rest) = if let Some(rest) = s.strip_prefix("float") {
            (ScalarType::Float, rest)
        } else if let Some(rest) = s.strip_prefix("int") {
            (ScalarType::Int, rest)
        } else {
            return None;
        };
        let components = match rest {
            "" => 1,
            "2" => 2,
            "3" => 3,
            "4" => 4,
            _ => return None,
        };
        Some(Self { scalar, components })
    }

    /// Name of the type in the effect grammar
    pub fn directive_name(&self) -> String {
        let base = match self.scalar {
            ScalarType::Float => "float",
            ScalarType::Int => "int",
        };
        if self.components == 1 { base.to_string() } else { format!("{base}{}", self.components) }
    }

    /// Name of the type in WGSL
    pub fn wgsl_name(&self) -> String {
        match (self.scalar, self.components) {
            (ScalarType::Float, 1) => "f32".to_string(),
            (ScalarType::Int, 1) => "i32".to_string(),
            (ScalarType::Float, n) => format!("vec{n}f"),
            (ScalarType::Int, n) => format!("vec{n}i"),
        }
    }

    /// Returns the all-zero value of this type
    pub fn zero(&self) -> ParameterValue {
        match (self.scalar, self.components) {
            (ScalarType::Float, 1) => ParameterValue::Float(0.0),
            (ScalarType::Int, 1) => ParameterValue::Int(0),
            (ScalarType::Float, n) => ParameterValue::FloatVec(vec![0.0; n as usize]),
            (ScalarType::Int, n) => ParameterValue::IntVec(vec![0; n as usize]),
        }
    }
}

/// A parameter value: scalar or short vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParameterValue {
    Float(f32),
    Int(i32),
    FloatVec(Vec<f32>),
    IntVec(Vec<i32>),
}

impl ParameterValue {
    /// Number of components in the value
    pub fn components(&self) -> usize {
        match self {
            Self::Float(_) | Self::Int(_) => 1,
            Self::FloatVec(v) => v.len(),
            Self::IntVec(v) => v.len(),
        }
    }

    /// Components converted to `f64`
    pub fn to_f64s(&self) -> Vec<f64> {
        match self {
            Self::Float(v) => vec![*v as f64],
            Self::Int(v) => vec![*v as f64],
            Self::FloatVec(v) => v.iter().map(|&x| x as f64).collect(),
            Self::IntVec(v) => v.iter().map(|&x| x as f64).collect(),
        }
    }
}

impl From<f32> for ParameterValue {
    fn from(value: f32) -> Self {
        Self::Float(value)
    }
}

impl From<i32> for ParameterValue {
    fn from(value: i32) -> Self {
        Self::Int(value)
    }
}

impl<const N: usize> From<[f32; N]> for ParameterValue {
    fn from(value: [f32; N]) -> Self {
        Self::FloatVec(value.to_vec())
    }
}

impl<const N: usize> From<[i32; N]> for ParameterValue {
    fn from(value: [i32; N]) -> Self {
        Self::IntVec(value.to_vec())
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join<T: fmt::Display>(values: &[T]) -> String {
            values.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", ")
        }
        match self {
            Self::Float(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::FloatVec(v) => write!(f, "({})", join(v)),
            Self::IntVec(v) => write!(f, "({})", join(v)),
        }
    }
}

/// An adjustable uniform declared with `//! PARAMETER`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterInfo {
    /// Identifier, unique within the effect
    pub name: String,
    /// Declared type
    pub ty: ParameterType,
    /// Initial value
    pub default: ParameterValue,
    /// Lower bound applied to every component
    pub min: Option<f32>,
    /// Upper bound applied to every component
    pub max: Option<f32>,
    /// UI adjustment step
    pub step: Option<f32>,
}

/// Thread-group dimensions as declared, with 1 to 3 components
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dims {
    D1(u32),
    D2(u32, u32),
    D3(u32, u32, u32),
}

impl Dims {
    /// Builds dimensions from 1 to 3 values
    pub fn from_slice(values: &[u32]) -> Option<Self> {
        match *values {
            [x] => Some(Self::D1(x)),
            [x, y] => Some(Self::D2(x, y)),
            [x, y, z] => Some(Self::D3(x, y, z)),
            _ => None,
        }
    }

    /// Declared components
    pub fn values(&self) -> Vec<u32> {
        match *self {
            Self::D1(x) => vec![x],
            Self::D2(x, y) => vec![x, y],
            Self::D3(x, y, z) => vec![x, y, z],
        }
    }
}

impl fmt::Display for Dims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let values = self.values().iter().map(|v| v.to_string()).collect::<Vec<_>>();
        f.write_str(&values.join(", "))
    }
}

/// One compute pass opened with `//! PASS n`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassInfo {
    /// 0-based execution order
    pub index: u32,
    /// Textures and samplers listed by `//! IN`
    pub inputs: Vec<String>,
    /// Textures listed by `//! OUT`
    pub outputs: Vec<String>,
    /// Pixels covered by one workgroup
    pub block_size: Option<Dims>,
    /// Workgroup thread count
    pub num_threads: Option<Dims>,
    /// Pass-local shader code with directive lines removed
    pub code: String,
}

impl PassInfo {
    /// Name used by the runtime to address this pass
    pub fn name(&self) -> String {
        format!("PASS_{}", self.index)
    }

    /// Name of the WGSL function the pass body must define
    pub fn function_name(&self) -> String {
        format!("pass{}", self.index)
    }

    /// Renders the directives that open this pass
    pub fn directives(&self) -> String {
        let mut out = format!("//! PASS {}\n", self.index);
        if !self.inputs.is_empty() {
            out.push_str(&format!("//! IN {}\n", self.inputs.join(", ")));
        }
        if !self.outputs.is_empty() {
            out.push_str(&format!("//! OUT {}\n", self.outputs.join(", ")));
        }
        if let Some(block_size) = self.block_size {
            out.push_str(&format!("//! BLOCK_SIZE {block_size}\n"));
        }
        if let Some(num_threads) = self.num_threads {
            out.push_str(&format!("//! NUM_THREADS {num_threads}\n"));
        }
        out
    }
}

/// Root of the IR: everything declared by one effect source
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WgfxShaderInfo {
    /// Intermediate textures in declaration order
    pub textures: Vec<TextureInfo>,
    /// Samplers in declaration order
    pub samplers: Vec<SamplerInfo>,
    /// Parameters in declaration order, which is also their packing order
    pub parameters: Vec<ParameterInfo>,
    /// Passes in execution order
    pub passes: Vec<PassInfo>,
    /// Code shared by every pass
    pub common_code: String,
}

impl WgfxShaderInfo {
    /// Looks up a declared texture by name
    pub fn texture(&self, name: &str) -> Option<&TextureInfo> {
        self.textures.iter().find(|t| t.name == name)
    }

    /// Looks up a declared sampler by name
    pub fn sampler(&self, name: &str) -> Option<&SamplerInfo> {
        self.samplers.iter().find(|s| s.name == name)
    }

    /// Looks up a declared parameter by name
    pub fn parameter(&self, name: &str) -> Option<&ParameterInfo> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Looks up a pass by its runtime name (`PASS_<index>`)
    pub fn pass_by_name(&self, name: &str) -> Option<&PassInfo> {
        let index: u32 = name.strip_prefix("PASS_")?.parse().ok()?;
        self.passes.get(index as usize)
    }

    /// Returns true if `name` is a texture visible to passes, sentinels included
    pub fn is_texture(&self, name: &str) -> bool {
        is_reserved_name(name) || self.texture(name).is_some()
    }

    /// Returns true if any identifier of any kind is declared under `name`
    pub fn is_declared(&self, name: &str) -> bool {
        self.texture(name).is_some() || self.sampler(name).is_some() || self.parameter(name).is_some()
    }

    /// Renders the `TEXTURE`, `SAMPLER` and `PARAMETER` directives
    pub fn declarations(&self) -> String {
        let mut out = String::new();
        for texture in &self.textures {
            out.push_str(&format!("//! TEXTURE {} {} {}", texture.name, texture.width, texture.height));
            if let Some(format) = texture.format {
                out.push_str(&format!(" {format}"));
            }
            out.push('\n');
        }
        for sampler in &self.samplers {
            let filter = match sampler.filter {
                FilterMode::Nearest => "POINT",
                FilterMode::Linear => "LINEAR",
            };
            let address = match sampler.address {
                AddressMode::ClampToEdge => "CLAMP",
                AddressMode::Repeat => "WRAP",
                AddressMode::MirrorRepeat => "MIRROR",
            };
            out.push_str(&format!("//! SAMPLER {} {filter} {address}\n", sampler.name));
        }
        for parameter in &self.parameters {
            out.push_str(&format!("//! PARAMETER {} {} {}", parameter.name, parameter.ty.directive_name(), parameter.default));
            // min/max/step are positional, so a later field forces the earlier ones out
            let tuning = [parameter.min, parameter.max, parameter.step];
            let present = tuning.iter().rposition(Option::is_some).map_or(0, |i| i + 1);
            for value in &tuning[..present] {
                out.push_str(&format!(" {}", value.unwrap_or(0.0)));
            }
            out.push('\n');
        }
        out
    }

    /// Renders the IR back into canonical effect source
    ///
    /// Parsing the result yields an equal IR.
    pub fn to_source(&self) -> String {
        let mut out = self.declarations();
        out.push_str("//! COMMON\n");
        out.push_str(&self.common_code);
        for pass in &self.passes {
            out.push_str(&pass.directives());
            out.push_str(&pass.code);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_rules() {
        assert!(is_identifier("Temp"));
        assert!(is_identifier("_tmp2"));
        assert!(!is_identifier("2tmp"));
        assert!(!is_identifier("a-b"));
        assert!(!is_identifier(""));
    }

    #[test]
    fn test_texture_format_aliases() {
        assert_eq!(TextureFormat::parse("R16G16B16A16_FLOAT"), Some(TextureFormat::Rgba16Float));
        assert_eq!(TextureFormat::parse("rgba8unorm"), Some(TextureFormat::Rgba8Unorm));
        assert_eq!(TextureFormat::parse("bgra8unorm"), None);
        assert!(!TextureFormat::Rgba32Float.is_filterable());
        assert_eq!(TextureFormat::Rgba16Float.bytes_per_texel(), 8);
    }

    #[test]
    fn test_parameter_type_parsing() {
        assert_eq!(ParameterType::parse("float"), Some(ParameterType::FLOAT));
        assert_eq!(ParameterType::parse("int3").map(|t| t.wgsl_name()), Some("vec3i".to_string()));
        assert_eq!(ParameterType::parse("float5"), None);
        assert_eq!(ParameterType::parse("double"), None);
    }

    #[test]
    fn test_pass_lookup_by_name() {
        let info = WgfxShaderInfo {
            passes: vec![PassInfo {
                index: 0,
                inputs: vec![],
                outputs: vec![OUTPUT.to_string()],
                block_size: None,
                num_threads: None,
                code: String::new(),
            }],
            ..Default::default()
        };
        assert_eq!(info.pass_by_name("PASS_0").map(|p| p.index), Some(0));
        assert!(info.pass_by_name("PASS_1").is_none());
        assert!(info.pass_by_name("pass0").is_none());
    }
}
