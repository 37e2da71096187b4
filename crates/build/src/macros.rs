//! Built-in macro expansion
//!
//! Effect code may use a handful of HLSL-flavored spellings and shorthand
//! constants. They are expanded into plain WGSL before overload resolution:
//!
//! - type renames such as `float3` to `vec3f`
//! - constants such as `INPUT_WIDTH` that read the scene uniform
//! - call-like macros such as `lerp(a, b, t)` to `mix(a, b, t)`
//!
//! Replacement is whole-word only, never inside comments and never on a member
//! access (`foo.INPUT_WIDTH` is left alone). A call-like macro used with a
//! different argument count, or without a call, is left unchanged.

use crate::log::LogConfig;
use crate::scan::{call_arguments, is_member_access, rewrite_idents, skip_whitespace};
use tracing::Level;

/// How a built-in macro expands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Macro {
    /// Plain identifier substitution
    Replace(&'static str),
    /// Call form with a fixed argument count; `$0`, `$1`, ... mark the arguments
    Call { arity: usize, template: &'static str },
}

fn builtin(name: &str) -> Option<Macro> {
    use Macro::{Call, Replace};
    let expansion = match name {
        "float" => Replace("f32"),
        "int" => Replace("i32"),
        "uint" => Replace("u32"),
        "float2" => Replace("vec2f"),
        "float3" => Replace("vec3f"),
        "float4" => Replace("vec4f"),
        "int2" => Replace("vec2i"),
        "int3" => Replace("vec3i"),
        "int4" => Replace("vec4i"),
        "uint2" => Replace("vec2u"),
        "uint3" => Replace("vec3u"),
        "uint4" => Replace("vec4u"),
        "float2x2" => Replace("mat2x2f"),
        "float3x3" => Replace("mat3x3f"),
        "float4x4" => Replace("mat4x4f"),
        "frac" => Replace("fract"),
        "rsqrt" => Replace("inverseSqrt"),

        "INPUT_WIDTH" => Replace("wgfx_scene.input_size.x"),
        "INPUT_HEIGHT" => Replace("wgfx_scene.input_size.y"),
        "OUTPUT_WIDTH" => Replace("wgfx_scene.output_size.x"),
        "OUTPUT_HEIGHT" => Replace("wgfx_scene.output_size.y"),
        "INPUT_PT_X" => Replace("wgfx_scene.input_pt.x"),
        "INPUT_PT_Y" => Replace("wgfx_scene.input_pt.y"),
        "OUTPUT_PT_X" => Replace("wgfx_scene.output_pt.x"),
        "OUTPUT_PT_Y" => Replace("wgfx_scene.output_pt.y"),
        "FRAME_COUNT" => Replace("wgfx_scene.frame_count"),

        "GetInputSize" => Call { arity: 0, template: "wgfx_scene.input_size" },
        "GetOutputSize" => Call { arity: 0, template: "wgfx_scene.output_size" },
        "GetInputPt" => Call { arity: 0, template: "wgfx_scene.input_pt" },
        "GetOutputPt" => Call { arity: 0, template: "wgfx_scene.output_pt" },
        "GetFrameCount" => Call { arity: 0, template: "wgfx_scene.frame_count" },
        "lerp" => Call { arity: 3, template: "mix($0, $1, $2)" },
        "mad" => Call { arity: 3, template: "fma($0, $1, $2)" },
        "mul" => Call { arity: 2, template: "(($0) * ($1))" },
        "fmod" => Call { arity: 2, template: "(($0) % ($1))" },
        "rcp" => Call { arity: 1, template: "(1.0 / ($0))" },
        "asfloat" => Call { arity: 1, template: "bitcast<f32>($0)" },
        "asint" => Call { arity: 1, template: "bitcast<i32>($0)" },
        "asuint" => Call { arity: 1, template: "bitcast<u32>($0)" },
        _ => return None,
    };
    Some(expansion)
}

/// Fills `$n` placeholders of a call template
fn instantiate(template: &str, args: &[String]) -> String {
    let mut out = String::with_capacity(template.len() + args.iter().map(String::len).sum::<usize>());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        match (c, chars.peek().and_then(|d| d.to_digit(10))) {
            ('$', Some(index)) => {
                chars.next();
                out.push_str(&args[index as usize]);
            }
            _ => out.push(c),
        }
    }
    out
}

/// Expands built-in macros in effect code
#[derive(Debug, Clone, Default)]
pub struct MacroExpander {
    log: LogConfig,
}

impl MacroExpander {
    /// Creates an expander that logs through `log`
    pub fn new(log: LogConfig) -> Self {
        Self { log }
    }

    /// Returns `code` with every built-in macro expanded
    pub fn expand(&self, code: &str) -> String {
        rewrite_idents(code, |name, start| {
            if is_member_access(code, start) {
                return None;
            }
            match builtin(name)? {
                Macro::Replace(replacement) => Some((replacement.to_string(), start + name.len())),
                Macro::Call { arity, template } => {
                    let open = skip_whitespace(code, start + name.len());
                    let (args, end) = call_arguments(code, open)?;
                    if args.len() != arity {
                        if self.log.enabled(Level::DEBUG) {
                            tracing::debug!("'{name}' takes {arity} argument(s) but was called with {}, leaving it unchanged", args.len());
                        }
                        return None;
                    }
                    let args: Vec<String> = args.iter().map(|arg| self.expand(arg)).collect();
                    Some((instantiate(template, &args), end))
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expand(code: &str) -> String {
        MacroExpander::default().expand(code)
    }

    #[test]
    fn test_type_renames() {
        assert_eq!(expand("let c: float3 = float3(1.0, 2.0, 3.0);"), "let c: vec3f = vec3f(1.0, 2.0, 3.0);");
        assert_eq!(expand("var m: float4x4; let x = frac(rsqrt(y));"), "var m: mat4x4f; let x = fract(inverseSqrt(y));");
        // whole words only
        assert_eq!(expand("let float3x = interior;"), "let float3x = interior;");
    }

    #[test]
    fn test_scene_constants() {
        assert_eq!(expand("f32(INPUT_WIDTH) * INPUT_PT_X"), "f32(wgfx_scene.input_size.x) * wgfx_scene.input_pt.x");
        assert_eq!(expand("GetOutputSize()"), "wgfx_scene.output_size");
        assert_eq!(expand("GetFrameCount ( )"), "wgfx_scene.frame_count");
    }

    #[test]
    fn test_call_macros() {
        assert_eq!(expand("lerp(a, b, 0.5)"), "mix(a, b, 0.5)");
        assert_eq!(expand("mul(m, v) + 1.0"), "((m) * (v)) + 1.0");
        assert_eq!(expand("rcp(x + y)"), "(1.0 / (x + y))");
        assert_eq!(expand("asuint(v.x)"), "bitcast<u32>(v.x)");
    }

    #[test]
    fn test_nested_macros_expand_inside_arguments() {
        assert_eq!(expand("lerp(float3(0.0), c, frac(t))"), "mix(vec3f(0.0), c, fract(t))");
        assert_eq!(expand("lerp(a, lerp(b, c, t), t)"), "mix(a, mix(b, c, t), t)");
    }

    #[test]
    fn test_arity_mismatch_is_left_unchanged() {
        assert_eq!(expand("lerp(a, b)"), "lerp(a, b)");
        assert_eq!(expand("let rcp = 1.0;"), "let rcp = 1.0;");
    }

    #[test]
    fn test_comments_and_member_accesses_are_untouched() {
        assert_eq!(expand("x // float3 lerp(a, b, c)"), "x // float3 lerp(a, b, c)");
        assert_eq!(expand("/* INPUT_WIDTH */ s.INPUT_WIDTH"), "/* INPUT_WIDTH */ s.INPUT_WIDTH");
    }
}
