//! Function overload resolution
//!
//! WGSL has no user-defined overloading, but effect code may declare several
//! functions with the same name and different parameter types. Each such group is
//! renamed to mangled names (`name_type1_type2`) and every call site is pointed at
//! the best-matching declaration.
//!
//! Argument types are inferred from the expression text: literals, constructors,
//! typed declarations, function parameters, known return types, swizzles and
//! arithmetic between them. A candidate scores 2 per exactly matching argument and
//! 1 per abstract literal that converts; a mismatch disqualifies it. Arguments
//! whose type cannot be inferred are neutral. Ties go to the declaration that
//! appears first.

use crate::error::CompileError;
use crate::log::LogConfig;
use crate::scan::{call_arguments, is_member_access, mask_comments, matching_brace, rewrite_idents, skip_whitespace, split_top_level};
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::Level;

static FN_HEADER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bfn\s+([A-Za-z_]\w*)\s*\(([^)]*)\)\s*(?:->\s*([^{]+?))?\s*\{").expect("valid regex"));
static DECLARATION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b(?:let|const|override|var(?:<[^>]*>)?)\s+([A-Za-z_]\w*)\s*(?::\s*([^=;]+?))?\s*(?:=\s*([^;]+))?;").expect("valid regex"));
static GENERIC_VECTOR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(vec[234]|mat[234]x[234])<\s*(f32|i32|u32|f16)\s*>$").expect("valid regex"));
static SHORT_VECTOR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^vec([234])([fiuh])$").expect("valid regex"));
static SHORT_MATRIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^mat([234])x([234])([fh])$").expect("valid regex"));

/// Normalizes a WGSL type spelling, e.g. `vec3<f32>` to `vec3f`
pub fn normalize_type(ty: &str) -> String {
    let compact: String = ty.chars().filter(|c| !c.is_whitespace()).collect();
    if let Some(caps) = GENERIC_VECTOR.captures(&compact) {
        let suffix = match &caps[2] {
            "f32" => "f",
            "i32" => "i",
            "u32" => "u",
            _ => "h",
        };
        return format!("{}{suffix}", &caps[1]);
    }
    compact
}

fn scalar_suffix(scalar: &str) -> Option<char> {
    match scalar {
        "f32" => Some('f'),
        "i32" => Some('i'),
        "u32" => Some('u'),
        "f16" => Some('h'),
        _ => None,
    }
}

fn scalar_of_suffix(suffix: &str) -> &'static str {
    match suffix {
        "f" => "f32",
        "i" => "i32",
        "u" => "u32",
        _ => "f16",
    }
}

/// Splits a vector type into its width and element type
fn vector_parts(ty: &str) -> Option<(usize, &'static str)> {
    let caps = SHORT_VECTOR.captures(ty)?;
    Some((caps[1].parse().ok()?, scalar_of_suffix(&caps[2])))
}

fn is_scalar(ty: &str) -> bool {
    matches!(ty, "f32" | "i32" | "u32" | "f16" | "bool")
}

/// Inferred type of an argument expression
#[derive(Debug, Clone, PartialEq, Eq)]
enum Inferred {
    /// A concrete, normalized WGSL type
    Exact(String),
    /// An integer literal without suffix
    AbstractInt,
    /// A float literal without suffix
    AbstractFloat,
}

impl Inferred {
    fn exact(ty: impl Into<String>) -> Self {
        Self::Exact(ty.into())
    }

    /// Concrete type this value would take on its own
    fn concretize(&self) -> String {
        match self {
            Self::Exact(ty) => ty.clone(),
            Self::AbstractInt => "i32".to_string(),
            Self::AbstractFloat => "f32".to_string(),
        }
    }

    /// Match score against a parameter type, `None` if incompatible
    fn score(&self, param: &str) -> Option<u32> {
        match self {
            Self::Exact(ty) => (ty == param).then_some(2),
            Self::AbstractInt => matches!(param, "i32" | "u32" | "f32" | "f16").then_some(1),
            Self::AbstractFloat => matches!(param, "f32" | "f16").then_some(1),
        }
    }
}

/// One declaration of a function
#[derive(Debug, Clone)]
struct Signature {
    params: Vec<String>,
    param_names: Vec<String>,
    ret: Option<String>,
    /// Byte offset of the function name
    name_start: usize,
    /// Byte range of the body, braces included
    body: (usize, usize),
    mangled: String,
}

/// Variable types visible at some point of the code
type Scope = HashMap<String, String>;

/// Built-in functions whose result has the type of their first argument
const SAME_AS_FIRST_ARG: &[&str] = &[
    "abs", "acos", "asin", "atan", "atan2", "ceil", "clamp", "cos", "cosh", "degrees", "exp", "exp2", "faceForward", "floor", "fma", "fract", "inverseSqrt", "log", "log2", "max", "min", "mix", "normalize", "pow", "radians", "reflect", "refract", "round", "saturate", "sign", "sin", "sinh", "smoothstep", "sqrt", "step", "tan", "tanh", "trunc",
];

/// Resolves overloaded function declarations and their call sites
#[derive(Debug, Clone, Default)]
pub struct OverloadResolver {
    log: LogConfig,
    functions: HashMap<String, Vec<Signature>>,
    globals: Scope,
}

impl OverloadResolver {
    /// Creates a resolver that logs through `log`
    pub fn new(log: LogConfig) -> Self {
        Self {
            log,
            ..Default::default()
        }
    }

    /// Forgets everything learned from a previous module
    pub fn reset(&mut self) {
        self.functions.clear();
        self.globals.clear();
    }

    /// Rewrites overloaded functions in `code` to unique names
    ///
    /// # Arguments
    /// * `code` - Complete module code, after macro expansion
    /// * `pass` - Pass the module belongs to, used in error reports
    /// * `globals` - Names visible everywhere with their WGSL types, e.g. parameters
    ///
    /// # Returns
    /// The rewritten code; unchanged if nothing is overloaded
    pub fn resolve(&mut self, code: &str, pass: u32, globals: &[(String, String)]) -> Result<String, CompileError> {
        self.reset();
        let masked = mask_comments(code);
        self.collect_signatures(&masked, pass)?;
        if !self.functions.values().any(|sigs| sigs.len() > 1) {
            return Ok(code.to_string());
        }

        for (name, ty) in globals {
            self.globals.insert(name.clone(), normalize_type(ty));
        }
        self.collect_module_scope(&masked);

        let declaration_sites: HashMap<usize, String> = self.functions.values().filter(|sigs| sigs.len() > 1).flatten().map(|sig| (sig.name_start, sig.mangled.clone())).collect();

        let mut error = None;
        let rewritten = rewrite_idents(code, |name, start| {
            if let Some(mangled) = declaration_sites.get(&start) {
                return Some((mangled.clone(), start + name.len()));
            }
            if error.is_some() || !self.is_overloaded(name) || is_member_access(code, start) {
                return None;
            }
            let open = skip_whitespace(&masked, start + name.len());
            let (args, _) = call_arguments(&masked, open)?;
            let scope = self.scope_at(&masked, start);
            match self.select(name, &args, &scope, pass) {
                Ok(sig) => Some((sig.mangled.clone(), start + name.len())),
                Err(e) => {
                    error = Some(e);
                    None
                }
            }
        });
        match error {
            Some(e) => Err(e),
            None => Ok(rewritten),
        }
    }

    fn is_overloaded(&self, name: &str) -> bool {
        self.functions.get(name).is_some_and(|sigs| sigs.len() > 1)
    }

    fn collect_signatures(&mut self, masked: &str, pass: u32) -> Result<(), CompileError> {
        for caps in FN_HEADER.captures_iter(masked) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else { continue };
            let open = whole.end() - 1;
            let close = matching_brace(masked, open).unwrap_or(masked.len().saturating_sub(1));

            let mut params = Vec::new();
            let mut param_names = Vec::new();
            for param in split_top_level(caps.get(2).map_or("", |m| m.as_str())) {
                // strip attributes such as @builtin(...)
                let param = param.rsplit(')').next().unwrap_or(param).trim();
                let (param_name, ty) = param.split_once(':').unwrap_or((param, ""));
                param_names.push(param_name.trim().to_string());
                params.push(normalize_type(ty));
            }
            let ret = caps.get(3).map(|m| {
                let ty = m.as_str();
                normalize_type(ty.rsplit(')').next().unwrap_or(ty))
            });

            let signatures = self.functions.entry(name.as_str().to_string()).or_default();
            if signatures.iter().any(|sig| sig.params == params) {
                return Err(CompileError::resolution(Some(pass), name.as_str(), format!("function is declared twice with parameters ({})", params.join(", "))));
            }
            let mangled = if params.is_empty() {
                format!("{}_void", name.as_str())
            } else {
                let types: Vec<String> = params.iter().map(|p| p.chars().map(|c| if c.is_ascii_alphanumeric() { c } else { '_' }).collect()).collect();
                format!("{}_{}", name.as_str(), types.join("_"))
            };
            signatures.push(Signature {
                params,
                param_names,
                ret,
                name_start: name.start(),
                body: (open, close),
                mangled,
            });
        }
        Ok(())
    }

    /// Records module-scope declarations, i.e. those outside any function body
    fn collect_module_scope(&mut self, masked: &str) {
        let bodies: Vec<(usize, usize)> = self.functions.values().flatten().map(|sig| sig.body).collect();
        let mut scope = std::mem::take(&mut self.globals);
        for caps in DECLARATION.captures_iter(masked) {
            let Some(whole) = caps.get(0) else { continue };
            if bodies.iter().any(|&(open, close)| whole.start() > open && whole.start() < close) {
                continue;
            }
            if let Some(ty) = self.declared_type(&caps, &scope) {
                scope.insert(caps[1].to_string(), ty);
            }
        }
        self.globals = scope;
    }

    fn declared_type(&self, caps: &regex::Captures<'_>, scope: &Scope) -> Option<String> {
        if let Some(ty) = caps.get(2) {
            return Some(normalize_type(ty.as_str()));
        }
        caps.get(3).and_then(|init| self.infer(init.as_str(), scope)).map(|ty| ty.concretize())
    }

    /// Builds the variable scope visible at byte offset `at`
    fn scope_at(&self, masked: &str, at: usize) -> Scope {
        let mut scope = self.globals.clone();
        let Some(sig) = self.functions.values().flatten().find(|sig| at > sig.body.0 && at < sig.body.1) else {
            return scope;
        };
        for (name, ty) in sig.param_names.iter().zip(&sig.params) {
            scope.insert(name.clone(), ty.clone());
        }
        let body = &masked[sig.body.0..at];
        for caps in DECLARATION.captures_iter(body) {
            if let Some(ty) = self.declared_type(&caps, &scope) {
                scope.insert(caps[1].to_string(), ty);
            }
        }
        scope
    }

    /// Picks the declaration a call should bind to
    fn select(&self, name: &str, args: &[&str], scope: &Scope, pass: u32) -> Result<&Signature, CompileError> {
        let candidates = self.functions.get(name).map(Vec::as_slice).unwrap_or_default();
        let inferred: Vec<Option<Inferred>> = args.iter().map(|arg| self.infer(arg, scope)).collect();

        let mut best: Option<(&Signature, u32)> = None;
        let mut tied = false;
        for sig in candidates.iter().filter(|sig| sig.params.len() == args.len()) {
            let score = sig.params.iter().zip(&inferred).try_fold(0, |total, (param, arg)| match arg {
                Some(arg) => arg.score(param).map(|s| total + s),
                None => Some(total),
            });
            let Some(score) = score else { continue };
            match best {
                Some((_, best_score)) if score < best_score => {}
                Some((_, best_score)) if score == best_score => tied = true,
                _ => {
                    best = Some((sig, score));
                    tied = false;
                }
            }
        }

        let describe = || inferred.iter().map(|arg| arg.as_ref().map_or("?".to_string(), Inferred::concretize)).collect::<Vec<_>>().join(", ");
        match best {
            Some((sig, _)) => {
                if tied && self.log.enabled(Level::WARN) {
                    tracing::warn!("call to '{name}({})' in pass {pass} is ambiguous, using '{}'", describe(), sig.mangled);
                }
                Ok(sig)
            }
            None => Err(CompileError::resolution(Some(pass), name, format!("no overload matches arguments ({})", describe()))),
        }
    }

    /// Infers the type of an expression, `None` if unknown
    fn infer(&self, expr: &str, scope: &Scope) -> Option<Inferred> {
        let expr = strip_parens(expr.trim());
        if expr.is_empty() {
            return None;
        }

        if let Some((lhs, op, rhs)) = split_binary(expr) {
            let (lhs, rhs) = (self.infer(lhs, scope), self.infer(rhs, scope));
            if matches!(op, "==" | "!=" | "<" | ">" | "<=" | ">=" | "&&" | "||") {
                return Some(Inferred::exact("bool"));
            }
            return combine(lhs?, rhs?);
        }
        if let Some(operand) = expr.strip_prefix('-').or_else(|| expr.strip_prefix('!')) {
            return self.infer(operand, scope);
        }

        let first = expr.as_bytes()[0];
        if first.is_ascii_digit() || (first == b'.' && expr.len() > 1) {
            return infer_literal(expr);
        }
        if expr == "true" || expr == "false" {
            return Some(Inferred::exact("bool"));
        }

        // primary followed by accessors: call, swizzle or index
        let head_len = expr.find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '<' || c == '>')).unwrap_or(expr.len());
        let head = &expr[..head_len];
        let mut rest = &expr[head_len..];
        let mut ty = if rest.trim_start().starts_with('(') {
            let open = head_len + skip_whitespace(rest, 0);
            let (args, end) = call_arguments(expr, open)?;
            rest = &expr[end..];
            if head.is_empty() { self.infer(args.first()?, scope)? } else { self.infer_call(head, &args, scope)? }
        } else {
            Inferred::Exact(scope.get(head)?.clone())
        };

        while !rest.is_empty() {
            if let Some(member) = rest.strip_prefix('.') {
                let len = member.find(|c: char| !(c.is_ascii_alphanumeric() || c == '_')).unwrap_or(member.len());
                ty = member_type(&ty.concretize(), &member[..len])?;
                rest = &member[len..];
            } else if rest.starts_with('[') {
                let close = rest.find(']')?;
                ty = element_type(&ty.concretize())?;
                rest = &rest[close + 1..];
            } else {
                return None;
            }
        }
        Some(ty)
    }

    fn infer_call(&self, head: &str, args: &[&str], scope: &Scope) -> Option<Inferred> {
        let normalized = normalize_type(head);
        if is_scalar(&normalized) || SHORT_VECTOR.is_match(&normalized) || SHORT_MATRIX.is_match(&normalized) {
            return Some(Inferred::Exact(normalized));
        }
        if let Some(ty) = head.strip_prefix("bitcast<").and_then(|t| t.strip_suffix('>')) {
            return Some(Inferred::Exact(normalize_type(ty)));
        }
        if let Some(width) = head.strip_prefix("vec").filter(|w| matches!(*w, "2" | "3" | "4")) {
            // vecN(...) takes its element type from the first argument
            let suffix = match self.infer(args.first()?, scope)? {
                Inferred::AbstractInt => 'i',
                Inferred::AbstractFloat => 'f',
                Inferred::Exact(ty) => scalar_suffix(vector_parts(&ty).map_or(ty.as_str(), |(_, scalar)| scalar))?,
            };
            return Some(Inferred::Exact(format!("vec{width}{suffix}")));
        }

        if let Some(candidates) = self.functions.get(head) {
            let sig = if candidates.len() > 1 { self.select(head, args, scope, 0).ok()? } else { candidates.first()? };
            return sig.ret.clone().map(Inferred::Exact);
        }

        match head {
            _ if SAME_AS_FIRST_ARG.contains(&head) => {
                let arg = self.infer(args.first()?, scope)?;
                // an abstract first argument takes the type of any concrete sibling
                match arg {
                    Inferred::Exact(_) => Some(arg),
                    _ => args[1..].iter().filter_map(|a| self.infer(a, scope)).find(|a| matches!(a, Inferred::Exact(_))).or(Some(arg)),
                }
            }
            "dot" | "length" | "distance" | "determinant" => {
                let arg = self.infer(args.first()?, scope)?.concretize();
                Some(Inferred::exact(vector_parts(&arg).map_or(arg.clone(), |(_, scalar)| scalar.to_string())))
            }
            "cross" | "select" => self.infer(args.first()?, scope),
            "all" | "any" => Some(Inferred::exact("bool")),
            "textureSample" | "textureSampleLevel" | "textureSampleGrad" | "textureSampleBias" | "textureGather" | "textureLoad" => Some(Inferred::exact("vec4f")),
            "textureDimensions" => Some(Inferred::exact("vec2u")),
            _ => None,
        }
    }
}

/// Removes parentheses that wrap the whole expression
fn strip_parens(mut expr: &str) -> &str {
    while expr.starts_with('(') {
        match call_arguments(expr, 0) {
            Some((_, end)) if end == expr.len() => expr = expr[1..expr.len() - 1].trim(),
            _ => break,
        }
    }
    expr
}

/// Splits at the lowest-precedence top-level binary operator, rightmost first
fn split_binary(expr: &str) -> Option<(&str, &'static str, &str)> {
    const LEVELS: &[&[&str]] = &[&["||"], &["&&"], &["==", "!=", "<=", ">=", "<", ">"], &["+", "-"], &["*", "/", "%"]];
    let bytes = expr.as_bytes();

    for operators in LEVELS {
        let mut depth = 0i32;
        let mut found = None;
        let mut i = 0;
        while i < bytes.len() {
            match bytes[i] {
                b'(' | b'[' => depth += 1,
                b')' | b']' => depth -= 1,
                _ if depth == 0 && i > 0 && expr.is_char_boundary(i) => {
                    if let Some(op) = operators.iter().find(|op| expr[i..].starts_with(**op)) {
                        let prev = expr[..i].trim_end();
                        let prev_char = prev.chars().last();
                        // unary operators and exponent signs are not binary operators
                        let is_unary = prev_char.is_none_or(|c| "+-*/%<>=!&|(,".contains(c));
                        let is_exponent = matches!(*op, "+" | "-") && prev.ends_with(['e', 'E']) && prev.chars().rev().nth(1).is_some_and(|c| c.is_ascii_digit() || c == '.');
                        let is_generic = matches!(*op, "<" | ">") && prev.ends_with(|c: char| c.is_ascii_alphanumeric()) && expr[..i].trim_end().len() == i && !op_has_spaces(expr, i);
                        let is_shift_or_arrow = expr[i..].starts_with("<<") || expr[i..].starts_with(">>") || expr[i..].starts_with("->");
                        if !is_unary && !is_exponent && !is_generic && !is_shift_or_arrow {
                            found = Some((i, *op));
                        }
                        i += op.len();
                        continue;
                    }
                }
                _ => {}
            }
            i += 1;
        }
        if let Some((i, op)) = found {
            return Some((expr[..i].trim(), op, expr[i + op.len()..].trim()));
        }
    }
    None
}

/// Comparison operators are written with surrounding spaces in effect code; `<`
/// glued to an identifier is a template argument list.
fn op_has_spaces(expr: &str, i: usize) -> bool {
    expr[i + 1..].starts_with(' ')
}

fn infer_literal(text: &str) -> Option<Inferred> {
    let is_hex = text.starts_with("0x") || text.starts_with("0X");
    if !is_hex {
        if let Some(stripped) = text.strip_suffix('f') {
            return stripped.parse::<f64>().is_ok().then(|| Inferred::exact("f32"));
        }
        if text.ends_with('h') {
            return Some(Inferred::exact("f16"));
        }
    }
    if text.ends_with('i') {
        return Some(Inferred::exact("i32"));
    }
    if text.ends_with('u') {
        return Some(Inferred::exact("u32"));
    }
    if !is_hex && (text.contains('.') || text.contains(['e', 'E'])) {
        return Some(Inferred::AbstractFloat);
    }
    Some(Inferred::AbstractInt)
}

/// Result type of arithmetic between two operands
fn combine(lhs: Inferred, rhs: Inferred) -> Option<Inferred> {
    match (&lhs, &rhs) {
        (Inferred::Exact(a), Inferred::Exact(b)) if a == b => Some(lhs),
        (Inferred::Exact(a), Inferred::Exact(b)) => {
            // vector-scalar and matrix-vector products
            if vector_parts(a).is_some() && is_scalar(b) {
                Some(lhs)
            } else if is_scalar(a) && vector_parts(b).is_some() {
                Some(rhs)
            } else if let (Some(caps), Some(_)) = (SHORT_MATRIX.captures(a), vector_parts(b)) {
                Some(Inferred::Exact(format!("vec{}{}", &caps[2], &caps[3])))
            } else {
                None
            }
        }
        (Inferred::Exact(_), _) => Some(lhs),
        (_, Inferred::Exact(_)) => Some(rhs),
        (Inferred::AbstractFloat, _) | (_, Inferred::AbstractFloat) => Some(Inferred::AbstractFloat),
        _ => Some(Inferred::AbstractInt),
    }
}

/// Type of `base.member`, covering swizzles and the scene uniform
fn member_type(base: &str, member: &str) -> Option<Inferred> {
    if let Some((_, scalar)) = vector_parts(base) {
        let is_swizzle = !member.is_empty() && member.len() <= 4 && (member.chars().all(|c| "xyzw".contains(c)) || member.chars().all(|c| "rgba".contains(c)));
        if !is_swizzle {
            return None;
        }
        return Some(if member.len() == 1 { Inferred::exact(scalar) } else { Inferred::Exact(format!("vec{}{}", member.len(), scalar_suffix(scalar)?)) });
    }
    if base == "WgfxScene" {
        let ty = match member {
            "input_size" | "output_size" => "vec2u",
            "input_pt" | "output_pt" => "vec2f",
            "frame_count" => "u32",
            "time" => "f32",
            _ => return None,
        };
        return Some(Inferred::exact(ty));
    }
    None
}

/// Type produced by indexing into `base`
fn element_type(base: &str) -> Option<Inferred> {
    if let Some((_, scalar)) = vector_parts(base) {
        return Some(Inferred::exact(scalar));
    }
    let caps = SHORT_MATRIX.captures(base)?;
    Some(Inferred::Exact(format!("vec{}{}", &caps[2], &caps[3])))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(code: &str) -> Result<String, CompileError> {
        OverloadResolver::default().resolve(code, 0, &[])
    }

    const OVERLOADED: &str = "\
fn luma(c: vec3f) -> f32 { return dot(c, vec3f(0.299, 0.587, 0.114)); }
fn luma(c: vec4<f32>) -> f32 { return luma(c.rgb) * c.a; }
";

    #[test]
    fn test_normalize_type() {
        assert_eq!(normalize_type("vec3<f32>"), "vec3f");
        assert_eq!(normalize_type(" mat4x4< f32 > "), "mat4x4f");
        assert_eq!(normalize_type("array<f32, 4>"), "array<f32,4>");
    }

    #[test]
    fn test_declarations_are_mangled() {
        let out = resolve(OVERLOADED).unwrap();
        assert!(out.contains("fn luma_vec3f(c: vec3f)"), "{out}");
        assert!(out.contains("fn luma_vec4f(c: vec4<f32>)"), "{out}");
        // the swizzle selects the vec3f overload inside the vec4f body
        assert!(out.contains("return luma_vec3f(c.rgb) * c.a;"), "{out}");
    }

    #[test]
    fn test_call_sites_use_inferred_types() {
        let code = format!(
            "{OVERLOADED}fn pass0(pos: vec2f) -> vec4f {{
    let color = textureSampleLevel(INPUT, wgfx_sampler, pos, 0.0);
    let a = luma(color);
    let b = luma(color.xyz);
    let c: vec3f = vec3f(1.0);
    return vec4f(luma(c * 2.0) + a + b);
}}
"
        );
        let out = resolve(&code).unwrap();
        assert!(out.contains("let a = luma_vec4f(color);"), "{out}");
        assert!(out.contains("let b = luma_vec3f(color.xyz);"), "{out}");
        assert!(out.contains("vec4f(luma_vec3f(c * 2.0) + a + b)"), "{out}");
    }

    #[test]
    fn test_literal_scoring_prefers_exact_match() {
        let code = "\
fn scale(x: i32) -> i32 { return x * 2; }
fn scale(x: f32) -> f32 { return x * 2.0; }
fn use_them() -> f32 { return f32(scale(3)) + scale(1.5) + scale(2.0f) + f32(scale(4i)); }
";
        let out = resolve(code).unwrap();
        // abstract int converts to both, the first declaration wins the tie
        assert!(out.contains("f32(scale_i32(3))"), "{out}");
        assert!(out.contains("scale_f32(1.5)"), "{out}");
        assert!(out.contains("scale_f32(2.0f)"), "{out}");
        assert!(out.contains("f32(scale_i32(4i))"), "{out}");
    }

    #[test]
    fn test_globals_and_scene_fields() {
        let code = "\
fn pick(x: f32) -> f32 { return x; }
fn pick(x: vec2u) -> f32 { return f32(x.x); }
fn f() -> f32 { return pick(Strength) + pick(wgfx_scene.input_size); }
";
        let globals = vec![("Strength".to_string(), "f32".to_string()), ("wgfx_scene".to_string(), "WgfxScene".to_string())];
        let out = OverloadResolver::default().resolve(code, 0, &globals).unwrap();
        assert!(out.contains("pick_f32(Strength) + pick_vec2u(wgfx_scene.input_size)"), "{out}");
    }

    #[test]
    fn test_arity_selects_overload() {
        let code = "\
fn blend(a: vec4f) -> vec4f { return a; }
fn blend(a: vec4f, b: vec4f) -> vec4f { return a + b; }
fn g(x: vec4f) -> vec4f { return blend(x) + blend(x, x); }
";
        let out = resolve(code).unwrap();
        assert!(out.contains("blend_vec4f(x) + blend_vec4f_vec4f(x, x)"), "{out}");
    }

    #[test]
    fn test_unmatched_call_is_an_error() {
        let code = "\
fn h(a: f32) -> f32 { return a; }
fn h(a: vec2f) -> f32 { return a.x; }
fn k(v: vec3f) -> f32 { return h(v); }
";
        let err = resolve(code).unwrap_err();
        assert!(err.to_string().contains("'h'"), "{err}");
        assert!(err.to_string().contains("vec3f"), "{err}");
    }

    #[test]
    fn test_duplicate_signature_is_an_error() {
        assert!(resolve("fn d(a: f32) {}\nfn d(b: f32) {}\n").is_err());
    }

    #[test]
    fn test_code_without_overloads_is_unchanged() {
        let code = "fn a(x: f32) -> f32 { return x; } // fn a(y: f32)\n";
        assert_eq!(resolve(code).unwrap(), code);
    }
}
