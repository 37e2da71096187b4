//! Effect source parser
//!
//! The effect format is a WGSL file interleaved with directive lines starting with
//! `//!`. Each line is classified first; directive lines are then tokenized and
//! parsed by a keyword-driven grammar while code lines are collected into the
//! current section (the common block or the open pass).
//!
//! ```text
//! directive   := "//!" KEYWORD arg*
//! arg         := group | word          (separated by whitespace or top-level commas)
//! group       := "(" ... ")"           (balanced, may contain whitespace and commas)
//! ```

use crate::error::CompileError;
use crate::ir::{AddressMode, Dims, FilterMode, INPUT, OUTPUT, ParameterInfo, ParameterType, ParameterValue, PassInfo, SamplerInfo, ScalarType, SizeExpr, TextureFormat, TextureInfo, WgfxShaderInfo, is_identifier, is_reserved_name};

/// Prefix shared by every directive line
const DIRECTIVE_PREFIX: &str = "//!";

/// A token of a directive line
#[derive(Debug, Clone, PartialEq, Eq)]
struct Token<'a> {
    /// Token text; groups keep their parentheses
    text: &'a str,
    /// 1-based column of the first character
    column: usize,
}

/// Splits the argument part of a directive into tokens
///
/// `offset` is the byte offset of `args` within its line, used for column numbers.
fn tokenize<'a>(args: &'a str, line: usize, offset: usize) -> Result<Vec<Token<'a>>, CompileError> {
    let bytes = args.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        if c.is_ascii_whitespace() || c == b',' {
            i += 1;
            continue;
        }
        let start = i;
        let mut depth = 0usize;
        while i < bytes.len() {
            match bytes[i] {
                b'(' => depth += 1,
                b')' => {
                    if depth == 0 {
                        return Err(CompileError::syntax(line, offset + i + 1, "unmatched ')'"));
                    }
                    depth -= 1;
                }
                c if depth == 0 && (c.is_ascii_whitespace() || c == b',') => break,
                _ => {}
            }
            i += 1;
        }
        if depth > 0 {
            return Err(CompileError::syntax(line, offset + start + 1, "unterminated '(' group"));
        }
        tokens.push(Token {
            text: &args[start..i],
            column: offset + start + 1,
        });
    }
    Ok(tokens)
}

/// Which part of the effect code lines currently belong to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Common,
    Pass,
}

/// Cursor over the arguments of one directive
struct Args<'a, 't> {
    tokens: &'t [Token<'a>],
    position: usize,
    line: usize,
    /// Column just past the keyword, reported when arguments run out
    end_column: usize,
    keyword: &'static str,
}

impl<'a, 't> Args<'a, 't> {
    fn next(&mut self) -> Option<&'t Token<'a>> {
        let token = self.tokens.get(self.position);
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    fn expect(&mut self, what: &str) -> Result<Token<'a>, CompileError> {
        let (line, column, keyword) = (self.line, self.end_column, self.keyword);
        self.next()
            .cloned()
            .ok_or_else(|| CompileError::syntax(line, column, format!("{keyword}: expected {what}")))
    }

    fn expect_identifier(&mut self, what: &str) -> Result<Token<'a>, CompileError> {
        let token = self.expect(what)?;
        if !is_identifier(token.text) {
            return Err(CompileError::syntax(self.line, token.column, format!("{}: '{}' is not a valid {what}", self.keyword, token.text)));
        }
        Ok(token)
    }

    fn finish(&mut self) -> Result<(), CompileError> {
        match self.next() {
            Some(token) => Err(CompileError::syntax(self.line, token.column, format!("{}: unexpected argument '{}'", self.keyword, token.text))),
            None => Ok(()),
        }
    }

    fn error(&self, token: &Token<'_>, message: impl std::fmt::Display) -> CompileError {
        CompileError::syntax(self.line, token.column, format!("{}: {message}", self.keyword))
    }
}

/// Builds a [`WgfxShaderInfo`] line by line
struct EffectParser {
    info: WgfxShaderInfo,
    section: Section,
    /// Position of the still-open block comment, if any
    open_comment: Option<(usize, usize)>,
    /// Comment nesting depth carried across lines
    comment_depth: usize,
    last_line: usize,
}

impl EffectParser {
    fn new() -> Self {
        Self {
            info: WgfxShaderInfo::default(),
            section: Section::Common,
            open_comment: None,
            comment_depth: 0,
            last_line: 0,
        }
    }

    fn parse(mut self, source: &str) -> Result<WgfxShaderInfo, CompileError> {
        for (i, line) in source.lines().enumerate() {
            let line_number = i + 1;
            self.last_line = line_number;
            let trimmed = line.trim_start();
            if self.comment_depth == 0 && trimmed.starts_with(DIRECTIVE_PREFIX) {
                let offset = line.len() - trimmed.len() + DIRECTIVE_PREFIX.len();
                self.parse_directive(&trimmed[DIRECTIVE_PREFIX.len()..], line_number, offset)?;
            } else {
                self.track_block_comments(line, line_number);
                self.push_code(line);
            }
        }

        if let Some((line, column)) = self.open_comment {
            return Err(CompileError::syntax(line, column, "unterminated block comment"));
        }
        if self.info.passes.is_empty() {
            return Err(CompileError::syntax(self.last_line.max(1), 1, "effect declares no passes"));
        }
        validate(&self.info)?;
        Ok(self.info)
    }

    fn push_code(&mut self, line: &str) {
        let target = match self.section {
            Section::Common => &mut self.info.common_code,
            Section::Pass => match self.info.passes.last_mut() {
                Some(pass) => &mut pass.code,
                None => &mut self.info.common_code,
            },
        };
        target.push_str(line);
        target.push('\n');
    }

    /// Updates block comment state for a code line
    fn track_block_comments(&mut self, line: &str, line_number: usize) {
        let bytes = line.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            if self.comment_depth == 0 && bytes[i] == b'/' && bytes.get(i + 1) == Some(&b'/') {
                return;
            }
            if bytes[i] == b'/' && bytes.get(i + 1) == Some(&b'*') {
                if self.comment_depth == 0 {
                    self.open_comment = Some((line_number, i + 1));
                }
                self.comment_depth += 1;
                i += 2;
            } else if self.comment_depth > 0 && bytes[i] == b'*' && bytes.get(i + 1) == Some(&b'/') {
                self.comment_depth -= 1;
                if self.comment_depth == 0 {
                    self.open_comment = None;
                }
                i += 2;
            } else {
                i += 1;
            }
        }
    }

    fn parse_directive(&mut self, body: &str, line: usize, offset: usize) -> Result<(), CompileError> {
        let keyword_start = body.len() - body.trim_start().len();
        let rest = &body[keyword_start..];
        let keyword_len = rest.find(|c: char| !(c.is_ascii_alphanumeric() || c == '_')).unwrap_or(rest.len());
        let keyword = &rest[..keyword_len];
        let keyword_column = offset + keyword_start + 1;
        if keyword.is_empty() {
            return Err(CompileError::syntax(line, keyword_column, "expected a directive keyword after '//!'"));
        }

        let args_offset = offset + keyword_start + keyword_len;
        let tokens = tokenize(&rest[keyword_len..], line, args_offset)?;
        let keyword_upper = keyword.to_ascii_uppercase();
        let keyword: &'static str = match keyword_upper.as_str() {
            "PASS" => "PASS",
            "TEXTURE" => "TEXTURE",
            "SAMPLER" => "SAMPLER",
            "PARAMETER" => "PARAMETER",
            "COMMON" => "COMMON",
            "IN" => "IN",
            "OUT" => "OUT",
            "BLOCK_SIZE" => "BLOCK_SIZE",
            "NUM_THREADS" => "NUM_THREADS",
            _ => return Err(CompileError::syntax(line, keyword_column, format!("unknown directive '{keyword}'"))),
        };
        let mut args = Args {
            tokens: &tokens,
            position: 0,
            line,
            end_column: args_offset + 1,
            keyword,
        };

        match keyword {
            "PASS" => self.parse_pass(&mut args),
            "TEXTURE" => self.parse_texture(&mut args),
            "SAMPLER" => self.parse_sampler(&mut args),
            "PARAMETER" => self.parse_parameter(&mut args),
            "COMMON" => {
                args.finish()?;
                self.section = Section::Common;
                Ok(())
            }
            _ => self.parse_pass_attribute(&mut args, keyword_column),
        }
    }

    fn parse_pass(&mut self, args: &mut Args<'_, '_>) -> Result<(), CompileError> {
        let token = args.expect("a pass index")?;
        let index: u32 = token.text.parse().map_err(|_| args.error(&token, format!("'{}' is not a non-negative integer", token.text)))?;
        let expected = self.info.passes.len() as u32;
        if index != expected {
            return Err(args.error(&token, format!("passes must be numbered sequentially from 0: expected {expected}, found {index}")));
        }
        args.finish()?;
        self.info.passes.push(PassInfo {
            index,
            inputs: Vec::new(),
            outputs: Vec::new(),
            block_size: None,
            num_threads: None,
            code: String::new(),
        });
        self.section = Section::Pass;
        Ok(())
    }

    fn declare_name(&self, args: &Args<'_, '_>, token: &Token<'_>) -> Result<String, CompileError> {
        if is_reserved_name(token.text) {
            return Err(args.error(token, format!("'{}' is reserved", token.text)));
        }
        if token.text.starts_with("wgfx_") {
            return Err(args.error(token, "the 'wgfx_' prefix is reserved for generated code"));
        }
        if self.info.is_declared(token.text) {
            return Err(args.error(token, format!("'{}' is already declared", token.text)));
        }
        Ok(token.text.to_string())
    }

    fn parse_texture(&mut self, args: &mut Args<'_, '_>) -> Result<(), CompileError> {
        let name_token = args.expect_identifier("texture name")?;
        let name = self.declare_name(args, &name_token)?;
        let width = args.expect("a width expression")?;
        let height = args.expect("a height expression")?;
        let format = match args.next().cloned() {
            Some(token) => Some(TextureFormat::parse(token.text).ok_or_else(|| args.error(&token, format!("unsupported texture format '{}'", token.text)))?),
            None => None,
        };
        args.finish()?;
        self.info.textures.push(TextureInfo {
            name,
            width: SizeExpr::new(width.text),
            height: SizeExpr::new(height.text),
            format,
        });
        Ok(())
    }

    fn parse_sampler(&mut self, args: &mut Args<'_, '_>) -> Result<(), CompileError> {
        let name_token = args.expect_identifier("sampler name")?;
        let name = self.declare_name(args, &name_token)?;
        let mut filter = FilterMode::default();
        let mut address = AddressMode::default();
        while let Some(token) = args.next().cloned() {
            match token.text.to_ascii_uppercase().as_str() {
                "LINEAR" => filter = FilterMode::Linear,
                "POINT" | "NEAREST" => filter = FilterMode::Nearest,
                "CLAMP" => address = AddressMode::ClampToEdge,
                "WRAP" | "REPEAT" => address = AddressMode::Repeat,
                "MIRROR" => address = AddressMode::MirrorRepeat,
                _ => return Err(args.error(&token, format!("unknown sampler option '{}'", token.text))),
            }
        }
        self.info.samplers.push(SamplerInfo { name, filter, address });
        Ok(())
    }

    fn parse_parameter(&mut self, args: &mut Args<'_, '_>) -> Result<(), CompileError> {
        let name_token = args.expect_identifier("parameter name")?;
        let name = self.declare_name(args, &name_token)?;
        let type_token = args.expect("a parameter type")?;
        let ty = ParameterType::parse(type_token.text).ok_or_else(|| args.error(&type_token, format!("unknown parameter type '{}', expected float or int", type_token.text)))?;

        let default = match args.next().cloned() {
            Some(token) => parse_value(&token, ty).map_err(|message| args.error(&token, message))?,
            None => ty.zero(),
        };
        let mut tuning = [None; 3];
        for slot in tuning.iter_mut() {
            let Some(token) = args.next().cloned() else { break };
            let value = parse_scalar(token.text, ty.scalar).map_err(|message| args.error(&token, message))?;
            *slot = Some(value as f32);
        }
        args.finish()?;

        let [min, max, step] = tuning;
        if let (Some(min), Some(max)) = (min, max) {
            if min > max {
                return Err(args.error(&name_token, format!("minimum {min} exceeds maximum {max}")));
            }
        }
        self.info.parameters.push(ParameterInfo {
            name,
            ty,
            default,
            min,
            max,
            step,
        });
        Ok(())
    }

    fn parse_pass_attribute(&mut self, args: &mut Args<'_, '_>, keyword_column: usize) -> Result<(), CompileError> {
        let keyword = args.keyword;
        let line = args.line;
        let pass = match (self.section, self.info.passes.last_mut()) {
            (Section::Pass, Some(pass)) => pass,
            _ => return Err(CompileError::syntax(line, keyword_column, format!("{keyword} is only allowed inside a pass"))),
        };

        match keyword {
            "IN" | "OUT" => {
                let list = if keyword == "IN" { &mut pass.inputs } else { &mut pass.outputs };
                let first = args.expect_identifier("resource name")?;
                list.push(first.text.to_string());
                while let Some(token) = args.next().cloned() {
                    if !is_identifier(token.text) {
                        return Err(args.error(&token, format!("'{}' is not a valid resource name", token.text)));
                    }
                    list.push(token.text.to_string());
                }
            }
            _ => {
                let target = if keyword == "BLOCK_SIZE" { &mut pass.block_size } else { &mut pass.num_threads };
                if target.is_some() {
                    return Err(CompileError::syntax(line, keyword_column, format!("{keyword} given twice for pass {}", pass.index)));
                }
                let mut values = Vec::new();
                while let Some(token) = args.next().cloned() {
                    let value: u32 = token.text.parse().map_err(|_| args.error(&token, format!("'{}' is not a positive integer", token.text)))?;
                    if value == 0 {
                        return Err(args.error(&token, "dimensions must be at least 1"));
                    }
                    values.push(value);
                }
                *target = Some(Dims::from_slice(&values).ok_or_else(|| CompileError::syntax(line, keyword_column, format!("{keyword} takes 1 to 3 values, found {}", values.len())))?);
            }
        }
        Ok(())
    }
}

/// Parses a scalar literal for the given kind
fn parse_scalar(text: &str, scalar: ScalarType) -> Result<f64, String> {
    match scalar {
        ScalarType::Float => parse_float(text).map(f64::from),
        ScalarType::Int => text.parse::<i32>().map(f64::from).map_err(|_| format!("'{text}' is not an integer")),
    }
}

/// Parses a finite `f32`; `NaN` and infinities are rejected
fn parse_float(text: &str) -> Result<f32, String> {
    match text.parse::<f32>() {
        Ok(value) if value.is_finite() => Ok(value),
        Ok(_) => Err(format!("'{text}' is not a finite number")),
        Err(_) => Err(format!("'{text}' is not a number")),
    }
}

/// Parses a default value: a scalar or a parenthesised tuple matching the type
fn parse_value(token: &Token<'_>, ty: ParameterType) -> Result<ParameterValue, String> {
    let parts: Vec<&str> = match token.text.strip_prefix('(').and_then(|s| s.strip_suffix(')')) {
        Some(inner) => inner.split(',').map(str::trim).collect(),
        None => vec![token.text],
    };
    if parts.len() != ty.components as usize {
        return Err(format!("default for {} needs {} component(s), found {}", ty.directive_name(), ty.components, parts.len()));
    }
    match ty.scalar {
        ScalarType::Float => {
            let values = parts
                .iter()
                .map(|p| parse_float(p))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(if ty.components == 1 { ParameterValue::Float(values[0]) } else { ParameterValue::FloatVec(values) })
        }
        ScalarType::Int => {
            let values = parts
                .iter()
                .map(|p| p.parse::<i32>().map_err(|_| format!("'{p}' is not an integer")))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(if ty.components == 1 { ParameterValue::Int(values[0]) } else { ParameterValue::IntVec(values) })
        }
    }
}

/// Checks the cross-references that can only be verified once the whole effect is read
fn validate(info: &WgfxShaderInfo) -> Result<(), CompileError> {
    for pass in &info.passes {
        for input in &pass.inputs {
            if input == OUTPUT {
                return Err(CompileError::resolution(Some(pass.index), input, "OUTPUT is write-only and cannot be an input"));
            }
            if !info.is_texture(input) && info.sampler(input).is_none() {
                return Err(CompileError::resolution(Some(pass.index), input, "input is not a declared texture or sampler"));
            }
        }
        for output in &pass.outputs {
            if output == INPUT {
                return Err(CompileError::resolution(Some(pass.index), output, "INPUT is read-only and cannot be an output"));
            }
            if !info.is_texture(output) {
                return Err(CompileError::resolution(Some(pass.index), output, "output is not a declared texture"));
            }
        }
    }
    Ok(())
}

/// Parses effect source text into its IR
///
/// # Errors
/// Returns [`CompileError::Syntax`] for grammar violations (with line and column)
/// and [`CompileError::Resolution`] for pass references to undeclared resources.
pub fn parse_effect(source: &str) -> Result<WgfxShaderInfo, CompileError> {
    EffectParser::new().parse(source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CompileErrorKind;

    const SHARPEN: &str = "\
//! TEXTURE Temp INPUT_WIDTH INPUT_HEIGHT
//! PARAMETER Sharpness float 0.5 0.0 1.0 0.01
//! COMMON
fn luma(c: vec3f) -> f32 { return dot(c, vec3f(0.299, 0.587, 0.114)); }

//! PASS 0
//! IN INPUT
//! OUT OUTPUT
fn pass0(pos: vec2f) -> vec4f {
    return textureSampleLevel(INPUT, wgfx_sampler, pos, 0.0) * Sharpness;
}
";

    fn expect_syntax(source: &str) -> (usize, usize, String) {
        match parse_effect(source) {
            Err(CompileError::Syntax { line, column, message }) => (line, column, message),
            other => panic!("expected syntax error, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_basic_effect() {
        let info = parse_effect(SHARPEN).unwrap();

        assert_eq!(info.textures.len(), 1);
        assert_eq!(info.textures[0].name, "Temp");
        assert_eq!(info.textures[0].width.source(), "INPUT_WIDTH");
        assert_eq!(info.textures[0].format, None);

        assert_eq!(info.parameters.len(), 1);
        let parameter = &info.parameters[0];
        assert_eq!(parameter.ty, ParameterType::FLOAT);
        assert_eq!(parameter.default, ParameterValue::Float(0.5));
        assert_eq!((parameter.min, parameter.max, parameter.step), (Some(0.0), Some(1.0), Some(0.01)));

        assert_eq!(info.passes.len(), 1);
        let pass = &info.passes[0];
        assert_eq!(pass.inputs, vec!["INPUT"]);
        assert_eq!(pass.outputs, vec!["OUTPUT"]);
        assert!(pass.code.starts_with("fn pass0"));
        assert!(!pass.code.contains("//!"));
        assert!(info.common_code.contains("fn luma"));
    }

    #[test]
    fn test_pass_gap_is_syntax_error() {
        let (line, column, message) = expect_syntax("//! PASS 0\n//! OUT OUTPUT\n//! PASS 2\n//! OUT OUTPUT\n");
        assert_eq!(line, 3);
        assert_eq!(column, 10);
        assert!(message.contains("expected 1, found 2"), "{message}");
    }

    #[test]
    fn test_duplicate_pass_is_syntax_error() {
        let (line, _, _) = expect_syntax("//! PASS 0\n//! PASS 0\n");
        assert_eq!(line, 2);
    }

    #[test]
    fn test_parenthesised_size_expressions() {
        let info = parse_effect("//! TEXTURE Half (INPUT_WIDTH / 2) (INPUT_HEIGHT / 2) R16G16B16A16_FLOAT\n//! PASS 0\n//! OUT Half\n").unwrap();
        let texture = &info.textures[0];
        assert_eq!(texture.width.source(), "(INPUT_WIDTH / 2)");
        assert_eq!(texture.height.source(), "(INPUT_HEIGHT / 2)");
        assert_eq!(texture.format, Some(TextureFormat::Rgba16Float));
    }

    #[test]
    fn test_vector_parameter() {
        let info = parse_effect("//! PARAMETER Tint float3 (1.0, 0.5, 0.25) 0 1\n//! PASS 0\n//! OUT OUTPUT\n").unwrap();
        let parameter = &info.parameters[0];
        assert_eq!(parameter.ty.components, 3);
        assert_eq!(parameter.default, ParameterValue::FloatVec(vec![1.0, 0.5, 0.25]));
        assert_eq!(parameter.step, None);

        let (_, _, message) = expect_syntax("//! PARAMETER Tint float3 (1.0, 0.5)\n//! PASS 0\n");
        assert!(message.contains("needs 3 component(s)"), "{message}");
    }

    #[test]
    fn test_int_parameter_rejects_float_default() {
        let (line, column, _) = expect_syntax("//! PARAMETER Radius int 1.5\n//! PASS 0\n");
        assert_eq!((line, column), (1, 26));
    }

    #[test]
    fn test_non_finite_parameter_values_are_rejected() {
        let (line, column, message) = expect_syntax("//! PARAMETER Gain float 0.5 NaN 1\n//! PASS 0\n");
        assert_eq!((line, column), (1, 30));
        assert!(message.contains("finite"), "{message}");

        let (_, column, _) = expect_syntax("//! PARAMETER Gain float inf\n//! PASS 0\n");
        assert_eq!(column, 26);
        let (_, column, _) = expect_syntax("//! PARAMETER Tint float2 (1, -infinity)\n//! PASS 0\n");
        assert_eq!(column, 27);
        let (_, column, _) = expect_syntax("//! PARAMETER Gain float 0 0 1e39\n//! PASS 0\n");
        assert_eq!(column, 30);
    }

    #[test]
    fn test_reserved_and_duplicate_names() {
        let (_, _, message) = expect_syntax("//! TEXTURE INPUT 1 1\n//! PASS 0\n");
        assert!(message.contains("reserved"), "{message}");

        let (line, _, message) = expect_syntax("//! TEXTURE A 1 1\n//! SAMPLER A LINEAR\n//! PASS 0\n");
        assert_eq!(line, 2);
        assert!(message.contains("already declared"), "{message}");
    }

    #[test]
    fn test_unknown_directive_and_misplaced_attribute() {
        let (_, column, message) = expect_syntax("//! BOGUS 1\n");
        assert_eq!(column, 5);
        assert!(message.contains("unknown directive"));

        let (_, _, message) = expect_syntax("//! OUT OUTPUT\n//! PASS 0\n");
        assert!(message.contains("only allowed inside a pass"));
    }

    #[test]
    fn test_unterminated_group_and_comment() {
        let (line, column, message) = expect_syntax("//! TEXTURE T (INPUT_WIDTH / 2 INPUT_HEIGHT\n//! PASS 0\n");
        assert_eq!((line, column), (1, 15));
        assert!(message.contains("unterminated"));

        let (line, column, message) = expect_syntax("//! PASS 0\n//! OUT OUTPUT\n/* never closed\n//! PASS 1\n");
        assert_eq!((line, column), (3, 1));
        assert!(message.contains("unterminated block comment"));
    }

    #[test]
    fn test_directives_inside_block_comments_are_code() {
        let info = parse_effect("//! PASS 0\n//! OUT OUTPUT\n/*\n//! PASS 1\n*/\n").unwrap();
        assert_eq!(info.passes.len(), 1);
        assert!(info.passes[0].code.contains("//! PASS 1"));
    }

    #[test]
    fn test_block_and_thread_sizes() {
        let info = parse_effect("//! PASS 0\n//! OUT OUTPUT\n//! BLOCK_SIZE 16\n//! NUM_THREADS 8, 8, 1\n").unwrap();
        assert_eq!(info.passes[0].block_size, Some(Dims::D1(16)));
        assert_eq!(info.passes[0].num_threads, Some(Dims::D3(8, 8, 1)));

        let (_, _, message) = expect_syntax("//! PASS 0\n//! BLOCK_SIZE 0 8\n");
        assert!(message.contains("at least 1"));
        let (_, _, message) = expect_syntax("//! PASS 0\n//! BLOCK_SIZE 8\n//! BLOCK_SIZE 8\n");
        assert!(message.contains("given twice"));
    }

    #[test]
    fn test_pass_references_are_validated() {
        let err = parse_effect("//! PASS 0\n//! IN Missing\n//! OUT OUTPUT\n").unwrap_err();
        assert_eq!(err.kind(), CompileErrorKind::Resolution);
        assert!(err.to_string().contains("Missing"));

        let err = parse_effect("//! PASS 0\n//! OUT INPUT\n").unwrap_err();
        assert_eq!(err.kind(), CompileErrorKind::Resolution);

        // textures may be declared after the pass that uses them
        assert!(parse_effect("//! PASS 0\n//! OUT Late\n//! TEXTURE Late 4 4\n").is_ok());
    }

    #[test]
    fn test_empty_effect_is_rejected() {
        let (_, _, message) = expect_syntax("fn helper() {}\n");
        assert!(message.contains("no passes"));
    }

    #[test]
    fn test_metadata_round_trip() {
        let source = "\
//! TEXTURE Half (INPUT_WIDTH / 2) INPUT_HEIGHT/2 rgba32float
//! SAMPLER sam POINT WRAP
//! PARAMETER Strength float 1.5 0 4
//! PARAMETER Offset int2 (1, -1)
//! PARAMETER Gain float 1 0 2 0.1
fn helper() -> f32 { return 1.0; }
//! PASS 0
//! IN INPUT
//! OUT Half
//! BLOCK_SIZE 16, 8
fn pass0(pos: vec2f) -> vec4f { return vec4f(helper()); }
//! PASS 1
//! IN Half, sam
//! OUT OUTPUT
//! NUM_THREADS 8, 8
fn pass1(pos: vec2f) -> vec4f { return textureSampleLevel(Half, sam, pos, 0.0); }
";
        let first = parse_effect(source).unwrap();
        let second = parse_effect(&first.to_source()).unwrap();
        assert_eq!(first.textures, second.textures);
        assert_eq!(first.samplers, second.samplers);
        assert_eq!(first.parameters, second.parameters);
        assert_eq!(first.passes, second.passes);
        assert_eq!(first, second);
    }
}
