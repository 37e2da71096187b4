//! Texture size expression evaluation
//!
//! Size expressions are small arithmetic formulas over the input and output
//! dimensions and the sizes of previously declared textures:
//!
//! ```text
//! expr    := term (("+" | "-") term)*
//! term    := unary (("*" | "/" | "%") unary)*
//! unary   := "-" unary | primary
//! primary := NUMBER | IDENT | IDENT "(" expr ("," expr)* ")" | "(" expr ")"
//! ```
//!
//! Evaluation happens in `f64`; the final value is floored to a whole pixel count.

use crate::error::CompileError;
use crate::ir::{INPUT, OUTPUT, TextureInfo};
use std::collections::HashMap;

/// Axis a size expression is evaluated for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Width,
    Height,
}

/// Known dimensions available to size expressions
#[derive(Debug, Clone, Default)]
pub struct SizeContext {
    input: (u32, u32),
    output: (u32, u32),
    textures: HashMap<String, (u32, u32)>,
}

impl SizeContext {
    /// Creates a context for the given input and output dimensions
    pub fn new(input: (u32, u32), output: (u32, u32)) -> Self {
        Self {
            input,
            output,
            textures: HashMap::new(),
        }
    }

    /// Records the resolved size of a texture
    pub fn insert(&mut self, name: &str, size: (u32, u32)) {
        self.textures.insert(name.to_string(), size);
    }

    /// Returns the resolved size of a texture, sentinels included
    pub fn size_of(&self, name: &str) -> Option<(u32, u32)> {
        match name {
            INPUT => Some(self.input),
            OUTPUT => Some(self.output),
            _ => self.textures.get(name).copied(),
        }
    }

    fn lookup(&self, identifier: &str, axis: Axis) -> Option<f64> {
        let pick = |(w, h): (u32, u32), axis: Axis| match axis {
            Axis::Width => w as f64,
            Axis::Height => h as f64,
        };
        if let Some(base) = identifier.strip_suffix("_WIDTH") {
            return self.size_of(base).map(|s| pick(s, Axis::Width));
        }
        if let Some(base) = identifier.strip_suffix("_HEIGHT") {
            return self.size_of(base).map(|s| pick(s, Axis::Height));
        }
        self.size_of(identifier).map(|s| pick(s, axis))
    }

    /// Evaluates one expression to a pixel count
    ///
    /// # Arguments
    /// * `expression` - Expression text
    /// * `axis` - Axis used when a bare texture name appears
    ///
    /// # Returns
    /// The floored value, which must be at least 1
    pub fn evaluate(&self, expression: &str, axis: Axis) -> Result<u32, CompileError> {
        let mut parser = ExprParser {
            source: expression,
            position: 0,
            context: self,
            axis,
        };
        let value = parser.expr()?;
        parser.skip_whitespace();
        if parser.position < expression.len() {
            return Err(parser.error(format!("unexpected '{}'", &expression[parser.position..])));
        }
        if !value.is_finite() {
            return Err(parser.error("expression does not evaluate to a finite value"));
        }
        let value = value.floor();
        if value < 1.0 {
            return Err(parser.error(format!("evaluates to {value}, textures need at least one pixel")));
        }
        if value > u32::MAX as f64 {
            return Err(parser.error(format!("evaluates to {value}, which is too large")));
        }
        Ok(value as u32)
    }

    /// Resolves every texture size in declaration order
    ///
    /// A texture may refer to any texture declared before it. Returns the sizes in
    /// the same order as `textures`.
    pub fn evaluate_all(&mut self, textures: &[TextureInfo]) -> Result<Vec<(u32, u32)>, CompileError> {
        let mut sizes = Vec::with_capacity(textures.len());
        for texture in textures {
            let width = self.evaluate(texture.width.source(), Axis::Width)?;
            let height = self.evaluate(texture.height.source(), Axis::Height)?;
            self.insert(&texture.name, (width, height));
            sizes.push((width, height));
        }
        Ok(sizes)
    }
}

struct ExprParser<'a> {
    source: &'a str,
    position: usize,
    context: &'a SizeContext,
    axis: Axis,
}

impl ExprParser<'_> {
    fn error(&self, message: impl Into<String>) -> CompileError {
        CompileError::resolution(None, self.source, message)
    }

    fn skip_whitespace(&mut self) {
        let rest = &self.source[self.position..];
        self.position += rest.len() - rest.trim_start().len();
    }

    fn peek(&mut self) -> Option<u8> {
        self.skip_whitespace();
        self.source.as_bytes().get(self.position).copied()
    }

    fn eat(&mut self, c: u8) -> bool {
        if self.peek() == Some(c) {
            self.position += 1;
            true
        } else {
            false
        }
    }

    fn expr(&mut self) -> Result<f64, CompileError> {
        let mut value = self.term()?;
        loop {
            if self.eat(b'+') {
                value += self.term()?;
            } else if self.eat(b'-') {
                value -= self.term()?;
            } else {
                return Ok(value);
            }
        }
    }

    fn term(&mut self) -> Result<f64, CompileError> {
        let mut value = self.unary()?;
        loop {
            if self.eat(b'*') {
                value *= self.unary()?;
            } else if self.eat(b'/') {
                let divisor = self.unary()?;
                if divisor == 0.0 {
                    return Err(self.error("division by zero"));
                }
                value /= divisor;
            } else if self.eat(b'%') {
                let divisor = self.unary()?;
                if divisor == 0.0 {
                    return Err(self.error("division by zero"));
                }
                value %= divisor;
            } else {
                return Ok(value);
            }
        }
    }

    fn unary(&mut self) -> Result<f64, CompileError> {
        if self.eat(b'-') {
            return Ok(-self.unary()?);
        }
        if self.eat(b'+') {
            return self.unary();
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<f64, CompileError> {
        match self.peek() {
            Some(b'(') => {
                self.position += 1;
                let value = self.expr()?;
                if !self.eat(b')') {
                    return Err(self.error("expected ')'"));
                }
                Ok(value)
            }
            Some(c) if c.is_ascii_digit() || c == b'.' => self.number(),
            Some(c) if c.is_ascii_alphabetic() || c == b'_' => self.identifier(),
            Some(c) => Err(self.error(format!("unexpected '{}'", c as char))),
            None => Err(self.error("unexpected end of expression")),
        }
    }

    fn number(&mut self) -> Result<f64, CompileError> {
        let start = self.position;
        let bytes = self.source.as_bytes();
        while self.position < bytes.len() && (bytes[self.position].is_ascii_digit() || bytes[self.position] == b'.') {
            self.position += 1;
        }
        let source = self.source;
        let text = &source[start..self.position];
        text.parse().map_err(|_| self.error(format!("'{text}' is not a number")))
    }

    fn identifier(&mut self) -> Result<f64, CompileError> {
        let start = self.position;
        let bytes = self.source.as_bytes();
        while self.position < bytes.len() && (bytes[self.position].is_ascii_alphanumeric() || bytes[self.position] == b'_') {
            self.position += 1;
        }
        let source = self.source;
        let name = &source[start..self.position];

        if self.eat(b'(') {
            let mut args = vec![self.expr()?];
            while self.eat(b',') {
                args.push(self.expr()?);
            }
            if !self.eat(b')') {
                return Err(self.error("expected ')'"));
            }
            return match (name, args.as_slice()) {
                ("min", [a, b]) => Ok(a.min(*b)),
                ("max", [a, b]) => Ok(a.max(*b)),
                ("floor", [a]) => Ok(a.floor()),
                ("ceil", [a]) => Ok(a.ceil()),
                ("round", [a]) => Ok(a.round()),
                _ => Err(CompileError::resolution(None, name, format!("unknown function with {} argument(s) in '{}'", args.len(), self.source))),
            };
        }

        self.context
            .lookup(name, self.axis)
            .ok_or_else(|| CompileError::resolution(None, name, format!("unknown size identifier in '{}'", self.source)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::SizeExpr;

    fn context() -> SizeContext {
        SizeContext::new((1920, 1080), (3840, 2160))
    }

    #[test]
    fn test_basic_arithmetic() {
        let ctx = context();
        assert_eq!(ctx.evaluate("INPUT_WIDTH", Axis::Width).unwrap(), 1920);
        assert_eq!(ctx.evaluate("INPUT_WIDTH / 2", Axis::Width).unwrap(), 960);
        assert_eq!(ctx.evaluate("(OUTPUT_HEIGHT + 1) / 2", Axis::Height).unwrap(), 1080);
        assert_eq!(ctx.evaluate("INPUT_HEIGHT * 2 - -4", Axis::Height).unwrap(), 2164);
        assert_eq!(ctx.evaluate("7 % 4", Axis::Width).unwrap(), 3);
    }

    #[test]
    fn test_fractional_results_are_floored() {
        let ctx = SizeContext::new((15, 15), (15, 15));
        assert_eq!(ctx.evaluate("INPUT_WIDTH / 2", Axis::Width).unwrap(), 7);
        assert_eq!(ctx.evaluate("ceil(INPUT_WIDTH / 2)", Axis::Width).unwrap(), 8);
        assert_eq!(ctx.evaluate("max(INPUT_WIDTH / 4, 1.5)", Axis::Width).unwrap(), 3);
    }

    #[test]
    fn test_bare_texture_name_uses_axis() {
        let mut ctx = context();
        ctx.insert("Half", (960, 540));
        assert_eq!(ctx.evaluate("Half", Axis::Width).unwrap(), 960);
        assert_eq!(ctx.evaluate("Half", Axis::Height).unwrap(), 540);
        assert_eq!(ctx.evaluate("Half_HEIGHT", Axis::Width).unwrap(), 540);
    }

    #[test]
    fn test_errors() {
        let ctx = context();
        let err = ctx.evaluate("Unknown_WIDTH", Axis::Width).unwrap_err();
        assert!(err.to_string().contains("Unknown_WIDTH"));

        assert!(ctx.evaluate("INPUT_WIDTH / 0", Axis::Width).is_err());
        assert!(ctx.evaluate("INPUT_WIDTH - 1920", Axis::Width).is_err());
        assert!(ctx.evaluate("INPUT_WIDTH +", Axis::Width).is_err());
        assert!(ctx.evaluate("(INPUT_WIDTH", Axis::Width).is_err());
        assert!(ctx.evaluate("INPUT_WIDTH 2", Axis::Width).is_err());
        assert!(ctx.evaluate("sqrt(4)", Axis::Width).is_err());
    }

    #[test]
    fn test_evaluate_all_in_declaration_order() {
        let textures = vec![
            TextureInfo {
                name: "Half".to_string(),
                width: SizeExpr::new("INPUT_WIDTH / 2"),
                height: SizeExpr::new("INPUT_HEIGHT / 2"),
                format: None,
            },
            TextureInfo {
                name: "Quarter".to_string(),
                width: SizeExpr::new("Half_WIDTH / 2"),
                height: SizeExpr::new("Half / 2"),
                format: None,
            },
        ];
        let mut ctx = context();
        assert_eq!(ctx.evaluate_all(&textures).unwrap(), vec![(960, 540), (480, 270)]);

        // forward references do not resolve
        let mut ctx = context();
        let reversed: Vec<_> = textures.into_iter().rev().collect();
        assert!(ctx.evaluate_all(&reversed).is_err());
    }
}
