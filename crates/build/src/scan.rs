//! Lightweight WGSL source scanning
//!
//! These helpers understand just enough of WGSL to walk identifiers outside of
//! comments and to split call argument lists. They are shared by the macro
//! expander, the overload resolver and the code generator.

/// A piece of source text classified by the scanner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    /// An identifier, with the byte offset where it starts
    Ident(usize, &'a str),
    /// A comment, copied verbatim
    Comment(&'a str),
    /// Anything else
    Other(&'a str),
}

/// Returns true for characters that may continue an identifier
pub fn is_ident_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_'
}

/// Splits `code` into identifiers, comments and everything else
///
/// Numeric literals such as `1e5` or `0x1f` are reported as `Other` so their
/// suffixes are never mistaken for identifiers.
pub fn segments<'a>(code: &'a str) -> Vec<Segment<'a>> {
    let bytes = code.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;
    let mut other_start = 0;

    let flush = |out: &mut Vec<Segment<'a>>, from: usize, to: usize| {
        if from < to {
            out.push(Segment::Other(&code[from..to]));
        }
    };

    while i < bytes.len() {
        let c = bytes[i];
        if c == b'/' && bytes.get(i + 1) == Some(&b'/') {
            flush(&mut out, other_start, i);
            let end = code[i..].find('\n').map_or(bytes.len(), |n| i + n);
            out.push(Segment::Comment(&code[i..end]));
            i = end;
            other_start = i;
        } else if c == b'/' && bytes.get(i + 1) == Some(&b'*') {
            flush(&mut out, other_start, i);
            let end = block_comment_end(code, i).unwrap_or(bytes.len());
            out.push(Segment::Comment(&code[i..end]));
            i = end;
            other_start = i;
        } else if c.is_ascii_digit() {
            // numeric literal, including hex digits and suffixes
            i += 1;
            while i < bytes.len() && (is_ident_char(bytes[i]) || bytes[i] == b'.') {
                i += 1;
            }
        } else if c.is_ascii_alphabetic() || c == b'_' {
            flush(&mut out, other_start, i);
            let start = i;
            while i < bytes.len() && is_ident_char(bytes[i]) {
                i += 1;
            }
            out.push(Segment::Ident(start, &code[start..i]));
            other_start = i;
        } else {
            i += 1;
        }
    }
    flush(&mut out, other_start, bytes.len());
    out
}

/// Finds the byte offset just past the `*/` closing a block comment opened at `start`
///
/// WGSL block comments nest. Returns `None` if the comment is never closed.
pub fn block_comment_end(code: &str, start: usize) -> Option<usize> {
    let bytes = code.as_bytes();
    let mut depth = 0usize;
    let mut i = start;
    while i + 1 < bytes.len() {
        if bytes[i] == b'/' && bytes[i + 1] == b'*' {
            depth += 1;
            i += 2;
        } else if bytes[i] == b'*' && bytes[i + 1] == b'/' {
            depth -= 1;
            i += 2;
            if depth == 0 {
                return Some(i);
            }
        } else {
            i += 1;
        }
    }
    None
}

/// Returns the byte offset of the first non-whitespace character at or after `from`
pub fn skip_whitespace(code: &str, from: usize) -> usize {
    code[from..].find(|c: char| !c.is_whitespace()).map_or(code.len(), |n| from + n)
}

/// Returns true if the identifier starting at `start` is a member access (`a.b`)
pub fn is_member_access(code: &str, start: usize) -> bool {
    code[..start].trim_end().ends_with('.') && !code[..start].trim_end().ends_with("..")
}

/// Parses a parenthesised argument list whose `(` is at byte offset `open`
///
/// Returns the trimmed top-level arguments and the offset just past the closing
/// parenthesis, or `None` if the parentheses are unbalanced. An empty list yields
/// no arguments.
pub fn call_arguments(code: &str, open: usize) -> Option<(Vec<&str>, usize)> {
    let bytes = code.as_bytes();
    if bytes.get(open) != Some(&b'(') {
        return None;
    }
    let mut depth = 0i32;
    // template lists such as `array<f32, 4>`; `<` only opens one right after an identifier
    let mut angle = 0u32;
    let mut args = Vec::new();
    let mut arg_start = open + 1;
    let mut i = open;
    while i < bytes.len() {
        match bytes[i] {
            b'(' | b'[' => depth += 1,
            b'<' if i > 0 && is_ident_char(bytes[i - 1]) => angle += 1,
            b'>' if angle > 0 => angle -= 1,
            b')' | b']' => {
                depth -= 1;
                if depth == 0 {
                    let last = code[arg_start..i].trim();
                    if !last.is_empty() || !args.is_empty() {
                        args.push(last);
                    }
                    return Some((args, i + 1));
                }
            }
            b',' if depth == 1 && angle == 0 => {
                args.push(code[arg_start..i].trim());
                arg_start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Splits `s` at commas that are not nested in `()`, `[]` or `<>`
pub fn split_top_level(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '(' | '[' | '<' => depth += 1,
            ')' | ']' | '>' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(s[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    let last = s[start..].trim();
    if !last.is_empty() {
        parts.push(last);
    }
    parts
}

/// Returns a copy of `code` with every comment replaced by spaces
///
/// Byte offsets are preserved, so positions found in the masked text apply to the
/// original. Newlines inside block comments are kept.
pub fn mask_comments(code: &str) -> String {
    let mut out = String::with_capacity(code.len());
    for segment in segments(code) {
        match segment {
            Segment::Comment(text) => {
                for c in text.chars() {
                    if c == '\n' {
                        out.push('\n');
                    } else {
                        out.extend(std::iter::repeat_n(' ', c.len_utf8()));
                    }
                }
            }
            Segment::Ident(_, text) | Segment::Other(text) => out.push_str(text),
        }
    }
    out
}

/// Finds the `}` matching the `{` at byte offset `open`
pub fn matching_brace(code: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in code.bytes().enumerate().skip(open) {
        match c {
            b'{' => depth += 1,
            b'}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Rebuilds `code`, letting `rewrite` replace identifiers outside comments
///
/// `rewrite` receives each identifier and its byte offset. Returning
/// `Some((text, end))` emits `text` in place of everything from the identifier up
/// to byte offset `end`; returning `None` keeps the identifier.
pub fn rewrite_idents<F>(code: &str, mut rewrite: F) -> String
where
    F: FnMut(&str, usize) -> Option<(String, usize)>,
{
    let mut out = String::with_capacity(code.len());
    let mut offset = 0;
    let mut resume_at = 0;
    for segment in segments(code) {
        let text = match segment {
            Segment::Ident(_, text) | Segment::Comment(text) | Segment::Other(text) => text,
        };
        let start = offset;
        let end = start + text.len();
        offset = end;
        if end <= resume_at {
            continue;
        }
        if start < resume_at {
            out.push_str(&code[resume_at..end]);
            continue;
        }
        match segment {
            Segment::Ident(_, name) => match rewrite(name, start) {
                Some((replacement, replaced_end)) => {
                    out.push_str(&replacement);
                    if replaced_end > end {
                        resume_at = replaced_end;
                    } else {
                        resume_at = end;
                    }
                }
                None => out.push_str(name),
            },
            _ => out.push_str(text),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segments_skip_comments_and_literals() {
        let code = "let x = 1e5f; // y\n/* z /* nested */ */ w";
        let idents: Vec<_> = segments(code)
            .into_iter()
            .filter_map(|s| match s {
                Segment::Ident(_, name) => Some(name),
                _ => None,
            })
            .collect();
        assert_eq!(idents, vec!["let", "x", "w"]);
    }

    #[test]
    fn test_segments_reassemble_source() {
        let code = "fn a(b: f32) -> f32 { return b * 2.0; } // done";
        let rebuilt: String = segments(code)
            .into_iter()
            .map(|s| match s {
                Segment::Ident(_, t) | Segment::Comment(t) | Segment::Other(t) => t,
            })
            .collect();
        assert_eq!(rebuilt, code);
    }

    #[test]
    fn test_call_arguments_nested() {
        let code = "mix(a, f(b, c), t[1, 2]) + 1";
        let (args, end) = call_arguments(code, 3).unwrap();
        assert_eq!(args, vec!["a", "f(b, c)", "t[1, 2]"]);
        assert_eq!(&code[end..], " + 1");

        let (args, _) = call_arguments("f( )", 1).unwrap();
        assert!(args.is_empty());
        assert!(call_arguments("f(a, b", 1).is_none());
    }

    #[test]
    fn test_call_arguments_keep_template_lists() {
        let (args, _) = call_arguments("sum(array<f32, 4>(1.0, 2.0, 3.0, 4.0), n)", 3).unwrap();
        assert_eq!(args, vec!["array<f32, 4>(1.0, 2.0, 3.0, 4.0)", "n"]);

        let (args, _) = call_arguments("f(vec2<f32>(a, b), c)", 1).unwrap();
        assert_eq!(args.len(), 2);

        // comparisons are not template lists
        let (args, _) = call_arguments("select(a, b, x < y)", 6).unwrap();
        assert_eq!(args, vec!["a", "b", "x < y"]);
        let (args, _) = call_arguments("g(a > b, c)", 1).unwrap();
        assert_eq!(args, vec!["a > b", "c"]);
    }

    #[test]
    fn test_split_top_level_respects_generics() {
        assert_eq!(split_top_level("a: array<f32, 4>, b: vec2f"), vec!["a: array<f32, 4>", "b: vec2f"]);
        assert!(split_top_level("  ").is_empty());
    }

    #[test]
    fn test_mask_comments_keeps_offsets() {
        let code = "a /* b\n c */ d // e";
        let masked = mask_comments(code);
        assert_eq!(masked.len(), code.len());
        assert_eq!(masked, "a     \n      d     ");
    }

    #[test]
    fn test_matching_brace() {
        let code = "fn f() { if x { y(); } } z";
        assert_eq!(matching_brace(code, 7), Some(23));
        assert_eq!(matching_brace("{ {", 0), None);
    }

    #[test]
    fn test_rewrite_idents_can_consume_calls() {
        let code = "a + f(b, c) * b // b";
        let out = rewrite_idents(code, |name, start| match name {
            "f" => Some(("g()".to_string(), call_arguments(code, start + 1)?.1)),
            "b" => Some(("B".to_string(), start + 1)),
            _ => None,
        });
        assert_eq!(out, "a + g() * B // b");
    }

    #[test]
    fn test_member_access() {
        let code = "foo.bar + bar";
        assert!(is_member_access(code, 4));
        assert!(!is_member_access(code, 10));
    }
}
