//! Reverse-template engine for artifact filenames.
//!
//! A reverse template is a human-friendly pattern compiled into a regex that
//! *parses* filenames instead of generating them:
//!
//! ```text
//! {name}-{version}-{arch}-{triple}[-{variant}]?.tar.gz
//! ```
//!
//! Grammar:
//! - Literal characters match themselves (regex-escaped).
//! - `{field}` captures a named field using its registered pattern.
//! - `{field?}` makes the capture optional.
//! - `[...]?` makes a whole segment optional (one level deep; nesting is
//!   rejected).
//! - `{{` and `}}` produce literal braces.
//!
//! Every registered field carries a [`FieldSpec`]: a regex fragment and an
//! optional normalizer applied to the captured value. Fields registered
//! without a pattern fall back to a conservative default. Templates that
//! reference an unregistered field are rejected at compile time.
//!
//! Compilation enforces budgets (template and regex-source length) and probes
//! each fresh regex against pathological inputs under a wall-clock budget.
//! The `regex` crate matches in linear time, so the probe is a guard against
//! oversized automata rather than backtracking, but a template that fails it
//! is rejected the same way.
//!
//! # Example
//!
//! ```rust
//! use updraft::template::release_parser;
//!
//! # fn example() -> updraft::Result<()> {
//! let mut parser = release_parser()?;
//! parser.add_template("{name}-{version}-{os}-{arch}.tar.gz")?;
//! parser.seal();
//!
//! let outcome = parser.parse("mytool-1.2.3-linux-x86_64.tar.gz")?;
//! assert_eq!(outcome.fields["arch"], "amd64");
//! assert_eq!(outcome.fields["os"], "linux");
//! # Ok(())
//! # }
//! ```

pub mod fields;


use std::collections::BTreeMap;
use std::time::Instant;

use regex::Regex;
use tracing::{debug, warn};

use crate::constants::{
    MAX_PARSE_INPUT_LEN, MAX_REGEX_LEN, MAX_TEMPLATE_LEN, PARSE_TIMEOUT, REGEX_PROBE_LEN,
    REGEX_PROBE_TIMEOUT,
};
use crate::core::{Result, UpdraftError};

pub use fields::{arch_normalizer, os_normalizer, release_parser, FieldSpec, Normalizer};

/// A successful parse: the normalized captures, the template that matched,
/// and the raw input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOutcome {
    /// Captured field values after normalization, keyed by field name.
    /// Empty captures (unmatched optional fields) are omitted.
    pub fields: BTreeMap<String, String>,
    /// The template string that produced the match.
    pub template: String,
    /// The input that was parsed.
    pub input: String,
}

struct CompiledTemplate {
    template: String,
    re: Regex,
    fields: Vec<String>,
}

/// Compiles reverse templates and parses filenames against them in
/// registration order.
pub struct Parser {
    specs: BTreeMap<String, FieldSpec>,
    default_pattern: String,
    compiled: Vec<CompiledTemplate>,
    sealed: bool,
}

/// Fluent constructor for [`Parser`].
pub struct ParserBuilder {
    specs: BTreeMap<String, FieldSpec>,
    default_pattern: String,
}

impl Default for ParserBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ParserBuilder {
    /// Create a builder with the conservative default field pattern.
    pub fn new() -> Self {
        Self {
            specs: BTreeMap::new(),
            // Bounded token groups separated by . _ or -
            default_pattern: r"[^/_\s\.-]{1,100}(?:[._-][^/_\s\.-]{1,100}){0,10}".to_string(),
        }
    }

    /// Register a field specification.
    pub fn with_field(mut self, name: &str, spec: FieldSpec) -> Self {
        self.specs.insert(name.to_string(), spec);
        self
    }

    /// Override the pattern used by fields registered without one.
    pub fn with_default_pattern(mut self, pattern: &str) -> Self {
        self.default_pattern = pattern.to_string();
        self
    }

    /// Construct the parser, validating the default pattern compiles.
    pub fn build(self) -> Result<Parser> {
        if self.default_pattern.is_empty() {
            return Err(UpdraftError::config("default pattern cannot be empty"));
        }
        Regex::new(&self.default_pattern).map_err(|e| UpdraftError::TemplateSyntax {
            position: 0,
            message: format!("invalid default pattern: {e}"),
        })?;

        Ok(Parser {
            specs: self.specs,
            default_pattern: self.default_pattern,
            compiled: Vec::new(),
            sealed: false,
        })
    }
}

impl Parser {
    /// Compile and register a template. Templates are tried in registration
    /// order during [`parse`](Self::parse).
    pub fn add_template(&mut self, template: &str) -> Result<()> {
        if self.sealed {
            return Err(UpdraftError::config("parser is sealed, cannot add templates"));
        }
        if template.len() > MAX_TEMPLATE_LEN {
            return Err(UpdraftError::TemplateTooComplex {
                detail: format!("template too long: {} > {}", template.len(), MAX_TEMPLATE_LEN),
            });
        }
        if template.trim().is_empty() {
            return Err(UpdraftError::TemplateSyntax {
                position: 0,
                message: "empty template".to_string(),
            });
        }

        let (src, fields) = self.compile_template(template)?;

        if src.len() > MAX_REGEX_LEN {
            return Err(UpdraftError::TemplateTooComplex {
                detail: format!("generated regex too complex: {} > {}", src.len(), MAX_REGEX_LEN),
            });
        }

        let re = Regex::new(&format!("^{src}$")).map_err(|e| UpdraftError::TemplateSyntax {
            position: 0,
            message: format!("failed to compile regex: {e}"),
        })?;

        probe_regex(&re, template)?;

        debug!(template, fields = ?fields, "registered template");
        self.compiled.push(CompiledTemplate { template: template.to_string(), re, fields });
        Ok(())
    }

    /// Freeze the template set. Further [`add_template`](Self::add_template)
    /// calls fail.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    /// Whether [`seal`](Self::seal) has been called.
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Field names captured by each registered template, in order.
    pub fn templates(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.compiled.iter().map(|ct| (ct.template.as_str(), ct.fields.as_slice()))
    }

    /// Parse a filename against the registered templates, returning the first
    /// complete match with normalized captures.
    pub fn parse(&self, input: &str) -> Result<ParseOutcome> {
        self.validate_input(input)?;

        let start = Instant::now();
        for ct in &self.compiled {
            if start.elapsed() > PARSE_TIMEOUT {
                warn!(input, "parse budget exhausted");
                break;
            }
            let Some(caps) = ct.re.captures(input) else { continue };

            let mut out = BTreeMap::new();
            for name in ct.re.capture_names().flatten() {
                let Some(m) = caps.name(name) else { continue };
                if m.as_str().is_empty() {
                    continue;
                }
                let mut val = m.as_str().to_string();
                if let Some(spec) = self.specs.get(name) {
                    if let Some(normalize) = spec.normalize {
                        val = normalize(&val);
                    }
                }
                out.insert(name.to_string(), val);
            }
            return Ok(ParseOutcome {
                fields: out,
                template: ct.template.clone(),
                input: input.to_string(),
            });
        }

        Err(UpdraftError::NoMatch { input: input.to_string() })
    }

    /// Like [`parse`](Self::parse) but mapping every failure to `None`.
    pub fn try_parse(&self, input: &str) -> Option<ParseOutcome> {
        self.parse(input).ok()
    }

    fn validate_input(&self, input: &str) -> Result<()> {
        if input.len() > MAX_PARSE_INPUT_LEN {
            return Err(UpdraftError::InputRejected {
                reason: format!("input too long: {} > {}", input.len(), MAX_PARSE_INPUT_LEN),
            });
        }
        if input.trim().is_empty() {
            return Err(UpdraftError::InputRejected { reason: "empty input".to_string() });
        }
        if input.contains('\0') {
            return Err(UpdraftError::InputRejected {
                reason: "input contains null byte".to_string(),
            });
        }
        Ok(())
    }

    fn field_pattern(&self, name: &str, position: usize) -> Result<String> {
        let spec = self.specs.get(name).ok_or_else(|| UpdraftError::TemplateSyntax {
            position,
            message: format!("unknown field name: {name}"),
        })?;
        if spec.pattern.trim().is_empty() {
            Ok(self.default_pattern.clone())
        } else {
            Ok(spec.pattern.clone())
        }
    }

    /// Convert the template into a regex source plus the ordered capture list.
    fn compile_template(&self, tmpl: &str) -> Result<(String, Vec<String>)> {
        let bytes = tmpl.as_bytes();
        let mut out = String::new();
        let mut fields: Vec<String> = Vec::new();
        let mut i = 0;

        while i < bytes.len() {
            match bytes[i] {
                b'{' => {
                    if bytes.get(i + 1) == Some(&b'{') {
                        out.push_str(&regex::escape("{"));
                        i += 2;
                        continue;
                    }
                    let (name, optional, next) = read_placeholder(tmpl, i)?;
                    let pat = self.field_pattern(&name, i)?;
                    push_capture(&mut out, &name, &pat, optional);
                    push_unique(&mut fields, name);
                    i = next;
                }
                b'}' => {
                    if bytes.get(i + 1) == Some(&b'}') {
                        out.push_str(&regex::escape("}"));
                        i += 2;
                        continue;
                    }
                    return Err(UpdraftError::TemplateSyntax {
                        position: i,
                        message: "unmatched '}'".to_string(),
                    });
                }
                b'[' => {
                    let close = find_matching_bracket(bytes, i + 1).ok_or_else(|| {
                        UpdraftError::TemplateSyntax {
                            position: i,
                            message: "unclosed '['".to_string(),
                        }
                    })?;
                    let seg = &tmpl[i + 1..close];
                    let (seg_src, seg_fields) = self.compile_segment(seg, i)?;
                    for f in seg_fields {
                        push_unique(&mut fields, f);
                    }
                    let optional = bytes.get(close + 1) == Some(&b'?');
                    if optional {
                        out.push_str(&format!("(?:{seg_src})?"));
                        i = close + 2;
                    } else {
                        out.push_str(&format!("(?:{seg_src})"));
                        i = close + 1;
                    }
                }
                b']' => {
                    return Err(UpdraftError::TemplateSyntax {
                        position: i,
                        message: "unmatched ']'".to_string(),
                    });
                }
                _ => {
                    // Advance one full UTF-8 character, escaped.
                    let ch = tmpl[i..].chars().next().unwrap_or('\u{fffd}');
                    out.push_str(&regex::escape(&ch.to_string()));
                    i += ch.len_utf8();
                }
            }
        }

        Ok((out, fields))
    }

    /// Compile the content inside a `[...]` segment. Nested segments are not
    /// supported.
    fn compile_segment(&self, seg: &str, offset: usize) -> Result<(String, Vec<String>)> {
        let bytes = seg.as_bytes();
        let mut out = String::new();
        let mut fields: Vec<String> = Vec::new();
        let mut i = 0;

        while i < bytes.len() {
            match bytes[i] {
                b'{' => {
                    if bytes.get(i + 1) == Some(&b'{') {
                        out.push_str(&regex::escape("{"));
                        i += 2;
                        continue;
                    }
                    let (name, optional, next) = read_placeholder(seg, i).map_err(|e| match e {
                        UpdraftError::TemplateSyntax { position, message } => {
                            UpdraftError::TemplateSyntax {
                                position: offset + 1 + position,
                                message: format!("in segment: {message}"),
                            }
                        }
                        other => other,
                    })?;
                    let pat = self.field_pattern(&name, offset + 1 + i)?;
                    push_capture(&mut out, &name, &pat, optional);
                    push_unique(&mut fields, name);
                    i = next;
                }
                b'}' => {
                    if bytes.get(i + 1) == Some(&b'}') {
                        out.push_str(&regex::escape("}"));
                        i += 2;
                        continue;
                    }
                    return Err(UpdraftError::TemplateSyntax {
                        position: offset + 1 + i,
                        message: "unmatched '}' in segment".to_string(),
                    });
                }
                b'[' => {
                    return Err(UpdraftError::TemplateSyntax {
                        position: offset + 1 + i,
                        message: "nested optional segments not supported".to_string(),
                    });
                }
                _ => {
                    let ch = seg[i..].chars().next().unwrap_or('\u{fffd}');
                    out.push_str(&regex::escape(&ch.to_string()));
                    i += ch.len_utf8();
                }
            }
        }

        Ok((out, fields))
    }
}

/// Read a `{name}` or `{name?}` placeholder starting at `start` (which must
/// point at `{`). Returns the field name, optionality, and the index just
/// past the closing brace.
fn read_placeholder(tmpl: &str, start: usize) -> Result<(String, bool, usize)> {
    let rest = &tmpl[start + 1..];
    let close = rest.find('}');
    let next_open = rest.find('{');
    let close = match (close, next_open) {
        (Some(c), Some(o)) if c > o => {
            return Err(UpdraftError::TemplateSyntax {
                position: start,
                message: format!("unclosed '{{' at {start}"),
            });
        }
        (Some(c), _) => c,
        (None, _) => {
            return Err(UpdraftError::TemplateSyntax {
                position: start,
                message: format!("unclosed '{{' at {start}"),
            });
        }
    };

    let raw = &rest[..close];
    let (name, optional) = match raw.strip_suffix('?') {
        Some(stripped) => (stripped, true),
        None => (raw, false),
    };

    if name.is_empty() {
        return Err(UpdraftError::TemplateSyntax {
            position: start,
            message: "empty field name".to_string(),
        });
    }
    if !is_valid_field_name(name) {
        return Err(UpdraftError::TemplateSyntax {
            position: start,
            message: format!("invalid field name: {name}"),
        });
    }

    Ok((name.to_string(), optional, start + 1 + close + 1))
}

fn push_capture(out: &mut String, name: &str, pattern: &str, optional: bool) {
    if optional {
        out.push_str(&format!("(?P<{name}>{pattern})?"));
    } else {
        out.push_str(&format!("(?P<{name}>{pattern})"));
    }
}

fn push_unique(fields: &mut Vec<String>, name: String) {
    if !fields.contains(&name) {
        fields.push(name);
    }
}

/// A field name must look like an identifier: leading letter or underscore,
/// then alphanumerics or underscores.
fn is_valid_field_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn find_matching_bracket(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 1usize;
    for (i, b) in bytes.iter().enumerate().skip(start) {
        match b {
            b'[' => depth += 1,
            b']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Match the freshly compiled regex against repeated pathological inputs.
/// A template that cannot chew through them inside the probe budget is
/// rejected as too complex.
fn probe_regex(re: &Regex, template: &str) -> Result<()> {
    let probes = [
        "a".repeat(REGEX_PROBE_LEN),
        "a-".repeat(REGEX_PROBE_LEN / 2),
        "1.".repeat(REGEX_PROBE_LEN / 2),
    ];

    let start = Instant::now();
    for input in &probes {
        let _ = re.is_match(input);
        if start.elapsed() > REGEX_PROBE_TIMEOUT {
            return Err(UpdraftError::TemplateTooComplex {
                detail: format!("regex probe timed out for template {template:?}"),
            });
        }
    }
    Ok(())
}
