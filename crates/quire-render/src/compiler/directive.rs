//! Shared machinery for directive families.
//!
//! Every family is described by a [`DirectiveTable`]: a list of
//! *parameterised* directives (`@if(...)`, `@section(...)`) whose start
//! pattern ends at the opening parenthesis, and a list of *parameterless*
//! directives (`@endif`, `@else`) with a fixed replacement.
//!
//! Parameterised arguments are extracted by counting parentheses, skipping
//! over quoted string literals, so `@if(strlen(")") > 0)` captures the whole
//! condition. A directive whose parenthesis never closes is left in place and
//! scanning resumes after it.

use regex::Regex;

use crate::error::CompileError;

/// A directive that takes a parenthesised argument.
pub(crate) struct Parameterized {
    pub name: &'static str,
    pub start: Regex,
}

/// Pattern table for one directive family.
pub(crate) struct DirectiveTable {
    parameterized: Vec<Parameterized>,
    parameterless: Vec<(Regex, &'static str)>,
}

impl DirectiveTable {
    /// Builds a table from `(name, start pattern)` and `(pattern, replacement)` pairs.
    ///
    /// Patterns are compile-time constants; an invalid one is a programming
    /// error and panics on first use.
    pub fn new(
        parameterized: &[(&'static str, &str)],
        parameterless: &[(&str, &'static str)],
    ) -> Self {
        Self {
            parameterized: parameterized
                .iter()
                .map(|&(name, pattern)| Parameterized {
                    name,
                    start: Regex::new(pattern).expect("directive pattern must be valid"),
                })
                .collect(),
            parameterless: parameterless
                .iter()
                .map(|&(pattern, replacement)| {
                    (
                        Regex::new(pattern).expect("directive pattern must be valid"),
                        replacement,
                    )
                })
                .collect(),
        }
    }

    /// Whether a parameterised directive of this table starts at `start`.
    ///
    /// Its parenthesis never closed, or it would have been replaced already,
    /// so the text stays as written.
    pub fn opens_parameterized(&self, content: &str, start: usize) -> bool {
        self.parameterized.iter().any(|directive| {
            directive
                .start
                .find_at(content, start)
                .is_some_and(|found| found.start() == start)
        })
    }

    /// Runs all parameterised directives, then all parameterless ones.
    ///
    /// `build` receives the directive name and the raw argument text and
    /// returns the replacement; `None` drops the directive.
    pub fn compile<F>(&self, content: &str, mut build: F) -> Result<String, CompileError>
    where
        F: FnMut(&str, &str) -> Result<Option<String>, CompileError>,
    {
        let mut content = content.to_string();
        for directive in &self.parameterized {
            content = replace_parameterized(&directive.start, content, |expr| {
                build(directive.name, expr)
            })?;
        }
        for (pattern, replacement) in &self.parameterless {
            if pattern.is_match(&content) {
                content = replace_matches(pattern, &content, replacement, |start, end| {
                    is_standalone(&content, start, end) && !self.opens_parameterized(&content, start)
                });
            }
        }
        Ok(content)
    }
}

/// Whether the match at `start..end` is a directive of its own.
///
/// Matches escaped as `@@name` and matches inside an e-mail address
/// (`ops@empty.io`) are text.
pub(crate) fn is_standalone(content: &str, start: usize, end: usize) -> bool {
    let before = content[..start].chars().next_back();
    if before == Some('@') {
        return false;
    }
    let in_address = before.is_some_and(|c| c.is_alphanumeric() || "._-+".contains(c))
        && content[end..]
            .strip_prefix(['.', '-'])
            .and_then(|domain| domain.chars().next())
            .is_some_and(char::is_alphanumeric);
    !in_address
}

/// Replaces the matches of `pattern` that `accept` allows with
/// `replacement`, verbatim.
pub(crate) fn replace_matches<F>(
    pattern: &Regex,
    content: &str,
    replacement: &str,
    accept: F,
) -> String
where
    F: Fn(usize, usize) -> bool,
{
    let mut out = String::with_capacity(content.len());
    let mut last = 0;
    for found in pattern.find_iter(content) {
        if !accept(found.start(), found.end()) {
            continue;
        }
        out.push_str(&content[last..found.start()]);
        out.push_str(replacement);
        last = found.end();
    }
    out.push_str(&content[last..]);
    out
}

/// Replaces every `pattern(...)` occurrence using balanced extraction.
pub(crate) fn replace_parameterized<F>(
    pattern: &Regex,
    mut content: String,
    mut build: F,
) -> Result<String, CompileError>
where
    F: FnMut(&str) -> Result<Option<String>, CompileError>,
{
    let mut offset = 0;
    while let Some((start, open)) = pattern
        .find_at(&content, offset)
        .map(|found| (found.start(), found.end() - 1))
    {
        let Some(close) = find_closing_paren(&content, open) else {
            offset = open + 1;
            continue;
        };
        let replacement = build(&content[open + 1..close])?.unwrap_or_default();
        content.replace_range(start..=close, &replacement);
        offset = start + replacement.len();
    }
    Ok(content)
}

/// Finds the `)` matching the `(` at byte index `open`.
///
/// Quoted strings (single or double, with backslash escapes) are skipped.
pub(crate) fn find_closing_paren(text: &str, open: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    if bytes.get(open) != Some(&b'(') {
        return None;
    }
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut i = open;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == b'\\' {
                    i += 1;
                } else if b == q {
                    quote = None;
                }
            }
            None => match b {
                b'\'' | b'"' => quote = Some(b),
                b'(' => depth += 1,
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                _ => {}
            },
        }
        i += 1;
    }
    None
}

/// Splits an argument list on commas that are not nested or quoted.
///
/// `limit` caps the number of parts; the remainder stays in the last one.
pub(crate) fn split_arguments(expr: &str, limit: Option<usize>) -> Vec<&str> {
    let bytes = expr.as_bytes();
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<u8> = None;
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == b'\\' {
                    i += 1;
                } else if b == q {
                    quote = None;
                }
            }
            None => match b {
                b'\'' | b'"' => quote = Some(b),
                b'(' | b'[' | b'{' => depth += 1,
                b')' | b']' | b'}' => depth -= 1,
                b',' if depth == 0 => {
                    if limit.is_some_and(|max| parts.len() + 1 >= max) {
                        break;
                    }
                    parts.push(expr[start..i].trim());
                    start = i + 1;
                }
                _ => {}
            },
        }
        i += 1;
    }
    parts.push(expr[start..].trim());
    parts
}

/// Strips surrounding whitespace and quotes from a literal argument.
pub(crate) fn unquote(arg: &str) -> &str {
    arg.trim().trim_matches(|c| c == '\'' || c == '"')
}

/// Renders `value` as a single-quoted script string literal.
pub(crate) fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        if c == '\'' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('\'');
    out
}

/// Handles a directive its family has no builder for.
///
/// Debug builds surface the mistake; production drops the directive.
pub(crate) fn unsupported(
    family: &'static str,
    directive: &str,
    debug: bool,
) -> Result<Option<String>, CompileError> {
    if debug {
        return Err(CompileError::UnsupportedDirective {
            family,
            directive: directive.to_string(),
        });
    }
    Ok(None)
}

/// Default colon-form statement for control directives: `<% name (expr): %>`.
pub(crate) fn control_statement(name: &str, expr: &str) -> String {
    format!("<% {name} ({expr}): %>")
}
