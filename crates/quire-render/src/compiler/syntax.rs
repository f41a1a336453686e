//! Comments, raw code blocks and echo tags.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use super::directive::{unsupported, DirectiveTable};
use super::Pass;
use crate::error::CompileError;

static COMMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\{\{--.*?--\}\}").expect("valid regex"));

static RAW_ECHO: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\{!!\s*(.+?)\s*!!\}").expect("valid regex"));

static ESCAPED_ECHO: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\{\{\s*(.+?)\s*\}\}").expect("valid regex"));

static RAW_CODE: Lazy<DirectiveTable> = Lazy::new(|| {
    DirectiveTable::new(
        &[("php", r"@php\s*\(")],
        &[(r"@php\b", "<%"), (r"@endphp\b", "%>")],
    )
});

/// Strips `{{-- ... --}}` comments, including multi-line ones.
pub(crate) struct CommentPass;

impl Pass for CommentPass {
    fn name(&self) -> &'static str {
        "comment"
    }

    fn compile(&self, content: &str) -> Result<String, CompileError> {
        Ok(COMMENT.replace_all(content, "").into_owned())
    }
}

/// `@php(stmt)` and `@php ... @endphp`.
pub(crate) struct RawCodePass {
    pub debug: bool,
}

impl Pass for RawCodePass {
    fn name(&self) -> &'static str {
        "php"
    }

    fn compile(&self, content: &str) -> Result<String, CompileError> {
        RAW_CODE.compile(content, |name, expr| match name {
            "php" => Ok(Some(format!("<% {}; %>", expr.trim()))),
            other => unsupported("php", other, self.debug),
        })
    }
}

/// `{!! expr !!}` raw output and `{{ expr }}` escaped output.
///
/// Raw tags are handled first so `{!!` is never read as an escaped echo.
pub(crate) struct EchoPass;

impl Pass for EchoPass {
    fn name(&self) -> &'static str {
        "echo"
    }

    fn compile(&self, content: &str) -> Result<String, CompileError> {
        let raw = RAW_ECHO.replace_all(content, |caps: &Captures<'_>| {
            format!("<%= {} %>", &caps[1])
        });
        let escaped = ESCAPED_ECHO.replace_all(&raw, |caps: &Captures<'_>| {
            format!("<%= e({}) %>", &caps[1])
        });
        Ok(escaped.into_owned())
    }
}
