//! `@css` and `@js`: asset tags resolved at compile time.

use std::sync::Arc;

use once_cell::sync::Lazy;
use tracing::warn;

use super::directive::{split_arguments, unquote, unsupported, DirectiveTable};
use super::Pass;
use crate::error::{CompileError, ResolutionError};
use crate::resolve::{is_url, PathResolver};
use crate::script::value::escape_str as escape_attribute;

static CSS: Lazy<DirectiveTable> =
    Lazy::new(|| DirectiveTable::new(&[("css", r"@css\s*\(")], &[]));

static JS: Lazy<DirectiveTable> =
    Lazy::new(|| DirectiveTable::new(&[("js", r"@js\s*\(")], &[]));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AssetKind {
    Css,
    Js,
}

impl AssetKind {
    fn directive(self) -> &'static str {
        match self {
            AssetKind::Css => "css",
            AssetKind::Js => "js",
        }
    }

    fn label(self) -> &'static str {
        match self {
            AssetKind::Css => "CSS",
            AssetKind::Js => "JavaScript",
        }
    }
}

/// Emits `<link>` or `<script>` tags with URLs from the [`PathResolver`].
///
/// When a file cannot be resolved, debug mode fails compilation while
/// production leaves an HTML comment in its place.
pub(crate) struct AssetPass {
    kind: AssetKind,
    resolver: Arc<dyn PathResolver>,
    debug: bool,
}

impl AssetPass {
    pub fn css(resolver: Arc<dyn PathResolver>, debug: bool) -> Self {
        Self {
            kind: AssetKind::Css,
            resolver,
            debug,
        }
    }

    pub fn js(resolver: Arc<dyn PathResolver>, debug: bool) -> Self {
        Self {
            kind: AssetKind::Js,
            resolver,
            debug,
        }
    }

    fn url(&self, file: &str) -> Result<String, ResolutionError> {
        if is_url(file) {
            return Ok(file.to_string());
        }
        let path = match self.kind {
            AssetKind::Css => self.resolver.resolve_css(file)?,
            AssetKind::Js => self.resolver.resolve_js(file)?,
        };
        self.resolver.resolve_asset(&path.to_string_lossy())
    }

    fn build(&self, expr: &str) -> Result<Option<String>, CompileError> {
        let params: Vec<&str> = split_arguments(expr, None)
            .into_iter()
            .map(unquote)
            .filter(|param| !param.is_empty())
            .collect();

        let Some(file) = params.first().copied() else {
            return Ok(Some(format!(
                "<!-- {} directive requires a file name. -->",
                self.kind.label()
            )));
        };

        let url = match self.url(file) {
            Ok(url) => url,
            Err(source) if self.debug => {
                return Err(CompileError::Asset {
                    kind: self.kind.directive(),
                    file: file.to_string(),
                    source,
                });
            }
            Err(err) => {
                warn!(file, error = %err, "failed to resolve {} file", self.kind.directive());
                return Ok(Some(format!(
                    "<!-- Failed to resolve {} file: {} -->",
                    self.kind.label(),
                    escape_attribute(file)
                )));
            }
        };

        let tag = match self.kind {
            AssetKind::Css => {
                let media = params.get(1).copied().unwrap_or("all");
                format!(
                    "<link rel=\"stylesheet\" type=\"text/css\" href=\"{}\" media=\"{}\">",
                    escape_attribute(&url),
                    escape_attribute(media)
                )
            }
            AssetKind::Js => {
                let load = match params.get(1).map(|p| p.to_ascii_lowercase()).as_deref() {
                    Some("defer") => " defer",
                    Some("async") => " async",
                    _ => "",
                };
                format!(
                    "<script type=\"text/javascript\" src=\"{}\"{load}></script>",
                    escape_attribute(&url)
                )
            }
        };
        Ok(Some(tag))
    }
}

impl Pass for AssetPass {
    fn name(&self) -> &'static str {
        self.kind.directive()
    }

    fn compile(&self, content: &str) -> Result<String, CompileError> {
        let table = match self.kind {
            AssetKind::Css => &*CSS,
            AssetKind::Js => &*JS,
        };
        table.compile(content, |name, expr| {
            if name == self.kind.directive() {
                self.build(expr)
            } else {
                unsupported(self.kind.directive(), name, self.debug)
            }
        })
    }
}
