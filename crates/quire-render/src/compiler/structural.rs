//! Layout inheritance, sections, yields, partials and includes.

use once_cell::sync::Lazy;
use regex::Regex;

use super::directive::{quote, split_arguments, unquote, unsupported, DirectiveTable};
use super::Pass;
use crate::error::CompileError;

static EXTENDS_START: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"@extends\s*\(").expect("valid regex"));

static LAYOUT: Lazy<DirectiveTable> =
    Lazy::new(|| DirectiveTable::new(&[("extends", r"@extends\s*\(")], &[]));

static SECTION: Lazy<DirectiveTable> = Lazy::new(|| {
    DirectiveTable::new(
        &[("section", r"@section\s*\(")],
        &[(r"@endsection\b", "<% $view->end_section(); %>")],
    )
});

static PARTIAL: Lazy<DirectiveTable> =
    Lazy::new(|| DirectiveTable::new(&[("partial", r"@partial\s*\(")], &[]));

static INCLUDE: Lazy<DirectiveTable> =
    Lazy::new(|| DirectiveTable::new(&[("include", r"@include\s*\(")], &[]));

static YIELD: Lazy<DirectiveTable> =
    Lazy::new(|| DirectiveTable::new(&[("yield", r"@yield\s*\(")], &[]));

/// `@extends('layout')`. A template may extend at most one layout.
pub(crate) struct LayoutPass {
    pub debug: bool,
}

impl Pass for LayoutPass {
    fn name(&self) -> &'static str {
        "extends"
    }

    fn compile(&self, content: &str) -> Result<String, CompileError> {
        let count = EXTENDS_START.find_iter(content).count();
        if count > 1 {
            return Err(CompileError::MultipleExtends { count });
        }
        LAYOUT.compile(content, |name, expr| match name {
            "extends" => Ok(Some(format!(
                "<% $view->extend({}); %>",
                quote(unquote(expr))
            ))),
            other => unsupported("extends", other, self.debug),
        })
    }
}

/// `@section('name')...@endsection` and the inline `@section('name', value)`.
pub(crate) struct SectionPass {
    pub debug: bool,
}

impl Pass for SectionPass {
    fn name(&self) -> &'static str {
        "section"
    }

    fn compile(&self, content: &str) -> Result<String, CompileError> {
        SECTION.compile(content, |name, expr| match name {
            "section" => {
                let parts = split_arguments(expr, Some(2));
                let section = quote(unquote(parts[0]));
                let open = format!("<% $view->section({section}); %>");
                match parts.get(1).filter(|value| !value.is_empty()) {
                    Some(value) => Ok(Some(format!(
                        "{open}<%= {value} %><% $view->end_section(); %>"
                    ))),
                    None => Ok(Some(open)),
                }
            }
            other => unsupported("section", other, self.debug),
        })
    }
}

/// `@partial(id)` renders a named child of the current renderable.
pub(crate) struct PartialPass {
    pub debug: bool,
}

impl Pass for PartialPass {
    fn name(&self) -> &'static str {
        "partial"
    }

    fn compile(&self, content: &str) -> Result<String, CompileError> {
        PARTIAL.compile(content, |name, expr| match name {
            "partial" => Ok(Some(format!("<%= $view->partial({}) %>", expr.trim()))),
            other => unsupported("partial", other, self.debug),
        })
    }
}

/// `@include('template', data)`; data defaults to an empty array.
pub(crate) struct IncludePass {
    pub debug: bool,
}

impl Pass for IncludePass {
    fn name(&self) -> &'static str {
        "include"
    }

    fn compile(&self, content: &str) -> Result<String, CompileError> {
        INCLUDE.compile(content, |name, expr| match name {
            "include" => {
                let parts = split_arguments(expr, Some(2));
                let data = parts
                    .get(1)
                    .copied()
                    .filter(|data| !data.is_empty())
                    .unwrap_or("[]");
                Ok(Some(format!(
                    "<%= $view->include({}, {data}) %>",
                    parts[0]
                )))
            }
            other => unsupported("include", other, self.debug),
        })
    }
}

/// `@yield('name')`.
pub(crate) struct YieldPass {
    pub debug: bool,
}

impl Pass for YieldPass {
    fn name(&self) -> &'static str {
        "yield"
    }

    fn compile(&self, content: &str) -> Result<String, CompileError> {
        YIELD.compile(content, |name, expr| match name {
            "yield" => Ok(Some(format!(
                "<%= $view->yield({}) %>",
                quote(unquote(expr))
            ))),
            other => unsupported("yield", other, self.debug),
        })
    }
}
