//! Conditionals and loops.

use once_cell::sync::Lazy;

use super::directive::{control_statement, unsupported, DirectiveTable};
use super::Pass;
use crate::error::CompileError;

static CONDITIONAL: Lazy<DirectiveTable> = Lazy::new(|| {
    DirectiveTable::new(
        &[("if", r"@if\s*\("), ("elseif", r"@elseif\s*\(")],
        &[(r"@else\b", "<% else: %>"), (r"@endif\b", "<% endif; %>")],
    )
});

static LOOP: Lazy<DirectiveTable> = Lazy::new(|| {
    DirectiveTable::new(
        &[
            ("foreach", r"@foreach\s*\("),
            ("forelse", r"@forelse\s*\("),
            ("for", r"@for\s*\("),
            ("while", r"@while\s*\("),
        ],
        &[
            (r"@endforeach\b", "<% endforeach; %>"),
            (r"@empty\b", "<% endforeach; else: %>"),
            (r"@endforelse\b", "<% endif; %>"),
            (r"@endfor\b", "<% endfor; %>"),
            (r"@endwhile\b", "<% endwhile; %>"),
            (r"@break\b", "<% break; %>"),
            (r"@continue\b", "<% continue; %>"),
        ],
    )
});

/// `@if`, `@elseif`, `@else`, `@endif`. Conditions are copied verbatim.
pub(crate) struct ConditionalPass {
    pub debug: bool,
}

impl Pass for ConditionalPass {
    fn name(&self) -> &'static str {
        "conditional"
    }

    fn compile(&self, content: &str) -> Result<String, CompileError> {
        CONDITIONAL.compile(content, |name, expr| match name {
            "if" | "elseif" => Ok(Some(control_statement(name, expr.trim()))),
            other => unsupported("conditional", other, self.debug),
        })
    }
}

/// `@foreach`, `@forelse`/`@empty`, `@for`, `@while` and loop control.
pub(crate) struct LoopPass {
    pub debug: bool,
}

impl Pass for LoopPass {
    fn name(&self) -> &'static str {
        "loop"
    }

    fn compile(&self, content: &str) -> Result<String, CompileError> {
        LOOP.compile(content, |name, expr| match name {
            "foreach" | "for" | "while" => Ok(Some(control_statement(name, expr.trim()))),
            "forelse" => Ok(Some(forelse(expr.trim()))),
            other => unsupported("loop", other, self.debug),
        })
    }
}

/// Guards the loop so `@empty` runs for null, empty or non-iterable values.
fn forelse(expr: &str) -> String {
    let iterable = expr.split(" as ").next().unwrap_or(expr).trim();
    format!(
        "<% if (!empty({iterable}) && is_iterable({iterable})): foreach ({expr}): %>"
    )
}
