//! Directives backed by render state: stacks and once-blocks.

use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};

use super::directive::{is_standalone, replace_matches, unsupported, DirectiveTable};
use super::Pass;
use crate::error::CompileError;

static STACK: Lazy<DirectiveTable> = Lazy::new(|| {
    DirectiveTable::new(
        &[("push", r"@push\s*\("), ("stack", r"@stack\s*\(")],
        &[(r"@endpush\b", "<% $view->end_push(); %>")],
    )
});

static ONCE: Lazy<DirectiveTable> =
    Lazy::new(|| DirectiveTable::new(&[("once", r"@once\s*\(")], &[]));

static BARE_ONCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"@once\b").expect("valid regex"));
static END_ONCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"@endonce\b").expect("valid regex"));

/// `@push(name)...@endpush` and `@stack(name)`.
pub(crate) struct StackPass {
    pub debug: bool,
}

impl Pass for StackPass {
    fn name(&self) -> &'static str {
        "stack"
    }

    fn compile(&self, content: &str) -> Result<String, CompileError> {
        STACK.compile(content, |name, expr| match name {
            "push" => Ok(Some(format!("<% $view->push({}); %>", expr.trim()))),
            "stack" => Ok(Some(format!("<%= $view->stack({}) %>", expr.trim()))),
            other => unsupported("stack", other, self.debug),
        })
    }
}

/// `@once('id')...@endonce`, or `@once...@endonce` with a generated id.
pub(crate) struct OncePass {
    pub debug: bool,
}

impl Pass for OncePass {
    fn name(&self) -> &'static str {
        "once"
    }

    fn compile(&self, content: &str) -> Result<String, CompileError> {
        let content = ONCE.compile(content, |name, expr| match name {
            "once" => Ok(Some(format!("<% if ($view->once({})): %>", expr.trim()))),
            other => unsupported("once", other, self.debug),
        })?;
        let content = name_bare_blocks(&content);
        Ok(replace_matches(&END_ONCE, &content, "<% endif; %>", |start, end| {
            is_standalone(&content, start, end)
        }))
    }
}

/// Gives each argument-less `@once` an id derived from its body and position.
///
/// An `@once(` whose parenthesis never closed is not argument-less and stays
/// as written.
fn name_bare_blocks(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    let mut last = 0;
    let mut ordinal = 0usize;
    for found in BARE_ONCE.find_iter(content) {
        if !is_standalone(content, found.start(), found.end())
            || ONCE.opens_parameterized(content, found.start())
        {
            continue;
        }
        let after = &content[found.end()..];
        let body_end = END_ONCE.find(after).map_or(after.len(), |end| end.start());
        out.push_str(&content[last..found.start()]);
        out.push_str(&format!(
            "<% if ($view->once('{}')): %>",
            once_id(ordinal, &after[..body_end])
        ));
        ordinal += 1;
        last = found.end();
    }
    out.push_str(&content[last..]);
    out
}

fn once_id(ordinal: usize, body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(ordinal.to_le_bytes());
    hasher.update(body.as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("once-{}", &digest[..16])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_stack() {
        let pass = StackPass { debug: false };
        assert_eq!(
            pass.compile("@push('scripts')<script></script>@endpush@stack('scripts')")
                .unwrap(),
            "<% $view->push('scripts'); %><script></script><% $view->end_push(); %>\
             <%= $view->stack('scripts') %>"
        );
    }

    #[test]
    fn test_once_with_id() {
        let pass = OncePass { debug: false };
        assert_eq!(
            pass.compile("@once('modal')x@endonce").unwrap(),
            "<% if ($view->once('modal')): %>x<% endif; %>"
        );
    }

    #[test]
    fn test_bare_once_ids_are_deterministic_and_distinct() {
        let pass = OncePass { debug: false };
        let source = "@once a @endonce @once a @endonce";
        let first = pass.compile(source).unwrap();
        assert_eq!(first, pass.compile(source).unwrap());

        let ids: Vec<&str> = first
            .split("$view->once('")
            .skip(1)
            .map(|rest| &rest[..rest.find('\'').unwrap()])
            .collect();
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);
        assert!(ids[0].starts_with("once-"));
        assert!(!first.contains("@once"));
        assert!(!first.contains("@endonce"));
    }

    #[test]
    fn test_unclosed_once_left_in_place() {
        let pass = OncePass { debug: false };
        assert_eq!(pass.compile("@once('modal x").unwrap(), "@once('modal x");
    }
}
