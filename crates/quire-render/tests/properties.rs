//! Property-based tests for compilation and rendering using proptest.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use proptest::prelude::*;
use quire_render::{
    PathResolver, Renderable, RenderingConfig, RenderingKernel, ResolutionError, TemplateCompiler,
};
use tempfile::TempDir;

// ============================================================================
// Test helpers
// ============================================================================

struct NoAssets;

impl PathResolver for NoAssets {
    fn resolve_template(&self, name: &str) -> Result<PathBuf, ResolutionError> {
        Ok(PathBuf::from(name))
    }

    fn resolve_css(&self, name: &str) -> Result<PathBuf, ResolutionError> {
        Ok(PathBuf::from(format!("/static/css/{name}.css")))
    }

    fn resolve_js(&self, name: &str) -> Result<PathBuf, ResolutionError> {
        Ok(PathBuf::from(format!("/static/js/{name}.js")))
    }

    fn resolve_asset(&self, identifier: &str) -> Result<String, ResolutionError> {
        Ok(identifier.replace("/static", "/assets"))
    }
}

fn compiler() -> TemplateCompiler {
    TemplateCompiler::new(Arc::new(NoAssets), false)
}

/// Fragments of template source, directives included.
fn source_strategy() -> impl Strategy<Value = String> {
    let piece = prop_oneof![
        "[a-z <>/]{0,8}",
        Just("{{ $x }}".to_string()),
        Just("{!! $y !!}".to_string()),
        Just("@if($a)".to_string()),
        Just("@endif".to_string()),
        Just("@foreach($items as $i)".to_string()),
        Just("@endforeach".to_string()),
        Just("@section('s')".to_string()),
        Just("@endsection".to_string()),
        Just("@once".to_string()),
        Just("@endonce".to_string()),
        Just("@push('p')".to_string()),
        Just("@endpush".to_string()),
        Just("@css('site')".to_string()),
        Just("{{-- note --}}".to_string()),
        Just("@if((".to_string()),
    ];
    prop::collection::vec(piece, 0..16).prop_map(|pieces| pieces.concat())
}

/// Boolean expressions with arbitrarily nested parentheses.
fn condition_strategy() -> impl Strategy<Value = String> {
    let leaf = prop_oneof![
        Just("$a".to_string()),
        Just("$b".to_string()),
        Just("1".to_string()),
        Just("'x)'".to_string()),
    ];
    leaf.prop_recursive(4, 32, 2, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone()).prop_map(|(l, r)| format!("({l} && {r})")),
            (inner.clone(), inner.clone()).prop_map(|(l, r)| format!("({l} || {r})")),
            (inner.clone(), inner).prop_map(|(l, r)| format!("f({l}, {r})")),
        ]
    })
}

fn site(views: &[(&str, String)]) -> (TempDir, RenderingKernel) {
    let root = TempDir::new().unwrap();
    let views_dir = root.path().join("views");
    fs::create_dir_all(&views_dir).unwrap();
    fs::create_dir_all(root.path().join("public")).unwrap();
    for (name, source) in views {
        fs::write(views_dir.join(format!("{name}.quire")), source).unwrap();
    }
    let config = RenderingConfig::new(
        views_dir,
        root.path().join("cache"),
        root.path().join("public"),
    );
    let kernel = RenderingKernel::new(&config).unwrap();
    (root, kernel)
}

// ============================================================================
// Property tests
// ============================================================================

proptest! {
    /// Compiling the same source twice gives byte-identical output.
    #[test]
    fn compile_is_deterministic(source in source_strategy()) {
        let compiler = compiler();
        let first = compiler.compile(&source).map_err(|e| e.to_string());
        let second = compiler.compile(&source).map_err(|e| e.to_string());
        prop_assert_eq!(first, second);
    }

    /// `@if(...)` keeps the whole parenthesised condition.
    #[test]
    fn if_condition_extracted_whole(cond in condition_strategy()) {
        let compiled = compiler().compile(&format!("@if({cond})yes@endif")).unwrap();
        prop_assert_eq!(compiled, format!("<% if ({cond}): %>yes<% endif; %>"));
    }

    /// Text without directives passes through untouched.
    #[test]
    fn plain_text_is_unchanged(text in "[a-z][a-z .,<>/]{0,40}") {
        prop_assert_eq!(compiler().compile(&text).unwrap(), text);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// A once block inside a loop renders a single time.
    #[test]
    fn once_in_loop_renders_once(iterations in 1usize..8) {
        let page = format!(
            "@foreach(range(1, {iterations}) as $i)@once('id')X@endonce.@endforeach"
        );
        let (_root, kernel) = site(&[("page", page)]);
        let out = kernel.service().render(&Renderable::page("page")).unwrap();
        prop_assert_eq!(out, format!("X{}", ".".repeat(iterations)));
    }

    /// Stacks return pushed entries in push order.
    #[test]
    fn stack_preserves_push_order(entries in prop::collection::vec("[a-z]{1,6}", 0..6)) {
        let pushes: String = entries
            .iter()
            .map(|entry| format!("@push('s'){entry}@endpush"))
            .collect();
        let page = format!("@extends('layout')\n{pushes}");
        let (_root, kernel) = site(&[("layout", "@stack('s')".to_string()), ("page", page)]);
        let out = kernel.service().render(&Renderable::page("page")).unwrap();
        prop_assert_eq!(out, entries.concat());
    }
}
