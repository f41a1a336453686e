//! Directive compiler.
//!
//! [`TemplateCompiler`] turns directive source (`@if`, `{{ }}`, `@section`,
//! ...) into the compiled script form executed by the
//! [`ScriptEngine`](crate::engine::ScriptEngine). Compilation is a fixed
//! pipeline of text-to-text passes; each pass owns one directive family and
//! runs over the output of the previous one.
//!
//! # Pipeline
//!
//! | # | Pass | Directives |
//! |---|------|------------|
//! | 1 | `comment` | `{{-- --}}` |
//! | 2 | `extends` | `@extends` |
//! | 3 | `section` | `@section`, `@endsection` |
//! | 4 | `php` | `@php(...)`, `@php`/`@endphp` |
//! | 5 | `echo` | `{{ }}`, `{!! !!}` |
//! | 6 | `conditional` | `@if`, `@elseif`, `@else`, `@endif` |
//! | 7 | `loop` | `@foreach`, `@forelse`, `@empty`, `@for`, `@while`, `@break`, `@continue` |
//! | 8 | `partial` | `@partial` |
//! | 9 | `include` | `@include` |
//! | 10 | `yield` | `@yield` |
//! | 11 | `css` | `@css` |
//! | 12 | `js` | `@js` |
//! | 13 | `stack` | `@push`, `@endpush`, `@stack` |
//! | 14 | `once` | `@once`, `@endonce` |
//!
//! The order is part of the contract: comments go first so commented-out
//! directives never compile, and echo tags are compiled before control
//! directives so `{{ }}` inside loop bodies is already code.
//!
//! Output depends only on the source text and the resolver configuration,
//! so compiling the same source twice is byte-identical.

mod asset;
mod control;
pub(crate) mod directive;
mod stateful;
mod structural;
mod syntax;

use std::sync::Arc;

use tracing::trace;

use crate::error::CompileError;
use crate::resolve::PathResolver;

use asset::AssetPass;
use control::{ConditionalPass, LoopPass};
use stateful::{OncePass, StackPass};
use structural::{IncludePass, LayoutPass, PartialPass, SectionPass, YieldPass};
use syntax::{CommentPass, EchoPass, RawCodePass};

/// A single text-to-text compilation step.
pub trait Pass: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    fn compile(&self, content: &str) -> Result<String, CompileError>;
}

/// The ordered directive pipeline.
pub struct TemplateCompiler {
    passes: Vec<Box<dyn Pass>>,
}

impl TemplateCompiler {
    /// Builds the standard pipeline.
    ///
    /// In debug mode unresolved assets and unsupported directives are
    /// compile errors; otherwise they degrade to comments or are dropped.
    pub fn new(resolver: Arc<dyn PathResolver>, debug: bool) -> Self {
        let passes: Vec<Box<dyn Pass>> = vec![
            Box::new(CommentPass),
            Box::new(LayoutPass { debug }),
            Box::new(SectionPass { debug }),
            Box::new(RawCodePass { debug }),
            Box::new(EchoPass),
            Box::new(ConditionalPass { debug }),
            Box::new(LoopPass { debug }),
            Box::new(PartialPass { debug }),
            Box::new(IncludePass { debug }),
            Box::new(YieldPass { debug }),
            Box::new(AssetPass::css(Arc::clone(&resolver), debug)),
            Box::new(AssetPass::js(resolver, debug)),
            Box::new(StackPass { debug }),
            Box::new(OncePass { debug }),
        ];
        Self { passes }
    }

    /// Names of the passes in execution order.
    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|pass| pass.name()).collect()
    }

    /// Compiles directive source into a script.
    ///
    /// Blank sources compile to the empty string.
    pub fn compile(&self, source: &str) -> Result<String, CompileError> {
        if source.trim().is_empty() {
            return Ok(String::new());
        }
        self.passes
            .iter()
            .try_fold(source.to_string(), |content, pass| {
                trace!(pass = pass.name(), "running directive pass");
                pass.compile(&content)
            })
    }
}
