//! # Quire Render - Directive Templates with Layout Inheritance
//!
//! `quire-render` compiles directive templates (`@extends`, `@section`,
//! `@yield`, `{{ }}`, ...) into a small script language, caches the compiled
//! form on disk and renders pages through a two-stage POPULATE / PRESENT
//! pass over their layout chain.
//!
//! ## Core Concepts
//!
//! - [`TemplateCompiler`]: ordered pipeline of directive passes
//! - [`TemplateCache`]: content-addressed store of compiled templates
//! - [`TemplateProcessor`]: name → source → up-to-date compiled file
//! - [`RenderingService`]: drives POPULATE and PRESENT for a [`Renderable`]
//! - [`RenderState`]: sections, stacks and once-guards of one render call
//! - [`ViewApi`]: the `$view` object templates call, in Populating or
//!   Presenting mode
//! - [`RenderingKernel`]: all of the above wired from a [`RenderingConfig`]
//!
//! ## Quick Start
//!
//! ```rust
//! use quire_render::{Renderable, RenderingConfig, RenderingKernel};
//! use std::fs;
//!
//! let root = tempfile::tempdir()?;
//! let views = root.path().join("views");
//! fs::create_dir_all(views.join("layouts"))?;
//! fs::create_dir_all(root.path().join("public"))?;
//! fs::write(
//!     views.join("layouts/main.quire"),
//!     "<title>@yield('title')</title>\n<main>@yield('content')</main>",
//! )?;
//! fs::write(
//!     views.join("home.quire"),
//!     "@extends('layouts/main')\n\
//!      @section('title', 'Home')\n\
//!      @section('content')Hello, {{ $name }}!@endsection",
//! )?;
//!
//! let config = RenderingConfig::new(&views, root.path().join("cache"), root.path().join("public"));
//! let kernel = RenderingKernel::new(&config)?;
//! let page = Renderable::page("home").with("name", "World");
//! let html = kernel.service().render(&page)?;
//! assert_eq!(html, "<title>Home</title>\n<main>Hello, World!</main>");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Errors
//!
//! Broken templates, missing files and unbalanced blocks always fail the
//! render. Runtime failures inside a template are reported as
//! [`RenderError::Execution`] in debug mode; in production the failing
//! template renders as an empty string and the error is logged.

mod api;
pub mod cache;
pub mod compiler;
mod config;
pub mod engine;
mod error;
mod kernel;
mod processing;
mod renderable;
pub mod resolve;
pub mod script;
mod service;
mod state;

pub use api::{ViewApi, ViewMode};
pub use cache::{TemplateCache, DEFAULT_MAX_AGE};
pub use compiler::TemplateCompiler;
pub use config::{RawConfig, RenderingConfig};
pub use engine::{EngineError, ScriptEngine, TemplateEngine, ViewCall, ViewHost};
pub use error::{
    CacheError, CompileError, ConfigError, ExecutionError, RenderError, ResolutionError, Result,
    StateError,
};
pub use kernel::RenderingKernel;
pub use processing::TemplateProcessor;
pub use renderable::{Context, Partials, RenderKind, Renderable};
pub use resolve::{DirectoryResolver, PathResolver};
pub use service::RenderingService;
pub use state::{CaptureMark, RenderStage, RenderState};
