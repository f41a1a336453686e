//! Error types for compiling and rendering templates.
//!
//! Each concern has its own error enum so callers can tell a broken template
//! apart from a broken render pipeline:
//!
//! | Error | Raised by | Fatal |
//! |-------|-----------|-------|
//! | [`CompileError`] | directive passes | always |
//! | [`ResolutionError`] | path resolvers | always |
//! | [`CacheError`] | compiled template cache | always |
//! | [`StateError`] | render state and view API | always |
//! | [`ExecutionError`] | compiled script execution | debug mode only |
//!
//! [`RenderError`] wraps all of them and is what the public rendering
//! functions return.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failure while turning directive source into a compiled script.
#[derive(Debug, Error)]
pub enum CompileError {
    /// A template may inherit from a single layout only.
    #[error("template declares {count} @extends directives; only one is allowed")]
    MultipleExtends { count: usize },

    /// A directive pattern matched but its family has no builder for it.
    #[error("{family} compiler does not support @{directive}")]
    UnsupportedDirective {
        family: &'static str,
        directive: String,
    },

    /// An `@css`/`@js` argument could not be resolved at compile time.
    #[error("failed to resolve {kind} file '{file}'")]
    Asset {
        kind: &'static str,
        file: String,
        #[source]
        source: ResolutionError,
    },
}

/// Failure mapping a logical name onto the filesystem.
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("{kind} '{name}' not found at {}", path.display())]
    NotFound {
        kind: &'static str,
        name: String,
        path: PathBuf,
    },

    #[error("invalid {kind} name '{name}'")]
    InvalidName { kind: &'static str, name: String },

    #[error("{} is outside of {}", path.display(), root.display())]
    OutsideRoot { path: PathBuf, root: PathBuf },

    #[error("root directory {} is not usable", path.display())]
    InvalidRoot {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Failure reading or writing compiled templates.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to create cache directory {}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write compiled template {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to move compiled template into {}", path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to read template source {}", path.display())]
    ReadSource {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to scan cache directory {}", path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Misuse of the render lifecycle or unbalanced block directives.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("view API called outside of an active render")]
    Inactive,

    #[error("@endsection without a matching @section")]
    UnbalancedEndSection,

    #[error("@endpush without a matching @push")]
    UnbalancedEndPush,

    #[error("template ended with an open {kind} block")]
    UnclosedCapture { kind: &'static str },

    #[error("expected to close a {expected} block but the innermost open block is a {found}")]
    InterleavedCapture {
        expected: &'static str,
        found: &'static str,
    },

    #[error("circular layout chain: {}", chain.join(" -> "))]
    CircularLayout { chain: Vec<String> },
}

/// Failure while executing a compiled script.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("syntax error at line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("unknown function {0}()")]
    UnknownFunction(String),

    #[error("unknown view method {0}()")]
    UnknownMethod(String),

    #[error("invalid argument for {function}(): {message}")]
    InvalidArgument {
        function: String,
        message: String,
    },

    #[error("division by zero")]
    DivisionByZero,

    #[error("cannot assign to this expression")]
    InvalidAssignment,

    #[error("'{0}' outside of a loop")]
    BreakOutsideLoop(&'static str),

    #[error("failed to read compiled template {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Error type for all rendering operations.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    State(#[from] StateError),

    /// Execution failure, tagged with the template that failed.
    #[error("error rendering template '{template}': {source}")]
    Execution {
        template: String,
        #[source]
        source: ExecutionError,
    },
}

impl RenderError {
    /// Returns the state error when this is one.
    pub fn as_state(&self) -> Option<&StateError> {
        match self {
            RenderError::State(err) => Some(err),
            _ => None,
        }
    }
}

/// Failure loading [`RenderingConfig`](crate::config::RenderingConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration")]
    Build(#[from] config::ConfigError),

    #[error("missing required setting '{key}'")]
    Missing { key: &'static str },
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = RenderError> = std::result::Result<T, E>;
