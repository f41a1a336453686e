//! Template engine abstraction.
//!
//! A [`TemplateEngine`] executes a compiled template file against template
//! data. View directives in the compiled output call back into a
//! [`ViewHost`], which is how the rendering service learns about sections,
//! stacks and layouts while a template runs.
//!
//! The default implementation is [`ScriptEngine`], which interprets the
//! compiled script language and keeps parsed programs in memory.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::{ExecutionError, RenderError, StateError};
use crate::script::value::to_text;
use crate::script::{Interpreter, Output, Program};

/// Failure while executing one compiled template.
///
/// Script errors belong to the template that was running. Render errors come
/// back from the view host, either from the render state or from a nested
/// template.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Script(#[from] ExecutionError),

    #[error(transparent)]
    Render(#[from] RenderError),
}

impl From<StateError> for EngineError {
    fn from(err: StateError) -> Self {
        EngineError::Render(err.into())
    }
}

/// A call made by a compiled template through `$view->method(...)`.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewCall {
    Extend(String),
    Section(String),
    EndSection,
    Yield(String),
    Push(String),
    EndPush,
    Stack(String),
    Once(String),
    Include {
        template: String,
        data: Map<String, Value>,
    },
    Partial(String),
}

impl ViewCall {
    /// Builds a call from a method name and its evaluated arguments.
    pub fn from_method(name: &str, args: Vec<Value>) -> Result<Self, ExecutionError> {
        let mut args = args.into_iter();
        let call = match name {
            "extend" => ViewCall::Extend(name_argument(name, args.next())?),
            "section" => ViewCall::Section(name_argument(name, args.next())?),
            "end_section" => ViewCall::EndSection,
            "yield" => ViewCall::Yield(name_argument(name, args.next())?),
            "push" => ViewCall::Push(name_argument(name, args.next())?),
            "end_push" => ViewCall::EndPush,
            "stack" => ViewCall::Stack(name_argument(name, args.next())?),
            "once" => ViewCall::Once(name_argument(name, args.next())?),
            "partial" => ViewCall::Partial(name_argument(name, args.next())?),
            "include" => {
                let template = name_argument(name, args.next())?;
                let data = match args.next() {
                    None | Some(Value::Null) => Map::new(),
                    Some(Value::Object(map)) => map,
                    Some(Value::Array(items)) if items.is_empty() => Map::new(),
                    Some(other) => {
                        return Err(ExecutionError::InvalidArgument {
                            function: name.to_string(),
                            message: format!("include data must be a map, got {other}"),
                        });
                    }
                };
                ViewCall::Include { template, data }
            }
            _ => return Err(ExecutionError::UnknownMethod(name.to_string())),
        };
        Ok(call)
    }
}

fn name_argument(function: &str, value: Option<Value>) -> Result<String, ExecutionError> {
    match value {
        Some(Value::String(s)) => Ok(s),
        Some(value @ Value::Number(_)) => Ok(to_text(&value)),
        _ => Err(ExecutionError::InvalidArgument {
            function: function.to_string(),
            message: "expected a name".to_string(),
        }),
    }
}

/// Receives view calls while a compiled template runs.
///
/// `out` is the running template's output, so hosts can open and close
/// captures for section and push blocks.
pub trait ViewHost {
    fn call(&mut self, call: ViewCall, out: &mut Output) -> Result<Value, RenderError>;
}

/// Executes compiled templates.
pub trait TemplateEngine: Send + Sync {
    /// Runs the compiled template at `compiled` with `data` in scope.
    fn execute(
        &self,
        compiled: &Path,
        data: &Map<String, Value>,
        host: &mut dyn ViewHost,
    ) -> Result<String, EngineError>;
}

#[derive(Clone)]
struct CachedProgram {
    modified: Option<SystemTime>,
    len: u64,
    program: Arc<Program>,
}

/// Interpreter-backed engine.
///
/// Parsed programs are kept per compiled path and reparsed when the file's
/// modification time or size changes.
#[derive(Default)]
pub struct ScriptEngine {
    programs: Mutex<HashMap<PathBuf, CachedProgram>>,
}

impl ScriptEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of parsed programs held in memory.
    pub fn cached_programs(&self) -> usize {
        self.programs.lock().map(|programs| programs.len()).unwrap_or(0)
    }

    fn load(&self, compiled: &Path) -> Result<Arc<Program>, ExecutionError> {
        let io_error = |source| ExecutionError::Io {
            path: compiled.to_path_buf(),
            source,
        };
        let metadata = fs::metadata(compiled).map_err(io_error)?;
        let modified = metadata.modified().ok();
        let len = metadata.len();

        if let Ok(programs) = self.programs.lock() {
            if let Some(cached) = programs.get(compiled) {
                if cached.modified == modified && cached.len == len {
                    return Ok(Arc::clone(&cached.program));
                }
            }
        }

        let source = fs::read_to_string(compiled).map_err(io_error)?;
        let program = Arc::new(Program::parse(&source)?);
        debug!(path = %compiled.display(), "parsed compiled template");

        match self.programs.lock() {
            Ok(mut programs) => {
                programs.insert(
                    compiled.to_path_buf(),
                    CachedProgram {
                        modified,
                        len,
                        program: Arc::clone(&program),
                    },
                );
            }
            Err(_) => warn!("program cache lock poisoned; skipping cache"),
        }
        Ok(program)
    }
}

impl TemplateEngine for ScriptEngine {
    fn execute(
        &self,
        compiled: &Path,
        data: &Map<String, Value>,
        host: &mut dyn ViewHost,
    ) -> Result<String, EngineError> {
        let program = self.load(compiled)?;
        Interpreter::new(data, host).run(&program)
    }
}
