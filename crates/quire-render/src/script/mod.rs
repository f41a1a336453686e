//! The script language compiled templates are written in.
//!
//! Directive passes turn template source into text interleaved with
//! `<% statements %>` and `<%= expressions %>` tags. This module parses that
//! text into a [`Program`] and runs it against template data, forwarding
//! `$view->method(...)` calls to a [`ViewHost`](crate::engine::ViewHost).

mod ast;
mod functions;
mod interp;
mod lexer;
mod parser;
pub(crate) mod value;

pub use ast::Program;
pub(crate) use interp::Interpreter;
pub use interp::{CaptureKind, Output};
