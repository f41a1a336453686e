//! The view API compiled templates call through `$view->...`.
//!
//! One [`ViewApi`] exists per executing template. Its [`ViewMode`] is taken
//! from the render stage when the template starts and selects behaviour:
//!
//! | call | Populating | Presenting |
//! |------|------------|------------|
//! | `extend(n)` | record parent layout | no-op |
//! | `section(n)` ... `end_section()` | capture into `sections[n]` | body written through |
//! | `yield(n)` | placeholder inside a section, else `""` | resolved section |
//! | `push(n)` ... `end_push()` | append capture to `stacks[n]` | body written through |
//! | `stack(n)` | `""` | pushed entries in order |
//! | `once(id)` | true on first sight of `id` | true on first sight, unless captured in POPULATE |
//! | `include(t, data)` | render `t` now | render `t` now |
//! | `partial(id)` | render partial `id` now | render partial `id` now |
//!
//! Blocks are tracked on the state's stacks in both modes, so unbalanced
//! `end_section()`/`end_push()` calls fail either way.
//!
//! Dropping the API restores the state's section and push stacks to their
//! depth at construction, so a template that fails halfway never leaves
//! blocks open for the next template.

use serde_json::Value;
use tracing::debug;

use crate::engine::{ViewCall, ViewHost};
use crate::error::{RenderError, StateError};
use crate::renderable::Partials;
use crate::script::{CaptureKind, Output};
use crate::service::RenderingService;
use crate::state::{CaptureMark, RenderStage, RenderState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewMode {
    Populating,
    Presenting,
}

pub struct ViewApi<'a> {
    mode: ViewMode,
    service: &'a RenderingService,
    state: &'a mut RenderState,
    partials: Option<&'a Partials>,
    mark: CaptureMark,
}

impl<'a> ViewApi<'a> {
    pub fn new(
        service: &'a RenderingService,
        state: &'a mut RenderState,
        partials: Option<&'a Partials>,
    ) -> Self {
        let mode = match state.stage() {
            RenderStage::Populate => ViewMode::Populating,
            RenderStage::Present | RenderStage::Idle => ViewMode::Presenting,
        };
        let mark = state.mark();
        Self {
            mode,
            service,
            state,
            partials,
            mark,
        }
    }

    pub fn mode(&self) -> ViewMode {
        self.mode
    }

    /// Fails when the template left a section or push of its own open.
    pub(crate) fn ensure_closed(&self) -> Result<(), StateError> {
        let now = self.state.mark();
        if now.sections > self.mark.sections {
            return Err(StateError::UnclosedCapture { kind: "section" });
        }
        if now.pushes > self.mark.pushes {
            return Err(StateError::UnclosedCapture { kind: "push" });
        }
        Ok(())
    }

    fn start_section(&mut self, name: String, out: &mut Output) {
        self.state.start_section(name);
        if self.mode == ViewMode::Populating {
            out.begin_capture(CaptureKind::Section);
        }
    }

    fn end_section(&mut self, out: &mut Output) -> Result<(), RenderError> {
        match self.mode {
            ViewMode::Populating => {
                let body = out.end_capture(CaptureKind::Section)?;
                let name = self.state.stop_section(self.mark.sections)?;
                self.state.store_section(name, body);
            }
            ViewMode::Presenting => {
                self.state.stop_section(self.mark.sections)?;
            }
        }
        Ok(())
    }

    fn start_push(&mut self, name: String, out: &mut Output) {
        self.state.start_push(name);
        if self.mode == ViewMode::Populating {
            out.begin_capture(CaptureKind::Push);
        }
    }

    fn end_push(&mut self, out: &mut Output) -> Result<(), RenderError> {
        match self.mode {
            ViewMode::Populating => {
                let body = out.end_capture(CaptureKind::Push)?;
                let name = self.state.stop_push(self.mark.pushes)?;
                self.state.append_stack(name, body);
            }
            ViewMode::Presenting => {
                self.state.stop_push(self.mark.pushes)?;
            }
        }
        Ok(())
    }

    fn partial(&mut self, id: &str) -> Result<String, RenderError> {
        match self.partials.and_then(|partials| partials.get(id)) {
            Some(partial) => self.service.render_in(self.state, partial),
            None => {
                debug!(partial = id, "partial not provided; rendering nothing");
                Ok(String::new())
            }
        }
    }
}

impl ViewHost for ViewApi<'_> {
    fn call(&mut self, call: ViewCall, out: &mut Output) -> Result<Value, RenderError> {
        self.state.ensure_active()?;

        let text = match (self.mode, call) {
            (ViewMode::Populating, ViewCall::Extend(name)) => {
                self.state.extend(name);
                return Ok(Value::Null);
            }
            (ViewMode::Presenting, ViewCall::Extend(_)) => return Ok(Value::Null),

            (_, ViewCall::Section(name)) => {
                self.start_section(name, out);
                return Ok(Value::Null);
            }
            (_, ViewCall::EndSection) => {
                self.end_section(out)?;
                return Ok(Value::Null);
            }
            (ViewMode::Populating, ViewCall::Yield(name)) => {
                if self.state.in_section() {
                    self.state.placeholder(name)
                } else {
                    String::new()
                }
            }
            (ViewMode::Presenting, ViewCall::Yield(name)) => self.state.resolve_section(&name),

            (_, ViewCall::Push(name)) => {
                self.start_push(name, out);
                return Ok(Value::Null);
            }
            (_, ViewCall::EndPush) => {
                self.end_push(out)?;
                return Ok(Value::Null);
            }
            (ViewMode::Populating, ViewCall::Stack(_)) => String::new(),
            (ViewMode::Presenting, ViewCall::Stack(name)) => self.state.stack(&name),

            (ViewMode::Populating, ViewCall::Once(id)) => {
                let fires = self.state.consume_once(id.as_str());
                if fires && self.state.capturing() {
                    self.state.keep_once(id);
                }
                return Ok(Value::Bool(fires));
            }
            (ViewMode::Presenting, ViewCall::Once(id)) => {
                return Ok(Value::Bool(self.state.present_once(id)));
            }

            (_, ViewCall::Include { template, data }) => {
                self.service
                    .render_template_in(self.state, &template, &data)?
            }
            (_, ViewCall::Partial(id)) => self.partial(&id)?,
        };
        Ok(Value::String(text))
    }
}

impl Drop for ViewApi<'_> {
    fn drop(&mut self) {
        self.state.unwind_to(self.mark);
    }
}
