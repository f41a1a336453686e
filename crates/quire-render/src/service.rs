//! Two-stage rendering across layout chains.
//!
//! A page renders in two stages sharing one [`RenderState`]:
//!
//! 1. **POPULATE** runs the page's template. `@extends` records a parent
//!    layout, which then runs with the same data, and so on up the chain.
//!    Output is discarded; what matters is what the templates wrote into
//!    the state (sections, stacks, once-guards).
//! 2. **PRESENT** runs the last template of the chain, the base layout, and
//!    its output is the result. `@yield` and `@stack` now read the state.
//!
//! Fragments skip straight to PRESENT. Nested renders (`@include`,
//! `@partial`) reuse the caller's state instead of creating one.

use std::sync::Arc;

use tracing::{debug, error};

use crate::api::ViewApi;
use crate::engine::{EngineError, TemplateEngine};
use crate::error::{RenderError, Result, StateError};
use crate::processing::TemplateProcessor;
use crate::renderable::{Context, Partials, RenderKind, Renderable};
use crate::state::{RenderStage, RenderState};

pub struct RenderingService {
    processor: TemplateProcessor,
    engine: Arc<dyn TemplateEngine>,
    debug: bool,
}

impl RenderingService {
    pub fn new(processor: TemplateProcessor, engine: Arc<dyn TemplateEngine>, debug: bool) -> Self {
        Self {
            processor,
            engine,
            debug,
        }
    }

    pub fn processor(&self) -> &TemplateProcessor {
        &self.processor
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }

    /// Renders a page or fragment with a fresh render state.
    pub fn render(&self, renderable: &Renderable) -> Result<String> {
        let mut state = RenderState::new();
        self.render_in(&mut state, renderable)
    }

    /// Renders a single template as a fragment with a fresh render state.
    pub fn render_template(&self, name: &str, data: &Context) -> Result<String> {
        let mut state = RenderState::new();
        self.render_template_in(&mut state, name, data)
    }

    /// Renders `renderable` inside an existing render.
    pub fn render_in(&self, state: &mut RenderState, renderable: &Renderable) -> Result<String> {
        match renderable.kind() {
            RenderKind::Page => self.render_page(state, renderable),
            RenderKind::Fragment => self.render_fragment(
                state,
                renderable.template(),
                renderable.data(),
                Some(renderable.partials()),
            ),
        }
    }

    /// Renders template `name` inside an existing render, without partials.
    pub fn render_template_in(
        &self,
        state: &mut RenderState,
        name: &str,
        data: &Context,
    ) -> Result<String> {
        self.render_fragment(state, name, data, None)
    }

    /// Fragments run in the caller's stage, or PRESENT at top level.
    fn render_fragment(
        &self,
        state: &mut RenderState,
        name: &str,
        data: &Context,
        partials: Option<&Partials>,
    ) -> Result<String> {
        let stage = match state.stage() {
            RenderStage::Idle => RenderStage::Present,
            stage => stage,
        };
        let previous = state.enter(stage);
        let result = self.execute(state, name, data, partials);
        state.enter(previous);
        result
    }

    fn render_page(&self, state: &mut RenderState, page: &Renderable) -> Result<String> {
        let previous = state.enter(RenderStage::Populate);
        let parent = state.take_parent();
        let result = self.populate_and_present(state, page);
        state.restore_parent(parent);
        state.enter(previous);
        result
    }

    fn populate_and_present(&self, state: &mut RenderState, page: &Renderable) -> Result<String> {
        let data = page.data();
        let partials = Some(page.partials());

        self.execute(state, page.template(), data, partials)?;

        let mut chain = vec![page.template().to_string()];
        while let Some(parent) = state.take_parent() {
            if chain.contains(&parent) {
                chain.push(parent);
                return Err(StateError::CircularLayout { chain }.into());
            }
            debug!(layout = %parent, depth = chain.len(), "populating parent layout");
            chain.push(parent);
            let layout = chain.last().map(String::as_str).unwrap_or_default();
            self.execute(state, layout, data, partials)?;
        }

        let base = chain.last().map(String::as_str).unwrap_or(page.template());
        debug!(base, "presenting base layout");
        state.enter(RenderStage::Present);
        self.execute(state, base, data, partials)
    }

    /// Runs one template. Script failures are fatal in debug mode; in
    /// production the template renders as empty.
    fn execute(
        &self,
        state: &mut RenderState,
        name: &str,
        data: &Context,
        partials: Option<&Partials>,
    ) -> Result<String> {
        let compiled = self.processor.resolve(name)?;
        let mut api = ViewApi::new(self, state, partials);
        match self.engine.execute(&compiled, data, &mut api) {
            Ok(output) => {
                api.ensure_closed()?;
                Ok(output)
            }
            Err(EngineError::Render(err)) => Err(err),
            Err(EngineError::Script(source)) if self.debug => Err(RenderError::Execution {
                template: name.to_string(),
                source,
            }),
            Err(EngineError::Script(source)) => {
                error!(template = name, error = %source, "template execution failed");
                Ok(String::new())
            }
        }
    }
}
