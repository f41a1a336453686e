//! Per-render mutable state shared by every template in one render call.
//!
//! A [`RenderState`] is created by a top-level render call and dropped when
//! it returns. Nothing in it is global: two renders never see each other's
//! sections, stacks or once-guards.
//!
//! During POPULATE templates write into the state: the declared parent
//! layout, captured sections, pushed stack entries and consumed once ids.
//! A `@yield` inside an open section cannot be resolved yet, so it leaves a
//! placeholder token in the captured text. During PRESENT, [`resolve_section`]
//! substitutes those placeholders with the sections they stand for.
//!
//! [`resolve_section`]: RenderState::resolve_section

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::error::StateError;

const PLACEHOLDER_PREFIX: &str = "<!--quire:yield:";

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<!--quire:yield:(\d+)-->").expect("valid placeholder pattern"));

/// Stage of a render call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderStage {
    /// Outside of any render call.
    #[default]
    Idle,
    /// Collecting sections, stacks and the layout chain.
    Populate,
    /// Producing output from the base layout.
    Present,
}

/// Depth of the open section and push stacks at some point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CaptureMark {
    pub sections: usize,
    pub pushes: usize,
}

#[derive(Debug, Default)]
pub struct RenderState {
    stage: RenderStage,
    parent_layout: Option<String>,
    sections: HashMap<String, String>,
    section_stack: Vec<String>,
    stacks: HashMap<String, Vec<String>>,
    push_stack: Vec<String>,
    once_ids: HashSet<String>,
    kept_once: HashSet<String>,
    presented_once: HashSet<String>,
    placeholders: HashMap<u64, String>,
    next_placeholder: u64,
    resolved: HashMap<String, String>,
}

impl RenderState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(&self) -> RenderStage {
        self.stage
    }

    /// Switches to `stage` and returns the stage that was active before.
    pub(crate) fn enter(&mut self, stage: RenderStage) -> RenderStage {
        std::mem::replace(&mut self.stage, stage)
    }

    pub fn ensure_active(&self) -> Result<RenderStage, StateError> {
        match self.stage {
            RenderStage::Idle => Err(StateError::Inactive),
            stage => Ok(stage),
        }
    }

    /// Records `name` as the parent layout; a later call replaces it.
    pub fn extend(&mut self, name: impl Into<String>) {
        self.parent_layout = Some(name.into());
    }

    pub fn parent_layout(&self) -> Option<&str> {
        self.parent_layout.as_deref()
    }

    pub(crate) fn take_parent(&mut self) -> Option<String> {
        self.parent_layout.take()
    }

    pub(crate) fn restore_parent(&mut self, parent: Option<String>) {
        self.parent_layout = parent;
    }

    pub fn mark(&self) -> CaptureMark {
        CaptureMark {
            sections: self.section_stack.len(),
            pushes: self.push_stack.len(),
        }
    }

    /// Drops section and push entries opened after `mark`.
    pub fn unwind_to(&mut self, mark: CaptureMark) {
        self.section_stack.truncate(mark.sections);
        self.push_stack.truncate(mark.pushes);
    }

    pub fn start_section(&mut self, name: impl Into<String>) {
        self.section_stack.push(name.into());
    }

    /// Pops the innermost open section, which must have been opened above
    /// `floor`.
    pub fn stop_section(&mut self, floor: usize) -> Result<String, StateError> {
        if self.section_stack.len() <= floor {
            return Err(StateError::UnbalancedEndSection);
        }
        self.section_stack
            .pop()
            .ok_or(StateError::UnbalancedEndSection)
    }

    pub fn in_section(&self) -> bool {
        !self.section_stack.is_empty()
    }

    /// Whether a section or push is open, in any template of this render.
    pub fn capturing(&self) -> bool {
        self.in_section() || !self.push_stack.is_empty()
    }

    /// Stores section content. A section written twice keeps the last write.
    pub fn store_section(&mut self, name: impl Into<String>, content: impl Into<String>) {
        self.sections.insert(name.into(), content.into());
        self.resolved.clear();
    }

    /// Raw captured content of a section, placeholders included.
    pub fn section(&self, name: &str) -> Option<&str> {
        self.sections.get(name).map(String::as_str)
    }

    pub fn has_section(&self, name: &str) -> bool {
        self.sections.contains_key(name)
    }

    pub fn start_push(&mut self, name: impl Into<String>) {
        self.push_stack.push(name.into());
    }

    pub fn stop_push(&mut self, floor: usize) -> Result<String, StateError> {
        if self.push_stack.len() <= floor {
            return Err(StateError::UnbalancedEndPush);
        }
        self.push_stack.pop().ok_or(StateError::UnbalancedEndPush)
    }

    pub fn append_stack(&mut self, name: impl Into<String>, content: impl Into<String>) {
        self.stacks
            .entry(name.into())
            .or_default()
            .push(content.into());
    }

    /// All entries pushed to `name`, in push order.
    pub fn stack(&self, name: &str) -> String {
        self.stacks
            .get(name)
            .map(|entries| entries.concat())
            .unwrap_or_default()
    }

    /// Returns true the first time `id` is seen in this render.
    pub fn consume_once(&mut self, id: impl Into<String>) -> bool {
        self.once_ids.insert(id.into())
    }

    /// Marks `id` as already emitted into captured content, so PRESENT
    /// never emits it again.
    pub fn keep_once(&mut self, id: impl Into<String>) {
        self.kept_once.insert(id.into());
    }

    /// Once-guard for PRESENT: true the first time `id` is presented,
    /// unless POPULATE already captured its content.
    pub fn present_once(&mut self, id: impl Into<String>) -> bool {
        let id = id.into();
        !self.kept_once.contains(&id) && self.presented_once.insert(id)
    }

    /// Registers a placeholder standing for section `name`.
    pub fn placeholder(&mut self, name: impl Into<String>) -> String {
        let id = self.next_placeholder;
        self.next_placeholder += 1;
        self.placeholders.insert(id, name.into());
        format!("{PLACEHOLDER_PREFIX}{id}-->")
    }

    /// Section content with every placeholder replaced by the section it
    /// stands for.
    ///
    /// Results are memoised until a section is written again. A section
    /// that reaches itself through placeholders resolves to an empty string
    /// at the point of recursion. Unknown sections resolve to `""`.
    pub fn resolve_section(&mut self, name: &str) -> String {
        let mut resolving = HashSet::new();
        self.resolve_inner(name, &mut resolving)
    }

    fn resolve_inner(&mut self, name: &str, resolving: &mut HashSet<String>) -> String {
        if let Some(done) = self.resolved.get(name) {
            return done.clone();
        }
        let Some(raw) = self.sections.get(name).cloned() else {
            return String::new();
        };
        if !resolving.insert(name.to_string()) {
            return String::new();
        }

        let resolved = if raw.contains(PLACEHOLDER_PREFIX) {
            PLACEHOLDER
                .replace_all(&raw, |caps: &Captures<'_>| {
                    let target = caps[1]
                        .parse::<u64>()
                        .ok()
                        .and_then(|id| self.placeholders.get(&id).cloned());
                    match target {
                        Some(target) => self.resolve_inner(&target, resolving),
                        None => caps[0].to_string(),
                    }
                })
                .into_owned()
        } else {
            raw
        };

        resolving.remove(name);
        self.resolved.insert(name.to_string(), resolved.clone());
        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state_is_idle() {
        let state = RenderState::new();
        assert_eq!(state.ensure_active(), Err(StateError::Inactive));
    }

    #[test]
    fn test_enter_returns_previous_stage() {
        let mut state = RenderState::new();
        assert_eq!(state.enter(RenderStage::Populate), RenderStage::Idle);
        assert_eq!(state.enter(RenderStage::Present), RenderStage::Populate);
        assert_eq!(state.ensure_active(), Ok(RenderStage::Present));
    }

    #[test]
    fn test_section_last_write_wins() {
        let mut state = RenderState::new();
        state.store_section("title", "one");
        state.store_section("title", "two");
        assert_eq!(state.resolve_section("title"), "two");
    }

    #[test]
    fn test_stop_section_respects_floor() {
        let mut state = RenderState::new();
        state.start_section("outer");
        let floor = state.mark().sections;
        assert_eq!(state.stop_section(floor), Err(StateError::UnbalancedEndSection));
        assert_eq!(state.stop_section(0), Ok("outer".to_string()));
        assert_eq!(state.stop_push(0), Err(StateError::UnbalancedEndPush));
    }

    #[test]
    fn test_unwind_to_mark() {
        let mut state = RenderState::new();
        state.start_section("a");
        let mark = state.mark();
        state.start_section("b");
        state.start_push("scripts");
        state.unwind_to(mark);
        assert_eq!(state.mark(), CaptureMark { sections: 1, pushes: 0 });
    }

    #[test]
    fn test_stack_concatenates_in_push_order() {
        let mut state = RenderState::new();
        state.append_stack("s", "A");
        state.append_stack("s", "B");
        assert_eq!(state.stack("s"), "AB");
        assert_eq!(state.stack("missing"), "");
    }

    #[test]
    fn test_once_consumed_once() {
        let mut state = RenderState::new();
        assert!(state.consume_once("modal"));
        assert!(!state.consume_once("modal"));
        assert!(state.consume_once("other"));
    }

    #[test]
    fn test_present_once_skips_kept_ids() {
        let mut state = RenderState::new();
        state.keep_once("modal");
        assert!(!state.present_once("modal"));
        assert!(state.present_once("script"));
        assert!(!state.present_once("script"));
    }

    #[test]
    fn test_capturing_covers_sections_and_pushes() {
        let mut state = RenderState::new();
        assert!(!state.capturing());
        state.start_push("scripts");
        assert!(state.capturing());
        state.stop_push(0).unwrap();
        state.start_section("body");
        assert!(state.capturing());
    }

    #[test]
    fn test_nested_placeholder_resolution() {
        let mut state = RenderState::new();
        let token = state.placeholder("inner");
        state.store_section("body", format!("<main>{token}</main>"));
        state.store_section("inner", "hello");
        assert_eq!(state.resolve_section("body"), "<main>hello</main>");
    }

    #[test]
    fn test_resolution_memo_cleared_on_write() {
        let mut state = RenderState::new();
        let token = state.placeholder("inner");
        state.store_section("body", token);
        state.store_section("inner", "a");
        assert_eq!(state.resolve_section("body"), "a");
        state.store_section("inner", "b");
        assert_eq!(state.resolve_section("body"), "b");
    }

    #[test]
    fn test_cyclic_placeholders_terminate() {
        let mut state = RenderState::new();
        let to_b = state.placeholder("b");
        let to_a = state.placeholder("a");
        state.store_section("a", format!("a[{to_b}]"));
        state.store_section("b", format!("b[{to_a}]"));
        assert_eq!(state.resolve_section("a"), "a[b[]]");
    }

    #[test]
    fn test_unknown_placeholder_left_verbatim() {
        let mut state = RenderState::new();
        state.store_section("body", "x<!--quire:yield:99-->y");
        assert_eq!(state.resolve_section("body"), "x<!--quire:yield:99-->y");
    }
}
