//! Tree-walking interpreter for compiled templates.

use serde_json::{Map, Value};

use super::ast::{BinaryOp, Expr, Node, Program, UnaryOp};
use super::functions;
use super::value::{
    arithmetic, compare, entries, index, loose_eq, property, set_path, to_num, to_text, truthy,
};
use crate::engine::{EngineError, ViewCall, ViewHost};
use crate::error::{ExecutionError, StateError};

/// Name of the variable bound to the view API inside scripts.
pub(crate) const VIEW_VARIABLE: &str = "view";

/// Kind of an open output capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureKind {
    Section,
    Push,
}

impl CaptureKind {
    fn label(self) -> &'static str {
        match self {
            CaptureKind::Section => "section",
            CaptureKind::Push => "push",
        }
    }

    fn unbalanced(self) -> StateError {
        match self {
            CaptureKind::Section => StateError::UnbalancedEndSection,
            CaptureKind::Push => StateError::UnbalancedEndPush,
        }
    }
}

/// Output of one template execution.
///
/// Section and push bodies are captured into nested buffers; closing a
/// capture hands its text back instead of writing it to the parent.
#[derive(Debug)]
pub struct Output {
    root: String,
    captures: Vec<(CaptureKind, String)>,
}

impl Default for Output {
    fn default() -> Self {
        Self::new()
    }
}

impl Output {
    pub fn new() -> Self {
        Self {
            root: String::new(),
            captures: Vec::new(),
        }
    }

    pub fn write(&mut self, text: &str) {
        match self.captures.last_mut() {
            Some((_, buffer)) => buffer.push_str(text),
            None => self.root.push_str(text),
        }
    }

    pub fn begin_capture(&mut self, kind: CaptureKind) {
        self.captures.push((kind, String::new()));
    }

    /// Closes the innermost capture, which must be of `kind`.
    pub fn end_capture(&mut self, kind: CaptureKind) -> Result<String, StateError> {
        match self.captures.last() {
            None => Err(kind.unbalanced()),
            Some((open, _)) if *open != kind => Err(StateError::InterleavedCapture {
                expected: kind.label(),
                found: open.label(),
            }),
            Some(_) => Ok(self.captures.pop().map(|(_, text)| text).unwrap_or_default()),
        }
    }

    pub fn is_capturing(&self) -> bool {
        !self.captures.is_empty()
    }

    pub fn finish(self) -> Result<String, StateError> {
        match self.captures.last() {
            Some((kind, _)) => Err(StateError::UnclosedCapture { kind: kind.label() }),
            None => Ok(self.root),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Normal,
    Break,
    Continue,
}

pub(crate) struct Interpreter<'h> {
    scope: Map<String, Value>,
    host: &'h mut dyn ViewHost,
    out: Output,
}

impl<'h> Interpreter<'h> {
    pub fn new(data: &Map<String, Value>, host: &'h mut dyn ViewHost) -> Self {
        Self {
            scope: data.clone(),
            host,
            out: Output::new(),
        }
    }

    pub fn run(mut self, program: &Program) -> Result<String, EngineError> {
        match self.block(&program.nodes)? {
            Flow::Normal => {}
            Flow::Break => return Err(ExecutionError::BreakOutsideLoop("break").into()),
            Flow::Continue => return Err(ExecutionError::BreakOutsideLoop("continue").into()),
        }
        Ok(self.out.finish()?)
    }

    fn block(&mut self, nodes: &[Node]) -> Result<Flow, EngineError> {
        for node in nodes {
            let flow = self.node(node)?;
            if flow != Flow::Normal {
                return Ok(flow);
            }
        }
        Ok(Flow::Normal)
    }

    fn node(&mut self, node: &Node) -> Result<Flow, EngineError> {
        match node {
            Node::Text(text) => self.out.write(text),
            Node::Echo(expr) => {
                let value = self.eval(expr)?;
                self.out.write(&to_text(&value));
            }
            Node::Expr(expr) => {
                self.eval(expr)?;
            }
            Node::If {
                branches,
                otherwise,
            } => {
                for (cond, body) in branches {
                    if truthy(&self.eval(cond)?) {
                        return self.block(body);
                    }
                }
                if let Some(body) = otherwise {
                    return self.block(body);
                }
            }
            Node::Foreach {
                iterable,
                key,
                value,
                body,
            } => {
                let iterable = self.eval(iterable)?;
                for (k, v) in entries(&iterable) {
                    if let Some(key) = key {
                        self.scope.insert(key.clone(), k);
                    }
                    self.scope.insert(value.clone(), v);
                    if self.block(body)? == Flow::Break {
                        break;
                    }
                }
            }
            Node::For {
                init,
                cond,
                step,
                body,
            } => {
                for expr in init {
                    self.eval(expr)?;
                }
                while self.condition(cond)? {
                    if self.block(body)? == Flow::Break {
                        break;
                    }
                    for expr in step {
                        self.eval(expr)?;
                    }
                }
            }
            Node::While { cond, body } => {
                while truthy(&self.eval(cond)?) {
                    if self.block(body)? == Flow::Break {
                        break;
                    }
                }
            }
            Node::Break => return Ok(Flow::Break),
            Node::Continue => return Ok(Flow::Continue),
        }
        Ok(Flow::Normal)
    }

    /// `for` conditions: every expression runs, the last one decides.
    fn condition(&mut self, cond: &[Expr]) -> Result<bool, EngineError> {
        let mut last = Value::Bool(true);
        for expr in cond {
            last = self.eval(expr)?;
        }
        Ok(truthy(&last))
    }

    fn eval(&mut self, expr: &Expr) -> Result<Value, EngineError> {
        let value = match expr {
            Expr::Literal(value) => value.clone(),
            Expr::Array(items) => self.array(items)?,
            Expr::Var(name) => self.scope.get(name).cloned().unwrap_or(Value::Null),
            Expr::Index(base, Some(key)) => {
                let base = self.eval(base)?;
                let key = self.eval(key)?;
                index(&base, &key)
            }
            Expr::Index(_, None) => return Err(ExecutionError::InvalidAssignment.into()),
            Expr::Prop(base, name) => property(&self.eval(base)?, name),
            Expr::MethodCall(base, name, args) => {
                if !matches!(base.as_ref(), Expr::Var(v) if v == VIEW_VARIABLE) {
                    return Err(ExecutionError::UnknownMethod(name.clone()).into());
                }
                let args = self.arguments(args)?;
                let call = ViewCall::from_method(name, args)?;
                self.host.call(call, &mut self.out)?
            }
            Expr::Call(name, args) => {
                let args = self.arguments(args)?;
                functions::call(name, &args)?
            }
            Expr::Unary(op, operand) => {
                let value = self.eval(operand)?;
                match op {
                    UnaryOp::Not => Value::Bool(!truthy(&value)),
                    UnaryOp::Neg => arithmetic(BinaryOp::Sub, &Value::from(0), &value)?,
                    UnaryOp::Plus => to_num(&value).into_value(),
                }
            }
            Expr::Binary(op, left, right) => self.binary(*op, left, right)?,
            Expr::Coalesce(left, right) => match self.eval(left)? {
                Value::Null => self.eval(right)?,
                value => value,
            },
            Expr::Ternary(cond, then, otherwise) => {
                let cond = self.eval(cond)?;
                match (truthy(&cond), then) {
                    (true, Some(then)) => self.eval(then)?,
                    (true, None) => cond,
                    (false, _) => self.eval(otherwise)?,
                }
            }
            Expr::Assign(target, op, value) => {
                let mut value = self.eval(value)?;
                if let Some(op) = op {
                    let current = self.eval(target)?;
                    value = arithmetic(*op, &current, &value)?;
                }
                self.assign(target, value.clone())?;
                value
            }
            Expr::IncDec {
                target,
                delta,
                prefix,
            } => {
                let current = self.eval(target)?;
                let updated = arithmetic(BinaryOp::Add, &current, &Value::from(*delta))?;
                self.assign(target, updated.clone())?;
                if *prefix {
                    updated
                } else {
                    current
                }
            }
        };
        Ok(value)
    }

    fn arguments(&mut self, args: &[Expr]) -> Result<Vec<Value>, EngineError> {
        args.iter().map(|arg| self.eval(arg)).collect()
    }

    fn array(&mut self, items: &[(Option<Expr>, Expr)]) -> Result<Value, EngineError> {
        if items.iter().all(|(key, _)| key.is_none()) {
            let values = items
                .iter()
                .map(|(_, value)| self.eval(value))
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(Value::Array(values));
        }
        let mut map = Map::new();
        let mut next = 0usize;
        for (key, value) in items {
            let key = match key {
                Some(key) => to_text(&self.eval(key)?),
                None => {
                    let key = next.to_string();
                    next += 1;
                    key
                }
            };
            let value = self.eval(value)?;
            map.insert(key, value);
        }
        Ok(Value::Object(map))
    }

    fn binary(&mut self, op: BinaryOp, left: &Expr, right: &Expr) -> Result<Value, EngineError> {
        let left = self.eval(left)?;
        match op {
            BinaryOp::And if !truthy(&left) => return Ok(Value::Bool(false)),
            BinaryOp::Or if truthy(&left) => return Ok(Value::Bool(true)),
            _ => {}
        }
        let right = self.eval(right)?;
        let value = match op {
            BinaryOp::And | BinaryOp::Or => Value::Bool(truthy(&right)),
            BinaryOp::Eq => Value::Bool(loose_eq(&left, &right)),
            BinaryOp::NotEq => Value::Bool(!loose_eq(&left, &right)),
            BinaryOp::Identical => Value::Bool(left == right),
            BinaryOp::NotIdentical => Value::Bool(left != right),
            BinaryOp::Less => Value::Bool(compare(&left, &right).is_lt()),
            BinaryOp::LessEq => Value::Bool(compare(&left, &right).is_le()),
            BinaryOp::Greater => Value::Bool(compare(&left, &right).is_gt()),
            BinaryOp::GreaterEq => Value::Bool(compare(&left, &right).is_ge()),
            _ => arithmetic(op, &left, &right)?,
        };
        Ok(value)
    }

    fn assign(&mut self, target: &Expr, value: Value) -> Result<(), EngineError> {
        let (root, path) = self.target_path(target)?;
        let slot = self.scope.entry(root).or_insert(Value::Null);
        set_path(slot, &path, value)?;
        Ok(())
    }

    /// Resolves an assignment target into its root variable and key path.
    fn target_path(&mut self, target: &Expr) -> Result<(String, Vec<Option<Value>>), EngineError> {
        match target {
            Expr::Var(name) if name != VIEW_VARIABLE => Ok((name.clone(), Vec::new())),
            Expr::Index(base, key) => {
                let (root, mut path) = self.target_path(base)?;
                let key = match key {
                    Some(key) => Some(self.eval(key)?),
                    None => None,
                };
                path.push(key);
                Ok((root, path))
            }
            Expr::Prop(base, name) => {
                let (root, mut path) = self.target_path(base)?;
                path.push(Some(Value::String(name.clone())));
                Ok((root, path))
            }
            _ => Err(ExecutionError::InvalidAssignment.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RenderError;
    use serde_json::json;

    /// Host that records calls and captures sections into a list.
    #[derive(Default)]
    struct Recorder {
        calls: Vec<String>,
        sections: Vec<(String, String)>,
        open: Vec<String>,
    }

    impl ViewHost for Recorder {
        fn call(&mut self, call: ViewCall, out: &mut Output) -> Result<Value, RenderError> {
            self.calls.push(format!("{call:?}"));
            match call {
                ViewCall::Section(name) => {
                    self.open.push(name);
                    out.begin_capture(CaptureKind::Section);
                }
                ViewCall::EndSection => {
                    let body = out.end_capture(CaptureKind::Section)?;
                    let name = self.open.pop().unwrap_or_default();
                    self.sections.push((name, body));
                }
                ViewCall::Yield(name) => return Ok(Value::String(format!("[{name}]"))),
                ViewCall::Once(_) => return Ok(Value::Bool(true)),
                _ => {}
            }
            Ok(Value::Null)
        }
    }

    fn run_with(source: &str, data: Value, host: &mut Recorder) -> Result<String, EngineError> {
        let program = Program::parse(source).unwrap();
        let data = match data {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Interpreter::new(&data, host).run(&program)
    }

    fn run(source: &str, data: Value) -> String {
        run_with(source, data, &mut Recorder::default()).unwrap()
    }

    #[test]
    fn test_echo_and_escape() {
        assert_eq!(
            run("Hi <%= e($name) %>!", json!({"name": "<Ada>"})),
            "Hi &lt;Ada&gt;!"
        );
    }

    #[test]
    fn test_conditionals() {
        let source = "<% if ($n > 1): %>\nmany\n<% elseif ($n == 1): %>\none\n<% else: %>\nnone\n<% endif; %>\n";
        assert_eq!(run(source, json!({"n": 3})), "many\n");
        assert_eq!(run(source, json!({"n": "1"})), "one\n");
        assert_eq!(run(source, json!({})), "none\n");
    }

    #[test]
    fn test_foreach_with_keys_and_break() {
        let source = "<% foreach ($items as $k => $v): %><% if ($v == 'stop'): break; endif; %><%= $k %>=<%= $v %>;<% endforeach; %>";
        assert_eq!(
            run(source, json!({"items": ["a", "b", "stop", "c"]})),
            "0=a;1=b;"
        );
    }

    #[test]
    fn test_for_and_while() {
        assert_eq!(
            run("<% for ($i = 0; $i < 3; $i++): %><%= $i %><% endfor; %>", json!({})),
            "012"
        );
        assert_eq!(
            run(
                "<% $n = 3; while ($n > 0): %><%= $n-- %><% endwhile; %>",
                json!({})
            ),
            "321"
        );
    }

    #[test]
    fn test_continue_skips_iteration() {
        let source = "<% foreach ([1, 2, 3, 4] as $n): if ($n % 2): continue; endif; %><%= $n %><% endforeach; %>";
        assert_eq!(run(source, json!({})), "24");
    }

    #[test]
    fn test_assignment_paths() {
        let source = "<% $a['x'][] = 1; $a['x'][] = 2; $a['y'] = 'z'; $s = 'a'; $s .= 'b'; %><%= json_encode($a) %> <%= $s %>";
        assert_eq!(run(source, json!({})), r#"{"x":[1,2],"y":"z"} ab"#);
    }

    #[test]
    fn test_short_circuit_and_coalesce() {
        assert_eq!(run("<%= $missing ?? 'd' %>", json!({})), "d");
        assert_eq!(run("<%= $v ?: 'd' %>", json!({"v": "x"})), "x");
        assert_eq!(run("<%= (false && 1 / 0) ? 'y' : 'n' %>", json!({})), "n");
    }

    #[test]
    fn test_view_calls_reach_host() {
        let mut host = Recorder::default();
        let out = run_with(
            "<% $view->section('title'); %>T<% $view->end_section(); %>[<%= $view->yield('x') %>]",
            json!({}),
            &mut host,
        )
        .unwrap();
        assert_eq!(out, "[[x]]");
        assert_eq!(host.sections, vec![("title".to_string(), "T".to_string())]);
    }

    #[test]
    fn test_unbalanced_end_section() {
        let err = run_with("<% $view->end_section(); %>", json!({}), &mut Recorder::default())
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Render(RenderError::State(StateError::UnbalancedEndSection))
        ));
    }

    #[test]
    fn test_unclosed_section() {
        let err = run_with("<% $view->section('a'); %>x", json!({}), &mut Recorder::default())
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Render(RenderError::State(StateError::UnclosedCapture { .. }))
        ));
    }

    #[test]
    fn test_non_view_method_rejected() {
        let err = run_with("<%= $user->delete() %>", json!({}), &mut Recorder::default())
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Script(ExecutionError::UnknownMethod(name)) if name == "delete"
        ));
    }

    #[test]
    fn test_break_outside_loop() {
        let err = run_with("<% break; %>", json!({}), &mut Recorder::default()).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Script(ExecutionError::BreakOutsideLoop("break"))
        ));
    }

    #[test]
    fn test_output_interleaved_capture() {
        let mut out = Output::new();
        out.begin_capture(CaptureKind::Section);
        out.begin_capture(CaptureKind::Push);
        assert_eq!(
            out.end_capture(CaptureKind::Section),
            Err(StateError::InterleavedCapture {
                expected: "section",
                found: "push"
            })
        );
    }
}
