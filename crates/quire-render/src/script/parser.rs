//! Parsing compiled scripts into a [`Program`].
//!
//! Statements inside code tags are parsed one tag at a time into a flat
//! list; block statements (`if (...):`, `foreach (...):`) open a frame on a
//! block stack and their `end*` counterparts close it. Because a block may
//! start in one tag and end several tags later, text and echo segments in
//! between land in whichever block is innermost at that point.

use std::mem;

use serde_json::Value;

use super::ast::{BinaryOp, Expr, Node, Program, UnaryOp};
use super::lexer::{segments, tokenize, Segment, Spanned, Token};
use crate::error::ExecutionError;

type Result<T> = std::result::Result<T, ExecutionError>;

/// Binding power of prefix operators; above every infix operator.
const PREFIX: u8 = 21;

fn syntax(line: usize, message: impl Into<String>) -> ExecutionError {
    ExecutionError::Syntax {
        line,
        message: message.into(),
    }
}

impl Program {
    /// Parses compiled template source.
    pub fn parse(source: &str) -> Result<Self> {
        let mut tree = TreeBuilder::default();
        for segment in segments(source)? {
            match segment {
                Segment::Text(text) => tree.push(Node::Text(text.to_string())),
                Segment::Echo { code, line } => {
                    let mut parser = Parser::new(tokenize(code, line)?, line);
                    let expr = parser.expression()?;
                    parser.skip(";");
                    parser.expect_end()?;
                    tree.push(Node::Echo(expr));
                }
                Segment::Code { code, line } => {
                    let mut parser = Parser::new(tokenize(code, line)?, line);
                    for (stmt, line) in parser.statements()? {
                        tree.apply(stmt, line)?;
                    }
                }
            }
        }
        tree.finish()
    }
}

/// A statement as written inside a code tag, before blocks are assembled.
#[derive(Debug)]
enum Stmt {
    If(Expr),
    ElseIf(Expr),
    Else,
    EndIf,
    Foreach {
        iterable: Expr,
        key: Option<String>,
        value: String,
    },
    EndForeach,
    For {
        init: Vec<Expr>,
        cond: Vec<Expr>,
        step: Vec<Expr>,
    },
    EndFor,
    While(Expr),
    EndWhile,
    Break,
    Continue,
    Echo(Vec<Expr>),
    Expr(Expr),
}

enum BlockKind {
    /// `cond` is `None` once the `else` branch has started.
    If {
        done: Vec<(Expr, Vec<Node>)>,
        cond: Option<Expr>,
    },
    Foreach {
        iterable: Expr,
        key: Option<String>,
        value: String,
    },
    For {
        init: Vec<Expr>,
        cond: Vec<Expr>,
        step: Vec<Expr>,
    },
    While(Expr),
}

impl BlockKind {
    fn opener(&self) -> &'static str {
        match self {
            BlockKind::If { .. } => "if",
            BlockKind::Foreach { .. } => "foreach",
            BlockKind::For { .. } => "for",
            BlockKind::While(_) => "while",
        }
    }
}

struct Block {
    kind: BlockKind,
    body: Vec<Node>,
    line: usize,
}

#[derive(Default)]
struct TreeBuilder {
    root: Vec<Node>,
    open: Vec<Block>,
}

impl TreeBuilder {
    fn push(&mut self, node: Node) {
        match self.open.last_mut() {
            Some(block) => block.body.push(node),
            None => self.root.push(node),
        }
    }

    fn open(&mut self, kind: BlockKind, line: usize) {
        self.open.push(Block {
            kind,
            body: Vec::new(),
            line,
        });
    }

    fn close(&mut self, keyword: &str, line: usize) -> Result<Block> {
        self.open
            .pop()
            .ok_or_else(|| syntax(line, format!("'{keyword}' without an open block")))
    }

    fn mismatch(keyword: &str, block: &Block, line: usize) -> ExecutionError {
        syntax(
            line,
            format!(
                "'{keyword}' cannot close '{}' opened at line {}",
                block.kind.opener(),
                block.line
            ),
        )
    }

    fn branch(&mut self, next: Option<Expr>, line: usize) -> Result<()> {
        let keyword = if next.is_some() { "elseif" } else { "else" };
        let Some(Block {
            kind: BlockKind::If { done, cond },
            body,
            ..
        }) = self.open.last_mut()
        else {
            return Err(syntax(line, format!("'{keyword}' outside of an if block")));
        };
        let Some(current) = cond.take() else {
            return Err(syntax(line, format!("'{keyword}' after else")));
        };
        done.push((current, mem::take(body)));
        *cond = next;
        Ok(())
    }

    fn apply(&mut self, stmt: Stmt, line: usize) -> Result<()> {
        match stmt {
            Stmt::If(cond) => self.open(
                BlockKind::If {
                    done: Vec::new(),
                    cond: Some(cond),
                },
                line,
            ),
            Stmt::ElseIf(cond) => self.branch(Some(cond), line)?,
            Stmt::Else => self.branch(None, line)?,
            Stmt::EndIf => {
                let block = self.close("endif", line)?;
                let BlockKind::If { mut done, cond } = block.kind else {
                    return Err(Self::mismatch("endif", &block, line));
                };
                let otherwise = match cond {
                    Some(cond) => {
                        done.push((cond, block.body));
                        None
                    }
                    None => Some(block.body),
                };
                self.push(Node::If {
                    branches: done,
                    otherwise,
                });
            }
            Stmt::Foreach {
                iterable,
                key,
                value,
            } => self.open(
                BlockKind::Foreach {
                    iterable,
                    key,
                    value,
                },
                line,
            ),
            Stmt::EndForeach => {
                let block = self.close("endforeach", line)?;
                let BlockKind::Foreach {
                    iterable,
                    key,
                    value,
                } = block.kind
                else {
                    return Err(Self::mismatch("endforeach", &block, line));
                };
                self.push(Node::Foreach {
                    iterable,
                    key,
                    value,
                    body: block.body,
                });
            }
            Stmt::For { init, cond, step } => {
                self.open(BlockKind::For { init, cond, step }, line)
            }
            Stmt::EndFor => {
                let block = self.close("endfor", line)?;
                let BlockKind::For { init, cond, step } = block.kind else {
                    return Err(Self::mismatch("endfor", &block, line));
                };
                self.push(Node::For {
                    init,
                    cond,
                    step,
                    body: block.body,
                });
            }
            Stmt::While(cond) => self.open(BlockKind::While(cond), line),
            Stmt::EndWhile => {
                let block = self.close("endwhile", line)?;
                let BlockKind::While(cond) = block.kind else {
                    return Err(Self::mismatch("endwhile", &block, line));
                };
                self.push(Node::While {
                    cond,
                    body: block.body,
                });
            }
            Stmt::Break => self.push(Node::Break),
            Stmt::Continue => self.push(Node::Continue),
            Stmt::Echo(exprs) => {
                for expr in exprs {
                    self.push(Node::Echo(expr));
                }
            }
            Stmt::Expr(expr) => self.push(Node::Expr(expr)),
        }
        Ok(())
    }

    fn finish(self) -> Result<Program> {
        if let Some(block) = self.open.last() {
            return Err(syntax(
                block.line,
                format!("'{}' block is never closed", block.kind.opener()),
            ));
        }
        Ok(Program { nodes: self.root })
    }
}

enum Infix {
    Assign(Option<BinaryOp>),
    Ternary,
    Coalesce,
    Binary(BinaryOp),
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    line: usize,
}

impl Parser {
    fn new(tokens: Vec<Spanned>, line: usize) -> Self {
        Self {
            tokens,
            pos: 0,
            line,
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map_or(self.line, |s| s.line)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|s| s.token.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn error(&self, message: impl Into<String>) -> ExecutionError {
        syntax(self.line(), message)
    }

    fn is_punct(&self, punct: &str) -> bool {
        matches!(self.peek(), Some(Token::Punct(p)) if *p == punct)
    }

    fn skip(&mut self, punct: &str) -> bool {
        if self.is_punct(punct) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, punct: &str) -> Result<()> {
        if self.skip(punct) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{punct}'")))
        }
    }

    fn expect_end(&self) -> Result<()> {
        match self.peek() {
            None => Ok(()),
            Some(token) => Err(self.error(format!("unexpected {}", describe(token)))),
        }
    }

    fn keyword(&self) -> Option<String> {
        match self.peek() {
            Some(Token::Ident(word)) => Some(word.to_ascii_lowercase()),
            _ => None,
        }
    }

    fn variable(&mut self) -> Result<String> {
        match self.advance() {
            Some(Token::Var(name)) => Ok(name),
            _ => Err(self.error("expected a variable")),
        }
    }

    fn identifier(&mut self) -> Result<String> {
        match self.advance() {
            Some(Token::Ident(name)) => Ok(name),
            _ => Err(self.error("expected a name")),
        }
    }

    fn statements(&mut self) -> Result<Vec<(Stmt, usize)>> {
        let mut out = Vec::new();
        loop {
            while self.skip(";") {}
            if self.peek().is_none() {
                break;
            }
            let line = self.line();
            let (stmt, opens_block) = self.statement()?;
            out.push((stmt, line));
            if !opens_block && self.peek().is_some() {
                self.expect(";")?;
            }
        }
        Ok(out)
    }

    /// Parses one statement; the flag is true when it ended with `:`.
    fn statement(&mut self) -> Result<(Stmt, bool)> {
        let Some(keyword) = self.keyword() else {
            return Ok((Stmt::Expr(self.expression()?), false));
        };
        let simple = match keyword.as_str() {
            "endif" => Some(Stmt::EndIf),
            "endforeach" => Some(Stmt::EndForeach),
            "endfor" => Some(Stmt::EndFor),
            "endwhile" => Some(Stmt::EndWhile),
            "break" => Some(Stmt::Break),
            "continue" => Some(Stmt::Continue),
            _ => None,
        };
        if let Some(stmt) = simple {
            self.pos += 1;
            return Ok((stmt, false));
        }

        let stmt = match keyword.as_str() {
            "if" | "elseif" => {
                self.pos += 1;
                let cond = self.parenthesized()?;
                if keyword == "if" {
                    Stmt::If(cond)
                } else {
                    Stmt::ElseIf(cond)
                }
            }
            "else" => {
                self.pos += 1;
                Stmt::Else
            }
            "foreach" => {
                self.pos += 1;
                self.expect("(")?;
                let iterable = self.expression()?;
                if self.keyword().as_deref() != Some("as") {
                    return Err(self.error("expected 'as' in foreach"));
                }
                self.pos += 1;
                let first = self.variable()?;
                let (key, value) = if self.skip("=>") {
                    (Some(first), self.variable()?)
                } else {
                    (None, first)
                };
                self.expect(")")?;
                Stmt::Foreach {
                    iterable,
                    key,
                    value,
                }
            }
            "for" => {
                self.pos += 1;
                self.expect("(")?;
                let init = self.list_until(";")?;
                self.expect(";")?;
                let cond = self.list_until(";")?;
                self.expect(";")?;
                let step = self.list_until(")")?;
                self.expect(")")?;
                Stmt::For { init, cond, step }
            }
            "while" => {
                self.pos += 1;
                Stmt::While(self.parenthesized()?)
            }
            "echo" => {
                self.pos += 1;
                let mut exprs = vec![self.expression()?];
                while self.skip(",") {
                    exprs.push(self.expression()?);
                }
                return Ok((Stmt::Echo(exprs), false));
            }
            _ => return Ok((Stmt::Expr(self.expression()?), false)),
        };
        self.expect(":")?;
        Ok((stmt, true))
    }

    fn parenthesized(&mut self) -> Result<Expr> {
        self.expect("(")?;
        let expr = self.expression()?;
        self.expect(")")?;
        Ok(expr)
    }

    fn list_until(&mut self, end: &str) -> Result<Vec<Expr>> {
        let mut exprs = Vec::new();
        if self.is_punct(end) {
            return Ok(exprs);
        }
        exprs.push(self.expression()?);
        while self.skip(",") {
            exprs.push(self.expression()?);
        }
        Ok(exprs)
    }

    pub(crate) fn expression(&mut self) -> Result<Expr> {
        self.expr_bp(0)
    }

    fn expr_bp(&mut self, min_bp: u8) -> Result<Expr> {
        let mut lhs = self.unary()?;
        while let Some((op, left, right)) = self.infix() {
            if left < min_bp {
                break;
            }
            self.pos += 1;
            lhs = match op {
                Infix::Assign(op) => {
                    if !is_assignable(&lhs) {
                        return Err(self.error("cannot assign to this expression"));
                    }
                    Expr::Assign(Box::new(lhs), op, Box::new(self.expr_bp(right)?))
                }
                Infix::Ternary => {
                    if self.skip(":") {
                        Expr::Ternary(Box::new(lhs), None, Box::new(self.expr_bp(right)?))
                    } else {
                        let then = self.expr_bp(0)?;
                        self.expect(":")?;
                        let otherwise = self.expr_bp(right)?;
                        Expr::Ternary(Box::new(lhs), Some(Box::new(then)), Box::new(otherwise))
                    }
                }
                Infix::Coalesce => Expr::Coalesce(Box::new(lhs), Box::new(self.expr_bp(right)?)),
                Infix::Binary(op) => {
                    Expr::Binary(op, Box::new(lhs), Box::new(self.expr_bp(right)?))
                }
            };
        }
        Ok(lhs)
    }

    fn infix(&self) -> Option<(Infix, u8, u8)> {
        use BinaryOp::*;
        let found = match self.peek()? {
            Token::Punct(p) => match *p {
                "=" => (Infix::Assign(None), 2, 1),
                "+=" => (Infix::Assign(Some(Add)), 2, 1),
                "-=" => (Infix::Assign(Some(Sub)), 2, 1),
                ".=" => (Infix::Assign(Some(Concat)), 2, 1),
                "?" => (Infix::Ternary, 4, 3),
                "??" => (Infix::Coalesce, 6, 5),
                "||" => (Infix::Binary(Or), 7, 8),
                "&&" => (Infix::Binary(And), 9, 10),
                "==" => (Infix::Binary(Eq), 11, 12),
                "!=" => (Infix::Binary(NotEq), 11, 12),
                "===" => (Infix::Binary(Identical), 11, 12),
                "!==" => (Infix::Binary(NotIdentical), 11, 12),
                "<" => (Infix::Binary(Less), 13, 14),
                "<=" => (Infix::Binary(LessEq), 13, 14),
                ">" => (Infix::Binary(Greater), 13, 14),
                ">=" => (Infix::Binary(GreaterEq), 13, 14),
                "." => (Infix::Binary(Concat), 15, 16),
                "+" => (Infix::Binary(Add), 17, 18),
                "-" => (Infix::Binary(Sub), 17, 18),
                "*" => (Infix::Binary(Mul), 19, 20),
                "/" => (Infix::Binary(Div), 19, 20),
                "%" => (Infix::Binary(Mod), 19, 20),
                _ => return None,
            },
            Token::Ident(word) => match word.to_ascii_lowercase().as_str() {
                "or" => (Infix::Binary(Or), 7, 8),
                "and" => (Infix::Binary(And), 9, 10),
                _ => return None,
            },
            _ => return None,
        };
        Some(found)
    }

    fn unary(&mut self) -> Result<Expr> {
        let op = if self.skip("!") {
            Some(UnaryOp::Not)
        } else if self.skip("-") {
            Some(UnaryOp::Neg)
        } else if self.skip("+") {
            Some(UnaryOp::Plus)
        } else {
            None
        };
        if let Some(op) = op {
            return Ok(Expr::Unary(op, Box::new(self.expr_bp(PREFIX)?)));
        }

        let delta = if self.skip("++") {
            Some(1)
        } else if self.skip("--") {
            Some(-1)
        } else {
            None
        };
        if let Some(delta) = delta {
            let target = self.postfix()?;
            if !is_assignable(&target) {
                return Err(self.error("increment target must be a variable"));
            }
            return Ok(Expr::IncDec {
                target: Box::new(target),
                delta,
                prefix: true,
            });
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr> {
        let mut expr = self.primary()?;
        loop {
            if self.skip("[") {
                if self.skip("]") {
                    expr = Expr::Index(Box::new(expr), None);
                    continue;
                }
                let key = self.expression()?;
                self.expect("]")?;
                expr = Expr::Index(Box::new(expr), Some(Box::new(key)));
            } else if self.skip("->") {
                let name = self.identifier()?;
                expr = if self.skip("(") {
                    let args = self.arguments()?;
                    Expr::MethodCall(Box::new(expr), name, args)
                } else {
                    Expr::Prop(Box::new(expr), name)
                };
            } else if is_assignable(&expr) && (self.is_punct("++") || self.is_punct("--")) {
                let delta = if self.skip("++") {
                    1
                } else {
                    self.pos += 1;
                    -1
                };
                expr = Expr::IncDec {
                    target: Box::new(expr),
                    delta,
                    prefix: false,
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    /// Parses call arguments after the opening parenthesis.
    fn arguments(&mut self) -> Result<Vec<Expr>> {
        let mut args = Vec::new();
        if self.skip(")") {
            return Ok(args);
        }
        loop {
            args.push(self.expression()?);
            if self.skip(",") {
                if self.skip(")") {
                    break;
                }
                continue;
            }
            self.expect(")")?;
            break;
        }
        Ok(args)
    }

    fn array(&mut self) -> Result<Expr> {
        let mut entries = Vec::new();
        while !self.skip("]") {
            let first = self.expression()?;
            let entry = if self.skip("=>") {
                (Some(first), self.expression()?)
            } else {
                (None, first)
            };
            entries.push(entry);
            if !self.skip(",") {
                self.expect("]")?;
                break;
            }
        }
        Ok(Expr::Array(entries))
    }

    fn primary(&mut self) -> Result<Expr> {
        let line = self.line();
        match self.advance() {
            Some(Token::Int(i)) => Ok(Expr::Literal(Value::from(i))),
            Some(Token::Float(f)) => Ok(Expr::Literal(
                serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number),
            )),
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Token::Var(name)) => Ok(Expr::Var(name)),
            Some(Token::Ident(word)) => {
                let lower = word.to_ascii_lowercase();
                match lower.as_str() {
                    "true" => Ok(Expr::Literal(Value::Bool(true))),
                    "false" => Ok(Expr::Literal(Value::Bool(false))),
                    "null" => Ok(Expr::Literal(Value::Null)),
                    _ if self.skip("(") => Ok(Expr::Call(lower, self.arguments()?)),
                    _ => Err(syntax(line, format!("unexpected identifier '{word}'"))),
                }
            }
            Some(Token::Punct("(")) => {
                let expr = self.expression()?;
                self.expect(")")?;
                Ok(expr)
            }
            Some(Token::Punct("[")) => self.array(),
            Some(other) => Err(syntax(line, format!("unexpected {}", describe(&other)))),
            None => Err(syntax(line, "unexpected end of expression")),
        }
    }
}

fn is_assignable(expr: &Expr) -> bool {
    match expr {
        Expr::Var(_) => true,
        Expr::Index(base, _) => is_assignable(base),
        _ => false,
    }
}

fn describe(token: &Token) -> String {
    match token {
        Token::Var(name) => format!("variable ${name}"),
        Token::Ident(word) => format!("'{word}'"),
        Token::Int(i) => format!("number {i}"),
        Token::Float(f) => format!("number {f}"),
        Token::Str(_) => "string".to_string(),
        Token::Punct(p) => format!("'{p}'"),
    }
}
