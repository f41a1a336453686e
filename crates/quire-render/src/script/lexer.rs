//! Tag splitting and tokenization.
//!
//! A compiled template is literal text interleaved with `<% code %>` and
//! `<%= expr %>` tags. [`segments`] splits the text at tag boundaries and
//! [`tokenize`] turns the code inside a tag into tokens.

use crate::error::ExecutionError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Segment<'a> {
    Text(&'a str),
    Echo { code: &'a str, line: usize },
    Code { code: &'a str, line: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Var(String),
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    Punct(&'static str),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Spanned {
    pub token: Token,
    pub line: usize,
}

/// Longest first so `===` wins over `==` and `=`.
const PUNCTUATION: &[&str] = &[
    "===", "!==", "??", "->", "=>", "==", "!=", "<=", ">=", "&&", "||", "++", "--", "+=", "-=",
    ".=", "(", ")", "[", "]", ",", ";", ":", "?", "=", "+", "-", "*", "/", "%", ".", "!", "<",
    ">",
];

fn syntax(line: usize, message: impl Into<String>) -> ExecutionError {
    ExecutionError::Syntax {
        line,
        message: message.into(),
    }
}

/// Splits compiled source into text and tag segments.
///
/// A single newline directly after a statement tag is swallowed so block
/// statements on their own line leave no blank lines behind. Echo tags keep
/// the newline.
pub(crate) fn segments(source: &str) -> Result<Vec<Segment<'_>>, ExecutionError> {
    let mut out = Vec::new();
    let mut pos = 0;
    let mut line = 1;
    while let Some(found) = source[pos..].find("<%") {
        let start = pos + found;
        if start > pos {
            out.push(Segment::Text(&source[pos..start]));
        }
        line += source[pos..start].matches('\n').count();

        let echo = source[start + 2..].starts_with('=');
        let code_start = start + if echo { 3 } else { 2 };
        let code_end =
            find_tag_end(source, code_start).ok_or_else(|| syntax(line, "unterminated tag"))?;
        let code = &source[code_start..code_end];
        out.push(if echo {
            Segment::Echo { code, line }
        } else {
            Segment::Code { code, line }
        });
        line += code.matches('\n').count();

        pos = code_end + 2;
        if !echo && source[pos..].starts_with('\n') {
            pos += 1;
            line += 1;
        } else if !echo && source[pos..].starts_with("\r\n") {
            pos += 2;
            line += 1;
        }
    }
    if pos < source.len() {
        out.push(Segment::Text(&source[pos..]));
    }
    Ok(out)
}

/// Finds the `%>` closing a tag, ignoring any inside string literals.
fn find_tag_end(source: &str, from: usize) -> Option<usize> {
    let bytes = source.as_bytes();
    let mut quote: Option<u8> = None;
    let mut i = from;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == b'\\' {
                    i += 1;
                } else if b == q {
                    quote = None;
                }
            }
            None => {
                if b == b'\'' || b == b'"' {
                    quote = Some(b);
                } else if b == b'%' && bytes.get(i + 1) == Some(&b'>') {
                    return Some(i);
                }
            }
        }
        i += 1;
    }
    None
}

/// Tokenizes the code inside one tag.
pub(crate) fn tokenize(code: &str, first_line: usize) -> Result<Vec<Spanned>, ExecutionError> {
    let chars: Vec<char> = code.chars().collect();
    let mut tokens = Vec::new();
    let mut line = first_line;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c == '\n' {
            line += 1;
            i += 1;
            continue;
        }
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c == '/' && chars.get(i + 1) == Some(&'/') {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
            continue;
        }
        if c == '/' && chars.get(i + 1) == Some(&'*') {
            i += 2;
            while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                if chars[i] == '\n' {
                    line += 1;
                }
                i += 1;
            }
            i += 2;
            continue;
        }

        let token = if c == '$' {
            let start = i + 1;
            i = scan_ident(&chars, start);
            if i == start {
                return Err(syntax(line, "expected variable name after '$'"));
            }
            Token::Var(chars[start..i].iter().collect())
        } else if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            i = scan_ident(&chars, start);
            Token::Ident(chars[start..i].iter().collect())
        } else if c.is_ascii_digit() {
            let (token, next) = scan_number(&chars, i, line)?;
            i = next;
            token
        } else if c == '\'' || c == '"' {
            let (text, next, lines) = scan_string(&chars, i, line)?;
            i = next;
            line += lines;
            Token::Str(text)
        } else {
            let rest: String = chars[i..chars.len().min(i + 3)].iter().collect();
            let punct = PUNCTUATION
                .iter()
                .find(|p| rest.starts_with(**p))
                .ok_or_else(|| syntax(line, format!("unexpected character '{c}'")))?;
            i += punct.chars().count();
            Token::Punct(*punct)
        };
        tokens.push(Spanned { token, line });
    }
    Ok(tokens)
}

fn scan_ident(chars: &[char], mut i: usize) -> usize {
    while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
        i += 1;
    }
    i
}

fn scan_number(chars: &[char], start: usize, line: usize) -> Result<(Token, usize), ExecutionError> {
    let mut i = start;
    while i < chars.len() && chars[i].is_ascii_digit() {
        i += 1;
    }
    let is_float =
        chars.get(i) == Some(&'.') && chars.get(i + 1).is_some_and(|c| c.is_ascii_digit());
    if is_float {
        i += 1;
        while i < chars.len() && chars[i].is_ascii_digit() {
            i += 1;
        }
    }
    let text: String = chars[start..i].iter().collect();
    let token = if is_float {
        text.parse().map(Token::Float).ok()
    } else {
        text.parse().map(Token::Int).ok()
    };
    token
        .map(|t| (t, i))
        .ok_or_else(|| syntax(line, format!("invalid number '{text}'")))
}

/// Scans a quoted string starting at `start`; returns text, next index and
/// the number of newlines consumed.
fn scan_string(
    chars: &[char],
    start: usize,
    line: usize,
) -> Result<(String, usize, usize), ExecutionError> {
    let quote = chars[start];
    let mut text = String::new();
    let mut lines = 0;
    let mut i = start + 1;
    while i < chars.len() {
        let c = chars[i];
        if c == quote {
            return Ok((text, i + 1, lines));
        }
        if c == '\n' {
            lines += 1;
        }
        if c == '\\' {
            if let Some(&next) = chars.get(i + 1) {
                let escaped = match (quote, next) {
                    (_, '\\') => Some('\\'),
                    (q, n) if n == q => Some(q),
                    ('"', 'n') => Some('\n'),
                    ('"', 't') => Some('\t'),
                    ('"', 'r') => Some('\r'),
                    ('"', '$') => Some('$'),
                    _ => None,
                };
                if let Some(escaped) = escaped {
                    text.push(escaped);
                    i += 2;
                    continue;
                }
            }
        }
        text.push(c);
        i += 1;
    }
    Err(syntax(line, "unterminated string literal"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(code: &str) -> Vec<Token> {
        tokenize(code, 1)
            .unwrap()
            .into_iter()
            .map(|s| s.token)
            .collect()
    }

    #[test]
    fn test_segments_split_tags() {
        let segs = segments("a<%= $x %>b<% if ($y): %>\nc").unwrap();
        assert_eq!(
            segs,
            vec![
                Segment::Text("a"),
                Segment::Echo {
                    code: " $x ",
                    line: 1
                },
                Segment::Text("b"),
                Segment::Code {
                    code: " if ($y): ",
                    line: 1
                },
                Segment::Text("c"),
            ]
        );
    }

    #[test]
    fn test_segments_ignore_close_inside_string() {
        let segs = segments("<%= '%>' %>").unwrap();
        assert_eq!(
            segs,
            vec![Segment::Echo {
                code: " '%>' ",
                line: 1
            }]
        );
    }

    #[test]
    fn test_segments_unterminated() {
        assert!(matches!(
            segments("x\n<% if"),
            Err(ExecutionError::Syntax { line: 2, .. })
        ));
    }

    #[test]
    fn test_echo_keeps_newline() {
        let segs = segments("<%= 1 %>\n").unwrap();
        assert_eq!(segs.last(), Some(&Segment::Text("\n")));
    }

    #[test]
    fn test_tokenize_operators() {
        assert_eq!(
            kinds("$a === 1.5 ?? 'x' . \"y\\n\""),
            vec![
                Token::Var("a".into()),
                Token::Punct("==="),
                Token::Float(1.5),
                Token::Punct("??"),
                Token::Str("x".into()),
                Token::Punct("."),
                Token::Str("y\n".into()),
            ]
        );
    }

    #[test]
    fn test_tokenize_method_call_and_comment() {
        assert_eq!(
            kinds("$view->yield('a') // trailing"),
            vec![
                Token::Var("view".into()),
                Token::Punct("->"),
                Token::Ident("yield".into()),
                Token::Punct("("),
                Token::Str("a".into()),
                Token::Punct(")"),
            ]
        );
    }

    #[test]
    fn test_single_quote_escapes() {
        assert_eq!(kinds(r"'it\'s \n'"), vec![Token::Str(r"it's \n".into())]);
    }
}
