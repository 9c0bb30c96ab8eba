//! Parsing of the expression forms the engine submits for evaluation
//!
//! Two layers:
//!
//! - a scope prefix, `@g<goroutine>f<frame>d<deferred> <expr>`, which pins an
//!   expression to a specific scope regardless of the current selection
//! - the access path itself, limited to what the engine synthesizes:
//!
//! ```text
//! expr    := '*' expr | postfix
//! postfix := primary ( '.' ident | '[' int ']' | '[' int ':' ']' )*
//! primary := ident | '(' expr ')' | '(' '*' "type" ')' '(' int ')'
//! ```

use super::EvalScope;
use crate::errors::EvalError;

/// Scope components named by an `@...` prefix; missing parts keep the
/// current scope's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScopePrefix {
    pub goroutine_id: Option<i64>,
    pub frame: Option<i32>,
    pub deferred_call: Option<i32>,
}

impl ScopePrefix {
    pub fn apply(self, base: EvalScope) -> EvalScope {
        EvalScope {
            goroutine_id: self.goroutine_id.unwrap_or(base.goroutine_id),
            frame: self.frame.unwrap_or(base.frame),
            deferred_call: self.deferred_call.unwrap_or(base.deferred_call),
        }
    }
}

/// Split an optional scope prefix from the expression.
///
/// A malformed prefix is not an error: the whole text is returned as the
/// expression and the service will report what it cannot parse.
pub fn parse_scoped(text: &str) -> (Option<ScopePrefix>, &str) {
    let Some(rest) = text.strip_prefix('@') else {
        return (None, text);
    };
    let Some((prefix, expr)) = rest.split_once(char::is_whitespace) else {
        return (None, text);
    };

    let mut scope = ScopePrefix::default();
    let mut chars = prefix.char_indices().peekable();
    while let Some((start, tag)) = chars.next() {
        let digits_start = start + tag.len_utf8();
        let mut end = digits_start;
        while let Some(&(i, c)) = chars.peek() {
            if c.is_ascii_digit() || (c == '-' && i == digits_start) {
                end = i + c.len_utf8();
                chars.next();
            } else {
                break;
            }
        }
        let digits = &prefix[digits_start..end];
        let ok = match tag {
            'g' => digits.parse().map(|n| scope.goroutine_id = Some(n)).is_ok(),
            'f' => digits.parse().map(|n| scope.frame = Some(n)).is_ok(),
            'd' => digits.parse().map(|n| scope.deferred_call = Some(n)).is_ok(),
            _ => false,
        };
        if !ok {
            return (None, text);
        }
    }
    (Some(scope), expr.trim_start())
}

/// Prefix `expr` so it always evaluates in `scope`
pub fn pin(scope: EvalScope, expr: &str) -> String {
    let (_, bare) = parse_scoped(expr);
    format!(
        "@g{}f{}d{} {}",
        scope.goroutine_id, scope.frame, scope.deferred_call, bare
    )
}

pub fn is_pinned(expr: &str) -> bool {
    parse_scoped(expr).0.is_some()
}

/// Parsed access path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Path {
    Ident(String),
    Field(Box<Path>, String),
    Index(Box<Path>, i64),
    /// `base[n:]`
    Tail(Box<Path>, i64),
    Deref(Box<Path>),
    /// `(*"T")(addr)`: a pointer of type `*T` to `addr`
    TypedAddr { type_name: String, addr: u64 },
}

pub fn parse_path(expr: &str) -> Result<Path, EvalError> {
    let mut parser = PathParser {
        src: expr,
        bytes: expr.as_bytes(),
        pos: 0,
    };
    let path = parser.expr()?;
    parser.skip_ws();
    if parser.pos != parser.bytes.len() {
        return Err(parser.error("unexpected trailing input"));
    }
    Ok(path)
}

struct PathParser<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> PathParser<'a> {
    fn error(&self, message: &str) -> EvalError {
        EvalError::Syntax {
            expr: self.src.to_string(),
            message: format!("{} at offset {}", message, self.pos),
        }
    }

    fn skip_ws(&mut self) {
        while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<u8> {
        self.skip_ws();
        self.bytes.get(self.pos).copied()
    }

    fn eat(&mut self, b: u8) -> bool {
        if self.peek() == Some(b) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, b: u8) -> Result<(), EvalError> {
        if self.eat(b) {
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", b as char)))
        }
    }

    fn expr(&mut self) -> Result<Path, EvalError> {
        if self.eat(b'*') {
            return Ok(Path::Deref(Box::new(self.expr()?)));
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Path, EvalError> {
        let mut path = self.primary()?;
        loop {
            if self.eat(b'.') {
                let field = self.ident()?;
                path = Path::Field(Box::new(path), field);
            } else if self.eat(b'[') {
                let n = self.integer()?;
                if self.eat(b':') {
                    self.expect(b']')?;
                    path = Path::Tail(Box::new(path), n as i64);
                } else {
                    self.expect(b']')?;
                    path = Path::Index(Box::new(path), n as i64);
                }
            } else {
                return Ok(path);
            }
        }
    }

    fn primary(&mut self) -> Result<Path, EvalError> {
        if self.eat(b'(') {
            let save = self.pos;
            if self.eat(b'*') && self.peek() == Some(b'"') {
                let type_name = self.string()?;
                self.expect(b')')?;
                self.expect(b'(')?;
                let addr = self.integer()?;
                self.expect(b')')?;
                return Ok(Path::TypedAddr { type_name, addr });
            }
            self.pos = save;
            let inner = self.expr()?;
            self.expect(b')')?;
            return Ok(inner);
        }
        Ok(Path::Ident(self.ident()?))
    }

    fn ident(&mut self) -> Result<String, EvalError> {
        self.skip_ws();
        let start = self.pos;
        while self.pos < self.bytes.len() {
            let b = self.bytes[self.pos];
            if b.is_ascii_alphanumeric() || b == b'_' || b >= 0x80 {
                self.pos += 1;
            } else {
                break;
            }
        }
        if start == self.pos || self.bytes[start].is_ascii_digit() {
            return Err(self.error("expected identifier"));
        }
        Ok(self.src[start..self.pos].to_string())
    }

    fn integer(&mut self) -> Result<u64, EvalError> {
        self.skip_ws();
        let rest = &self.src[self.pos..];
        let (digits, radix, skip) = match rest.strip_prefix("0x") {
            Some(hex) => (hex, 16, 2),
            None => (rest, 10, 0),
        };
        let len = digits
            .bytes()
            .take_while(|b| b.is_ascii_hexdigit() && (radix == 16 || b.is_ascii_digit()))
            .count();
        if len == 0 {
            return Err(self.error("expected integer"));
        }
        let n = u64::from_str_radix(&digits[..len], radix)
            .map_err(|_| self.error("integer out of range"))?;
        self.pos += skip + len;
        Ok(n)
    }

    fn string(&mut self) -> Result<String, EvalError> {
        self.expect(b'"')?;
        let mut out = String::new();
        let mut chars = self.src[self.pos..].char_indices();
        while let Some((i, c)) = chars.next() {
            match c {
                '"' => {
                    self.pos += i + 1;
                    return Ok(out);
                }
                '\\' => match chars.next() {
                    Some((_, 'n')) => out.push('\n'),
                    Some((_, 't')) => out.push('\t'),
                    Some((_, e)) => out.push(e),
                    None => break,
                },
                c => out.push(c),
            }
        }
        Err(self.error("unterminated string"))
    }
}
