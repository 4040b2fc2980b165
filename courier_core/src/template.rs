//! `${...}` template compiler.
//!
//! A template is literal text with embedded expressions:
//!
//! - `${name}`: variable lookup through the scope chain
//! - `${0}`: positional call argument
//! - `${_it}` / `${_index}`: current element / index while expanding a collection
//! - `${'text'}`, `${42}`, `${true}`: constants
//! - `${user.name}`: property path
//! - `${name | trim | upper}`: inline filters, applied left to right
//!
//! A `$` that is not followed by `{` is literal text.

use std::fmt;
use std::sync::Arc;

use crate::error::{SyntaxErrorReason, TemplateSyntaxError};
use crate::value::Value;

pub const ITEM_VAR: &str = "_it";
pub const INDEX_VAR: &str = "_index";

#[derive(Clone, Debug, PartialEq)]
pub enum Segment {
    Literal(String),
    Variable { source: Source, access: Access },
    Iteration { var: IterVar, access: Access },
}

#[derive(Clone, Debug, PartialEq)]
pub enum Source {
    Name(String),
    Argument(usize),
    Const(Value),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum IterVar {
    Item,
    Index,
}

impl IterVar {
    pub fn name(self) -> &'static str {
        match self {
            IterVar::Item => ITEM_VAR,
            IterVar::Index => INDEX_VAR,
        }
    }
}

/// Property path and inline filters following the expression root.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Access {
    pub path: Vec<String>,
    pub filters: Vec<String>,
}

/// Immutable, cheaply clonable compiled template.
#[derive(Clone)]
pub struct CompiledTemplate {
    source: Arc<str>,
    segments: Arc<[Segment]>,
}

impl CompiledTemplate {
    pub fn empty() -> Self {
        Self {
            source: Arc::from(""),
            segments: Arc::from(Vec::new()),
        }
    }

    #[inline]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[inline]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// The text of a template that contains no expressions.
    pub fn as_literal(&self) -> Option<&str> {
        match &*self.segments {
            [] => Some(""),
            [Segment::Literal(s)] => Some(s),
            _ => None,
        }
    }

    #[inline]
    pub fn is_literal(&self) -> bool {
        self.as_literal().is_some()
    }

    pub fn has_iteration_marker(&self) -> bool {
        self.segments
            .iter()
            .any(|s| matches!(s, Segment::Iteration { .. }))
    }

    pub fn variable_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Variable {
                source: Source::Name(n),
                ..
            } => Some(n.as_str()),
            _ => None,
        })
    }

    pub fn filter_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().flat_map(|s| {
            let filters: &[String] = match s {
                Segment::Literal(_) => &[],
                Segment::Variable { access, .. } | Segment::Iteration { access, .. } => {
                    &access.filters
                }
            };
            filters.iter().map(String::as_str)
        })
    }
}

impl fmt::Debug for CompiledTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CompiledTemplate")
            .field(&&*self.source)
            .finish()
    }
}

impl fmt::Display for CompiledTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

pub fn compile(text: &str) -> Result<CompiledTemplate, TemplateSyntaxError> {
    if text.trim().is_empty() {
        return Ok(CompiledTemplate::empty());
    }
    if !text.contains("${") {
        return Ok(CompiledTemplate {
            source: Arc::from(text),
            segments: Arc::from(vec![Segment::Literal(text.to_string())]),
        });
    }

    let mut segments = Vec::new();
    let mut pos = 0;
    while let Some(rel) = text[pos..].find("${") {
        let open = pos + rel;
        if open > pos {
            segments.push(Segment::Literal(text[pos..open].to_string()));
        }
        let mut cursor = Cursor {
            text,
            pos: open + 2,
            open,
        };
        segments.push(cursor.placeholder()?);
        pos = cursor.pos;
    }
    if pos < text.len() {
        segments.push(Segment::Literal(text[pos..].to_string()));
    }

    Ok(CompiledTemplate {
        source: Arc::from(text),
        segments: Arc::from(segments),
    })
}

struct Cursor<'a> {
    text: &'a str,
    pos: usize,
    open: usize,
}

impl Cursor<'_> {
    fn peek(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn peek2(&self) -> Option<char> {
        let mut it = self.text[self.pos..].chars();
        it.next();
        it.next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn error(&self, reason: SyntaxErrorReason) -> TemplateSyntaxError {
        let position = match reason {
            SyntaxErrorReason::Unterminated => self.open,
            _ => self.pos,
        };
        TemplateSyntaxError {
            template: self.text.to_string(),
            position,
            reason,
        }
    }

    /// Parses from just after `${` through the closing `}`.
    fn placeholder(&mut self) -> Result<Segment, TemplateSyntaxError> {
        self.skip_ws();
        let root = match self.peek() {
            None => return Err(self.error(SyntaxErrorReason::Unterminated)),
            Some('}') => return Err(self.error(SyntaxErrorReason::EmptyVariableName)),
            Some(q @ ('\'' | '"')) => {
                self.bump();
                Root::Source(Source::Const(Value::Text(self.string(q)?)))
            }
            Some(c) if c.is_ascii_digit() || c == '-' => self.number()?,
            Some(c) if is_ident_start(c) => {
                let ident = self.ident();
                match ident {
                    ITEM_VAR => Root::Iter(IterVar::Item),
                    INDEX_VAR => Root::Iter(IterVar::Index),
                    "true" => Root::Source(Source::Const(Value::Bool(true))),
                    "false" => Root::Source(Source::Const(Value::Bool(false))),
                    "null" => Root::Source(Source::Const(Value::Null)),
                    name => Root::Source(Source::Name(name.to_string())),
                }
            }
            Some(c) => return Err(self.error(SyntaxErrorReason::UnexpectedChar(c))),
        };

        let mut access = Access::default();
        loop {
            self.skip_ws();
            if self.peek() != Some('.') {
                break;
            }
            self.bump();
            self.skip_ws();
            match self.peek() {
                Some(c) if is_ident_start(c) || c.is_ascii_digit() => {
                    let p = self.ident();
                    access.path.push(p.to_string());
                }
                _ => return Err(self.error(SyntaxErrorReason::EmptyPropertyName)),
            }
        }
        loop {
            self.skip_ws();
            if self.peek() != Some('|') {
                break;
            }
            self.bump();
            self.skip_ws();
            match self.peek() {
                Some(c) if is_ident_start(c) => {
                    let f = self.ident();
                    access.filters.push(f.to_string());
                }
                _ => return Err(self.error(SyntaxErrorReason::EmptyFilterName)),
            }
        }
        self.skip_ws();
        match self.bump() {
            Some('}') => {}
            None => return Err(self.error(SyntaxErrorReason::Unterminated)),
            Some(c) => {
                self.pos -= c.len_utf8();
                return Err(self.error(SyntaxErrorReason::UnexpectedChar(c)));
            }
        }

        Ok(match root {
            Root::Source(source) => Segment::Variable { source, access },
            Root::Iter(var) => Segment::Iteration { var, access },
        })
    }

    fn ident(&mut self) -> &str {
        let start = self.pos;
        while self.peek().is_some_and(is_ident_char) {
            self.bump();
        }
        &self.text[start..self.pos]
    }

    fn string(&mut self, quote: char) -> Result<String, TemplateSyntaxError> {
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error(SyntaxErrorReason::UnterminatedString)),
                Some('\\') => match self.bump() {
                    Some(c) => out.push(c),
                    None => return Err(self.error(SyntaxErrorReason::UnterminatedString)),
                },
                Some(c) if c == quote => return Ok(out),
                Some(c) => out.push(c),
            }
        }
    }

    /// Unsigned integers are argument positions; signed or fractional
    /// numbers are constants.
    fn number(&mut self) -> Result<Root, TemplateSyntaxError> {
        let start = self.pos;
        let negative = self.peek() == Some('-');
        if negative {
            self.bump();
        }
        let digits_start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
        }
        if self.pos == digits_start {
            return Err(self.error(SyntaxErrorReason::InvalidNumber));
        }
        let mut fractional = false;
        if self.peek() == Some('.') && self.peek2().is_some_and(|c| c.is_ascii_digit()) {
            fractional = true;
            self.bump();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.bump();
            }
        }
        let lit = &self.text[start..self.pos];
        let invalid = |c: &Self| c.error(SyntaxErrorReason::InvalidNumber);
        Ok(if fractional {
            let f = lit.parse::<f64>().map_err(|_| invalid(self))?;
            Root::Source(Source::Const(Value::Float(f)))
        } else if negative {
            let n = lit.parse::<i64>().map_err(|_| invalid(self))?;
            Root::Source(Source::Const(Value::Int(n)))
        } else {
            let idx = lit.parse::<usize>().map_err(|_| invalid(self))?;
            Root::Source(Source::Argument(idx))
        })
    }
}

enum Root {
    Source(Source),
    Iter(IterVar),
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-'
}

#[cfg(test)]
mod test {
    use super::*;

    fn var(name: &str) -> Segment {
        Segment::Variable {
            source: Source::Name(name.into()),
            access: Access::default(),
        }
    }

    #[test]
    fn literal_templates_take_fast_path() {
        let t = compile("/hello/user").unwrap();
        assert_eq!(t.as_literal(), Some("/hello/user"));
        let t = compile("cost: $5").unwrap();
        assert!(t.is_literal());
    }

    #[test]
    fn blank_template_has_no_segments() {
        assert!(compile("").unwrap().is_empty());
        assert!(compile("   ").unwrap().is_empty());
    }

    #[test]
    fn mixed_literals_and_variables() {
        let t = compile("/users/${id}/posts?q=${ term }").unwrap();
        assert_eq!(
            t.segments(),
            &[
                Segment::Literal("/users/".into()),
                var("id"),
                Segment::Literal("/posts?q=".into()),
                var("term"),
            ]
        );
        assert_eq!(t.variable_names().collect::<Vec<_>>(), vec!["id", "term"]);
    }

    #[test]
    fn positional_paths_and_filters() {
        let t = compile("${0.name | trim | upper}").unwrap();
        assert_eq!(
            t.segments(),
            &[Segment::Variable {
                source: Source::Argument(0),
                access: Access {
                    path: vec!["name".into()],
                    filters: vec!["trim".into(), "upper".into()],
                },
            }]
        );
        assert_eq!(t.filter_names().collect::<Vec<_>>(), vec!["trim", "upper"]);
    }

    #[test]
    fn constants() {
        let t = compile("${'a}b'}${1.5}${-2}${true}").unwrap();
        let consts: Vec<_> = t
            .segments()
            .iter()
            .map(|s| match s {
                Segment::Variable {
                    source: Source::Const(v),
                    ..
                } => v.clone(),
                other => panic!("unexpected segment {other:?}"),
            })
            .collect();
        assert_eq!(
            consts,
            vec![
                Value::Text("a}b".into()),
                Value::Float(1.5),
                Value::Int(-2),
                Value::Bool(true),
            ]
        );
    }

    #[test]
    fn iteration_markers_are_detected() {
        let t = compile("username_${_index}").unwrap();
        assert!(t.has_iteration_marker());
        let t = compile("${_it.name}").unwrap();
        assert_eq!(
            t.segments(),
            &[Segment::Iteration {
                var: IterVar::Item,
                access: Access {
                    path: vec!["name".into()],
                    filters: vec![],
                },
            }]
        );
        assert!(!compile("${items}").unwrap().has_iteration_marker());
    }

    #[test]
    fn unterminated_expression_reports_open_position() {
        let e = compile("/a/${id").unwrap_err();
        assert_eq!(e.reason, SyntaxErrorReason::Unterminated);
        assert_eq!(e.position, 3);
    }

    #[test]
    fn empty_expression_is_rejected() {
        let e = compile("x${ }").unwrap_err();
        assert_eq!(e.reason, SyntaxErrorReason::EmptyVariableName);
        let e = compile("${a |}").unwrap_err();
        assert_eq!(e.reason, SyntaxErrorReason::EmptyFilterName);
        let e = compile("${a b}").unwrap_err();
        assert_eq!(e.reason, SyntaxErrorReason::UnexpectedChar('b'));
    }
}
