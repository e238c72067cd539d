//! The `erb` renderer: a small embedded-template language.
//!
//! # Syntax
//!
//! | Tag | Meaning |
//! |-----|---------|
//! | `<%= expr %>` | print `expr` |
//! | `<%= call(...) do %> … <% end %>` | print a call that receives the enclosed block |
//! | `<% if expr %> … <% else %> … <% end %>` | conditional; `nil` and `false` are falsy |
//! | `<% for name in expr %> … <% end %>` | loop over an array |
//! | `<% capture name %> … <% end %>` | render the enclosed block into `name` instead of the output |
//! | `<%# … %>` | comment |
//! | `<%%` | a literal `<%` |
//!
//! Statement tags (everything except `<%=`) that sit alone on a line take
//! their indentation and line break with them. A `-%>` closer drops the
//! line break after any tag.
//!
//! # Expressions
//!
//! Literals (`"str"`, `'str'`, `:sym`, `42`, `1.5`, `true`, `false`, `nil`),
//! names, `.field`, `[key]`, calls `name(a, b)`, `==`, `!=` and prefix `!`.
//!
//! Names resolve to, in order: variables bound by `for`/`capture`; the
//! built-ins `routes`, `assets`, `contents`, `layouts`, `locals`,
//! `frontmatter`, `input` and `yield`; keys of `input`.
//!
//! ```text
//! <link rel="stylesheet" href="<%= assets["application.css"].url_path %>">
//! <a href="<%= routes["/about/"].url_path %>"><%= h(input.title) %></a>
//! <%= render(layouts["_card.html.erb"]) do %>inside the card<% end %>
//! ```
//!
//! Built-in calls are `render(blob)` / `render(blob, layout)`, `h(x)` (HTML
//! escaping) and `json(x)`. Any other call goes to the view context's
//! helpers.
//!
//! # Compilation
//!
//! Templates are parsed into a node tree once per view context and cached
//! under [`cache_key`]: the SHA-256 of the source, disambiguated by the
//! originating path.

use super::{BlobRef, Block, RenderError, Renderer, ViewContext};
use crate::blob::{HasInputPath, Renderable, Routable};
use serde_json::{Map, Number, Value};
use sha2::{Digest, Sha256};
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, Copy, Default)]
pub struct ErbRenderer;

impl ErbRenderer {
    pub fn new() -> Self {
        Self
    }
}

impl Renderer for ErbRenderer {
    fn name(&self) -> &str {
        "erb"
    }

    fn render(
        &self,
        source: &str,
        view: &ViewContext<'_>,
        path: Option<&Path>,
        block: Option<Block<'_>>,
    ) -> Result<String, RenderError> {
        let key = cache_key(source, path);
        let template = view.compiled_template(&key, || Template::compile(source, path))?;
        template.render(view, block)
    }
}

/// Key under which a compiled template is cached.
pub fn cache_key(source: &str, path: Option<&Path>) -> String {
    let digest = format!("{:x}", Sha256::digest(source.as_bytes()));
    match path {
        Some(path) => {
            let path: String = path
                .to_string_lossy()
                .chars()
                .map(|c| if c.is_ascii_alphabetic() { c } else { '_' })
                .collect();
            format!("_{digest}__{path}")
        }
        None => format!("_{digest}"),
    }
}

fn syntax(origin: &str, message: impl Into<String>) -> RenderError {
    RenderError::Syntax {
        path: origin.to_string(),
        message: message.into(),
    }
}

// ============================================================================
// Compiled template
// ============================================================================

#[derive(Debug)]
pub struct Template {
    nodes: Vec<Node>,
}

#[derive(Debug)]
enum Node {
    Text(String),
    Output(Expr),
    OutputBlock {
        name: String,
        args: Vec<Expr>,
        body: Vec<Node>,
    },
    If {
        cond: Expr,
        then: Vec<Node>,
        otherwise: Vec<Node>,
    },
    For {
        var: String,
        iterable: Expr,
        body: Vec<Node>,
    },
    Capture {
        var: String,
        body: Vec<Node>,
    },
}

impl Template {
    pub fn compile(source: &str, path: Option<&Path>) -> Result<Self, RenderError> {
        let origin = path.map_or_else(
            || "<template>".to_string(),
            |p| p.display().to_string(),
        );
        let tokens = scan(source, &origin)?;
        let mut parser = NodeParser {
            tokens: &tokens,
            pos: 0,
            origin: &origin,
        };
        match parser.block()? {
            (nodes, None) => Ok(Self { nodes }),
            (_, Some(Closer::End)) => Err(syntax(&origin, "unexpected <% end %>")),
            (_, Some(Closer::Else)) => Err(syntax(&origin, "unexpected <% else %>")),
        }
    }

    pub fn render(
        &self,
        view: &ViewContext<'_>,
        block: Option<Block<'_>>,
    ) -> Result<String, RenderError> {
        let evaluator = Evaluator { view, block };
        let mut out = String::new();
        evaluator.exec(&self.nodes, &Scope::root(), &mut out)?;
        Ok(out)
    }
}

// ============================================================================
// Scanning
// ============================================================================

#[derive(Debug)]
enum Token<'s> {
    Text(String),
    Output(&'s str),
    Code(&'s str),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum TagKind {
    Output,
    Code,
    Comment,
}

fn scan<'s>(source: &'s str, origin: &str) -> Result<Vec<Token<'s>>, RenderError> {
    let mut tokens = Vec::new();
    let mut text = String::new();
    // Whether `text` begins at the start of a line.
    let mut at_line_start = true;
    let mut pos = 0;

    while let Some(offset) = source[pos..].find("<%") {
        let start = pos + offset;
        text.push_str(&source[pos..start]);

        let open_end = start + 2;
        if source[open_end..].starts_with('%') {
            text.push_str("<%");
            pos = open_end + 1;
            continue;
        }

        let close = source[open_end..].find("%>").ok_or_else(|| {
            let line = source[..start].matches('\n').count() + 1;
            syntax(origin, format!("unclosed <% tag on line {line}"))
        })?;
        let mut inner = &source[open_end..open_end + close];
        let mut end = open_end + close + 2;

        let trim_marker = inner.ends_with('-');
        if trim_marker {
            inner = &inner[..inner.len() - 1];
        }
        let kind = match inner.as_bytes().first() {
            Some(b'=') => TagKind::Output,
            Some(b'#') => TagKind::Comment,
            _ => TagKind::Code,
        };

        let line_tail = text.rfind('\n').map_or(0, |i| i + 1);
        let alone = (at_line_start || line_tail > 0)
            && text[line_tail..].bytes().all(|b| b == b' ' || b == b'\t');

        match rest_of_line(&source[end..]) {
            Some(skip) if kind != TagKind::Output && alone => {
                text.truncate(line_tail);
                end += skip;
                at_line_start = true;
            }
            Some(skip) if trim_marker => {
                end += skip;
                at_line_start = true;
            }
            _ => at_line_start = false,
        }

        if !text.is_empty() {
            tokens.push(Token::Text(std::mem::take(&mut text)));
        }
        match kind {
            TagKind::Output => tokens.push(Token::Output(&inner[1..])),
            TagKind::Code => tokens.push(Token::Code(inner)),
            TagKind::Comment => {}
        }
        pos = end;
    }

    text.push_str(&source[pos..]);
    if !text.is_empty() {
        tokens.push(Token::Text(text));
    }
    Ok(tokens)
}

/// Bytes up to and including the line break when only blanks follow.
fn rest_of_line(rest: &str) -> Option<usize> {
    let blanks = rest.len() - rest.trim_start_matches([' ', '\t']).len();
    let after = &rest[blanks..];
    if after.starts_with("\r\n") {
        Some(blanks + 2)
    } else if after.starts_with('\n') {
        Some(blanks + 1)
    } else if after.is_empty() {
        Some(blanks)
    } else {
        None
    }
}

// ============================================================================
// Node parsing
// ============================================================================

#[derive(Debug, PartialEq)]
enum Closer {
    End,
    Else,
}

struct NodeParser<'t, 's> {
    tokens: &'t [Token<'s>],
    pos: usize,
    origin: &'t str,
}

impl NodeParser<'_, '_> {
    fn block(&mut self) -> Result<(Vec<Node>, Option<Closer>), RenderError> {
        let mut nodes = Vec::new();
        while let Some(token) = self.tokens.get(self.pos) {
            self.pos += 1;
            match token {
                Token::Text(text) => nodes.push(Node::Text(text.clone())),
                Token::Output(code) => {
                    let code = code.trim();
                    match strip_do(code) {
                        Some(head) => {
                            let Expr::Call(name, args) = self.expr(head)? else {
                                return Err(syntax(
                                    self.origin,
                                    format!("only calls take a block: {code}"),
                                ));
                            };
                            let body = self.closed_block(code)?;
                            nodes.push(Node::OutputBlock { name, args, body });
                        }
                        None => nodes.push(Node::Output(self.expr(code)?)),
                    }
                }
                Token::Code(code) => match code.trim() {
                    "" => {}
                    "end" => return Ok((nodes, Some(Closer::End))),
                    "else" => return Ok((nodes, Some(Closer::Else))),
                    statement => nodes.push(self.statement(statement)?),
                },
            }
        }
        Ok((nodes, None))
    }

    fn closed_block(&mut self, opener: &str) -> Result<Vec<Node>, RenderError> {
        match self.block()? {
            (body, Some(Closer::End)) => Ok(body),
            (_, Some(Closer::Else)) => Err(syntax(
                self.origin,
                format!("unexpected <% else %> in `{opener}`"),
            )),
            (_, None) => Err(syntax(
                self.origin,
                format!("missing <% end %> for `{opener}`"),
            )),
        }
    }

    fn statement(&mut self, code: &str) -> Result<Node, RenderError> {
        if let Some(cond) = keyword(code, "if") {
            let cond = self.expr(cond)?;
            let (then, closer) = self.block()?;
            let otherwise = match closer {
                Some(Closer::End) => Vec::new(),
                Some(Closer::Else) => self.closed_block(code)?,
                None => {
                    return Err(syntax(
                        self.origin,
                        format!("missing <% end %> for `{code}`"),
                    ));
                }
            };
            return Ok(Node::If {
                cond,
                then,
                otherwise,
            });
        }

        if let Some(rest) = keyword(code, "for") {
            let (var, iterable) = rest.split_once(" in ").ok_or_else(|| {
                syntax(self.origin, format!("expected `for NAME in EXPR`: {code}"))
            })?;
            let var = self.identifier(var.trim())?;
            let iterable = self.expr(iterable)?;
            let body = self.closed_block(code)?;
            return Ok(Node::For {
                var,
                iterable,
                body,
            });
        }

        if let Some(rest) = keyword(code, "capture") {
            let var = self.identifier(strip_do(rest).unwrap_or(rest))?;
            let body = self.closed_block(code)?;
            return Ok(Node::Capture { var, body });
        }

        Err(syntax(self.origin, format!("unsupported statement: {code}")))
    }

    fn identifier(&self, name: &str) -> Result<String, RenderError> {
        let mut chars = name.chars();
        let valid = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
        if valid {
            Ok(name.to_string())
        } else {
            Err(syntax(self.origin, format!("invalid name: {name:?}")))
        }
    }

    fn expr(&self, code: &str) -> Result<Expr, RenderError> {
        parse_expr(code).map_err(|message| syntax(self.origin, format!("{message} in `{code}`")))
    }
}

fn keyword<'c>(code: &'c str, word: &str) -> Option<&'c str> {
    code.strip_prefix(word)
        .filter(|rest| rest.starts_with(char::is_whitespace))
        .map(str::trim)
}

fn strip_do(code: &str) -> Option<&str> {
    code.strip_suffix("do")
        .filter(|head| head.ends_with(|c: char| c.is_whitespace() || c == ')'))
        .map(str::trim)
}

// ============================================================================
// Expressions
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Literal(Value),
    Name(String),
    Yield,
    Field(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
    Not(Box<Expr>),
    /// `true` for `==`, `false` for `!=`.
    Compare(Box<Expr>, bool, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(String),
    Str(String),
    Num(Number),
    Dot,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Comma,
    EqEq,
    NotEq,
    Bang,
}

fn lex(code: &str) -> Result<Vec<Tok>, String> {
    let mut toks = Vec::new();
    let mut chars = code.char_indices().peekable();

    while let Some(&(i, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '"' | '\'' => {
                chars.next();
                let mut s = String::new();
                loop {
                    match chars.next() {
                        Some((_, q)) if q == c => break,
                        Some((_, '\\')) => match chars.next() {
                            Some((_, 'n')) => s.push('\n'),
                            Some((_, 't')) => s.push('\t'),
                            Some((_, other)) => s.push(other),
                            None => return Err("unterminated string".into()),
                        },
                        Some((_, other)) => s.push(other),
                        None => return Err("unterminated string".into()),
                    }
                }
                toks.push(Tok::Str(s));
            }
            ':' => {
                chars.next();
                let name = take_ident(code, &mut chars);
                if name.is_empty() {
                    return Err("expected a symbol name after `:`".into());
                }
                toks.push(Tok::Str(name));
            }
            c if c.is_ascii_digit()
                || (c == '-' && code[i + 1..].starts_with(|d: char| d.is_ascii_digit())) =>
            {
                chars.next();
                let mut end = i + c.len_utf8();
                let mut seen_dot = false;
                while let Some(&(j, d)) = chars.peek() {
                    let fraction = d == '.'
                        && !seen_dot
                        && code[j + 1..].starts_with(|n: char| n.is_ascii_digit());
                    if !(d.is_ascii_digit() || fraction) {
                        break;
                    }
                    seen_dot |= fraction;
                    end = j + d.len_utf8();
                    chars.next();
                }
                let literal = &code[i..end];
                let number = if seen_dot {
                    literal
                        .parse::<f64>()
                        .ok()
                        .and_then(Number::from_f64)
                } else {
                    literal.parse::<i64>().ok().map(Number::from)
                };
                toks.push(Tok::Num(
                    number.ok_or_else(|| format!("invalid number {literal}"))?,
                ));
            }
            c if c.is_alphabetic() || c == '_' => {
                toks.push(Tok::Ident(take_ident(code, &mut chars)));
            }
            _ => {
                chars.next();
                let tok = match c {
                    '.' => Tok::Dot,
                    '[' => Tok::LBracket,
                    ']' => Tok::RBracket,
                    '(' => Tok::LParen,
                    ')' => Tok::RParen,
                    ',' => Tok::Comma,
                    '=' if chars.next_if(|&(_, n)| n == '=').is_some() => Tok::EqEq,
                    '!' if chars.next_if(|&(_, n)| n == '=').is_some() => Tok::NotEq,
                    '!' => Tok::Bang,
                    other => return Err(format!("unexpected character `{other}`")),
                };
                toks.push(tok);
            }
        }
    }
    Ok(toks)
}

fn take_ident(code: &str, chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>) -> String {
    let Some(&(start, _)) = chars.peek() else {
        return String::new();
    };
    let mut end = start;
    while let Some(&(j, c)) = chars.peek() {
        if !(c.is_alphanumeric() || c == '_' || c == '?') {
            break;
        }
        end = j + c.len_utf8();
        chars.next();
    }
    code[start..end].to_string()
}

fn parse_expr(code: &str) -> Result<Expr, String> {
    let toks = lex(code)?;
    if toks.is_empty() {
        return Err("empty expression".into());
    }
    let mut parser = ExprParser { toks, pos: 0 };
    let expr = parser.comparison()?;
    match parser.toks.get(parser.pos) {
        None => Ok(expr),
        Some(tok) => Err(format!("unexpected {tok:?}")),
    }
}

struct ExprParser {
    toks: Vec<Tok>,
    pos: usize,
}

impl ExprParser {
    fn peek(&self) -> Option<&Tok> {
        self.toks.get(self.pos)
    }

    fn next(&mut self) -> Option<Tok> {
        let tok = self.toks.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.peek() == Some(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: Tok) -> Result<(), String> {
        if self.eat(&tok) {
            Ok(())
        } else {
            Err(format!("expected {tok:?}"))
        }
    }

    fn comparison(&mut self) -> Result<Expr, String> {
        let left = self.unary()?;
        let equal = match self.peek() {
            Some(Tok::EqEq) => true,
            Some(Tok::NotEq) => false,
            _ => return Ok(left),
        };
        self.pos += 1;
        let right = self.unary()?;
        Ok(Expr::Compare(Box::new(left), equal, Box::new(right)))
    }

    fn unary(&mut self) -> Result<Expr, String> {
        if self.eat(&Tok::Bang) {
            return Ok(Expr::Not(Box::new(self.unary()?)));
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, String> {
        let mut expr = self.primary()?;
        loop {
            if self.eat(&Tok::Dot) {
                match self.next() {
                    Some(Tok::Ident(field)) => expr = Expr::Field(Box::new(expr), field),
                    _ => return Err("expected a field name after `.`".into()),
                }
            } else if self.eat(&Tok::LBracket) {
                let key = self.comparison()?;
                self.expect(Tok::RBracket)?;
                expr = Expr::Index(Box::new(expr), Box::new(key));
            } else {
                return Ok(expr);
            }
        }
    }

    fn primary(&mut self) -> Result<Expr, String> {
        match self.next() {
            Some(Tok::Str(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Tok::Num(n)) => Ok(Expr::Literal(Value::Number(n))),
            Some(Tok::LParen) => {
                let inner = self.comparison()?;
                self.expect(Tok::RParen)?;
                Ok(inner)
            }
            Some(Tok::Ident(name)) => match name.as_str() {
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                "nil" => Ok(Expr::Literal(Value::Null)),
                "yield" => Ok(Expr::Yield),
                _ if self.eat(&Tok::LParen) => {
                    let mut args = Vec::new();
                    if !self.eat(&Tok::RParen) {
                        loop {
                            args.push(self.comparison()?);
                            if self.eat(&Tok::RParen) {
                                break;
                            }
                            self.expect(Tok::Comma)?;
                        }
                    }
                    Ok(Expr::Call(name, args))
                }
                _ => Ok(Expr::Name(name)),
            },
            Some(tok) => Err(format!("unexpected {tok:?}")),
            None => Err("unexpected end of expression".into()),
        }
    }
}

// ============================================================================
// Evaluation
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum Registry {
    Routes,
    Assets,
    Contents,
    Layouts,
}

/// A value during evaluation: plain data, a whole registry, or one blob.
#[derive(Debug)]
enum Datum<'v> {
    Value(Value),
    Registry(Registry),
    Blob(BlobRef<'v>),
}

struct Scope<'p> {
    vars: RefCell<HashMap<String, Value>>,
    parent: Option<&'p Scope<'p>>,
}

impl<'p> Scope<'p> {
    fn root() -> Self {
        Self {
            vars: RefCell::new(HashMap::new()),
            parent: None,
        }
    }

    fn child(&'p self) -> Scope<'p> {
        Scope {
            vars: RefCell::new(HashMap::new()),
            parent: Some(self),
        }
    }

    fn get(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.vars.borrow().get(name) {
            return Some(value.clone());
        }
        self.parent.and_then(|p| p.get(name))
    }

    fn set(&self, name: &str, value: Value) {
        self.vars.borrow_mut().insert(name.to_string(), value);
    }
}

struct Evaluator<'a, 'v> {
    view: &'a ViewContext<'v>,
    block: Option<Block<'a>>,
}

impl<'v> Evaluator<'_, 'v> {
    fn exec(&self, nodes: &[Node], scope: &Scope<'_>, out: &mut String) -> Result<(), RenderError> {
        for node in nodes {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Output(expr) => out.push_str(&display(self.eval(expr, scope)?)?),
                Node::OutputBlock { name, args, body } => {
                    let block = || self.capture(body, scope);
                    let value = self.call(name, args, scope, Some(&block))?;
                    out.push_str(&display(value)?);
                }
                Node::If {
                    cond,
                    then,
                    otherwise,
                } => {
                    let branch = if truthy(&self.eval(cond, scope)?) {
                        then
                    } else {
                        otherwise
                    };
                    self.exec(branch, scope, out)?;
                }
                Node::For {
                    var,
                    iterable,
                    body,
                } => {
                    let items = match self.eval(iterable, scope)? {
                        Datum::Value(Value::Array(items)) => items,
                        other => return Err(RenderError::NotIterable(describe(&other))),
                    };
                    for item in items {
                        let inner = scope.child();
                        inner.set(var, item);
                        self.exec(body, &inner, out)?;
                    }
                }
                Node::Capture { var, body } => {
                    let captured = self.capture(body, scope)?;
                    scope.set(var, Value::String(captured));
                }
            }
        }
        Ok(())
    }

    /// Render `body` into its own buffer.
    fn capture(&self, body: &[Node], scope: &Scope<'_>) -> Result<String, RenderError> {
        let mut buffer = String::new();
        self.exec(body, scope, &mut buffer)?;
        Ok(buffer)
    }

    fn eval(&self, expr: &Expr, scope: &Scope<'_>) -> Result<Datum<'v>, RenderError> {
        match expr {
            Expr::Literal(value) => Ok(Datum::Value(value.clone())),
            Expr::Yield => {
                let block = self.block.ok_or(RenderError::NoBlock)?;
                Ok(Datum::Value(Value::String(block()?)))
            }
            Expr::Name(name) => self.lookup(name, scope),
            Expr::Field(base, field) => self.field(self.eval(base, scope)?, field),
            Expr::Index(base, key) => {
                let base = self.eval(base, scope)?;
                let key = to_value(self.eval(key, scope)?)?;
                self.index(base, key)
            }
            Expr::Call(name, args) => self.call(name, args, scope, None),
            Expr::Not(inner) => Ok(Datum::Value(Value::Bool(!truthy(&self.eval(inner, scope)?)))),
            Expr::Compare(left, equal, right) => {
                let left = to_value(self.eval(left, scope)?)?;
                let right = to_value(self.eval(right, scope)?)?;
                Ok(Datum::Value(Value::Bool((left == right) == *equal)))
            }
        }
    }

    fn lookup(&self, name: &str, scope: &Scope<'_>) -> Result<Datum<'v>, RenderError> {
        if let Some(value) = scope.get(name) {
            return Ok(Datum::Value(value));
        }
        let view = self.view;
        Ok(match name {
            "routes" => Datum::Registry(Registry::Routes),
            "assets" => Datum::Registry(Registry::Assets),
            "contents" => Datum::Registry(Registry::Contents),
            "layouts" => Datum::Registry(Registry::Layouts),
            "locals" => Datum::Value(Value::Object(view.locals().clone())),
            "frontmatter" => Datum::Value(Value::Object(view.frontmatter().clone())),
            "input" => Datum::Value(Value::Object(view.input())),
            _ => view
                .input()
                .remove(name)
                .map(Datum::Value)
                .ok_or_else(|| RenderError::UnknownName(name.to_string()))?,
        })
    }

    fn field(&self, base: Datum<'v>, field: &str) -> Result<Datum<'v>, RenderError> {
        let value = match base {
            Datum::Blob(blob) => return blob_field(blob, field),
            Datum::Registry(_) => {
                return Err(RenderError::NotIndexable(format!(
                    "{} with .{field}",
                    describe(&base)
                )));
            }
            Datum::Value(value) => value,
        };

        let found = match (&value, field) {
            (Value::Object(map), _) if map.contains_key(field) => map.get(field).cloned(),
            (Value::Array(items), "size" | "length") => Some(Value::from(items.len())),
            (Value::Object(map), "size" | "length") => Some(Value::from(map.len())),
            (Value::String(s), "size" | "length") => Some(Value::from(s.chars().count())),
            (Value::Array(items), "first") => Some(items.first().cloned().unwrap_or(Value::Null)),
            (Value::Array(items), "last") => Some(items.last().cloned().unwrap_or(Value::Null)),
            (Value::Array(items), "empty?") => Some(Value::Bool(items.is_empty())),
            (Value::String(s), "empty?") => Some(Value::Bool(s.is_empty())),
            (Value::Object(_), _) => Some(Value::Null),
            _ => None,
        };
        found.map(Datum::Value).ok_or_else(|| {
            RenderError::NotIndexable(format!("{} with .{field}", describe(&Datum::Value(value))))
        })
    }

    fn index(&self, base: Datum<'v>, key: Value) -> Result<Datum<'v>, RenderError> {
        let view = self.view;
        match (base, key) {
            (Datum::Registry(registry), Value::String(key)) => Ok(Datum::Blob(match registry {
                Registry::Routes => view.resolve_route(&key)?,
                Registry::Assets => BlobRef::Asset(view.assets().lookup(&key)?),
                Registry::Contents => BlobRef::Content(view.contents().lookup(&key)?),
                Registry::Layouts => BlobRef::Layout(view.layouts().lookup(&key)?),
            })),
            (Datum::Blob(blob), Value::String(key)) => blob_field(blob, &key),
            (Datum::Value(Value::Object(mut map)), Value::String(key)) => {
                Ok(Datum::Value(map.remove(&key).unwrap_or(Value::Null)))
            }
            (Datum::Value(Value::Array(items)), Value::Number(n)) => {
                let len = items.len() as i64;
                let i = n.as_i64().unwrap_or(len);
                let i = if i < 0 { len + i } else { i };
                let item = usize::try_from(i).ok().and_then(|i| items.into_iter().nth(i));
                Ok(Datum::Value(item.unwrap_or(Value::Null)))
            }
            (base, _) => Err(RenderError::NotIndexable(describe(&base))),
        }
    }

    fn call(
        &self,
        name: &str,
        args: &[Expr],
        scope: &Scope<'_>,
        block: Option<Block<'_>>,
    ) -> Result<Datum<'v>, RenderError> {
        match name {
            "render" => {
                let (blob, layout) = match args {
                    [blob] => (self.eval(blob, scope)?, None),
                    [blob, layout] => (self.eval(blob, scope)?, Some(self.eval(layout, scope)?)),
                    _ => return Err(arguments(name, "expected render(blob) or render(blob, layout)")),
                };
                let renderable = match &blob {
                    Datum::Blob(b) => b.as_renderable(),
                    _ => None,
                }
                .ok_or_else(|| RenderError::NotRenderable(describe(&blob)))?;
                let layout = match layout {
                    None => None,
                    Some(Datum::Blob(BlobRef::Layout(layout))) => Some(layout),
                    Some(other) => {
                        return Err(arguments(name, format!("{} is not a layout", describe(&other))));
                    }
                };
                let rendered = self.view.render(renderable, layout, block)?;
                Ok(Datum::Value(Value::String(rendered)))
            }
            "h" | "escape" => {
                let [arg] = args else {
                    return Err(arguments(name, "expected one argument"));
                };
                let text = display(self.eval(arg, scope)?)?;
                Ok(Datum::Value(Value::String(escape_html(&text))))
            }
            "json" => {
                let [arg] = args else {
                    return Err(arguments(name, "expected one argument"));
                };
                Ok(Datum::Value(Value::String(
                    to_value(self.eval(arg, scope)?)?.to_string(),
                )))
            }
            _ => {
                let helper = self
                    .view
                    .helper(name)
                    .ok_or_else(|| RenderError::UnknownHelper(name.to_string()))?;
                let values = args
                    .iter()
                    .map(|arg| self.eval(arg, scope).and_then(to_value))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Datum::Value(helper.call(self.view, &values)?))
            }
        }
    }
}

fn arguments(name: &str, message: impl Into<String>) -> RenderError {
    RenderError::Arguments {
        name: name.to_string(),
        message: message.into(),
    }
}

fn path_value(path: Option<&Path>) -> Value {
    path.map_or(Value::Null, |p| Value::String(p.to_string_lossy().into_owned()))
}

fn str_value(s: Option<&str>) -> Value {
    s.map_or(Value::Null, |s| Value::String(s.to_string()))
}

fn blob_field<'v>(blob: BlobRef<'v>, field: &str) -> Result<Datum<'v>, RenderError> {
    let value = match (blob, field) {
        (_, "input_path") => path_value(Some(blob.input_path())),
        (_, "url_path") => str_value(blob.url_path()),
        (BlobRef::Asset(a), "output_path") => path_value(a.output_path()),
        (BlobRef::Content(c), "output_path") => path_value(c.output_path()),
        (BlobRef::Asset(a), "body") => str_value(a.body()),
        (BlobRef::Content(c), "body") => Value::String(Renderable::body(c)?.to_string()),
        (BlobRef::Layout(l), "body") => Value::String(Renderable::body(l)?.to_string()),
        (BlobRef::Asset(a), "entrypoint" | "entrypoint?") => Value::Bool(a.is_entrypoint()),
        (BlobRef::Content(c), "frontmatter") => Value::Object(c.frontmatter()?.clone()),
        (BlobRef::Content(c), "locals") => Value::Object(c.locals().clone()),
        (BlobRef::Content(c), "input") => Value::Object(c.input()?),
        (BlobRef::Content(c), "rendered") => str_value(c.rendered()),
        _ => {
            return Err(RenderError::UnknownName(format!("{}.{field}", blob.kind())));
        }
    };
    Ok(Datum::Value(value))
}

fn to_value(datum: Datum<'_>) -> Result<Value, RenderError> {
    match datum {
        Datum::Value(value) => Ok(value),
        Datum::Blob(blob) => {
            let mut map = Map::new();
            map.insert("kind".into(), Value::from(blob.kind()));
            map.insert("input_path".into(), path_value(Some(blob.input_path())));
            map.insert("url_path".into(), str_value(blob.url_path()));
            Ok(Value::Object(map))
        }
        Datum::Registry(_) => Err(RenderError::Unprintable(describe(&datum))),
    }
}

fn display(datum: Datum<'_>) -> Result<String, RenderError> {
    match datum {
        Datum::Value(Value::String(s)) => Ok(s),
        Datum::Value(Value::Null) => Ok(String::new()),
        Datum::Value(value) => Ok(value.to_string()),
        Datum::Blob(blob) => Ok(blob.url_path().unwrap_or_default().to_string()),
        Datum::Registry(_) => Err(RenderError::Unprintable(describe(&datum))),
    }
}

fn truthy(datum: &Datum<'_>) -> bool {
    !matches!(datum, Datum::Value(Value::Null | Value::Bool(false)))
}

fn describe(datum: &Datum<'_>) -> String {
    match datum {
        Datum::Value(Value::Null) => "nil".into(),
        Datum::Value(Value::Bool(_)) => "a boolean".into(),
        Datum::Value(Value::Number(_)) => "a number".into(),
        Datum::Value(Value::String(_)) => "a string".into(),
        Datum::Value(Value::Array(_)) => "an array".into(),
        Datum::Value(Value::Object(_)) => "an object".into(),
        Datum::Registry(registry) => format!("{registry:?}").to_lowercase(),
        Datum::Blob(blob) => format!("{} {}", blob.kind(), blob.input_path().display()),
    }
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}
