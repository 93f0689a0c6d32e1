//! Deferred values ("tokens")
//!
//! A [Token] stands for a value that is only known once terraform runs: an attribute of another element, a
//! function call, a raw expression or a lazily computed value.
//!
//! Tokens are registered in a [TokenMap] which hands out a marker string (`${TfToken[TOKEN.<n>]}`).
//! The marker can travel through any string typed api (concatenation, `format!`, config maps, ...) and gets replaced
//! by the rendered expression when the stack is synthesized.
//!
//! The [TokenMap] is the side table of one synthesis pass. Markers are only meaningful for the map that issued them.
use crate::util::{MarkerRewriter, TokenResolver};
use crate::value::Value;
use crate::visit::{VisitStrings, VisitStringsMut};
use std::fmt::Formatter;
use std::rc::Rc;

const MARKER_PREFIX: &str = "${TfToken[TOKEN.";
const MARKER_SUFFIX: &str = "]}";

/// A deferred value
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Attribute of an addressable element, eg. `aws_instance.web.id`
    Ref { fqn: String, attribute: String },
    /// Call of a terraform function
    Fn { name: String, args: Vec<Operand> },
    /// Expression that is already in its final form
    Raw(String),
    /// Computed when the token gets resolved, possibly more than once
    Lazy(Lazy),
}

impl Token {
    pub fn reference(fqn: impl Into<String>, attribute: impl Into<String>) -> Self {
        Token::Ref {
            fqn: fqn.into(),
            attribute: attribute.into(),
        }
    }

    pub fn function(name: impl Into<String>, args: Vec<Operand>) -> Self {
        Token::Fn {
            name: name.into(),
            args,
        }
    }

    pub fn raw(expression: impl Into<String>) -> Self {
        Token::Raw(expression.into())
    }

    /// The producer must be pure. Resolution order is not defined and it may be invoked several times.
    pub fn lazy(producer: impl Fn() -> Operand + 'static) -> Self {
        Token::Lazy(Lazy(Rc::new(producer)))
    }
}

/// Producer of a [Token::Lazy]
#[derive(Clone)]
pub struct Lazy(Rc<dyn Fn() -> Operand>);

impl Lazy {
    pub fn produce(&self) -> Operand {
        (self.0)()
    }
}

impl std::fmt::Debug for Lazy {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("Lazy(..)")
    }
}

impl PartialEq for Lazy {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Rc::as_ptr(&self.0), Rc::as_ptr(&other.0))
    }
}

/// Function argument or result of a lazy producer
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Token(Token),
    /// Strings may carry markers
    Value(Value),
}

impl From<Token> for Operand {
    fn from(value: Token) -> Self {
        Operand::Token(value)
    }
}

macro_rules! operand_from_value {
    ($($ty:ty),+) => {
        $(
            impl From<$ty> for Operand {
                fn from(value: $ty) -> Self {
                    Operand::Value(value.into())
                }
            }
        )+
    };
}

operand_from_value!(Value, String, &str, bool, i64, i32, f64);

/// Part of a string split at token markers
#[derive(Debug, PartialEq)]
enum Fragment<'s> {
    Literal(&'s str),
    /// index into the [TokenMap] and the marker text itself
    Marker(usize, &'s str),
}

fn fragments(s: &str) -> Vec<Fragment<'_>> {
    let mut fragments = vec![];
    let mut rest = s;

    while let Some(start) = rest.find(MARKER_PREFIX) {
        let after = &rest[start + MARKER_PREFIX.len()..];
        let digits = after.bytes().take_while(u8::is_ascii_digit).count();

        if digits > 0 && after[digits..].starts_with(MARKER_SUFFIX) {
            if let Ok(index) = after[..digits].parse() {
                if start > 0 {
                    fragments.push(Fragment::Literal(&rest[..start]));
                }
                let end = start + MARKER_PREFIX.len() + digits + MARKER_SUFFIX.len();
                fragments.push(Fragment::Marker(index, &rest[start..end]));
                rest = &rest[end..];
                continue;
            }
        }

        // looked like a marker but is not one
        let end = start + MARKER_PREFIX.len();
        fragments.push(Fragment::Literal(&rest[..end]));
        rest = &rest[end..];
    }

    if !rest.is_empty() {
        fragments.push(Fragment::Literal(rest));
    }

    fragments
}

/// Side table of all tokens created during one synthesis pass
#[derive(Debug, Default)]
pub struct TokenMap {
    tokens: Vec<Token>,
}

impl TokenMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a token and return its marker string
    pub fn create_token(&mut self, token: Token) -> String {
        let index = self.tokens.len();
        tracing::trace!(index, ?token, "token created");
        self.tokens.push(token);
        format!("{MARKER_PREFIX}{index}{MARKER_SUFFIX}")
    }

    pub fn get(&self, index: usize) -> Option<&Token> {
        self.tokens.get(index)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &Token)> {
        self.tokens.iter().enumerate()
    }

    /// The token if `value` is a string consisting of exactly one marker
    pub fn as_token(&self, value: &Value) -> Option<&Token> {
        value.as_str().and_then(|s| self.token_in(s))
    }

    /// The token if `s` consists of exactly one marker
    pub fn token_in(&self, s: &str) -> Option<&Token> {
        match fragments(s).as_slice() {
            [Fragment::Marker(index, _)] => self.get(*index),
            _ => None,
        }
    }

    /// True if `s` carries at least one marker issued by this map
    pub fn contains_token_markers(&self, s: &str) -> bool {
        fragments(s)
            .iter()
            .any(|fragment| matches!(fragment, Fragment::Marker(index, _) if *index < self.len()))
    }

    /// True if any string in `value` (object keys included) carries a marker issued by this map
    pub fn contains_tokens(&self, value: &Value) -> bool {
        let mut found = false;
        value.visit_strings(&mut |s: &str| found = found || self.contains_token_markers(s));
        found
    }

    /// Rewrite every marker in `value` with the output of `resolver`
    pub fn resolve_tokens<R>(&self, value: &Value, resolver: R) -> Value
    where
        R: FnMut(&Token) -> String,
    {
        let mut value = value.clone();
        value.visit_strings_mut(&mut MarkerRewriter::new(self, resolver));
        value
    }

    /// Resolve `value` for the final document
    ///
    /// Same as [TokenMap::resolve_tokens] with [TokenMap::token_to_string], except that a string consisting of a
    /// single lazy token is replaced by the produced value when that value is not a string.
    pub fn resolve(&self, value: &Value) -> Value {
        let mut value = value.clone();
        value.visit_strings_mut(&mut TokenResolver::new(self));
        value
    }

    /// Replace all markers of `s`, returns [None] if there are none
    pub(crate) fn resolve_str(
        &self,
        s: &str,
        resolver: &mut dyn FnMut(&Token) -> String,
    ) -> Option<String> {
        let fragments = fragments(s);
        if !fragments
            .iter()
            .any(|fragment| matches!(fragment, Fragment::Marker(..)))
        {
            return None;
        }

        let mut resolved = String::with_capacity(s.len());
        for fragment in fragments {
            match fragment {
                Fragment::Literal(literal) => resolved.push_str(literal),
                Fragment::Marker(index, marker) => match self.get(index) {
                    Some(token) => resolved.push_str(&resolver(token)),
                    None => resolved.push_str(marker),
                },
            }
        }

        Some(resolved)
    }

    /// Render a token in terraform interpolation syntax
    pub fn token_to_string(&self, token: &Token) -> String {
        match token {
            Token::Ref { .. } | Token::Fn { .. } => format!("${{{}}}", self.expression(token)),
            Token::Raw(expression) => expression.clone(),
            Token::Lazy(lazy) => match lazy.produce() {
                Operand::Token(inner) => self.token_to_string(&inner),
                Operand::Value(Value::String(s)) => self
                    .resolve_str(&s, &mut |t| self.token_to_string(t))
                    .unwrap_or(s),
                Operand::Value(value) => format!("${{{}}}", self.value_expression(&value)),
            },
        }
    }

    /// Render a token as a bare expression (without the `${}` wrapper)
    fn expression(&self, token: &Token) -> String {
        match token {
            Token::Ref { fqn, attribute } if attribute.is_empty() => fqn.clone(),
            Token::Ref { fqn, attribute } => format!("{fqn}.{attribute}"),
            Token::Fn { name, args } => {
                let args: Vec<_> = args
                    .iter()
                    .map(|arg| self.operand_expression(arg))
                    .collect();
                format!("{name}({})", args.join(", "))
            }
            Token::Raw(expression) => strip_interpolation(expression).to_string(),
            Token::Lazy(lazy) => self.operand_expression(&lazy.produce()),
        }
    }

    fn operand_expression(&self, operand: &Operand) -> String {
        match operand {
            Operand::Token(token) => self.expression(token),
            Operand::Value(value) => self.value_expression(value),
        }
    }

    fn value_expression(&self, value: &Value) -> String {
        match value {
            Value::Null => "null".to_string(),
            Value::Boolean(b) => b.to_string(),
            Value::Integer(i) => i.to_string(),
            Value::Decimal(d) => d.to_string(),
            Value::String(s) => self.string_expression(s),
            Value::Array(array) => {
                let elements: Vec<_> = array.iter().map(|v| self.value_expression(v)).collect();
                format!("[{}]", elements.join(", "))
            }
            Value::Object(object) => {
                let entries: Vec<_> = object
                    .iter()
                    .map(|(k, v)| format!("{} = {}", object_key(k), self.value_expression(v)))
                    .collect();
                format!("{{{}}}", entries.join(", "))
            }
        }
    }

    fn string_expression(&self, s: &str) -> String {
        let fragments = fragments(s);

        if let [Fragment::Marker(index, _)] = fragments.as_slice() {
            if let Some(token) = self.get(*index) {
                return self.expression(token);
            }
        }

        let mut template = String::from("\"");
        for fragment in fragments {
            match fragment {
                Fragment::Marker(index, marker) => match self.get(index) {
                    Some(token) => template.push_str(&self.token_to_string(token)),
                    None => template.push_str(&escape(marker)),
                },
                Fragment::Literal(literal) => template.push_str(&escape(literal)),
            }
        }
        template.push('"');
        template
    }

    /// Address of the element a `depends_on` entry points to
    ///
    /// Only looks at the shape of the entry, does not check that the element exists.
    pub fn reference_address(&self, entry: &str) -> Option<String> {
        match self.token_in(entry) {
            Some(token) => self.token_address(token),
            None if self.contains_token_markers(entry) => None,
            None => {
                let address = strip_interpolation(entry).trim();
                (!address.is_empty()).then(|| address.to_string())
            }
        }
    }

    fn token_address(&self, token: &Token) -> Option<String> {
        match token {
            Token::Ref { fqn, .. } => Some(fqn.clone()),
            Token::Raw(expression) => Some(strip_interpolation(expression).trim().to_string()),
            Token::Lazy(lazy) => match lazy.produce() {
                Operand::Token(inner) => self.token_address(&inner),
                Operand::Value(Value::String(s)) => self.reference_address(&s),
                Operand::Value(_) => None,
            },
            Token::Fn { .. } => None,
        }
    }
}

/// `${foo.bar}` -> `foo.bar`
pub(crate) fn strip_interpolation(expression: &str) -> &str {
    expression
        .strip_prefix("${")
        .and_then(|inner| inner.strip_suffix('}'))
        .filter(|inner| !inner.contains("${"))
        .unwrap_or(expression)
}

/// Literal text for a quoted hcl template, without the surrounding quotes
///
/// Besides json escaping, `${` and `%{` are doubled so they are not read as interpolation or directive.
fn escape(s: &str) -> String {
    let quoted = serde_json::Value::String(s.to_string()).to_string();
    quoted
        .strip_prefix('"')
        .and_then(|q| q.strip_suffix('"'))
        .unwrap_or(&quoted)
        .replace("${", "$${")
        .replace("%{", "%%{")
}

fn object_key(key: &str) -> String {
    let is_identifier = key
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');

    if is_identifier {
        key.to_string()
    } else {
        format!("\"{}\"", escape(key))
    }
}
