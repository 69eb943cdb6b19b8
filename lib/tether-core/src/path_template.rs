//! URL pattern compilation.
//!
//! A pattern is a literal path with embedded parameters, each optionally
//! preceded by `/`:
//!
//! - `:name` - mandatory, replaced by the parameter value
//! - `:name?` - optional, removed together with its leading `/` when absent
//! - `:name*` - greedy, mandatory and substituted verbatim (may contain `/`)
//!
//! Parameter names are made of ASCII alphanumerics and `_`.
//!
//! # Example
//!
//! ```
//! use serde_json::json;
//! use tether_core::PathTemplate;
//!
//! let template = PathTemplate::new("/users/:id/posts/:post?");
//! let params = json!({"id": 42});
//! let path = template.compile(params.as_object()).expect("compiled");
//! assert_eq!(path, "/users/42/posts");
//! ```

use std::borrow::Cow;

use serde_json::{Map, Value};

use crate::{Error, Result};

/// How a parameter token behaves when compiled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKind {
    /// `:name`
    Mandatory,
    /// `:name?`
    Optional,
    /// `:name*`
    Greedy,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Segment {
    Literal(String),
    Param {
        name: String,
        kind: ParamKind,
        slash: bool,
    },
}

/// A parsed URL pattern.
///
/// Parsing happens once, at construction; [`PathTemplate::compile`] is a pure
/// function of the template and the parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathTemplate {
    pattern: String,
    segments: Vec<Segment>,
}

impl PathTemplate {
    /// Parse a pattern.
    #[must_use]
    pub fn new(pattern: impl Into<String>) -> Self {
        let pattern = pattern.into();
        let segments = parse(&pattern);
        Self { pattern, segments }
    }

    /// Get the pattern string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    /// Parameter names with their kind, in pattern order.
    pub fn params(&self) -> impl Iterator<Item = (&str, ParamKind)> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Param { name, kind, .. } => Some((name.as_str(), *kind)),
            Segment::Literal(_) => None,
        })
    }

    /// Interpolate the pattern with `params`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingParameter`] for the first mandatory or greedy
    /// parameter that is absent, `null` or an empty string.
    pub fn compile(&self, params: Option<&Map<String, Value>>) -> Result<String> {
        let mut path = String::with_capacity(self.pattern.len());

        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => path.push_str(text),
                Segment::Param { name, kind, slash } => {
                    let value = params.and_then(|params| params.get(name)).and_then(param_text);
                    match (value, kind) {
                        (Some(value), _) => {
                            if *slash {
                                path.push('/');
                            }
                            path.push_str(&value);
                        }
                        (None, ParamKind::Optional) => {}
                        (None, ParamKind::Mandatory | ParamKind::Greedy) => {
                            return Err(Error::missing_parameter(name, &self.pattern));
                        }
                    }
                }
            }
        }

        Ok(path)
    }
}

/// Compile `pattern` against `params` in one go.
///
/// # Errors
///
/// See [`PathTemplate::compile`].
pub fn compile_url(pattern: &str, params: Option<&Map<String, Value>>) -> Result<String> {
    PathTemplate::new(pattern).compile(params)
}

/// Text substituted for a parameter value, `None` when the value counts as empty.
fn param_text(value: &Value) -> Option<Cow<'_, str>> {
    match value {
        Value::Null => None,
        Value::String(text) if text.is_empty() => None,
        Value::String(text) => Some(Cow::Borrowed(text)),
        other => Some(Cow::Owned(other.to_string())),
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn parse(pattern: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut rest = pattern;

    while let Some(c) = rest.chars().next() {
        let (slash, after_slash) = match rest.strip_prefix('/') {
            Some(after) => (true, after),
            None => (false, rest),
        };

        if let Some(after_colon) = after_slash.strip_prefix(':') {
            let name_len = after_colon
                .find(|c: char| !is_name_char(c))
                .unwrap_or(after_colon.len());
            if name_len > 0 {
                let (name, tail) = after_colon.split_at(name_len);
                let (kind, tail) = if let Some(tail) = tail.strip_prefix('?') {
                    (ParamKind::Optional, tail)
                } else if let Some(tail) = tail.strip_prefix('*') {
                    (ParamKind::Greedy, tail)
                } else {
                    (ParamKind::Mandatory, tail)
                };

                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Param {
                    name: name.to_string(),
                    kind,
                    slash,
                });
                rest = tail;
                continue;
            }
        }

        literal.push(c);
        let mut chars = rest.chars();
        chars.next();
        rest = chars.as_str();
    }

    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }

    segments
}

impl std::fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.pattern)
    }
}

impl AsRef<str> for PathTemplate {
    fn as_ref(&self) -> &str {
        &self.pattern
    }
}
