//! Path queries over JSON values and path-addressed writes.
//!
//! Query syntax is root-anchored:
//!
//! | Expression        | Selects                                   |
//! |-------------------|-------------------------------------------|
//! | `$`               | the whole value                           |
//! | `$.user.id`       | dotted field access                       |
//! | `$['user name']`  | bracketed field access (quoted)           |
//! | `$.items[0]`      | array index (negative counts from the end)|
//! | `$.items[*].id`   | wildcard over array elements              |
//! | `$.*`             | wildcard over object values               |
//!
//! A query containing a wildcard always yields a sequence of matches (possibly
//! empty). Any other query addresses exactly one location and fails with
//! [`PathError::NotFound`] when nothing is there.
//!
//! Write keys use the same segment syntax without the `$` anchor
//! (`user.id`, `tags[0]`, `['odd.key']`). Missing intermediate containers are
//! created on demand: an index segment creates an array, a field segment
//! creates an object.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Largest array index a write is allowed to pad up to.
const MAX_WRITE_INDEX: usize = 10_000;

/// Errors produced while parsing, evaluating, or writing paths.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PathError {
    /// The expression does not follow the path grammar.
    #[error("Invalid path '{path}' at offset {offset}: {reason}")]
    Syntax {
        path: String,
        offset: usize,
        reason: String,
    },

    /// A single-value query addressed a location that does not exist.
    #[error("Path '{path}' matched nothing")]
    NotFound { path: String },

    /// A write key cannot be applied to the target.
    #[error("Cannot write to '{path}': {reason}")]
    InvalidWrite { path: String, reason: String },

    /// A mapping entry is neither a path string nor a nested map.
    #[error("Invalid mapping for '{key}': {reason}")]
    InvalidMapping { key: String, reason: String },
}

/// One step of a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Object field access.
    Key(String),
    /// Array index; negative values count from the end.
    Index(i64),
    /// Every child of an object or array.
    Wildcard,
}

/// A parsed, root-anchored path query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathExpr {
    source: String,
    segments: Vec<Segment>,
}

/// Result of evaluating a [`PathExpr`].
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    /// Exact-path query result.
    One(Value),
    /// Wildcard query result, in document order.
    Many(Vec<Value>),
}

/// Options controlling the shape of a resolved value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathOptions {
    /// `true` always yields a sequence, `false` unwraps single-element
    /// matches, absent keeps the query-shape rule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wrap: Option<bool>,
}

impl PathExpr {
    /// Parse a root-anchored query such as `$.users[0].email`.
    pub fn parse(source: &str) -> Result<Self, PathError> {
        let mut parser = Parser::new(source);
        if parser.bump() != Some('$') {
            return Err(parser.error("path must start with '$'"));
        }
        let segments = parser.segments()?;
        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    /// The original expression text.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Parsed segments, root excluded.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Returns `true` if the query can match more than one location.
    pub fn is_multi(&self) -> bool {
        self.segments.iter().any(|s| matches!(s, Segment::Wildcard))
    }

    /// Evaluate the query against a JSON value.
    pub fn resolve(&self, value: &Value) -> Result<Resolved, PathError> {
        let nodes = self
            .segments
            .iter()
            .fold(vec![value], |nodes, segment| select(nodes, segment));
        self.finish(nodes)
    }

    /// Evaluate the query against an object given as a bare map.
    pub fn resolve_in(&self, map: &Map<String, Value>) -> Result<Resolved, PathError> {
        let Some((first, rest)) = self.segments.split_first() else {
            return Ok(Resolved::One(Value::Object(map.clone())));
        };
        let start: Vec<&Value> = match first {
            Segment::Key(key) => map.get(key).into_iter().collect(),
            Segment::Wildcard => map.values().collect(),
            Segment::Index(_) => Vec::new(),
        };
        let nodes = rest
            .iter()
            .fold(start, |nodes, segment| select(nodes, segment));
        self.finish(nodes)
    }

    fn finish(&self, nodes: Vec<&Value>) -> Result<Resolved, PathError> {
        if self.is_multi() {
            return Ok(Resolved::Many(nodes.into_iter().cloned().collect()));
        }
        nodes
            .first()
            .map(|v| Resolved::One((*v).clone()))
            .ok_or_else(|| PathError::NotFound {
                path: self.source.clone(),
            })
    }
}

impl FromStr for PathExpr {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for PathExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl Resolved {
    /// Collapse into a single JSON value, sequences becoming arrays.
    pub fn into_value(self) -> Value {
        match self {
            Self::One(v) => v,
            Self::Many(vs) => Value::Array(vs),
        }
    }

    /// Collapse into a JSON value honoring [`PathOptions::wrap`].
    pub fn shape(self, options: PathOptions) -> Value {
        match (options.wrap, self) {
            (None, resolved) => resolved.into_value(),
            (Some(true), Self::One(v)) => Value::Array(vec![v]),
            (Some(true), Self::Many(vs)) => Value::Array(vs),
            (Some(false), Self::One(v)) => v,
            (Some(false), Self::Many(mut vs)) => match vs.len() {
                0 => Value::Null,
                1 => vs.remove(0),
                _ => Value::Array(vs),
            },
        }
    }
}

fn select<'a>(nodes: Vec<&'a Value>, segment: &Segment) -> Vec<&'a Value> {
    let mut out = Vec::new();
    for node in nodes {
        match (segment, node) {
            (Segment::Key(key), Value::Object(map)) => out.extend(map.get(key)),
            (Segment::Index(i), Value::Array(items)) => {
                out.extend(array_index(items.len(), *i).map(|idx| &items[idx]))
            },
            (Segment::Wildcard, Value::Object(map)) => out.extend(map.values()),
            (Segment::Wildcard, Value::Array(items)) => out.extend(items.iter()),
            _ => {},
        }
    }
    out
}

fn array_index(len: usize, i: i64) -> Option<usize> {
    if i >= 0 {
        let idx = usize::try_from(i).ok()?;
        (idx < len).then_some(idx)
    } else {
        len.checked_sub(usize::try_from(i.unsigned_abs()).ok()?)
    }
}

/// Write `value` into `target` at a dotted/bracketed key path.
///
/// A plain key such as `"user_id"` is a direct insert. A leading `$` anchor
/// is accepted and ignored. Later writes overwrite earlier ones.
pub fn write(target: &mut Map<String, Value>, key_path: &str, value: Value) -> Result<(), PathError> {
    let segments = parse_assignment(key_path)?;
    let Some((Segment::Key(first), rest)) = segments.split_first() else {
        return Err(PathError::InvalidWrite {
            path: key_path.to_string(),
            reason: "write target must start with a field name".to_string(),
        });
    };
    if rest.is_empty() {
        target.insert(first.clone(), value);
        return Ok(());
    }
    let slot = target.entry(first.clone()).or_insert(Value::Null);
    write_into(slot, rest, value, key_path)
}

fn write_into(
    slot: &mut Value,
    segments: &[Segment],
    value: Value,
    path: &str,
) -> Result<(), PathError> {
    let Some((segment, rest)) = segments.split_first() else {
        *slot = value;
        return Ok(());
    };
    match segment {
        Segment::Key(key) => {
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            if let Value::Object(map) = slot {
                let child = map.entry(key.clone()).or_insert(Value::Null);
                write_into(child, rest, value, path)?;
            }
        },
        Segment::Index(i) => {
            if !slot.is_array() {
                *slot = Value::Array(Vec::new());
            }
            if let Value::Array(items) = slot {
                let idx = if *i >= 0 {
                    usize::try_from(*i).unwrap_or(usize::MAX)
                } else {
                    array_index(items.len(), *i).ok_or_else(|| PathError::InvalidWrite {
                        path: path.to_string(),
                        reason: format!("index {i} is out of range"),
                    })?
                };
                if idx > MAX_WRITE_INDEX {
                    return Err(PathError::InvalidWrite {
                        path: path.to_string(),
                        reason: format!("index {idx} exceeds the limit of {MAX_WRITE_INDEX}"),
                    });
                }
                if idx >= items.len() {
                    items.resize(idx + 1, Value::Null);
                }
                write_into(&mut items[idx], rest, value, path)?;
            }
        },
        Segment::Wildcard => {
            return Err(PathError::InvalidWrite {
                path: path.to_string(),
                reason: "wildcards cannot be written to".to_string(),
            });
        },
    }
    Ok(())
}

fn parse_assignment(key_path: &str) -> Result<Vec<Segment>, PathError> {
    let mut parser = Parser::new(key_path);
    if parser.peek() == Some('$') {
        parser.bump();
        let segments = parser.segments()?;
        if segments.is_empty() {
            return Err(parser.error("write target cannot be the root"));
        }
        return Ok(segments);
    }
    let mut segments = Vec::new();
    if parser.peek() != Some('[') {
        segments.push(Segment::Key(parser.ident()?));
    }
    segments.extend(parser.segments()?);
    Ok(segments)
}

/// A named set of mapping entries, e.g. an `input_mapping` table.
///
/// Each entry's key is a write key into the destination; its value is either a
/// path evaluated against the source, or a nested map whose leaves are paths
/// evaluated against the same source.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValueMapping {
    entries: Vec<(String, MappingNode)>,
}

#[derive(Debug, Clone, PartialEq)]
enum MappingNode {
    Path(PathExpr),
    Nested(ValueMapping),
}

impl ValueMapping {
    /// Parse a mapping table. Values must be path strings or nested tables.
    pub fn from_map(map: &Map<String, Value>) -> Result<Self, PathError> {
        let mut entries = Vec::with_capacity(map.len());
        for (key, value) in map {
            let node = match value {
                Value::String(path) => MappingNode::Path(PathExpr::parse(path)?),
                Value::Object(nested) => MappingNode::Nested(Self::from_map(nested)?),
                other => {
                    return Err(PathError::InvalidMapping {
                        key: key.clone(),
                        reason: format!(
                            "expected a path string or a nested map, found {}",
                            json_kind(other)
                        ),
                    })
                },
            };
            entries.push((key.clone(), node));
        }
        Ok(Self { entries })
    }

    /// Number of top-level entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve every entry against `source`, returning `(write key, value)`
    /// pairs in declaration order.
    pub fn resolve(
        &self,
        source: &Map<String, Value>,
        options: PathOptions,
    ) -> Result<Vec<(String, Value)>, PathError> {
        self.entries
            .iter()
            .map(|(key, node)| Ok((key.clone(), node.resolve(source, options)?)))
            .collect()
    }

    /// Resolve against `source` and point-write each result into `target`.
    pub fn apply(
        &self,
        source: &Map<String, Value>,
        target: &mut Map<String, Value>,
        options: PathOptions,
    ) -> Result<(), PathError> {
        for (key, value) in self.resolve(source, options)? {
            write(target, &key, value)?;
        }
        Ok(())
    }
}

impl MappingNode {
    fn resolve(&self, source: &Map<String, Value>, options: PathOptions) -> Result<Value, PathError> {
        match self {
            Self::Path(path) => Ok(path.resolve_in(source)?.shape(options)),
            Self::Nested(mapping) => {
                let mut object = Map::new();
                mapping.apply(source, &mut object, options)?;
                Ok(Value::Object(object))
            },
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

struct Parser<'a> {
    path: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(path: &'a str) -> Self {
        Self { path, pos: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.path[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn error(&self, reason: &str) -> PathError {
        PathError::Syntax {
            path: self.path.to_string(),
            offset: self.pos,
            reason: reason.to_string(),
        }
    }

    fn segments(&mut self) -> Result<Vec<Segment>, PathError> {
        let mut segments = Vec::new();
        while let Some(c) = self.peek() {
            match c {
                '.' => {
                    self.bump();
                    match self.peek() {
                        Some('.') => return Err(self.error("recursive descent is not supported")),
                        Some('*') => {
                            self.bump();
                            segments.push(Segment::Wildcard);
                        },
                        _ => segments.push(Segment::Key(self.ident()?)),
                    }
                },
                '[' => segments.push(self.bracket()?),
                _ => return Err(self.error("expected '.' or '['")),
            }
        }
        Ok(segments)
    }

    fn ident(&mut self) -> Result<String, PathError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == '.' || c == '[' {
                break;
            }
            self.bump();
        }
        if self.pos == start {
            return Err(self.error("expected a field name"));
        }
        Ok(self.path[start..self.pos].to_string())
    }

    fn bracket(&mut self) -> Result<Segment, PathError> {
        self.bump();
        let segment = match self.peek() {
            Some('*') => {
                self.bump();
                Segment::Wildcard
            },
            Some(quote @ ('\'' | '"')) => {
                self.bump();
                Segment::Key(self.quoted(quote)?)
            },
            Some(c) if c == '-' || c.is_ascii_digit() => {
                let start = self.pos;
                self.bump();
                while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.bump();
                }
                let index = self.path[start..self.pos]
                    .parse::<i64>()
                    .map_err(|_| self.error("invalid array index"))?;
                Segment::Index(index)
            },
            _ => return Err(self.error("expected an index, '*', or a quoted name")),
        };
        if self.bump() != Some(']') {
            return Err(self.error("expected ']'"));
        }
        Ok(segment)
    }

    fn quoted(&mut self, quote: char) -> Result<String, PathError> {
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error("unterminated quoted name")),
                Some('\\') => match self.bump() {
                    Some(c) => out.push(c),
                    None => return Err(self.error("unterminated escape")),
                },
                Some(c) if c == quote => return Ok(out),
                Some(c) => out.push(c),
            }
        }
    }
}
