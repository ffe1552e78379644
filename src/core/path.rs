use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use serde_json::Value;

use crate::error::AddressingError;

type SelectFn = dyn for<'a> Fn(&'a mut Value) -> Option<&'a mut Value> + Send + Sync;
type EffectFn = dyn Fn(&mut Value, Value) -> Result<()> + Send + Sync;

#[derive(Clone)]
enum AccessorKind {
    Select(Arc<SelectFn>),
    Effect(Arc<EffectFn>),
}

/// A computed path step for locations that plain keys and indexes cannot
/// express, e.g. "the entry of this array whose uuid is X".
///
/// Selector accessors pick a child and can appear anywhere in a path. Effect
/// accessors apply the new value themselves and are only valid as the last
/// segment.
#[derive(Clone)]
pub struct Accessor {
    name: String,
    kind: AccessorKind,
}

impl Accessor {
    pub fn selector<F>(name: impl Into<String>, select: F) -> Self
    where
        F: for<'a> Fn(&'a mut Value) -> Option<&'a mut Value> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            kind: AccessorKind::Select(Arc::new(select)),
        }
    }

    pub fn effect<F>(name: impl Into<String>, apply: F) -> Self
    where
        F: Fn(&mut Value, Value) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            kind: AccessorKind::Effect(Arc::new(apply)),
        }
    }

    /// Selects the element of an array whose `field` equals `expected`.
    pub fn matching(field: impl Into<String>, expected: Value) -> Self {
        let field = field.into();
        let name = format!("[{field}={expected}]");
        Self::selector(name, move |doc: &mut Value| {
            doc.as_array_mut()?
                .iter_mut()
                .find(|item| item.get(&field) == Some(&expected))
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn select<'a>(&self, doc: &'a mut Value) -> Option<&'a mut Value> {
        match &self.kind {
            AccessorKind::Select(select) => select(doc),
            AccessorKind::Effect(_) => None,
        }
    }
}

impl fmt::Debug for Accessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Accessor").field(&self.name).finish()
    }
}

#[derive(Clone, Debug)]
pub enum PathSegment {
    Key(String),
    Index(usize),
    Accessor(Accessor),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(key) => write!(f, "{key}"),
            PathSegment::Index(index) => write!(f, "[{index}]"),
            PathSegment::Accessor(accessor) => write!(f, "<{}>", accessor.name()),
        }
    }
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        PathSegment::Key(key.to_string())
    }
}

impl From<String> for PathSegment {
    fn from(key: String) -> Self {
        PathSegment::Key(key)
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        PathSegment::Index(index)
    }
}

impl From<Accessor> for PathSegment {
    fn from(accessor: Accessor) -> Self {
        PathSegment::Accessor(accessor)
    }
}

/// Ordered segments addressing one location inside a document. Mutation
/// consumes the path front to back.
#[derive(Clone, Debug, Default)]
pub struct JsonPath {
    segments: VecDeque<PathSegment>,
}

impl JsonPath {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.segments.push_back(PathSegment::Key(key.into()));
        self
    }

    pub fn index(mut self, index: usize) -> Self {
        self.segments.push_back(PathSegment::Index(index));
        self
    }

    pub fn accessor(mut self, accessor: Accessor) -> Self {
        self.segments.push_back(PathSegment::Accessor(accessor));
        self
    }

    pub fn push(&mut self, segment: impl Into<PathSegment>) {
        self.segments.push_back(segment.into());
    }

    /// Builds a path from a JSON array: strings become keys, non-negative
    /// integers become indexes. A numeric string stays a key.
    pub fn parse_value(value: &Value) -> Result<Self> {
        let items = value
            .as_array()
            .ok_or_else(|| anyhow!("path must be an array"))?;
        let mut path = Self::new();
        for item in items {
            match item {
                Value::String(key) => path.push(key.as_str()),
                Value::Number(num) => {
                    let index = num.as_u64().ok_or_else(|| {
                        anyhow!("numeric path segment must be an unsigned integer")
                    })?;
                    path.push(index as usize);
                }
                _ => return Err(anyhow!("path segments must be strings or integers")),
            }
        }
        Ok(path)
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> impl Iterator<Item = &PathSegment> {
        self.segments.iter()
    }

    fn pop_front(&mut self) -> Option<PathSegment> {
        self.segments.pop_front()
    }
}

impl FromIterator<PathSegment> for JsonPath {
    fn from_iter<I: IntoIterator<Item = PathSegment>>(iter: I) -> Self {
        Self {
            segments: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for JsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.segments.iter().map(ToString::to_string).collect();
        write!(f, "{}", rendered.join("."))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum EditMode {
    #[default]
    Replace,
    /// Push onto the array found at the last segment.
    Append,
}

/// Writes `value` at `path` inside `document`, touching nothing else.
///
/// Every intermediate segment must address an existing child of a compatible
/// container; otherwise an [`AddressingError`] is returned and the document is
/// left unchanged.
pub fn set_at_path(
    document: &mut Value,
    path: JsonPath,
    value: Value,
    mode: EditMode,
) -> Result<()> {
    let mut path = path;
    if path.is_empty() {
        return Err(AddressingError::new(0, "", "path must contain at least one segment").into());
    }
    set_recursive(document, &mut path, 0, value, mode)
}

fn set_recursive(
    target: &mut Value,
    path: &mut JsonPath,
    position: usize,
    value: Value,
    mode: EditMode,
) -> Result<()> {
    let segment = path
        .pop_front()
        .ok_or_else(|| AddressingError::new(position, "", "path ended unexpectedly"))?;
    if path.is_empty() {
        return apply_terminal(target, segment, position, value, mode);
    }
    let child = select_child(target, &segment, position)?;
    set_recursive(child, path, position + 1, value, mode)
}

fn select_child<'a>(
    target: &'a mut Value,
    segment: &PathSegment,
    position: usize,
) -> Result<&'a mut Value> {
    let child = match (segment, target) {
        (PathSegment::Key(key), Value::Object(map)) => map.get_mut(key).ok_or_else(|| {
            AddressingError::new(position, segment.to_string(), "missing key")
        })?,
        (PathSegment::Index(index), Value::Array(items)) => {
            let len = items.len();
            items.get_mut(*index).ok_or_else(|| {
                AddressingError::new(
                    position,
                    segment.to_string(),
                    format!("index out of range for array of length {len}"),
                )
            })?
        }
        (PathSegment::Accessor(accessor), target) => accessor.select(target).ok_or_else(|| {
            AddressingError::new(position, segment.to_string(), "accessor selected nothing")
        })?,
        (PathSegment::Key(_), other) => {
            return Err(mismatch(position, segment, "an object", other));
        }
        (PathSegment::Index(_), other) => {
            return Err(mismatch(position, segment, "an array", other));
        }
    };
    Ok(child)
}

fn apply_terminal(
    target: &mut Value,
    segment: PathSegment,
    position: usize,
    value: Value,
    mode: EditMode,
) -> Result<()> {
    match (&segment, target) {
        (PathSegment::Accessor(accessor), target) => match &accessor.kind {
            AccessorKind::Effect(apply) => apply(target, value),
            AccessorKind::Select(_) => {
                let slot = accessor.select(target).ok_or_else(|| {
                    AddressingError::new(position, segment.to_string(), "accessor selected nothing")
                })?;
                write_slot(slot, value, mode, position, &segment)
            }
        },
        (PathSegment::Key(key), Value::Object(map)) => match mode {
            EditMode::Replace => {
                map.insert(key.clone(), value);
                Ok(())
            }
            EditMode::Append => {
                let slot = map
                    .entry(key.clone())
                    .or_insert_with(|| Value::Array(Vec::new()));
                write_slot(slot, value, mode, position, &segment)
            }
        },
        (PathSegment::Index(index), Value::Array(items)) => {
            let len = items.len();
            let slot = items.get_mut(*index).ok_or_else(|| {
                AddressingError::new(
                    position,
                    segment.to_string(),
                    format!("index out of range for array of length {len}"),
                )
            })?;
            write_slot(slot, value, mode, position, &segment)
        }
        (PathSegment::Key(_), other) => Err(mismatch(position, &segment, "an object", other)),
        (PathSegment::Index(_), other) => Err(mismatch(position, &segment, "an array", other)),
    }
}

fn write_slot(
    slot: &mut Value,
    value: Value,
    mode: EditMode,
    position: usize,
    segment: &PathSegment,
) -> Result<()> {
    match mode {
        EditMode::Replace => {
            *slot = value;
            Ok(())
        }
        EditMode::Append => match slot {
            Value::Array(items) => {
                items.push(value);
                Ok(())
            }
            other => Err(mismatch(position, segment, "an array to append to", other)),
        },
    }
}

fn mismatch(
    position: usize,
    segment: &PathSegment,
    expected: &str,
    found: &Value,
) -> anyhow::Error {
    AddressingError::new(
        position,
        segment.to_string(),
        format!("expected {expected}, found {}", kind_of(found)),
    )
    .into()
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Read-only lookup using key and index segments. Accessor segments need
/// mutable access and never match here.
pub fn get_at_path<'a>(document: &'a Value, path: &JsonPath) -> Option<&'a Value> {
    let mut current = document;
    for segment in path.segments() {
        current = match (segment, current) {
            (PathSegment::Key(key), Value::Object(map)) => map.get(key)?,
            (PathSegment::Index(index), Value::Array(items)) => items.get(*index)?,
            _ => return None,
        };
    }
    Some(current)
}
