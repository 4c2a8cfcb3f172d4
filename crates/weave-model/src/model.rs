use serde_json::Map;
use serde_json::Value as JsonValue;

use crate::error::ModelError;
use crate::path::Path;
use crate::path::Segment;

/// A notification produced by exactly one model mutation.
///
/// Mutations are returned to the caller synchronously and in issue order; the
/// model never folds two of them together.
#[derive(Clone, Debug, PartialEq)]
pub enum Mutation {
    Change {
        path: Path,
        previous: Option<JsonValue>,
    },
    Load {
        path: Path,
    },
    Unload {
        path: Path,
        previous: Option<JsonValue>,
    },
    Insert {
        path: Path,
        index: usize,
        values: Vec<JsonValue>,
    },
    Remove {
        path: Path,
        index: usize,
        values: Vec<JsonValue>,
    },
    Move {
        path: Path,
        from: usize,
        to: usize,
        how_many: usize,
    },
}

impl Mutation {
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Mutation::Change { path, .. }
            | Mutation::Load { path }
            | Mutation::Unload { path, .. }
            | Mutation::Insert { path, .. }
            | Mutation::Remove { path, .. }
            | Mutation::Move { path, .. } => path,
        }
    }
}

/// In-memory key-path store.
#[derive(Clone, Debug, PartialEq)]
pub struct Model {
    data: JsonValue,
}

impl Default for Model {
    fn default() -> Self {
        Self::new()
    }
}

impl Model {
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: JsonValue::Object(Map::new()),
        }
    }

    pub fn from_json(data: JsonValue) -> Result<Self, ModelError> {
        if !data.is_object() {
            return Err(ModelError::RootNotObject);
        }
        Ok(Self { data })
    }

    #[must_use]
    pub fn data(&self) -> &JsonValue {
        &self.data
    }

    #[must_use]
    pub fn get(&self, path: &Path) -> Option<&JsonValue> {
        lookup(&self.data, path.segments())
    }

    #[must_use]
    pub fn scope(&self, path: &Path) -> ChildModel {
        ChildModel::new(path.clone())
    }

    pub fn set(&mut self, path: &Path, value: JsonValue) -> Result<Mutation, ModelError> {
        let previous = self.get(path).cloned();
        if path.is_empty() {
            if !value.is_object() {
                return Err(ModelError::RootNotObject);
            }
            self.data = value;
        } else {
            *slot_mut(&mut self.data, path)? = value;
        }
        tracing::trace!(%path, "model set");
        Ok(Mutation::Change {
            path: path.clone(),
            previous,
        })
    }

    /// Set a value that is arriving from elsewhere (initial data, a fetch).
    pub fn load(&mut self, path: &Path, value: JsonValue) -> Result<Mutation, ModelError> {
        self.set(path, value)?;
        Ok(Mutation::Load { path: path.clone() })
    }

    pub fn del(&mut self, path: &Path) -> Result<Mutation, ModelError> {
        let previous = self.get(path).cloned();
        if let (Some(parent), Some(last)) = (path.parent(), path.last()) {
            match lookup_mut(&mut self.data, parent.segments()) {
                Some(JsonValue::Object(map)) => {
                    map.remove(&last.to_string());
                }
                Some(JsonValue::Array(items)) => {
                    if let Some(slot) = last.as_index().and_then(|i| items.get_mut(i)) {
                        *slot = JsonValue::Null;
                    }
                }
                _ => {}
            }
        } else {
            self.data = JsonValue::Object(Map::new());
        }
        Ok(Mutation::Unload {
            path: path.clone(),
            previous,
        })
    }

    pub fn insert(
        &mut self,
        path: &Path,
        index: usize,
        values: Vec<JsonValue>,
    ) -> Result<Mutation, ModelError> {
        let items = array_mut(&mut self.data, path, true)?;
        let index = index.min(items.len());
        items.splice(index..index, values.iter().cloned());
        tracing::trace!(%path, index, count = values.len(), "model insert");
        Ok(Mutation::Insert {
            path: path.clone(),
            index,
            values,
        })
    }

    pub fn push(&mut self, path: &Path, value: JsonValue) -> Result<Mutation, ModelError> {
        let len = self
            .get(path)
            .and_then(JsonValue::as_array)
            .map_or(0, Vec::len);
        self.insert(path, len, vec![value])
    }

    pub fn remove(
        &mut self,
        path: &Path,
        index: usize,
        how_many: usize,
    ) -> Result<Mutation, ModelError> {
        let items = array_mut(&mut self.data, path, false)?;
        let len = items.len();
        if index > len {
            return Err(ModelError::IndexOutOfBounds {
                path: path.clone(),
                index,
                len,
            });
        }
        let end = index.saturating_add(how_many).min(len);
        let values: Vec<JsonValue> = items.drain(index..end).collect();
        tracing::trace!(%path, index, count = values.len(), "model remove");
        Ok(Mutation::Remove {
            path: path.clone(),
            index,
            values,
        })
    }

    pub fn move_items(
        &mut self,
        path: &Path,
        from: usize,
        to: usize,
        how_many: usize,
    ) -> Result<Mutation, ModelError> {
        let items = array_mut(&mut self.data, path, false)?;
        let len = items.len();
        for bound in [from, to] {
            if bound.checked_add(how_many).map_or(true, |end| end > len) {
                return Err(ModelError::IndexOutOfBounds {
                    path: path.clone(),
                    index: bound.saturating_add(how_many),
                    len,
                });
            }
        }
        let moved: Vec<JsonValue> = items.drain(from..from + how_many).collect();
        items.splice(to..to, moved);
        tracing::trace!(%path, from, to, how_many, "model move");
        Ok(Mutation::Move {
            path: path.clone(),
            from,
            to,
            how_many,
        })
    }
}

/// A model view rooted at a path. Component controllers hold one of these.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChildModel {
    at: Path,
}

impl ChildModel {
    #[must_use]
    pub fn new(at: Path) -> Self {
        Self { at }
    }

    #[must_use]
    pub fn at(&self) -> &Path {
        &self.at
    }

    #[must_use]
    pub fn path(&self, relative: &Path) -> Path {
        self.at.join(relative)
    }

    #[must_use]
    pub fn get<'m>(&self, model: &'m Model, relative: &Path) -> Option<&'m JsonValue> {
        model.get(&self.path(relative))
    }

    pub fn set(
        &self,
        model: &mut Model,
        relative: &Path,
        value: JsonValue,
    ) -> Result<Mutation, ModelError> {
        model.set(&self.path(relative), value)
    }
}

pub(crate) fn lookup<'a>(value: &'a JsonValue, segments: &[Segment]) -> Option<&'a JsonValue> {
    segments
        .iter()
        .try_fold(value, |current, segment| match current {
            JsonValue::Object(map) => map.get(&segment.to_string()),
            JsonValue::Array(items) => segment.as_index().and_then(|i| items.get(i)),
            _ => None,
        })
}

fn lookup_mut<'a>(value: &'a mut JsonValue, segments: &[Segment]) -> Option<&'a mut JsonValue> {
    segments
        .iter()
        .try_fold(value, |current, segment| match current {
            JsonValue::Object(map) => map.get_mut(&segment.to_string()),
            JsonValue::Array(items) => segment.as_index().and_then(|i| items.get_mut(i)),
            _ => None,
        })
}

/// Walk to the slot at `path`, creating intermediate containers on the way.
fn slot_mut<'a>(root: &'a mut JsonValue, path: &Path) -> Result<&'a mut JsonValue, ModelError> {
    let mut current = root;
    for (depth, segment) in path.segments().iter().enumerate() {
        if current.is_null() {
            *current = match segment {
                Segment::Index(_) => JsonValue::Array(Vec::new()),
                Segment::Key(_) => JsonValue::Object(Map::new()),
            };
        }
        current = match current {
            JsonValue::Object(map) => map.entry(segment.to_string()).or_insert(JsonValue::Null),
            JsonValue::Array(items) => {
                let index = segment.as_index().ok_or_else(|| ModelError::NotAContainer {
                    path: Path::new(path.segments()[..=depth].to_vec()),
                })?;
                if index >= items.len() {
                    items.resize(index + 1, JsonValue::Null);
                }
                &mut items[index]
            }
            _ => {
                return Err(ModelError::NotAContainer {
                    path: Path::new(path.segments()[..depth].to_vec()),
                })
            }
        };
    }
    Ok(current)
}

fn array_mut<'a>(
    root: &'a mut JsonValue,
    path: &Path,
    create: bool,
) -> Result<&'a mut Vec<JsonValue>, ModelError> {
    let slot = if create {
        let slot = slot_mut(root, path)?;
        if slot.is_null() {
            *slot = JsonValue::Array(Vec::new());
        }
        slot
    } else {
        lookup_mut(root, path.segments()).ok_or_else(|| ModelError::NotAnArray {
            path: path.clone(),
        })?
    };
    slot.as_array_mut().ok_or_else(|| ModelError::NotAnArray {
        path: path.clone(),
    })
}
