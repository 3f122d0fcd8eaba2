//! Snapshot change detection.

use serde_json::Value;

/// Synthetic field reported when two non-container roots differ.
pub const ROOT_FIELD: &str = "$";

/// Granularity of reported changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DiffMode {
    /// Changed top-level keys; a nested field counts as one key.
    #[default]
    Shallow,
    /// Dotted paths of changed leaves, e.g. `stats.total`.
    Deep,
}

/// Compares two snapshots of the same resource.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChangeDetector {
    mode: DiffMode,
}

impl ChangeDetector {
    pub fn new(mode: DiffMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> DiffMode {
        self.mode
    }

    /// Fields that differ between `old` and `new`.
    ///
    /// Keys are listed in `old`'s order, then keys present only in `new`.
    /// Arrays are compared index-wise. The result is empty iff the values are
    /// equal.
    pub fn diff(&self, old: &Value, new: &Value) -> Vec<String> {
        let mut changed = Vec::new();
        match self.mode {
            DiffMode::Shallow => shallow(old, new, &mut changed),
            DiffMode::Deep => deep(old, new, None, &mut changed),
        }
        changed
    }
}

/// Shallow diff with the default detector.
pub fn diff(old: &Value, new: &Value) -> Vec<String> {
    ChangeDetector::default().diff(old, new)
}

fn shallow(old: &Value, new: &Value, changed: &mut Vec<String>) {
    for_each_child(old, new, |key, a, b| {
        if a != b {
            changed.push(key);
        }
    })
    .unwrap_or_else(|| {
        if old != new {
            changed.push(ROOT_FIELD.to_string());
        }
    });
}

fn deep(old: &Value, new: &Value, prefix: Option<&str>, changed: &mut Vec<String>) {
    let visited = for_each_child(old, new, |key, a, b| {
        let path = match prefix {
            Some(prefix) => format!("{}.{}", prefix, key),
            None => key,
        };
        match (a, b) {
            (Some(a), Some(b)) if is_container(a) && is_container(b) => {
                deep(a, b, Some(&path), changed)
            }
            (a, b) if a != b => changed.push(path),
            _ => {}
        }
    });

    if visited.is_none() && old != new {
        changed.push(prefix.unwrap_or(ROOT_FIELD).to_string());
    }
}

fn is_container(value: &Value) -> bool {
    matches!(value, Value::Object(_) | Value::Array(_))
}

/// Visit the union of children when both values are objects or both are
/// arrays. Returns `None` when the roots are not comparable containers.
fn for_each_child<'a>(
    old: &'a Value,
    new: &'a Value,
    mut visit: impl FnMut(String, Option<&'a Value>, Option<&'a Value>),
) -> Option<()> {
    match (old, new) {
        (Value::Object(a), Value::Object(b)) => {
            for (key, value) in a {
                visit(key.clone(), Some(value), b.get(key));
            }
            for (key, value) in b {
                if !a.contains_key(key) {
                    visit(key.clone(), None, Some(value));
                }
            }
            Some(())
        }
        (Value::Array(a), Value::Array(b)) => {
            for index in 0..a.len().max(b.len()) {
                visit(index.to_string(), a.get(index), b.get(index));
            }
            Some(())
        }
        _ => None,
    }
}
