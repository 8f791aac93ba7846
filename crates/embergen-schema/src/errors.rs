use std::collections::HashMap;
use std::fmt;

use itertools::Itertools;
use thiserror::Error;

/// One step into the configuration tree.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PathItem {
    Key(String),
    Index(usize),
}

impl PathItem {
    pub fn key(key: impl Into<String>) -> Self {
        PathItem::Key(key.into())
    }
}

impl fmt::Display for PathItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathItem::Key(key) => f.write_str(key),
            PathItem::Index(i) => write!(f, "{i}"),
        }
    }
}

fn render_path(path: &[PathItem]) -> String {
    let mut rendered = String::new();
    for item in path {
        match item {
            PathItem::Key(key) => {
                if !rendered.is_empty() {
                    rendered.push('.');
                }
                rendered.push_str(key);
            }
            PathItem::Index(i) => {
                rendered.push_str(&format!("[{i}]"));
            }
        }
    }
    rendered
}

/// A single problem found during validation, located by its path into the
/// configuration tree.
#[derive(Clone, Debug, PartialEq, Error)]
pub struct ValidationError {
    pub path: Vec<PathItem>,
    pub message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        ValidationError {
            path: Vec::new(),
            message: message.into(),
        }
    }

    pub fn prefixed(mut self, item: PathItem) -> Self {
        self.path.insert(0, item);
        self
    }

    /// Renders the error with the source range of the offending node, when
    /// the document map has one.
    pub fn render_with(&self, ranges: &DocumentMap) -> String {
        match ranges.lookup_closest(&self.path) {
            Some(range) => format!(
                "{self} (at line {}, column {})",
                range.start_line, range.start_col
            ),
            None => self.to_string(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            f.write_str(&self.message)
        } else {
            write!(f, "{}: {}", render_path(&self.path), self.message)
        }
    }
}

/// Every problem found in one validation pass. Validation keeps going after
/// the first failure so the user sees all of them at once.
#[derive(Clone, Debug, Default, PartialEq, Error)]
pub struct ValidationErrors(pub Vec<ValidationError>);

impl ValidationErrors {
    pub fn single(message: impl Into<String>) -> Self {
        ValidationErrors(vec![ValidationError::new(message)])
    }

    pub fn push(&mut self, error: ValidationError) {
        self.0.push(error);
    }

    pub fn extend(&mut self, other: ValidationErrors) {
        self.0.extend(other.0);
    }

    pub fn prefixed(self, item: PathItem) -> Self {
        ValidationErrors(
            self.0
                .into_iter()
                .map(|e| e.prefixed(item.clone()))
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Ok if no errors were collected, otherwise self as the error.
    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl From<ValidationError> for ValidationErrors {
    fn from(error: ValidationError) -> Self {
        ValidationErrors(vec![error])
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.iter().map(ToString::to_string).join("\n"))
    }
}

/// A half-open region of the source document, 1-based.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DocumentRange {
    pub start_line: u32,
    pub start_col: u32,
    pub end_line: u32,
    pub end_col: u32,
}

/// Side table mapping configuration paths to where they came from in the
/// source document. The parser fills it in; error rendering reads it.
#[derive(Clone, Debug, Default)]
pub struct DocumentMap {
    ranges: HashMap<Vec<PathItem>, DocumentRange>,
}

impl DocumentMap {
    pub fn new() -> Self {
        DocumentMap::default()
    }

    pub fn insert(&mut self, path: Vec<PathItem>, range: DocumentRange) {
        self.ranges.insert(path, range);
    }

    pub fn lookup(&self, path: &[PathItem]) -> Option<&DocumentRange> {
        self.ranges.get(path)
    }

    /// Walks up the tree until some ancestor of `path` has a recorded range.
    pub fn lookup_closest(&self, path: &[PathItem]) -> Option<&DocumentRange> {
        let mut path = path;
        loop {
            if let Some(range) = self.ranges.get(path) {
                return Some(range);
            }
            match path.split_last() {
                Some((_, rest)) => path = rest,
                None => return None,
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn renders_paths() {
        let error = ValidationError::new("expected integer")
            .prefixed(PathItem::key("update_interval"))
            .prefixed(PathItem::Index(0))
            .prefixed(PathItem::key("sensor"));
        assert_eq!(
            error.to_string(),
            "sensor[0].update_interval: expected integer"
        );
    }

    #[test]
    fn rootless_errors_render_bare() {
        assert_eq!(ValidationError::new("boom").to_string(), "boom");
    }

    #[test]
    fn closest_range_lookup() {
        let mut map = DocumentMap::new();
        map.insert(
            vec![PathItem::key("sensor"), PathItem::Index(0)],
            DocumentRange {
                start_line: 4,
                start_col: 3,
                end_line: 6,
                end_col: 1,
            },
        );

        let deep = vec![
            PathItem::key("sensor"),
            PathItem::Index(0),
            PathItem::key("update_interval"),
        ];
        assert_eq!(map.lookup(&deep), None);
        assert_eq!(map.lookup_closest(&deep).map(|r| r.start_line), Some(4));
        assert_eq!(map.lookup_closest(&[PathItem::key("other")]), None);
    }
}
