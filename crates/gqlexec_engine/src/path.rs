//! Result paths.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A path segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Field(String),
    Index(usize),
}

impl From<String> for PathSegment {
    fn from(s: String) -> Self {
        Self::Field(s)
    }
}

impl From<&str> for PathSegment {
    fn from(s: &str) -> Self {
        Self::Field(s.to_string())
    }
}

impl From<usize> for PathSegment {
    fn from(i: usize) -> Self {
        Self::Index(i)
    }
}

/// Position of a value in the response tree.
///
/// Paths compare structurally, so two occurrences of the same logical field reached
/// through different fragments produce equal paths.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ResultPath {
    segments: Vec<PathSegment>,
}

impl ResultPath {
    /// The empty path of the operation root.
    #[must_use]
    pub fn root() -> Self {
        Self::default()
    }

    /// Builds a path from segments.
    #[must_use]
    pub fn from_segments(segments: Vec<PathSegment>) -> Self {
        Self { segments }
    }

    /// Returns a new path extended with a field name.
    #[must_use]
    pub fn segment(&self, name: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(PathSegment::Field(name.into()));
        Self { segments }
    }

    /// Returns a new path extended with a list index.
    #[must_use]
    pub fn index(&self, index: usize) -> Self {
        let mut segments = self.segments.clone();
        segments.push(PathSegment::Index(index));
        Self { segments }
    }

    /// Returns the parent path, or `None` at the root.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.segments.is_empty() {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Number of field segments, ignoring list indices.
    #[must_use]
    pub fn level(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, PathSegment::Field(_)))
            .count()
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn last_segment(&self) -> Option<&PathSegment> {
        self.segments.last()
    }

    /// The literal segment list used in serialized errors.
    #[must_use]
    pub fn to_list(&self) -> Vec<PathSegment> {
        self.segments.clone()
    }
}

impl fmt::Display for ResultPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return write!(f, "");
        }
        for segment in &self.segments {
            match segment {
                PathSegment::Field(name) => write!(f, "/{name}")?,
                PathSegment::Index(i) => write!(f, "[{i}]")?,
            }
        }
        Ok(())
    }
}
