//! Source location tracking across one or more GraphQL sources.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::fmt;

/// A 1-based line/column position inside a named (or anonymous) source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SourceLocation {
    /// Line number, starting at 1.
    pub line: usize,
    /// Column number, starting at 1.
    pub column: usize,
    /// Name of the source this location belongs to.
    #[cfg_attr(feature = "serde", serde(skip))]
    pub source_name: Option<String>,
}

impl SourceLocation {
    /// Creates a location without a source name.
    #[must_use]
    pub const fn new(line: usize, column: usize) -> Self {
        Self {
            line,
            column,
            source_name: None,
        }
    }

    /// Attaches a source name.
    #[must_use]
    pub fn with_source_name(mut self, name: impl Into<String>) -> Self {
        self.source_name = Some(name.into());
        self
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source_name {
            Some(name) => write!(f, "{}:{}:{}", name, self.line, self.column),
            None => write!(f, "{}:{}", self.line, self.column),
        }
    }
}

/// A source name paired with a 0-based line inside that source.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SourceAndLine {
    pub source_name: Option<String>,
    pub line: usize,
}

#[derive(Debug, Clone)]
struct SourcePart {
    name: Option<String>,
    text: String,
    line_count: usize,
}

/// Reads several sources as if they were one document.
///
/// Grammar positions are reported against the concatenated text; this type maps an
/// overall line back to the source part (and line inside it) that produced it.
#[derive(Debug, Clone, Default)]
pub struct MultiSourceReader {
    parts: Vec<SourcePart>,
}

impl MultiSourceReader {
    /// Creates an empty reader.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a source part.
    #[must_use]
    pub fn string(mut self, text: impl Into<String>, name: Option<&str>) -> Self {
        let text = text.into();
        let line_count = count_lines(&text);
        self.parts.push(SourcePart {
            name: name.map(str::to_string),
            text,
            line_count,
        });
        self
    }

    /// Returns the total number of lines across every part.
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.parts.iter().map(|p| p.line_count).sum()
    }

    /// Returns the concatenated text of every part.
    #[must_use]
    pub fn contents(&self) -> String {
        self.parts.iter().map(|p| p.text.as_str()).collect()
    }

    /// Returns every line of the concatenated sources.
    #[must_use]
    pub fn lines(&self) -> Vec<&str> {
        self.parts.iter().flat_map(|p| p.text.lines()).collect()
    }

    /// Maps a 0-based overall line to its source part and 0-based line inside it.
    ///
    /// Lines past the end clamp to the last line of the last part.
    #[must_use]
    pub fn source_and_line(&self, overall_line: usize) -> SourceAndLine {
        let Some(last) = self.parts.last() else {
            return SourceAndLine::default();
        };

        let mut page = 0;
        for part in &self.parts {
            if overall_line < page + part.line_count {
                return SourceAndLine {
                    source_name: part.name.clone(),
                    line: overall_line - page,
                };
            }
            page += part.line_count;
        }

        let last_page = page - last.line_count;
        SourceAndLine {
            source_name: last.name.clone(),
            line: (overall_line - last_page).min(last.line_count),
        }
    }
}

fn count_lines(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    let newlines = text.bytes().filter(|b| *b == b'\n').count();
    if text.ends_with('\n') {
        newlines
    } else {
        newlines + 1
    }
}
