//! Syntax diagnostics for GraphQL sources.
//!
//! Grammars report 1-based lines and 0-based character positions against the whole
//! input. GraphQL locations are 1-based on both axes and relative to the source part that
//! produced them, so every diagnostic goes through [`source_location`].

use crate::location::{MultiSourceReader, SourceLocation};
use miette::Diagnostic;
use thiserror::Error;

/// Lines of context shown on each side of the offending line.
const PREVIEW_RADIUS: usize = 3;

/// Converts a grammar position into a GraphQL source location.
///
/// `grammar_line` is 1-based, `char_position_in_line` is 0-based.
#[must_use]
pub fn source_location(
    reader: &MultiSourceReader,
    grammar_line: usize,
    char_position_in_line: usize,
) -> SourceLocation {
    let found = reader.source_and_line(grammar_line.saturating_sub(1));
    SourceLocation {
        line: found.line + 1,
        column: char_position_in_line + 1,
        source_name: found.source_name,
    }
}

/// Returns the lines surrounding a 1-based grammar line, newline terminated.
#[must_use]
pub fn source_preview(reader: &MultiSourceReader, grammar_line: usize) -> String {
    let start = grammar_line.saturating_sub(PREVIEW_RADIUS);
    let end = grammar_line + PREVIEW_RADIUS;
    let mut preview = String::new();
    for (index, line) in reader.lines().iter().enumerate() {
        if index >= start && index <= end {
            preview.push_str(line);
            preview.push('\n');
        }
    }
    preview
}

/// A document could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
#[error("Invalid Syntax : {description} at line {} column {}", .location.line, .location.column)]
#[diagnostic(code(gqlexec::invalid_syntax))]
pub struct InvalidSyntaxError {
    /// What went wrong, without the position suffix.
    pub description: String,
    /// Where it went wrong.
    pub location: SourceLocation,
    /// The token the grammar rejected, if known.
    pub offending_token: Option<String>,
    /// A few lines around the error.
    #[help]
    pub preview: Option<String>,
}

impl InvalidSyntaxError {
    /// Creates an error for a grammar position.
    pub fn at(
        reader: &MultiSourceReader,
        description: impl Into<String>,
        grammar_line: usize,
        char_position_in_line: usize,
    ) -> Self {
        Self {
            description: description.into(),
            location: source_location(reader, grammar_line, char_position_in_line),
            offending_token: None,
            preview: Some(source_preview(reader, grammar_line)),
        }
    }

    /// Creates an error for a token the grammar could not accept.
    pub fn offending_token(
        reader: &MultiSourceReader,
        token: impl Into<String>,
        grammar_line: usize,
        char_position_in_line: usize,
    ) -> Self {
        let token = token.into();
        let mut error = Self::at(
            reader,
            format!("offending token '{token}'"),
            grammar_line,
            char_position_in_line,
        );
        error.offending_token = Some(token);
        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader() -> MultiSourceReader {
        MultiSourceReader::new()
            .string("query {\n  a\n}\n", Some("first.graphql"))
            .string("query {\n  b(x: )\n}\n", Some("second.graphql"))
    }

    #[test]
    fn test_location_is_relative_to_its_source() {
        let location = source_location(&reader(), 5, 7);
        assert_eq!(location.line, 2);
        assert_eq!(location.column, 8);
        assert_eq!(location.source_name.as_deref(), Some("second.graphql"));
    }

    #[test]
    fn test_first_line_first_column() {
        let location = source_location(&reader(), 1, 0);
        assert_eq!(location, SourceLocation::new(1, 1).with_source_name("first.graphql"));
    }

    #[test]
    fn test_offending_token_message() {
        let error = InvalidSyntaxError::offending_token(&reader(), ")", 5, 7);
        assert_eq!(
            error.to_string(),
            "Invalid Syntax : offending token ')' at line 2 column 8"
        );
        assert_eq!(error.offending_token.as_deref(), Some(")"));
    }

    #[test]
    fn test_preview_window() {
        let preview = source_preview(&reader(), 5);
        assert_eq!(preview, "}\nquery {\n  b(x: )\n}\n");
    }
}
