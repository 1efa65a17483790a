//! Core utilities for gqlexec.
//!
//! This crate provides the source-position types used throughout gqlexec:
//! - `location`: Source locations and multi-source line mapping
//! - `diagnostics`: Syntax error reporting

pub mod diagnostics;
pub mod location;

pub use diagnostics::{source_location, source_preview, InvalidSyntaxError};
pub use location::{MultiSourceReader, SourceAndLine, SourceLocation};
