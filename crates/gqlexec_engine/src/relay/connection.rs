use crate::error::FieldError;
use crate::fetcher::{DataFetcher, DataFetcherResult, DataFetchingEnvironment, FetchResult};
use base64::prelude::BASE64_URL_SAFE_NO_PAD;
use base64::Engine as _;
use futures::future::{self, BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Marker every cursor of a [`SimpleListConnection`] starts with before encoding.
pub const DEFAULT_CURSOR_PREFIX: &str = "simple-cursor";

/// An opaque position in a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionCursor(String);

impl ConnectionCursor {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn value(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge<T> {
    pub node: T,
    pub cursor: ConnectionCursor,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub start_cursor: Option<ConnectionCursor>,
    pub end_cursor: Option<ConnectionCursor>,
    pub has_previous_page: bool,
    pub has_next_page: bool,
}

/// One page of a list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection<T> {
    pub edges: Vec<Edge<T>>,
    pub page_info: PageInfo,
}

impl<T> Connection<T> {
    /// A connection without edges.
    pub fn empty() -> Self {
        Self {
            edges: Vec::new(),
            page_info: PageInfo::default(),
        }
    }
}

/// The standard pagination arguments of a connection field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionArguments {
    pub first: Option<i64>,
    pub last: Option<i64>,
    pub after: Option<String>,
    pub before: Option<String>,
}

impl ConnectionArguments {
    #[must_use]
    pub fn first(mut self, first: i64) -> Self {
        self.first = Some(first);
        self
    }

    #[must_use]
    pub fn last(mut self, last: i64) -> Self {
        self.last = Some(last);
        self
    }

    #[must_use]
    pub fn after(mut self, cursor: &ConnectionCursor) -> Self {
        self.after = Some(cursor.value().to_string());
        self
    }

    #[must_use]
    pub fn before(mut self, cursor: &ConnectionCursor) -> Self {
        self.before = Some(cursor.value().to_string());
        self
    }
}

/// A cursor that was not produced by the connection reading it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidCursorError {
    #[error("The cursor is not in base64 format : '{0}'")]
    NotBase64(String),
    #[error("The cursor prefix is missing from the cursor : '{0}'")]
    MissingPrefix(String),
    #[error("The cursor was not created by this class : '{0}'")]
    InvalidOffset(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    #[error("The page size must not be negative: '{argument}'={value}")]
    InvalidPageSize { argument: &'static str, value: i64 },
    #[error(transparent)]
    InvalidCursor(#[from] InvalidCursorError),
}

impl From<ConnectionError> for FieldError {
    fn from(error: ConnectionError) -> Self {
        let code = match error {
            ConnectionError::InvalidPageSize { .. } => "INVALID_PAGE_SIZE",
            ConnectionError::InvalidCursor(_) => "INVALID_CURSOR",
        };
        FieldError::new(error.to_string()).with_code(code)
    }
}

/// Pages through a list held in memory, using list offsets as cursors.
#[derive(Debug, Clone)]
pub struct SimpleListConnection<T> {
    data: Vec<T>,
    prefix: String,
}

impl<T> SimpleListConnection<T> {
    pub fn new(data: Vec<T>) -> Self {
        Self::with_prefix(data, DEFAULT_CURSOR_PREFIX)
    }

    pub fn with_prefix(data: Vec<T>, prefix: impl Into<String>) -> Self {
        Self {
            data,
            prefix: prefix.into(),
        }
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    fn create_cursor(&self, offset: usize) -> ConnectionCursor {
        ConnectionCursor(BASE64_URL_SAFE_NO_PAD.encode(format!("{}{offset}", self.prefix)))
    }

    /// Decodes `cursor` into a list offset.
    pub fn offset_from_cursor(&self, cursor: &str) -> Result<usize, InvalidCursorError> {
        let decoded = BASE64_URL_SAFE_NO_PAD
            .decode(cursor)
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .ok_or_else(|| InvalidCursorError::NotBase64(cursor.to_string()))?;
        let offset = decoded
            .strip_prefix(self.prefix.as_str())
            .ok_or_else(|| InvalidCursorError::MissingPrefix(cursor.to_string()))?;
        offset
            .parse()
            .map_err(|_| InvalidCursorError::InvalidOffset(cursor.to_string()))
    }

    /// The cursor of the first element equal to `object`.
    pub fn cursor_for_object_in_connection(&self, object: &T) -> Option<ConnectionCursor>
    where
        T: PartialEq,
    {
        self.data
            .iter()
            .position(|candidate| candidate == object)
            .map(|offset| self.create_cursor(offset))
    }

    /// Slices the list by `after`/`before`, then limits it by `first`/`last`.
    ///
    /// The page reports a previous (next) page when its first (last) edge is not the
    /// first (last) edge of the whole list.
    pub fn connection(&self, arguments: &ConnectionArguments) -> Result<Connection<T>, ConnectionError>
    where
        T: Clone,
    {
        if self.data.is_empty() {
            return Ok(Connection::empty());
        }
        let len = self.data.len();
        let begin = match &arguments.after {
            Some(cursor) => self.offset_from_cursor(cursor)?.saturating_add(1),
            None => 0,
        };
        let end = match &arguments.before {
            Some(cursor) => self.offset_from_cursor(cursor)?.min(len),
            None => len,
        };
        let begin = begin.min(end);
        let mut window = begin..end;

        if let Some(first) = arguments.first {
            let first = usize::try_from(first).map_err(|_| ConnectionError::InvalidPageSize {
                argument: "first",
                value: first,
            })?;
            window.end = window.start + first.min(window.len());
        }
        if let Some(last) = arguments.last {
            let last = usize::try_from(last).map_err(|_| ConnectionError::InvalidPageSize {
                argument: "last",
                value: last,
            })?;
            window.start = window.end - last.min(window.len());
        }
        if window.is_empty() {
            return Ok(Connection::empty());
        }

        let edges: Vec<_> = window
            .clone()
            .map(|offset| Edge {
                node: self.data[offset].clone(),
                cursor: self.create_cursor(offset),
            })
            .collect();
        let page_info = PageInfo {
            start_cursor: edges.first().map(|edge| edge.cursor.clone()),
            end_cursor: edges.last().map(|edge| edge.cursor.clone()),
            has_previous_page: window.start > 0,
            has_next_page: window.end < len,
        };
        Ok(Connection { edges, page_info })
    }
}

impl<T> DataFetcher for SimpleListConnection<T>
where
    T: Serialize + Clone + Send + Sync + 'static,
{
    fn get(&self, env: DataFetchingEnvironment) -> BoxFuture<'static, FetchResult> {
        let result = env
            .arguments()
            .to_typed::<ConnectionArguments>()
            .map_err(FieldError::from)
            .and_then(|arguments| Ok(self.connection(&arguments)?))
            .and_then(|connection| Ok(serde_json::to_value(connection)?))
            .map(DataFetcherResult::new);
        future::ready(result).boxed()
    }
}
