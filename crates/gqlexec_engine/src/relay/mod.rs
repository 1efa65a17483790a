//! Relay helpers: cursor connections over in-memory lists and global object ids.

mod connection;

pub use connection::{
    Connection, ConnectionArguments, ConnectionCursor, ConnectionError, Edge, InvalidCursorError, PageInfo,
    SimpleListConnection, DEFAULT_CURSOR_PREFIX,
};

use base64::prelude::BASE64_STANDARD;
use base64::Engine as _;
use thiserror::Error;

/// A global id split back into its type name and type-local id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedGlobalId {
    pub type_name: String,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GlobalIdError {
    #[error("Global id is not in base64 format: '{0}'")]
    NotBase64(String),
    #[error("Global id does not contain a type name: '{0}'")]
    MissingTypeName(String),
}

/// Encodes `type_name` and `id` into one opaque id.
pub fn to_global_id(type_name: &str, id: &str) -> String {
    BASE64_STANDARD.encode(format!("{type_name}:{id}"))
}

/// Reverses [`to_global_id`].
pub fn from_global_id(global_id: &str) -> Result<ResolvedGlobalId, GlobalIdError> {
    let decoded = BASE64_STANDARD
        .decode(global_id)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .ok_or_else(|| GlobalIdError::NotBase64(global_id.to_string()))?;
    let (type_name, id) = decoded
        .split_once(':')
        .ok_or_else(|| GlobalIdError::MissingTypeName(global_id.to_string()))?;
    Ok(ResolvedGlobalId {
        type_name: type_name.to_string(),
        id: id.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_id_round_trip() {
        let global = to_global_id("User", "42:a");
        assert_eq!(global, "VXNlcjo0Mjph");
        assert_eq!(
            from_global_id(&global),
            Ok(ResolvedGlobalId {
                type_name: "User".into(),
                id: "42:a".into()
            })
        );
    }

    #[test]
    fn test_malformed_global_ids() {
        assert_eq!(
            from_global_id("%%%"),
            Err(GlobalIdError::NotBase64("%%%".into()))
        );
        assert_eq!(
            from_global_id("VXNlcjQy"),
            Err(GlobalIdError::MissingTypeName("VXNlcjQy".into()))
        );
    }
}
