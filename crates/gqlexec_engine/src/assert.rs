//! Contract violations.
//!
//! Calling code that breaks an API contract (reading step info from a root node, adding
//! children to a leaf, registering loaders on the unset registry) is a bug in the caller.
//! These are panics, never `GraphQLError`s.

/// Panics with a contract-violation message.
#[track_caller]
pub fn should_never_happen(message: impl std::fmt::Display) -> ! {
    panic!("Internal error: should never happen: {message}")
}
