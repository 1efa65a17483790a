//! Backpressured publishers for subscription results.
//!
//! A [`Publisher`] hands each [`Subscriber`] a [`Subscription`] through which the
//! subscriber requests items. Signals to one subscriber never overlap: `on_subscribe` comes
//! first, then at most as many `on_next` calls as were requested, then at most one of
//! `on_error` or `on_complete`.

mod delegating;
mod mapping;
mod mutex_executor;
mod single_subscriber;
mod stream;

pub use delegating::DelegatingSubscription;
pub use mapping::CompletionStageMappingPublisher;
pub use mutex_executor::MutexExecutor;
pub use single_subscriber::SingleSubscriberPublisher;
pub use stream::SubscriberStream;

use std::sync::Arc;
use thiserror::Error;

/// Why a stream terminated with an error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    #[error("This publisher only supports one subscriber")]
    AlreadySubscribed,
    #[error("Demand must be positive, got {0}")]
    InvalidDemand(u64),
    #[error("{0}")]
    Upstream(String),
    #[error("Mapping failed: {0}")]
    Mapping(String),
    #[error("No Tokio runtime to run the mapping on")]
    NoRuntime,
}

/// The link between one publisher and one subscriber.
pub trait Subscription: Send + Sync {
    /// Asks for `n` more items. Zero is a protocol violation reported through `on_error`.
    fn request(&self, n: u64);

    /// Stops delivery. Items already in flight may still arrive.
    fn cancel(&self);
}

pub trait Subscriber<T>: Send + Sync {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>);

    fn on_next(&self, item: T);

    fn on_error(&self, error: StreamError);

    fn on_complete(&self);
}

pub trait Publisher<T>: Send + Sync {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>);
}

/// A subscription that ignores every request.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSubscription;

impl Subscription for NoopSubscription {
    fn request(&self, _n: u64) {}

    fn cancel(&self) {}
}
