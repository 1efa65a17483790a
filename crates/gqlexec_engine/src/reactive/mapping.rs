use super::{DelegatingSubscription, MutexExecutor, Publisher, StreamError, Subscriber, Subscription};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::warn;

/// The pending result of mapping one upstream item.
pub type MappingFuture<D> = BoxFuture<'static, Result<D, StreamError>>;

type Mapper<U, D> = Arc<dyn Fn(U) -> MappingFuture<D> + Send + Sync>;

/// Maps every item of an upstream publisher through an asynchronous function.
///
/// Mapped items are delivered as their mappings finish. Upstream completion or error is
/// held back until every mapping in flight has finished. A failing mapping, or a mapper
/// that panics while starting one, errors the downstream subscriber and cancels the
/// upstream subscription.
pub struct CompletionStageMappingPublisher<U, D> {
    upstream: Arc<dyn Publisher<U>>,
    mapper: Mapper<U, D>,
}

impl<U, D> CompletionStageMappingPublisher<U, D> {
    pub fn new<F>(upstream: Arc<dyn Publisher<U>>, mapper: F) -> Self
    where
        F: Fn(U) -> MappingFuture<D> + Send + Sync + 'static,
    {
        Self {
            upstream,
            mapper: Arc::new(mapper),
        }
    }

    pub fn upstream(&self) -> &Arc<dyn Publisher<U>> {
        &self.upstream
    }
}

impl<U: Send + 'static, D: Send + 'static> Publisher<D> for CompletionStageMappingPublisher<U, D> {
    fn subscribe(&self, downstream: Arc<dyn Subscriber<D>>) {
        let inner = Arc::new(Inner {
            downstream,
            mapper: Arc::clone(&self.mapper),
            executor: MutexExecutor::new(),
            state: Mutex::new(MappingState {
                upstream: None,
                in_flight: VecDeque::new(),
                next_id: 0,
                terminal: None,
                done: false,
            }),
        });
        self.upstream.subscribe(Arc::new(MappingSubscriber { inner }));
    }
}

enum Terminal {
    Complete,
    Error(StreamError),
}

struct MappingState {
    upstream: Option<Arc<dyn Subscription>>,
    in_flight: VecDeque<u64>,
    next_id: u64,
    /// Upstream's terminal signal, waiting for the mappings in flight.
    terminal: Option<Terminal>,
    done: bool,
}

struct Inner<U, D> {
    downstream: Arc<dyn Subscriber<D>>,
    mapper: Mapper<U, D>,
    executor: MutexExecutor,
    state: Mutex<MappingState>,
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "mapper panicked".to_string())
}

impl<U: Send + 'static, D: Send + 'static> Inner<U, D> {
    fn map_item(self: &Arc<Self>, item: U) {
        if self.state.lock().done {
            return;
        }
        let future = match catch_unwind(AssertUnwindSafe(|| (self.mapper)(item))) {
            Ok(future) => future,
            Err(panic) => {
                self.fail(StreamError::Mapping(panic_message(&*panic)));
                return;
            }
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("no Tokio runtime to run the subscription mapping on");
            self.fail(StreamError::NoRuntime);
            return;
        };
        let id = {
            let mut state = self.state.lock();
            let id = state.next_id;
            state.next_id += 1;
            state.in_flight.push_back(id);
            id
        };
        let inner = Arc::clone(self);
        runtime.spawn(async move {
            let result = future.await;
            let completing = Arc::clone(&inner);
            inner
                .executor
                .execute(move || completing.mapping_finished(id, result));
        });
    }

    fn mapping_finished(&self, id: u64, result: Result<D, StreamError>) {
        {
            let mut state = self.state.lock();
            state.in_flight.retain(|in_flight| *in_flight != id);
            if state.done {
                return;
            }
        }
        match result {
            Ok(item) => self.downstream.on_next(item),
            Err(error) => {
                self.fail(error);
                return;
            }
        }
        self.finish_if_idle();
    }

    /// Errors downstream and cancels upstream, once.
    fn fail(&self, error: StreamError) {
        let upstream = {
            let mut state = self.state.lock();
            if state.done {
                return;
            }
            state.done = true;
            state.terminal = None;
            state.upstream.take()
        };
        if let Some(upstream) = upstream {
            upstream.cancel();
        }
        self.downstream.on_error(error);
    }

    fn upstream_terminated(&self, terminal: Terminal) {
        {
            let mut state = self.state.lock();
            if state.done || state.terminal.is_some() {
                return;
            }
            state.terminal = Some(terminal);
        }
        self.finish_if_idle();
    }

    fn finish_if_idle(&self) {
        let terminal = {
            let mut state = self.state.lock();
            if state.done || !state.in_flight.is_empty() {
                return;
            }
            let Some(terminal) = state.terminal.take() else {
                return;
            };
            state.done = true;
            state.upstream = None;
            terminal
        };
        match terminal {
            Terminal::Complete => self.downstream.on_complete(),
            Terminal::Error(error) => self.downstream.on_error(error),
        }
    }
}

struct MappingSubscriber<U, D> {
    inner: Arc<Inner<U, D>>,
}

impl<U: Send + 'static, D: Send + 'static> Subscriber<U> for MappingSubscriber<U, D> {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        let inner = Arc::clone(&self.inner);
        self.inner.executor.execute(move || {
            inner.state.lock().upstream = Some(Arc::clone(&subscription));
            inner
                .downstream
                .on_subscribe(Arc::new(DelegatingSubscription::new(subscription)));
        });
    }

    fn on_next(&self, item: U) {
        let inner = Arc::clone(&self.inner);
        self.inner.executor.execute(move || inner.map_item(item));
    }

    fn on_error(&self, error: StreamError) {
        let inner = Arc::clone(&self.inner);
        self.inner
            .executor
            .execute(move || inner.upstream_terminated(Terminal::Error(error)));
    }

    fn on_complete(&self) {
        let inner = Arc::clone(&self.inner);
        self.inner
            .executor
            .execute(move || inner.upstream_terminated(Terminal::Complete));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::test_support::{RecordingSubscriber, Signal};
    use crate::reactive::{SingleSubscriberPublisher, SubscriberStream};
    use futures::{FutureExt, StreamExt};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::oneshot;

    fn doubling(upstream: &SingleSubscriberPublisher<u32>) -> CompletionStageMappingPublisher<u32, u32> {
        CompletionStageMappingPublisher::new(Arc::new(upstream.clone()), |x: u32| {
            async move { Ok(x * 2) }.boxed()
        })
    }

    #[tokio::test]
    async fn test_maps_every_item_then_completes() {
        let upstream = SingleSubscriberPublisher::new();
        let mapped = doubling(&upstream);
        let stream = SubscriberStream::subscribe(&mapped);
        upstream.offer(1);
        upstream.offer(2);
        upstream.offer(3);
        upstream.no_more_data();

        let items: Vec<_> = stream.collect().await;
        assert_eq!(items, vec![Ok(2), Ok(4), Ok(6)]);
    }

    #[tokio::test]
    async fn test_completion_waits_for_mappings_in_flight() {
        let upstream = SingleSubscriberPublisher::<u32>::new();
        let (release, released) = oneshot::channel::<()>();
        let released = Arc::new(Mutex::new(Some(released)));
        let mapped = CompletionStageMappingPublisher::new(
            Arc::new(upstream.clone()) as Arc<dyn Publisher<u32>>,
            move |x: u32| {
                let gate = released.lock().take();
                async move {
                    if let Some(gate) = gate {
                        let _ = gate.await;
                    }
                    Ok(x + 100)
                }
                .boxed()
            },
        );
        let subscriber = RecordingSubscriber::new(10);
        mapped.subscribe(subscriber.clone());
        upstream.offer(1);
        upstream.no_more_data();

        tokio::task::yield_now().await;
        assert!(subscriber.signals().is_empty());

        release.send(()).unwrap();
        for _ in 0..100 {
            if subscriber.signals().len() == 2 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(subscriber.signals(), vec![Signal::Next(101), Signal::Complete]);
    }

    #[tokio::test]
    async fn test_panicking_mapper_errors_and_cancels_upstream() {
        let upstream = SingleSubscriberPublisher::<u32>::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);
        let mapped = CompletionStageMappingPublisher::new(
            Arc::new(upstream.clone()) as Arc<dyn Publisher<u32>>,
            move |x: u32| {
                counted.fetch_add(1, Ordering::SeqCst);
                if x == 2 {
                    panic!("cannot map 2");
                }
                async move { Ok(x) }.boxed()
            },
        );
        let stream = SubscriberStream::with_prefetch(&mapped, 10);
        upstream.offer(2);
        upstream.offer(3);

        let items: Vec<_> = stream.collect().await;
        assert_eq!(items, vec![Err(StreamError::Mapping("cannot map 2".into()))]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_mapping_errors_downstream() {
        let upstream = SingleSubscriberPublisher::<u32>::new();
        let mapped = CompletionStageMappingPublisher::new(
            Arc::new(upstream.clone()) as Arc<dyn Publisher<u32>>,
            |_: u32| async { Err::<u32, _>(StreamError::Mapping("bad event".into())) }.boxed(),
        );
        let stream = SubscriberStream::subscribe(&mapped);
        upstream.offer(1);
        upstream.no_more_data();

        let items: Vec<_> = stream.collect().await;
        assert_eq!(items, vec![Err(StreamError::Mapping("bad event".into()))]);
    }

    #[test]
    fn test_mapping_without_runtime_fails() {
        let upstream = SingleSubscriberPublisher::new();
        let mapped = doubling(&upstream);
        let subscriber = RecordingSubscriber::new(1);
        mapped.subscribe(subscriber.clone());
        upstream.offer(1);
        assert_eq!(subscriber.signals(), vec![Signal::Error(StreamError::NoRuntime)]);
    }
}
