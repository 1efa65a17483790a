use super::{MutexExecutor, NoopSubscription, Publisher, StreamError, Subscriber, Subscription};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::trace;

struct State<T> {
    queue: VecDeque<T>,
    demand: u64,
    subscriber: Option<Arc<dyn Subscriber<T>>>,
    subscribed: bool,
    pending_error: Option<StreamError>,
    no_more_data: bool,
    terminated: bool,
}

struct Shared<T> {
    executor: MutexExecutor,
    state: Mutex<State<T>>,
}

/// A publisher fed by calls to [`offer`](Self::offer), for exactly one subscriber.
///
/// Offered items are buffered without bound and delivered in offer order as demand
/// arrives. An error or the end of data is delivered once every item offered before it
/// has been delivered, and does not need demand of its own.
pub struct SingleSubscriberPublisher<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for SingleSubscriberPublisher<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Send + 'static> Default for SingleSubscriberPublisher<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> SingleSubscriberPublisher<T> {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                executor: MutexExecutor::new(),
                state: Mutex::new(State {
                    queue: VecDeque::new(),
                    demand: 0,
                    subscriber: None,
                    subscribed: false,
                    pending_error: None,
                    no_more_data: false,
                    terminated: false,
                }),
            }),
        }
    }

    /// Queues an item for the subscriber.
    pub fn offer(&self, item: T) {
        let shared = Arc::clone(&self.shared);
        self.shared.executor.execute(move || {
            {
                let mut state = shared.state.lock();
                if state.terminated || state.no_more_data || state.pending_error.is_some() {
                    trace!("item offered after the end of data, dropping it");
                    return;
                }
                state.queue.push_back(item);
            }
            shared.drain();
        });
    }

    /// Ends the stream with `error` once the items offered so far are delivered.
    pub fn offer_error(&self, error: StreamError) {
        let shared = Arc::clone(&self.shared);
        self.shared.executor.execute(move || {
            {
                let mut state = shared.state.lock();
                if state.terminated || state.pending_error.is_some() {
                    return;
                }
                state.pending_error = Some(error);
            }
            shared.drain();
        });
    }

    /// Completes the stream once the items offered so far are delivered.
    pub fn no_more_data(&self) {
        let shared = Arc::clone(&self.shared);
        self.shared.executor.execute(move || {
            shared.state.lock().no_more_data = true;
            shared.drain();
        });
    }
}

impl<T: Send + 'static> Shared<T> {
    /// Delivers queued items while there is demand, then any terminal signal.
    fn drain(&self) {
        loop {
            let mut state = self.state.lock();
            let Some(subscriber) = state.subscriber.clone() else {
                return;
            };
            if state.demand > 0 {
                if let Some(item) = state.queue.pop_front() {
                    state.demand -= 1;
                    drop(state);
                    subscriber.on_next(item);
                    continue;
                }
            }
            if !state.queue.is_empty() {
                return;
            }
            if let Some(error) = state.pending_error.take() {
                state.terminated = true;
                state.subscriber = None;
                drop(state);
                subscriber.on_error(error);
            } else if state.no_more_data {
                state.terminated = true;
                state.subscriber = None;
                drop(state);
                subscriber.on_complete();
            }
            return;
        }
    }
}

impl<T: Send + 'static> Publisher<T> for SingleSubscriberPublisher<T> {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        let shared = Arc::clone(&self.shared);
        self.shared.executor.execute(move || {
            let already_subscribed = {
                let mut state = shared.state.lock();
                let already_subscribed = state.subscribed;
                if !already_subscribed {
                    state.subscribed = true;
                    state.subscriber = Some(Arc::clone(&subscriber));
                }
                already_subscribed
            };
            if already_subscribed {
                subscriber.on_subscribe(Arc::new(NoopSubscription));
                subscriber.on_error(StreamError::AlreadySubscribed);
                return;
            }
            subscriber.on_subscribe(Arc::new(SingleSubscription {
                shared: Arc::clone(&shared),
            }));
            shared.drain();
        });
    }
}

struct SingleSubscription<T> {
    shared: Arc<Shared<T>>,
}

impl<T: Send + 'static> Subscription for SingleSubscription<T> {
    fn request(&self, n: u64) {
        let shared = Arc::clone(&self.shared);
        self.shared.executor.execute(move || {
            if n == 0 {
                let subscriber = {
                    let mut state = shared.state.lock();
                    if state.terminated {
                        return;
                    }
                    state.terminated = true;
                    state.subscriber.take()
                };
                if let Some(subscriber) = subscriber {
                    subscriber.on_error(StreamError::InvalidDemand(n));
                }
                return;
            }
            {
                let mut state = shared.state.lock();
                state.demand = state.demand.saturating_add(n);
            }
            shared.drain();
        });
    }

    fn cancel(&self) {
        let shared = Arc::clone(&self.shared);
        self.shared.executor.execute(move || {
            let mut state = shared.state.lock();
            state.terminated = true;
            state.subscriber = None;
        });
    }
}
