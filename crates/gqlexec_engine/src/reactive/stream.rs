use super::{Publisher, StreamError, Subscriber, Subscription};
use futures::Stream;
use parking_lot::Mutex;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

enum Signal<T> {
    Next(T),
    Error(StreamError),
    Complete,
}

struct StreamLink<T> {
    sender: mpsc::UnboundedSender<Signal<T>>,
    subscription: Mutex<Option<Arc<dyn Subscription>>>,
    prefetch: u64,
}

impl<T> StreamLink<T> {
    fn subscription(&self) -> Option<Arc<dyn Subscription>> {
        self.subscription.lock().clone()
    }
}

impl<T: Send> Subscriber<T> for StreamLink<T> {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        *self.subscription.lock() = Some(Arc::clone(&subscription));
        subscription.request(self.prefetch);
    }

    fn on_next(&self, item: T) {
        let _ = self.sender.send(Signal::Next(item));
    }

    fn on_error(&self, error: StreamError) {
        let _ = self.sender.send(Signal::Error(error));
    }

    fn on_complete(&self) {
        let _ = self.sender.send(Signal::Complete);
    }
}

/// Consumes a [`Publisher`] as a [`Stream`].
///
/// Keeps `prefetch` items requested ahead of the consumer. An error is yielded as the last
/// item. Dropping the stream early cancels the subscription.
pub struct SubscriberStream<T> {
    receiver: mpsc::UnboundedReceiver<Signal<T>>,
    link: Arc<StreamLink<T>>,
    finished: bool,
}

impl<T: Send + 'static> SubscriberStream<T> {
    /// Subscribes to `publisher`, requesting one item at a time.
    pub fn subscribe(publisher: &dyn Publisher<T>) -> Self {
        Self::with_prefetch(publisher, 1)
    }

    pub fn with_prefetch(publisher: &dyn Publisher<T>, prefetch: u64) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let link = Arc::new(StreamLink {
            sender,
            subscription: Mutex::new(None),
            prefetch: prefetch.max(1),
        });
        publisher.subscribe(Arc::clone(&link) as Arc<dyn Subscriber<T>>);
        Self {
            receiver,
            link,
            finished: false,
        }
    }
}

impl<T> Stream for SubscriberStream<T> {
    type Item = Result<T, StreamError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }
        match self.receiver.poll_recv(cx) {
            Poll::Ready(Some(Signal::Next(item))) => {
                if let Some(subscription) = self.link.subscription() {
                    subscription.request(1);
                }
                Poll::Ready(Some(Ok(item)))
            }
            Poll::Ready(Some(Signal::Error(error))) => {
                self.finished = true;
                Poll::Ready(Some(Err(error)))
            }
            Poll::Ready(Some(Signal::Complete)) | Poll::Ready(None) => {
                self.finished = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T> Drop for SubscriberStream<T> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Some(subscription) = self.link.subscription() {
            subscription.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::SingleSubscriberPublisher;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_stream_yields_items_then_ends() {
        let publisher = SingleSubscriberPublisher::new();
        let mut stream = SubscriberStream::subscribe(&publisher);
        publisher.offer(1);
        publisher.offer(2);
        publisher.no_more_data();

        assert_eq!(stream.next().await, Some(Ok(1)));
        assert_eq!(stream.next().await, Some(Ok(2)));
        assert_eq!(stream.next().await, None);
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn test_stream_yields_the_error_last() {
        let publisher = SingleSubscriberPublisher::new();
        publisher.offer("a");
        publisher.offer_error(StreamError::Upstream("gone".into()));
        let items: Vec<_> = SubscriberStream::subscribe(&publisher).collect().await;
        assert_eq!(items, vec![Ok("a"), Err(StreamError::Upstream("gone".into()))]);
    }

    #[tokio::test]
    async fn test_dropping_the_stream_cancels() {
        let publisher = SingleSubscriberPublisher::new();
        let stream = SubscriberStream::subscribe(&publisher);
        drop(stream);
        publisher.offer(1);

        // cancelling consumed the only subscription slot
        let items: Vec<_> = SubscriberStream::subscribe(&publisher).collect().await;
        assert_eq!(items, vec![Err(StreamError::AlreadySubscribed)]);
    }
}
