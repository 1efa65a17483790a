use super::Subscription;
use std::sync::Arc;

/// Passes `request` and `cancel` through to an upstream subscription.
#[derive(Clone)]
pub struct DelegatingSubscription {
    upstream: Arc<dyn Subscription>,
}

impl DelegatingSubscription {
    pub fn new(upstream: Arc<dyn Subscription>) -> Self {
        Self { upstream }
    }

    pub fn upstream(&self) -> &Arc<dyn Subscription> {
        &self.upstream
    }
}

impl Subscription for DelegatingSubscription {
    fn request(&self, n: u64) {
        self.upstream.request(n);
    }

    fn cancel(&self) {
        self.upstream.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Counting {
        requested: Mutex<u64>,
        cancelled: Mutex<bool>,
    }

    impl Subscription for Counting {
        fn request(&self, n: u64) {
            *self.requested.lock() += n;
        }

        fn cancel(&self) {
            *self.cancelled.lock() = true;
        }
    }

    #[test]
    fn test_passes_calls_through() {
        let upstream = Arc::new(Counting::default());
        let delegating = DelegatingSubscription::new(upstream.clone());
        delegating.request(3);
        delegating.request(2);
        delegating.cancel();
        assert_eq!(*upstream.requested.lock(), 5);
        assert!(*upstream.cancelled.lock());
    }
}
