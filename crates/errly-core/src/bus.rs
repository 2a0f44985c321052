//! Synchronous, in-process publish/subscribe
//!
//! One [`EventBus`] carries one payload type. Subscribers run on the thread
//! that calls [`EventBus::notify`], in the order they subscribed. A failing
//! subscriber (an `Err` or a panic) is logged and skipped; it never stops the
//! remaining subscribers and never propagates to the publisher.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, error};

use crate::exception::payload_message;
use crate::scope::catch_isolated;

/// Shared handle to a subscriber callback
pub type Subscriber<T> = Arc<dyn Fn(&T) -> anyhow::Result<()> + Send + Sync>;

/// A subscriber that failed while handling one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriberFailure {
    /// Position of the subscriber in dispatch order
    pub index: usize,
    pub message: String,
    /// True when the subscriber panicked instead of returning an error
    pub panicked: bool,
}

/// Outcome of one [`EventBus::notify`] call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub invoked: usize,
    pub failures: Vec<SubscriberFailure>,
}

impl DispatchReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn succeeded(&self) -> usize {
        self.invoked - self.failures.len()
    }
}

pub struct EventBus<T> {
    subscribers: RwLock<Vec<Subscriber<T>>>,
}

impl<T> Default for EventBus<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for EventBus<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("payload", &std::any::type_name::<T>())
            .field("subscribers", &self.len())
            .finish()
    }
}

impl<T> EventBus<T> {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
        }
    }

    /// Append a subscriber. Registering the same callback twice is allowed
    /// and makes it run twice per event.
    pub fn subscribe<F>(&self, handler: F)
    where
        F: Fn(&T) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.subscribe_shared(Arc::new(handler));
    }

    pub fn subscribe_shared(&self, handler: Subscriber<T>) {
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handler);
    }

    pub fn unsubscribe_all(&self) {
        let mut subscribers = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        debug!(
            "Removing {} subscribers for {}",
            subscribers.len(),
            std::any::type_name::<T>()
        );
        subscribers.clear();
    }

    pub fn len(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver `event` to every subscriber, in subscription order.
    ///
    /// Dispatch works on a snapshot of the list: subscribers added while the
    /// event is being delivered only see later events. Called from a panic
    /// hook, each subscriber runs on a helper thread so a panicking
    /// subscriber is still isolated.
    pub fn notify(&self, event: &T) -> DispatchReport
    where
        T: Sync,
    {
        let snapshot: Vec<Subscriber<T>> = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut report = DispatchReport::default();

        for (index, subscriber) in snapshot.iter().enumerate() {
            report.invoked += 1;

            let failure = match catch_isolated(|| subscriber(event)) {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(SubscriberFailure {
                    index,
                    message: format!("{:#}", e),
                    panicked: false,
                }),
                Err(payload) => Some(SubscriberFailure {
                    index,
                    message: payload_message(payload.as_ref()),
                    panicked: true,
                }),
            };

            if let Some(failure) = failure {
                error!(
                    "Subscriber {} for {} failed: {}",
                    failure.index,
                    std::any::type_name::<T>(),
                    failure.message
                );
                report.failures.push(failure);
            }
        }

        report
    }
}
