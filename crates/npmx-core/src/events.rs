//! Log event channel.
//!
//! Three independent channels carry standard output text, standard error text
//! and caught errors from the orchestrator to whoever subscribed. Handlers run
//! synchronously on the publishing task, in subscription order.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Which stream a log event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogSource {
    Output,
    Error,
}

/// A batch of text captured from the external tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEvent {
    pub source: LogSource,
    pub text: String,
}

/// Identifies one subscription for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

type TextHandler = Arc<dyn Fn(&LogEvent) + Send + Sync>;
type ExceptionHandler = Arc<dyn Fn(&Error) + Send + Sync>;

#[derive(Default)]
struct Subscribers {
    next_id: u64,
    output: Vec<(SubscriptionId, TextHandler)>,
    error: Vec<(SubscriptionId, TextHandler)>,
    exception: Vec<(SubscriptionId, ExceptionHandler)>,
}

impl Subscribers {
    fn allocate(&mut self) -> SubscriptionId {
        self.next_id += 1;
        SubscriptionId(self.next_id)
    }
}

/// Multi-subscriber publisher for output, error and exception events.
#[derive(Default)]
pub struct LogChannel {
    subscribers: Mutex<Subscribers>,
}

impl LogChannel {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Subscribers> {
        // Handlers never run under the lock, so a poisoned lock still holds consistent data.
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe_output<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&LogEvent) + Send + Sync + 'static,
    {
        let mut subs = self.lock();
        let id = subs.allocate();
        subs.output.push((id, Arc::new(handler)));
        id
    }

    pub fn subscribe_error<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&LogEvent) + Send + Sync + 'static,
    {
        let mut subs = self.lock();
        let id = subs.allocate();
        subs.error.push((id, Arc::new(handler)));
        id
    }

    pub fn subscribe_exception<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&Error) + Send + Sync + 'static,
    {
        let mut subs = self.lock();
        let id = subs.allocate();
        subs.exception.push((id, Arc::new(handler)));
        id
    }

    /// Removes a subscription from whichever channel holds it.
    ///
    /// Returns `false` if the id was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = self.lock();
        let before = subs.output.len() + subs.error.len() + subs.exception.len();
        subs.output.retain(|(sub, _)| *sub != id);
        subs.error.retain(|(sub, _)| *sub != id);
        subs.exception.retain(|(sub, _)| *sub != id);
        before != subs.output.len() + subs.error.len() + subs.exception.len()
    }

    /// Total number of live subscriptions across all channels.
    pub fn subscriber_count(&self) -> usize {
        let subs = self.lock();
        subs.output.len() + subs.error.len() + subs.exception.len()
    }

    /// Publishes captured standard output. Empty text is dropped.
    pub fn publish_output(&self, text: &str) {
        self.publish_text(LogSource::Output, text);
    }

    /// Publishes captured standard error. Empty text is dropped.
    pub fn publish_error(&self, text: &str) {
        self.publish_text(LogSource::Error, text);
    }

    fn publish_text(&self, source: LogSource, text: &str) {
        if text.is_empty() {
            return;
        }

        let handlers: Vec<TextHandler> = {
            let subs = self.lock();
            let list = match source {
                LogSource::Output => &subs.output,
                LogSource::Error => &subs.error,
            };
            list.iter().map(|(_, handler)| Arc::clone(handler)).collect()
        };
        if handlers.is_empty() {
            return;
        }

        let event = LogEvent {
            source,
            text: text.to_string(),
        };
        for handler in handlers {
            handler(&event);
        }
    }

    /// Passes a caught error to every exception subscriber unchanged.
    pub fn publish_exception(&self, error: &Error) {
        let handlers: Vec<ExceptionHandler> = self
            .lock()
            .exception
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();
        for handler in handlers {
            handler(error);
        }
    }
}

impl fmt::Debug for LogChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let subs = self.lock();
        f.debug_struct("LogChannel")
            .field("output", &subs.output.len())
            .field("error", &subs.error.len())
            .field("exception", &subs.exception.len())
            .finish()
    }
}
