//! Explicit log sink handed to adapters at construction.
//!
//! Adapters never reach for a global logger of their own. They emit `tracing`
//! events through a [`LogSink`]: with a dispatch attached, events go to that
//! subscriber only; without one, they go to whatever default the host set up.

use std::fmt;
use tracing::{Dispatch, Subscriber};

#[derive(Clone, Default)]
pub struct LogSink {
    dispatch: Option<Dispatch>,
}

impl fmt::Debug for LogSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogSink")
            .field("dedicated", &self.dispatch.is_some())
            .finish()
    }
}

impl LogSink {
    /// Route events to `dispatch`.
    pub fn new(dispatch: Dispatch) -> Self {
        Self {
            dispatch: Some(dispatch),
        }
    }

    /// Route events to the host's default subscriber.
    pub fn ambient() -> Self {
        Self::default()
    }

    pub fn from_subscriber<S>(subscriber: S) -> Self
    where
        S: Subscriber + Send + Sync + 'static,
    {
        Self::new(Dispatch::new(subscriber))
    }

    /// Run `f` with this sink as the current dispatcher.
    ///
    /// Keep `f` synchronous: the scoped default does not survive an `.await`.
    pub fn emit<R>(&self, f: impl FnOnce() -> R) -> R {
        match &self.dispatch {
            Some(dispatch) => tracing::dispatcher::with_default(dispatch, f),
            None => f(),
        }
    }
}
