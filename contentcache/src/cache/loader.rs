//! Notification contract for asynchronous retrieval.
//!
//! A lookup that misses the memory tier happens on a worker. Callers observe
//! it as two events: a synchronous "loading" signal before any background
//! work starts, and exactly one result once the lookup completes.
//!
//! Two shapes are offered:
//!
//! - [`CacheLoader`]: callbacks, for callers that want to be notified.
//! - [`LoadHandle`]: a future, for callers that want to await.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

/// Receives the two-phase notification of an asynchronous lookup.
///
/// `on_loading` is called synchronously on the caller's thread before any
/// background work is scheduled, and only when the entry was not in memory.
/// `on_result` is called exactly once: on the caller's thread for a memory
/// hit, from a worker otherwise. There is no cancellation, so a loader whose
/// caller lost interest still receives its result.
pub trait CacheLoader<V>: Send + 'static {
    /// Background work is about to start.
    fn on_loading(&self) {}

    /// The lookup finished with `value` (`None` for a miss or expiry).
    fn on_result(&self, value: Option<V>);
}

/// Loader built from closures.
pub struct FnLoader<V> {
    loading: Option<Box<dyn Fn() + Send>>,
    result: Box<dyn Fn(Option<V>) + Send>,
}

impl<V> FnLoader<V> {
    /// Create a loader that only observes the result.
    pub fn new(on_result: impl Fn(Option<V>) + Send + 'static) -> Self {
        Self {
            loading: None,
            result: Box::new(on_result),
        }
    }

    /// Also observe the loading signal.
    pub fn with_loading(mut self, on_loading: impl Fn() + Send + 'static) -> Self {
        self.loading = Some(Box::new(on_loading));
        self
    }
}

impl<V: 'static> CacheLoader<V> for FnLoader<V> {
    fn on_loading(&self) {
        if let Some(loading) = &self.loading {
            loading();
        }
    }

    fn on_result(&self, value: Option<V>) {
        (self.result)(value)
    }
}

/// Future-shaped result of [`CacheCoordinator::load`](crate::cache::CacheCoordinator::load).
///
/// `is_loading()` is the started signal: it is `true` when the lookup was
/// handed to a worker. Awaiting the handle yields the value.
pub struct LoadHandle<V> {
    state: LoadState<V>,
}

enum LoadState<V> {
    Ready(Option<Option<V>>),
    Pending(oneshot::Receiver<Option<V>>),
}

impl<V> LoadHandle<V> {
    /// A lookup resolved without background work.
    pub(crate) fn ready(value: Option<V>) -> Self {
        Self {
            state: LoadState::Ready(Some(value)),
        }
    }

    /// A lookup running on a worker, completing through `rx`.
    pub(crate) fn pending(rx: oneshot::Receiver<Option<V>>) -> Self {
        Self {
            state: LoadState::Pending(rx),
        }
    }

    /// Whether the lookup was offloaded to a worker.
    pub fn is_loading(&self) -> bool {
        matches!(self.state, LoadState::Pending(_))
    }

    /// Block the current thread until the lookup completes.
    ///
    /// Must not be called from within an async runtime; await the handle
    /// there instead.
    pub fn wait(self) -> Option<V> {
        match self.state {
            LoadState::Ready(value) => value.flatten(),
            LoadState::Pending(rx) => rx.blocking_recv().unwrap_or(None),
        }
    }
}

// The value is only ever moved out, never pinned.
impl<V> Unpin for LoadHandle<V> {}

impl<V> Future for LoadHandle<V> {
    type Output = Option<V>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().state {
            LoadState::Ready(value) => Poll::Ready(value.take().flatten()),
            LoadState::Pending(rx) => Pin::new(rx).poll(cx).map(|result| result.unwrap_or(None)),
        }
    }
}
