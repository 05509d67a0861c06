use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::future::{FutureExt, LocalBoxFuture, Shared};

/// An awaitable handle to an in-flight resolution.
///
/// The handle completes once the resolution has settled and its outcome has been written to
/// the cache (or discarded as stale). It does not yield the outcome itself; read the key again
/// once the handle completes.
///
/// Cloning a `PendingHandle` creates a new handle to the **same** resolution.
#[derive(Clone)]
pub struct PendingHandle {
    generation: u64,
    settled: Shared<LocalBoxFuture<'static, ()>>,
}

impl PendingHandle {
    /// Starts driving `settle` on the current [`LocalSet`](tokio::task::LocalSet).
    ///
    /// Without a tokio runtime nothing is spawned, and the resolution only makes progress
    /// while the handle is awaited.
    ///
    /// # Panics
    ///
    /// Panics if called within a tokio runtime, but outside of a `LocalSet`.
    pub(crate) fn spawn(generation: u64, settle: LocalBoxFuture<'static, ()>) -> Self {
        let settled = settle.shared();
        if tokio::runtime::Handle::try_current().is_ok() {
            tokio::task::spawn_local(settled.clone());
        } else {
            tracing::trace!(generation, "No runtime, resolution is driven by its awaiters");
        }
        Self {
            generation,
            settled,
        }
    }

    /// The generation of the resolution this handle stands for.
    ///
    /// Generations are unique within one cache namespace.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns `true` once the resolution has settled.
    pub fn is_settled(&self) -> bool {
        self.settled.peek().is_some()
    }
}

impl Future for PendingHandle {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        Pin::new(&mut self.settled).poll(cx)
    }
}

impl PartialEq for PendingHandle {
    fn eq(&self, other: &Self) -> bool {
        self.generation == other.generation
    }
}

impl fmt::Debug for PendingHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingHandle")
            .field("generation", &self.generation)
            .field("settled", &self.is_settled())
            .finish()
    }
}

/// The state of a single key in a resource cache.
#[derive(Clone, Debug, PartialEq)]
pub enum ResolutionState<T, E> {
    /// A resolution is in flight.
    Pending(PendingHandle),
    /// The resolution succeeded.
    Resolved(T),
    /// The resolution failed.
    Failed(E),
}

impl<T, E> ResolutionState<T, E> {
    /// Converts the outcome of a resolution into a terminal state.
    pub fn from_outcome(outcome: Result<T, E>) -> Self {
        match outcome {
            Ok(value) => Self::Resolved(value),
            Err(error) => Self::Failed(error),
        }
    }

    /// Returns `true` for [`Resolved`](Self::Resolved) and [`Failed`](Self::Failed).
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending(_))
    }

    /// The generation of the in-flight resolution, if this state is pending.
    pub fn pending_generation(&self) -> Option<u64> {
        match self {
            Self::Pending(handle) => Some(handle.generation()),
            _ => None,
        }
    }
}

/// The answer of a resource cache to a synchronous lookup.
#[derive(Clone, Debug, PartialEq)]
pub enum Resolution<T, E> {
    /// The value is available.
    Ready(T),
    /// The value is not available yet; await the handle and ask again.
    Pending(PendingHandle),
    /// The resolution failed with this error.
    Failed(E),
}

impl<T, E> Resolution<T, E> {
    /// Returns `true` if the value is not available yet.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }

    /// Returns the value, if it is available.
    pub fn ready(self) -> Option<T> {
        match self {
            Self::Ready(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the outcome, or `None` if the value is not available yet.
    pub fn into_outcome(self) -> Option<Result<T, E>> {
        match self {
            Self::Ready(value) => Some(Ok(value)),
            Self::Failed(error) => Some(Err(error)),
            Self::Pending(_) => None,
        }
    }
}

impl<T, E> From<ResolutionState<T, E>> for Resolution<T, E> {
    fn from(state: ResolutionState<T, E>) -> Self {
        match state {
            ResolutionState::Pending(handle) => Self::Pending(handle),
            ResolutionState::Resolved(value) => Self::Ready(value),
            ResolutionState::Failed(error) => Self::Failed(error),
        }
    }
}
