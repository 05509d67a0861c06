//! An observable key-value store.
//!
//! [`ObservableStore`] is a map that emits a [`ChangeEvent`] to all of its subscribers on every
//! mutation. Subscriptions are not key-scoped; filtering by key is up to the subscriber, see
//! [`ChangeEvent::concerns`].
//!
//! The store is a single-threaded, reference-counted handle. Notification happens synchronously
//! inside the mutating call, over a snapshot of the subscribers that were registered when the
//! mutation started.
//!
//! A subscription can be bound to a [`CancellationToken`]. Once the token is cancelled, the
//! subscription receives no further events, even if the token was cancelled in the middle of a
//! notification pass.

#![warn(missing_docs)]

mod event;
mod store;

pub use event::ChangeEvent;
pub use store::*;
pub use tokio_util::sync::CancellationToken;
