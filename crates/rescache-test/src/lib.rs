//! Helpers for testing the caches and the command line front-end.
//!
//! When writing tests, keep the following points in mind:
//!
//!  - In every test, call [`setup`]. This will set up the logger so that all console output
//!    is captured by the test runner.
//!
//!  - Resolutions are spawned onto a [`LocalSet`](tokio::task::LocalSet). Wrap the body of an
//!    async test in [`run_local`], otherwise starting a resolution panics.
//!
//!  - When using [`tempdir`], make sure that the handle to the temp directory is held for the
//!    entire lifetime of the test. To avoid dropping it early, assign it to a variable in the
//!    test function (e.g. `let _dir = test::tempdir()`).

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::rc::Rc;

use futures::channel::oneshot;
use futures::future::{self, FutureExt, LocalBoxFuture};
use tokio::task::LocalSet;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::fmt;

pub use tempfile::TempDir;

/// Setup the test environment.
///
///  - Initializes logs: The logger only captures logs from the `rescache` crates and mutes all
///    other logs.
pub fn setup() {
    fmt()
        .with_env_filter(EnvFilter::new(
            "rescache_store=trace,rescache_refs=trace,rescache_service=trace,rescli=trace",
        ))
        .with_target(false)
        .pretty()
        .with_test_writer()
        .try_init()
        .ok();
}

/// Creates a temporary directory.
///
/// The directory is deleted when the [`TempDir`] instance is dropped. Use it as a guard to
/// automatically clean up after tests.
pub fn tempdir() -> TempDir {
    TempDir::new().unwrap()
}

/// Runs `future` to completion inside a fresh [`LocalSet`].
pub async fn run_local<F: Future>(future: F) -> F::Output {
    LocalSet::new().run_until(future).await
}

struct ResolverState<T, E> {
    calls: HashMap<String, usize>,
    waiting: HashMap<String, VecDeque<oneshot::Sender<Result<T, E>>>>,
}

/// A resolver whose resolutions only settle when the test says so.
///
/// Every call to [`resolve`](Self::resolve) is counted and parked until it is settled with
/// [`complete`](Self::complete). A parked resolution that is never completed stays pending
/// forever.
///
/// Cloning a `ManualResolver` creates a new handle to the **same** resolver.
pub struct ManualResolver<T, E> {
    state: Rc<RefCell<ResolverState<T, E>>>,
}

impl<T, E> Clone for ManualResolver<T, E> {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
        }
    }
}

impl<T, E> Default for ManualResolver<T, E> {
    fn default() -> Self {
        Self {
            state: Rc::new(RefCell::new(ResolverState {
                calls: HashMap::new(),
                waiting: HashMap::new(),
            })),
        }
    }
}

impl<T: 'static, E: 'static> ManualResolver<T, E> {
    /// Creates a resolver without any calls.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a resolution for `key` that settles once [`complete`](Self::complete) is called.
    pub fn resolve(&self, key: &str) -> LocalBoxFuture<'static, Result<T, E>> {
        let (sender, receiver) = oneshot::channel();
        {
            let mut state = self.state.borrow_mut();
            *state.calls.entry(key.to_owned()).or_default() += 1;
            state
                .waiting
                .entry(key.to_owned())
                .or_default()
                .push_back(sender);
        }

        async move {
            match receiver.await {
                Ok(outcome) => outcome,
                Err(oneshot::Canceled) => future::pending().await,
            }
        }
        .boxed_local()
    }

    /// Settles the oldest outstanding resolution of `key` with `outcome`.
    ///
    /// Returns `false` if there was no outstanding resolution for `key`.
    pub fn complete(&self, key: &str, outcome: Result<T, E>) -> bool {
        let sender = self
            .state
            .borrow_mut()
            .waiting
            .get_mut(key)
            .and_then(VecDeque::pop_front);
        match sender {
            Some(sender) => sender.send(outcome).is_ok(),
            None => false,
        }
    }

    /// The number of times a resolution was started for `key`.
    pub fn calls(&self, key: &str) -> usize {
        self.state.borrow().calls.get(key).copied().unwrap_or_default()
    }

    /// The number of times a resolution was started for any key.
    pub fn total_calls(&self) -> usize {
        self.state.borrow().calls.values().sum()
    }

    /// The number of outstanding resolutions for `key`.
    pub fn outstanding(&self, key: &str) -> usize {
        self.state
            .borrow()
            .waiting
            .get(key)
            .map_or(0, VecDeque::len)
    }
}
