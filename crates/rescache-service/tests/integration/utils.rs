use std::cell::RefCell;
use std::rc::Rc;

use futures::future::LocalBoxFuture;
use rescache_service::ChangeEvent;
use rescache_service::resource::{CacheEvent, ResolutionState, ResourceDefinition};
use rescache_test::ManualResolver;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TestError(pub String);

pub type Resolver = ManualResolver<String, TestError>;

/// A resource resolving keys through a [`ManualResolver`].
pub struct TestResource {
    pub name: &'static str,
    pub resolver: Resolver,
}

impl TestResource {
    pub fn new(name: &'static str) -> (Self, Resolver) {
        let resolver = Resolver::new();
        let resource = Self {
            name,
            resolver: resolver.clone(),
        };
        (resource, resolver)
    }
}

impl ResourceDefinition for TestResource {
    type Output = String;
    type Error = TestError;

    fn name(&self) -> &str {
        self.name
    }

    fn resolve(&self, key: &str) -> LocalBoxFuture<'static, Result<String, TestError>> {
        self.resolver.resolve(key)
    }
}

pub fn ok(value: &str) -> Result<String, TestError> {
    Ok(value.to_owned())
}

pub fn err(message: &str) -> Result<String, TestError> {
    Err(TestError(message.to_owned()))
}

fn describe_state(state: &ResolutionState<String, TestError>) -> String {
    match state {
        ResolutionState::Pending(handle) => format!("pending#{}", handle.generation()),
        ResolutionState::Resolved(value) => format!("resolved({value})"),
        ResolutionState::Failed(error) => format!("failed({})", error.0),
    }
}

/// Renders a cache event as a single line, for easy comparison.
pub fn describe(event: &CacheEvent<String, TestError>) -> String {
    match event {
        ChangeEvent::Inserted { key, value } => format!("inserted {key}: {}", describe_state(value)),
        ChangeEvent::Updated {
            key,
            value,
            previous,
        } => format!(
            "updated {key}: {} -> {}",
            describe_state(previous),
            describe_state(value)
        ),
        ChangeEvent::Removed { key, previous } => {
            format!("removed {key}: {}", describe_state(previous))
        }
        ChangeEvent::Cleared => "cleared".to_owned(),
    }
}

pub type EventLog = Rc<RefCell<Vec<String>>>;

/// Returns a log and a callback appending every event it receives to the log.
pub fn event_log() -> (EventLog, impl Fn(&CacheEvent<String, TestError>) + 'static) {
    let log = EventLog::default();
    let sink = Rc::clone(&log);
    (log, move |event: &CacheEvent<String, TestError>| {
        sink.borrow_mut().push(describe(event))
    })
}
