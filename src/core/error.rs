use std::{fmt, sync::Arc};

use thiserror::Error;

/// Boxed error accepted from user processors and transports.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Shared error handle so failures can be stored on an exchange and returned at the same time.
pub type SharedError = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Result type used throughout the engine
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Lifecycle step that failed for a route
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleAction {
    Start,
    Stop,
}

impl fmt::Display for LifecycleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleAction::Start => f.write_str("start"),
            LifecycleAction::Stop => f.write_str("stop"),
        }
    }
}

/// Errors raised by the routing engine and its transport contracts
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// The URI has no usable `<scheme>:` prefix
    #[error("Invalid URI: {0}")]
    InvalidUri(String),

    /// No component is registered for the scheme of a URI being resolved
    #[error("No component registered for scheme '{scheme}' (uri: {uri})")]
    UnknownScheme { scheme: String, uri: String },

    /// Direct component lookup by name failed
    #[error("Component not found: {0}")]
    ComponentNotFound(String),

    #[error("{0} is already started")]
    AlreadyStarted(String),

    /// A producer was used before `start`. Stopping something that is not started is a
    /// no-op and never reports this.
    #[error("{0} is not started")]
    NotStarted(String),

    #[error("Route '{0}' has no source endpoint")]
    NoSourceEndpoint(String),

    /// A component rejected the scheme specific part of a URI
    #[error("Invalid endpoint '{uri}': {reason}")]
    InvalidEndpoint { uri: String, reason: String },

    /// Failure returned by a processor in a route chain
    #[error("Processor failed: {0}")]
    Processor(#[source] SharedError),

    /// Failure inside a producer or consumer
    #[error("Transport error on '{uri}': {source}")]
    Transport {
        uri: String,
        #[source]
        source: SharedError,
    },

    /// A route failed to start or stop while the context drove its lifecycle
    #[error("Route '{route_id}' failed to {action}: {source}")]
    RouteLifecycle {
        route_id: String,
        action: LifecycleAction,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Wrap any error (or message) as a processor failure.
    pub fn processor(err: impl Into<BoxError>) -> Self {
        Error::Processor(Arc::from(err.into()))
    }

    /// Wrap a transport level failure with the endpoint uri it happened on.
    pub fn transport(uri: impl Into<String>, err: impl Into<BoxError>) -> Self {
        Error::Transport {
            uri: uri.into(),
            source: Arc::from(err.into()),
        }
    }

    pub fn invalid_endpoint(uri: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidEndpoint {
            uri: uri.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn route_lifecycle(route_id: &str, action: LifecycleAction, source: Error) -> Self {
        Error::RouteLifecycle {
            route_id: route_id.to_string(),
            action,
            source: Box::new(source),
        }
    }

    /// Innermost engine error, looking through `RouteLifecycle` wrappers.
    pub fn root(&self) -> &Error {
        match self {
            Error::RouteLifecycle { source, .. } => source.root(),
            other => other,
        }
    }
}
