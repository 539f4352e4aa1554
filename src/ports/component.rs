use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::{
    core::{Exchange, Result},
    ports::processor::Processor,
};

/// Factory turning URIs of one scheme into endpoints.
pub trait Component: Send + Sync + 'static {
    /// Create a new endpoint from a full URI (scheme included).
    ///
    /// The interpretation of everything after `<scheme>:` belongs to the component.
    fn create_endpoint(&self, uri: &str) -> Result<Arc<dyn Endpoint>>;
}

/// A URI addressed resource able to manufacture producers and consumers.
pub trait Endpoint: Send + Sync + 'static {
    fn uri(&self) -> &str;

    /// Create a producer sending exchanges to this endpoint.
    fn create_producer(&self) -> Result<Box<dyn Producer>>;

    /// Create a consumer that builds exchanges from inbound work and hands each
    /// one to `processor`.
    fn create_consumer(&self, processor: Arc<dyn Processor>) -> Result<Arc<dyn Consumer>>;
}

/// Sends exchanges to an endpoint.
#[async_trait]
pub trait Producer: Send + Sync {
    async fn start(&self, scope: CancellationToken) -> Result<()>;

    async fn stop(&self) -> Result<()>;

    /// Synchronous send from the caller's point of view. May populate the out message
    /// with a response.
    async fn send(&self, exchange: &mut Exchange) -> Result<()>;
}

/// Generates exchanges from external activity.
///
/// `start` may launch background work which must end when `scope` is cancelled or
/// `stop` is called, whichever comes first. `stop` must be idempotent and safe to call
/// after cancellation.
#[async_trait]
pub trait Consumer: Send + Sync {
    async fn start(&self, scope: CancellationToken) -> Result<()>;

    async fn stop(&self) -> Result<()>;
}
