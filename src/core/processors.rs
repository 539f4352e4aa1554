//! Built-in processors: closure adapters and the destination send step.
use std::{fmt, sync::Arc};

use async_trait::async_trait;

use crate::{
    core::{
        error::Result,
        exchange::{Exchange, keys},
    },
    ports::{Endpoint, Processor},
};

/// Adapts a synchronous closure into a [`Processor`].
pub struct FnProcessor<F> {
    f: F,
}

impl<F> FnProcessor<F>
where
    F: Fn(&mut Exchange) -> Result<()> + Send + Sync + 'static,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> Processor for FnProcessor<F>
where
    F: Fn(&mut Exchange) -> Result<()> + Send + Sync + 'static,
{
    async fn process(&self, exchange: &mut Exchange) -> Result<()> {
        (self.f)(exchange)
    }
}

/// Forwards the exchange to a destination endpoint.
///
/// A producer is created, started against the exchange scope, used for a single send and
/// stopped again. The endpoint itself is resolved once when the step is added.
pub struct SendTo {
    endpoint: Arc<dyn Endpoint>,
}

impl SendTo {
    pub fn new(endpoint: Arc<dyn Endpoint>) -> Self {
        Self { endpoint }
    }

    pub fn uri(&self) -> &str {
        self.endpoint.uri()
    }
}

impl fmt::Debug for SendTo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SendTo").field("uri", &self.uri()).finish()
    }
}

#[async_trait]
impl Processor for SendTo {
    async fn process(&self, exchange: &mut Exchange) -> Result<()> {
        let uri = self.endpoint.uri();
        let producer = self.endpoint.create_producer()?;
        producer.start(exchange.scope().clone()).await?;

        let sent = producer.send(exchange).await;
        if let Err(e) = producer.stop().await {
            tracing::warn!(uri = %uri, error = %e, "Failed to stop producer after send");
        }

        if let Err(e) = sent {
            exchange.set_property(keys::FAILURE_ENDPOINT, uri);
            return Err(e);
        }
        tracing::trace!(uri = %uri, exchange_id = %exchange.id(), "Exchange sent");
        Ok(())
    }
}
