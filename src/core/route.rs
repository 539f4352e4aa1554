//! A route binds one source endpoint to an ordered processor chain.
//!
//! Lifecycle: `Created -> Started -> Stopped`, with `Stopped` routes restartable. The
//! transient `Starting`/`Stopping` states let the lifecycle lock be released while the
//! consumer is created, started or stopped, so a consumer calling back into the route
//! during startup cannot deadlock against it. The consumer created on start is kept and
//! it is exactly that instance that gets stopped.
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::{
    core::{
        error::{Error, Result},
        exchange::{Exchange, keys},
        processors::{FnProcessor, SendTo},
        registry::ComponentRegistry,
    },
    ports::{Consumer, Endpoint, Processor},
    tracing_setup,
};

/// Externally visible lifecycle state of a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteStatus {
    Created,
    Starting,
    Started,
    Stopping,
    Stopped,
}

enum RouteState {
    Created,
    Starting,
    Started(Arc<dyn Consumer>),
    Stopping,
    Stopped,
}

impl RouteState {
    fn status(&self) -> RouteStatus {
        match self {
            RouteState::Created => RouteStatus::Created,
            RouteState::Starting => RouteStatus::Starting,
            RouteState::Started(_) => RouteStatus::Started,
            RouteState::Stopping => RouteStatus::Stopping,
            RouteState::Stopped => RouteStatus::Stopped,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct RouteInfo {
    id: String,
    description: String,
    group: String,
}

pub struct Route {
    info: RwLock<RouteInfo>,
    registry: Arc<ComponentRegistry>,
    source: RwLock<Option<Arc<dyn Endpoint>>>,
    chain: RwLock<Vec<Arc<dyn Processor>>>,
    state: Mutex<RouteState>,
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

impl Route {
    /// Create an unbound route resolving its URIs through `registry`.
    ///
    /// Routes are normally created through
    /// [`Context::create_route`](crate::core::Context::create_route), which also registers
    /// them with the context.
    pub fn new(registry: Arc<ComponentRegistry>) -> Self {
        Self {
            info: RwLock::new(RouteInfo::default()),
            registry,
            source: RwLock::new(None),
            chain: RwLock::new(Vec::new()),
            state: Mutex::new(RouteState::Created),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, RouteState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> String {
        read(&self.info).id.clone()
    }

    pub fn description(&self) -> String {
        read(&self.info).description.clone()
    }

    /// Advisory grouping label.
    pub fn group(&self) -> String {
        read(&self.info).group.clone()
    }

    pub fn set_id(&self, id: impl Into<String>) -> &Self {
        write(&self.info).id = id.into();
        self
    }

    pub fn set_description(&self, description: impl Into<String>) -> &Self {
        write(&self.info).description = description.into();
        self
    }

    pub fn set_group(&self, group: impl Into<String>) -> &Self {
        write(&self.info).group = group.into();
        self
    }

    /// Resolve `uri` and bind it as the source endpoint.
    ///
    /// Resolution failures are returned to the caller. Rebinding replaces the previous
    /// source but does not affect a consumer that is already running.
    pub async fn bind_source(&self, uri: &str) -> Result<&Self> {
        let endpoint = self.registry.resolve(uri).await?;
        *write(&self.source) = Some(endpoint);
        Ok(self)
    }

    pub fn source(&self) -> Option<Arc<dyn Endpoint>> {
        read(&self.source).clone()
    }

    /// Append a processor to the chain.
    pub fn add_processor(&self, processor: Arc<dyn Processor>) -> &Self {
        write(&self.chain).push(processor);
        self
    }

    /// Append a closure to the chain.
    pub fn add_processor_fn<F>(&self, f: F) -> &Self
    where
        F: Fn(&mut Exchange) -> Result<()> + Send + Sync + 'static,
    {
        self.add_processor(Arc::new(FnProcessor::new(f)))
    }

    /// Resolve a destination and append a step sending every exchange to it.
    pub async fn to(&self, uri: &str) -> Result<&Self> {
        let endpoint = self.registry.resolve(uri).await?;
        Ok(self.add_processor(Arc::new(SendTo::new(endpoint))))
    }

    pub fn processor_count(&self) -> usize {
        read(&self.chain).len()
    }

    pub fn status(&self) -> RouteStatus {
        self.lock_state().status()
    }

    pub fn is_started(&self) -> bool {
        self.status() == RouteStatus::Started
    }

    /// Create a consumer for the source endpoint, dispatching into this route, and start it
    /// against `scope`.
    pub async fn start(self: &Arc<Self>, scope: CancellationToken) -> Result<()> {
        let route_id = self.id();
        let (source, previous) = {
            let mut state = self.lock_state();
            if matches!(
                *state,
                RouteState::Starting | RouteState::Started(_) | RouteState::Stopping
            ) {
                return Err(Error::AlreadyStarted(format!("Route '{route_id}'")));
            }
            let source = self
                .source()
                .ok_or_else(|| Error::NoSourceEndpoint(route_id.clone()))?;
            let previous = std::mem::replace(&mut *state, RouteState::Starting);
            (source, previous)
        };

        let processor: Arc<dyn Processor> = self.clone();
        let started = async {
            let consumer = source.create_consumer(processor)?;
            consumer.start(scope).await?;
            Ok::<_, Error>(consumer)
        }
        .instrument(tracing_setup::create_route_span(&route_id))
        .await;

        let mut state = self.lock_state();
        match started {
            Ok(consumer) => {
                *state = RouteState::Started(consumer);
                tracing::info!(route_id = %route_id, source = %source.uri(), "Route started");
                Ok(())
            }
            Err(e) => {
                *state = previous;
                tracing::error!(route_id = %route_id, error = %e, "Route failed to start");
                Err(e)
            }
        }
    }

    /// Stop the consumer created by [`start`](Self::start). No-op when not started; when
    /// several callers race, only one of them runs the consumer's stop logic.
    pub async fn stop(&self) -> Result<()> {
        let consumer = {
            let mut state = self.lock_state();
            match std::mem::replace(&mut *state, RouteState::Stopping) {
                RouteState::Started(consumer) => consumer,
                other => {
                    *state = other;
                    return Ok(());
                }
            }
        };

        let route_id = self.id();
        let stopped = consumer
            .stop()
            .instrument(tracing_setup::create_route_span(&route_id))
            .await;

        let mut state = self.lock_state();
        match stopped {
            Ok(()) => {
                *state = RouteState::Stopped;
                tracing::info!(route_id = %route_id, "Route stopped");
                Ok(())
            }
            Err(e) => {
                // the consumer may still be running, keep it so stop can be retried
                *state = RouteState::Started(consumer);
                tracing::error!(route_id = %route_id, error = %e, "Route failed to stop");
                Err(e)
            }
        }
    }

    /// Run the chain on `exchange`. The first failing step short-circuits the rest; changes
    /// already made to the exchange are kept.
    async fn run_chain(&self, exchange: &mut Exchange) -> Result<()> {
        let chain: Vec<Arc<dyn Processor>> = read(&self.chain).clone();
        for (step, processor) in chain.iter().enumerate() {
            if let Err(e) = processor.process(exchange).await {
                let route_id = self.id();
                tracing::debug!(
                    route_id = %route_id,
                    exchange_id = %exchange.id(),
                    step,
                    error = %e,
                    "Processor failed"
                );
                exchange.set_property(keys::FAILURE_ROUTE_ID, route_id);
                exchange.set_property(keys::EXCEPTION_CAUGHT, e.to_string());
                exchange.set_error(e.clone());
                return Err(e);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Processor for Route {
    async fn process(&self, exchange: &mut Exchange) -> Result<()> {
        let span = tracing_setup::create_exchange_span(&self.id(), exchange.id());
        self.run_chain(exchange).instrument(span).await
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let info = read(&self.info);
        f.debug_struct("Route")
            .field("id", &info.id)
            .field("group", &info.group)
            .field("source", &self.source().map(|s| s.uri().to_string()))
            .field("processors", &self.processor_count())
            .field("status", &self.status())
            .finish()
    }
}
