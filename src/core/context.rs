//! Process-wide orchestrator owning the component registry and all routes.
//!
//! The `Context` drives coordinated start/stop of its routes against one cancellable
//! lifetime. Route storage is an `ArcSwap` snapshot so route queries never block and no
//! lock is held while calling into transports. Lifecycle transitions go through a small
//! state machine guarded by a mutex that is only held for the transition itself.
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use arc_swap::ArcSwap;
use tokio_util::sync::CancellationToken;

use crate::{
    core::{
        error::{Error, LifecycleAction, Result},
        exchange::Exchange,
        registry::ComponentRegistry,
        route::Route,
        route_builder::RouteBuilder,
    },
    ports::{Component, Endpoint},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContextState {
    Stopped,
    Starting,
    Started,
    Stopping,
}

pub struct Context {
    name: String,
    registry: Arc<ComponentRegistry>,
    routes: ArcSwap<Vec<Arc<Route>>>,
    lifetime: Mutex<CancellationToken>,
    state: Mutex<ContextState>,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    pub fn new() -> Self {
        Self::with_name("courier")
    }

    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            registry: Arc::new(ComponentRegistry::new()),
            routes: ArcSwap::from_pointee(Vec::new()),
            lifetime: Mutex::new(CancellationToken::new()),
            state: Mutex::new(ContextState::Stopped),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock_state(&self) -> MutexGuard<'_, ContextState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current lifetime scope. Cancelled when the context stops.
    pub fn scope(&self) -> CancellationToken {
        self.lifetime
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// New exchange whose scope is a child of the context lifetime.
    pub fn create_exchange(&self) -> Exchange {
        Exchange::new(self.scope().child_token())
    }

    // Components

    pub fn registry(&self) -> &Arc<ComponentRegistry> {
        &self.registry
    }

    pub async fn add_component(&self, scheme: impl Into<String>, component: Arc<dyn Component>) {
        self.registry.register(scheme, component).await;
    }

    pub async fn component(&self, scheme: &str) -> Result<Arc<dyn Component>> {
        self.registry.get(scheme).await
    }

    pub async fn create_endpoint(&self, uri: &str) -> Result<Arc<dyn Endpoint>> {
        self.registry.resolve(uri).await
    }

    // Routes

    /// Create an empty route registered with this context.
    pub fn create_route(&self) -> Arc<Route> {
        let route = Arc::new(Route::new(self.registry.clone()));
        self.add_route(route.clone());
        route
    }

    /// Builder over a fresh route, already registered with this context.
    pub fn create_route_builder(&self) -> RouteBuilder {
        RouteBuilder::new(self.create_route())
    }

    pub fn add_route(&self, route: Arc<Route>) {
        self.routes.rcu(|routes| {
            let mut next = Vec::clone(routes);
            next.push(route.clone());
            next
        });
    }

    pub fn add_routes(&self, routes: impl IntoIterator<Item = Arc<Route>>) {
        let added: Vec<Arc<Route>> = routes.into_iter().collect();
        self.routes.rcu(|routes| {
            let mut next = Vec::clone(routes);
            next.extend(added.iter().cloned());
            next
        });
    }

    /// First route with the given id. Ids are not required to be unique.
    pub fn route(&self, id: &str) -> Option<Arc<Route>> {
        self.routes.load().iter().find(|r| r.id() == id).cloned()
    }

    /// Snapshot of all routes in insertion order.
    pub fn routes(&self) -> Vec<Arc<Route>> {
        self.routes.load().as_ref().clone()
    }

    /// Remove a route by identity. Returns whether it was present.
    pub fn remove_route(&self, route: &Arc<Route>) -> bool {
        self.remove_first(|r| Arc::ptr_eq(r, route))
    }

    /// Remove the first route with the given id. Returns whether one was removed.
    pub fn remove_route_by_id(&self, id: &str) -> bool {
        self.remove_first(|r| r.id() == id)
    }

    fn remove_first(&self, matches: impl Fn(&Arc<Route>) -> bool) -> bool {
        let mut removed = false;
        self.routes.rcu(|routes| {
            let mut next = Vec::clone(routes);
            removed = match next.iter().position(&matches) {
                Some(index) => {
                    next.remove(index);
                    true
                }
                None => false,
            };
            next
        });
        removed
    }

    pub fn remove_all_routes(&self) {
        self.routes.store(Arc::new(Vec::new()));
    }

    pub fn route_count(&self) -> usize {
        self.routes.load().len()
    }

    pub fn started_route_count(&self) -> usize {
        self.routes.load().iter().filter(|r| r.is_started()).count()
    }

    // Lifecycle

    pub fn is_started(&self) -> bool {
        *self.lock_state() == ContextState::Started
    }

    /// Start every route in insertion order.
    ///
    /// The first failure aborts the sequence and is returned wrapped with the route id.
    /// Routes started before the failure keep running; call [`stop`](Self::stop) to unwind.
    pub async fn start(&self) -> Result<()> {
        {
            let mut state = self.lock_state();
            if *state != ContextState::Stopped {
                return Err(Error::AlreadyStarted(format!("Context '{}'", self.name)));
            }
            *state = ContextState::Starting;
        }

        tracing::info!(context = %self.name, routes = self.route_count(), "Starting context");
        let scope = self.scope();
        for route in self.routes().iter() {
            if let Err(e) = route.start(scope.clone()).await {
                *self.lock_state() = ContextState::Stopped;
                return Err(Error::route_lifecycle(&route.id(), LifecycleAction::Start, e));
            }
        }

        *self.lock_state() = ContextState::Started;
        tracing::info!(
            context = %self.name,
            started_routes = self.started_route_count(),
            "Context started"
        );
        Ok(())
    }

    /// Stop every route in insertion order, then cancel the lifetime scope.
    ///
    /// No-op when neither the context nor any of its routes are started, so it also unwinds
    /// a start that failed halfway. Every route is asked to stop even if an earlier one
    /// fails; the first failure is returned. A fresh lifetime is installed so
    /// the context can be started again.
    pub async fn stop(&self) -> Result<()> {
        {
            let mut state = self.lock_state();
            let partially_started =
                *state == ContextState::Stopped && self.started_route_count() > 0;
            if *state != ContextState::Started && !partially_started {
                return Ok(());
            }
            *state = ContextState::Stopping;
        }

        tracing::info!(context = %self.name, "Stopping context");
        let mut first_error = None;
        for route in self.routes().iter() {
            if let Err(e) = route.stop().await {
                let route_id = route.id();
                tracing::error!(
                    context = %self.name,
                    route_id = %route_id,
                    error = %e,
                    "Failed to stop route"
                );
                if first_error.is_none() {
                    first_error = Some(Error::route_lifecycle(&route_id, LifecycleAction::Stop, e));
                }
            }
        }

        {
            let mut lifetime = self.lifetime.lock().unwrap_or_else(PoisonError::into_inner);
            lifetime.cancel();
            *lifetime = CancellationToken::new();
        }
        *self.lock_state() = ContextState::Stopped;
        tracing::info!(context = %self.name, "Context stopped");

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("name", &self.name)
            .field("routes", &self.route_count())
            .field("components", &self.registry.len())
            .field("started", &self.is_started())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stop_never_started_is_noop() {
        let ctx = Context::new();
        ctx.stop().await.unwrap();
        assert!(!ctx.is_started());
        assert!(!ctx.scope().is_cancelled());
    }

    #[tokio::test]
    async fn test_start_with_no_routes() {
        let ctx = Context::new();
        ctx.start().await.unwrap();
        assert!(ctx.is_started());
        assert!(matches!(ctx.start().await, Err(Error::AlreadyStarted(_))));

        let scope = ctx.scope();
        ctx.stop().await.unwrap();
        assert!(scope.is_cancelled());
        assert!(!ctx.is_started());
        // a fresh lifetime allows restarting
        assert!(!ctx.scope().is_cancelled());
    }

    #[tokio::test]
    async fn test_route_management() {
        let ctx = Context::new();
        let a = ctx.create_route();
        a.set_id("a");
        let b = ctx.create_route();
        b.set_id("b");
        let dup = ctx.create_route();
        dup.set_id("a");

        assert_eq!(ctx.route_count(), 3);
        assert!(Arc::ptr_eq(&ctx.route("a").unwrap(), &a));
        assert!(ctx.route("missing").is_none());

        assert!(ctx.remove_route_by_id("a"));
        assert_eq!(ctx.route_count(), 2);
        // the duplicate id is now the first match
        assert!(Arc::ptr_eq(&ctx.route("a").unwrap(), &dup));

        assert!(ctx.remove_route(&b));
        assert!(!ctx.remove_route(&b));

        ctx.add_routes([a.clone(), b.clone()]);
        let ids: Vec<String> = ctx.routes().iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec!["a", "a", "b"]);

        ctx.remove_all_routes();
        assert_eq!(ctx.route_count(), 0);
        assert_eq!(ctx.started_route_count(), 0);
    }

    #[tokio::test]
    async fn test_start_fails_on_unbound_route() {
        let ctx = Context::new();
        ctx.create_route().set_id("unbound");

        let err = ctx.start().await.unwrap_err();
        assert!(matches!(
            &err,
            Error::RouteLifecycle {
                route_id,
                action: LifecycleAction::Start,
                ..
            } if route_id == "unbound"
        ));
        assert!(matches!(err.root(), Error::NoSourceEndpoint(_)));
        assert!(!ctx.is_started());
    }

    #[tokio::test]
    async fn test_create_exchange_uses_child_scope() {
        let ctx = Context::new();
        ctx.start().await.unwrap();
        let ex = ctx.create_exchange();
        assert!(!ex.is_cancelled());
        ctx.stop().await.unwrap();
        assert!(ex.is_cancelled());
    }
}
