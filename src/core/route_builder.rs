use std::sync::Arc;

use crate::{
    core::{
        error::Result,
        exchange::Exchange,
        route::Route,
        value::Value,
    },
    ports::Processor,
};

/// Fluent construction of a [`Route`].
///
/// The route is registered with its context when the builder is created, so
/// [`build`](Self::build) only hands back the handle.
///
/// ```no_run
/// # async fn demo(ctx: &courier::Context) -> courier::Result<()> {
/// let route = ctx
///     .create_route_builder()
///     .set_id("uppercase")
///     .from("mem:in")
///     .await?
///     .process_fn(|ex| {
///         let upper = ex.body().to_string().to_uppercase();
///         ex.set_body(upper);
///         Ok(())
///     })
///     .log_body()
///     .to("mem:out")
///     .await?
///     .build();
/// # let _ = route;
/// # Ok(()) }
/// ```
pub struct RouteBuilder {
    route: Arc<Route>,
}

impl RouteBuilder {
    pub fn new(route: Arc<Route>) -> Self {
        Self { route }
    }

    /// Bind the source endpoint.
    pub async fn from(&mut self, uri: &str) -> Result<&mut Self> {
        self.route.bind_source(uri).await?;
        Ok(self)
    }

    pub fn process(&mut self, processor: impl Processor) -> &mut Self {
        self.route.add_processor(Arc::new(processor));
        self
    }

    /// Add an already shared processor, e.g. another route.
    pub fn process_shared(&mut self, processor: Arc<dyn Processor>) -> &mut Self {
        self.route.add_processor(processor);
        self
    }

    pub fn process_fn<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&mut Exchange) -> Result<()> + Send + Sync + 'static,
    {
        self.route.add_processor_fn(f);
        self
    }

    /// Send every exchange reaching this point to `uri`.
    pub async fn to(&mut self, uri: &str) -> Result<&mut Self> {
        self.route.to(uri).await?;
        Ok(self)
    }

    pub fn set_id(&mut self, id: impl Into<String>) -> &mut Self {
        self.route.set_id(id);
        self
    }

    pub fn set_description(&mut self, description: impl Into<String>) -> &mut Self {
        self.route.set_description(description);
        self
    }

    pub fn set_group(&mut self, group: impl Into<String>) -> &mut Self {
        self.route.set_group(group);
        self
    }

    pub fn set_body(&mut self, body: impl Into<Value>) -> &mut Self {
        let body = body.into();
        self.process_fn(move |ex| {
            ex.set_body(body.clone());
            Ok(())
        })
    }

    pub fn set_header(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        let key = key.into();
        let value = value.into();
        self.process_fn(move |ex| {
            ex.set_header(key.clone(), value.clone());
            Ok(())
        })
    }

    pub fn remove_header(&mut self, key: impl Into<String>) -> &mut Self {
        let key = key.into();
        self.process_fn(move |ex| {
            ex.in_message_mut().remove_header(&key);
            Ok(())
        })
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        let key = key.into();
        let value = value.into();
        self.process_fn(move |ex| {
            ex.set_property(key.clone(), value.clone());
            Ok(())
        })
    }

    /// Emit `message` as an info event for every exchange.
    pub fn log(&mut self, message: impl Into<String>) -> &mut Self {
        let message = message.into();
        let route = Arc::downgrade(&self.route);
        self.process_fn(move |ex| {
            let route_id = route.upgrade().map(|r| r.id()).unwrap_or_default();
            tracing::info!(route_id = %route_id, exchange_id = %ex.id(), "{message}");
            Ok(())
        })
    }

    pub fn log_body(&mut self) -> &mut Self {
        let route = Arc::downgrade(&self.route);
        self.process_fn(move |ex| {
            let route_id = route.upgrade().map(|r| r.id()).unwrap_or_default();
            tracing::info!(
                route_id = %route_id,
                exchange_id = %ex.id(),
                body_kind = ex.body().kind(),
                "Body: {}",
                ex.body()
            );
            Ok(())
        })
    }

    pub fn log_headers(&mut self) -> &mut Self {
        let route = Arc::downgrade(&self.route);
        self.process_fn(move |ex| {
            let route_id = route.upgrade().map(|r| r.id()).unwrap_or_default();
            let mut headers: Vec<String> = ex
                .in_message()
                .headers()
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect();
            headers.sort();
            tracing::info!(
                route_id = %route_id,
                exchange_id = %ex.id(),
                "Headers: {}",
                headers.join(", ")
            );
            Ok(())
        })
    }

    /// Handle to the route being built.
    pub fn route(&self) -> &Arc<Route> {
        &self.route
    }

    pub fn build(&self) -> Arc<Route> {
        self.route.clone()
    }
}

#[cfg(test)]
mod tests {
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::core::registry::ComponentRegistry;

    #[tokio::test]
    async fn test_convenience_steps() {
        let route = Arc::new(Route::new(Arc::new(ComponentRegistry::new())));
        let mut builder = RouteBuilder::new(route);
        builder
            .set_id("sugar")
            .set_description("builder sugar")
            .set_group("tests")
            .set_body("replaced")
            .set_header("h1", "v1")
            .set_header("h2", 2)
            .remove_header("h2")
            .set_property("p", true)
            .log("passing through")
            .log_body()
            .log_headers();

        let route = builder.build();
        assert_eq!(route.id(), "sugar");
        assert_eq!(route.description(), "builder sugar");
        assert_eq!(route.group(), "tests");
        assert_eq!(route.processor_count(), 8);

        let mut ex = Exchange::new(CancellationToken::new());
        ex.set_body("original");
        route.process(&mut ex).await.unwrap();

        assert_eq!(ex.body().as_str(), Some("replaced"));
        assert_eq!(ex.header("h1").and_then(Value::as_str), Some("v1"));
        assert!(ex.header("h2").is_none());
        assert_eq!(ex.property_bool("p"), Some(true));
    }

    #[tokio::test]
    async fn test_from_unknown_scheme_fails() {
        let route = Arc::new(Route::new(Arc::new(ComponentRegistry::new())));
        let mut builder = RouteBuilder::new(route);
        assert!(builder.from("ghost:x").await.is_err());
        assert!(builder.build().source().is_none());
    }
}
