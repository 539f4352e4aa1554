//! Scheme name to component lookup used to resolve URIs into endpoints.
use std::sync::Arc;

use scc::HashMap;

use crate::{
    core::error::{Error, Result},
    ports::{Component, Endpoint},
};

/// Extract the scheme of `<scheme>:<rest>` URIs.
///
/// The scheme is everything before the first `:`. It must start with an ASCII letter
/// followed by letters, digits, `+`, `-` or `.`.
pub fn parse_scheme(uri: &str) -> Result<&str> {
    let (scheme, _) = uri
        .split_once(':')
        .ok_or_else(|| Error::InvalidUri(uri.to_string()))?;

    let mut chars = scheme.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    if !valid {
        return Err(Error::InvalidUri(uri.to_string()));
    }
    Ok(scheme)
}

/// Thread-safe component registry. Owned by a [`Context`](crate::core::Context) and shared
/// with its routes; never a process-wide singleton.
#[derive(Default)]
pub struct ComponentRegistry {
    components: HashMap<String, Arc<dyn Component>>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `component` under `scheme`, replacing any previous registration.
    pub async fn register(&self, scheme: impl Into<String>, component: Arc<dyn Component>) {
        let scheme = scheme.into();
        tracing::debug!(scheme = %scheme, "Registering component");
        let _ = self.components.upsert_async(scheme, component).await;
    }

    pub async fn get(&self, scheme: &str) -> Result<Arc<dyn Component>> {
        self.components
            .read_async(scheme, |_, component| component.clone())
            .await
            .ok_or_else(|| Error::ComponentNotFound(scheme.to_string()))
    }

    pub async fn remove(&self, scheme: &str) -> bool {
        self.components.remove_async(scheme).await.is_some()
    }

    pub async fn contains(&self, scheme: &str) -> bool {
        self.components.read_async(scheme, |_, _| ()).await.is_some()
    }

    /// Registered scheme names, sorted.
    pub async fn names(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.components
            .retain_async(|scheme, _| {
                names.push(scheme.clone());
                true
            })
            .await;
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub async fn clear(&self) {
        self.components.retain_async(|_, _| false).await;
    }

    /// Resolve a URI into a live endpoint through the component registered for its scheme.
    pub async fn resolve(&self, uri: &str) -> Result<Arc<dyn Endpoint>> {
        let scheme = parse_scheme(uri)?;
        let component = self.get(scheme).await.map_err(|_| Error::UnknownScheme {
            scheme: scheme.to_string(),
            uri: uri.to_string(),
        })?;
        let endpoint = component.create_endpoint(uri)?;
        tracing::debug!(uri = %uri, scheme = %scheme, "Resolved endpoint");
        Ok(endpoint)
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::{
        core::Exchange,
        ports::{Consumer, Processor, Producer},
    };

    struct EchoEndpoint {
        uri: String,
    }

    struct NoopProducer;

    #[async_trait]
    impl Producer for NoopProducer {
        async fn start(&self, _scope: CancellationToken) -> Result<()> {
            Ok(())
        }
        async fn stop(&self) -> Result<()> {
            Ok(())
        }
        async fn send(&self, _exchange: &mut Exchange) -> Result<()> {
            Ok(())
        }
    }

    impl Endpoint for EchoEndpoint {
        fn uri(&self) -> &str {
            &self.uri
        }
        fn create_producer(&self) -> Result<Box<dyn Producer>> {
            Ok(Box::new(NoopProducer))
        }
        fn create_consumer(&self, _processor: Arc<dyn Processor>) -> Result<Arc<dyn Consumer>> {
            Err(Error::invalid_endpoint(&self.uri, "send only"))
        }
    }

    struct EchoComponent;

    impl Component for EchoComponent {
        fn create_endpoint(&self, uri: &str) -> Result<Arc<dyn Endpoint>> {
            Ok(Arc::new(EchoEndpoint {
                uri: uri.to_string(),
            }))
        }
    }

    #[test]
    fn test_parse_scheme() {
        assert_eq!(parse_scheme("mem:queue1").unwrap(), "mem");
        assert_eq!(parse_scheme("file:///tmp/in").unwrap(), "file");
        assert_eq!(parse_scheme("http://localhost:8080/a").unwrap(), "http");
        assert_eq!(parse_scheme("svc+tls:x").unwrap(), "svc+tls");
        assert!(matches!(parse_scheme("no-scheme"), Err(Error::InvalidUri(_))));
        assert!(matches!(parse_scheme(":empty"), Err(Error::InvalidUri(_))));
        assert!(matches!(parse_scheme("1abc:x"), Err(Error::InvalidUri(_))));
    }

    #[tokio::test]
    async fn test_register_get_remove() {
        let registry = ComponentRegistry::new();
        assert!(registry.is_empty());

        registry.register("echo", Arc::new(EchoComponent)).await;
        registry.register("other", Arc::new(EchoComponent)).await;
        // overwriting is idempotent
        registry.register("echo", Arc::new(EchoComponent)).await;

        assert_eq!(registry.len(), 2);
        assert!(registry.contains("echo").await);
        assert_eq!(registry.names().await, vec!["echo", "other"]);
        assert!(registry.get("echo").await.is_ok());
        assert!(matches!(
            registry.get("missing").await,
            Err(Error::ComponentNotFound(name)) if name == "missing"
        ));

        assert!(registry.remove("other").await);
        assert!(!registry.remove("other").await);

        registry.clear().await;
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_resolve() {
        let registry = ComponentRegistry::new();
        registry.register("echo", Arc::new(EchoComponent)).await;

        let endpoint = registry.resolve("echo:some/where").await.unwrap();
        assert_eq!(endpoint.uri(), "echo:some/where");

        assert!(matches!(
            registry.resolve("nope:x").await,
            Err(Error::UnknownScheme { scheme, .. }) if scheme == "nope"
        ));
        assert!(matches!(
            registry.resolve("plain").await,
            Err(Error::InvalidUri(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_register_and_resolve() {
        let registry = Arc::new(ComponentRegistry::new());
        registry.register("echo", Arc::new(EchoComponent)).await;

        let mut handles = Vec::new();
        for i in 0..16 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                registry
                    .register(format!("s{i}"), Arc::new(EchoComponent))
                    .await;
                registry.resolve("echo:x").await.map(|e| e.uri().to_string())
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "echo:x");
        }
        assert_eq!(registry.len(), 17);
    }
}
