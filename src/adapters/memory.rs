//! In-memory queue transport (`mem:<queue>`).
//!
//! All endpoints created by one [`MemoryComponent`] with the same queue name share a
//! single FIFO. Producers enqueue a copy of the exchange; consumers drain the queue from a
//! supervised background task. Queues can be inspected directly, which makes this
//! component the natural harness for exercising routes.
use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use tokio::{sync::Notify, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::{
    core::{Error, Exchange, Result},
    ports::{Component, Consumer, Endpoint, Processor, Producer},
    tracing_setup,
};

pub const SCHEME: &str = "mem";

/// A named FIFO of exchanges.
#[derive(Debug)]
pub struct MemoryQueue {
    name: String,
    items: Mutex<VecDeque<Exchange>>,
    pushed: Notify,
}

impl MemoryQueue {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            items: Mutex::new(VecDeque::new()),
            pushed: Notify::new(),
        }
    }

    fn items(&self) -> MutexGuard<'_, VecDeque<Exchange>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn push(&self, exchange: Exchange) {
        self.items().push_back(exchange);
        self.pushed.notify_one();
    }

    pub fn pop(&self) -> Option<Exchange> {
        self.items().pop_front()
    }

    pub fn drain(&self) -> Vec<Exchange> {
        self.items().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items().is_empty()
    }
}

/// Component handing out endpoints over shared named queues.
#[derive(Debug, Default)]
pub struct MemoryComponent {
    queues: Mutex<HashMap<String, Arc<MemoryQueue>>>,
}

impl MemoryComponent {
    pub fn new() -> Self {
        Self::default()
    }

    /// The queue with the given name, created on first use.
    pub fn queue(&self, name: &str) -> Arc<MemoryQueue> {
        self.queues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemoryQueue::new(name)))
            .clone()
    }

    pub fn queue_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .queues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

impl Component for MemoryComponent {
    fn create_endpoint(&self, uri: &str) -> Result<Arc<dyn Endpoint>> {
        let name = uri
            .split_once(':')
            .map(|(_, rest)| rest.trim_start_matches("//"))
            .unwrap_or_default();
        // options are accepted but ignored: mem:orders?size=10
        let name = name.split('?').next().unwrap_or_default();
        if name.is_empty() {
            return Err(Error::invalid_endpoint(uri, "missing queue name"));
        }

        Ok(Arc::new(MemoryEndpoint {
            uri: uri.to_string(),
            queue: self.queue(name),
        }))
    }
}

pub struct MemoryEndpoint {
    uri: String,
    queue: Arc<MemoryQueue>,
}

impl MemoryEndpoint {
    pub fn queue(&self) -> &Arc<MemoryQueue> {
        &self.queue
    }
}

impl Endpoint for MemoryEndpoint {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn create_producer(&self) -> Result<Box<dyn Producer>> {
        Ok(Box::new(MemoryProducer {
            queue: self.queue.clone(),
        }))
    }

    fn create_consumer(&self, processor: Arc<dyn Processor>) -> Result<Arc<dyn Consumer>> {
        Ok(Arc::new(MemoryConsumer {
            uri: self.uri.clone(),
            queue: self.queue.clone(),
            processor,
            task: Mutex::new(None),
        }))
    }
}

pub struct MemoryProducer {
    queue: Arc<MemoryQueue>,
}

#[async_trait]
impl Producer for MemoryProducer {
    async fn start(&self, _scope: CancellationToken) -> Result<()> {
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        Ok(())
    }

    async fn send(&self, exchange: &mut Exchange) -> Result<()> {
        self.queue.push(exchange.copy());
        Ok(())
    }
}

struct RunningTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct MemoryConsumer {
    uri: String,
    queue: Arc<MemoryQueue>,
    processor: Arc<dyn Processor>,
    task: Mutex<Option<RunningTask>>,
}

impl MemoryConsumer {
    async fn drain_loop(
        uri: String,
        queue: Arc<MemoryQueue>,
        processor: Arc<dyn Processor>,
        cancel: CancellationToken,
    ) {
        loop {
            while let Some(mut exchange) = queue.pop() {
                if cancel.is_cancelled() {
                    // leave unprocessed work where it was
                    queue.items().push_front(exchange);
                    return;
                }
                if let Err(e) = processor.process(&mut exchange).await {
                    tracing::warn!(
                        uri = %uri,
                        exchange_id = %exchange.id(),
                        error = %e,
                        "Failed to process exchange from memory queue"
                    );
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = queue.pushed.notified() => {}
            }
        }
    }
}

#[async_trait]
impl Consumer for MemoryConsumer {
    async fn start(&self, scope: CancellationToken) -> Result<()> {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.is_some() {
            return Err(Error::AlreadyStarted(format!("Consumer '{}'", self.uri)));
        }

        let cancel = scope.child_token();
        let handle = tokio::spawn(
            Self::drain_loop(
                self.uri.clone(),
                self.queue.clone(),
                self.processor.clone(),
                cancel.clone(),
            )
            .instrument(tracing_setup::create_consumer_span(&self.uri)),
        );
        *task = Some(RunningTask { cancel, handle });
        tracing::debug!(uri = %self.uri, "Memory consumer started");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let running = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(RunningTask { cancel, handle }) = running else {
            return Ok(());
        };

        cancel.cancel();
        if let Err(e) = handle.await {
            tracing::error!(uri = %self.uri, error = %e, "Memory consumer task ended abnormally");
        }
        tracing::debug!(uri = %self.uri, "Memory consumer stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::core::FnProcessor;

    async fn wait_until(mut check: impl FnMut() -> bool) {
        for _ in 0..200 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached in time");
    }

    #[test]
    fn test_endpoints_share_named_queue() {
        let component = MemoryComponent::new();
        let a = component.create_endpoint("mem:orders").unwrap();
        let _b = component.create_endpoint("mem://orders?size=5").unwrap();
        assert_eq!(a.uri(), "mem:orders");
        assert_eq!(component.queue_names(), vec!["orders"]);
        assert!(matches!(
            component.create_endpoint("mem:"),
            Err(Error::InvalidEndpoint { .. })
        ));
    }

    #[tokio::test]
    async fn test_producer_enqueues_copy() {
        let component = MemoryComponent::new();
        let endpoint = component.create_endpoint("mem:out").unwrap();
        let producer = endpoint.create_producer().unwrap();

        let mut ex = Exchange::new(CancellationToken::new());
        ex.set_body("first");
        producer.send(&mut ex).await.unwrap();
        ex.set_body("mutated after send");

        let queued = component.queue("out").pop().unwrap();
        assert_eq!(queued.body().as_str(), Some("first"));
    }

    #[tokio::test]
    async fn test_consumer_drains_and_survives_failures() {
        let component = MemoryComponent::new();
        let endpoint = component.create_endpoint("mem:in").unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let seen_in_step = seen.clone();
        let processor = Arc::new(FnProcessor::new(move |ex: &mut Exchange| {
            let body = ex.body().to_string();
            seen_in_step.lock().unwrap().push(body.clone());
            if body == "bad" {
                return Err(Error::processor("rejected"));
            }
            Ok(())
        }));

        let consumer = endpoint.create_consumer(processor).unwrap();
        let scope = CancellationToken::new();
        consumer.start(scope.clone()).await.unwrap();
        assert!(matches!(
            consumer.start(scope.clone()).await,
            Err(Error::AlreadyStarted(_))
        ));

        let queue = component.queue("in");
        for body in ["one", "bad", "two"] {
            let mut ex = Exchange::new(scope.clone());
            ex.set_body(body);
            queue.push(ex);
        }

        wait_until(|| seen.lock().unwrap().len() == 3).await;
        assert_eq!(*seen.lock().unwrap(), vec!["one", "bad", "two"]);
        assert!(queue.is_empty());

        consumer.stop().await.unwrap();
        // idempotent
        consumer.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_consumer_ends_on_scope_cancel() {
        let component = MemoryComponent::new();
        let endpoint = component.create_endpoint("mem:cancel").unwrap();
        let processor = Arc::new(FnProcessor::new(|_ex: &mut Exchange| Ok(())));
        let consumer = endpoint.create_consumer(processor).unwrap();

        let scope = CancellationToken::new();
        consumer.start(scope.clone()).await.unwrap();
        scope.cancel();

        // stop after cancellation is still fine
        consumer.stop().await.unwrap();
    }
}
