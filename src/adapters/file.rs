//! Filesystem transport (`file:<path>` or `file://<path>`).
//!
//! Producers write the in body to the endpoint path. Consumers either read a single file
//! once when started, or watch a directory and emit one exchange per file that appears in
//! it.
use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use notify::{
    EventKind, RecursiveMode, Watcher,
    event::{ModifyKind, RenameMode},
};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::{
    core::{Error, Exchange, Result, keys},
    ports::{Component, Consumer, Endpoint, Processor, Producer},
    tracing_setup,
};

pub const SCHEME: &str = "file";

#[derive(Debug, Default)]
pub struct FileComponent;

impl FileComponent {
    pub fn new() -> Self {
        Self
    }
}

/// Path of a file URI and whether it names a directory (trailing `/`).
fn endpoint_path(uri: &str) -> Option<(PathBuf, bool)> {
    let rest = uri
        .strip_prefix("file://")
        .or_else(|| uri.strip_prefix("file:"))?;
    let path = rest.split('?').next().unwrap_or_default();
    (!path.is_empty()).then(|| (PathBuf::from(path), path.ends_with('/')))
}

impl Component for FileComponent {
    fn create_endpoint(&self, uri: &str) -> Result<Arc<dyn Endpoint>> {
        let (path, directory) =
            endpoint_path(uri).ok_or_else(|| Error::invalid_endpoint(uri, "missing file path"))?;
        Ok(Arc::new(FileEndpoint {
            uri: uri.to_string(),
            path,
            directory,
        }))
    }
}

pub struct FileEndpoint {
    uri: String,
    path: PathBuf,
    directory: bool,
}

impl FileEndpoint {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The URI ends in `/`, so the path is a directory even before it exists.
    pub fn is_directory(&self) -> bool {
        self.directory
    }
}

impl Endpoint for FileEndpoint {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn create_producer(&self) -> Result<Box<dyn Producer>> {
        Ok(Box::new(FileProducer {
            uri: self.uri.clone(),
            path: self.path.clone(),
            directory: self.directory,
        }))
    }

    fn create_consumer(&self, processor: Arc<dyn Processor>) -> Result<Arc<dyn Consumer>> {
        Ok(Arc::new(FileConsumer {
            uri: self.uri.clone(),
            path: self.path.clone(),
            directory: self.directory,
            processor,
            watch: Mutex::new(None),
        }))
    }
}

pub struct FileProducer {
    uri: String,
    path: PathBuf,
    directory: bool,
}

impl FileProducer {
    /// Target file for `exchange`: the endpoint path, or `FILE_NAME` inside it when the
    /// endpoint path is a directory.
    async fn target(&self, exchange: &Exchange) -> Result<PathBuf> {
        let is_dir = self.directory
            || tokio::fs::metadata(&self.path)
                .await
                .map(|m| m.is_dir())
                .unwrap_or(false);
        if !is_dir {
            return Ok(self.path.clone());
        }

        let name = exchange
            .header(keys::FILE_NAME)
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                let reason = format!(
                    "{} is a directory and no {} header is set",
                    self.path.display(),
                    keys::FILE_NAME
                );
                Error::transport(&self.uri, reason)
            })?;
        Ok(self.path.join(name))
    }
}

#[async_trait]
impl Producer for FileProducer {
    async fn start(&self, _scope: CancellationToken) -> Result<()> {
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        Ok(())
    }

    async fn send(&self, exchange: &mut Exchange) -> Result<()> {
        let content = exchange.body().to_payload().ok_or_else(|| {
            Error::transport(
                &self.uri,
                format!("unsupported body type: {}", exchange.body().kind()),
            )
        })?;

        let target = self.target(exchange).await?;
        if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::transport(&self.uri, e))?;
        }
        tokio::fs::write(&target, &content)
            .await
            .map_err(|e| Error::transport(&self.uri, e))?;

        tracing::debug!(
            uri = %self.uri,
            path = %target.display(),
            bytes = content.len(),
            "File written"
        );
        Ok(())
    }
}

struct DirectoryWatch {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct FileConsumer {
    uri: String,
    path: PathBuf,
    directory: bool,
    processor: Arc<dyn Processor>,
    watch: Mutex<Option<DirectoryWatch>>,
}

/// Exchange carrying the content of `path` and the file headers.
async fn file_exchange(path: &Path, scope: CancellationToken) -> std::io::Result<Exchange> {
    let content = tokio::fs::read(path).await?;
    let metadata = tokio::fs::metadata(path).await?;

    let mut exchange = Exchange::new(scope);
    exchange.set_body(content);
    if let Some(name) = path.file_name() {
        exchange.set_header(keys::FILE_NAME, name.to_string_lossy().into_owned());
    }
    exchange.set_header(keys::FILE_PATH, path.to_string_lossy().into_owned());
    exchange.set_header(keys::FILE_LENGTH, metadata.len());
    if let Ok(modified) = metadata.modified() {
        exchange.set_header(keys::FILE_LAST_MODIFIED, DateTime::<Utc>::from(modified));
    }
    Ok(exchange)
}

impl FileConsumer {
    async fn consume_file(&self, scope: CancellationToken) -> Result<()> {
        let mut exchange = file_exchange(&self.path, scope)
            .await
            .map_err(|e| Error::transport(&self.uri, e))?;
        self.processor.process(&mut exchange).await
    }

    fn watch_directory(&self, scope: CancellationToken) -> Result<DirectoryWatch> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut watcher =
            notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
                // receiver gone means the watch task has ended
                let _ = tx.send(res);
            })
            .map_err(|e| Error::transport(&self.uri, e))?;
        watcher
            .watch(&self.path, RecursiveMode::NonRecursive)
            .map_err(|e| Error::transport(&self.uri, e))?;

        let cancel = scope.child_token();
        let handle = tokio::spawn(
            watch_loop(
                self.uri.clone(),
                watcher,
                rx,
                self.processor.clone(),
                cancel.clone(),
            )
            .instrument(tracing_setup::create_consumer_span(&self.uri)),
        );
        Ok(DirectoryWatch { cancel, handle })
    }
}

fn is_arrival(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(RenameMode::To))
    )
}

async fn watch_loop(
    uri: String,
    // dropping the watcher ends the notification stream
    _watcher: notify::RecommendedWatcher,
    mut events: mpsc::UnboundedReceiver<notify::Result<notify::Event>>,
    processor: Arc<dyn Processor>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        let event = match event {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(uri = %uri, error = %e, "File watch error");
                continue;
            }
        };
        if !is_arrival(&event.kind) {
            continue;
        }

        for path in event.paths.iter().filter(|p| p.is_file()) {
            let mut exchange = match file_exchange(path, cancel.clone()).await {
                Ok(exchange) => exchange,
                Err(e) => {
                    tracing::warn!(
                        uri = %uri,
                        path = %path.display(),
                        error = %e,
                        "Failed to read file"
                    );
                    continue;
                }
            };
            if let Err(e) = processor.process(&mut exchange).await {
                tracing::warn!(
                    uri = %uri,
                    path = %path.display(),
                    exchange_id = %exchange.id(),
                    error = %e,
                    "Failed to process file"
                );
            }
        }
    }
    tracing::debug!(uri = %uri, "File watch ended");
}

#[async_trait]
impl Consumer for FileConsumer {
    async fn start(&self, scope: CancellationToken) -> Result<()> {
        if self.directory {
            tokio::fs::create_dir_all(&self.path)
                .await
                .map_err(|e| Error::transport(&self.uri, e))?;
        }
        let metadata = tokio::fs::metadata(&self.path)
            .await
            .map_err(|e| Error::transport(&self.uri, e))?;

        if !metadata.is_dir() {
            return self.consume_file(scope).await;
        }

        let mut watch = self.watch.lock().unwrap_or_else(PoisonError::into_inner);
        if watch.is_some() {
            return Err(Error::AlreadyStarted(format!("Consumer '{}'", self.uri)));
        }
        *watch = Some(self.watch_directory(scope)?);
        tracing::info!(uri = %self.uri, path = %self.path.display(), "Watching directory");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let watch = self
            .watch
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(DirectoryWatch { cancel, handle }) = watch {
            cancel.cancel();
            if let Err(e) = handle.await {
                tracing::error!(uri = %self.uri, error = %e, "File watch task ended abnormally");
            }
        }
        Ok(())
    }
}
