// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! File Servicer
//!
//! Routes a decoded request to the file store by operation kind and turns
//! the outcome into result values. Successful writes are pushed to the
//! path's registered callback subscribers.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Server-side request handling, independent of transport
//!   and of invocation semantics

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::application::registry::CallbackRegistry;
use crate::domain::message::{OperationKind, ParameterError, Request, Status};
use crate::domain::path_sanitizer::PathSanitizer;
use crate::domain::storage::{FileStore, StorageError};
use crate::domain::value::Value;
use crate::infrastructure::transport::DatagramTransport;

/// Handler failures, each mapping to one response status
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn status(&self) -> Status {
        match self {
            ServiceError::BadRequest(_) => Status::BadRequest,
            ServiceError::NotFound(_) => Status::NotFound,
            ServiceError::Internal(_) => Status::InternalError,
        }
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(path) => ServiceError::NotFound(path),
            StorageError::InvalidPath(_) | StorageError::InvalidArgument(_) => {
                ServiceError::BadRequest(err.to_string())
            }
            StorageError::PermissionDenied(_) | StorageError::IoError(_) => {
                ServiceError::Internal(err.to_string())
            }
        }
    }
}

impl From<ParameterError> for ServiceError {
    fn from(err: ParameterError) -> Self {
        ServiceError::BadRequest(err.to_string())
    }
}

/// Executes one request on behalf of `origin`
#[async_trait]
pub trait Servicer: Send + Sync {
    async fn handle(&self, request: &Request, origin: SocketAddr)
        -> Result<Vec<Value>, ServiceError>;
}

pub struct FileServicer {
    store: Arc<dyn FileStore>,
    registry: Arc<CallbackRegistry>,
    notifier: Option<Arc<dyn DatagramTransport>>,
    sanitizer: PathSanitizer,
}

impl FileServicer {
    pub fn new(store: Arc<dyn FileStore>, registry: Arc<CallbackRegistry>) -> Self {
        Self {
            store,
            registry,
            notifier: None,
            sanitizer: PathSanitizer::new(),
        }
    }

    /// Socket used to push FILE_UPDATED frames to subscribers
    pub fn with_notifier(mut self, notifier: Arc<dyn DatagramTransport>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Canonical form used as the registry key and in pushes
    fn canonical_path(&self, request: &Request) -> Result<String, ServiceError> {
        let relative = self
            .sanitizer
            .relative(request.path()?)
            .map_err(|e| ServiceError::BadRequest(e.to_string()))?;
        Ok(relative.to_string_lossy().into_owned())
    }

    async fn notify_subscribers(&self, path: &str) {
        let Some(notifier) = &self.notifier else {
            return;
        };
        let subscribers = self.registry.subscribers(path);
        if subscribers.is_empty() {
            return;
        }

        let frame = match self.store.read(path).await {
            Ok((content, attrs)) => Request::file_updated(path, attrs.mtime, content).encode(),
            Err(e) => {
                error!(path = %path, "Failed to read file for callback push: {}", e);
                return;
            }
        };
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                error!(path = %path, "Failed to encode callback push: {}", e);
                return;
            }
        };

        for subscriber in subscribers {
            match notifier.send_to(&frame, subscriber).await {
                Ok(()) => {
                    debug!(path = %path, subscriber = %subscriber, "Pushed FILE_UPDATED");
                    metrics::counter!("rfa_callbacks_sent_total").increment(1);
                }
                Err(e) => warn!(path = %path, subscriber = %subscriber, "Callback push failed: {}", e),
            }
        }
    }
}

#[async_trait]
impl Servicer for FileServicer {
    async fn handle(
        &self,
        request: &Request,
        origin: SocketAddr,
    ) -> Result<Vec<Value>, ServiceError> {
        match request.kind {
            OperationKind::Empty => Ok(Vec::new()),

            OperationKind::Read => {
                let path = self.canonical_path(request)?;
                let (content, attrs) = self.store.read(&path).await?;
                debug!("READ: path={}, bytes={}, mtime={}", path, content.len(), attrs.mtime);
                Ok(vec![Value::Bytes(content), Value::Int64(attrs.mtime)])
            }

            OperationKind::Insert => {
                let path = self.canonical_path(request)?;
                let offset = request.offset()?;
                let offset = u64::try_from(offset)
                    .map_err(|_| ServiceError::BadRequest(format!("Negative offset {}", offset)))?;
                let data = request.data()?;
                let attrs = self.store.insert(&path, offset, data).await?;
                debug!("INSERT: path={}, offset={}, bytes={}", path, offset, data.len());
                self.notify_subscribers(&path).await;
                Ok(vec![Value::Int64(attrs.mtime)])
            }

            OperationKind::Append => {
                let path = self.canonical_path(request)?;
                let data = request.data()?;
                let attrs = self.store.append(&path, data).await?;
                debug!("APPEND: path={}, bytes={}", path, data.len());
                self.notify_subscribers(&path).await;
                Ok(vec![Value::Int64(attrs.mtime)])
            }

            OperationKind::GetAttr => {
                let path = self.canonical_path(request)?;
                let attrs = self.store.stat(&path).await?;
                debug!("GET_ATTR: path={}, mtime={}, atime={}", path, attrs.mtime, attrs.atime);
                Ok(vec![Value::Int64(attrs.mtime), Value::Int64(attrs.atime)])
            }

            OperationKind::ListDir => {
                let path = self.canonical_path(request)?;
                let names = self.store.list_dir(&path).await?;
                debug!("LIST_DIR: path={}, entries={}", path, names.len());
                Ok(names.into_iter().map(Value::Str).collect())
            }

            OperationKind::Touch => {
                let path = self.canonical_path(request)?;
                let atime = self.store.touch(&path).await?;
                debug!("TOUCH: path={}, atime={}", path, atime);
                Ok(vec![Value::Int64(atime)])
            }

            OperationKind::Register => {
                let path = self.canonical_path(request)?;
                let interval = request.interval_secs()?;
                if interval <= 0 {
                    return Err(ServiceError::BadRequest(format!(
                        "Registration interval must be positive, got {}",
                        interval
                    )));
                }
                // Registering for a path that does not exist is an error
                self.store.stat(&path).await?;
                self.registry
                    .register(&path, origin, Duration::from_secs(interval as u64));
                Ok(Vec::new())
            }

            OperationKind::FileUpdated => Err(ServiceError::BadRequest(
                "FILE_UPDATED is a client-bound push".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::storage::LocalFileStore;
    use crate::infrastructure::transport::UdpTransport;
    use tempfile::TempDir;

    fn origin() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 40000))
    }

    fn servicer(dir: &TempDir) -> (FileServicer, Arc<CallbackRegistry>) {
        let store = Arc::new(LocalFileStore::new(dir.path()).unwrap());
        let registry = Arc::new(CallbackRegistry::new());
        (FileServicer::new(store, registry.clone()), registry)
    }

    #[tokio::test]
    async fn test_read_returns_content_then_mtime() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("f"), b"data").unwrap();
        let (servicer, _) = servicer(&dir);

        let values = servicer.handle(&Request::read(1, "./f"), origin()).await.unwrap();
        assert_eq!(values[0], Value::Bytes(b"data".to_vec()));
        assert!(matches!(values[1], Value::Int64(m) if m > 0));
    }

    #[tokio::test]
    async fn test_error_mapping() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("f"), b"abc").unwrap();
        let (servicer, _) = servicer(&dir);

        let missing = servicer.handle(&Request::get_attr(1, "nope"), origin()).await;
        assert_eq!(missing.unwrap_err().status(), Status::NotFound);

        let past_end = servicer
            .handle(&Request::insert(2, "f", 10, b"x".to_vec()), origin())
            .await;
        assert_eq!(past_end.unwrap_err().status(), Status::BadRequest);

        let negative = servicer
            .handle(&Request::insert(3, "f", -1, b"x".to_vec()), origin())
            .await;
        assert_eq!(negative.unwrap_err().status(), Status::BadRequest);

        let push = servicer
            .handle(&Request::file_updated("f", 1, vec![]), origin())
            .await;
        assert_eq!(push.unwrap_err().status(), Status::BadRequest);
    }

    #[tokio::test]
    async fn test_register_validates_interval_and_path() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("f"), b"").unwrap();
        let (servicer, registry) = servicer(&dir);

        let zero = servicer.handle(&Request::register(1, "f", 0), origin()).await;
        assert_eq!(zero.unwrap_err().status(), Status::BadRequest);

        let missing = servicer.handle(&Request::register(2, "g", 5), origin()).await;
        assert_eq!(missing.unwrap_err().status(), Status::NotFound);

        servicer
            .handle(&Request::register(3, "/f", 5), origin())
            .await
            .unwrap();
        assert_eq!(registry.subscribers("f"), vec![origin()]);
    }

    #[tokio::test]
    async fn test_append_pushes_to_subscribers() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("f"), b"ab").unwrap();
        let store = Arc::new(LocalFileStore::new(dir.path()).unwrap());
        let registry = Arc::new(CallbackRegistry::new());
        let notifier = Arc::new(UdpTransport::bind("127.0.0.1:0").await.unwrap());
        let subscriber = UdpTransport::bind("127.0.0.1:0").await.unwrap();
        let subscriber_addr = subscriber.local_addr().unwrap();
        registry.register("f", subscriber_addr, Duration::from_secs(60));

        let servicer = FileServicer::new(store, registry).with_notifier(notifier);
        let values = servicer
            .handle(&Request::append(1, "f", b"c".to_vec()), origin())
            .await
            .unwrap();
        let mtime = values[0].as_i64().unwrap();

        let mut buf = vec![0u8; 512];
        let (len, _) = subscriber
            .recv_from(&mut buf, Some(Duration::from_secs(2)))
            .await
            .unwrap();
        let push = Request::decode(&buf[..len]).unwrap();
        assert_eq!(push.kind, OperationKind::FileUpdated);
        assert_eq!(push.path().unwrap(), "f");
        assert_eq!(push.mtime().unwrap(), mtime);
        assert_eq!(push.data().unwrap(), b"abc");
    }

    #[tokio::test]
    async fn test_list_dir_values_are_strings() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("d")).unwrap();
        std::fs::write(dir.path().join("f"), b"").unwrap();
        let (servicer, _) = servicer(&dir);

        let values = servicer.handle(&Request::list_dir(1, "/"), origin()).await.unwrap();
        assert_eq!(values, vec![Value::from("d/"), Value::from("f")]);
    }
}
