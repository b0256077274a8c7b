// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Integration tests for client cache coherence over loopback UDP
//!
//! A real file server runs against a temporary directory; the servicer is
//! wrapped so each test can count which operations actually reached it.

use std::fs::{File, FileTimes};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use parking_lot::Mutex;
use rfa_core::application::invocation::Invoker;
use rfa_core::application::registry::CallbackRegistry;
use rfa_core::application::servicer::{FileServicer, ServiceError, Servicer};
use rfa_core::application::ClientSession;
use rfa_core::domain::cache::ManualClock;
use rfa_core::domain::config::ClientConfig;
use rfa_core::domain::message::{OperationKind, Request};
use rfa_core::domain::semantics::InvocationSemantics;
use rfa_core::domain::value::Value;
use rfa_core::infrastructure::storage::LocalFileStore;
use rfa_core::infrastructure::transport::{DatagramTransport, LossSimulator, UdpTransport};
use rfa_core::infrastructure::FileServer;
use tempfile::TempDir;

/// Records the kind of every request that reaches the file servicer
struct RecordingServicer {
    inner: FileServicer,
    seen: Mutex<Vec<OperationKind>>,
}

impl RecordingServicer {
    fn count(&self, kind: OperationKind) -> usize {
        self.seen.lock().iter().filter(|k| **k == kind).count()
    }
}

#[async_trait]
impl Servicer for RecordingServicer {
    async fn handle(&self, request: &Request, origin: SocketAddr) -> Result<Vec<Value>, ServiceError> {
        self.seen.lock().push(request.kind);
        self.inner.handle(request, origin).await
    }
}

async fn start_server(root: &TempDir) -> (FileServer, Arc<RecordingServicer>) {
    let transport: Arc<dyn DatagramTransport> = Arc::new(UdpTransport::bind("127.0.0.1:0").await.unwrap());
    let store = Arc::new(LocalFileStore::new(root.path()).unwrap());
    let servicer = Arc::new(RecordingServicer {
        inner: FileServicer::new(store, Arc::new(CallbackRegistry::new())).with_notifier(transport.clone()),
        seen: Mutex::new(Vec::new()),
    });
    let invoker = Arc::new(Invoker::new(servicer.clone(), InvocationSemantics::AtMostOnce));
    let server = FileServer::new(transport, invoker, LossSimulator::disabled());
    server.start().await.unwrap();
    (server, servicer)
}

fn client_config(server: &FileServer) -> ClientConfig {
    ClientConfig {
        server_address: "127.0.0.1".to_string(),
        server_port: server.local_addr().unwrap().port(),
        freshness_interval: Duration::from_secs(10),
        request_timeout: Duration::from_millis(500),
        max_attempts: 3,
        request_loss_probability: 0.0,
    }
}

/// Rewrite `path` and stamp it with an mtime well after anything seen so far
fn rewrite_with_later_mtime(path: &std::path::Path, content: &[u8]) {
    std::fs::write(path, content).unwrap();
    let later = SystemTime::now() + Duration::from_secs(60);
    File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_times(FileTimes::new().set_modified(later))
        .unwrap();
}

#[tokio::test]
async fn test_read_fetches_once_then_serves_from_cache() {
    let root = TempDir::new().unwrap();
    std::fs::write(root.path().join("notes.txt"), b"hello world").unwrap();
    let (server, servicer) = start_server(&root).await;

    let clock = Arc::new(ManualClock::default());
    let session = ClientSession::connect_with_clock(&client_config(&server), clock.clone())
        .await
        .unwrap();
    let ops = session.operations();

    assert_eq!(ops.read("notes.txt", 0, 5).await.unwrap(), b"hello");
    assert_eq!(servicer.count(OperationKind::Read), 1);

    // Within the freshness interval nothing goes on the wire
    assert_eq!(ops.read("notes.txt", 6, 5).await.unwrap(), b"world");
    assert_eq!(servicer.count(OperationKind::Read), 1);
    assert_eq!(servicer.count(OperationKind::GetAttr), 0);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_stale_entry_revalidates_with_get_attr() {
    let root = TempDir::new().unwrap();
    let file = root.path().join("notes.txt");
    std::fs::write(&file, b"v1").unwrap();
    let (server, servicer) = start_server(&root).await;

    let clock = Arc::new(ManualClock::default());
    let session = ClientSession::connect_with_clock(&client_config(&server), clock.clone())
        .await
        .unwrap();
    let ops = session.operations();
    ops.read("notes.txt", 0, 2).await.unwrap();

    // Unchanged on the server: one GET_ATTR, no READ
    clock.advance(Duration::from_secs(11));
    assert_eq!(ops.read("notes.txt", 0, 2).await.unwrap(), b"v1");
    assert_eq!(servicer.count(OperationKind::GetAttr), 1);
    assert_eq!(servicer.count(OperationKind::Read), 1);

    // Revalidation restarted the interval
    assert_eq!(ops.read("notes.txt", 0, 2).await.unwrap(), b"v1");
    assert_eq!(servicer.count(OperationKind::GetAttr), 1);

    // Changed on the server: GET_ATTR then READ with the new bytes
    rewrite_with_later_mtime(&file, b"v2");
    clock.advance(Duration::from_secs(11));
    assert_eq!(ops.read("notes.txt", 0, 2).await.unwrap(), b"v2");
    assert_eq!(servicer.count(OperationKind::GetAttr), 2);
    assert_eq!(servicer.count(OperationKind::Read), 2);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_write_evicts_and_next_read_refetches() {
    let root = TempDir::new().unwrap();
    std::fs::write(root.path().join("log"), b"ab").unwrap();
    let (server, servicer) = start_server(&root).await;

    let session = ClientSession::connect(&client_config(&server)).await.unwrap();
    let ops = session.operations();

    ops.read("log", 0, 2).await.unwrap();
    ops.append("log", b"cd".to_vec()).await.unwrap();
    assert!(session.cache().lookup("log").is_none());

    ops.insert("log", 0, b"_".to_vec()).await.unwrap();
    assert_eq!(ops.read("log", 0, 10).await.unwrap(), b"_abcd");
    assert_eq!(servicer.count(OperationKind::Read), 2);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_missing_file_surfaces_not_found() {
    let root = TempDir::new().unwrap();
    let (server, _) = start_server(&root).await;
    let session = ClientSession::connect(&client_config(&server)).await.unwrap();

    let err = session.operations().read("absent", 0, 1).await.unwrap_err();
    assert!(matches!(
        err,
        rfa_core::application::FileOperationError::Coherence(ref e) if e.is_not_found()
    ));

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_registered_client_receives_pushed_update() {
    let root = TempDir::new().unwrap();
    std::fs::write(root.path().join("shared"), b"one").unwrap();
    let (server, _) = start_server(&root).await;
    let config = client_config(&server);

    let watcher = ClientSession::connect(&config).await.unwrap();
    watcher
        .operations()
        .register("shared", Duration::from_secs(30))
        .await
        .unwrap();

    let writer = ClientSession::connect(&config).await.unwrap();
    writer.operations().append("shared", b" two".to_vec()).await.unwrap();

    let mut pushed = None;
    for _ in 0..100 {
        if let Some(entry) = watcher.cache().lookup("shared") {
            pushed = Some(entry.content);
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(pushed.as_deref(), Some(&b"one two"[..]));

    // The writer is not registered and keeps no entry
    assert!(writer.cache().lookup("shared").is_none());

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_list_dir_and_touch() {
    let root = TempDir::new().unwrap();
    std::fs::create_dir(root.path().join("sub")).unwrap();
    let (server, _) = start_server(&root).await;
    let session = ClientSession::connect(&client_config(&server)).await.unwrap();
    let ops = session.operations();

    let atime = ops.touch("created").await.unwrap();
    assert!(atime > 0);
    assert!(root.path().join("created").exists());

    let entries = ops.list_dir("/").await.unwrap();
    assert_eq!(entries, vec!["created".to_string(), "sub/".to_string()]);

    server.stop().await.unwrap();
}
