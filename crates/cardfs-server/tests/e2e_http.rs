//! End-to-end tests over a real socket.
//!
//! Each test binds the router to an ephemeral port and talks to it with
//! reqwest, so streaming bodies go through hyper both ways.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use cardfs_kernel::{Card, MemoryBackend, MemorySlot, VolumeOps};
use cardfs_server::{Dispatcher, ServerConfig};
use reqwest::{Client, Method, StatusCode};

// ============================================================================
// Server harness
// ============================================================================

async fn serve(config: ServerConfig, backend: MemoryBackend) -> SocketAddr {
    let card = Arc::new(Card::new("/sdcard"));
    card.mount(&MemorySlot::from_backend(backend)).await.unwrap();
    let dispatcher = Arc::new(Dispatcher::new(card, config).unwrap());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, cardfs_server::http::router(dispatcher))
            .await
            .unwrap();
    });
    addr
}

async fn setup() -> (SocketAddr, MemoryBackend) {
    let backend = MemoryBackend::with_capacity(4 * 1024 * 1024);
    backend.write_all(Path::new("a.txt"), b"hello world!").await.unwrap();
    backend.mkdir(Path::new("sub")).await.unwrap();
    backend.write_all(Path::new("sub/b.txt"), b"abcd").await.unwrap();
    let addr = serve(ServerConfig::default(), backend.clone()).await;
    (addr, backend)
}

fn url(addr: SocketAddr, path: &str) -> String {
    format!("http://{}{}", addr, path)
}

fn propfind() -> Method {
    Method::from_bytes(b"PROPFIND").unwrap()
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_propfind_over_http() {
    let (addr, _) = setup().await;
    let resp = Client::new()
        .request(propfind(), url(addr, "/"))
        .header("Depth", "2")
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::MULTI_STATUS);
    let xml = resp.text().await.unwrap();
    assert_eq!(xml.matches("<D:response>").count(), 3);
    assert!(xml.contains("<D:href>/sub/b.txt</D:href>"));
}

#[tokio::test]
async fn test_large_file_roundtrip() {
    let (addr, backend) = setup().await;
    let client = Client::new();
    let data: Vec<u8> = (0..300_000u32).map(|i| (i * 7 % 251) as u8).collect();

    let resp = client
        .put(url(addr, "/sub/big.bin"))
        .body(data.clone())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    assert_eq!(backend.read_all(Path::new("sub/big.bin")).await.unwrap(), data);

    let resp = client.get(url(addr, "/sub/big.bin")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["content-length"], "300000");
    assert_eq!(resp.bytes().await.unwrap().as_ref(), data.as_slice());
    assert_eq!(backend.open_handles(), 0);
}

#[tokio::test]
async fn test_upload_too_large_for_card() {
    let backend = MemoryBackend::with_capacity(64 * 1024);
    let addr = serve(ServerConfig::default(), backend.clone()).await;
    let resp = Client::new()
        .put(url(addr, "/huge.bin"))
        .body(vec![0u8; 128 * 1024])
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::INSUFFICIENT_STORAGE);
    assert!(!backend.exists(Path::new("huge.bin")).await);
}

#[tokio::test]
async fn test_delete_and_mkcol_over_http() {
    let (addr, _) = setup().await;
    let client = Client::new();

    let resp = client.delete(url(addr, "/a.txt")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    let resp = client.get(url(addr, "/a.txt")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let mkcol = Method::from_bytes(b"MKCOL").unwrap();
    let resp = client.request(mkcol.clone(), url(addr, "/sub")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    let resp = client.request(mkcol, url(addr, "/photos")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn test_basic_auth_over_http() {
    let backend = MemoryBackend::new();
    backend.write_all(Path::new("a.txt"), b"secret").await.unwrap();
    let config = ServerConfig::default().with_credentials("admin", "hunter2");
    let addr = serve(config, backend).await;
    let client = Client::new();

    let resp = client.get(url(addr, "/a.txt")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert!(resp.headers().contains_key("www-authenticate"));

    let resp = client
        .get(url(addr, "/a.txt"))
        .basic_auth("admin", Some("hunter2"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.text().await.unwrap(), "secret");
}

#[tokio::test]
async fn test_encoded_paths_over_http() {
    let backend = MemoryBackend::new();
    backend.write_all(Path::new("my notes.txt"), b"notes").await.unwrap();
    let addr = serve(ServerConfig::default(), backend).await;
    let client = Client::new();

    let resp = client.get(url(addr, "/my%20notes.txt")).send().await.unwrap();
    assert_eq!(resp.text().await.unwrap(), "notes");

    let resp = client.request(propfind(), url(addr, "/")).send().await.unwrap();
    let xml = resp.text().await.unwrap();
    assert!(xml.contains("<D:href>/my%20notes.txt</D:href>"));
}
