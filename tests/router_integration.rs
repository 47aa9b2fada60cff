//! End-to-end tests: dispatcher → router → channel listener → tonic.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::routing::get;
use http_body_util::BodyExt;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tonic_health::pb::health_check_response::ServingStatus;
use tower::ServiceExt;

use grpc_mux::config::MuxConfig;
use grpc_mux::lifecycle::Service;

mod common;

fn health_check_request() -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/grpc.health.v1.Health/Check")
        .header("content-type", "application/grpc")
        .header("te", "trailers")
        .body(Body::from(common::EMPTY_HEALTH_REQUEST.to_vec()))
        .unwrap()
}

#[tokio::test]
async fn test_rpc_over_handed_off_connection() {
    let (router, server) = common::start_health_router();
    let addr = common::start_dispatcher(Arc::clone(&router)).await;

    let mut client = common::health_client(addr).await;
    assert_eq!(common::check(&mut client).await, ServingStatus::Serving as i32);
    drop(client);

    router.shutdown();
    let result = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("run did not return after shutdown")
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_shutdown_with_open_connections() {
    let router = Arc::new(common::health_router().with_drain_timeout(Duration::from_millis(200)));
    let server = {
        let router = Arc::clone(&router);
        tokio::spawn(async move { router.run().await })
    };
    let addr = common::start_dispatcher(Arc::clone(&router)).await;

    // One client finishes an RPC and stays connected, the other never speaks.
    let mut client = common::health_client(addr).await;
    assert_eq!(common::check(&mut client).await, ServingStatus::Serving as i32);
    let mut silent = TcpStream::connect(addr).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    router.shutdown();
    let result = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("run blocked on an open connection")
        .unwrap();
    assert!(result.is_ok());

    // EOF or a reset both mean the server let go of the socket.
    let mut rest = Vec::new();
    let _closed = tokio::time::timeout(Duration::from_secs(1), silent.read_to_end(&mut rest))
        .await
        .expect("silent connection was left open");
    drop(client);
}

#[tokio::test]
async fn test_concurrent_handoffs() {
    let (router, server) = common::start_health_router();
    let addr = common::start_dispatcher(Arc::clone(&router)).await;

    let mut clients = Vec::new();
    for _ in 0..8 {
        clients.push(tokio::spawn(async move {
            let mut client = common::health_client(addr).await;
            common::check(&mut client).await
        }));
    }
    for client in clients {
        assert_eq!(client.await.unwrap(), ServingStatus::Serving as i32);
    }

    router.shutdown();
    let result = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("run did not return after shutdown")
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_connection_after_shutdown_is_closed() {
    let (router, server) = common::start_health_router();
    let addr = common::start_dispatcher(Arc::clone(&router)).await;

    router.shutdown();
    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("run did not return after shutdown")
        .unwrap()
        .unwrap();

    let mut socket = TcpStream::connect(addr).await.unwrap();
    let mut buf = [0u8; 16];
    let read = tokio::time::timeout(Duration::from_secs(1), socket.read(&mut buf))
        .await
        .expect("connection was left open");
    assert!(matches!(read, Ok(0) | Err(_)));
}

#[tokio::test]
async fn test_serve_http_forwards_to_grpc_routes() {
    let router = common::health_router();

    let response = router.serve_http(health_check_request()).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], &common::SERVING_RESPONSE[..]);
}

#[tokio::test]
async fn test_axum_router_mounts_behind_http_mux() {
    let router = common::health_router();
    let app = axum::Router::new()
        .route("/status", get(|| async { "ok" }))
        .merge(router.axum_router());

    let status = app
        .clone()
        .oneshot(Request::get("/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = status.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"ok");

    let grpc = app.oneshot(health_check_request()).await.unwrap();
    assert_eq!(grpc.status(), StatusCode::OK);
    let body = grpc.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], &common::SERVING_RESPONSE[..]);
}

#[tokio::test]
async fn test_service_serves_health_until_signal() {
    let mut config = MuxConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();

    let service = Service::bind(config).await.unwrap();
    let addr = service.local_addr();
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let running = tokio::spawn(service.run_until(async move {
        let _ = stop_rx.await;
    }));

    let mut client = common::health_client(addr).await;
    assert_eq!(common::check(&mut client).await, ServingStatus::Serving as i32);
    drop(client);

    stop_tx.send(()).unwrap();
    let result = tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .expect("service did not stop")
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_disabled_service_closes_connections() {
    let mut config = MuxConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.grpc.enabled = false;

    let service = Service::bind(config).await.unwrap();
    let addr = service.local_addr();
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let running = tokio::spawn(service.run_until(async move {
        let _ = stop_rx.await;
    }));

    let mut socket = TcpStream::connect(addr).await.unwrap();
    let mut buf = [0u8; 16];
    let read = tokio::time::timeout(Duration::from_secs(1), socket.read(&mut buf))
        .await
        .expect("disabled router left the connection open");
    assert!(matches!(read, Ok(0) | Err(_)));

    stop_tx.send(()).unwrap();
    let result = tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .expect("service did not stop")
        .unwrap();
    assert!(result.is_ok());
}
