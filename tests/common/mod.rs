//! Shared utilities for integration testing.

use std::net::SocketAddr;
use std::sync::Arc;

use grpc_mux::grpc::{GrpcRouter, RouterError};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tonic::transport::{Channel, Endpoint};
use tonic_health::pb::health_client::HealthClient;
use tonic_health::pb::HealthCheckRequest;

/// gRPC frame carrying an empty `HealthCheckRequest`.
pub const EMPTY_HEALTH_REQUEST: [u8; 5] = [0, 0, 0, 0, 0];

/// gRPC frame carrying `HealthCheckResponse { status: SERVING }`.
pub const SERVING_RESPONSE: [u8; 7] = [0, 0, 0, 0, 2, 0x08, 0x01];

/// A router with the standard health service registered, already running.
pub fn start_health_router() -> (Arc<GrpcRouter<TcpStream>>, JoinHandle<Result<(), RouterError>>) {
    let router = Arc::new(health_router());
    let task = {
        let router = Arc::clone(&router);
        tokio::spawn(async move { router.run().await })
    };
    (router, task)
}

pub fn health_router() -> GrpcRouter<TcpStream> {
    let (_reporter, health) = tonic_health::server::health_reporter();
    GrpcRouter::new("127.0.0.1:0".parse().unwrap(), |routes| {
        routes.add_service(health);
    })
}

/// Stand-in dispatcher: accepts TCP connections and hands every one to `router`.
pub async fn start_dispatcher(router: Arc<GrpcRouter<TcpStream>>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            router.handle(socket);
        }
    });

    addr
}

pub async fn health_client(addr: SocketAddr) -> HealthClient<Channel> {
    let channel = Endpoint::from_shared(format!("http://{}", addr))
        .unwrap()
        .connect()
        .await
        .expect("failed to connect through the dispatcher");
    HealthClient::new(channel)
}

/// Run one health check and return the raw serving status.
pub async fn check(client: &mut HealthClient<Channel>) -> i32 {
    client
        .check(HealthCheckRequest {
            service: String::new(),
        })
        .await
        .expect("health check failed")
        .into_inner()
        .status
}
