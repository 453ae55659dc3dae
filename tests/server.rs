//! End-to-end behaviour of a running server.

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use rstest::rstest;
use wirepool::{
    Error,
    client::Client,
    config::ServerConfig,
    context::{Context, ResultCode},
    router::{NoopRouter, RouteError},
    server::Server,
};
use wirepool_testing::{
    LoggerHandle,
    TestServer,
    corrupt_checksum,
    encode_context,
    encode_payload,
    logger,
    loopback_config,
    wait_until,
};

mod common;

use common::{Counting, ECHO_SERVICE, Echo, closed_by_server, recv_reply};

fn echo_server(config: ServerConfig) -> Server {
    Server::new(config)
        .register_router(ECHO_SERVICE, Echo)
        .expect("register echo")
}

#[tokio::test]
async fn coalesced_frames_are_answered_in_order() {
    let server = TestServer::start(echo_server(loopback_config())).await;
    let mut client = Client::connect(server.addr(), 4096).await.expect("connect");

    let mut bytes = encode_context(&Context::new(1, 1).with_data(b"hello".to_vec()));
    bytes.extend(encode_context(&Context::new(1, 1).with_data(b"world".to_vec())));
    client.send_raw(&bytes).await.expect("send coalesced");

    assert_eq!(recv_reply(&mut client).await.data, b"hello");
    assert_eq!(recv_reply(&mut client).await.data, b"world");
    server.shutdown().await;
}

#[tokio::test]
async fn fragmented_frame_is_reassembled() {
    let server = TestServer::start(echo_server(loopback_config())).await;
    let mut client = Client::connect(server.addr(), 4096).await.expect("connect");

    let bytes = encode_context(&Context::new(1, 1).with_data(b"split".to_vec()));
    let (head, tail) = bytes.split_at(5);
    client.send_raw(head).await.expect("send head");
    tokio::time::sleep(Duration::from_millis(20)).await;
    client.send_raw(tail).await.expect("send tail");

    assert_eq!(recv_reply(&mut client).await.data, b"split");
    server.shutdown().await;
}

#[tokio::test]
async fn replies_keep_per_connection_order() {
    let config = ServerConfig {
        worker_pool_size: 3,
        max_worker_task_len: 4,
        ..loopback_config()
    };
    let server = TestServer::start(echo_server(config)).await;

    let mut tasks = Vec::new();
    for _ in 0..4 {
        let addr = server.addr();
        tasks.push(tokio::spawn(async move {
            let mut client = Client::connect(addr, 4096).await.expect("connect");
            for seq in 0..50_u32 {
                client
                    .send(ECHO_SERVICE, 1, seq.to_le_bytes().to_vec())
                    .await
                    .expect("send");
            }
            for seq in 0..50_u32 {
                assert_eq!(recv_reply(&mut client).await.data, seq.to_le_bytes());
            }
        }));
    }
    for task in tasks {
        task.await.expect("client task");
    }
    server.shutdown().await;
}

#[rstest]
#[tokio::test]
async fn connections_over_limit_are_rejected(mut logger: LoggerHandle) {
    let config = ServerConfig {
        max_conn: 1,
        ..loopback_config()
    };
    let server = TestServer::start(echo_server(config)).await;

    let mut first = Client::connect(server.addr(), 4096).await.expect("first");
    first.send(ECHO_SERVICE, 1, b"in".to_vec()).await.expect("send");
    assert_eq!(recv_reply(&mut first).await.data, b"in");

    let mut second = Client::connect(server.addr(), 4096).await.expect("second");
    assert!(closed_by_server(&mut second).await);
    assert_eq!(server.registry().len(), 1);
    assert!(
        logger
            .messages()
            .iter()
            .any(|m| m.contains("connection rejected"))
    );

    first.send(ECHO_SERVICE, 1, b"still".to_vec()).await.expect("send");
    assert_eq!(recv_reply(&mut first).await.data, b"still");

    drop(first);
    wait_until(|| server.registry().is_empty()).await;
    let mut third = Client::connect(server.addr(), 4096).await.expect("third");
    third.send(ECHO_SERVICE, 1, b"later".to_vec()).await.expect("send");
    assert_eq!(recv_reply(&mut third).await.data, b"later");
    server.shutdown().await;
}

#[tokio::test]
async fn shutdown_stops_every_connection_once() {
    let stops = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&stops);
    let server = echo_server(loopback_config()).on_conn_stop(move |_conn| {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });
    let server = TestServer::start(server).await;
    let registry = Arc::clone(server.registry());

    let mut clients = Vec::new();
    for n in 0..3_u8 {
        let mut client = Client::connect(server.addr(), 4096).await.expect("connect");
        client.send(ECHO_SERVICE, 1, vec![n]).await.expect("send");
        assert_eq!(recv_reply(&mut client).await.data, [n]);
        clients.push(client);
    }
    assert_eq!(registry.len(), 3);

    server.shutdown().await;

    assert!(registry.is_empty());
    assert_eq!(stops.load(Ordering::SeqCst), 3);
    for client in &mut clients {
        assert!(closed_by_server(client).await);
    }
}

#[tokio::test]
async fn start_hook_sees_each_connection() {
    let started = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&started);
    let server = echo_server(loopback_config()).on_conn_start(move |conn| {
        let counter = Arc::clone(&counter);
        async move {
            conn.set_property("ordinal", counter.fetch_add(1, Ordering::SeqCst));
        }
    });
    let server = TestServer::start(server).await;

    for _ in 0..2 {
        let mut client = Client::connect(server.addr(), 4096).await.expect("connect");
        client.send(ECHO_SERVICE, 1, b"x".to_vec()).await.expect("send");
        recv_reply(&mut client).await;
    }
    assert_eq!(started.load(Ordering::SeqCst), 2);
    server.shutdown().await;
}

#[tokio::test]
async fn handler_chain_runs_pre_handle_and_post() {
    let router = Counting::default();
    let calls = Arc::clone(&router.calls);
    let server = Server::new(loopback_config())
        .register_router(7, router)
        .expect("register");
    let server = TestServer::start(server).await;
    let mut client = Client::connect(server.addr(), 4096).await.expect("connect");

    client.send(7, 1, Vec::new()).await.expect("send");
    assert_eq!(recv_reply(&mut client).await.data, b"counted");
    wait_until(|| calls.load(Ordering::SeqCst) == 3).await;
    server.shutdown().await;
}

#[rstest]
#[case::pooled(2)]
#[case::task_per_request(0)]
#[tokio::test]
async fn requests_are_served_for_pool_size(#[case] workers: usize) {
    let config = ServerConfig {
        worker_pool_size: workers,
        ..loopback_config()
    };
    let server = TestServer::start(echo_server(config)).await;
    let mut client = Client::connect(server.addr(), 4096).await.expect("connect");

    client.send(ECHO_SERVICE, 1, b"ping".to_vec()).await.expect("send");
    let reply = recv_reply(&mut client).await;
    assert_eq!(reply.result, ResultCode::Ok);
    assert_eq!(reply.service_id, ECHO_SERVICE);
    assert_eq!(reply.data, b"ping");
    server.shutdown().await;
}

#[rstest]
#[tokio::test]
async fn panicking_handler_leaves_connection_usable(mut logger: LoggerHandle) {
    let server = TestServer::start(echo_server(loopback_config())).await;
    let mut client = Client::connect(server.addr(), 4096).await.expect("connect");

    client.send(ECHO_SERVICE, 2, b"boom".to_vec()).await.expect("send");
    client.send(ECHO_SERVICE, 1, b"after".to_vec()).await.expect("send");
    assert_eq!(recv_reply(&mut client).await.data, b"after");
    assert!(
        logger
            .messages()
            .iter()
            .any(|m| m.contains("handler panicked") && m.contains("echo asked to panic"))
    );
    server.shutdown().await;
}

#[tokio::test]
async fn slow_handler_is_abandoned_after_timeout() {
    let config = ServerConfig {
        worker_pool_size: 1,
        handler_timeout_ms: Some(50),
        ..loopback_config()
    };
    let server = TestServer::start(echo_server(config)).await;
    let mut client = Client::connect(server.addr(), 4096).await.expect("connect");

    client.send(ECHO_SERVICE, 3, b"slow".to_vec()).await.expect("send");
    client.send(ECHO_SERVICE, 1, b"fast".to_vec()).await.expect("send");
    let reply = tokio::time::timeout(Duration::from_millis(500), client.recv_context())
        .await
        .expect("fast reply before slow handler would finish")
        .expect("valid reply")
        .expect("connection open");
    assert_eq!(reply.data, b"fast");
    server.shutdown().await;
}

#[tokio::test]
async fn unknown_service_is_dropped_silently() {
    let server = TestServer::start(echo_server(loopback_config())).await;
    let mut client = Client::connect(server.addr(), 4096).await.expect("connect");

    client.send(99, 1, b"nobody".to_vec()).await.expect("send");
    client.send(ECHO_SERVICE, 1, b"echo".to_vec()).await.expect("send");
    assert_eq!(recv_reply(&mut client).await.data, b"echo");
    server.shutdown().await;
}

#[tokio::test]
async fn corrupt_checksum_is_reported_to_the_client() {
    let server = TestServer::start(echo_server(loopback_config())).await;
    let mut client = Client::connect(server.addr(), 4096).await.expect("connect");

    let mut bytes = encode_context(&Context::new(1, 1).with_data(b"bad".to_vec()));
    corrupt_checksum(&mut bytes);
    client.send_raw(&bytes).await.expect("send corrupt");
    assert_eq!(recv_reply(&mut client).await.result, ResultCode::ErrChecksum);

    client.send(ECHO_SERVICE, 1, b"good".to_vec()).await.expect("send");
    assert_eq!(recv_reply(&mut client).await.data, b"good");
    server.shutdown().await;
}

#[tokio::test]
async fn huge_context_length_claim_leaves_worker_serving() {
    let config = ServerConfig {
        worker_pool_size: 1,
        ..loopback_config()
    };
    let server = TestServer::start(echo_server(config)).await;
    let mut sender = Client::connect(server.addr(), 4096).await.expect("connect sender");
    let mut neighbour = Client::connect(server.addr(), 4096).await.expect("connect neighbour");

    let mut payload = vec![1, 1, 0, 0, 253];
    payload.extend_from_slice(&u64::MAX.to_le_bytes());
    sender.send_raw(&encode_payload(&payload)).await.expect("send claim");
    assert_eq!(recv_reply(&mut sender).await.result, ResultCode::ErrUnpackContext);

    neighbour.send(ECHO_SERVICE, 1, b"served".to_vec()).await.expect("send");
    assert_eq!(recv_reply(&mut neighbour).await.data, b"served");
    sender.send(ECHO_SERVICE, 1, b"again".to_vec()).await.expect("send");
    assert_eq!(recv_reply(&mut sender).await.data, b"again");
    server.shutdown().await;
}

#[tokio::test]
async fn empty_frame_is_ignored() {
    let server = TestServer::start(echo_server(loopback_config())).await;
    let mut client = Client::connect(server.addr(), 4096).await.expect("connect");

    client.send_raw(&encode_payload(&[])).await.expect("send empty");
    client.send(ECHO_SERVICE, 1, b"next".to_vec()).await.expect("send");
    assert_eq!(recv_reply(&mut client).await.data, b"next");
    server.shutdown().await;
}

#[tokio::test]
async fn oversized_frame_closes_connection() {
    let config = ServerConfig {
        max_package_size: 64,
        ..loopback_config()
    };
    let server = TestServer::start(echo_server(config)).await;
    let mut client = Client::connect(server.addr(), 4096).await.expect("connect");

    client
        .send_raw(&encode_payload(&[0_u8; 65]))
        .await
        .expect("send oversized");
    assert!(closed_by_server(&mut client).await);
    wait_until(|| server.registry().is_empty()).await;
    server.shutdown().await;
}

#[test]
fn duplicate_service_binding_is_a_configuration_error() {
    let result = Server::new(ServerConfig::default())
        .register_router(5, NoopRouter)
        .and_then(|server| server.register_router(5, NoopRouter));
    assert!(matches!(result, Err(RouteError::DuplicateRoute(5))));

    let err: Error = Server::new(ServerConfig::default())
        .register_router(5, NoopRouter)
        .and_then(|server| server.register_router(5, NoopRouter))
        .expect_err("second binding fails")
        .into();
    assert!(matches!(err, Error::Route(RouteError::DuplicateRoute(5))));
}
