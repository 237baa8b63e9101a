use std::{
    net::SocketAddr,
    time::{Duration, Instant},
};

use jdwgate_server::{
    jdwp::constants::{CMDSET_VIRTUAL_MACHINE, VM_ALL_THREADS, VM_DISPOSE, VM_RESUME, VM_VERSION},
    GatewayError,
};

use crate::harness::{
    demo_device, spawn_gateway, spawn_gateway_with, test_config, wait_until, TestClient,
};

#[tokio::test]
async fn dispose_replies_then_closes_and_detaches() {
    let gw = spawn_gateway();
    let mut client = TestClient::attach(gw.addr).await;

    let reply = client.ok(CMDSET_VIRTUAL_MACHINE, VM_DISPOSE, Vec::new()).await;
    assert!(reply.is_empty());
    client.expect_closed().await;

    let device = gw.device.clone();
    wait_until(move || device.calls().detach == 1).await;
    gw.wait_for_status("debugger disposed the session").await;
    assert!(gw.server.is_running());

    let mut next = TestClient::attach(gw.addr).await;
    next.ok(CMDSET_VIRTUAL_MACHINE, VM_VERSION, Vec::new()).await;
}

#[tokio::test]
async fn malformed_packet_closes_the_connection() {
    let gw = spawn_gateway();
    let mut client = TestClient::attach(gw.addr).await;

    // length field of 5 is shorter than the header
    client
        .send_raw(&[0, 0, 0, 5, 0, 0, 0, 1, 0, 1, 1])
        .await;
    client.expect_closed().await;
    gw.wait_for_status("malformed JDWP packet").await;

    let mut next = TestClient::attach(gw.addr).await;
    next.ok(CMDSET_VIRTUAL_MACHINE, VM_VERSION, Vec::new()).await;
}

#[tokio::test]
async fn client_disconnect_ends_session_and_detaches() {
    let gw = spawn_gateway();
    let client = TestClient::attach(gw.addr).await;
    drop(client);

    let device = gw.device.clone();
    wait_until(move || device.calls().detach == 1).await;
    gw.wait_for_status("debugger closed the connection").await;
}

#[tokio::test]
async fn stop_from_another_thread_unblocks_a_waiting_session() {
    let gw = spawn_gateway();
    let mut client = TestClient::attach(gw.addr).await;
    client.ok(CMDSET_VIRTUAL_MACHINE, VM_VERSION, Vec::new()).await;

    // The session is now parked waiting for the next packet.
    let mut server = gw.server;
    let started = Instant::now();
    let (server, running) = tokio::task::spawn_blocking(move || {
        server.stop();
        let running = server.is_running();
        (server, running)
    })
    .await
    .unwrap();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(!running);
    assert!(server.local_addr().is_none());
    client.expect_closed().await;
    assert_eq!(gw.device.calls().detach, 1);
    assert!(!gw.device.is_attached());
    assert!(gw
        .status
        .lock()
        .unwrap()
        .iter()
        .any(|line| line == "server stopped"));
}

#[tokio::test]
async fn dropping_the_server_joins_the_session_thread() {
    let gw = spawn_gateway();
    let mut client = TestClient::attach(gw.addr).await;
    client.ok(CMDSET_VIRTUAL_MACHINE, VM_VERSION, Vec::new()).await;

    let server = gw.server;
    tokio::task::spawn_blocking(move || drop(server))
        .await
        .unwrap();

    // Drop returned, so the session thread has already released the device.
    assert_eq!(gw.device.calls().detach, 1);
    client.expect_closed().await;
    assert!(connection_refused(gw.addr).await);
}

#[tokio::test]
async fn stop_without_a_client_and_restart() {
    let mut gw = spawn_gateway();
    gw.server.stop();
    assert!(!gw.server.is_running());
    gw.server.stop();

    let addr = gw.server.start().unwrap();
    let mut client = TestClient::attach(addr).await;
    client.ok(CMDSET_VIRTUAL_MACHINE, VM_VERSION, Vec::new()).await;
}

#[tokio::test]
async fn second_start_is_rejected() {
    let mut gw = spawn_gateway();
    assert!(matches!(
        gw.server.start(),
        Err(GatewayError::AlreadyStarted)
    ));
    assert!(gw.server.is_running());
}

#[tokio::test]
async fn device_failure_stops_the_server() {
    let gw = spawn_gateway();
    let mut client = TestClient::attach(gw.addr).await;
    gw.device.fail_list_threads();

    client
        .send_command(1, CMDSET_VIRTUAL_MACHINE, VM_ALL_THREADS, Vec::new())
        .await;
    client.expect_closed().await;

    let device = gw.device.clone();
    wait_until(move || device.calls().detach == 1).await;
    let server = &gw.server;
    wait_until(|| !server.is_running()).await;
    gw.wait_for_status("stopping server").await;
}

#[tokio::test]
async fn console_output_is_forwarded_while_running() {
    let gw = spawn_gateway();
    gw.device.push_console("VM started");
    let mut client = TestClient::attach(gw.addr).await;

    // Console is only drained once the debugger lets the VM run.
    client.ok(CMDSET_VIRTUAL_MACHINE, VM_VERSION, Vec::new()).await;
    assert!(!gw.status_lines().iter().any(|line| line == "VM started"));

    client.ok(CMDSET_VIRTUAL_MACHINE, VM_RESUME, Vec::new()).await;
    gw.wait_for_status("VM started").await;

    gw.device.push_console("tick");
    gw.wait_for_status("tick").await;
}

#[tokio::test]
async fn configured_password_is_forwarded_to_attach() {
    let mut config = test_config();
    config.device.password = Some("hunter2".to_string());
    let gw = spawn_gateway_with(demo_device().with_password("hunter2"), config);

    let mut client = TestClient::attach(gw.addr).await;
    client.ok(CMDSET_VIRTUAL_MACHINE, VM_VERSION, Vec::new()).await;
    assert_eq!(gw.device.last_password().as_deref(), Some("hunter2"));
}

/// Whether nothing accepts connections on `addr` any more.
async fn connection_refused(addr: SocketAddr) -> bool {
    tokio::net::TcpStream::connect(addr).await.is_err()
}
