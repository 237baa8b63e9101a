use jdwgate_server::jdwp::{constants::*, FieldBuffer, FieldReader};

use crate::harness::{error_code, spawn_gateway, spawn_gateway_with, test_config, TestClient};

#[tokio::test]
async fn version_echoes_command_id() {
    let gw = spawn_gateway();
    let mut client = TestClient::attach(gw.addr).await;

    client
        .send_command(7, CMDSET_VIRTUAL_MACHINE, VM_VERSION, Vec::new())
        .await;
    let reply = client.read_packet().await;
    assert_eq!(reply.id, 7);
    assert_eq!(error_code(&reply), 0);

    let mut r = FieldReader::new(reply.payload());
    let description = r.read_string().unwrap();
    assert!(!description.is_empty());
    assert_eq!(r.read_i32().unwrap(), 1);
    assert_eq!(r.read_i32().unwrap(), 4);
    assert_eq!(r.read_string().unwrap(), "1.4");
    assert_eq!(r.read_string().unwrap(), "RIM JVM");
    r.finish().unwrap();
}

#[tokio::test]
async fn id_sizes_reports_five_four_byte_fields() {
    let gw = spawn_gateway();
    let mut client = TestClient::attach(gw.addr).await;

    let payload = client.ok(CMDSET_VIRTUAL_MACHINE, VM_ID_SIZES, Vec::new()).await;
    assert_eq!(payload.len(), 5 * 4);
    let mut r = FieldReader::new(&payload);
    for _ in 0..5 {
        assert_eq!(r.read_i32().unwrap(), 4);
    }
}

#[tokio::test]
async fn all_classes_lists_visible_classes_from_debug_info() {
    let gw = spawn_gateway();
    let mut client = TestClient::attach(gw.addr).await;

    let payload = client.ok(CMDSET_VIRTUAL_MACHINE, VM_ALL_CLASSES, Vec::new()).await;
    let mut r = FieldReader::new(&payload);
    assert_eq!(r.read_i32().unwrap(), 2);

    let mut classes = Vec::new();
    for _ in 0..2 {
        assert_eq!(r.read_u8().unwrap(), TYPE_TAG_CLASS);
        let type_id = r.read_u32().unwrap();
        let signature = r.read_string().unwrap();
        assert_eq!(r.read_i32().unwrap(), CLASS_STATUS_INITIALIZED);
        classes.push((type_id, signature));
    }
    r.finish().unwrap();

    assert_eq!(
        classes,
        [
            (1, "Lcom/example/Main;".to_string()),
            (2, "Lcom/example/util/Helper;".to_string()),
        ]
    );
}

#[tokio::test]
async fn all_classes_appends_builtin_runtime_classes() {
    let mut config = test_config();
    config.vm.include_builtin_classes = true;
    let gw = spawn_gateway_with(crate::harness::demo_device(), config);
    let mut client = TestClient::attach(gw.addr).await;

    let payload = client.ok(CMDSET_VIRTUAL_MACHINE, VM_ALL_CLASSES, Vec::new()).await;
    let count = FieldReader::new(&payload).read_i32().unwrap();
    assert_eq!(count as usize, 2 + jdwgate_server::BUILTIN_CLASSES.len());
}

#[tokio::test]
async fn all_threads_lists_device_threads() {
    let gw = spawn_gateway();
    let mut client = TestClient::attach(gw.addr).await;

    let payload = client.ok(CMDSET_VIRTUAL_MACHINE, VM_ALL_THREADS, Vec::new()).await;
    let mut r = FieldReader::new(&payload);
    assert_eq!(r.read_i32().unwrap(), 3);
    let ids: Vec<u32> = (0..3).map(|_| r.read_u32().unwrap()).collect();
    assert_eq!(ids, [0x11, 0x12, 0x13]);
    r.finish().unwrap();
}

#[tokio::test]
async fn suspend_and_resume_reach_the_device() {
    let gw = spawn_gateway();
    let mut client = TestClient::attach(gw.addr).await;

    assert!(client.ok(CMDSET_VIRTUAL_MACHINE, VM_RESUME, Vec::new()).await.is_empty());
    assert!(client.ok(CMDSET_VIRTUAL_MACHINE, VM_SUSPEND, Vec::new()).await.is_empty());

    let calls = gw.device.calls();
    assert_eq!(calls.resume, 1);
    assert_eq!(calls.suspend, 1);
}

#[tokio::test]
async fn class_paths_report_configured_roots() {
    let mut config = test_config();
    config.vm.base_dir = "/projects/demo".to_string();
    config.vm.class_paths = vec!["/projects/demo/bin".to_string()];
    let gw = spawn_gateway_with(crate::harness::demo_device(), config);
    let mut client = TestClient::attach(gw.addr).await;

    let payload = client.ok(CMDSET_VIRTUAL_MACHINE, VM_CLASS_PATHS, Vec::new()).await;
    let mut r = FieldReader::new(&payload);
    assert_eq!(r.read_string().unwrap(), "/projects/demo");
    assert_eq!(r.read_i32().unwrap(), 1);
    assert_eq!(r.read_string().unwrap(), "/projects/demo/bin");
    assert_eq!(r.read_i32().unwrap(), 0);
    r.finish().unwrap();
}

#[tokio::test]
async fn unsupported_command_is_not_implemented_and_session_continues() {
    let gw = spawn_gateway();
    let mut client = TestClient::attach(gw.addr).await;

    // ReferenceType.Signature
    let reply = client.command(2, 1, vec![0, 0, 0, 1]).await;
    assert_eq!(error_code(&reply), ERROR_NOT_IMPLEMENTED);
    assert!(reply.payload().is_empty());

    let version = client.ok(CMDSET_VIRTUAL_MACHINE, VM_VERSION, Vec::new()).await;
    assert!(!version.is_empty());
}

#[tokio::test]
async fn malformed_payload_is_illegal_argument_and_session_continues() {
    let gw = spawn_gateway();
    let mut client = TestClient::attach(gw.addr).await;

    let reply = client
        .command(CMDSET_VIRTUAL_MACHINE, VM_ID_SIZES, vec![1, 2, 3])
        .await;
    assert_eq!(error_code(&reply), ERROR_ILLEGAL_ARGUMENT);

    let mut w = FieldBuffer::new();
    w.append_byte(EVENT_KIND_BREAKPOINT);
    w.append_byte(0);
    w.append_int32(2);
    w.append_byte(MODIFIER_COUNT);
    w.append_int32(1);
    let reply = client
        .command(CMDSET_EVENT_REQUEST, EVENT_REQUEST_SET, w.into_vec())
        .await;
    assert_eq!(error_code(&reply), ERROR_ILLEGAL_ARGUMENT);

    client.ok(CMDSET_VIRTUAL_MACHINE, VM_ID_SIZES, Vec::new()).await;
}
