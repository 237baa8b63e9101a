use std::{
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};

use jdwgate_server::{
    config::init_tracing,
    jdwp::{decode, encode, length_prefix, Packet, PacketBody, HANDSHAKE},
    mock::MockDevice,
    ClassEntry, DebugSymbols, GatewayConfig, ModuleDebugInfo, ModuleEntry, Server, StaticDebugSymbols,
    StatusReporter, HIDDEN_CLASS_ID,
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};

pub const TIMEOUT: Duration = Duration::from_secs(5);

pub const DEMO_UNIQUE_ID: u32 = 0x0100;

/// A running server plus handles to everything it reports into.
pub struct Gateway {
    pub server: Server,
    pub device: MockDevice,
    pub addr: SocketAddr,
    pub status: Arc<Mutex<Vec<String>>>,
}

impl Gateway {
    pub fn status_lines(&self) -> Vec<String> {
        self.status.lock().unwrap().clone()
    }

    pub async fn wait_for_status(&self, needle: &str) {
        let status = self.status.clone();
        wait_until(move || status.lock().unwrap().iter().any(|line| line.contains(needle))).await;
    }
}

pub fn test_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.server.address = "127.0.0.1".to_string();
    config.server.port = 0;
    config.server.handshake_timeout_ms = 2_000;
    config.server.console_poll_interval_ms = 10;
    config.vm.include_builtin_classes = false;
    config.logging.level = "jdwgate=debug".to_string();
    config
}

/// Device with one installed application (`demo`) and three threads.
pub fn demo_device() -> MockDevice {
    MockDevice::new()
        .with_modules(vec![ModuleEntry {
            id: 1,
            unique_id: DEMO_UNIQUE_ID,
            name: "demo".to_string(),
        }])
        .with_threads(&[0x11, 0x12, 0x13])
}

pub fn demo_symbols() -> StaticDebugSymbols {
    StaticDebugSymbols::new().with_module(
        "demo",
        ModuleDebugInfo {
            unique_id: DEMO_UNIQUE_ID,
            app_name: "Demo".to_string(),
            classes: vec![
                ClassEntry::new("com.example", "Main", 1),
                ClassEntry::new("com.example", "Internal", HIDDEN_CLASS_ID),
                ClassEntry::new("com.example.util", "Helper", 2),
            ],
        },
    )
}

pub fn spawn_gateway() -> Gateway {
    spawn_gateway_with(demo_device(), test_config())
}

pub fn spawn_gateway_with(device: MockDevice, config: GatewayConfig) -> Gateway {
    spawn_gateway_with_symbols(device, config, Arc::new(demo_symbols()))
}

pub fn spawn_gateway_with_symbols(
    device: MockDevice,
    config: GatewayConfig,
    symbols: Arc<dyn DebugSymbols>,
) -> Gateway {
    init_tracing(&config.logging);

    let status = Arc::new(Mutex::new(Vec::new()));
    let sink = status.clone();
    let mut server = Server::new(
        Box::new(device.clone()),
        symbols,
        config,
        StatusReporter::from_fn(move |line| sink.lock().unwrap().push(line.to_string())),
    );
    let addr = server.start().expect("server starts");
    Gateway {
        server,
        device,
        addr,
        status,
    }
}

/// Polls `cond` until it holds; panics after [`TIMEOUT`].
pub async fn wait_until(cond: impl Fn() -> bool) {
    tokio::time::timeout(TIMEOUT, async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Minimal JDWP debugger side.
pub struct TestClient {
    stream: TcpStream,
    next_id: u32,
}

impl TestClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = tokio::time::timeout(TIMEOUT, TcpStream::connect(addr))
            .await
            .expect("connect timed out")
            .expect("connect");
        Self { stream, next_id: 1 }
    }

    /// Connects and completes the handshake.
    pub async fn attach(addr: SocketAddr) -> Self {
        let mut client = Self::connect(addr).await;
        client.handshake().await;
        client
    }

    pub async fn handshake(&mut self) {
        self.send_raw(HANDSHAKE).await;
        let mut echo = [0u8; HANDSHAKE.len()];
        tokio::time::timeout(TIMEOUT, self.stream.read_exact(&mut echo))
            .await
            .expect("handshake echo timed out")
            .expect("handshake echo");
        assert_eq!(&echo, HANDSHAKE);
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.expect("write");
    }

    pub async fn send_command(&mut self, id: u32, command_set: u8, command: u8, payload: Vec<u8>) {
        let bytes = encode(&Packet::command(id, command_set, command, payload)).unwrap();
        self.send_raw(&bytes).await;
    }

    /// Sends a command with a fresh id and returns the matching reply.
    pub async fn command(&mut self, command_set: u8, command: u8, payload: Vec<u8>) -> Packet {
        let id = self.next_id;
        self.next_id += 1;
        self.send_command(id, command_set, command, payload).await;
        let reply = self.read_packet().await;
        assert_eq!(reply.id, id, "reply id does not echo command id");
        assert!(reply.is_reply(), "expected a reply, got {reply:?}");
        reply
    }

    /// Like [`TestClient::command`] but asserts `errorCode == 0` and returns
    /// the payload.
    pub async fn ok(&mut self, command_set: u8, command: u8, payload: Vec<u8>) -> Vec<u8> {
        let reply = self.command(command_set, command, payload).await;
        assert_eq!(error_code(&reply), 0, "command failed: {reply:?}");
        reply.payload().to_vec()
    }

    pub async fn read_packet(&mut self) -> Packet {
        tokio::time::timeout(TIMEOUT, async {
            let mut prefix = [0u8; 4];
            self.stream.read_exact(&mut prefix).await.expect("read length");
            let mut bytes = prefix.to_vec();
            bytes.resize(length_prefix(prefix), 0);
            self.stream
                .read_exact(&mut bytes[4..])
                .await
                .expect("read packet body");
            decode(&bytes).expect("server sent a malformed packet")
        })
        .await
        .expect("no packet from server")
    }

    /// Asserts the server closes the connection without sending anything.
    pub async fn expect_closed(&mut self) {
        let mut buf = [0u8; 64];
        let read = tokio::time::timeout(TIMEOUT, self.stream.read(&mut buf))
            .await
            .expect("connection was not closed");
        match read {
            Ok(0) | Err(_) => {}
            Ok(n) => panic!("expected EOF, got {n} bytes: {:?}", &buf[..n]),
        }
    }
}

pub fn error_code(packet: &Packet) -> u16 {
    match packet.body {
        PacketBody::Reply { error_code, .. } => error_code,
        PacketBody::Command { .. } => panic!("not a reply: {packet:?}"),
    }
}
