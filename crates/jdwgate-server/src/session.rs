//! One debugger session: attach, handshake, receive/dispatch/reply, detach.

use std::{fmt, io, mem, net::SocketAddr, sync::Arc};

use jdwgate_config::GatewayConfig;
use jdwgate_jdwp::{
    decode, encode, length_prefix, JdwpError, Packet, PacketBody, HANDSHAKE, HEADER_LEN,
};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWriteExt},
    net::{tcp::OwnedReadHalf, TcpListener, TcpStream},
    sync::mpsc,
    time::MissedTickBehavior,
};
use tokio_util::sync::CancellationToken;

use crate::{
    class_list::VisibleClassList,
    device::{DebugSymbols, Device, DeviceError},
    dispatch::Dispatcher,
    error::{GatewayError, GatewayResult},
    registry::ApplicationRegistry,
    state::SessionState,
    status::StatusReporter,
};

/// Everything a session borrows from the server.
pub(crate) struct SessionContext {
    pub(crate) config: Arc<GatewayConfig>,
    pub(crate) symbols: Arc<dyn DebugSymbols>,
    pub(crate) status: StatusReporter,
    /// Cancelled by `Server::stop` or by a fatal device error.
    pub(crate) cancel: CancellationToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    ClientClosed,
    Disposed,
    Cancelled,
}

impl fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionEnd::ClientClosed => "debugger closed the connection",
            SessionEnd::Disposed => "debugger disposed the session",
            SessionEnd::Cancelled => "session cancelled",
        })
    }
}

/// Waits for the next debugger connection. Returns `None` once cancelled.
pub(crate) async fn accept_connection(
    listener: &TcpListener,
    cancel: &CancellationToken,
) -> io::Result<Option<(TcpStream, SocketAddr)>> {
    tokio::select! {
        _ = cancel.cancelled() => Ok(None),
        accepted = listener.accept() => accepted.map(Some),
    }
}

/// Runs one session on an accepted connection.
///
/// The device is detached before this returns, whatever the outcome.
pub(crate) async fn run_session(
    ctx: &SessionContext,
    device: &mut dyn Device,
    stream: TcpStream,
    peer: SocketAddr,
) -> GatewayResult<SessionEnd> {
    let mut session = Session::new(ctx, device);
    session.state.connected();
    tracing::debug!(target: "jdwgate.session", %peer, "session started");

    let result = session.drive(stream).await;
    session.detach_from_device();
    match result {
        Err(GatewayError::Cancelled) => Ok(SessionEnd::Cancelled),
        other => other,
    }
}

/// Holds the device channel open; detaches on drop if still attached.
struct DeviceChannel<'a> {
    device: &'a mut dyn Device,
    attached: bool,
}

impl<'a> DeviceChannel<'a> {
    fn new(device: &'a mut dyn Device) -> Self {
        Self {
            device,
            attached: false,
        }
    }

    fn attach(&mut self, password: Option<&str>) -> Result<(), DeviceError> {
        self.device.attach(password)?;
        self.attached = true;
        Ok(())
    }

    fn detach(&mut self) -> Result<bool, DeviceError> {
        if !self.attached {
            return Ok(false);
        }
        self.attached = false;
        self.device.detach()?;
        Ok(true)
    }

    fn device(&mut self) -> &mut dyn Device {
        &mut *self.device
    }
}

impl Drop for DeviceChannel<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.detach() {
            tracing::warn!(target: "jdwgate.session", error = %err, "device detach failed during teardown");
        }
    }
}

struct Session<'a> {
    ctx: &'a SessionContext,
    channel: DeviceChannel<'a>,
    state: SessionState,
    classes: VisibleClassList,
}

impl<'a> Session<'a> {
    fn new(ctx: &'a SessionContext, device: &'a mut dyn Device) -> Self {
        Self {
            ctx,
            channel: DeviceChannel::new(device),
            state: SessionState::new(),
            classes: VisibleClassList::default(),
        }
    }

    async fn drive(&mut self, mut stream: TcpStream) -> GatewayResult<SessionEnd> {
        self.attach_to_device()?;
        self.init_visible_class_list()?;
        self.hello_handshake(&mut stream).await?;
        self.run(stream).await
    }

    fn attach_to_device(&mut self) -> GatewayResult<()> {
        let password = self.ctx.config.device.password.as_deref();
        self.channel.attach(password)?;
        self.ctx.status.report("attached to device");
        Ok(())
    }

    /// Builds the application registry from the installed modules and
    /// derives the classes this session reports.
    fn init_visible_class_list(&mut self) -> GatewayResult<()> {
        let modules = self.channel.device().list_modules()?;
        let (registry, conflicts) = ApplicationRegistry::collect(&modules, &*self.ctx.symbols);
        for conflict in &conflicts {
            self.ctx.status.report(conflict.to_string());
        }

        self.classes = VisibleClassList::build(
            &registry,
            &modules,
            self.ctx.config.vm.include_builtin_classes,
        );
        tracing::info!(
            target: "jdwgate.session",
            modules = modules.len(),
            applications = registry.len(),
            classes = self.classes.len(),
            "visible class list ready"
        );
        Ok(())
    }

    async fn hello_handshake(&mut self, stream: &mut TcpStream) -> GatewayResult<()> {
        let cancel = &self.ctx.cancel;
        let timeout = self.ctx.config.server.handshake_timeout();

        let mut received = [0u8; HANDSHAKE.len()];
        tokio::select! {
            _ = cancel.cancelled() => return Err(GatewayError::Cancelled),
            read = tokio::time::timeout(timeout, stream.read_exact(&mut received)) => {
                read.map_err(|_| GatewayError::HandshakeTimeout)??;
            }
        }
        if received != *HANDSHAKE {
            return Err(JdwpError::HandshakeMismatch.into());
        }

        tokio::select! {
            _ = cancel.cancelled() => return Err(GatewayError::Cancelled),
            written = stream.write_all(HANDSHAKE) => written?,
        }
        self.state.attached();
        self.ctx.status.report("JDWP handshake complete");
        Ok(())
    }

    /// The receive/dispatch/reply loop.
    async fn run(&mut self, stream: TcpStream) -> GatewayResult<SessionEnd> {
        let ctx = self.ctx;
        let (reader, mut writer) = stream.into_split();

        let (packets_tx, mut packets) = mpsc::channel(1);
        let reader_cancel = ctx.cancel.child_token();
        let _stop_reader = reader_cancel.clone().drop_guard();
        tokio::spawn(read_loop(
            reader,
            ctx.config.server.max_packet_bytes,
            packets_tx,
            reader_cancel,
        ));

        let mut console = tokio::time::interval(ctx.config.server.console_poll_interval());
        console.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut dispatcher = Dispatcher::new(ctx.config.vm.clone(), mem::take(&mut self.classes));
        self.state.start_running();

        while self.state.is_looping() {
            let packet = tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => return Ok(SessionEnd::Cancelled),
                received = packets.recv() => match received {
                    Some(Ok(packet)) => packet,
                    Some(Err(err)) => return Err(err.into()),
                    None => return Ok(SessionEnd::ClientClosed),
                },
                _ = console.tick(), if self.state.target_running() => {
                    self.forward_console()?;
                    continue;
                }
            };
            log_packet("recv", &packet);

            let Some(reply) = dispatcher.dispatch(&packet, &mut self.state, self.channel.device())?
            else {
                continue;
            };
            log_packet("send", &reply);
            let bytes = encode(&reply)?;
            tokio::select! {
                _ = ctx.cancel.cancelled() => return Ok(SessionEnd::Cancelled),
                written = writer.write_all(&bytes) => written?,
            }
        }

        Ok(SessionEnd::Disposed)
    }

    fn forward_console(&mut self) -> GatewayResult<()> {
        while let Some(line) = self.channel.device().console_message()? {
            self.ctx.status.report(line);
        }
        Ok(())
    }

    fn detach_from_device(&mut self) {
        match self.channel.detach() {
            Ok(true) => self.ctx.status.report("detached from device"),
            Ok(false) => {}
            Err(err) => self.ctx.status.report(format!("device detach failed: {err}")),
        }
        self.state.disconnect();
    }
}

fn log_packet(direction: &'static str, packet: &Packet) {
    match &packet.body {
        PacketBody::Command {
            command_set,
            command,
            ..
        } => tracing::debug!(
            target: "jdwgate.session",
            direction,
            id = packet.id,
            command_set,
            command,
            length = packet.length(),
            "command packet"
        ),
        PacketBody::Reply { error_code, .. } => tracing::debug!(
            target: "jdwgate.session",
            direction,
            id = packet.id,
            error_code,
            length = packet.length(),
            "reply packet"
        ),
    }
}

/// Reads packets off the socket until EOF, a framing error, or
/// cancellation. Decoded packets are handed to the session loop in order.
async fn read_loop(
    mut reader: OwnedReadHalf,
    max_packet_bytes: usize,
    packets: mpsc::Sender<Result<Packet, JdwpError>>,
    cancel: CancellationToken,
) {
    loop {
        let read = tokio::select! {
            _ = cancel.cancelled() => return,
            read = read_packet(&mut reader, max_packet_bytes) => read,
        };
        match read {
            Ok(Some(packet)) => {
                if packets.send(Ok(packet)).await.is_err() {
                    return;
                }
            }
            Ok(None) => return,
            Err(err) => {
                let _ = packets.send(Err(err)).await;
                return;
            }
        }
    }
}

/// Reads one length-framed packet. `Ok(None)` means the peer closed the
/// connection between packets.
async fn read_packet<R>(reader: &mut R, max_packet_bytes: usize) -> Result<Option<Packet>, JdwpError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err.into()),
    }

    let length = length_prefix([header[0], header[1], header[2], header[3]]);
    if length < HEADER_LEN || length > max_packet_bytes {
        return Err(JdwpError::MalformedPacket(format!(
            "length field {length} outside {HEADER_LEN}..={max_packet_bytes}"
        )));
    }

    let mut bytes = Vec::with_capacity(length);
    bytes.extend_from_slice(&header);
    bytes.resize(length, 0);
    reader.read_exact(&mut bytes[HEADER_LEN..]).await?;
    decode(&bytes).map(Some)
}
