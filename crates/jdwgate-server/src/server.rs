use std::{
    net::{SocketAddr, ToSocketAddrs},
    path::Path,
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};

use jdwgate_config::{GatewayConfig, ServerConfig};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::{
    device::{DebugSymbols, Device},
    error::{GatewayError, GatewayResult},
    session::{accept_connection, run_session, SessionContext, SessionEnd},
    status::StatusReporter,
};

/// Back-off after a failed `accept` so a persistent error does not spin.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Background thread serving debugger sessions one at a time.
///
/// Dropping the handle cancels the thread and joins it.
pub(crate) struct SessionHandle {
    cancel: CancellationToken,
    thread: Option<JoinHandle<Box<dyn Device>>>,
}

impl SessionHandle {
    fn spawn(
        listener: std::net::TcpListener,
        device: Box<dyn Device>,
        ctx: SessionContext,
    ) -> GatewayResult<Self> {
        let cancel = ctx.cancel.clone();
        let thread = thread::Builder::new()
            .name("jdwgate-session".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(err) => {
                        ctx.status.report(format!("failed to start session runtime: {err}"));
                        return device;
                    }
                };
                runtime.block_on(serve(listener, device, &ctx))
            })?;
        Ok(Self {
            cancel,
            thread: Some(thread),
        })
    }

    fn cancel(&self) {
        self.cancel.cancel();
    }

    fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Cancels the thread and waits for it, returning the device it owned.
    fn join(mut self) -> Option<Box<dyn Device>> {
        self.cancel();
        let thread = self.thread.take()?;
        match thread.join() {
            Ok(device) => Some(device),
            Err(_) => {
                tracing::error!(target: "jdwgate.server", "session thread panicked");
                None
            }
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.cancel();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

async fn serve(
    listener: std::net::TcpListener,
    mut device: Box<dyn Device>,
    ctx: &SessionContext,
) -> Box<dyn Device> {
    let listener = match TcpListener::from_std(listener) {
        Ok(listener) => listener,
        Err(err) => {
            ctx.status.report(format!("failed to register listener: {err}"));
            return device;
        }
    };

    loop {
        let (stream, peer) = match accept_connection(&listener, &ctx.cancel).await {
            Ok(Some(accepted)) => accepted,
            Ok(None) => break,
            Err(err) => {
                tracing::warn!(target: "jdwgate.server", error = %err, "accept failed");
                tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                continue;
            }
        };
        ctx.status.report(format!("debugger connected from {peer}"));

        match run_session(ctx, device.as_mut(), stream, peer).await {
            Ok(SessionEnd::Cancelled) => break,
            Ok(end) => ctx.status.report(format!("session ended: {end}")),
            Err(err) if err.is_session_fatal() => {
                ctx.status.report(format!("session failed, stopping server: {err}"));
                ctx.cancel.cancel();
                break;
            }
            Err(err) => ctx.status.report(format!("session ended: {err}")),
        }
    }

    tracing::debug!(target: "jdwgate.server", "session thread exiting");
    device
}

/// JDWP server for one device.
///
/// `start` binds the listener and spawns the background session thread;
/// `stop` (or dropping the server) cancels and joins it.
pub struct Server {
    config: Arc<GatewayConfig>,
    symbols: Arc<dyn DebugSymbols>,
    status: StatusReporter,
    device: Option<Box<dyn Device>>,
    running: Option<Running>,
}

struct Running {
    local_addr: SocketAddr,
    handle: SessionHandle,
}

impl Server {
    pub fn new(
        device: Box<dyn Device>,
        symbols: Arc<dyn DebugSymbols>,
        config: GatewayConfig,
        status: StatusReporter,
    ) -> Self {
        Self {
            config: Arc::new(config),
            symbols,
            status,
            device: Some(device),
            running: None,
        }
    }

    pub fn from_config_file(
        device: Box<dyn Device>,
        symbols: Arc<dyn DebugSymbols>,
        path: impl AsRef<Path>,
        status: StatusReporter,
    ) -> GatewayResult<Self> {
        let config = GatewayConfig::load_from_path(path)?;
        Ok(Self::new(device, symbols, config, status))
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Binds the listener and starts serving. Returns the bound address.
    pub fn start(&mut self) -> GatewayResult<SocketAddr> {
        if self.running.is_some() {
            return Err(GatewayError::AlreadyStarted);
        }
        let addr = listen_addr(&self.config.server)?;
        let listener = std::net::TcpListener::bind(addr).map_err(|source| GatewayError::Bind {
            addr: addr.to_string(),
            source,
        })?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let device = self.device.take().ok_or(GatewayError::DeviceLost)?;
        let ctx = SessionContext {
            config: Arc::clone(&self.config),
            symbols: Arc::clone(&self.symbols),
            status: self.status.clone(),
            cancel: CancellationToken::new(),
        };
        let handle = SessionHandle::spawn(listener, device, ctx)?;

        self.status.report(format!("listening on {local_addr}"));
        self.running = Some(Running { local_addr, handle });
        Ok(local_addr)
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|running| running.local_addr)
    }

    /// Whether the background thread is still serving. Turns false after
    /// `stop` or after a device failure ended it.
    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
    }

    /// Cancels the background thread and waits for it. Safe to call from any
    /// thread holding the server, and more than once.
    pub fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        self.device = running.handle.join();
        self.status.report("server stopped");
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.stop();
    }
}

fn listen_addr(server: &ServerConfig) -> GatewayResult<SocketAddr> {
    let host = match server.address.trim() {
        "" => "0.0.0.0",
        host => host,
    };
    (host, server.port)
        .to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or_else(|| GatewayError::Resolve(host.to_string()))
}
