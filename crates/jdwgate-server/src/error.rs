use std::io;

use jdwgate_config::ConfigError;
use jdwgate_jdwp::JdwpError;
use thiserror::Error;

use crate::device::DeviceError;

pub type GatewayResult<T> = Result<T, GatewayError>;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("jdwp: {0}")]
    Jdwp(#[from] JdwpError),
    #[error("device communication failed: {0}")]
    Device(#[from] DeviceError),
    #[error("config: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("cannot resolve listen address {0:?}")]
    Resolve(String),
    #[error("server is already started")]
    AlreadyStarted,
    #[error("client did not send the JDWP handshake in time")]
    HandshakeTimeout,
    #[error("device handle was lost by a panicked session thread")]
    DeviceLost,
    #[error("session cancelled")]
    Cancelled,
}

impl GatewayError {
    /// Errors after which the gateway stops serving entirely: the device
    /// channel can no longer be trusted.
    ///
    /// Every other error ends at most the current debugger connection.
    pub fn is_session_fatal(&self) -> bool {
        matches!(self, GatewayError::Device(_))
    }
}
