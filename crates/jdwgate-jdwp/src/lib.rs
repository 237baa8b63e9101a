//! Java Debug Wire Protocol (JDWP) wire layer for the jdwgate gateway.
//!
//! The gateway sits on the *server* side of JDWP: debuggers connect to it,
//! send command packets, and expect reply packets back. This crate holds the
//! pieces that are pure byte plumbing:
//!
//! - [`FieldBuffer`] / [`FieldReader`]: big-endian field encoding used by every
//!   JDWP payload.
//! - [`Packet`] with [`decode`] / [`encode`]: header framing. `encode` is the
//!   only place the `length` header field is ever written.
//! - [`Command`]: the tagged command sum type decoded from a command packet.
//!
//! Nothing here performs I/O; the session loop in `jdwgate-server` owns the
//! socket.

mod buffer;
mod command;
pub mod constants;
mod packet;

use std::io;

use thiserror::Error;

pub use buffer::{FieldBuffer, FieldReader};
pub use command::{Command, EventModifier, EventRequestSpec, Location};
pub use packet::{
    decode, encode, length_prefix, Packet, PacketBody, FLAG_REPLY, HANDSHAKE, HEADER_LEN,
};

pub type Result<T, E = JdwpError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum JdwpError {
    /// Header/length mismatch or a packet shorter than the fixed header.
    #[error("malformed JDWP packet: {0}")]
    MalformedPacket(String),
    /// The payload does not have the shape the command requires.
    #[error("malformed command payload: {0}")]
    CommandFormat(String),
    #[error("JDWP handshake mismatch")]
    HandshakeMismatch,
    #[error("variable-length field of {0} bytes does not fit a JDWP length prefix")]
    FieldTooLarge(usize),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl JdwpError {
    /// Whether the error must terminate the debugger connection.
    pub fn is_connection_fatal(&self) -> bool {
        !matches!(self, JdwpError::CommandFormat(_))
    }
}

/// Decode attacker-controlled bytes without panicking. Used by fuzz targets.
#[cfg(feature = "fuzzing")]
pub fn decode_packet_bytes(bytes: &[u8]) -> Result<Packet> {
    let packet = decode(bytes)?;
    if let PacketBody::Command {
        command_set,
        command,
        ref payload,
    } = packet.body
    {
        let _ = Command::parse(command_set, command, payload);
    }
    Ok(packet)
}
