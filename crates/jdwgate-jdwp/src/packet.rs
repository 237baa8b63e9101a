use crate::{FieldBuffer, JdwpError, Result};

/// Literal exchanged by both peers right after the TCP connection opens.
pub const HANDSHAKE: &[u8; 14] = b"JDWP-Handshake";
/// `length(4) + id(4) + flags(1) + commandSet/command or errorCode(2)`.
pub const HEADER_LEN: usize = 11;
pub const FLAG_REPLY: u8 = 0x80;

/// Offset of the `flags` byte inside the header.
const FLAGS_OFFSET: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketBody {
    Command {
        command_set: u8,
        command: u8,
        payload: Vec<u8>,
    },
    Reply {
        error_code: u16,
        payload: Vec<u8>,
    },
}

/// One JDWP packet.
///
/// The `length` header field is not stored: it is derived from the payload
/// by [`Packet::length`] and checked by [`decode`]. The reply bit is carried
/// by the [`PacketBody`] variant alone; `flags` holds the remaining bits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub id: u32,
    pub flags: u8,
    pub body: PacketBody,
}

impl Packet {
    pub fn command(id: u32, command_set: u8, command: u8, payload: Vec<u8>) -> Self {
        Self {
            id,
            flags: 0,
            body: PacketBody::Command {
                command_set,
                command,
                payload,
            },
        }
    }

    pub fn reply(id: u32, error_code: u16, payload: Vec<u8>) -> Self {
        Self {
            id,
            flags: 0,
            body: PacketBody::Reply {
                error_code,
                payload,
            },
        }
    }

    pub fn is_reply(&self) -> bool {
        matches!(self.body, PacketBody::Reply { .. })
    }

    /// The `flags` byte as written on the wire.
    pub fn wire_flags(&self) -> u8 {
        let reply = if self.is_reply() { FLAG_REPLY } else { 0 };
        (self.flags & !FLAG_REPLY) | reply
    }

    pub fn payload(&self) -> &[u8] {
        match &self.body {
            PacketBody::Command { payload, .. } | PacketBody::Reply { payload, .. } => payload,
        }
    }

    /// Serialized size in bytes, header included.
    pub fn length(&self) -> usize {
        HEADER_LEN + self.payload().len()
    }
}

/// Reads the big-endian `length` field from the first four header bytes.
pub fn length_prefix(header: [u8; 4]) -> usize {
    u32::from_be_bytes(header) as usize
}

pub fn decode(bytes: &[u8]) -> Result<Packet> {
    if bytes.len() < HEADER_LEN {
        return Err(JdwpError::MalformedPacket(format!(
            "packet of {} bytes is shorter than the {HEADER_LEN}-byte header",
            bytes.len()
        )));
    }

    let length = length_prefix([bytes[0], bytes[1], bytes[2], bytes[3]]);
    if length != bytes.len() {
        return Err(JdwpError::MalformedPacket(format!(
            "length field says {length} bytes, got {}",
            bytes.len()
        )));
    }

    let id = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    let flags = bytes[FLAGS_OFFSET];
    let payload = bytes[HEADER_LEN..].to_vec();
    let body = if flags & FLAG_REPLY != 0 {
        PacketBody::Reply {
            error_code: u16::from_be_bytes([bytes[9], bytes[10]]),
            payload,
        }
    } else {
        PacketBody::Command {
            command_set: bytes[9],
            command: bytes[10],
            payload,
        }
    };

    Ok(Packet {
        id,
        flags: flags & !FLAG_REPLY,
        body,
    })
}

pub fn encode(packet: &Packet) -> Result<Vec<u8>> {
    let total = packet.length();
    let length = u32::try_from(total).map_err(|_| JdwpError::FieldTooLarge(total))?;

    let mut out = FieldBuffer::with_capacity(total);
    // Placeholder; patched once the body is in place.
    out.append_u32(0);
    out.append_u32(packet.id);
    out.append_byte(packet.wire_flags());
    match &packet.body {
        PacketBody::Command {
            command_set,
            command,
            payload,
        } => {
            out.append_byte(*command_set);
            out.append_byte(*command);
            out.append_raw(payload);
        }
        PacketBody::Reply {
            error_code,
            payload,
        } => {
            out.append_u16(*error_code);
            out.append_raw(payload);
        }
    }
    debug_assert_eq!(out.len(), total);
    out.patch_u32(0, length);
    Ok(out.into_vec())
}
