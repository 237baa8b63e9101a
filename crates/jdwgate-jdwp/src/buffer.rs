use crate::{JdwpError, Result};

/// Append-only builder for JDWP fields.
///
/// All multi-byte integers are written big-endian. Variable-length data
/// (strings, opaque blocks) is written as a `u32` byte count followed by the
/// raw bytes. The total size of a reply is only known once every field has
/// been appended, which is why the packet header is filled in later by
/// [`crate::encode`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FieldBuffer {
    buf: Vec<u8>,
}

impl FieldBuffer {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Number of bytes written so far (independent of the backing capacity).
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buf
    }

    fn grow(&mut self, additional: usize) {
        self.buf.reserve(additional);
    }

    pub fn append_byte(&mut self, v: u8) {
        self.grow(1);
        self.buf.push(v);
    }

    pub fn append_bool(&mut self, v: bool) {
        self.append_byte(u8::from(v));
    }

    pub fn append_u16(&mut self, v: u16) {
        self.append_raw(&v.to_be_bytes());
    }

    pub fn append_int32(&mut self, v: i32) {
        self.append_raw(&v.to_be_bytes());
    }

    pub fn append_u32(&mut self, v: u32) {
        self.append_raw(&v.to_be_bytes());
    }

    /// Appends bytes verbatim, without a length prefix.
    pub fn append_raw(&mut self, bytes: &[u8]) {
        self.grow(bytes.len());
        self.buf.extend_from_slice(bytes);
    }

    /// Appends a `u32` length prefix followed by `bytes`.
    pub fn append_block(&mut self, bytes: &[u8]) -> Result<()> {
        let len = u32::try_from(bytes.len()).map_err(|_| JdwpError::FieldTooLarge(bytes.len()))?;
        self.grow(4 + bytes.len());
        self.append_u32(len);
        self.append_raw(bytes);
        Ok(())
    }

    /// JDWP strings are UTF-8 blocks.
    pub fn append_string(&mut self, text: &str) -> Result<()> {
        self.append_block(text.as_bytes())
    }

    /// Overwrites four already-written bytes at `offset`.
    pub(crate) fn patch_u32(&mut self, offset: usize, v: u32) {
        self.buf[offset..offset + 4].copy_from_slice(&v.to_be_bytes());
    }
}

/// Bounds-checked reader over a client-supplied payload.
///
/// Every read validates the remaining length first; malformed input yields
/// [`JdwpError::CommandFormat`] rather than a panic.
pub struct FieldReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> FieldReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.buf.len())
            .ok_or_else(|| {
                JdwpError::CommandFormat(format!(
                    "buffer underflow: need {n} bytes at {}, have {}",
                    self.pos,
                    self.buf.len()
                ))
            })?;
        let bytes = &self.buf[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take_array::<1>()?[0])
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.take_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.take_array()?))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_be_bytes(self.take_array()?))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_be_bytes(self.take_array()?))
    }

    /// Reads an identifier of `size` bytes, zero-extended to `u64`.
    pub fn read_id(&mut self, size: usize) -> Result<u64> {
        if size == 0 || size > 8 {
            return Err(JdwpError::CommandFormat(format!("invalid id size: {size}")));
        }
        let bytes = self.take(size)?;
        let mut be = [0u8; 8];
        be[8 - size..].copy_from_slice(bytes);
        Ok(u64::from_be_bytes(be))
    }

    /// Reads a length-prefixed block. The prefix is checked against the
    /// remaining input before anything is allocated.
    pub fn read_block(&mut self) -> Result<&'a [u8]> {
        let len = self.read_u32()? as usize;
        self.take(len)
    }

    pub fn read_string(&mut self) -> Result<String> {
        let bytes = self.read_block()?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| JdwpError::CommandFormat(format!("invalid utf-8 string: {e}")))
    }

    /// Fails when unread bytes are left over.
    pub fn finish(&self) -> Result<()> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(JdwpError::CommandFormat(format!("{n} trailing bytes"))),
        }
    }
}
