use std::io::Write;

use crate::error::{Result, SnapshotError};

pub trait WriteLeExt: Write {
    fn write_u8(&mut self, v: u8) -> Result<()> {
        self.write_all(&[v])?;
        Ok(())
    }

    fn write_u16_le(&mut self, v: u16) -> Result<()> {
        self.write_all(&v.to_le_bytes())?;
        Ok(())
    }

    fn write_u64_le(&mut self, v: u64) -> Result<()> {
        self.write_all(&v.to_le_bytes())?;
        Ok(())
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.write_all(bytes)?;
        Ok(())
    }
}

impl<T: Write + ?Sized> WriteLeExt for T {}

/// Bounds-validated cursor over an untrusted byte buffer.
///
/// Every read validates the requested length against the bytes remaining
/// *before* touching the buffer; a failed read consumes nothing.
#[derive(Debug, Clone, Copy)]
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(SnapshotError::Truncated {
                offset: self.pos,
                needed: len,
                remaining: self.remaining(),
            });
        }
        let bytes = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    /// `take` for a length declared by the input itself.
    pub fn take_declared(&mut self, len: u64) -> Result<&'a [u8]> {
        let len = usize::try_from(len)
            .map_err(|_| SnapshotError::Corrupt("declared length does not fit in usize"))?;
        self.take(len)
    }

    pub fn take_rest(&mut self) -> &'a [u8] {
        let rest = &self.buf[self.pos..];
        self.pos = self.buf.len();
        rest
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16_le(&mut self) -> Result<u16> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    pub fn read_u64_le(&mut self) -> Result<u64> {
        let bytes = self.take(8)?;
        let mut word = [0u8; 8];
        word.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(word))
    }

    /// Look at the next record tag without consuming it. Returns `None` when
    /// fewer than two bytes remain.
    pub fn peek_u16_le(&self) -> Option<u16> {
        let rest = self.buf.get(self.pos..self.pos.checked_add(2)?)?;
        Some(u16::from_le_bytes([rest[0], rest[1]]))
    }
}

/// Copy untrusted bytes into an owned buffer, surfacing allocation failure
/// instead of aborting.
pub fn try_vec_from(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(bytes.len())
        .map_err(|_| SnapshotError::OutOfMemory { len: bytes.len() })?;
    buf.extend_from_slice(bytes);
    Ok(buf)
}

/// Checked allocation of a zero-filled buffer of attacker-declared size.
pub fn try_zeroed_vec(len: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| SnapshotError::OutOfMemory { len })?;
    buf.resize(len, 0);
    Ok(buf)
}
