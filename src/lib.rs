//! Codec for the `UZL` process-snapshot container format.
//!
//! A [`Snapshot`] holds an ordered set of captured memory regions plus one CPU
//! register blob for a declared architecture. [`Snapshot::pack`] serializes the
//! records into a TLV stream, DEFLATE-compresses it, and prefixes magic and
//! header; [`Snapshot::unpack`] reverses the transformation from fully
//! untrusted bytes, validating every declared size before it is trusted.

mod compress;
mod error;
mod format;
mod io;
mod records;
mod regs;

pub use crate::compress::compress_bound;
pub use crate::error::{Result, SnapshotError};
pub use crate::format::{
    Arch, RecordTag, RegisterLayout, FORMAT_VERSION, HEADER_FIXED_LEN, HEADER_LEN, MAGIC_LEN,
    MEM_RECORD_FIXED_LEN, REG_RECORD_FIXED_LEN, SNAPSHOT_MAGIC,
};
pub use crate::records::{MemPerms, MemoryRecord};
pub use crate::regs::{X86_64UserRegs, X86_64_USER_REGS_LEN};

use crate::format::RecordTag as Tag;
use crate::io::{Reader, WriteLeExt};
use crate::records::RegisterRecord;

/// DEFLATE cannot expand by more than ~1032x; a header that declares a larger
/// uncompressed body than the compressed bytes could ever produce is forged,
/// and is rejected before the body allocation.
const MAX_INFLATE_RATIO: u64 = 1032;

/// A captured process execution snapshot: ordered memory regions plus one
/// register record, tied to a declared architecture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    arch: Arch,
    memory: Vec<MemoryRecord>,
    registers: Option<RegisterRecord>,
}

impl Snapshot {
    pub fn new(arch: Arch) -> Self {
        Self {
            arch,
            memory: Vec::new(),
            registers: None,
        }
    }

    pub fn arch(&self) -> Arch {
        self.arch
    }

    /// Append one memory region. `data` (and `name`, when given) are copied;
    /// the snapshot never borrows caller memory past this call. Insertion
    /// order is preserved through pack/unpack.
    pub fn push_memory(
        &mut self,
        start: u64,
        end: u64,
        perms: MemPerms,
        data: &[u8],
        name: Option<&[u8]>,
    ) -> Result<()> {
        let record = MemoryRecord::new(start, end, perms, data, name)?;
        self.memory.push(record);
        Ok(())
    }

    /// Set (or replace) the register record from an opaque blob. The blob
    /// length must match the layout registered for this snapshot's
    /// architecture.
    pub fn set_registers(&mut self, blob: &[u8]) -> Result<()> {
        let record = RegisterRecord::new(self.arch, blob)?;
        self.registers = Some(record);
        Ok(())
    }

    /// Memory regions in acquisition order.
    pub fn memory(&self) -> &[MemoryRecord] {
        &self.memory
    }

    pub fn register_blob(&self) -> Option<&[u8]> {
        self.registers.as_ref().map(RegisterRecord::blob)
    }

    /// Instruction pointer extracted from the register blob via the
    /// architecture registry.
    pub fn program_counter(&self) -> Result<u64> {
        let layout = self
            .arch
            .register_layout()
            .ok_or(SnapshotError::UnsupportedArch(self.arch))?;
        let blob = self.register_blob().ok_or(SnapshotError::NoRegisterRecord)?;
        layout.program_counter(blob)
    }

    /// Cumulative serialized size of the memory records. At least one record
    /// must exist.
    pub fn memory_records_len(&self) -> Result<u64> {
        if self.memory.is_empty() {
            return Err(SnapshotError::NoMemoryRecords);
        }
        let mut total = 0u64;
        for record in &self.memory {
            total = total
                .checked_add(record.wire_len())
                .ok_or(SnapshotError::Corrupt("memory record size overflow"))?;
        }
        Ok(total)
    }

    /// Serialized size of the register record, which must exist.
    pub fn register_record_len(&self) -> Result<u64> {
        let record = self
            .registers
            .as_ref()
            .ok_or(SnapshotError::NoRegisterRecord)?;
        Ok(record.wire_len())
    }

    fn body_len(&self) -> Result<u64> {
        let total = self
            .memory_records_len()?
            .checked_add(self.register_record_len()?)
            .ok_or(SnapshotError::Corrupt("body size overflow"))?;
        Ok(total)
    }

    /// Upper bound on the size of the buffer `pack` will produce.
    pub fn packed_size_bound(&self) -> Result<usize> {
        let body_len = usize::try_from(self.body_len()?)
            .map_err(|_| SnapshotError::Corrupt("body size does not fit in usize"))?;
        Ok(MAGIC_LEN + HEADER_LEN + compress_bound(body_len))
    }

    /// Serialize and compress the snapshot into one owned buffer.
    ///
    /// Requires at least one memory record and a register record. `data_size`
    /// in the emitted header is recomputed here and describes the
    /// *uncompressed* body length.
    pub fn pack(&self) -> Result<Vec<u8>> {
        let body_len = self.body_len()?;
        let registers = self
            .registers
            .as_ref()
            .ok_or(SnapshotError::NoRegisterRecord)?;

        let body_capacity = usize::try_from(body_len)
            .map_err(|_| SnapshotError::Corrupt("body size does not fit in usize"))?;
        let mut body = Vec::new();
        body.try_reserve_exact(body_capacity)
            .map_err(|_| SnapshotError::OutOfMemory { len: body_capacity })?;
        for record in &self.memory {
            record.encode(&mut body)?;
        }
        registers.encode(&mut body)?;
        debug_assert_eq!(body.len() as u64, body_len);

        let compressed = compress::compress(&body)?;

        let mut out = Vec::new();
        out.try_reserve_exact(MAGIC_LEN + HEADER_LEN + compressed.len())
            .map_err(|_| SnapshotError::OutOfMemory {
                len: MAGIC_LEN + HEADER_LEN + compressed.len(),
            })?;
        out.write_bytes(SNAPSHOT_MAGIC)?;
        out.write_u16_le(Tag::HEADER.0)?;
        out.write_u64_le(HEADER_FIXED_LEN)?;
        out.write_u16_le(FORMAT_VERSION)?;
        out.write_u16_le(self.arch.as_u16())?;
        out.write_u64_le(body_len)?;
        out.write_bytes(&compressed)?;
        Ok(out)
    }

    /// Reconstruct a snapshot from untrusted bytes.
    ///
    /// Every stage validates before it reads: magic, header record, declared
    /// body size, decompression to exactly that size, then the record stream
    /// (1..N memory records followed by exactly one register record whose blob
    /// length must match the header's architecture). Any failure aborts the
    /// whole call; no partial snapshot escapes.
    pub fn unpack(bytes: &[u8]) -> Result<Snapshot> {
        let mut r = Reader::new(bytes);

        let magic = r.take(MAGIC_LEN)?;
        if magic != SNAPSHOT_MAGIC {
            return Err(SnapshotError::InvalidMagic);
        }

        let tag = r.read_u16_le()?;
        if tag != Tag::HEADER.0 {
            return Err(SnapshotError::Corrupt("missing header record"));
        }
        let header_len = r.read_u64_le()?;
        if header_len != HEADER_FIXED_LEN {
            return Err(SnapshotError::Corrupt("header length mismatch"));
        }
        let version = r.read_u16_le()?;
        if version != FORMAT_VERSION {
            return Err(SnapshotError::UnsupportedVersion(version));
        }
        let arch = Arch::from_u16(r.read_u16_le()?)?;
        let data_size = r.read_u64_le()?;

        let compressed = r.take_rest();
        if data_size > (compressed.len() as u64).saturating_mul(MAX_INFLATE_RATIO) {
            return Err(SnapshotError::Corrupt(
                "data_size exceeds deflate expansion bound",
            ));
        }
        let body = compress::decompress_exact(
            compressed,
            usize::try_from(data_size)
                .map_err(|_| SnapshotError::Corrupt("data_size does not fit in usize"))?,
        )?;

        let mut r = Reader::new(&body);
        let mut snapshot = Snapshot::new(arch);
        while r.peek_u16_le() == Some(Tag::MEMORY.0) {
            let record = MemoryRecord::decode(&mut r)?;
            snapshot.memory.push(record);
        }
        if snapshot.memory.is_empty() {
            return Err(SnapshotError::NoMemoryRecords);
        }

        snapshot.registers = Some(RegisterRecord::decode(&mut r, arch)?);

        if !r.is_empty() {
            return Err(SnapshotError::Corrupt("trailing bytes after register record"));
        }
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    proptest! {
        // "Fuzz" the decoder. This is not a replacement for coverage-guided
        // fuzzing, but it does guard against panics on corrupted/truncated
        // inputs.
        #[test]
        fn decoder_never_panics(data in proptest::collection::vec(any::<u8>(), 0..8192)) {
            let _ = Snapshot::unpack(&data);
        }
    }

    #[test]
    fn pack_requires_memory_and_registers() {
        let mut snap = Snapshot::new(Arch::X86_64);
        assert!(matches!(snap.pack(), Err(SnapshotError::NoMemoryRecords)));

        snap.push_memory(0, 0x10, MemPerms::READ, &[0u8; 16], None)
            .unwrap();
        assert!(matches!(snap.pack(), Err(SnapshotError::NoRegisterRecord)));

        snap.set_registers(&[0u8; X86_64_USER_REGS_LEN]).unwrap();
        assert!(snap.pack().is_ok());
    }

    #[test]
    fn set_registers_rejects_unsupported_arch() {
        let mut snap = Snapshot::new(Arch::Unknown);
        let err = snap.set_registers(&[0u8; 16]).unwrap_err();
        assert!(matches!(err, SnapshotError::UnsupportedArch(Arch::Unknown)));
    }

    #[test]
    fn failed_append_leaves_snapshot_untouched() {
        let mut snap = Snapshot::new(Arch::X86_64);
        snap.push_memory(0, 0x10, MemPerms::READ, &[0u8; 16], None)
            .unwrap();
        assert!(snap.push_memory(0, 0x10, MemPerms::READ, &[], Some(&[])).is_err());
        assert_eq!(snap.memory().len(), 1);
    }
}
