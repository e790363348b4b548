use std::io::Write;

use bitflags::bitflags;

use crate::error::{Result, SnapshotError};
use crate::format::{Arch, RecordTag, MEM_RECORD_FIXED_LEN, REG_RECORD_FIXED_LEN};
use crate::io::{try_vec_from, Reader, WriteLeExt};

bitflags! {
    /// Memory region permissions, packed into the low three bits of the wire
    /// byte. Unknown high bits are retained so hostile-but-decodable input
    /// survives a re-encode unchanged.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MemPerms: u8 {
        const READ = 0b100;
        const WRITE = 0b010;
        const EXECUTE = 0b001;
    }
}

/// One captured memory region. Owns its data and optional name exclusively;
/// construction always copies caller bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryRecord {
    start: u64,
    end: u64,
    perms: MemPerms,
    data: Vec<u8>,
    name: Option<Vec<u8>>,
}

impl MemoryRecord {
    pub(crate) fn new(
        start: u64,
        end: u64,
        perms: MemPerms,
        data: &[u8],
        name: Option<&[u8]>,
    ) -> Result<Self> {
        // An empty name is not representable on the wire (str_flag=1 requires
        // str_size > 0); callers mean `None`.
        if matches!(name, Some(name) if name.is_empty()) {
            return Err(SnapshotError::Corrupt("memory region name may not be empty"));
        }
        let data = try_vec_from(data)?;
        let name = name.map(try_vec_from).transpose()?;
        Ok(Self {
            start,
            end,
            perms,
            data,
            name,
        })
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn perms(&self) -> MemPerms {
        self.perms
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn name(&self) -> Option<&[u8]> {
        self.name.as_deref()
    }

    fn name_len(&self) -> u64 {
        self.name.as_ref().map_or(0, |name| name.len() as u64)
    }

    /// Serialized size of this record, i.e. its wire `length` field.
    pub(crate) fn wire_len(&self) -> u64 {
        MEM_RECORD_FIXED_LEN as u64 + self.size() + self.name_len()
    }

    pub(crate) fn encode<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_u16_le(RecordTag::MEMORY.0)?;
        w.write_u64_le(self.wire_len())?;
        w.write_u64_le(self.start)?;
        w.write_u64_le(self.end)?;
        w.write_u64_le(self.size())?;
        w.write_u8(self.perms.bits())?;
        w.write_u8(self.name.is_some() as u8)?;
        w.write_u64_le(self.name_len())?;
        w.write_bytes(&self.data)?;
        if let Some(name) = &self.name {
            w.write_bytes(name)?;
        }
        Ok(())
    }

    pub(crate) fn decode(r: &mut Reader<'_>) -> Result<Self> {
        let tag = r.read_u16_le()?;
        if tag != RecordTag::MEMORY.0 {
            return Err(SnapshotError::Corrupt("expected memory record tag"));
        }
        let length = r.read_u64_le()?;
        let start = r.read_u64_le()?;
        let end = r.read_u64_le()?;
        let size = r.read_u64_le()?;
        let perms = MemPerms::from_bits_retain(r.read_u8()?);
        let str_flag = r.read_u8()?;
        let str_size = r.read_u64_le()?;

        match str_flag {
            0 if str_size != 0 => {
                return Err(SnapshotError::Corrupt("str_size set without str_flag"));
            }
            1 if str_size == 0 => {
                return Err(SnapshotError::Corrupt("str_flag set with zero str_size"));
            }
            0 | 1 => {}
            _ => return Err(SnapshotError::Corrupt("invalid str_flag")),
        }

        let expected_len = (MEM_RECORD_FIXED_LEN as u64)
            .checked_add(size)
            .and_then(|len| len.checked_add(str_size))
            .ok_or(SnapshotError::Corrupt("memory record length overflow"))?;
        if length != expected_len {
            return Err(SnapshotError::Corrupt("memory record length mismatch"));
        }

        let data = r.take_declared(size)?;
        let name = if str_flag == 1 {
            Some(r.take_declared(str_size)?)
        } else {
            None
        };

        MemoryRecord::new(start, end, perms, data, name)
    }
}

/// The captured CPU register file, stored as an opaque architecture-specific
/// blob. Length is pinned to the architecture's registered layout at
/// construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterRecord {
    blob: Vec<u8>,
}

impl RegisterRecord {
    pub(crate) fn new(arch: Arch, blob: &[u8]) -> Result<Self> {
        let layout = arch
            .register_layout()
            .ok_or(SnapshotError::UnsupportedArch(arch))?;
        if blob.len() != layout.blob_len {
            return Err(SnapshotError::RegisterLenMismatch {
                arch,
                expected: layout.blob_len,
                found: blob.len(),
            });
        }
        Ok(Self {
            blob: try_vec_from(blob)?,
        })
    }

    pub fn blob(&self) -> &[u8] {
        &self.blob
    }

    pub(crate) fn wire_len(&self) -> u64 {
        REG_RECORD_FIXED_LEN as u64 + self.blob.len() as u64
    }

    pub(crate) fn encode<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_u16_le(RecordTag::REGISTERS.0)?;
        w.write_u64_le(self.wire_len())?;
        w.write_u64_le(self.blob.len() as u64)?;
        w.write_bytes(&self.blob)?;
        Ok(())
    }

    pub(crate) fn decode(r: &mut Reader<'_>, arch: Arch) -> Result<Self> {
        let tag = r.read_u16_le()?;
        if tag != RecordTag::REGISTERS.0 {
            return Err(SnapshotError::Corrupt("expected register record tag"));
        }
        let length = r.read_u64_le()?;
        let reg_len = r.read_u64_le()?;

        let layout = arch
            .register_layout()
            .ok_or(SnapshotError::UnsupportedArch(arch))?;
        if reg_len != layout.blob_len as u64 {
            return Err(SnapshotError::RegisterLenMismatch {
                arch,
                expected: layout.blob_len,
                found: usize::try_from(reg_len).unwrap_or(usize::MAX),
            });
        }
        let expected_len = (REG_RECORD_FIXED_LEN as u64)
            .checked_add(reg_len)
            .ok_or(SnapshotError::Corrupt("register record length overflow"))?;
        if length != expected_len {
            return Err(SnapshotError::Corrupt("register record length mismatch"));
        }

        let blob = r.take_declared(reg_len)?;
        RegisterRecord::new(arch, blob)
    }
}
