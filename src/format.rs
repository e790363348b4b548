use crate::error::{Result, SnapshotError};
use crate::regs::X86_64_USER_REGS_LEN;

pub const SNAPSHOT_MAGIC: &[u8; 3] = b"UZL";
pub const FORMAT_VERSION: u16 = 0;

pub const MAGIC_LEN: usize = 3;
/// On-wire header size: tag + length + version + arch + data_size.
pub const HEADER_LEN: usize = 2 + 8 + 2 + 2 + 8;
/// Value of the header `length` field. Historical constant: the original
/// format counted version + arch + data_size with a 4-byte arch tag.
pub const HEADER_FIXED_LEN: u64 = 14;
/// Fixed part of a memory record: tag + length + start + end + size + perms +
/// str_flag + str_size.
pub const MEM_RECORD_FIXED_LEN: usize = 2 + 8 + 8 + 8 + 8 + 1 + 1 + 8;
/// Fixed part of a register record: tag + length + reg_len.
pub const REG_RECORD_FIXED_LEN: usize = 2 + 8 + 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordTag(pub u16);

impl RecordTag {
    pub const HEADER: RecordTag = RecordTag(0x0000);
    pub const MEMORY: RecordTag = RecordTag(0x0001);
    pub const REGISTERS: RecordTag = RecordTag(0x0002);

    pub fn name(self) -> Option<&'static str> {
        match self {
            RecordTag::HEADER => Some("HEADER"),
            RecordTag::MEMORY => Some("MEMORY"),
            RecordTag::REGISTERS => Some("REGISTERS"),
            _ => None,
        }
    }
}

impl core::fmt::Display for RecordTag {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if let Some(name) = self.name() {
            write!(f, "{name}(0x{:04x})", self.0)
        } else {
            write!(f, "RecordTag(0x{:04x})", self.0)
        }
    }
}

/// Architecture tag carried in the snapshot header.
///
/// Only x86-64 currently has a concrete register layout; the remaining tags are
/// representable on the wire but reject register records until a layout is
/// registered for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(non_camel_case_types)]
#[repr(u16)]
pub enum Arch {
    X86_64 = 0,
    X86_32 = 1,
    Arm = 2,
    Aarch64 = 3,
    Ppc64 = 4,
    Ppc32 = 5,
    Mips64 = 6,
    Mips32 = 7,
    Unknown = 8,
}

impl Arch {
    pub fn from_u16(v: u16) -> Result<Self> {
        Ok(match v {
            0 => Arch::X86_64,
            1 => Arch::X86_32,
            2 => Arch::Arm,
            3 => Arch::Aarch64,
            4 => Arch::Ppc64,
            5 => Arch::Ppc32,
            6 => Arch::Mips64,
            7 => Arch::Mips32,
            8 => Arch::Unknown,
            _ => return Err(SnapshotError::UnknownArch(v)),
        })
    }

    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Registry entry for this architecture, if one exists. Adding support for
    /// a new architecture means adding one entry here (plus its typed register
    /// struct in `regs`).
    pub fn register_layout(self) -> Option<&'static RegisterLayout> {
        match self {
            Arch::X86_64 => Some(&X86_64_LAYOUT),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Arch::X86_64 => "x86-64",
            Arch::X86_32 => "x86-32",
            Arch::Arm => "arm",
            Arch::Aarch64 => "aarch64",
            Arch::Ppc64 => "ppc-64",
            Arch::Ppc32 => "ppc-32",
            Arch::Mips64 => "mips-64",
            Arch::Mips32 => "mips-32",
            Arch::Unknown => "unknown",
        }
    }
}

impl core::fmt::Display for Arch {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-architecture register blob description.
#[derive(Debug, Clone, Copy)]
pub struct RegisterLayout {
    /// Exact byte length of the architecture's register blob.
    pub blob_len: usize,
    /// Byte offset of the instruction pointer within the blob.
    pub program_counter_offset: usize,
}

impl RegisterLayout {
    pub fn program_counter(&self, blob: &[u8]) -> Result<u64> {
        let end = self
            .program_counter_offset
            .checked_add(8)
            .ok_or(SnapshotError::Corrupt("program counter offset overflow"))?;
        let bytes = blob
            .get(self.program_counter_offset..end)
            .ok_or(SnapshotError::Corrupt(
                "register blob too short for program counter",
            ))?;
        let mut word = [0u8; 8];
        word.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(word))
    }
}

// rip is the 17th u64 field of the ptrace-style x86-64 register file.
static X86_64_LAYOUT: RegisterLayout = RegisterLayout {
    blob_len: X86_64_USER_REGS_LEN,
    program_counter_offset: 16 * 8,
};
