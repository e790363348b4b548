//! Typed view of the x86-64 register blob.
//!
//! The wire layout is the ptrace-style `user_regs_struct`: 27 u64 fields in a
//! fixed order, 216 bytes total. The snapshot itself treats registers as an
//! opaque blob; this module gives callers a structured way to build and
//! inspect that blob without hand-counting offsets.

use crate::error::{Result, SnapshotError};
use crate::format::Arch;
use crate::io::Reader;

pub const X86_64_USER_REGS_LEN: usize = 27 * 8;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[allow(non_camel_case_types)]
pub struct X86_64UserRegs {
    pub r15: u64,
    pub r14: u64,
    pub r13: u64,
    pub r12: u64,
    pub rbp: u64,
    pub rbx: u64,
    pub r11: u64,
    pub r10: u64,
    pub r9: u64,
    pub r8: u64,
    pub rax: u64,
    pub rcx: u64,
    pub rdx: u64,
    pub rsi: u64,
    pub rdi: u64,
    pub orig_rax: u64,
    pub rip: u64,
    pub cs: u64,
    pub eflags: u64,
    pub rsp: u64,
    pub ss: u64,
    pub fs_base: u64,
    pub gs_base: u64,
    pub ds: u64,
    pub es: u64,
    pub fs: u64,
    pub gs: u64,
}

impl X86_64UserRegs {
    fn words(&self) -> [u64; 27] {
        [
            self.r15,
            self.r14,
            self.r13,
            self.r12,
            self.rbp,
            self.rbx,
            self.r11,
            self.r10,
            self.r9,
            self.r8,
            self.rax,
            self.rcx,
            self.rdx,
            self.rsi,
            self.rdi,
            self.orig_rax,
            self.rip,
            self.cs,
            self.eflags,
            self.rsp,
            self.ss,
            self.fs_base,
            self.gs_base,
            self.ds,
            self.es,
            self.fs,
            self.gs,
        ]
    }

    pub fn to_bytes(&self) -> [u8; X86_64_USER_REGS_LEN] {
        let mut out = [0u8; X86_64_USER_REGS_LEN];
        for (i, word) in self.words().into_iter().enumerate() {
            out[i * 8..(i + 1) * 8].copy_from_slice(&word.to_le_bytes());
        }
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != X86_64_USER_REGS_LEN {
            return Err(SnapshotError::RegisterLenMismatch {
                arch: Arch::X86_64,
                expected: X86_64_USER_REGS_LEN,
                found: bytes.len(),
            });
        }
        let mut r = Reader::new(bytes);
        Ok(Self {
            r15: r.read_u64_le()?,
            r14: r.read_u64_le()?,
            r13: r.read_u64_le()?,
            r12: r.read_u64_le()?,
            rbp: r.read_u64_le()?,
            rbx: r.read_u64_le()?,
            r11: r.read_u64_le()?,
            r10: r.read_u64_le()?,
            r9: r.read_u64_le()?,
            r8: r.read_u64_le()?,
            rax: r.read_u64_le()?,
            rcx: r.read_u64_le()?,
            rdx: r.read_u64_le()?,
            rsi: r.read_u64_le()?,
            rdi: r.read_u64_le()?,
            orig_rax: r.read_u64_le()?,
            rip: r.read_u64_le()?,
            cs: r.read_u64_le()?,
            eflags: r.read_u64_le()?,
            rsp: r.read_u64_le()?,
            ss: r.read_u64_le()?,
            fs_base: r.read_u64_le()?,
            gs_base: r.read_u64_le()?,
            ds: r.read_u64_le()?,
            es: r.read_u64_le()?,
            fs: r.read_u64_le()?,
            gs: r.read_u64_le()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_layout_round_trips() {
        let regs = X86_64UserRegs {
            rip: 0xdead_beef,
            rsp: 0x7fff_0000,
            rax: 1,
            gs: 0x2b,
            ..Default::default()
        };
        let bytes = regs.to_bytes();
        assert_eq!(X86_64UserRegs::from_bytes(&bytes).unwrap(), regs);
    }

    #[test]
    fn rip_sits_at_the_registered_offset() {
        let regs = X86_64UserRegs {
            rip: 0x11223344,
            ..Default::default()
        };
        let bytes = regs.to_bytes();
        let layout = Arch::X86_64.register_layout().unwrap();
        assert_eq!(layout.program_counter(&bytes).unwrap(), 0x11223344);
    }

    #[test]
    fn wrong_length_is_rejected() {
        let err = X86_64UserRegs::from_bytes(&[0u8; 8]).unwrap_err();
        assert!(matches!(
            err,
            SnapshotError::RegisterLenMismatch {
                arch: Arch::X86_64,
                expected: X86_64_USER_REGS_LEN,
                found: 8,
            }
        ));
    }
}
