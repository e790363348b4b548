//! DEFLATE adapter for the snapshot body.
//!
//! The body is a single zlib stream (the framing the original tooling emits),
//! decompressed against an expected length declared by the header. The adapter
//! has no retry or partial-output contract: the underlying codec either
//! produces exactly the requested bytes or the call fails.

use std::io::{Read, Write};

use flate2::bufread::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::error::{Result, SnapshotError};
use crate::io::try_zeroed_vec;

/// Worst-case zlib output for `len` input bytes: stored-block expansion plus
/// stream framing, rounded up generously.
pub fn compress_bound(len: usize) -> usize {
    len.saturating_add(len / 255).saturating_add(64)
}

pub fn compress(input: &[u8]) -> Result<Vec<u8>> {
    let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
    enc.write_all(input).map_err(SnapshotError::Compress)?;
    enc.finish().map_err(SnapshotError::Compress)
}

/// Decompress `input` into exactly `expected_len` bytes. Streams that are
/// corrupt, produce fewer bytes, or would produce more all fail.
pub fn decompress_exact(input: &[u8], expected_len: usize) -> Result<Vec<u8>> {
    let mut out = try_zeroed_vec(expected_len)?;
    let mut dec = ZlibDecoder::new(input);
    dec.read_exact(&mut out).map_err(SnapshotError::Decompress)?;

    let mut probe = [0u8; 1];
    match dec.read(&mut probe) {
        Ok(0) => Ok(out),
        Ok(_) => Err(SnapshotError::Corrupt(
            "decompressed body larger than declared data_size",
        )),
        Err(err) => Err(SnapshotError::Decompress(err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let input: Vec<u8> = (0..4096u32).map(|i| (i * 7) as u8).collect();
        let packed = compress(&input).unwrap();
        assert_eq!(decompress_exact(&packed, input.len()).unwrap(), input);
    }

    #[test]
    fn bound_covers_incompressible_data() {
        // A counter stream with a large stride compresses poorly.
        let input: Vec<u8> = (0..65536u32).map(|i| (i.wrapping_mul(2654435761) >> 13) as u8).collect();
        let packed = compress(&input).unwrap();
        assert!(packed.len() <= compress_bound(input.len()));
    }

    #[test]
    fn wrong_expected_length_fails() {
        let input = vec![0x41u8; 1024];
        let packed = compress(&input).unwrap();
        assert!(decompress_exact(&packed, 1023).is_err());
        assert!(decompress_exact(&packed, 1025).is_err());
    }

    #[test]
    fn garbage_stream_fails() {
        assert!(decompress_exact(&[0xde, 0xad, 0xbe, 0xef], 16).is_err());
    }

    #[test]
    fn truncated_stream_fails() {
        let input = vec![0x42u8; 2048];
        let packed = compress(&input).unwrap();
        assert!(decompress_exact(&packed[..packed.len() / 2], input.len()).is_err());
    }
}
