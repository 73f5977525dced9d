//! The decompression boundary.
//!
//! The core never links a compressor directly: it consumes an injected
//! [`Decompressor`] capability with a narrow contract, so the pipeline can be
//! unit-tested against a deterministic fake. The default implementation wraps
//! the `brotli-decompressor` crate behind the `brotli` feature.

use crate::error::DecodeError;

// Over large font corpora the highest compression ratio observed in practice
// is around 20. Anything past 100 indicates a hostile declared size, so we
// refuse to allocate for it.
const MAX_PLAUSIBLE_COMPRESSION_RATIO: usize = 100;

/// Opaque failure from a [`Decompressor`] implementation.
///
/// The adapter does not distinguish causes: a wrong codec, a corrupt or
/// truncated stream and an output overrun all surface as
/// [`DecodeError::DecompressionFailure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecompressError;

/// An injected general-purpose decompression capability.
pub trait Decompressor {
    /// Decompress `data`, which is expected to expand to exactly
    /// `expected_len` bytes. Implementations may treat `expected_len` as an
    /// output bound; the adapter re-checks the exact length either way.
    fn decompress(&self, data: &[u8], expected_len: usize) -> Result<Vec<u8>, DecompressError>;
}

/// [`Decompressor`] backed by the pure-Rust `brotli-decompressor` crate.
#[cfg(feature = "brotli")]
pub struct Brotli;

#[cfg(feature = "brotli")]
impl Decompressor for Brotli {
    fn decompress(&self, data: &[u8], expected_len: usize) -> Result<Vec<u8>, DecompressError> {
        use std::io::Write as _;

        let mut output: Vec<u8> = Vec::with_capacity(expected_len);
        let sink = CappedWriter {
            output: &mut output,
            limit: expected_len,
        };
        let mut decompressor = brotli_decompressor::DecompressorWriter::new(sink, 4096);
        decompressor.write_all(data).map_err(|_| DecompressError)?;
        decompressor.close().map_err(|_| DecompressError)?;
        drop(decompressor);
        Ok(output)
    }
}

/// Write sink that refuses to grow past `limit`, so a hostile stream cannot
/// allocate beyond the declared output size while decoding.
#[cfg(feature = "brotli")]
struct CappedWriter<'a> {
    output: &'a mut Vec<u8>,
    limit: usize,
}

#[cfg(feature = "brotli")]
impl std::io::Write for CappedWriter<'_> {
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        // Every prefix of a stream that fits the limit also fits, so an
        // all-or-nothing check never rejects a conforming stream.
        if data.len() > self.limit - self.output.len() {
            return Err(std::io::Error::other("output exceeds the declared size"));
        }
        self.output.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Decompress the single WOFF2 data block and validate its exact size.
///
/// `expected_len` is the sum of effective table lengths from the directory;
/// the decompressed stream must match it with no gap and no excess.
pub(crate) fn decompress_table_data(
    compressed: &[u8],
    expected_len: usize,
    decompressor: &dyn Decompressor,
) -> Result<Vec<u8>, DecodeError> {
    let err = DecodeError::DecompressionFailure;

    // Allocation guard: the expected size comes from attacker-controlled
    // directory fields, so bound it against the bytes actually present.
    let plausible_cap = compressed
        .len()
        .saturating_mul(MAX_PLAUSIBLE_COMPRESSION_RATIO);
    if expected_len > plausible_cap {
        return Err(err("implausible compression ratio"));
    }

    let data = decompressor
        .decompress(compressed, expected_len)
        .map_err(|_| err("corrupt or non-Brotli data block"))?;
    if data.len() != expected_len {
        return Err(err("decompressed size does not match the directory"));
    }
    Ok(data)
}
