use thiserror::Error;

use crate::varint::VarIntError;

/// A WOFF2 decode failure.
///
/// Each variant corresponds to one stage of the decode pipeline and carries a
/// static description of the specific rule that was violated. All failures
/// are terminal for the call: no partial output is produced, and a
/// structurally invalid file cannot become valid by retrying.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Signature, reserved-field, numTables or declared-length violation.
    #[error("malformed WOFF2 header: {0}")]
    MalformedHeader(&'static str),
    /// Declared flavor mismatched against the actual glyf/CFF table set.
    #[error("inconsistent flavor: {0}")]
    InconsistentFlavor(&'static str),
    /// Bad flags, bad varint, duplicate tag or transform-length violation.
    #[error("malformed table directory entry: {0}")]
    MalformedDirectoryEntry(&'static str),
    /// Wrong codec, corrupt stream, or output-length mismatch.
    #[error("decompression failed: {0}")]
    DecompressionFailure(&'static str),
    /// Gap or leftover bytes in the decompressed table data stream.
    #[error("table slicing failed: {0}")]
    TableSlicingFailure(&'static str),
    /// Structural violation while rebuilding glyf, loca or hmtx, or while
    /// assembling the reconstructed tables into the output font.
    #[error("transform reconstruction failed: {0}")]
    TransformReconstructionFailure(&'static str),
    /// Metadata/private-data ordering, padding or extraneous-byte violation.
    #[error("invalid block layout: {0}")]
    BlockLayoutFailure(&'static str),
}

/// Fieldless mirror of [`DecodeError`], handy for table-driven tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    MalformedHeader,
    InconsistentFlavor,
    MalformedDirectoryEntry,
    DecompressionFailure,
    TableSlicingFailure,
    TransformReconstructionFailure,
    BlockLayoutFailure,
}

impl DecodeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MalformedHeader(_) => ErrorKind::MalformedHeader,
            Self::InconsistentFlavor(_) => ErrorKind::InconsistentFlavor,
            Self::MalformedDirectoryEntry(_) => ErrorKind::MalformedDirectoryEntry,
            Self::DecompressionFailure(_) => ErrorKind::DecompressionFailure,
            Self::TableSlicingFailure(_) => ErrorKind::TableSlicingFailure,
            Self::TransformReconstructionFailure(_) => ErrorKind::TransformReconstructionFailure,
            Self::BlockLayoutFailure(_) => ErrorKind::BlockLayoutFailure,
        }
    }
}

// Transform reconstruction dominates the raw read count, so short reads and
// varint violations convert to `TransformReconstructionFailure` by default.
// Stages with a different error kind (header, directory) map explicitly at
// the call site instead of using `?` on these.

impl From<bytes::TryGetError> for DecodeError {
    fn from(_: bytes::TryGetError) -> Self {
        Self::TransformReconstructionFailure("transform stream ended early")
    }
}

impl From<VarIntError> for DecodeError {
    fn from(err: VarIntError) -> Self {
        Self::TransformReconstructionFailure(match err {
            VarIntError::UnexpectedEof => "transform stream ended early",
            VarIntError::NonCanonical => "non-canonical variable-length integer",
            VarIntError::Overflow => "variable-length integer overflow",
        })
    }
}

pub(crate) fn usize_will_overflow(a: usize, b: usize) -> bool {
    a.checked_add(b).is_none()
}

pub(crate) fn u32_will_overflow(a: u32, b: u32) -> bool {
    a.checked_add(b).is_none()
}
