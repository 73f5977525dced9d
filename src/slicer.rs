//! Partitioning of the decompressed stream into per-table byte ranges.

use crate::directory::TableDirectory;
use crate::error::DecodeError;

/// Slice the decompressed stream into one range per directory entry.
///
/// Ranges are taken in parse order, contiguous and gapless; the cursor must
/// land exactly on the end of the stream. The returned slices are index
/// aligned with `directory.entries`.
pub(crate) fn slice_tables<'a>(
    data: &'a [u8],
    directory: &TableDirectory,
) -> Result<Vec<&'a [u8]>, DecodeError> {
    let err = DecodeError::TableSlicingFailure;

    let mut cursor: usize = 0;
    let mut slices = Vec::with_capacity(directory.entries.len());
    for entry in &directory.entries {
        let end = cursor
            .checked_add(entry.compressed_stream_length() as usize)
            .ok_or(err("table range overflows"))?;
        let slice = data
            .get(cursor..end)
            .ok_or(err("table extends past the decompressed stream"))?;
        slices.push(slice);
        cursor = end;
    }

    if cursor != data.len() {
        return Err(err("leftover bytes after the final table"));
    }

    Ok(slices)
}
