//! Whole-file block layout: compressed table data, optional extended
//! metadata, optional private data.
//!
//! Blocks appear in that order, each (other than the last) padded to a
//! 4-byte boundary before the next, and the last block must end exactly at
//! the declared file length. Trailing padding after the final block is not
//! permitted.

use crate::error::DecodeError;
use crate::header::{HEADER_SIZE, WoffHeader};

// Inputs are bounded by u32 fields, so u64 arithmetic cannot overflow here.
fn align4(n: u64) -> u64 {
    (n + 3) & !3
}

/// Check that the header's block offsets and lengths tile the file.
pub(crate) fn validate_block_layout(
    header: &WoffHeader,
    directory_size: usize,
) -> Result<(), DecodeError> {
    let err = DecodeError::BlockLayoutFailure;
    let length = u64::from(header.length);

    let data_end =
        HEADER_SIZE as u64 + directory_size as u64 + u64::from(header.total_compressed_size);
    if data_end > length {
        return Err(err("compressed table data extends past the file"));
    }

    // A zero length means the block is absent; its offset field is then
    // meaningless and ignored.
    let meta = (header.meta_length != 0)
        .then(|| (u64::from(header.meta_offset), u64::from(header.meta_length)));
    let private = (header.priv_length != 0)
        .then(|| (u64::from(header.priv_offset), u64::from(header.priv_length)));

    // End of the last block accounted for so far, before padding.
    let mut end = data_end;
    if let Some((offset, len)) = meta {
        if offset != align4(data_end) {
            return Err(err("metadata does not follow the padded table data"));
        }
        end = offset + len;
        if end > length {
            return Err(err("metadata extends past the file"));
        }
    }

    match private {
        Some((offset, len)) => {
            // Padding exists only between blocks: metadata followed by
            // private data must itself be padded.
            if offset != align4(end) {
                return Err(err("private data does not follow the padded preceding block"));
            }
            if offset + len != length {
                return Err(err("private data does not end at the file length"));
            }
        }
        None => {
            if end != length {
                return Err(err(if meta.is_some() {
                    "trailing bytes after the metadata"
                } else {
                    "trailing bytes after the table data"
                }));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use font_types::Tag;

    // directory_size fixed at 4 in these tests; table data ends at 62.
    const DIRECTORY_SIZE: usize = 4;
    const DATA_END: u32 = 62;

    fn header(
        length: u32,
        compressed: u32,
        meta: Option<(u32, u32)>,
        private: Option<(u32, u32)>,
    ) -> WoffHeader {
        WoffHeader {
            signature: Tag::new(b"wOF2"),
            flavor: Tag::from_u32(0x00010000),
            length,
            num_tables: 1,
            reserved: 0,
            total_sfnt_size: 0,
            total_compressed_size: compressed,
            major_version: 1,
            minor_version: 0,
            meta_offset: meta.map_or(0, |(offset, _)| offset),
            meta_length: meta.map_or(0, |(_, len)| len),
            meta_orig_length: meta.map_or(0, |(_, len)| len * 2),
            priv_offset: private.map_or(0, |(offset, _)| offset),
            priv_length: private.map_or(0, |(_, len)| len),
        }
    }

    fn validate(header: &WoffHeader) -> Result<(), DecodeError> {
        validate_block_layout(header, DIRECTORY_SIZE)
    }

    #[test]
    fn data_only_must_end_at_length() {
        assert!(validate(&header(DATA_END, 10, None, None)).is_ok());
        // 4 stray bytes after the table data.
        assert!(validate(&header(DATA_END + 4, 10, None, None)).is_err());
        // Data block running past the file.
        assert!(validate(&header(DATA_END - 4, 10, None, None)).is_err());
    }

    #[test]
    fn metadata_follows_padded_data() {
        // data_end 62 pads to 64.
        assert!(validate(&header(74, 10, Some((64, 10)), None)).is_ok());
        // Unpadded last metadata block: nothing follows, so no padding due.
        assert!(validate(&header(73, 10, Some((64, 9)), None)).is_ok());
        // Metadata placed at the unpadded data end.
        assert!(validate(&header(72, 10, Some((62, 10)), None)).is_err());
        // Gap beyond the padding.
        assert!(validate(&header(78, 10, Some((68, 10)), None)).is_err());
    }

    #[test]
    fn private_data_must_close_the_file() {
        assert!(validate(&header(72, 10, None, Some((64, 8)))).is_ok());
        // 4 stray null bytes after the private block.
        assert!(validate(&header(76, 10, None, Some((64, 8)))).is_err());
        // Private data short of the declared length.
        assert!(validate(&header(76, 10, None, Some((64, 6)))).is_err());
    }

    #[test]
    fn metadata_then_private_data() {
        // meta 64..73, pads to 76, private 76..80.
        assert!(validate(&header(80, 10, Some((64, 9)), Some((76, 4)))).is_ok());
        // Private data abutting unpadded metadata.
        assert!(validate(&header(77, 10, Some((64, 9)), Some((73, 4)))).is_err());
    }

    #[test]
    fn zero_length_means_absent_regardless_of_offset() {
        let mut bad_offset = header(DATA_END, 10, None, None);
        bad_offset.meta_offset = 0xdead_beef;
        assert!(validate(&bad_offset).is_ok());

        let mut bad_priv = header(DATA_END, 10, None, None);
        bad_priv.priv_offset = 12345;
        assert!(validate(&bad_priv).is_ok());
    }

    #[test]
    fn trailing_bytes_after_metadata() {
        assert!(validate(&header(78, 10, Some((64, 10)), None)).is_err());
    }
}
