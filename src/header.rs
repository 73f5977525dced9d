//! The fixed 48-byte WOFF2 header.

use bytes::Buf;
use font_types::Tag;

use crate::error::DecodeError;
use crate::tags;

pub(crate) const HEADER_SIZE: usize = 48;

/// Parsed WOFF2 file header.
///
/// <https://www.w3.org/TR/WOFF2/#woff20Header>
pub(crate) struct WoffHeader {
    /// Always `wOF2`.
    pub signature: Tag,
    /// The "sfnt version" of the packed font: 0x00010000 for TrueType
    /// outlines, `OTTO` for CFF outlines.
    pub flavor: Tag,
    /// Total size of the WOFF file. Must equal the actual input size.
    pub length: u32,
    /// Number of entries in the table directory.
    pub num_tables: u16,
    /// Reserved; must be 0.
    pub reserved: u16,
    /// Declared size of the uncompressed font. Treated as a hint only.
    pub total_sfnt_size: u32,
    /// Length of the single compressed data block.
    pub total_compressed_size: u32,
    pub major_version: u16,
    pub minor_version: u16,
    /// Offset to the extended metadata block, 0 if absent.
    pub meta_offset: u32,
    /// Compressed length of the metadata block, 0 if absent.
    pub meta_length: u32,
    /// Uncompressed length of the metadata block.
    pub meta_orig_length: u32,
    /// Offset to the private data block, 0 if absent.
    pub priv_offset: u32,
    /// Length of the private data block, 0 if absent.
    pub priv_length: u32,
}

impl WoffHeader {
    /// Parse and validate the header.
    ///
    /// `input` must cover the whole WOFF2 file: the declared `length` is
    /// checked against `input.remaining()` and any mismatch in either
    /// direction is rejected. The flavor/table-set cross-check needs the
    /// parsed directory and is deferred to assembly.
    pub fn parse(input: &mut impl Buf) -> Result<Self, DecodeError> {
        let err = DecodeError::MalformedHeader;

        let input_len = input.remaining();
        if input_len < HEADER_SIZE {
            return Err(err("file shorter than the fixed header"));
        }

        let header = Self {
            signature: Tag::from_u32(input.get_u32()),
            flavor: Tag::from_u32(input.get_u32()),
            length: input.get_u32(),
            num_tables: input.get_u16(),
            reserved: input.get_u16(),
            total_sfnt_size: input.get_u32(),
            total_compressed_size: input.get_u32(),
            major_version: input.get_u16(),
            minor_version: input.get_u16(),
            meta_offset: input.get_u32(),
            meta_length: input.get_u32(),
            meta_orig_length: input.get_u32(),
            priv_offset: input.get_u32(),
            priv_length: input.get_u32(),
        };

        if header.signature != tags::WOFF2_SIGNATURE {
            return Err(err("bad signature"));
        }
        if header.reserved != 0 {
            return Err(err("reserved field is non-zero"));
        }
        if header.num_tables == 0 {
            return Err(err("numTables is zero"));
        }
        if header.length as usize != input_len {
            return Err(err("declared length does not match actual input size"));
        }
        // The data model has no collection directory, so a TrueType
        // collection cannot be decoded correctly. Fail closed instead.
        if header.flavor == tags::TTC_FLAVOR {
            return Err(err("font collections are not supported"));
        }

        Ok(header)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BufMut;

    fn valid_header_bytes() -> Vec<u8> {
        let mut out = Vec::new();
        out.put_slice(b"wOF2");
        out.put_u32(0x00010000); // flavor
        out.put_u32(HEADER_SIZE as u32); // length
        out.put_u16(1); // numTables
        out.put_u16(0); // reserved
        out.put_u32(100); // totalSfntSize
        out.put_u32(0); // totalCompressedSize
        out.put_u16(1); // majorVersion
        out.put_u16(0); // minorVersion
        out.put_u32(0); // metaOffset
        out.put_u32(0); // metaLength
        out.put_u32(0); // metaOrigLength
        out.put_u32(0); // privOffset
        out.put_u32(0); // privLength
        out
    }

    fn parse(bytes: &[u8]) -> Result<WoffHeader, DecodeError> {
        let mut input = bytes;
        WoffHeader::parse(&mut input)
    }

    #[test]
    fn parses_valid_header() {
        let header = parse(&valid_header_bytes()).unwrap();
        assert_eq!(header.flavor, Tag::from_u32(0x00010000));
        assert_eq!(header.num_tables, 1);
        assert_eq!(header.meta_length, 0);
    }

    #[test]
    fn rejects_bad_signature() {
        let mut bytes = valid_header_bytes();
        bytes[..4].copy_from_slice(b"wOFF");
        assert!(matches!(parse(&bytes), Err(DecodeError::MalformedHeader(_))));
    }

    #[test]
    fn rejects_nonzero_reserved() {
        let mut bytes = valid_header_bytes();
        bytes[14..16].copy_from_slice(&1u16.to_be_bytes());
        assert!(matches!(parse(&bytes), Err(DecodeError::MalformedHeader(_))));
    }

    #[test]
    fn rejects_zero_num_tables() {
        let mut bytes = valid_header_bytes();
        bytes[12..14].copy_from_slice(&0u16.to_be_bytes());
        assert!(matches!(parse(&bytes), Err(DecodeError::MalformedHeader(_))));
    }

    #[test]
    fn rejects_length_mismatch_either_direction() {
        // Declared length 4 bytes short of the actual buffer.
        let mut bytes = valid_header_bytes();
        bytes.extend_from_slice(&[0; 4]);
        assert!(matches!(parse(&bytes), Err(DecodeError::MalformedHeader(_))));

        // Declared length 4 bytes longer than the actual buffer.
        let mut bytes = valid_header_bytes();
        let declared = (bytes.len() + 4) as u32;
        bytes[8..12].copy_from_slice(&declared.to_be_bytes());
        assert!(matches!(parse(&bytes), Err(DecodeError::MalformedHeader(_))));
    }

    #[test]
    fn rejects_collection_flavor() {
        let mut bytes = valid_header_bytes();
        bytes[4..8].copy_from_slice(b"ttcf");
        assert!(matches!(parse(&bytes), Err(DecodeError::MalformedHeader(_))));
    }

    #[test]
    fn rejects_truncated_header() {
        let bytes = valid_header_bytes();
        assert!(matches!(
            parse(&bytes[..40]),
            Err(DecodeError::MalformedHeader(_))
        ));
    }
}
