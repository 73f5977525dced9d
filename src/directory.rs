//! The WOFF2 table directory.

use bytes::Buf;
use font_types::Tag;

use crate::error::{DecodeError, usize_will_overflow};
use crate::tags;
use crate::varint::BufWoff2Ext as _;

/// One parsed directory entry.
///
/// <https://www.w3.org/TR/WOFF2/#table_dir_format>
#[derive(Clone)]
pub(crate) struct TableEntry {
    /// 4-byte table tag, from the known-tag table or an explicit field.
    pub tag: Tag,
    /// Whether a transform was applied to this table before compression.
    ///
    /// For `glyf`/`loca`, transform version 0 means transformed and 3 the
    /// null transform. For `hmtx` version 1 means transformed. All other
    /// version values are reserved, and for every remaining table only the
    /// null transform (version 0) exists.
    pub transformed: bool,
    /// Length of the original table.
    pub orig_length: u32,
    /// Length of the transformed representation. Only declared when a
    /// transform applies.
    pub transform_length: Option<u32>,
    /// Byte offset of this table inside the decompressed data stream.
    pub offset: usize,
}

impl TableEntry {
    /// Number of bytes this table occupies in the decompressed stream.
    pub fn compressed_stream_length(&self) -> u32 {
        self.transform_length.unwrap_or(self.orig_length)
    }

    fn parse(input: &mut impl Buf) -> Result<Self, DecodeError> {
        let err = DecodeError::MalformedDirectoryEntry;

        let flags = input
            .try_get_u8()
            .map_err(|_| err("directory ended early"))?;
        let version = flags >> 6;
        let tag = match tags::KNOWN_TAGS.get(usize::from(flags & 0x3f)) {
            Some(&tag) => tag,
            // Index 63 signals an explicit tag field.
            None => Tag::from_u32(
                input
                    .try_get_u32()
                    .map_err(|_| err("directory ended early"))?,
            ),
        };

        let transformed = match tag {
            tags::GLYF | tags::LOCA => match version {
                0 => true,
                3 => false,
                _ => return Err(err("reserved glyf/loca transform version")),
            },
            tags::HMTX => match version {
                0 => false,
                1 => true,
                _ => return Err(err("reserved hmtx transform version")),
            },
            _ => match version {
                0 => false,
                _ => return Err(err("transform version on a non-transformable table")),
            },
        };

        let orig_length = input
            .read_base128()
            .map_err(|_| err("bad origLength varint"))?;
        let transform_length = if transformed {
            Some(
                input
                    .read_base128()
                    .map_err(|_| err("bad transformLength varint"))?,
            )
        } else {
            None
        };

        // A transformed loca is fully derived from the transformed glyf and
        // carries no bytes of its own.
        if tag == tags::LOCA && transform_length.is_some_and(|len| len != 0) {
            return Err(err("transformed loca must have a zero transformLength"));
        }

        Ok(Self {
            tag,
            transformed,
            orig_length,
            transform_length,
            offset: 0, // assigned by TableDirectory::parse
        })
    }
}

pub(crate) struct TableDirectory {
    /// Entries in their physical (parse) order.
    pub entries: Vec<TableEntry>,
    /// Size of the encoded directory in bytes.
    pub byte_size: usize,
    /// Exact expected size of the decompressed data stream: the sum of each
    /// entry's transformLength (when a transform applies) or origLength.
    pub total_data_size: usize,
}

impl TableDirectory {
    pub fn parse(input: &mut impl Buf, num_tables: u16) -> Result<Self, DecodeError> {
        let err = DecodeError::MalformedDirectoryEntry;
        let initial_remaining = input.remaining();

        // Tables are laid out back to back in the decompressed stream in
        // directory order, so each entry's offset is the running sum of the
        // effective lengths before it.
        let mut offset: usize = 0;
        let mut entries = Vec::with_capacity(usize::from(num_tables));
        for _ in 0..num_tables {
            let mut entry = TableEntry::parse(input)?;
            entry.offset = offset;

            let length = entry.compressed_stream_length() as usize;
            if usize_will_overflow(offset, length) {
                return Err(err("table lengths overflow"));
            }
            offset += length;

            entries.push(entry);
        }

        let mut seen: Vec<Tag> = entries.iter().map(|entry| entry.tag).collect();
        seen.sort_unstable();
        if seen.windows(2).any(|pair| pair[0] == pair[1]) {
            return Err(err("duplicate table tag"));
        }

        // When both glyf and loca are transformed the pair must be adjacent,
        // glyf first, so that loca reconstruction can piggyback on glyf.
        let glyf_pos = entries
            .iter()
            .position(|e| e.tag == tags::GLYF && e.transformed);
        let loca_pos = entries
            .iter()
            .position(|e| e.tag == tags::LOCA && e.transformed);
        if let (Some(glyf_pos), Some(loca_pos)) = (glyf_pos, loca_pos) {
            if loca_pos != glyf_pos + 1 {
                return Err(err("transformed glyf and loca must be adjacent"));
            }
        }

        Ok(Self {
            entries,
            byte_size: initial_remaining - input.remaining(),
            total_data_size: offset,
        })
    }

    pub fn find(&self, tag: Tag) -> Option<(usize, &TableEntry)> {
        self.entries
            .iter()
            .enumerate()
            .find(|(_, entry)| entry.tag == tag)
    }
}
