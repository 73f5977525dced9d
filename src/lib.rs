//! Decoding of WOFF2-packed web fonts back into byte-exact sfnt
//! (TrueType/OpenType) binaries.
//!
//! The decoder is a pure function of its input: no I/O, no shared state, and
//! a deterministic output for a given input. Valid files round-trip to a
//! canonical sfnt with sorted, 4-byte-padded tables and recomputed
//! checksums; anything malformed fails with a categorised [`DecodeError`]
//! rather than a partial font.
//!
//! [`decode`] uses the bundled Brotli backend. [`decode_with`] accepts any
//! [`Decompressor`], which keeps the parsing and reconstruction pipeline
//! testable without real compressed data.

mod decompress;
mod directory;
mod error;
mod glyf;
mod header;
mod hmtx;
mod layout;
mod sfnt;
mod slicer;
mod tags;
mod varint;

use std::borrow::Cow;

#[cfg(feature = "brotli")]
pub use crate::decompress::Brotli;
pub use crate::decompress::{DecompressError, Decompressor};
pub use crate::error::{DecodeError, ErrorKind};

use crate::directory::TableDirectory;
use crate::glyf::GlyfLoca;
use crate::header::WoffHeader;
use crate::sfnt::DecodedTable;

/// Decode a complete WOFF2 file into an sfnt binary.
#[cfg(feature = "brotli")]
pub fn decode(data: &[u8]) -> Result<Vec<u8>, DecodeError> {
    decode_with(data, &Brotli)
}

/// Decode a complete WOFF2 file with an injected decompression capability.
pub fn decode_with(data: &[u8], decompressor: &dyn Decompressor) -> Result<Vec<u8>, DecodeError> {
    let mut input = data;
    let header = WoffHeader::parse(&mut input)?;
    let directory = TableDirectory::parse(&mut input, header.num_tables)?;
    layout::validate_block_layout(&header, directory.byte_size)?;

    // The single compressed block starts right after the directory. The
    // layout check has already bounded it against the declared file length.
    let compressed = input
        .get(..header.total_compressed_size as usize)
        .ok_or(DecodeError::DecompressionFailure(
            "compressed block extends past the end of the file",
        ))?;
    let table_data = decompress::decompress_table_data(
        compressed,
        directory.total_data_size,
        decompressor,
    )?;
    let slices = slicer::slice_tables(&table_data, &directory)?;

    reconstruct_and_assemble(&header, &directory, &slices)
}

/// Undo per-table transforms, then hand the finished table set to the sfnt
/// assembler.
fn reconstruct_and_assemble(
    header: &WoffHeader,
    directory: &TableDirectory,
    slices: &[&[u8]],
) -> Result<Vec<u8>, DecodeError> {
    let err = DecodeError::TransformReconstructionFailure;

    // glyf and loca travel as a pair with a shared transform state; a
    // transformed pair is reconstructed in one pass from the glyf stream.
    let mut glyf_loca: Option<GlyfLoca> = match (
        directory.find(tags::GLYF),
        directory.find(tags::LOCA),
    ) {
        (Some((glyf_index, glyf_entry)), Some((_, loca_entry))) => {
            if glyf_entry.transformed != loca_entry.transformed {
                return Err(err("glyf and loca must share a transform state"));
            }
            glyf_entry
                .transformed
                .then(|| glyf::reconstruct_glyf_loca(slices[glyf_index], loca_entry.orig_length))
                .transpose()?
        }
        (None, None) => None,
        _ => return Err(err("glyf and loca must appear together")),
    };

    let mut tables: Vec<DecodedTable> = Vec::with_capacity(directory.entries.len());
    for (index, entry) in directory.entries.iter().enumerate() {
        let data: Cow<[u8]> = if entry.transformed {
            match entry.tag {
                tags::GLYF => {
                    let pair = glyf_loca.as_mut().ok_or(err("missing glyf reconstruction"))?;
                    Cow::Owned(std::mem::take(&mut pair.glyf))
                }
                tags::LOCA => {
                    let pair = glyf_loca.as_mut().ok_or(err("missing glyf reconstruction"))?;
                    Cow::Owned(std::mem::take(&mut pair.loca))
                }
                tags::HMTX => {
                    // hmtx reconstruction needs glyph bounding boxes, which
                    // only a transformed glyf provides.
                    let pair = glyf_loca
                        .as_ref()
                        .ok_or(err("transformed hmtx requires a transformed glyf"))?;
                    let num_hmetrics = read_num_hmetrics(directory, slices)?;
                    Cow::Owned(hmtx::reconstruct_hmtx(
                        slices[index],
                        pair.num_glyphs,
                        num_hmetrics,
                        &pair.x_mins,
                    )?)
                }
                // Unreachable: the directory parser rejects transform
                // versions on any other table.
                _ => return Err(err("transform on a non-transformable table")),
            }
        } else if entry.tag == tags::HEAD {
            // checkSumAdjustment is recomputed at assembly; hand the
            // assembler a head table with the field zeroed.
            if slices[index].len() < 12 {
                return Err(err("head table shorter than its fixed fields"));
            }
            let mut head = slices[index].to_vec();
            head[8..12].fill(0);
            Cow::Owned(head)
        } else {
            Cow::Borrowed(slices[index])
        };

        tables.push(DecodedTable {
            tag: entry.tag,
            data,
        });
    }

    sfnt::assemble(header.flavor, tables)
}

/// hhea.numberOfHMetrics, read from the raw hhea bytes at offset 34.
fn read_num_hmetrics(
    directory: &TableDirectory,
    slices: &[&[u8]],
) -> Result<u16, DecodeError> {
    let err = DecodeError::TransformReconstructionFailure;
    let (hhea_index, _) = directory
        .find(tags::HHEA)
        .ok_or(err("transformed hmtx requires an hhea table"))?;
    let field = slices[hhea_index]
        .get(34..36)
        .ok_or(err("hhea too short for numberOfHMetrics"))?;
    Ok(u16::from_be_bytes([field[0], field[1]]))
}
