//! Assembly of the output sfnt binary: offset table, sorted directory,
//! padded tables and checksums.
//!
//! <https://learn.microsoft.com/en-us/typography/opentype/spec/otff>

use std::borrow::Cow;

use bytes::BufMut;
use font_types::Tag;

use crate::error::DecodeError;
use crate::tags;

const OFFSET_TABLE_SIZE: usize = 12;
const DIRECTORY_ENTRY_SIZE: usize = 16;
const CHECKSUM_ADJUSTMENT_MAGIC: u32 = 0xB1B0_AFBA;

/// A fully reconstructed table ready for layout.
pub(crate) struct DecodedTable<'a> {
    pub tag: Tag,
    pub data: Cow<'a, [u8]>,
}

/// Lay out the final sfnt binary.
///
/// Expects any `head` table to arrive with its checkSumAdjustment field
/// zeroed; the adjustment is recomputed here from the whole-file checksum.
pub(crate) fn assemble(
    flavor: Tag,
    mut tables: Vec<DecodedTable<'_>>,
) -> Result<Vec<u8>, DecodeError> {
    let too_large = || DecodeError::TransformReconstructionFailure("assembled font exceeds 4 GiB");

    check_flavor(flavor, &tables)?;
    tables.sort_by_key(|table| table.tag);

    let directory_size = OFFSET_TABLE_SIZE + DIRECTORY_ENTRY_SIZE * tables.len();
    let mut total_size = directory_size;
    for table in &tables {
        let padded = align4(table.data.len()).ok_or_else(too_large)?;
        total_size = total_size.checked_add(padded).ok_or_else(too_large)?;
    }
    u32::try_from(total_size).map_err(|_| too_large())?;

    let mut out: Vec<u8> = Vec::with_capacity(total_size);
    write_offset_table(&mut out, flavor, tables.len() as u16);

    // Offsets and checksums are known up front, so directory entries are
    // written with final values rather than zeroed and patched.
    let mut offsets: Vec<usize> = Vec::with_capacity(tables.len());
    let mut offset = directory_size;
    for table in &tables {
        offsets.push(offset);
        out.put_u32(u32::from_be_bytes(table.tag.to_be_bytes()));
        out.put_u32(checksum(&table.data));
        out.put_u32(offset as u32);
        out.put_u32(table.data.len() as u32);
        // align4 cannot fail here: total_size already covered every table.
        offset += align4(table.data.len()).unwrap_or(table.data.len());
    }
    for table in &tables {
        out.extend_from_slice(&table.data);
        let padded = align4(out.len()).unwrap_or(out.len());
        out.resize(padded, 0);
    }

    // The 'head' table is special-cased in checksum calculations: its
    // checkSumAdjustment is derived from the checksum of the entire font
    // and written back last.
    // <https://learn.microsoft.com/en-us/typography/opentype/spec/otff#calculating-checksums>
    if let Some(head_pos) = tables.iter().position(|table| table.tag == tags::HEAD) {
        let adjustment = CHECKSUM_ADJUSTMENT_MAGIC.wrapping_sub(checksum(&out));
        let field = offsets[head_pos] + 8;
        out[field..field + 4].copy_from_slice(&adjustment.to_be_bytes());
    }

    Ok(out)
}

/// The deferred header check: the declared flavor must match the outline
/// format actually present in the table set.
fn check_flavor(flavor: Tag, tables: &[DecodedTable<'_>]) -> Result<(), DecodeError> {
    let err = DecodeError::InconsistentFlavor;
    let has_glyf = tables.iter().any(|table| table.tag == tags::GLYF);
    let has_cff = tables.iter().any(|table| table.tag == tags::CFF);
    if flavor == tags::OTTO_FLAVOR {
        if !has_cff {
            return Err(err("OTTO flavor without a CFF table"));
        }
        if has_glyf {
            return Err(err("OTTO flavor with a glyf table"));
        }
    } else {
        if !has_glyf {
            return Err(err("TrueType flavor without a glyf table"));
        }
        if has_cff {
            return Err(err("TrueType flavor with a CFF table"));
        }
    }
    Ok(())
}

fn write_offset_table(out: &mut impl BufMut, flavor: Tag, num_tables: u16) {
    // searchRange is the largest power of two <= numTables, times 16.
    let mut max_pow2: u16 = 0;
    while 1u32 << (max_pow2 + 1) <= u32::from(num_tables) {
        max_pow2 += 1;
    }
    let search_range: u16 = (1u16 << max_pow2) << 4;
    let entry_selector = max_pow2;
    let range_shift = ((u32::from(num_tables) << 4) - u32::from(search_range)) as u16;

    out.put_u32(u32::from_be_bytes(flavor.to_be_bytes()));
    out.put_u16(num_tables);
    out.put_u16(search_range);
    out.put_u16(entry_selector);
    out.put_u16(range_shift);
}

/// sfnt table checksum: the big-endian u32 word sum, with a trailing partial
/// word treated as zero-padded to 4 bytes.
pub(crate) fn checksum(data: &[u8]) -> u32 {
    let mut sum: u32 = 0;
    let mut chunks = data.chunks_exact(4);
    for chunk in &mut chunks {
        sum = sum.wrapping_add(u32::from_be_bytes(chunk.try_into().unwrap()));
    }
    let remainder = chunks.remainder();
    if !remainder.is_empty() {
        let mut tail = [0u8; 4];
        tail[..remainder.len()].copy_from_slice(remainder);
        sum = sum.wrapping_add(u32::from_be_bytes(tail));
    }
    sum
}

fn align4(n: usize) -> Option<usize> {
    n.checked_add(3).map(|padded| padded & !3)
}
