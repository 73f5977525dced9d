//! Reconstruction of the original `glyf` and `loca` tables from WOFF2's
//! transformed glyf representation.
//!
//! <https://www.w3.org/TR/WOFF2/#glyf_table_format>

use arrayvec::ArrayVec;
use bytes::{Buf, BufMut};

use crate::error::{DecodeError, u32_will_overflow};
use crate::varint::BufWoff2Ext as _;

// Simple glyph flag bits, per the OpenType glyf table.
const ON_CURVE_POINT: u8 = 1 << 0;
const X_SHORT_VECTOR: u8 = 1 << 1;
const Y_SHORT_VECTOR: u8 = 1 << 2;
const REPEAT_FLAG: u8 = 1 << 3;
const X_IS_SAME_OR_POSITIVE: u8 = 1 << 4;
const Y_IS_SAME_OR_POSITIVE: u8 = 1 << 5;
const OVERLAP_SIMPLE: u8 = 1 << 6;

// Composite glyph flag bits.
const ARG_1_AND_2_ARE_WORDS: u16 = 1 << 0;
const WE_HAVE_A_SCALE: u16 = 1 << 3;
const MORE_COMPONENTS: u16 = 1 << 5;
const WE_HAVE_AN_X_AND_Y_SCALE: u16 = 1 << 6;
const WE_HAVE_A_TWO_BY_TWO: u16 = 1 << 7;
const WE_HAVE_INSTRUCTIONS: u16 = 1 << 8;

const NUM_SUB_STREAMS: usize = 7;
const OPTION_OVERLAP_SIMPLE_BITMAP: u16 = 1 << 0;

/// The reconstructed pair plus the side data the hmtx decoder depends on.
pub(crate) struct GlyfLoca {
    pub num_glyphs: u16,
    /// Bounding-box x_min of every glyph, in glyph order. 0 for empty glyphs.
    pub x_mins: Vec<i16>,
    pub glyf: Vec<u8>,
    pub loca: Vec<u8>,
}

/// Rebuild byte-exact `glyf` and `loca` tables from a transformed glyf
/// stream. `loca_orig_length` is the directory-declared original length of
/// the loca table; the reconstruction must land on it exactly.
pub(crate) fn reconstruct_glyf_loca(
    data: &[u8],
    loca_orig_length: u32,
) -> Result<GlyfLoca, DecodeError> {
    TransformedGlyf::parse(data)?.reconstruct(loca_orig_length)
}

/// The transform header and its parallel sub-streams.
struct TransformedGlyf<'a> {
    num_glyphs: u16,
    index_format: u16,
    n_contour_stream: &'a [u8],
    n_points_stream: &'a [u8],
    flag_stream: &'a [u8],
    glyph_stream: &'a [u8],
    composite_stream: &'a [u8],
    bbox_bitmap: &'a [u8],
    bbox_stream: &'a [u8],
    instruction_stream: &'a [u8],
    overlap_bitmap: Option<&'a [u8]>,
}

impl<'a> TransformedGlyf<'a> {
    fn parse(data: &'a [u8]) -> Result<Self, DecodeError> {
        let err = DecodeError::TransformReconstructionFailure;

        let mut input = data;
        let _reserved = input.try_get_u16()?;
        let option_flags = input.try_get_u16()?;
        let num_glyphs = input.try_get_u16()?;
        let index_format = input.try_get_u16()?;
        if index_format > 1 {
            return Err(err("unknown loca index format"));
        }

        let mut offset: usize = 8 + NUM_SUB_STREAMS * 4;
        if offset > data.len() {
            return Err(err("transformed glyf shorter than its header"));
        }

        // Invariant from here on: offset <= data.len()
        let mut streams: ArrayVec<&[u8], NUM_SUB_STREAMS> = ArrayVec::new();
        for _ in 0..NUM_SUB_STREAMS {
            let size = input.try_get_u32()? as usize;
            if size > data.len() - offset {
                return Err(err("sub-stream size exceeds transformed glyf"));
            }
            streams.push(&data[offset..offset + size]);
            offset += size;
        }

        // The bbox sub-stream starts with a numGlyphs-long bitmap, padded to
        // a 4-byte boundary, marking glyphs with an explicit bounding box.
        let bitmap_len = ((num_glyphs as usize + 31) >> 5) << 2;
        if bitmap_len > streams[5].len() {
            return Err(err("bbox bitmap exceeds its sub-stream"));
        }
        let (bbox_bitmap, bbox_stream) = streams[5].split_at(bitmap_len);

        let overlap_bitmap = if option_flags & OPTION_OVERLAP_SIMPLE_BITMAP != 0 {
            let len = (num_glyphs as usize + 7) >> 3;
            if len > data.len() - offset {
                return Err(err("overlap bitmap exceeds transformed glyf"));
            }
            Some(&data[offset..offset + len])
        } else {
            None
        };

        Ok(TransformedGlyf {
            num_glyphs,
            index_format,
            n_contour_stream: streams[0],
            n_points_stream: streams[1],
            flag_stream: streams[2],
            glyph_stream: streams[3],
            composite_stream: streams[4],
            bbox_bitmap,
            bbox_stream,
            instruction_stream: streams[6],
            overlap_bitmap,
        })
    }

    fn reconstruct(mut self, loca_orig_length: u32) -> Result<GlyfLoca, DecodeError> {
        let err = DecodeError::TransformReconstructionFailure;
        let num_glyphs = usize::from(self.num_glyphs);

        let mut glyf: Vec<u8> = Vec::with_capacity(num_glyphs * 12);
        let mut loca_offsets: Vec<u32> = Vec::with_capacity(num_glyphs + 1);
        let mut x_mins: Vec<i16> = Vec::with_capacity(num_glyphs);

        for glyph_index in 0..num_glyphs {
            loca_offsets.push(table_offset(&glyf)?);

            let n_contours = self.n_contour_stream.try_get_i16()?;
            let has_explicit_bbox = bit(self.bbox_bitmap, glyph_index);

            let x_min = if n_contours == -1 {
                // Composite bboxes cannot be derived without resolving the
                // referenced components, so the explicit bbox is mandatory.
                if !has_explicit_bbox {
                    return Err(err("composite glyph without an explicit bbox"));
                }
                self.write_composite_glyph(&mut glyf)?
            } else if n_contours > 0 {
                let overlaps = self
                    .overlap_bitmap
                    .is_some_and(|bitmap| bit(bitmap, glyph_index));
                self.write_simple_glyph(n_contours as usize, has_explicit_bbox, overlaps, &mut glyf)?
            } else if n_contours == 0 {
                if has_explicit_bbox {
                    return Err(err("empty glyph with an explicit bbox"));
                }
                0
            } else {
                return Err(err("invalid contour count"));
            };
            x_mins.push(x_min);

            // Glyph records are 4-byte aligned; this also keeps short-format
            // loca offsets even.
            pad4(&mut glyf)?;
        }
        loca_offsets.push(table_offset(&glyf)?);

        let loca = encode_loca(&loca_offsets, self.index_format)?;
        if loca.len() != loca_orig_length as usize {
            return Err(err("reconstructed loca length does not match the directory"));
        }

        Ok(GlyfLoca {
            num_glyphs: self.num_glyphs,
            x_mins,
            glyf,
            loca,
        })
    }

    /// Append a composite glyph record. Returns its x_min.
    fn write_composite_glyph(&mut self, out: &mut Vec<u8>) -> Result<i16, DecodeError> {
        let (component_len, have_instructions) = {
            let mut probe = self.composite_stream;
            measure_components(&mut probe)?
        };

        let instruction_len = if have_instructions {
            self.glyph_stream.read_packed_u16()?
        } else {
            0
        };

        out.put_i16(-1); // numberOfContours
        let x_min = self.copy_explicit_bbox(out)?;
        self.composite_stream.copy_into(component_len, out)?;
        if have_instructions {
            out.put_u16(instruction_len);
            self.instruction_stream
                .copy_into(usize::from(instruction_len), out)?;
        }
        Ok(x_min)
    }

    /// Append a simple glyph rebuilt from point counts, flags and deltas.
    /// Returns its x_min.
    fn write_simple_glyph(
        &mut self,
        n_contours: usize,
        has_explicit_bbox: bool,
        overlaps: bool,
        out: &mut Vec<u8>,
    ) -> Result<i16, DecodeError> {
        let err = DecodeError::TransformReconstructionFailure;

        let mut contour_point_counts: Vec<u16> = Vec::with_capacity(n_contours);
        let mut total_points: u32 = 0;
        for _ in 0..n_contours {
            let count = self.n_points_stream.read_packed_u16()?;
            if u32_will_overflow(total_points, u32::from(count)) {
                return Err(err("point count overflow"));
            }
            total_points += u32::from(count);
            contour_point_counts.push(count);
        }
        if total_points >= 1 << 27 {
            return Err(err("implausible point count"));
        }

        let flag_len = total_points as usize;
        if flag_len > self.flag_stream.len() {
            return Err(err("flag stream ended early"));
        }
        let (flags, rest) = self.flag_stream.split_at(flag_len);

        let mut points = Vec::with_capacity(flag_len);
        let consumed = decode_point_deltas(flags, self.glyph_stream, &mut points)?;
        self.flag_stream = rest;
        self.glyph_stream.advance(consumed);

        let instruction_len = self.glyph_stream.read_packed_u16()?;

        out.put_i16(n_contours as i16);
        let x_min = if has_explicit_bbox {
            self.copy_explicit_bbox(out)?
        } else {
            let bbox = BoundingBox::of(&points);
            bbox.write(out);
            bbox.x_min
        };

        let mut last_point: i32 = -1;
        for &count in &contour_point_counts {
            last_point += i32::from(count);
            if last_point >= 65536 {
                return Err(err("contour end point out of range"));
            }
            out.put_u16(last_point as u16);
        }

        out.put_u16(instruction_len);
        self.instruction_stream
            .copy_into(usize::from(instruction_len), out)?;

        write_point_data(&points, overlaps, out);
        Ok(x_min)
    }

    /// Move one 8-byte explicit bounding box to the output. Returns its x_min.
    fn copy_explicit_bbox(&mut self, out: &mut Vec<u8>) -> Result<i16, DecodeError> {
        if self.bbox_stream.len() < 8 {
            return Err(DecodeError::TransformReconstructionFailure(
                "bbox stream ended early",
            ));
        }
        let x_min = i16::from_be_bytes([self.bbox_stream[0], self.bbox_stream[1]]);
        self.bbox_stream.copy_into(8, out)?;
        Ok(x_min)
    }
}

fn bit(bitmap: &[u8], index: usize) -> bool {
    bitmap[index >> 3] & (0x80 >> (index & 7)) != 0
}

fn table_offset(table: &[u8]) -> Result<u32, DecodeError> {
    u32::try_from(table.len())
        .map_err(|_| DecodeError::TransformReconstructionFailure("glyf table too large"))
}

fn pad4(buf: &mut Vec<u8>) -> Result<(), DecodeError> {
    let padded = buf
        .len()
        .checked_add(3)
        .ok_or(DecodeError::TransformReconstructionFailure(
            "glyf table too large",
        ))?
        & !3;
    buf.resize(padded, 0);
    Ok(())
}

/// Walk component records to find their total size and whether an
/// instruction block follows, without consuming the caller's stream.
fn measure_components(stream: &mut impl Buf) -> Result<(usize, bool), DecodeError> {
    let mut total: usize = 0;
    let mut have_instructions = false;
    let mut flags = MORE_COMPONENTS;
    while flags & MORE_COMPONENTS != 0 {
        flags = stream.try_get_u16()?;
        have_instructions |= flags & WE_HAVE_INSTRUCTIONS != 0;

        let mut arg_len: usize = 2; // glyph index
        arg_len += if flags & ARG_1_AND_2_ARE_WORDS != 0 { 4 } else { 2 };
        if flags & WE_HAVE_A_SCALE != 0 {
            arg_len += 2;
        } else if flags & WE_HAVE_AN_X_AND_Y_SCALE != 0 {
            arg_len += 4;
        } else if flags & WE_HAVE_A_TWO_BY_TWO != 0 {
            arg_len += 8;
        }
        if stream.remaining() < arg_len {
            return Err(DecodeError::TransformReconstructionFailure(
                "composite stream ended early",
            ));
        }
        stream.advance(arg_len);
        total += 2 + arg_len;
    }
    Ok((total, have_instructions))
}

#[derive(Clone, Copy)]
struct GlyphPoint {
    x: i32,
    y: i32,
    on_curve: bool,
}

/// Decode the variable-length (flag, data) triplets into absolute
/// coordinates. Returns the number of data bytes consumed.
fn decode_point_deltas(
    flags: &[u8],
    data: &[u8],
    out: &mut Vec<GlyphPoint>,
) -> Result<usize, DecodeError> {
    let err = DecodeError::TransformReconstructionFailure;

    // Sign bits: flag bit 0 selects the x sign, bit 1 the y sign.
    fn apply_sign(flag: i32, base: i32) -> i32 {
        if flag & 1 != 0 { base } else { -base }
    }

    let mut x: i32 = 0;
    let mut y: i32 = 0;
    let mut cursor: usize = 0;

    for &flag_byte in flags {
        let on_curve = flag_byte >> 7 == 0;
        let flag = i32::from(flag_byte & 0x7f);

        let n_data_bytes: usize = match flag {
            0..=83 => 1,
            84..=119 => 2,
            120..=123 => 3,
            _ => 4,
        };
        if n_data_bytes > data.len() - cursor {
            return Err(err("point stream ended early"));
        }
        let b = |i: usize| i32::from(data[cursor + i]);

        let (dx, dy) = match flag {
            0..=9 => (0, apply_sign(flag, ((flag & 14) << 7) + b(0))),
            10..=19 => (apply_sign(flag, (((flag - 10) & 14) << 7) + b(0)), 0),
            20..=83 => {
                let b0 = flag - 20;
                (
                    apply_sign(flag, 1 + (b0 & 0x30) + (b(0) >> 4)),
                    apply_sign(flag >> 1, 1 + ((b0 & 0x0c) << 2) + (b(0) & 0x0f)),
                )
            }
            84..=119 => {
                let b0 = flag - 84;
                (
                    apply_sign(flag, 1 + ((b0 / 12) << 8) + b(0)),
                    apply_sign(flag >> 1, 1 + (((b0 % 12) >> 2) << 8) + b(1)),
                )
            }
            120..=123 => (
                apply_sign(flag, (b(0) << 4) + (b(1) >> 4)),
                apply_sign(flag >> 1, ((b(1) & 0x0f) << 8) + b(2)),
            ),
            _ => (
                apply_sign(flag, (b(0) << 8) + b(1)),
                apply_sign(flag >> 1, (b(2) << 8) + b(3)),
            ),
        };
        cursor += n_data_bytes;

        x = x.checked_add(dx).ok_or(err("coordinate overflow"))?;
        y = y.checked_add(dy).ok_or(err("coordinate overflow"))?;
        out.push(GlyphPoint { x, y, on_curve });
    }

    Ok(cursor)
}

struct BoundingBox {
    x_min: i16,
    y_min: i16,
    x_max: i16,
    y_max: i16,
}

impl BoundingBox {
    fn of(points: &[GlyphPoint]) -> Self {
        let mut x_min: i32 = 0;
        let mut y_min: i32 = 0;
        let mut x_max: i32 = 0;
        let mut y_max: i32 = 0;
        if let Some(first) = points.first() {
            x_min = first.x;
            x_max = first.x;
            y_min = first.y;
            y_max = first.y;
        }
        for point in points.iter().skip(1) {
            x_min = x_min.min(point.x);
            x_max = x_max.max(point.x);
            y_min = y_min.min(point.y);
            y_max = y_max.max(point.y);
        }
        // Coordinates in a valid font fit in i16; truncation on hostile
        // input is harmless since the output is structural only.
        BoundingBox {
            x_min: x_min as i16,
            y_min: y_min as i16,
            x_max: x_max as i16,
            y_max: y_max as i16,
        }
    }

    fn write(&self, out: &mut impl BufMut) {
        out.put_i16(self.x_min);
        out.put_i16(self.y_min);
        out.put_i16(self.x_max);
        out.put_i16(self.y_max);
    }
}

/// Append the flag array (run-length compressed) and the delta-encoded
/// x and y coordinate arrays of a simple glyph.
fn write_point_data(points: &[GlyphPoint], first_overlaps: bool, out: &mut Vec<u8>) {
    fn flush(flag: u8, repeats: u8, out: &mut Vec<u8>) {
        if repeats > 0 {
            out.push(flag | REPEAT_FLAG);
            out.push(repeats);
        } else {
            out.push(flag);
        }
    }

    // A flag is held back until the first non-matching flag (or the end of
    // the array) so that its repeat count is known before it is written.
    let mut pending: Option<(u8, u8)> = None;
    let mut last_x: i32 = 0;
    let mut last_y: i32 = 0;
    for (i, point) in points.iter().enumerate() {
        let mut flag: u8 = 0;
        if point.on_curve {
            flag |= ON_CURVE_POINT;
        }
        if first_overlaps && i == 0 {
            flag |= OVERLAP_SIMPLE;
        }

        let dx = point.x - last_x;
        if dx == 0 {
            flag |= X_IS_SAME_OR_POSITIVE;
        } else if (-255..=255).contains(&dx) {
            flag |= X_SHORT_VECTOR | if dx > 0 { X_IS_SAME_OR_POSITIVE } else { 0 };
        }
        let dy = point.y - last_y;
        if dy == 0 {
            flag |= Y_IS_SAME_OR_POSITIVE;
        } else if (-255..=255).contains(&dy) {
            flag |= Y_SHORT_VECTOR | if dy > 0 { Y_IS_SAME_OR_POSITIVE } else { 0 };
        }

        pending = Some(match pending {
            Some((last, count)) if last == flag && count < 255 => (last, count + 1),
            Some((last, count)) => {
                flush(last, count, out);
                (flag, 0)
            }
            None => (flag, 0),
        });

        last_x = point.x;
        last_y = point.y;
    }
    if let Some((flag, count)) = pending {
        flush(flag, count, out);
    }

    let mut last: i32 = 0;
    for point in points {
        let dx = point.x - last;
        if dx != 0 {
            if (-255..=255).contains(&dx) {
                out.push(dx.unsigned_abs() as u8);
            } else {
                out.put_i16(dx as i16);
            }
        }
        last = point.x;
    }

    let mut last: i32 = 0;
    for point in points {
        let dy = point.y - last;
        if dy != 0 {
            if (-255..=255).contains(&dy) {
                out.push(dy.unsigned_abs() as u8);
            } else {
                out.put_i16(dy as i16);
            }
        }
        last = point.y;
    }
}

/// Encode cumulative glyph offsets as a loca table.
///
/// Short format stores each offset halved; alignment of glyph records keeps
/// the offsets even.
fn encode_loca(offsets: &[u32], index_format: u16) -> Result<Vec<u8>, DecodeError> {
    let word = if index_format != 0 { 4 } else { 2 };
    let mut out: Vec<u8> = Vec::with_capacity(offsets.len() * word);
    if index_format != 0 {
        for &offset in offsets {
            out.put_u32(offset);
        }
    } else {
        for &offset in offsets {
            if offset > u32::from(u16::MAX) * 2 {
                return Err(DecodeError::TransformReconstructionFailure(
                    "glyf table too large for the short loca format",
                ));
            }
            out.put_u16((offset >> 1) as u16);
        }
    }
    Ok(out)
}
