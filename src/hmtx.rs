//! Reconstruction of the original `hmtx` table from WOFF2's transformed
//! representation, which omits side bearings derivable from glyph bounding
//! boxes.
//!
//! <https://www.w3.org/TR/WOFF2/#hmtx_table_format>

use bytes::{Buf, BufMut};

use crate::error::DecodeError;

// Flag bits of the transformed hmtx header byte. A set bit means the
// corresponding array was omitted and is recovered from glyf x_min values.
const LSB_OMITTED: u8 = 1 << 0;
const LEFT_SIDE_BEARING_OMITTED: u8 = 1 << 1;

/// Rebuild an `hmtx` table.
///
/// Must run after glyf/loca reconstruction: `x_mins` are the per-glyph
/// bounding-box minima recovered there, one per glyph. `num_hmetrics` comes
/// from the raw `hhea` table.
pub(crate) fn reconstruct_hmtx(
    mut input: &[u8],
    num_glyphs: u16,
    num_hmetrics: u16,
    x_mins: &[i16],
) -> Result<Vec<u8>, DecodeError> {
    let err = DecodeError::TransformReconstructionFailure;

    let flags = input.try_get_u8()?;
    if flags & !(LSB_OMITTED | LEFT_SIDE_BEARING_OMITTED) != 0 {
        return Err(err("reserved hmtx transform flag bits set"));
    }
    // An hmtx with nothing omitted must be signalled as untransformed at the
    // directory level, not with a degenerate all-zero transform.
    if flags == 0 {
        return Err(err("degenerate hmtx transform omits nothing"));
    }
    let lsbs_present = flags & LSB_OMITTED == 0;
    let left_side_bearings_present = flags & LEFT_SIDE_BEARING_OMITTED == 0;

    debug_assert_eq!(x_mins.len(), usize::from(num_glyphs));

    // "...only one entry need be in the array, but that entry is required."
    // <https://www.microsoft.com/typography/otspec/hmtx.htm>
    if num_hmetrics < 1 {
        return Err(err("hhea declares zero hMetrics"));
    }
    if num_hmetrics > num_glyphs {
        return Err(err("hhea declares more hMetrics than glyphs"));
    }

    let mut advance_widths: Vec<u16> = Vec::with_capacity(usize::from(num_hmetrics));
    for _ in 0..num_hmetrics {
        advance_widths.push(input.try_get_u16()?);
    }

    // Proportional part, then the monospaced tail; either may fall back to
    // the glyf-derived x_min when its array was omitted.
    let mut lsbs: Vec<i16> = Vec::with_capacity(usize::from(num_glyphs));
    for i in 0..usize::from(num_hmetrics) {
        lsbs.push(if lsbs_present {
            input.try_get_i16()?
        } else {
            x_mins[i]
        });
    }
    for i in usize::from(num_hmetrics)..usize::from(num_glyphs) {
        lsbs.push(if left_side_bearings_present {
            input.try_get_i16()?
        } else {
            x_mins[i]
        });
    }

    let mut out: Vec<u8> =
        Vec::with_capacity(4 * usize::from(num_hmetrics) + 2 * usize::from(num_glyphs));
    for (i, &lsb) in lsbs.iter().enumerate() {
        if i < usize::from(num_hmetrics) {
            out.put_u16(advance_widths[i]);
        }
        out.put_i16(lsb);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rebuilds_from_x_mins_only() {
        // Both arrays omitted: one proportional glyph, one monospaced.
        let input = [0x03, 0x01, 0xf4]; // flags, advanceWidth 500
        let out = reconstruct_hmtx(&input, 2, 1, &[7, -2]).unwrap();
        assert_eq!(out, [0x01, 0xf4, 0x00, 0x07, 0xff, 0xfe]);
    }

    #[test]
    fn reads_explicit_monospace_bearings() {
        // Only the proportional lsb array omitted.
        let input = [
            0x01, // flags
            0x01, 0xf4, // advanceWidth 500
            0x00, 0x0a, // leftSideBearing for the monospaced glyph
        ];
        let out = reconstruct_hmtx(&input, 2, 1, &[7, -2]).unwrap();
        assert_eq!(out, [0x01, 0xf4, 0x00, 0x07, 0x00, 0x0a]);
    }

    #[test]
    fn rejects_zero_flags() {
        assert!(matches!(
            reconstruct_hmtx(&[0x00, 0x01, 0xf4, 0x00, 0x01], 1, 1, &[1]),
            Err(DecodeError::TransformReconstructionFailure(_))
        ));
    }

    #[test]
    fn rejects_reserved_flag_bits() {
        assert!(matches!(
            reconstruct_hmtx(&[0x05, 0x01, 0xf4], 1, 1, &[1]),
            Err(DecodeError::TransformReconstructionFailure(_))
        ));
    }

    #[test]
    fn rejects_bad_hmetric_counts() {
        assert!(reconstruct_hmtx(&[0x03, 0x01, 0xf4], 1, 0, &[1]).is_err());
        assert!(reconstruct_hmtx(&[0x03, 0x01, 0xf4, 0x01, 0xf4], 1, 2, &[1]).is_err());
    }

    #[test]
    fn rejects_truncated_stream() {
        // flags promise an explicit monospace array that is not there.
        assert!(matches!(
            reconstruct_hmtx(&[0x01, 0x01, 0xf4], 2, 1, &[1, 2]),
            Err(DecodeError::TransformReconstructionFailure(_))
        ));
    }
}
