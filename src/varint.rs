//! WOFF2 variable-length integer encodings: UIntBase128 and 255UInt16.
//!
//! Based on section 6.1.1 of the MicroType Express draft spec and
//! <https://www.w3.org/TR/WOFF2/#DataTypes>.

use bytes::Buf;

/// Failure while reading a variable-length value from a bounded stream.
///
/// Callers map this to the error kind of the pipeline stage they run in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum VarIntError {
    UnexpectedEof,
    NonCanonical,
    Overflow,
}

impl From<bytes::TryGetError> for VarIntError {
    fn from(_: bytes::TryGetError) -> Self {
        Self::UnexpectedEof
    }
}

pub(crate) trait BufWoff2Ext: Buf {
    /// Read a UIntBase128: 7 data bits per byte, MSB continuation bit,
    /// big-endian byte order, at most 5 bytes.
    ///
    /// A leading `0x80` byte (zero data bits with continuation) is a
    /// non-canonical encoding and is rejected, as is any value that would
    /// overflow 32 bits.
    fn read_base128(&mut self) -> Result<u32, VarIntError> {
        let mut value: u32 = 0;
        for i in 0..5 {
            let byte = self.try_get_u8()?;
            if i == 0 && byte == 0x80 {
                return Err(VarIntError::NonCanonical);
            }
            // If any of the top seven bits are already set we are about to overflow.
            if value & 0xfe00_0000 != 0 {
                return Err(VarIntError::Overflow);
            }
            value = (value << 7) | u32::from(byte & 0x7f);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        // Continuation bit still set after 5 bytes.
        Err(VarIntError::Overflow)
    }

    /// Read a 255UInt16: one to three bytes keyed by the lead code.
    fn read_packed_u16(&mut self) -> Result<u16, VarIntError> {
        const WORD_CODE: u8 = 253;
        const ONE_MORE_BYTE_CODE2: u8 = 254;
        const ONE_MORE_BYTE_CODE1: u8 = 255;
        const LOWEST_UCODE: u16 = 253;

        let code = self.try_get_u8()?;
        Ok(match code {
            WORD_CODE => self.try_get_u16()?,
            ONE_MORE_BYTE_CODE1 => u16::from(self.try_get_u8()?) + LOWEST_UCODE,
            ONE_MORE_BYTE_CODE2 => u16::from(self.try_get_u8()?) + LOWEST_UCODE * 2,
            _ => u16::from(code),
        })
    }

    /// Move exactly `n` bytes from this stream onto the end of `dst`.
    fn copy_into(&mut self, n: usize, dst: &mut Vec<u8>) -> Result<(), VarIntError> {
        if self.remaining() < n {
            return Err(VarIntError::UnexpectedEof);
        }
        dst.reserve(n);
        let mut remaining = n;
        while remaining > 0 {
            let chunk = self.chunk();
            let step = chunk.len().min(remaining);
            dst.extend_from_slice(&chunk[..step]);
            self.advance(step);
            remaining -= step;
        }
        Ok(())
    }
}

impl<B: Buf + ?Sized> BufWoff2Ext for B {}

#[cfg(test)]
mod tests {
    use super::*;

    fn base128(bytes: &[u8]) -> Result<u32, VarIntError> {
        let mut input = bytes;
        input.read_base128()
    }

    #[test]
    fn base128_single_byte() {
        assert_eq!(base128(&[0x00]), Ok(0));
        assert_eq!(base128(&[0x3f]), Ok(63));
        assert_eq!(base128(&[0x7f]), Ok(127));
    }

    #[test]
    fn base128_multi_byte() {
        assert_eq!(base128(&[0x81, 0x00]), Ok(128));
        assert_eq!(base128(&[0xff, 0x7f]), Ok(0x3fff));
        // u32::MAX is 0b1111_(7 bits)x4: 0x8F 0xFF 0xFF 0xFF 0x7F
        assert_eq!(base128(&[0x8f, 0xff, 0xff, 0xff, 0x7f]), Ok(u32::MAX));
    }

    #[test]
    fn base128_rejects_leading_zero_byte() {
        assert_eq!(base128(&[0x80, 0x01]), Err(VarIntError::NonCanonical));
    }

    #[test]
    fn base128_rejects_overflow() {
        // Sixth byte never reached; continuation past 5 bytes is overflow.
        assert_eq!(
            base128(&[0xff, 0xff, 0xff, 0xff, 0xff, 0x7f]),
            Err(VarIntError::Overflow)
        );
        // Value larger than 32 bits.
        assert_eq!(
            base128(&[0x90, 0x80, 0x80, 0x80, 0x00]),
            Err(VarIntError::Overflow)
        );
    }

    #[test]
    fn base128_rejects_truncation() {
        assert_eq!(base128(&[0x81]), Err(VarIntError::UnexpectedEof));
        assert_eq!(base128(&[]), Err(VarIntError::UnexpectedEof));
    }

    fn packed_u16(bytes: &[u8]) -> Result<u16, VarIntError> {
        let mut input = bytes;
        input.read_packed_u16()
    }

    #[test]
    fn packed_u16_all_forms() {
        assert_eq!(packed_u16(&[0]), Ok(0));
        assert_eq!(packed_u16(&[252]), Ok(252));
        assert_eq!(packed_u16(&[255, 0]), Ok(253));
        assert_eq!(packed_u16(&[255, 252]), Ok(505));
        assert_eq!(packed_u16(&[254, 0]), Ok(506));
        assert_eq!(packed_u16(&[254, 255]), Ok(761));
        assert_eq!(packed_u16(&[253, 0x03, 0x02]), Ok(0x0302));
        assert_eq!(packed_u16(&[253, 0xff, 0xff]), Ok(u16::MAX));
    }

    #[test]
    fn packed_u16_rejects_truncation() {
        assert_eq!(packed_u16(&[253, 0x01]), Err(VarIntError::UnexpectedEof));
        assert_eq!(packed_u16(&[255]), Err(VarIntError::UnexpectedEof));
    }

    #[test]
    fn copy_into_moves_exact_count() {
        let mut input: &[u8] = &[1, 2, 3, 4, 5];
        let mut out = Vec::new();
        input.copy_into(3, &mut out).unwrap();
        assert_eq!(out, vec![1, 2, 3]);
        assert_eq!(input, &[4, 5]);
        assert_eq!(input.copy_into(3, &mut out), Err(VarIntError::UnexpectedEof));
    }
}
