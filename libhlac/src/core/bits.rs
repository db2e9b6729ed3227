// Bit packing for block payloads
//
// Values are written MSB-first with no padding between them; only the end of
// a payload is padded to a whole byte.

use super::error::{HlacError, HlacResult};

/// smallest two's complement width that holds `v`
#[inline]
pub fn signed_width(v: i32) -> u8 {
    let magnitude = if v < 0 { !v } else { v };
    (33 - magnitude.leading_zeros()) as u8
}

/// width that holds every value between `lo` and `hi`, 0 when both are zero
#[inline]
pub fn range_width(lo: i32, hi: i32) -> u8 {
    if lo == 0 && hi == 0 {
        0
    } else {
        signed_width(lo).max(signed_width(hi))
    }
}

/// width that holds every value, 0 when all of them are zero
pub fn width_of(values: &[i32]) -> u8 {
    let mut lo = 0i32;
    let mut hi = 0i32;
    for &v in values {
        lo = lo.min(v);
        hi = hi.max(v);
    }
    range_width(lo, hi)
}

/// bytes needed for a number of bits
#[inline]
pub fn bytes_for_bits(bits: u64) -> usize {
    bits.div_ceil(8) as usize
}

/// Bit-level writer
pub struct BitWriter {
    bytes: Vec<u8>,
    acc: u64,
    acc_bits: u32,
}

impl BitWriter {
    pub fn new() -> Self {
        BitWriter {
            bytes: Vec::new(),
            acc: 0,
            acc_bits: 0,
        }
    }

    pub fn with_capacity(bytes: usize) -> Self {
        BitWriter {
            bytes: Vec::with_capacity(bytes),
            acc: 0,
            acc_bits: 0,
        }
    }

    /// write the low `num_bits` of value (at most 32)
    pub fn write_bits(&mut self, value: u32, num_bits: u8) {
        if num_bits == 0 {
            return;
        }
        let mask = if num_bits == 32 {
            u32::MAX
        } else {
            (1u32 << num_bits) - 1
        };
        self.acc = (self.acc << num_bits) | (value & mask) as u64;
        self.acc_bits += num_bits as u32;

        while self.acc_bits >= 8 {
            self.acc_bits -= 8;
            self.bytes.push((self.acc >> self.acc_bits) as u8);
        }
        self.acc &= (1u64 << self.acc_bits) - 1;
    }

    /// write a signed value as two's complement truncated to `num_bits`
    #[inline]
    pub fn write_signed(&mut self, value: i32, num_bits: u8) {
        self.write_bits(value as u32, num_bits);
    }

    pub fn write_all_signed(&mut self, values: &[i32], num_bits: u8) {
        if num_bits == 0 {
            return;
        }
        for &v in values {
            self.write_signed(v, num_bits);
        }
    }

    pub fn into_bytes(mut self) -> Vec<u8> {
        if self.acc_bits > 0 {
            self.bytes.push((self.acc << (8 - self.acc_bits)) as u8);
        }
        self.bytes
    }

    pub fn bit_count(&self) -> u64 {
        self.bytes.len() as u64 * 8 + self.acc_bits as u64
    }
}

impl Default for BitWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Bit-level reader
///
/// Running past the end is a corrupt payload, not silently zero.
pub struct BitReader<'a> {
    bytes: &'a [u8],
    bit_pos: u64,
}

impl<'a> BitReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        BitReader { bytes, bit_pos: 0 }
    }

    pub fn read_bits(&mut self, num_bits: u8) -> HlacResult<u32> {
        if num_bits == 0 {
            return Ok(0);
        }
        if self.bit_pos + num_bits as u64 > self.bytes.len() as u64 * 8 {
            return Err(HlacError::CorruptStream(
                "payload ends inside a packed value".to_string(),
            ));
        }

        let mut value = 0u32;
        let mut remaining = num_bits as u32;
        while remaining > 0 {
            let byte = self.bytes[(self.bit_pos / 8) as usize];
            let offset = (self.bit_pos % 8) as u32;
            let take = remaining.min(8 - offset);
            let bits = (byte >> (8 - offset - take)) & ((1u16 << take) - 1) as u8;
            value = (value << take) | bits as u32;
            remaining -= take;
            self.bit_pos += take as u64;
        }
        Ok(value)
    }

    /// read a two's complement value of `num_bits` and sign-extend it
    #[inline]
    pub fn read_signed(&mut self, num_bits: u8) -> HlacResult<i32> {
        if num_bits == 0 {
            return Ok(0);
        }
        let raw = self.read_bits(num_bits)?;
        let shift = 32 - num_bits as u32;
        Ok(((raw << shift) as i32) >> shift)
    }

    pub fn read_into_signed(&mut self, out: &mut [i32], num_bits: u8) -> HlacResult<()> {
        for slot in out.iter_mut() {
            *slot = self.read_signed(num_bits)?;
        }
        Ok(())
    }

    /// jump over bits without decoding them
    pub fn skip_bits(&mut self, num_bits: u64) -> HlacResult<()> {
        if self.bit_pos + num_bits > self.bytes.len() as u64 * 8 {
            return Err(HlacError::CorruptStream(
                "payload ends inside a skipped region".to_string(),
            ));
        }
        self.bit_pos += num_bits;
        Ok(())
    }

    pub fn bits_consumed(&self) -> u64 {
        self.bit_pos
    }

    /// bytes touched so far, counting a partly read byte
    pub fn bytes_consumed(&self) -> usize {
        bytes_for_bits(self.bit_pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signed_width() {
        assert_eq!(signed_width(0), 1);
        assert_eq!(signed_width(-1), 1);
        assert_eq!(signed_width(1), 2);
        assert_eq!(signed_width(-2), 2);
        assert_eq!(signed_width(2), 3);
        assert_eq!(signed_width(32767), 16);
        assert_eq!(signed_width(-32768), 16);
        assert_eq!(signed_width(65535), 17);
    }

    #[test]
    fn test_width_of() {
        assert_eq!(width_of(&[]), 0);
        assert_eq!(width_of(&[0, 0, 0]), 0);
        assert_eq!(width_of(&[0, -1]), 1);
        assert_eq!(width_of(&[3, -4]), 3);
    }

    #[test]
    fn test_mixed_widths_pack_tightly() {
        let mut w = BitWriter::new();
        w.write_signed(-3, 3);
        w.write_bits(0b10110, 5);
        w.write_signed(12345, 17);
        assert_eq!(w.bit_count(), 25);
        let bytes = w.into_bytes();
        assert_eq!(bytes.len(), 4);

        let mut r = BitReader::new(&bytes);
        assert_eq!(r.read_signed(3).unwrap(), -3);
        assert_eq!(r.read_bits(5).unwrap(), 0b10110);
        assert_eq!(r.read_signed(17).unwrap(), 12345);
        assert_eq!(r.bytes_consumed(), 4);
    }

    #[test]
    fn test_reading_past_end_fails() {
        let mut r = BitReader::new(&[0xff]);
        assert!(r.read_bits(6).is_ok());
        assert!(matches!(r.read_bits(3), Err(HlacError::CorruptStream(_))));
    }

    #[test]
    fn test_zero_width_is_free() {
        let mut w = BitWriter::new();
        w.write_all_signed(&[0, 0, 0], 0);
        assert!(w.into_bytes().is_empty());
    }
}
