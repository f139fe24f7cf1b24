// VCDIFF integers (RFC 3284 section 2): base-128, most significant group
// first, bit 7 set on every byte except the last.

use std::io::{self, Read};

/// Longest encoding of a `u64`.
pub const MAX_LEN: usize = 10;

const OVERFLOW_MASK: u64 = 0xFE00_0000_0000_0000;

/// Encode `num` into the tail of `buf`; returns the encoded slice.
#[inline]
pub fn encode_u64(mut num: u64, buf: &mut [u8; MAX_LEN]) -> &[u8] {
    let mut start = MAX_LEN;
    loop {
        start -= 1;
        buf[start] = (num as u8 & 0x7F) | 0x80;
        num >>= 7;
        if num == 0 {
            break;
        }
    }
    buf[MAX_LEN - 1] &= 0x7F;
    &buf[start..]
}

/// Append the encoding of `num` to `out`.
#[inline]
pub fn push_u64(out: &mut Vec<u8>, num: u64) {
    let mut buf = [0u8; MAX_LEN];
    out.extend_from_slice(encode_u64(num, &mut buf));
}

/// Encoded length of `num`.
#[inline]
pub fn sizeof_u64(num: u64) -> usize {
    let bits = 64 - num.leading_zeros();
    bits.max(1).div_ceil(7) as usize
}

/// Decode from the front of `data`, returning `(value, consumed)`.
pub fn read_u64(data: &[u8]) -> Result<(u64, usize), VarIntError> {
    let mut val = 0u64;
    for (i, &byte) in data.iter().enumerate() {
        if val & OVERFLOW_MASK != 0 {
            return Err(VarIntError::Overflow);
        }
        val = (val << 7) | u64::from(byte & 0x7F);
        if byte & 0x80 == 0 {
            return Ok((val, i + 1));
        }
    }
    Err(VarIntError::Underflow)
}

/// Decode a value that must fit in a `u32`.
pub fn read_u32(data: &[u8]) -> Result<(u32, usize), VarIntError> {
    let (val, len) = read_u64(data)?;
    let val = u32::try_from(val).map_err(|_| VarIntError::Overflow)?;
    Ok((val, len))
}

/// Read one integer from a byte stream.
pub fn stream_read_u64<R: Read + ?Sized>(r: &mut R) -> io::Result<u64> {
    let mut val = 0u64;
    let mut byte = [0u8; 1];
    loop {
        r.read_exact(&mut byte)?;
        if val & OVERFLOW_MASK != 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidData, VarIntError::Overflow));
        }
        val = (val << 7) | u64::from(byte[0] & 0x7F);
        if byte[0] & 0x80 == 0 {
            return Ok(val);
        }
    }
}

/// Read one integer that must fit in a `usize`.
pub fn stream_read_usize<R: Read + ?Sized>(r: &mut R) -> io::Result<usize> {
    let val = stream_read_u64(r)?;
    usize::try_from(val)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, VarIntError::Overflow))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum VarIntError {
    #[error("integer truncated")]
    Underflow,
    #[error("integer overflow")]
    Overflow,
}
