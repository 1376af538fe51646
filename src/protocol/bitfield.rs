//! Bit-field codec.
//!
//! The MeatNet wire formats pack values at arbitrary bit offsets and widths:
//! 13-bit thermistor codes straddling byte boundaries, 17-bit prediction
//! seconds, 10-bit set points. Every parser in this crate funnels through
//! these helpers rather than hand-rolling shifts per field.
//!
//! Two bit orders are supported:
//!
//! - **Little-endian** (`read_bits_le`): bit `k` of the stream is bit `k % 8`
//!   of byte `k / 8`. This is the order used by the advertisement temperature
//!   block and the prediction status/log blocks.
//! - **Big-endian** (`read_bits_be`): bit `k` of the stream is bit
//!   `7 - (k % 8)` of byte `k / 8`, with the first bit read landing in the
//!   most significant position of the result.

use crate::error::{Error, Result};

/// Maximum supported field width in bits.
pub const MAX_FIELD_WIDTH: u32 = 64;

fn check_bounds(buffer: &[u8], bit_offset: usize, bit_width: u32) -> Result<()> {
    if bit_width == 0 || bit_width > MAX_FIELD_WIDTH {
        return Err(Error::MalformedPayload {
            context: format!("Unsupported bit width: {}", bit_width),
        });
    }

    let end = bit_offset + bit_width as usize;
    if end > buffer.len() * 8 {
        return Err(Error::MalformedPayload {
            context: format!(
                "Bit field [{}, {}) exceeds buffer of {} bits",
                bit_offset,
                end,
                buffer.len() * 8
            ),
        });
    }

    Ok(())
}

/// Read a `bit_width`-wide field at `bit_offset`, little-endian bit order.
///
/// No partial reads: the whole field must lie within the buffer or the call
/// fails with [`Error::MalformedPayload`].
pub fn read_bits_le(buffer: &[u8], bit_offset: usize, bit_width: u32) -> Result<u64> {
    check_bounds(buffer, bit_offset, bit_width)?;

    let mut value: u64 = 0;
    for i in 0..bit_width as usize {
        let bit = bit_offset + i;
        if buffer[bit / 8] & (1 << (bit % 8)) != 0 {
            value |= 1 << i;
        }
    }

    Ok(value)
}

/// Read a `bit_width`-wide field at `bit_offset`, big-endian bit order.
pub fn read_bits_be(buffer: &[u8], bit_offset: usize, bit_width: u32) -> Result<u64> {
    check_bounds(buffer, bit_offset, bit_width)?;

    let mut value: u64 = 0;
    for i in 0..bit_width as usize {
        let bit = bit_offset + i;
        value <<= 1;
        if buffer[bit / 8] & (1 << (7 - bit % 8)) != 0 {
            value |= 1;
        }
    }

    Ok(value)
}

/// Pack an integer into `byte_width` big-endian bytes.
pub fn pack_be(value: u64, byte_width: usize) -> Vec<u8> {
    (0..byte_width)
        .rev()
        .map(|i| (value >> (i * 8)) as u8)
        .collect()
}

/// Pack an integer into `byte_width` little-endian bytes.
pub fn pack_le(value: u64, byte_width: usize) -> Vec<u8> {
    (0..byte_width).map(|i| (value >> (i * 8)) as u8).collect()
}
