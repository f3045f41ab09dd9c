//! Big-endian reads at arbitrary offsets into a byte slice.
//!
//! Everything that parses chunk data works directly on the serialised bytes,
//! so these all take a buffer and an offset instead of consuming a reader.
//! Every read is bounds checked; `None` means the read would run off the end
//! of the buffer, which callers treat as malformed input.

use byteorder::{BigEndian, ByteOrder};

/// Returns true if `n` bytes at `at` are within the buffer.
#[inline(always)]
pub fn has(data: &[u8], at: usize, n: usize) -> bool {
  at <= data.len() && data.len() - at >= n
}

#[inline(always)]
pub fn u8(data: &[u8], at: usize) -> Option<u8> { data.get(at).copied() }

#[inline(always)]
pub fn i8(data: &[u8], at: usize) -> Option<i8> { data.get(at).map(|v| *v as i8) }

#[inline(always)]
pub fn u16(data: &[u8], at: usize) -> Option<u16> {
  data.get(at..at + 2).map(BigEndian::read_u16)
}

#[inline(always)]
pub fn i16(data: &[u8], at: usize) -> Option<i16> {
  data.get(at..at + 2).map(BigEndian::read_i16)
}

#[inline(always)]
pub fn u32(data: &[u8], at: usize) -> Option<u32> {
  data.get(at..at + 4).map(BigEndian::read_u32)
}

#[inline(always)]
pub fn i32(data: &[u8], at: usize) -> Option<i32> {
  data.get(at..at + 4).map(BigEndian::read_i32)
}

#[inline(always)]
pub fn u64(data: &[u8], at: usize) -> Option<u64> {
  data.get(at..at + 8).map(BigEndian::read_u64)
}

#[inline(always)]
pub fn i64(data: &[u8], at: usize) -> Option<i64> {
  data.get(at..at + 8).map(BigEndian::read_i64)
}

/// Floats are a bitcast of the same-width integer.
#[inline(always)]
pub fn f32(data: &[u8], at: usize) -> Option<f32> { u32(data, at).map(f32::from_bits) }

#[inline(always)]
pub fn f64(data: &[u8], at: usize) -> Option<f64> { u64(data, at).map(f64::from_bits) }

/// Reads element `i` out of a packed long array payload (the bytes after the
/// 4-byte length). This is the 1.16+ packing: `64 / bits` elements per long,
/// read from the low bits upward, remainder bits at the top of each long
/// unused. Elements never straddle a long boundary.
#[inline(always)]
pub fn packed_elem(data: &[u8], at: usize, i: usize, bits: u32) -> Option<u64> {
  let per_long = 64 / bits as usize;
  let long = u64(data, at + (i / per_long) * 8)?;
  Some((long >> ((i % per_long) as u32 * bits)) & (u64::MAX >> (64 - bits)))
}
