//! Helpers for explicit little-endian wire conversions.
//!
//! Every integer in the frame header travels little-endian. Keeping the
//! conversions here makes the wire byte order visible at each call site
//! instead of hiding it behind `Buf::get_u32_le` calls scattered through the
//! codec.

/// Serialise a `u32` in wire byte order (little-endian).
///
/// # Examples
///
/// ```
/// use wirepool::byte_order::write_wire_u32;
///
/// assert_eq!(write_wire_u32(0x1234_5678), [0x78, 0x56, 0x34, 0x12]);
/// ```
#[must_use]
pub const fn write_wire_u32(value: u32) -> [u8; 4] { value.to_le_bytes() }

/// Parse a wire-order `u32` from its on-wire representation.
///
/// # Examples
///
/// ```
/// use wirepool::byte_order::read_wire_u32;
///
/// assert_eq!(read_wire_u32([0x78, 0x56, 0x34, 0x12]), 0x1234_5678);
/// ```
#[must_use]
pub const fn read_wire_u32(bytes: [u8; 4]) -> u32 { u32::from_le_bytes(bytes) }

/// Read the `index`-th 4-byte word from a header slice.
///
/// Returns `None` when the slice is too short.
#[must_use]
pub fn header_word(header: &[u8], index: usize) -> Option<u32> {
    let start = index.checked_mul(4)?;
    header
        .get(start..start.checked_add(4)?)
        .and_then(|slice| <[u8; 4]>::try_from(slice).ok())
        .map(read_wire_u32)
}
