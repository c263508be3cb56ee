/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! FIX checksum calculation.
//!
//! The FIX checksum is the sum of every byte preceding the `10=` field,
//! including the SOH that terminates the last body field, modulo 256. On
//! the wire it is always three zero-padded decimal digits.

/// Calculates the FIX checksum for the given data.
///
/// The checksum is the sum of all bytes modulo 256.
///
/// # Arguments
/// * `data` - The message bytes to checksum (excluding the 10=XXX| field)
///
/// # Returns
/// The checksum value as a u8 (0-255).
///
/// # Example
/// ```
/// use fixwire_tagvalue::calculate_checksum;
///
/// let data = b"8=FIX.4.2\x019=5\x0135=0\x01";
/// assert_eq!(calculate_checksum(data), 161);
/// ```
#[inline]
#[must_use]
pub fn calculate_checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

/// Renders a checksum as the three ASCII digits that follow `10=`.
#[inline]
#[must_use]
pub fn format_checksum(checksum: u8) -> [u8; 3] {
    [
        b'0' + checksum / 100,
        b'0' + checksum / 10 % 10,
        b'0' + checksum % 10,
    ]
}

/// Reads the value of a CheckSum field.
///
/// Only exactly three ASCII digits in `000..=255` are accepted; anything
/// else yields `None`.
#[must_use]
pub fn parse_checksum(bytes: &[u8]) -> Option<u8> {
    let [a, b, c] = <[u8; 3]>::try_from(bytes).ok()?;
    if ![a, b, c].iter().all(u8::is_ascii_digit) {
        return None;
    }
    let value = [a, b, c]
        .iter()
        .fold(0u16, |acc, d| acc * 10 + u16::from(d - b'0'));
    u8::try_from(value).ok()
}
