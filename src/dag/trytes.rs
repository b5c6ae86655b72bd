// src/dag/trytes.rs
// Balanced-ternary tryte alphabet and integer codec.

use crate::error::{Result, TangleError};

/// `9` is zero, `A..M` are 1..13 and `N..Z` are -13..-1.
pub const TRYTE_ALPHABET: &[u8; 27] = b"9ABCDEFGHIJKLMNOPQRSTUVWXYZ";

const TRITS_PER_TRYTE: usize = 3;

/// Numeric value of a tryte character, `None` outside the alphabet.
pub fn tryte_value(c: u8) -> Option<i8> {
    match c {
        b'9' => Some(0),
        b'A'..=b'M' => Some((c - b'A') as i8 + 1),
        b'N'..=b'Z' => Some((c - b'N') as i8 - 13),
        _ => None,
    }
}

/// Character for a tryte value in `-13..=13`.
pub fn tryte_char(value: i8) -> char {
    let idx = if value < 0 { value + 27 } else { value };
    TRYTE_ALPHABET[idx as usize] as char
}

pub fn is_trytes(s: &str) -> bool {
    s.bytes().all(|c| tryte_value(c).is_some())
}

pub fn is_trytes_of_len(s: &str, len: usize) -> bool {
    s.len() == len && is_trytes(s)
}

/// True when the string carries no information (all `9`).
pub fn is_blank(s: &str) -> bool {
    s.bytes().all(|c| c == b'9')
}

/// Pad with `9` up to `len`; longer input is rejected.
pub fn pad_trytes(s: &str, len: usize) -> Result<String> {
    if !is_trytes(s) {
        return Err(TangleError::malformed(format!("'{}' is not a tryte string", s)));
    }
    if s.len() > len {
        return Err(TangleError::malformed(format!(
            "tryte string of length {} exceeds field width {}",
            s.len(),
            len
        )));
    }
    let mut out = String::with_capacity(len);
    out.push_str(s);
    out.extend(std::iter::repeat('9').take(len - s.len()));
    Ok(out)
}

/// Encode a signed integer as `len` trytes of little-endian balanced ternary.
pub fn int_to_trytes(value: i64, len: usize) -> Result<String> {
    let negative = value < 0;
    let mut remaining = value.unsigned_abs();
    let mut trits = Vec::with_capacity(len * TRITS_PER_TRYTE);

    for _ in 0..len * TRITS_PER_TRYTE {
        let mut trit = (remaining % 3) as i8;
        remaining /= 3;
        if trit == 2 {
            trit = -1;
            remaining += 1;
        }
        trits.push(if negative { -trit } else { trit });
    }
    if remaining != 0 {
        return Err(TangleError::malformed(format!(
            "value {} does not fit in {} trytes",
            value, len
        )));
    }

    Ok(trits
        .chunks(TRITS_PER_TRYTE)
        .map(|t| tryte_char(t[0] + 3 * t[1] + 9 * t[2]))
        .collect())
}

/// Decode little-endian balanced-ternary trytes into an integer.
pub fn trytes_to_int(trytes: &str) -> Result<i64> {
    let mut acc: i64 = 0;
    for c in trytes.bytes().rev() {
        let value = tryte_value(c)
            .ok_or_else(|| TangleError::malformed(format!("invalid tryte '{}'", c as char)))?;
        acc = acc
            .checked_mul(27)
            .and_then(|a| a.checked_add(value as i64))
            .ok_or_else(|| {
                TangleError::malformed(format!("'{}' overflows a 64-bit integer", trytes))
            })?;
    }
    Ok(acc)
}
