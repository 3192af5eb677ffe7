//! The minimal slice of PER (Packed Encoding Rules) that UDPTL borrows: variable
//! length prefixes and the "open type" framing built on them.
//!
//! Lengths up to 0x3fff are self contained. Anything larger is sent as a chain of
//! fragments, each contributing a multiple of 16384 bytes, terminated by a
//! non-fragment length (possibly zero).

/// Result of encoding or decoding one length prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthEncoded {
    /// The length is complete; this many bytes follow and the open type ends.
    Complete(usize),
    /// A fragment contributing this many bytes; another length prefix follows.
    Fragment(usize),
}

/// Largest fragment multiplier. 4 * 16384 covers the 16 bit sizes UDPTL can carry.
const MAX_MULTIPLIER: usize = 4;

/// Append one length prefix for `value` remaining bytes.
///
/// Returns how much of `value` the prefix accounts for. `Fragment` means the caller
/// must loop, encoding the remainder with further prefixes.
pub fn encode_length(buf: &mut Vec<u8>, value: usize) -> LengthEncoded {
    if value < 0x80 {
        buf.push(value as u8);
        return LengthEncoded::Complete(value);
    }
    if value < 0x4000 {
        buf.push(0x80 | (value >> 8) as u8);
        buf.push((value & 0xff) as u8);
        return LengthEncoded::Complete(value);
    }
    let multiplier = (value >> 14).min(MAX_MULTIPLIER);
    buf.push(0xc0 | multiplier as u8);
    LengthEncoded::Fragment(multiplier << 14)
}

/// Decode one length prefix at `*pos`, advancing it.
pub fn decode_length(buf: &[u8], pos: &mut usize) -> Option<LengthEncoded> {
    let b = *buf.get(*pos)?;
    if b & 0x80 == 0 {
        *pos += 1;
        return Some(LengthEncoded::Complete(b as usize));
    }
    if b & 0x40 == 0 {
        let b2 = *buf.get(*pos + 1)?;
        *pos += 2;
        return Some(LengthEncoded::Complete(((b as usize & 0x3f) << 8) | b2 as usize));
    }
    *pos += 1;
    Some(LengthEncoded::Fragment((b as usize & 0x3f) << 14))
}

/// Append `data` as a PER open type: one or more length-prefixed chunks.
///
/// A zero length buffer still encodes as a single zero byte, per the framing convention.
pub fn encode_open_type(buf: &mut Vec<u8>, data: &[u8]) {
    let mut idx = 0;
    loop {
        let remaining = data.len() - idx;
        match encode_length(buf, remaining) {
            LengthEncoded::Complete(n) => {
                buf.extend_from_slice(&data[idx..idx + n]);
                return;
            }
            LengthEncoded::Fragment(n) => {
                buf.extend_from_slice(&data[idx..idx + n]);
                idx += n;
            }
        }
    }
}

/// Decode an open type at `*pos`, advancing it.
///
/// `limit` bounds the decoded size; a chain of fragments referencing more than that (or
/// running past the buffer) is a bounds error and returns `None`.
pub fn decode_open_type(buf: &[u8], pos: &mut usize, limit: usize) -> Option<Vec<u8>> {
    let mut out = Vec::new();
    loop {
        let chunk = match decode_length(buf, pos)? {
            LengthEncoded::Complete(n) => {
                copy_chunk(buf, pos, n, limit, &mut out)?;
                return Some(out);
            }
            LengthEncoded::Fragment(n) => n,
        };
        copy_chunk(buf, pos, chunk, limit, &mut out)?;
    }
}

fn copy_chunk(
    buf: &[u8],
    pos: &mut usize,
    n: usize,
    limit: usize,
    out: &mut Vec<u8>,
) -> Option<()> {
    if out.len() + n > limit {
        trace!("UDPTL open type exceeds limit of {} bytes", limit);
        return None;
    }
    let end = pos.checked_add(n)?;
    if end > buf.len() {
        trace!("UDPTL open type runs past end of packet");
        return None;
    }
    out.extend_from_slice(&buf[*pos..end]);
    *pos = end;
    Some(())
}
