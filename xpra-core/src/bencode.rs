//! Bencode encoder and decoder.
//!
//! ```text
//! integer      i<digits>e
//! byte string  <length>:<bytes>
//! list         l<items>e
//! mapping      d<key><value>...e     keys sorted by raw bytes
//! ```
//!
//! The decoder is a single-pass recursive descent over a byte slice with
//! an explicit cursor. It never indexes past the slice: running out of
//! input is [`DecodeError::Truncated`].

use std::collections::BTreeMap;

use crate::error::DecodeError;
use crate::value::Value;

/// Maximum list/mapping nesting accepted by the decoder.
pub const MAX_DEPTH: usize = 64;

// ── Encoding ─────────────────────────────────────────────────────

/// Encode a value into a fresh buffer.
pub fn encode(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    encode_into(value, &mut out);
    out
}

/// Append the encoding of `value` to `out`.
pub fn encode_into(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Int(i) => {
            out.push(b'i');
            out.extend_from_slice(i.to_string().as_bytes());
            out.push(b'e');
        }
        Value::Bytes(b) => encode_bytes(b, out),
        Value::List(items) => {
            out.push(b'l');
            for item in items {
                encode_into(item, out);
            }
            out.push(b'e');
        }
        Value::Dict(entries) => {
            out.push(b'd');
            // BTreeMap iterates in raw byte order.
            for (k, v) in entries {
                encode_bytes(k, out);
                encode_into(v, out);
            }
            out.push(b'e');
        }
    }
}

fn encode_bytes(b: &[u8], out: &mut Vec<u8>) {
    out.extend_from_slice(b.len().to_string().as_bytes());
    out.push(b':');
    out.extend_from_slice(b);
}

// ── Decoding ─────────────────────────────────────────────────────

/// Decode one value starting at `offset`.
///
/// Returns the value and the offset just past it.
pub fn decode(raw: &[u8], offset: usize) -> Result<(Value, usize), DecodeError> {
    decode_at(raw, offset, 0)
}

/// Decode exactly one value spanning the whole buffer.
pub fn decode_all(raw: &[u8]) -> Result<Value, DecodeError> {
    let (value, end) = decode(raw, 0)?;
    if end != raw.len() {
        return Err(DecodeError::TrailingBytes { offset: end });
    }
    Ok(value)
}

fn decode_at(raw: &[u8], offset: usize, depth: usize) -> Result<(Value, usize), DecodeError> {
    let tag = *raw.get(offset).ok_or(DecodeError::Truncated { offset })?;
    match tag {
        b'i' => decode_int(raw, offset),
        b'l' => {
            let depth = nest(depth, offset)?;
            let mut items = Vec::new();
            let mut f = offset + 1;
            while peek(raw, f)? != b'e' {
                let (item, next) = decode_at(raw, f, depth)?;
                items.push(item);
                f = next;
            }
            Ok((Value::List(items), f + 1))
        }
        b'd' => {
            let depth = nest(depth, offset)?;
            let mut entries = BTreeMap::new();
            let mut last_key: Option<Vec<u8>> = None;
            let mut f = offset + 1;
            while peek(raw, f)? != b'e' {
                let key_offset = f;
                let (key, next) = match peek(raw, f)? {
                    b'0'..=b'9' => decode_string(raw, f)?,
                    byte => return Err(DecodeError::InvalidTag { byte, offset: f }),
                };
                if last_key.as_ref().is_some_and(|last| *last >= key) {
                    return Err(DecodeError::UnsortedKeys { offset: key_offset });
                }
                let (value, next) = decode_at(raw, next, depth)?;
                last_key = Some(key.clone());
                entries.insert(key, value);
                f = next;
            }
            Ok((Value::Dict(entries), f + 1))
        }
        b'0'..=b'9' => {
            let (bytes, next) = decode_string(raw, offset)?;
            Ok((Value::Bytes(bytes), next))
        }
        byte => Err(DecodeError::InvalidTag { byte, offset }),
    }
}

fn peek(raw: &[u8], offset: usize) -> Result<u8, DecodeError> {
    raw.get(offset)
        .copied()
        .ok_or(DecodeError::Truncated { offset })
}

fn nest(depth: usize, offset: usize) -> Result<usize, DecodeError> {
    if depth >= MAX_DEPTH {
        return Err(DecodeError::DepthExceeded {
            max: MAX_DEPTH,
            offset,
        });
    }
    Ok(depth + 1)
}

fn find(raw: &[u8], from: usize, needle: u8) -> Option<usize> {
    raw.get(from..)?
        .iter()
        .position(|&b| b == needle)
        .map(|p| from + p)
}

fn decode_int(raw: &[u8], offset: usize) -> Result<(Value, usize), DecodeError> {
    let start = offset + 1;
    let end = find(raw, start, b'e').ok_or(DecodeError::Truncated { offset: raw.len() })?;
    let digits = &raw[start..end];
    let valid = match digits {
        [] | [b'-'] => false,
        [b'-', rest @ ..] => rest.iter().all(u8::is_ascii_digit),
        _ => digits.iter().all(u8::is_ascii_digit),
    };
    if !valid {
        return Err(DecodeError::InvalidInteger { offset });
    }
    let n = std::str::from_utf8(digits)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or(DecodeError::InvalidInteger { offset })?;
    Ok((Value::Int(n), end + 1))
}

fn decode_string(raw: &[u8], offset: usize) -> Result<(Vec<u8>, usize), DecodeError> {
    let colon = find(raw, offset, b':').ok_or(DecodeError::Truncated { offset: raw.len() })?;
    let digits = &raw[offset..colon];
    if !digits.iter().all(u8::is_ascii_digit) {
        return Err(DecodeError::InvalidLength { offset });
    }
    let len = std::str::from_utf8(digits)
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .ok_or(DecodeError::InvalidLength { offset })?;
    let start = colon + 1;
    let end = start
        .checked_add(len)
        .ok_or(DecodeError::InvalidLength { offset })?;
    let bytes = raw
        .get(start..end)
        .ok_or(DecodeError::Truncated { offset: raw.len() })?;
    Ok((bytes.to_vec(), end))
}
