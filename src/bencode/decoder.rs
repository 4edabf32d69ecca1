use super::BencodeValue;
use crate::error::{Result, SwarmError};
use std::collections::BTreeMap;
use std::ops::Range;

/// Nesting limit for lists and dictionaries. Peers hand us bencode directly,
/// so recursion has to be bounded.
const MAX_DEPTH: usize = 64;

/// Decode a complete bencoded buffer. Trailing bytes are an error.
pub fn decode(data: &[u8]) -> Result<BencodeValue> {
    let (value, consumed) = decode_prefix(data)?;
    if consumed != data.len() {
        return Err(malformed(format!(
            "{} trailing bytes after value",
            data.len() - consumed
        )));
    }
    Ok(value)
}

/// Decode the first value in `data` and report how many bytes it occupied.
///
/// Anything after the value is left untouched, which is how metadata
/// responses (a dictionary header followed by raw bytes) are split.
pub fn decode_prefix(data: &[u8]) -> Result<(BencodeValue, usize)> {
    let mut pos = 0;
    let value = decode_value(data, &mut pos, 0)?;
    Ok((value, pos))
}

/// Locate the raw bytes of `key`'s value inside a top-level dictionary.
///
/// Used to hash the `info` dictionary exactly as it appeared on disk.
pub fn dict_value_span(data: &[u8], key: &[u8]) -> Result<Option<Range<usize>>> {
    if data.first() != Some(&b'd') {
        return Err(malformed("expected a dictionary".to_string()));
    }

    let mut pos = 1;
    while pos < data.len() && data[pos] != b'e' {
        let current = decode_key(data, &mut pos)?;
        let start = pos;
        decode_value(data, &mut pos, 1)?;
        if current == key {
            return Ok(Some(start..pos));
        }
    }

    if pos >= data.len() {
        return Err(malformed("unterminated dictionary".to_string()));
    }

    Ok(None)
}

fn malformed(reason: String) -> SwarmError {
    SwarmError::MalformedEncoding(reason)
}

fn decode_value(data: &[u8], pos: &mut usize, depth: usize) -> Result<BencodeValue> {
    if depth > MAX_DEPTH {
        return Err(malformed("nesting too deep".to_string()));
    }

    let Some(&token) = data.get(*pos) else {
        return Err(malformed("unexpected end of input".to_string()));
    };

    match token {
        b'i' => decode_integer(data, pos),
        b'l' => decode_list(data, pos, depth),
        b'd' => decode_dict(data, pos, depth),
        b'0'..=b'9' => decode_string(data, pos).map(BencodeValue::String),
        c => Err(malformed(format!(
            "invalid token {:?} at offset {}",
            c as char, *pos
        ))),
    }
}

fn decode_integer(data: &[u8], pos: &mut usize) -> Result<BencodeValue> {
    *pos += 1; // 'i'

    let start = *pos;
    let end = data[start..]
        .iter()
        .position(|&b| b == b'e')
        .map(|offset| start + offset)
        .ok_or_else(|| malformed("unterminated integer".to_string()))?;

    let digits = &data[start..end];
    let unsigned = digits.strip_prefix(b"-").unwrap_or(digits);
    if unsigned.is_empty() || !unsigned.iter().all(u8::is_ascii_digit) {
        return Err(malformed(format!(
            "invalid integer {:?}",
            String::from_utf8_lossy(digits)
        )));
    }

    let num = std::str::from_utf8(digits)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| malformed("integer out of range".to_string()))?;

    *pos = end + 1; // 'e'
    Ok(BencodeValue::Integer(num))
}

fn decode_string(data: &[u8], pos: &mut usize) -> Result<Vec<u8>> {
    let start = *pos;
    let colon = data[start..]
        .iter()
        .position(|&b| b == b':')
        .map(|offset| start + offset)
        .ok_or_else(|| malformed("missing ':' after string length".to_string()))?;

    let len_digits = &data[start..colon];
    if len_digits.is_empty() || !len_digits.iter().all(u8::is_ascii_digit) {
        return Err(malformed("non-numeric string length".to_string()));
    }

    let len = std::str::from_utf8(len_digits)
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .ok_or_else(|| malformed("string length out of range".to_string()))?;

    let body = colon + 1;
    let end = body
        .checked_add(len)
        .filter(|&end| end <= data.len())
        .ok_or_else(|| {
            malformed(format!(
                "string length {} exceeds the {} bytes available",
                len,
                data.len().saturating_sub(body)
            ))
        })?;

    *pos = end;
    Ok(data[body..end].to_vec())
}

fn decode_list(data: &[u8], pos: &mut usize, depth: usize) -> Result<BencodeValue> {
    *pos += 1; // 'l'

    let mut list = Vec::new();
    while *pos < data.len() && data[*pos] != b'e' {
        list.push(decode_value(data, pos, depth + 1)?);
    }

    if *pos >= data.len() {
        return Err(malformed("unterminated list".to_string()));
    }

    *pos += 1; // 'e'
    Ok(BencodeValue::List(list))
}

fn decode_key(data: &[u8], pos: &mut usize) -> Result<Vec<u8>> {
    match data.get(*pos) {
        Some(b'0'..=b'9') => decode_string(data, pos),
        _ => Err(malformed("dictionary key must be a string".to_string())),
    }
}

fn decode_dict(data: &[u8], pos: &mut usize, depth: usize) -> Result<BencodeValue> {
    *pos += 1; // 'd'

    let mut dict = BTreeMap::new();
    while *pos < data.len() && data[*pos] != b'e' {
        let key = decode_key(data, pos)?;

        if data.get(*pos) == Some(&b'e') {
            return Err(malformed(format!(
                "dictionary key {:?} has no value",
                String::from_utf8_lossy(&key)
            )));
        }

        let value = decode_value(data, pos, depth + 1)?;
        if dict.contains_key(&key) {
            return Err(malformed(format!(
                "duplicate dictionary key {:?}",
                String::from_utf8_lossy(&key)
            )));
        }
        dict.insert(key, value);
    }

    if *pos >= data.len() {
        return Err(malformed("unterminated dictionary".to_string()));
    }

    *pos += 1; // 'e'
    Ok(BencodeValue::Dict(dict))
}
