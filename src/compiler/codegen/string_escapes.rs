//! String literal escape handling.
//!
//! The decoder supports `\n \r \t \\ \" \0 \xHH`. Unknown escapes are
//! emitted verbatim (the backslash and the following character both copied
//! through), which source compatibility requires; the caller surfaces a
//! warning for them. The encoder is the exact inverse over the known set.

/// Result of decoding a string literal's source text
pub struct DecodedString {
    pub bytes: Vec<u8>,
    /// Characters that followed a backslash without forming a known escape
    pub unknown_escapes: Vec<char>,
}

/// Decode the source text of a string literal into the bytes it denotes.
pub fn decode(source: &str) -> DecodedString {
    let mut bytes = Vec::with_capacity(source.len());
    let mut unknown_escapes = Vec::new();
    let mut chars = source.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\\' {
            let mut buf = [0u8; 4];
            bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            continue;
        }

        match chars.next() {
            Some('n') => bytes.push(b'\n'),
            Some('r') => bytes.push(b'\r'),
            Some('t') => bytes.push(b'\t'),
            Some('\\') => bytes.push(b'\\'),
            Some('"') => bytes.push(b'"'),
            Some('0') => bytes.push(0),
            Some('x') => {
                let hi = chars.peek().copied().and_then(|c| c.to_digit(16));
                if let Some(hi) = hi {
                    chars.next();
                    let lo = chars.peek().copied().and_then(|c| c.to_digit(16));
                    if let Some(lo) = lo {
                        chars.next();
                        bytes.push((hi * 16 + lo) as u8);
                    } else {
                        // \xH with a single digit still decodes
                        bytes.push(hi as u8);
                    }
                } else {
                    // no hex digits at all: emit verbatim
                    bytes.push(b'\\');
                    bytes.push(b'x');
                    unknown_escapes.push('x');
                }
            }
            Some(other) => {
                // unknown escape: backslash and character copied through
                bytes.push(b'\\');
                let mut buf = [0u8; 4];
                bytes.extend_from_slice(other.encode_utf8(&mut buf).as_bytes());
                unknown_escapes.push(other);
            }
            None => {
                // trailing backslash, copied through
                bytes.push(b'\\');
            }
        }
    }

    DecodedString {
        bytes,
        unknown_escapes,
    }
}

/// Encode raw bytes back into literal source text, escaping exactly the set
/// the decoder understands. `decode(encode(b)).bytes == b` for any input.
pub fn encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());

    for &b in bytes {
        match b {
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            b'\\' => out.push_str("\\\\"),
            b'"' => out.push_str("\\\""),
            0 => out.push_str("\\0"),
            0x20..=0x7e => out.push(b as char),
            _ => out.push_str(&format!("\\x{b:02x}")),
        }
    }

    out
}
