//! Domain-name wire encoding/decoding, including compression-pointer following
//! (RFC 1035 §4.1.4). Compression is common in upstream responses even though
//! this resolver never emits compressed names itself.

use std::io;

const MAX_POINTER_JUMPS: usize = 64;

/// Encode a presentation-format name (trailing dot optional) into the
/// length-prefixed label sequence terminated by a zero octet.
pub fn encode_name(name: &str) -> Vec<u8> {
    let trimmed = name.strip_suffix('.').unwrap_or(name);
    let mut out = Vec::with_capacity(trimmed.len() + 2);
    if !trimmed.is_empty() {
        for label in trimmed.split('.') {
            let bytes = label.as_bytes();
            out.push(bytes.len() as u8);
            out.extend_from_slice(bytes);
        }
    }
    out.push(0);
    out
}

/// Decode a name starting at `pos` within the full packet buffer, following
/// compression pointers as needed. Returns the presentation-format name
/// (trailing dot included) and the offset just past the name as it appeared
/// at the original `pos` (i.e. not following any jump).
pub fn decode_name(buf: &[u8], pos: usize) -> io::Result<(String, usize)> {
    let mut labels: Vec<String> = Vec::new();
    let mut cursor = pos;
    let mut end_of_original: Option<usize> = None;
    let mut jumps = 0usize;

    loop {
        let len_byte = *buf
            .get(cursor)
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "truncated name"))?;

        if len_byte == 0 {
            cursor += 1;
            if end_of_original.is_none() {
                end_of_original = Some(cursor);
            }
            break;
        }

        if len_byte & 0xC0 == 0xC0 {
            let second = *buf.get(cursor + 1).ok_or_else(|| {
                io::Error::new(io::ErrorKind::UnexpectedEof, "truncated compression pointer")
            })?;
            if end_of_original.is_none() {
                end_of_original = Some(cursor + 2);
            }
            jumps += 1;
            if jumps > MAX_POINTER_JUMPS {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "compression pointer loop",
                ));
            }
            let pointer = (((len_byte & 0x3F) as usize) << 8) | second as usize;
            if pointer >= cursor {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "compression pointer does not point backward",
                ));
            }
            cursor = pointer;
            continue;
        }

        let label_len = len_byte as usize;
        let start = cursor + 1;
        let end = start + label_len;
        let label_bytes = buf.get(start..end).ok_or_else(|| {
            io::Error::new(io::ErrorKind::UnexpectedEof, "truncated label")
        })?;
        labels.push(String::from_utf8_lossy(label_bytes).into_owned());
        cursor = end;
    }

    let name = if labels.is_empty() {
        ".".to_string()
    } else {
        format!("{}.", labels.join("."))
    };

    Ok((name, end_of_original.unwrap_or(cursor)))
}

/// The query fingerprint: `lower(qname) + ":" + qtype_mnemonic`.
pub fn fingerprint(qname: &str, qtype_mnemonic: &str) -> String {
    format!("{}:{}", qname.to_ascii_lowercase(), qtype_mnemonic)
}

/// Normalize a name to lowercase with a guaranteed trailing dot, as used for
/// blocklist/custom-map membership comparisons.
pub fn normalize(name: &str) -> String {
    let lower = name.to_ascii_lowercase();
    if lower.ends_with('.') { lower } else { format!("{lower}.") }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trip() {
        let encoded = encode_name("example.com.");
        let (decoded, end) = decode_name(&encoded, 0).unwrap();
        assert_eq!(decoded, "example.com.");
        assert_eq!(end, encoded.len());
    }

    #[test]
    fn root_name_round_trips() {
        let encoded = encode_name(".");
        let (decoded, _) = decode_name(&encoded, 0).unwrap();
        assert_eq!(decoded, ".");
    }

    #[test]
    fn follows_compression_pointer() {
        let mut buf = encode_name("example.com.");
        let pointer_target = 0u16;
        let pointer_pos = buf.len();
        buf.push(0xC0 | ((pointer_target >> 8) as u8));
        buf.push((pointer_target & 0xFF) as u8);

        let (decoded, end) = decode_name(&buf, pointer_pos).unwrap();
        assert_eq!(decoded, "example.com.");
        assert_eq!(end, pointer_pos + 2);
    }

    #[test]
    fn rejects_pointer_loop() {
        let buf = vec![0xC0, 0x00];
        assert!(decode_name(&buf, 0).is_err());
    }

    #[test]
    fn fingerprint_lowercases_qname() {
        assert_eq!(fingerprint("Example.COM.", "A"), "example.com.:A");
    }
}
