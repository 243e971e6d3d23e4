//! LZW dictionary substitution.
//!
//! Layout: `b"LZW1"`, decoded length as big-endian u32, then 16-bit
//! big-endian codes. The dictionary grows until 65 536 entries and is frozen
//! after that.

use std::collections::HashMap;

const MAGIC: &[u8; 4] = b"LZW1";
const HEADER_LEN: usize = MAGIC.len() + 4;
const MAX_CODES: usize = 1 << 16;
const ROOT: u32 = u32::MAX;

pub(crate) fn encode(input: &[u8]) -> Result<Vec<u8>, String> {
    let declared_len = u32::try_from(input.len()).map_err(|_| "input exceeds 4 GiB".to_string())?;
    let mut out = Vec::with_capacity(HEADER_LEN + input.len() / 2);
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&declared_len.to_be_bytes());

    let Some((&first, rest)) = input.split_first() else {
        return Ok(out);
    };

    let mut dictionary: HashMap<(u16, u8), u16> = HashMap::new();
    let mut next_code = 256usize;
    let mut current = u16::from(first);

    for &byte in rest {
        if let Some(&code) = dictionary.get(&(current, byte)) {
            current = code;
            continue;
        }
        out.extend_from_slice(&current.to_be_bytes());
        if next_code < MAX_CODES {
            dictionary.insert((current, byte), next_code as u16);
            next_code += 1;
        }
        current = u16::from(byte);
    }
    out.extend_from_slice(&current.to_be_bytes());
    Ok(out)
}

pub(crate) fn decode(input: &[u8]) -> Result<Vec<u8>, String> {
    if input.len() < HEADER_LEN || &input[..MAGIC.len()] != MAGIC {
        return Err("missing LZW header".into());
    }
    let mut len_bytes = [0u8; 4];
    len_bytes.copy_from_slice(&input[MAGIC.len()..HEADER_LEN]);
    let declared_len = u32::from_be_bytes(len_bytes) as usize;

    let body = &input[HEADER_LEN..];
    if body.len() % 2 != 0 {
        return Err("truncated code stream".into());
    }

    // Each entry is (prefix code, last byte); roots have no prefix.
    let mut entries: Vec<(u32, u8)> = (0..=255u8).map(|b| (ROOT, b)).collect();
    // The header is untrusted until the stream has been decoded.
    let mut out = Vec::with_capacity(declared_len.min(body.len().saturating_mul(8)));
    let mut previous: Option<u16> = None;
    let mut scratch = Vec::new();

    for pair in body.chunks_exact(2) {
        let code = u16::from_be_bytes([pair[0], pair[1]]);
        let index = usize::from(code);

        scratch.clear();
        if index < entries.len() {
            expand(&entries, index, &mut scratch);
        } else if index == entries.len() && entries.len() < MAX_CODES {
            let prev = previous.ok_or_else(|| format!("code {code} before any literal"))?;
            expand(&entries, usize::from(prev), &mut scratch);
            let head = scratch[0];
            scratch.push(head);
        } else {
            return Err(format!("code {code} outside dictionary of {}", entries.len()));
        }

        if let Some(prev) = previous {
            if entries.len() < MAX_CODES {
                entries.push((u32::from(prev), scratch[0]));
            }
        }
        out.extend_from_slice(&scratch);
        if out.len() > declared_len {
            return Err("decoded data longer than declared".into());
        }
        previous = Some(code);
    }

    if out.len() != declared_len {
        return Err(format!(
            "decoded {} bytes, header declared {declared_len}",
            out.len()
        ));
    }
    Ok(out)
}

fn expand(entries: &[(u32, u8)], mut index: usize, buf: &mut Vec<u8>) {
    let start = buf.len();
    loop {
        let (prefix, byte) = entries[index];
        buf.push(byte);
        if prefix == ROOT {
            break;
        }
        index = prefix as usize;
    }
    buf[start..].reverse();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_repetitive_text() {
        let input = br#"{"type":"tree","type":"tree","type":"tree","type":"tree"}"#.repeat(40);
        let encoded = encode(&input).unwrap();
        assert!(encoded.len() < input.len() / 2);
        assert_eq!(decode(&encoded).unwrap(), input);
    }

    #[test]
    fn round_trip_edge_inputs() {
        for input in [Vec::new(), vec![7u8], b"aaaaaaaaaaaaaaaaaaaaaa".to_vec(), (0..=255u8).collect()] {
            assert_eq!(decode(&encode(&input).unwrap()).unwrap(), input);
        }
    }

    #[test]
    fn round_trip_past_dictionary_limit() {
        // Enough distinct pairs to fill and freeze the dictionary.
        let input: Vec<u8> = (0..400_000u32)
            .map(|i| (i.wrapping_mul(2_654_435_761) >> 13) as u8)
            .collect();
        assert_eq!(decode(&encode(&input).unwrap()).unwrap(), input);
    }

    #[test]
    fn rejects_foreign_bytes() {
        assert!(decode(b"not-real-compressed-bytes").is_err());
        assert!(decode(b"LZW1").is_err());
    }

    #[test]
    fn rejects_out_of_range_code() {
        let mut forged = b"LZW1".to_vec();
        forged.extend_from_slice(&3u32.to_be_bytes());
        forged.extend_from_slice(&0x0041u16.to_be_bytes());
        forged.extend_from_slice(&0x0400u16.to_be_bytes());
        assert!(decode(&forged).is_err());
    }

    #[test]
    fn rejects_length_mismatch() {
        let mut encoded = encode(b"hello hello hello").unwrap();
        encoded[7] = encoded[7].wrapping_add(1);
        assert!(decode(&encoded).is_err());
    }
}
