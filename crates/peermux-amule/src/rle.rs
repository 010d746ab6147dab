//! RLE codecs for the segment buffers shipped with download snapshots.
//!
//! Byte RLE grammar: `[v, v, n]` expands to `n` copies of `v`; an isolated
//! byte emits itself; a terminal `[v, w]` with `v != w` emits both; a
//! terminal `[v, v]` with no trailing length decodes as two literal bytes.
//! Runs longer than 255 are encoded as adjacent triples.
//!
//! The uint64 form byte-RLE decodes first, then reads the buffer as a
//! column-major byte-interleaved matrix of width `len / 8`: byte `j` of
//! value `i` lives at `i + j * size`, little-endian.

/// Fixed ED2K part size in bytes.
pub const PART_SIZE: u64 = 9_728_000;

/// Decode a byte-RLE buffer.
///
/// Malformed input (a length byte past the end) degrades gracefully: the
/// incomplete triple decodes as two literal bytes.
#[must_use]
pub fn decode_bytes(encoded: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(encoded.len());
    let mut i = 0;
    while i < encoded.len() {
        let v = encoded[i];
        if i + 1 < encoded.len() && encoded[i + 1] == v {
            if i + 2 < encoded.len() {
                let n = encoded[i + 2] as usize;
                out.extend(std::iter::repeat_n(v, n));
                i += 3;
            } else {
                // Incomplete terminal triple: two literals.
                out.push(v);
                out.push(v);
                i += 2;
            }
        } else {
            out.push(v);
            i += 1;
        }
    }
    out
}

/// Encode a buffer into canonical byte-RLE form.
///
/// Canonical: runs of two or more become `[v, v, n]` triples, chunked at
/// 255; a leftover single byte is a literal; zero-length leftovers emit
/// nothing. `decode_bytes` inverts this exactly.
#[must_use]
pub fn encode_bytes(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        let v = raw[i];
        let mut run = 1;
        while i + run < raw.len() && raw[i + run] == v {
            run += 1;
        }
        let mut remaining = run;
        while remaining >= 2 {
            let chunk = remaining.min(255);
            out.push(v);
            out.push(v);
            out.push(u8::try_from(chunk).unwrap_or(255));
            remaining -= chunk;
        }
        if remaining == 1 {
            out.push(v);
        }
        i += run;
    }
    out
}

/// Decode a byte-RLE buffer of interleaved u64 values.
#[must_use]
pub fn decode_u64s(encoded: &[u8]) -> Vec<u64> {
    let bytes = decode_bytes(encoded);
    let size = bytes.len() / 8;
    let mut out = Vec::with_capacity(size);
    for i in 0..size {
        let mut value = 0_u64;
        for j in 0..8 {
            value |= u64::from(bytes[i + j * size]) << (8 * j);
        }
        out.push(value);
    }
    out
}

/// Encode u64 values into the interleaved byte-RLE form.
#[must_use]
pub fn encode_u64s(values: &[u64]) -> Vec<u8> {
    let size = values.len();
    let mut bytes = vec![0_u8; size * 8];
    for (i, value) in values.iter().enumerate() {
        for j in 0..8 {
            bytes[i + j * size] = u8::try_from((value >> (8 * j)) & 0xff).unwrap_or(0);
        }
    }
    encode_bytes(&bytes)
}

/// Decode a `partStatus` buffer into per-part source counts.
#[must_use]
pub fn decode_part_status(encoded: &[u8]) -> Vec<u8> {
    decode_bytes(encoded)
}

/// Decode a `gapStatus`/`reqStatus` buffer into `[start, end)` pairs.
///
/// A trailing unpaired value is dropped rather than inventing an open
/// range.
#[must_use]
pub fn decode_ranges(encoded: &[u8]) -> Vec<(u64, u64)> {
    let values = decode_u64s(encoded);
    values
        .chunks_exact(2)
        .map(|pair| (pair[0], pair[1]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn triple_expands_to_run() {
        assert_eq!(decode_bytes(&[7, 7, 4]), vec![7, 7, 7, 7]);
    }

    #[test]
    fn isolated_bytes_pass_through() {
        assert_eq!(decode_bytes(&[1, 2, 3]), vec![1, 2, 3]);
    }

    #[test]
    fn terminal_distinct_pair_emits_both() {
        assert_eq!(decode_bytes(&[9, 9, 2, 5, 6]), vec![9, 9, 5, 6]);
    }

    #[test]
    fn terminal_equal_pair_is_two_literals() {
        assert_eq!(decode_bytes(&[3, 3]), vec![3, 3]);
        assert_eq!(decode_bytes(&[1, 3, 3]), vec![1, 3, 3]);
    }

    #[test]
    fn zero_length_run_emits_nothing() {
        assert_eq!(decode_bytes(&[5, 5, 0, 1]), vec![1]);
    }

    #[test]
    fn long_runs_use_adjacent_triples() {
        let raw = vec![0xaa_u8; 300];
        let encoded = encode_bytes(&raw);
        assert_eq!(encoded, vec![0xaa, 0xaa, 255, 0xaa, 0xaa, 45]);
        assert_eq!(decode_bytes(&encoded), raw);
    }

    #[test]
    fn encode_decode_round_trip_on_canonical_buffers() {
        let cases: Vec<Vec<u8>> = vec![
            vec![],
            vec![1],
            vec![1, 1],
            vec![1, 1, 1],
            vec![0; 255],
            vec![0; 256],
            vec![1, 2, 2, 2, 3, 3, 4],
        ];
        for raw in cases {
            let encoded = encode_bytes(&raw);
            assert_eq!(decode_bytes(&encoded), raw, "raw {raw:?}");
            // The decoder is lossless on valid (canonical) input.
            assert_eq!(encode_bytes(&decode_bytes(&encoded)), encoded);
        }
    }

    #[test]
    fn u64_matrix_interleaving_round_trips() {
        let values = vec![0, 1, PART_SIZE, u64::MAX, 0x0102_0304_0506_0708];
        let encoded = encode_u64s(&values);
        assert_eq!(decode_u64s(&encoded), values);
    }

    #[test]
    fn u64_decode_ignores_trailing_partial_value() {
        // 9 decoded bytes: size = 1, one value from bytes 0..8 interleaved.
        let mut bytes = vec![0_u8; 9];
        bytes[0] = 0x2a;
        let encoded = encode_bytes(&bytes);
        assert_eq!(decode_u64s(&encoded), vec![0x2a]);
    }

    #[test]
    fn gap_ranges_pair_consecutive_values() {
        let encoded = encode_u64s(&[0, PART_SIZE, PART_SIZE * 2, PART_SIZE * 3]);
        assert_eq!(
            decode_ranges(&encoded),
            vec![(0, PART_SIZE), (PART_SIZE * 2, PART_SIZE * 3)]
        );
    }

    #[test]
    fn unpaired_range_value_is_dropped() {
        let encoded = encode_u64s(&[0, 10, 20]);
        assert_eq!(decode_ranges(&encoded), vec![(0, 10)]);
    }

    #[test]
    fn part_status_decodes_source_counts() {
        let encoded = encode_bytes(&[3, 3, 3, 0, 1]);
        assert_eq!(decode_part_status(&encoded), vec![3, 3, 3, 0, 1]);
    }
}
