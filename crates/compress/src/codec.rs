use std::io::{Read, Write};

use crate::{Algorithm, CompressError, delta, lzw};

/// zstd levels standing in for the 1..=9 deflate-style scale.
const ZSTD_LEVELS: [i32; 9] = [1, 2, 3, 5, 7, 9, 12, 15, 19];

/// Byte-to-byte transform behind one algorithm tag.
pub(crate) trait Codec {
    fn encode(&self, input: &[u8], level: u8) -> Result<Vec<u8>, CompressError>;
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>, CompressError>;
}

impl Codec for Algorithm {
    fn encode(&self, input: &[u8], level: u8) -> Result<Vec<u8>, CompressError> {
        let algorithm = *self;
        let fail = |reason: String| CompressError::encode(algorithm, reason);
        match algorithm {
            Algorithm::None => Ok(input.to_vec()),
            Algorithm::Lz => lzw::encode(input).map_err(fail),
            Algorithm::Gzip => zstd_compress(input, level).map_err(|e| fail(e.to_string())),
            Algorithm::Delta => delta::encode(input).map_err(fail),
            Algorithm::DeltaGzip => {
                let structural = delta::encode(input).map_err(fail)?;
                zstd_compress(&structural, level).map_err(|e| fail(e.to_string()))
            }
        }
    }

    fn decode(&self, input: &[u8]) -> Result<Vec<u8>, CompressError> {
        let algorithm = *self;
        let fail = |reason: String| CompressError::decompression(algorithm, reason);
        match algorithm {
            Algorithm::None => Ok(input.to_vec()),
            Algorithm::Lz => lzw::decode(input).map_err(fail),
            Algorithm::Gzip => zstd_decompress(input).map_err(|e| fail(e.to_string())),
            Algorithm::Delta => delta::decode(input).map_err(fail),
            Algorithm::DeltaGzip => {
                let structural = zstd_decompress(input).map_err(|e| fail(e.to_string()))?;
                delta::decode(&structural).map_err(fail)
            }
        }
    }
}

fn zstd_level(level: u8) -> i32 {
    let index = usize::from(level.clamp(1, 9)) - 1;
    ZSTD_LEVELS[index]
}

fn zstd_compress(data: &[u8], level: u8) -> std::io::Result<Vec<u8>> {
    let mut encoder = zstd::Encoder::new(Vec::new(), zstd_level(level))?;
    encoder.write_all(data)?;
    encoder.finish()
}

fn zstd_decompress(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut decoder = zstd::Decoder::new(data)?;
    let mut buf = Vec::new();
    decoder.read_to_end(&mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &[u8] = br#"{"branches":[],"elements":[{"id":"a","type":"rock"},{"id":"b","type":"rock"}]}"#;

    #[test]
    fn every_algorithm_round_trips_bytes() {
        for algorithm in [
            Algorithm::None,
            Algorithm::Lz,
            Algorithm::Gzip,
            Algorithm::Delta,
            Algorithm::DeltaGzip,
        ] {
            let encoded = algorithm.encode(SAMPLE, 6).unwrap();
            assert_eq!(algorithm.decode(&encoded).unwrap(), SAMPLE, "{algorithm}");
        }
    }

    #[test]
    fn level_mapping_is_monotonic() {
        assert!(ZSTD_LEVELS.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(zstd_level(0), 1);
        assert_eq!(zstd_level(200), 19);
    }

    #[test]
    fn gzip_rejects_foreign_bytes() {
        let err = Algorithm::Gzip.decode(b"plain text, no frame").unwrap_err();
        assert!(matches!(
            err,
            CompressError::Decompression {
                algorithm: Algorithm::Gzip,
                ..
            }
        ));
    }
}
