//! Frame (de)compression: size-based algorithm selection behind a fixed 7-byte header.
//!
//! Frame layout: `magic(2)=0x5343 | algo(1) | uncompressed_len(u32 BE) | payload`.

use std::io::{Read, Write};

const MAGIC: [u8; 2] = [0x53, 0x43];
const HEADER_LEN: usize = 7;

const LZ4_THRESHOLD: usize = 64 * 1024;
const GZIP_THRESHOLD: usize = 1024 * 1024;

/// Compression algorithm tag, stable per the external cache-payload contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    Gzip = 1,
    Lz4 = 2,
    Brotli = 3,
}

impl Algorithm {
    const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::Gzip),
            2 => Some(Self::Lz4),
            3 => Some(Self::Brotli),
            _ => None,
        }
    }

    /// Choose an algorithm by payload size: lz4 below 64 KiB, gzip up to 1 MiB,
    /// brotli above.
    #[must_use]
    pub fn select(uncompressed_len: usize) -> Self {
        if uncompressed_len < LZ4_THRESHOLD {
            Self::Lz4
        } else if uncompressed_len <= GZIP_THRESHOLD {
            Self::Gzip
        } else {
            Self::Brotli
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("corrupt frame: {0}")]
    CorruptFrame(String),
    #[error("compression failed: {0}")]
    CompressionFailed(String),
}

/// Encode `data` into a self-describing frame, picking the algorithm by size.
pub fn encode(data: &[u8]) -> Result<Vec<u8>, CodecError> {
    encode_with(data, Algorithm::select(data.len()))
}

/// Encode `data` with an explicitly chosen algorithm (used by tests and by
/// callers that want to pin an algorithm regardless of the size policy).
pub fn encode_with(data: &[u8], algo: Algorithm) -> Result<Vec<u8>, CodecError> {
    let payload = match algo {
        Algorithm::Gzip => {
            let mut encoder =
                flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::new(3));
            encoder
                .write_all(data)
                .map_err(|e| CodecError::CompressionFailed(e.to_string()))?;
            encoder
                .finish()
                .map_err(|e| CodecError::CompressionFailed(e.to_string()))?
        }
        Algorithm::Lz4 => lz4_flex::compress_prepend_size(data),
        Algorithm::Brotli => {
            let mut out = Vec::new();
            let params = brotli::enc::BrotliEncoderParams::default();
            brotli::BrotliCompress(&mut std::io::Cursor::new(data), &mut out, &params)
                .map_err(|e| CodecError::CompressionFailed(e.to_string()))?;
            out
        }
    };

    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.extend_from_slice(&MAGIC);
    frame.push(algo as u8);
    #[allow(clippy::cast_possible_truncation)]
    frame.extend_from_slice(&(data.len() as u32).to_be_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Decode a frame produced by [`encode`]/[`encode_with`], rejecting anything that
/// does not start with the magic bytes or names an unknown algorithm.
pub fn decode(frame: &[u8]) -> Result<Vec<u8>, CodecError> {
    if frame.len() < HEADER_LEN {
        return Err(CodecError::CorruptFrame("frame shorter than header".into()));
    }
    if frame[0..2] != MAGIC {
        return Err(CodecError::CorruptFrame("magic mismatch".into()));
    }
    let algo = Algorithm::from_tag(frame[2])
        .ok_or_else(|| CodecError::CorruptFrame(format!("unknown algorithm tag {}", frame[2])))?;
    let uncompressed_len =
        u32::from_be_bytes([frame[3], frame[4], frame[5], frame[6]]) as usize;
    let payload = &frame[HEADER_LEN..];

    let data = match algo {
        Algorithm::Gzip => {
            let mut decoder = flate2::read::GzDecoder::new(payload);
            let mut out = Vec::with_capacity(uncompressed_len);
            decoder
                .read_to_end(&mut out)
                .map_err(|e| CodecError::CorruptFrame(e.to_string()))?;
            out
        }
        Algorithm::Lz4 => lz4_flex::decompress_size_prepended(payload)
            .map_err(|e| CodecError::CorruptFrame(e.to_string()))?,
        Algorithm::Brotli => {
            let mut out = Vec::with_capacity(uncompressed_len);
            brotli::BrotliDecompress(&mut std::io::Cursor::new(payload), &mut out)
                .map_err(|e| CodecError::CorruptFrame(e.to_string()))?;
            out
        }
    };

    if data.len() != uncompressed_len {
        return Err(CodecError::CorruptFrame(format!(
            "length mismatch: header says {uncompressed_len}, got {}",
            data.len()
        )));
    }

    Ok(data)
}
