//! Deterministic cache keys and frame (de)compression.
//!
//! Grounds: URL normalization follows the same scheme/host/path canonicalization
//! `content_saver::cache_check::normalize_url_for_cache_matching` used for etag
//! matching in the codebase this was distilled from, extended here to also sort
//! query parameters and drop fragments per the cache-key contract. The frame
//! layout and the compress/decompress pairing follow the
//! `content_saver::compression::save_compressed_file` pattern of picking an
//! algorithm, writing a small header, and round-tripping through
//! `tokio::task::spawn_blocking` for CPU-bound work.

mod codec;
mod request;

pub use codec::{decode, encode, Algorithm, CodecError};
pub use request::{fingerprint, normalize_url, FingerprintInput, FingerprintError};
