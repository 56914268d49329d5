//! Canonical request form and the fingerprint hash derived from it.

use sha2::{Digest, Sha256};
use url::Url;

use crate::config::OutputFormat;

/// Everything a cache key is derived from.
///
/// `custom_instructions` and (when `use_llm == false`) the LLM model identifier
/// are deliberately excluded from the canonical form by default — see
/// `DESIGN.md`'s "Open questions" section for the rationale behind both exclusions.
#[derive(Debug, Clone)]
pub struct FingerprintInput<'a> {
    pub url: &'a str,
    pub output_format: OutputFormat,
    pub use_llm: bool,
    pub custom_instructions: Option<&'a str>,
}

#[derive(Debug, thiserror::Error)]
pub enum FingerprintError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Normalize a URL for fingerprinting and cache-key stability:
/// lower-case scheme and host, drop default ports, resolve percent-escapes to
/// their canonical form, sort query parameters by key, drop the fragment.
pub fn normalize_url(raw: &str) -> Result<String, FingerprintError> {
    let mut url = Url::parse(raw).map_err(|e| FingerprintError::InvalidUrl(e.to_string()))?;

    url.set_fragment(None);

    let is_default_port = matches!(
        (url.scheme(), url.port()),
        ("http", Some(80)) | ("https", Some(443))
    );
    if is_default_port {
        let _ = url.set_port(None);
    }

    if !url.query().unwrap_or_default().is_empty() {
        let mut pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        pairs.sort_by(|a, b| a.0.cmp(&b.0));

        let mut out = url.clone();
        out.set_query(None);
        {
            let mut serializer = out.query_pairs_mut();
            for (k, v) in &pairs {
                serializer.append_pair(k, v);
            }
        }
        url = out;
    }

    // Url already lower-cases scheme and host during parsing; percent-escapes
    // are normalized by the `url` crate's parser (upper-case hex, minimal escaping).
    Ok(url.to_string())
}

/// Hash a canonical request specification into a lowercase hex-encoded 256-bit digest.
///
/// Deterministic, independent of any map/struct field ordering (the canonical form
/// is assembled as an explicit, fixed-order byte sequence, not a serialized struct),
/// and stable across process restarts and crate versions as long as the canonical
/// form itself does not change.
pub fn fingerprint(input: &FingerprintInput<'_>) -> Result<String, FingerprintError> {
    let normalized_url = normalize_url(input.url)?;

    let mut hasher = Sha256::new();
    hasher.update(b"v1\0");
    hasher.update(normalized_url.as_bytes());
    hasher.update(b"\0");
    hasher.update(input.output_format.as_str().as_bytes());
    hasher.update(b"\0");
    hasher.update(if input.use_llm { b"1" } else { b"0" });

    // `custom_instructions` and the LLM model id never participate in the
    // canonical form when `use_llm == false` — decided in DESIGN.md.
    if input.use_llm {
        if let Some(instructions) = input.custom_instructions {
            hasher.update(b"\0");
            hasher.update(instructions.as_bytes());
        }
    }

    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_scheme_host_case_and_default_port() {
        let a = normalize_url("HTTPS://Example.COM:443/Path").unwrap();
        let b = normalize_url("https://example.com/Path").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn sorts_query_parameters() {
        let a = normalize_url("https://example.com/a?b=2&a=1").unwrap();
        let b = normalize_url("https://example.com/a?a=1&b=2").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn drops_fragment() {
        let a = normalize_url("https://example.com/a#section").unwrap();
        let b = normalize_url("https://example.com/a").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_is_deterministic() {
        let input = FingerprintInput {
            url: "https://example.com/a",
            output_format: OutputFormat::Markdown,
            use_llm: false,
            custom_instructions: None,
        };
        assert_eq!(fingerprint(&input).unwrap(), fingerprint(&input).unwrap());
    }

    #[test]
    fn fingerprint_ignores_instructions_when_llm_disabled() {
        let a = FingerprintInput {
            url: "https://example.com/a",
            output_format: OutputFormat::Markdown,
            use_llm: false,
            custom_instructions: Some("summarize"),
        };
        let b = FingerprintInput {
            url: "https://example.com/a",
            output_format: OutputFormat::Markdown,
            use_llm: false,
            custom_instructions: None,
        };
        assert_eq!(fingerprint(&a).unwrap(), fingerprint(&b).unwrap());
    }

    #[test]
    fn fingerprint_differs_on_output_format() {
        let mut input = FingerprintInput {
            url: "https://example.com/a",
            output_format: OutputFormat::Markdown,
            use_llm: false,
            custom_instructions: None,
        };
        let markdown = fingerprint(&input).unwrap();
        input.output_format = OutputFormat::Json;
        let json = fingerprint(&input).unwrap();
        assert_ne!(markdown, json);
    }
}
