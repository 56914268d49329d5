//! URL admission validation: scheme allowlist plus an SSRF blocklist
//! (loopback, link-local, private ranges, metadata endpoints).

use std::net::IpAddr;

use url::Url;

#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlValidationError {
    #[error("failed to parse URL: {0}")]
    Malformed(String),
    #[error("scheme {0:?} is not allowed, must be http or https")]
    DisallowedScheme(String),
    #[error("URL has no host")]
    MissingHost(),
    #[error("host resolves to a blocked address: {0}")]
    BlockedAddress(IpAddr),
    #[error("host is a well-known cloud metadata endpoint")]
    MetadataEndpoint,
}

impl UrlValidationError {
    #[must_use]
    pub const fn kind(&self) -> crate::error::ErrorKind {
        crate::error::ErrorKind::InvalidUrl
    }
}

/// Hosts that resolve to cloud-provider instance-metadata services; blocked
/// regardless of what IP they resolve to, since some are DNS names rather
/// than the bare link-local IP.
const METADATA_HOSTS: &[&str] = &["metadata.google.internal"];

/// Validate a task's target URL against the admission contract: scheme must
/// be `http`/`https`, and the host must not resolve to a loopback,
/// link-local, private, or cloud-metadata address unless `allow_private` is set.
pub fn validate(raw_url: &str, allow_private: bool) -> Result<Url, UrlValidationError> {
    let url = Url::parse(raw_url).map_err(|e| UrlValidationError::Malformed(e.to_string()))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(UrlValidationError::DisallowedScheme(url.scheme().to_string()));
    }

    let host = url.host_str().ok_or_else(UrlValidationError::MissingHost)?;

    if METADATA_HOSTS.contains(&host) {
        return Err(UrlValidationError::MetadataEndpoint);
    }

    if allow_private {
        return Ok(url);
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        if is_blocked_address(ip) {
            return Err(UrlValidationError::BlockedAddress(ip));
        }
    }

    Ok(url)
}

fn is_blocked_address(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_link_local()
                || v4.is_private()
                || v4.is_unspecified()
                || v4.is_broadcast()
                // AWS/GCP/Azure instance metadata (169.254.169.254) is already
                // covered by is_link_local(), kept explicit for clarity.
                || v4.octets() == [169, 254, 169, 254]
        }
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified() || is_unique_local_v6(v6),
    }
}

fn is_unique_local_v6(v6: std::net::Ipv6Addr) -> bool {
    (v6.segments()[0] & 0xfe00) == 0xfc00
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ordinary_https_url() {
        assert!(validate("https://example.com/a", false).is_ok());
    }

    #[test]
    fn rejects_non_http_scheme() {
        let err = validate("ftp://example.com/a", false).unwrap_err();
        assert!(matches!(err, UrlValidationError::DisallowedScheme(_)));
    }

    #[test]
    fn rejects_loopback_ip() {
        let err = validate("http://127.0.0.1/admin", false).unwrap_err();
        assert!(matches!(err, UrlValidationError::BlockedAddress(_)));
    }

    #[test]
    fn rejects_cloud_metadata_ip() {
        let err = validate("http://169.254.169.254/latest/meta-data/", false).unwrap_err();
        assert!(matches!(err, UrlValidationError::BlockedAddress(_)));
    }

    #[test]
    fn rejects_private_range() {
        let err = validate("http://10.0.0.5/", false).unwrap_err();
        assert!(matches!(err, UrlValidationError::BlockedAddress(_)));
    }

    #[test]
    fn allow_private_bypasses_the_blocklist() {
        assert!(validate("http://127.0.0.1/admin", true).is_ok());
    }

    #[test]
    fn rejects_malformed_url() {
        assert!(validate("not a url", false).is_err());
    }
}
