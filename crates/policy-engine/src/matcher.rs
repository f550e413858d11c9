use url::Url;

use crate::error::PolicyConfigError;

/// Validate a configured allow-list entry and return the form browsers send
/// in `Origin`: lowercase host, no default port, no trailing `/`.
pub fn canonical_origin(configured: &str) -> Result<String, PolicyConfigError> {
    let trimmed = configured.trim().trim_end_matches('/');
    let url = Url::parse(trimmed)
        .map_err(|_| PolicyConfigError::InvalidOrigin(configured.to_string()))?;

    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(PolicyConfigError::InvalidOrigin(configured.to_string()));
    }
    if url.path() != "/" || url.query().is_some() || url.fragment().is_some() {
        return Err(PolicyConfigError::OriginHasPath(configured.to_string()));
    }
    Ok(url.origin().ascii_serialization())
}

/// Origin (`scheme://host[:port]`) of the configured frontend URL.
///
/// The frontend URL may point at a page; only its origin is trusted.
pub fn frontend_origin(frontend_url: &str) -> Result<String, PolicyConfigError> {
    let url = Url::parse(frontend_url.trim())
        .map_err(|_| PolicyConfigError::InvalidFrontendUrl(frontend_url.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(PolicyConfigError::InvalidFrontendUrl(frontend_url.to_string()));
    }
    Ok(url.origin().ascii_serialization())
}

/// Exact, case-sensitive path membership.
pub fn is_health_path(health_paths: &[String], path: &str) -> bool {
    health_paths.iter().any(|p| p == path)
}

/// Whether a request arrived over plaintext, judged from the forwarded
/// scheme. Missing header means the listener itself saw the request, which
/// is plaintext.
pub fn is_plaintext(forwarded_proto: Option<&str>, trust_forwarded_proto: bool) -> bool {
    if !trust_forwarded_proto {
        return true;
    }
    match forwarded_proto {
        // Proxies may append hops: "https, http". The first is the client's.
        Some(value) => !value
            .split(',')
            .next()
            .map(str::trim)
            .is_some_and(|proto| proto.eq_ignore_ascii_case("https")),
        None => true,
    }
}

/// `https://` equivalent of a request, preserving host, path and query.
pub fn https_location(host: &str, path_and_query: &str) -> String {
    let path_and_query = if path_and_query.starts_with('/') {
        path_and_query.to_string()
    } else {
        format!("/{path_and_query}")
    };
    format!("https://{host}{path_and_query}")
}
