//! CORS response headers for requests the origin policy let through.

use axum::body::Body;
use axum::response::Response;
use http::header::{self, HeaderMap, HeaderValue};
use http::{Method, StatusCode};

/// Request headers a browser may send on forwarded calls.
const ALLOWED_REQUEST_HEADERS: &str = "content-type, accept, x-request-id";
const PREFLIGHT_MAX_AGE_SECS: &str = "600";
const DEFAULT_ALLOWED_METHODS: &str = "GET, POST, PUT, PATCH, DELETE";

/// Echo an allowed `origin` back with credentials enabled. Origins that are
/// not valid header values get no CORS headers, so the browser blocks them.
pub fn apply_cors_headers(headers: &mut HeaderMap, origin: &str) {
    let Ok(value) = HeaderValue::from_str(origin) else {
        return;
    };
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static("true"),
    );
    headers.append(header::VARY, HeaderValue::from_static("origin"));
}

/// `204` answer to an allowed preflight. `methods` are the methods the
/// matching routes accept; an empty list means any.
pub fn preflight_response(origin: &str, methods: &[Method]) -> Response {
    let allow_methods = if methods.is_empty() {
        DEFAULT_ALLOWED_METHODS.to_string()
    } else {
        methods
            .iter()
            .map(Method::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    };

    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::NO_CONTENT;
    let headers = response.headers_mut();
    apply_cors_headers(headers, origin);
    if let Ok(value) = HeaderValue::from_str(&allow_methods) {
        headers.insert(header::ACCESS_CONTROL_ALLOW_METHODS, value);
    }
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(ALLOWED_REQUEST_HEADERS),
    );
    headers.insert(
        header::ACCESS_CONTROL_MAX_AGE,
        HeaderValue::from_static(PREFLIGHT_MAX_AGE_SECS),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cors_headers_echo_origin() {
        let mut headers = HeaderMap::new();
        apply_cors_headers(&mut headers, "https://shop.example.com");
        assert_eq!(
            headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "https://shop.example.com"
        );
        assert_eq!(
            headers.get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS).unwrap(),
            "true"
        );
        assert_eq!(headers.get(header::VARY).unwrap(), "origin");
    }

    #[test]
    fn invalid_origin_gets_no_headers() {
        let mut headers = HeaderMap::new();
        apply_cors_headers(&mut headers, "https://bad\nvalue");
        assert!(headers.is_empty());
    }

    #[test]
    fn preflight_lists_route_methods() {
        let response = preflight_response("https://shop.example.com", &[Method::POST]);
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_METHODS)
                .unwrap(),
            "POST"
        );

        let response = preflight_response("https://shop.example.com", &[]);
        assert_eq!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_METHODS)
                .unwrap(),
            "GET, POST, PUT, PATCH, DELETE"
        );
    }
}
