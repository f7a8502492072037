// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Request origin logging.

use axum::{
    extract::Request,
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};

/// Origin of a request: the `Origin` header, falling back to `Referer`.
fn request_origin(headers: &HeaderMap) -> &str {
    headers
        .get(header::ORIGIN)
        .or_else(|| headers.get(header::REFERER))
        .and_then(|h| h.to_str().ok())
        .unwrap_or("unknown")
}

/// Log method, path and origin of every session API request.
pub async fn log_origin(req: Request, next: Next) -> Response {
    tracing::debug!(
        method = %req.method(),
        path = %req.uri().path(),
        origin = request_origin(req.headers()),
        "Session API request"
    );
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{HeaderValue, StatusCode};
    use axum::{routing::get, Router};
    use tower::ServiceExt; // for oneshot

    #[test]
    fn test_request_origin_fallbacks() {
        let mut headers = HeaderMap::new();
        assert_eq!(request_origin(&headers), "unknown");

        headers.insert(header::REFERER, HeaderValue::from_static("https://example.github.io/app"));
        assert_eq!(request_origin(&headers), "https://example.github.io/app");

        headers.insert(header::ORIGIN, HeaderValue::from_static("http://localhost:4200"));
        assert_eq!(request_origin(&headers), "http://localhost:4200");
    }

    #[tokio::test]
    async fn test_log_origin_passes_through() {
        let app = Router::new()
            .route("/", get(|| async { "Hello" }))
            .layer(axum::middleware::from_fn(log_origin));

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
