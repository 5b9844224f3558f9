//! HTTP response builders.
//!
//! Provides convenient functions for building JSON responses.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;

/// Response body type used throughout strata.
pub type Body = Full<Bytes>;

/// Full response type used throughout strata.
pub type HttpResponse = Response<Body>;

/// Build a JSON response with the given status code and body.
pub fn json<T: Serialize>(status: StatusCode, body: &T) -> crate::Result<HttpResponse> {
    let json = serde_json::to_string(body)?;
    Ok(Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(json)))
        .unwrap())
}

/// Build a 200 OK JSON response.
pub fn ok<T: Serialize>(body: &T) -> crate::Result<HttpResponse> {
    json(StatusCode::OK, body)
}

/// Build a 201 Created JSON response.
pub fn created<T: Serialize>(body: &T) -> crate::Result<HttpResponse> {
    json(StatusCode::CREATED, body)
}

/// Build a 204 No Content response.
pub fn no_content() -> HttpResponse {
    Response::builder()
        .status(StatusCode::NO_CONTENT)
        .body(Full::new(Bytes::new()))
        .unwrap()
}

/// Build an error response with the message wrapped as `{"error": ...}`.
/// The message goes through the JSON serializer, so it may contain quotes.
pub fn error_body(status: StatusCode, message: &str) -> HttpResponse {
    let body = serde_json::json!({ "error": message });
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap()
}

/// Build a 404 Not Found JSON response.
pub fn not_found(message: &str) -> HttpResponse {
    error_body(StatusCode::NOT_FOUND, message)
}

/// Build a 400 Bad Request JSON response.
pub fn bad_request(message: &str) -> HttpResponse {
    error_body(StatusCode::BAD_REQUEST, message)
}

/// Build a 401 Unauthorized JSON response.
pub fn unauthorized() -> HttpResponse {
    error_body(StatusCode::UNAUTHORIZED, "Unauthorized")
}

/// Build a 403 Forbidden JSON response.
pub fn forbidden(message: &str) -> HttpResponse {
    error_body(StatusCode::FORBIDDEN, message)
}

/// Build a 500 Internal Server Error JSON response.
pub fn internal_error(message: &str) -> HttpResponse {
    error_body(StatusCode::INTERNAL_SERVER_ERROR, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_sets_content_type() {
        let resp = ok(&serde_json::json!({ "x": 1 })).unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get("Content-Type").unwrap(),
            "application/json"
        );
    }

    #[test]
    fn error_bodies_are_json_wrapped() {
        let resp = not_found("gone");
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let resp = forbidden("nope");
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn error_message_is_json_escaped() {
        use http_body_util::BodyExt;

        let message = "surface \"rough\" not found";
        let resp = error_body(StatusCode::NOT_FOUND, message);
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["error"], message);
    }
}
