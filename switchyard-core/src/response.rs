//! Response writers: JSON by default, text/HTML on request, and the shared
//! error envelope.

use crate::error::{self, ERROR_CODE_HEADER, ErrorCode, SwitchyardError};
use crate::handler::Response;
use bytes::Bytes;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE, HeaderValue};
use http::StatusCode;
use serde::Serialize;
use serde_json::Value;

const JSON: &str = "application/json";
const TEXT: &str = "text/plain; charset=utf-8";
const HTML: &str = "text/html; charset=utf-8";

fn build(status: StatusCode, content_type: &'static str, body: Bytes) -> Response {
    let mut resp = Response::new(body);
    *resp.status_mut() = status;
    resp.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    resp
}

/// Serialize `value` as a JSON response. An encoding failure becomes a 500
/// envelope instead.
pub fn json<T: Serialize + ?Sized>(status: StatusCode, value: &T) -> Response {
    match serde_json::to_vec(value) {
        Ok(body) => build(status, JSON, Bytes::from(body)),
        Err(e) => {
            tracing::error!(error = %e, "response serialization failed");
            from_error(&SwitchyardError::Serde(e))
        }
    }
}

pub fn text(status: StatusCode, body: impl Into<String>) -> Response {
    build(status, TEXT, Bytes::from(body.into()))
}

pub fn html(status: StatusCode, body: impl Into<String>) -> Response {
    build(status, HTML, Bytes::from(body.into()))
}

pub fn empty(status: StatusCode) -> Response {
    let mut resp = Response::new(Bytes::new());
    *resp.status_mut() = status;
    resp.headers_mut()
        .insert(CONTENT_LENGTH, HeaderValue::from_static("0"));
    resp
}

/// `{"success": false, "message": .., "errors": .., "status_code": ..}`
pub fn error(status: StatusCode, message: &str, errors: Option<&Value>) -> Response {
    let body = error::envelope_body(status.as_u16(), message, errors);
    build(status, JSON, Bytes::from(body))
}

pub fn from_error(err: &SwitchyardError) -> Response {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let resp = build(status, JSON, Bytes::from(err.to_json_body()));
    match err.error_code() {
        Some(code) => with_code(resp, code),
        None => resp,
    }
}

/// Tag a rejection with its domain code.
pub fn with_code(mut resp: Response, code: ErrorCode) -> Response {
    resp.headers_mut()
        .insert(ERROR_CODE_HEADER, HeaderValue::from_static(code.as_str()));
    resp
}

/// Envelope plus domain code, the shape of every guarded rejection.
pub fn rejection(status: StatusCode, code: ErrorCode, message: &str) -> Response {
    with_code(error(status, message, None), code)
}
