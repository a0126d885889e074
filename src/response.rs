//! The response envelope returned to the Lambda runtime.
//!
//! With the API Gateway v2 payload format, a buffered Lambda hands back a JSON
//! object with `statusCode`, `headers`, and a string `body`. Every outcome of
//! this service uses the same body shape: `{"error", "status", "message"}`.

use http::StatusCode;
use serde::Serialize;
use std::collections::BTreeMap;

pub const CONTENT_TYPE_JSON: &str = "application/json";

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

#[derive(Serialize)]
struct ResponseBody<'a> {
    error: bool,
    status: &'a str,
    message: Option<&'a str>,
}

impl Response {
    /// Build the envelope for `status`, with an optional short message.
    ///
    /// The `status` field of the body is the canonical reason phrase, and
    /// `error` is set for anything that isn't a 2xx.
    pub fn new(status: StatusCode, message: Option<&str>) -> Self {
        let body = ResponseBody {
            error: !status.is_success(),
            status: status.canonical_reason().unwrap_or_default(),
            message,
        };

        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_owned(), CONTENT_TYPE_JSON.to_owned());

        Response {
            status_code: status.as_u16(),
            headers,
            body: serde_json::to_string(&body).unwrap_or_default(),
        }
    }

    pub fn ok(message: Option<&str>) -> Self {
        Self::new(StatusCode::OK, message)
    }

    pub fn created(message: Option<&str>) -> Self {
        Self::new(StatusCode::CREATED, message)
    }

    pub fn bad_request(message: Option<&str>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: Option<&str>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn method_not_allowed(message: Option<&str>) -> Self {
        Self::new(StatusCode::METHOD_NOT_ALLOWED, message)
    }

    pub fn internal_server_error(message: Option<&str>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn service_unavailable(message: Option<&str>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}
