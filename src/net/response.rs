use actix_web::{
    HttpResponse,
    http::{
        StatusCode,
        header::{self, HeaderMap, HeaderName, HeaderValue},
    },
    web::Bytes,
};
use serde_json::Value;

/// Status used for every response produced by the error boundary.
pub const HTTP_SERVER_ERROR: StatusCode = StatusCode::INTERNAL_SERVER_ERROR;

const JSON: &str = "application/json";
const HTML: &str = "text/html; charset=utf-8";
const TEXT: &str = "text/plain; charset=utf-8";

/// Response under construction while it travels through the pipe chain.
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Response {
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Sets a header, replacing any previous value.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_body(self, content_type: &'static str, body: impl Into<Bytes>) -> Self {
        let mut response = self.with_header(
            header::CONTENT_TYPE,
            HeaderValue::from_static(content_type),
        );
        response.body = body.into();
        response
    }

    /// Replaces the body with `value` serialized as JSON and sets `status`.
    pub fn with_json(self, value: &Value, status: StatusCode) -> Self {
        self.with_body(JSON, value.to_string()).with_status(status)
    }

    pub fn with_html(self, html: impl Into<String>) -> Self {
        self.with_body(HTML, html.into())
    }

    pub fn with_text(self, text: impl Into<String>) -> Self {
        self.with_body(TEXT, text.into())
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// The body parsed as JSON, if it is JSON.
    pub fn json(&self) -> Option<Value> {
        serde_json::from_slice(&self.body).ok()
    }

    /// Converts into the actix response that is sent to the client.
    pub fn into_http(self) -> HttpResponse {
        let mut builder = HttpResponse::build(self.status);
        for (name, value) in self.headers.iter() {
            builder.append_header((name.clone(), value.clone()));
        }
        builder.body(self.body)
    }
}
