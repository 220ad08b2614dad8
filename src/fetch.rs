//! Request descriptions handed to the API client

use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::Method;
use serde::Serialize;
use serde_json::Value;
use servicefix_http::ApiError;

/// A file sent as a multipart form field
#[derive(Debug, Clone)]
pub struct FilePart {
    pub field: String,
    pub file_name: String,
    pub mime: String,
    pub bytes: Bytes,
}

impl FilePart {
    /// Build the multipart form; called once per attempt since forms are single use
    pub(crate) fn to_form(&self) -> Result<Form, ApiError> {
        let part = Part::bytes(self.bytes.to_vec())
            .file_name(self.file_name.clone())
            .mime_str(&self.mime)?;
        Ok(Form::new().part(self.field.clone(), part))
    }
}

#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(Value),
    File(FilePart),
}

/// A request against the API, relative to the client's base URL
///
/// Requests are plain data so the client can replay them after a token
/// refresh or a CSRF retry.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: RequestBody,
}

impl ApiRequest {
    pub fn new(method: Method, path: &str) -> Self {
        Self {
            method,
            path: path.to_string(),
            query: Vec::new(),
            body: RequestBody::Empty,
        }
    }

    /// Create a GET request
    pub fn get(path: &str) -> Self {
        Self::new(Method::GET, path)
    }

    /// Create a POST request
    pub fn post(path: &str) -> Self {
        Self::new(Method::POST, path)
    }

    /// Create a PUT request
    pub fn put(path: &str) -> Self {
        Self::new(Method::PUT, path)
    }

    /// Create a PATCH request
    pub fn patch(path: &str) -> Self {
        Self::new(Method::PATCH, path)
    }

    /// Create a DELETE request
    pub fn delete(path: &str) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Add a query parameter
    pub fn query(mut self, key: &str, value: &str) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    /// Add a JSON body to the request
    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self, ApiError> {
        self.body = RequestBody::Json(serde_json::to_value(body)?);
        Ok(self)
    }

    /// Attach a file as a multipart upload
    pub fn file(mut self, field: &str, file_name: &str, mime: &str, bytes: Bytes) -> Self {
        self.body = RequestBody::File(FilePart {
            field: field.to_string(),
            file_name: file_name.to_string(),
            mime: mime.to_string(),
            bytes,
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builder() {
        let request = ApiRequest::put("/settings/general")
            .query("scope", "org")
            .json(&json!({ "theme": "dark" }))
            .unwrap();

        assert_eq!(request.method, Method::PUT);
        assert_eq!(request.path, "/settings/general");
        assert_eq!(request.query, vec![("scope".to_string(), "org".to_string())]);
        assert!(matches!(request.body, RequestBody::Json(ref v) if v["theme"] == "dark"));
    }

    #[test]
    fn test_file_part_rejects_bad_mime() {
        let request = ApiRequest::post("/users/1/avatar").file(
            "avatar",
            "me.png",
            "not a mime",
            Bytes::from_static(b"png"),
        );

        match request.body {
            RequestBody::File(part) => assert!(part.to_form().is_err()),
            other => panic!("unexpected body: {:?}", other),
        }
    }
}
