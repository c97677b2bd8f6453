use std::future::Future;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use crate::error::{Error, detail_from_body};
use crate::types::AccessToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

/// Query string pairs.
///
/// Empty values are dropped and sequences become repeated keys, which is
/// what the backend's filter parser expects.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pairs: Vec<(String, String)>,
}

impl Query {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a single value, replacing any previous value for `key`.
    #[must_use]
    pub fn set(mut self, key: &str, value: impl ToString) -> Self {
        let value = value.to_string();
        self.pairs.retain(|(k, _)| k != key);
        if !value.is_empty() {
            self.pairs.push((key.to_owned(), value));
        }
        self
    }

    #[must_use]
    pub fn set_opt(self, key: &str, value: Option<impl ToString>) -> Self {
        match value {
            Some(v) => self.set(key, v),
            None => self,
        }
    }

    /// Append one pair per item.
    #[must_use]
    pub fn append_all<I>(mut self, key: &str, values: I) -> Self
    where
        I: IntoIterator,
        I::Item: ToString,
    {
        for value in values {
            let value = value.to_string();
            if !value.is_empty() {
                self.pairs.push((key.to_owned(), value));
            }
        }
        self
    }

    /// Build from any struct that serializes to a JSON object.
    ///
    /// `null` and `""` fields are skipped, arrays repeat the key, nested
    /// objects are JSON-encoded.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if `value` cannot be serialized, or
    /// [`Error::Config`] if it does not serialize to an object.
    pub fn from_serializable<T: Serialize + ?Sized>(value: &T) -> Result<Self, Error> {
        let mut query = Self::new();
        for (key, value) in object_fields(value)? {
            match value {
                JsonValue::Array(items) => {
                    query = query.append_all(&key, items.iter().filter_map(scalar_string));
                }
                other => {
                    if let Some(s) = scalar_string(&other) {
                        query.pairs.push((key, s));
                    }
                }
            }
        }
        Ok(query)
    }

    #[must_use]
    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Content of a multipart part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormValue {
    Text(String),
    File {
        file_name: String,
        mime: Option<String>,
        bytes: Vec<u8>,
    },
}

/// Multipart payload kept as plain data so a request can be replayed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Form {
    parts: Vec<(String, FormValue)>,
}

impl Form {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn text(mut self, name: &str, value: impl ToString) -> Self {
        self.parts
            .push((name.to_owned(), FormValue::Text(value.to_string())));
        self
    }

    #[must_use]
    pub fn file(
        mut self,
        name: &str,
        file_name: impl Into<String>,
        mime: Option<&str>,
        bytes: Vec<u8>,
    ) -> Self {
        self.parts.push((
            name.to_owned(),
            FormValue::File {
                file_name: file_name.into(),
                mime: mime.map(str::to_owned),
                bytes,
            },
        ));
        self
    }

    /// Build from any struct that serializes to a JSON object.
    ///
    /// `null` fields are skipped, arrays become one part per item, nested
    /// objects are JSON-encoded, scalars use their string form.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if `value` cannot be serialized, or
    /// [`Error::Config`] if it does not serialize to an object.
    pub fn from_serializable<T: Serialize + ?Sized>(value: &T) -> Result<Self, Error> {
        let mut form = Self::new();
        for (key, value) in object_fields(value)? {
            match value {
                JsonValue::Null => {}
                JsonValue::Array(items) => {
                    for item in &items {
                        if let Some(s) = part_string(item) {
                            form = form.text(&key, s);
                        }
                    }
                }
                other => {
                    if let Some(s) = part_string(&other) {
                        form = form.text(&key, s);
                    }
                }
            }
        }
        Ok(form)
    }

    #[must_use]
    pub fn parts(&self) -> &[(String, FormValue)] {
        &self.parts
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum Body {
    #[default]
    Empty,
    Json(JsonValue),
    Multipart(Form),
}

/// Request against the API base URL.
///
/// Cloneable so the pipeline can replay it with a new bearer.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    /// Endpoint path relative to the API base URL, e.g. `/articles/`.
    pub path: String,
    pub query: Query,
    pub body: Body,
    pub bearer: Option<AccessToken>,
}

impl ApiRequest {
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Query::new(),
            body: Body::Empty,
            bearer: None,
        }
    }

    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    #[must_use]
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::Put, path)
    }

    #[must_use]
    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::Patch, path)
    }

    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    #[must_use]
    pub fn with_query(mut self, query: Query) -> Self {
        self.query = query;
        self
    }

    /// # Errors
    ///
    /// Returns [`Error::Json`] if `body` cannot be serialized.
    pub fn with_json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, Error> {
        self.body = Body::Json(serde_json::to_value(body)?);
        Ok(self)
    }

    #[must_use]
    pub fn with_form(mut self, form: Form) -> Self {
        self.body = Body::Multipart(form);
        self
    }

    #[must_use]
    pub fn with_bearer(mut self, token: AccessToken) -> Self {
        self.bearer = Some(token);
        self
    }
}

/// Status and raw body of a completed response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl ApiResponse {
    #[must_use]
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// JSON response with the given status.
    #[must_use]
    pub fn json(status: u16, value: &JsonValue) -> Self {
        Self::new(status, value.to_string())
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }

    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// # Errors
    ///
    /// Returns [`Error::Json`] if the body is not valid JSON for `T`.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, Error> {
        serde_json::from_slice(&self.body).map_err(Into::into)
    }

    /// Returns the response on success, or the matching error otherwise.
    ///
    /// # Errors
    ///
    /// [`Error::Unauthorized`] for 401, [`Error::Api`] for any other
    /// non-success status.
    pub fn ensure_success(self, path: &str) -> Result<Self, Error> {
        if self.is_success() {
            return Ok(self);
        }
        let body = self.text();
        if self.is_unauthorized() {
            return Err(Error::Unauthorized {
                path: path.to_owned(),
                detail: detail_from_body(&body),
            });
        }
        Err(Error::Api {
            path: path.to_owned(),
            status: self.status,
            body,
        })
    }
}

/// Issues requests against the backend.
///
/// The HTTP implementation is [`HttpTransport`](crate::http::HttpTransport);
/// tests substitute an in-memory backend.
pub trait Transport: Send + Sync + 'static {
    /// Send one request and return its status and body.
    ///
    /// Only failures to obtain a response are errors; every HTTP status,
    /// 401 included, comes back as `Ok`.
    fn send(&self, request: &ApiRequest) -> impl Future<Output = Result<ApiResponse, Error>> + Send;
}

fn object_fields<T: Serialize + ?Sized>(value: &T) -> Result<serde_json::Map<String, JsonValue>, Error> {
    match serde_json::to_value(value)? {
        JsonValue::Object(map) => Ok(map),
        JsonValue::Null => Ok(serde_json::Map::new()),
        other => Err(Error::Config(format!(
            "expected an object for request parameters, got {other}"
        ))),
    }
}

fn scalar_string(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::Null => None,
        JsonValue::String(s) if s.is_empty() => None,
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Bool(b) => Some(b.to_string()),
        JsonValue::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

fn part_string(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::Null => None,
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Bool(b) => Some(b.to_string()),
        JsonValue::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}
