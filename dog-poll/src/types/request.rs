use serde::{Deserialize, Serialize};

/// Request descriptor handed to the transport unchanged on every attempt.
///
/// Serializable so a host can persist it next to the session id and rebuild
/// the same engine after a relaunch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
}

impl PollRequest {
    pub fn new<M: Into<String>, U: Into<String>>(method: M, url: U) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: Vec::new(),
        }
    }

    /// POST request, the usual shape for submit-then-poll endpoints
    pub fn post<U: Into<String>>(url: U) -> Self {
        Self::new("POST", url)
    }

    pub fn put<U: Into<String>>(url: U) -> Self {
        Self::new("PUT", url)
    }

    pub fn with_header<K: Into<String>, V: Into<String>>(mut self, name: K, value: V) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_content_type<S: Into<String>>(self, content_type: S) -> Self {
        self.with_header("Content-Type", content_type)
    }

    /// First header value matching `name`, case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}
