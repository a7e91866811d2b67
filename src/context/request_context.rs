use std::collections::HashMap;

use axum::http::HeaderMap;
use serde_json::Value;

/// Immutable snapshot of the inbound request as seen by the dispatcher.
/// Built once by the HTTP layer; the core only reads it. Header names are
/// normalized to lowercase so lookups never depend on wire casing.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub accepts_json: bool,
    pub content_type: String,
    pub headers: HashMap<String, String>,
    pub body_fields: serde_json::Map<String, Value>,
    /// Session cookie value, when the caller presented one.
    pub session_id: Option<String>,
    pub request_id: Option<String>,
}

impl RequestContext {
    /// Build a context from axum header map plus the (already parsed) JSON body.
    pub fn from_http(headers: &HeaderMap, body: Option<&Value>) -> Self {
        let mut map = HashMap::new();
        for (name, value) in headers.iter() {
            if let Ok(v) = value.to_str() {
                map.insert(name.as_str().to_ascii_lowercase(), v.to_string());
            }
        }
        let content_type = map.get("content-type").cloned().unwrap_or_default();
        // XHR callers and clients that lead with application/json are native
        // JSON consumers even before header-by-header classification runs.
        let accept = map.get("accept").map(String::as_str).unwrap_or("");
        let accepts_json = accept.starts_with("application/json")
            || map.get("x-requested-with").map(String::as_str) == Some("XMLHttpRequest");
        let body_fields = match body {
            Some(Value::Object(m)) => m.clone(),
            _ => serde_json::Map::new(),
        };
        Self {
            accepts_json,
            content_type,
            headers: map,
            body_fields,
            session_id: None,
            request_id: Some(uuid::Uuid::new_v4().to_string()),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn body_field(&self, name: &str) -> Option<&Value> {
        self.body_fields.get(name)
    }

    /// Where "redirect back" points: the referrer, falling back to the root.
    pub fn referer(&self) -> &str {
        self.header("referer").filter(|r| !r.is_empty()).unwrap_or("/")
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.to_string());
        if name.eq_ignore_ascii_case("content-type") {
            self.content_type = value.to_string();
        }
        self
    }

    pub fn with_body_field(mut self, name: &str, value: Value) -> Self {
        self.body_fields.insert(name.to_string(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn header_lookup_is_case_insensitive() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Modal-Request", HeaderValue::from_static("true"));
        let ctx = RequestContext::from_http(&headers, None);
        assert_eq!(ctx.header("x-modal-request"), Some("true"));
        assert_eq!(ctx.header("X-MODAL-REQUEST"), Some("true"));
    }

    #[test]
    fn referer_falls_back_to_root() {
        let ctx = RequestContext::default();
        assert_eq!(ctx.referer(), "/");
        let ctx = ctx.with_header("Referer", "/cursos/3");
        assert_eq!(ctx.referer(), "/cursos/3");
    }

    #[test]
    fn xhr_marks_accepts_json() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Requested-With", HeaderValue::from_static("XMLHttpRequest"));
        let ctx = RequestContext::from_http(&headers, None);
        assert!(ctx.accepts_json);
    }
}
