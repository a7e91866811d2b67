//! Response-channel classification and dispatch.
//!
//! Every request falls into exactly one of three channels: a native API
//! client, a modal-initiated navigation, or a plain page navigation. The
//! classification order is load-bearing (a request can satisfy more than one
//! predicate; API wins, then modal). The `Responder` renders an operation
//! outcome into the wire shape for the classified channel and is the
//! terminal handler for business-operation failures: nothing raised inside a
//! wrapped operation propagates past it.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;

use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use serde_json::{json, Value};
use tracing::{debug, error};

use crate::context::RequestContext;
use crate::error::OperationError;
use crate::flash::FlashSink;
use crate::routes::RouteResolver;

/// Header modal clients send to mark a modal-originated request.
pub const MODAL_REQUEST_HEADER: &str = "x-modal-request";
/// Header on modal JSON responses that stops the client-side router from
/// treating the body as a page visit.
pub const INERTIA_LOCATION_HEADER: &str = "x-inertia-location";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Api,
    Modal,
    Page,
}

/// True when the caller is a native JSON consumer. Any of: the request was
/// built as JSON-accepting, an exact `Accept`/`Content-Type` of
/// `application/json`, or `application/json` anywhere in `Accept`.
pub fn is_api_request(req: &RequestContext) -> bool {
    if req.accepts_json {
        return true;
    }
    let accept = req.header("accept").unwrap_or("");
    if accept == "application/json" {
        return true;
    }
    if req.content_type == "application/json" || req.header("content-type") == Some("application/json") {
        return true;
    }
    accept.contains("application/json")
}

/// True for modal-initiated requests that are not API requests. The modal
/// marker may arrive as a body field (string `"true"` or boolean) or as the
/// `X-Modal-Request` header.
pub fn is_modal_request(req: &RequestContext) -> bool {
    if is_api_request(req) {
        return false;
    }
    match req.body_field("modal") {
        Some(Value::String(s)) if s == "true" => return true,
        Some(Value::Bool(true)) => return true,
        _ => {}
    }
    req.header(MODAL_REQUEST_HEADER) == Some("true")
}

/// Total, deterministic three-way classification.
pub fn classify(req: &RequestContext) -> Channel {
    if is_api_request(req) {
        Channel::Api
    } else if is_modal_request(req) {
        Channel::Modal
    } else {
        Channel::Page
    }
}

/// Named redirect destination for page-channel successes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectTarget {
    pub route: String,
    pub params: Vec<(String, String)>,
}

impl RedirectTarget {
    pub fn new(route: &str) -> Self {
        Self { route: route.to_string(), params: Vec::new() }
    }

    pub fn param(mut self, key: &str, value: impl ToString) -> Self {
        self.params.push((key.to_string(), value.to_string()));
        self
    }
}

/// Payload produced by a wrapped business operation.
#[derive(Debug, Clone, Default)]
pub struct OperationResult {
    pub data: Value,
    pub message: Option<String>,
    pub redirect: Option<RedirectTarget>,
}

impl OperationResult {
    pub fn with_data(data: Value) -> Self {
        Self { data, message: None, redirect: None }
    }

    pub fn message(mut self, message: &str) -> Self {
        self.message = Some(message.to_string());
        self
    }

    pub fn redirect_to(mut self, target: RedirectTarget) -> Self {
        self.redirect = Some(target);
        self
    }
}

fn success_body(data: &Value, message: Option<&str>) -> Value {
    let mut body = json!({"success": true, "data": data});
    if let Some(msg) = message {
        body["message"] = json!(msg);
    }
    body
}

fn error_body(message: &str, errors: &HashMap<String, String>) -> Value {
    json!({"success": false, "message": message, "errors": errors})
}

fn modal_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        HeaderName::from_static(INERTIA_LOCATION_HEADER),
        HeaderValue::from_static("false"),
    );
    headers
}

/// JSON error envelope for API callers. Status defaults to 400 at the
/// `OperationError` level; callers with a more specific status pass it here.
pub fn api_error(message: &str, errors: Option<&HashMap<String, String>>, status: StatusCode) -> Response {
    let empty = HashMap::new();
    let body = error_body(message, errors.unwrap_or(&empty));
    (status, Json(body)).into_response()
}

/// Renders operation outcomes for one classified request. Borrows the flash
/// store and route table from the enclosing handler; holds no state of its
/// own, so each request gets a fresh classification.
pub struct Responder<'a> {
    req: &'a RequestContext,
    flash: &'a dyn FlashSink,
    routes: &'a dyn RouteResolver,
}

impl<'a> Responder<'a> {
    pub fn new(req: &'a RequestContext, flash: &'a dyn FlashSink, routes: &'a dyn RouteResolver) -> Self {
        Self { req, flash, routes }
    }

    /// Shape a successful result for the request's channel. API and modal
    /// callers get the JSON envelope and never see the redirect target.
    pub fn respond_with(&self, result: OperationResult) -> Response {
        match classify(self.req) {
            Channel::Api => {
                let body = success_body(&result.data, result.message.as_deref());
                (StatusCode::OK, Json(body)).into_response()
            }
            Channel::Modal => {
                let body = success_body(&result.data, result.message.as_deref());
                (StatusCode::OK, modal_headers(), Json(body)).into_response()
            }
            Channel::Page => self.redirect_success(result),
        }
    }

    fn redirect_success(&self, result: OperationResult) -> Response {
        if let (Some(sid), Some(msg)) = (self.req.session_id.as_deref(), result.message.as_deref()) {
            self.flash.put_flash(sid, "success", msg);
        }
        let url = result
            .redirect
            .and_then(|t| self.routes.resolve(&t.route, &t.params))
            .unwrap_or_else(|| self.req.referer().to_string());
        Redirect::to(&url).into_response()
    }

    /// Run a business operation and render whatever it produces. Failures,
    /// including panics inside the operation, stop here and come back as the
    /// channel-appropriate error envelope.
    pub fn handle_crud_operation<F>(
        &self,
        operation: F,
        success_message: &str,
        redirect: Option<RedirectTarget>,
    ) -> Response
    where
        F: FnOnce() -> Result<OperationResult, OperationError>,
    {
        debug!(request_id = ?self.req.request_id, channel = ?classify(self.req), "crud operation dispatched");
        match std::panic::catch_unwind(AssertUnwindSafe(operation)) {
            Ok(Ok(mut result)) => {
                if result.message.is_none() {
                    result.message = Some(success_message.to_string());
                }
                if result.redirect.is_none() {
                    result.redirect = redirect;
                }
                self.respond_with(result)
            }
            Ok(Err(err)) => self.render_failure(&err),
            Err(panic_payload) => {
                let msg = if let Some(s) = panic_payload.downcast_ref::<&str>() {
                    *s
                } else if let Some(s) = panic_payload.downcast_ref::<String>() {
                    s.as_str()
                } else {
                    "panic"
                };
                error!(target: "panic", "crud operation panic: {}", msg);
                self.render_failure(&OperationError::internal("internal server error"))
            }
        }
    }

    /// Channel-appropriate error envelope for a failure raised outside a
    /// wrapped operation (e.g. payload validation in the handler itself).
    pub fn render_failure(&self, err: &OperationError) -> Response {
        let status = StatusCode::from_u16(err.status()).unwrap_or(StatusCode::BAD_REQUEST);
        match classify(self.req) {
            Channel::Api => api_error(err.message(), Some(err.errors()), status),
            Channel::Modal => {
                let body = error_body(err.message(), err.errors());
                (status, modal_headers(), Json(body)).into_response()
            }
            Channel::Page => self.inertia_error(err.message(), Some(err.errors())),
        }
    }

    /// Page-channel failure: redirect back to the referrer, stashing the
    /// message and the field errors in the one-shot flash for the next
    /// render's validation bag.
    pub fn inertia_error(&self, message: &str, errors: Option<&HashMap<String, String>>) -> Response {
        if let Some(sid) = self.req.session_id.as_deref() {
            self.flash.put_flash(sid, "error", message);
            if let Some(map) = errors {
                if !map.is_empty() {
                    if let Ok(encoded) = serde_json::to_string(map) {
                        self.flash.put_flash(sid, "errors", &encoded);
                    }
                }
            }
        }
        Redirect::to(self.req.referer()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req() -> RequestContext {
        RequestContext::default()
    }

    #[test]
    fn accept_substring_classifies_as_api() {
        let r = req().with_header("Accept", "text/html, application/json;q=0.9");
        assert!(is_api_request(&r));
        assert_eq!(classify(&r), Channel::Api);
    }

    #[test]
    fn content_type_alone_classifies_as_api() {
        let r = req().with_header("Content-Type", "application/json");
        assert!(is_api_request(&r));
    }

    #[test]
    fn api_precedence_beats_modal_signals() {
        // Both signals present: the documented precedence says API wins.
        let r = req()
            .with_header("Accept", "application/json")
            .with_header("X-Modal-Request", "true");
        assert_eq!(classify(&r), Channel::Api);
        assert!(!is_modal_request(&r));
    }

    #[test]
    fn modal_signals_in_body_and_header() {
        let by_string = req().with_body_field("modal", serde_json::json!("true"));
        let by_bool = req().with_body_field("modal", serde_json::json!(true));
        let by_header = req().with_header(MODAL_REQUEST_HEADER, "true");
        assert_eq!(classify(&by_string), Channel::Modal);
        assert_eq!(classify(&by_bool), Channel::Modal);
        assert_eq!(classify(&by_header), Channel::Modal);
        // "false" string and absent marker both fall through to Page
        let not_modal = req().with_body_field("modal", serde_json::json!("false"));
        assert_eq!(classify(&not_modal), Channel::Page);
        assert_eq!(classify(&req()), Channel::Page);
    }

    #[test]
    fn redirect_target_builder() {
        let t = RedirectTarget::new("cursos.show").param("curso", 3);
        assert_eq!(t.route, "cursos.show");
        assert_eq!(t.params, vec![("curso".to_string(), "3".to_string())]);
    }
}
