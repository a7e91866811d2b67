//!
//! aulanet HTTP server
//! -------------------
//! Axum-based HTTP surface for the educational back office. Controllers here
//! are thin: they resolve the session user, run the access predicates, and
//! hand business operations to the response dispatcher, which shapes the
//! reply for the caller's channel (API / modal / page).
//!
//! Responsibilities:
//! - Session management with a simple cookie + CSRF token model.
//! - Login/logout endpoints backed by the `security` account store.
//! - Predicate-gated reads and dispatcher-wrapped writes over cursos,
//!   contenidos and trabajos.
//! - First-run demo data creation and startup inventory logs.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info};

use crate::access::{
    can_access_contenido, can_access_curso, can_access_trabajo, can_manage_curso, current_user_data,
    permission_denied, role_denied, OVERRIDE_ROLES,
};
use crate::context::{RequestContext, SessionManager, UserContext, UserKind};
use crate::directory::{FileDirectory, SubjectDirectory};
use crate::dispatch::{OperationResult, RedirectTarget, Responder};
use crate::error::{AppError, OperationError};
use crate::flash::SessionFlash;
use crate::routes::NamedRoutes;
use crate::security;

const SESSION_COOKIE: &str = "aulanet_session";

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub data_root: String,
    pub directory: Arc<FileDirectory>,
    pub sessions: Arc<SessionManager>,
    pub flash: Arc<SessionFlash>,
    pub routes: Arc<NamedRoutes>,
}

fn log_startup_folders(data_root: &str) {
    let cwd = std::env::current_dir().ok();
    let exe = std::env::current_exe().ok();
    let root_env = std::env::var("AULANET_DATA_ROOT").ok();
    info!(
        target: "startup",
        "aulanet starting. Folder configuration: cwd={:?}, exe={:?}, data_root_param={:?}, AULANET_DATA_ROOT_env={:?}",
        cwd, exe, data_root, root_env
    );
    let root_exists = std::path::Path::new(data_root).exists();
    info!(target: "startup", "Path existence: data_root_exists={}", root_exists);
}

/// Seed a small demo roster on first run so a fresh install has something to
/// navigate: one profesor-owned curso, one enrolled estudiante, one draft
/// contenido with a submitted trabajo.
fn create_demo_data(data_root: &str, directory: &FileDirectory) -> anyhow::Result<()> {
    info!("Empty startup detected, creating demo data");
    let profesor = UserContext::new(11, UserKind::Profesor, "Ana", "Ruiz", "ana@aulanet.local")
        .with_role("profesor");
    let estudiante = UserContext::new(7, UserKind::Estudiante, "Luz", "Marín", "luz@aulanet.local")
        .with_role("estudiante");
    let padre = UserContext::new(21, UserKind::Padre, "Mario", "Marín", "mario@aulanet.local")
        .with_role("padre")
        .with_child(7);
    security::add_user(data_root, "ana", "ana", profesor)?;
    security::add_user(data_root, "luz", "luz", estudiante)?;
    security::add_user(data_root, "mario", "mario", padre)?;

    let curso = directory.insert_curso("Matemáticas 1º", 11)?;
    directory.enroll(curso.id, 7)?;
    let contenido = directory.insert_contenido(curso.id, "Tema 1: fracciones", false)?;
    directory.insert_trabajo(contenido.id, 7)?;
    info!("Created demo curso {} with contenido {}", curso.id, contenido.id);
    Ok(())
}

pub async fn run_with_port(http_port: u16, data_root: &str) -> anyhow::Result<()> {
    log_startup_folders(data_root);

    std::fs::create_dir_all(data_root)
        .map_err(|e| anyhow::anyhow!("Failed to create or access data root {}: {}", data_root, e))?;
    security::ensure_default_admin(data_root)?;
    let directory = Arc::new(FileDirectory::open(data_root)?);
    if directory.is_empty() {
        if let Err(e) = create_demo_data(data_root, &directory) {
            tracing::warn!("Failed to create demo data: {}", e);
        }
    }

    let app_state = AppState {
        data_root: data_root.to_string(),
        directory,
        sessions: Arc::new(SessionManager::default()),
        flash: Arc::new(SessionFlash::new()),
        routes: Arc::new(NamedRoutes::with_defaults()),
    };

    let app = router(app_state);
    let addr: SocketAddr = format!("0.0.0.0:{}", http_port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Convenience entry point using the default port and data root.
pub async fn run() -> anyhow::Result<()> {
    run_with_port(7979, "data").await
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "aulanet ok" }))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/csrf", get(get_csrf))
        .route("/me", get(me))
        .route("/flash", get(take_flash))
        .route("/cursos", post(create_curso))
        .route("/cursos/{id}", get(show_curso))
        .route("/cursos/{id}/estudiantes", post(enroll_estudiante))
        .route("/contenidos", post(create_contenido))
        .route("/contenidos/{id}", get(show_contenido))
        .route("/contenidos/{id}/publicar", post(publicar_contenido))
        .route("/trabajos", post(entregar_trabajo))
        .route("/trabajos/{id}", get(show_trabajo))
        .with_state(state)
}

fn parse_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let cookie = headers.get("cookie").or_else(|| headers.get("Cookie"))?;
    let s = cookie.to_str().ok()?;
    for part in s.split(';') {
        if let Some((k, v)) = part.trim().split_once('=') {
            if k == name {
                return Some(v.to_string());
            }
        }
    }
    None
}

fn session_id_from(headers: &HeaderMap) -> Option<String> {
    parse_cookie(headers, SESSION_COOKIE)
}

fn current_user(state: &AppState, headers: &HeaderMap) -> Option<UserContext> {
    let sid = session_id_from(headers)?;
    state.sessions.validate(&sid)
}

fn validate_csrf(state: &AppState, headers: &HeaderMap) -> bool {
    let Some(sid) = session_id_from(headers) else {
        return false;
    };
    let Some(provided) = headers.get("x-csrf-token").and_then(|v| v.to_str().ok()) else {
        return false;
    };
    state.sessions.validate_csrf(&sid, provided)
}

/// Build the dispatcher's request snapshot, attaching the session id when
/// the caller presented a cookie.
fn request_context(headers: &HeaderMap, body: Option<&Value>) -> RequestContext {
    let mut ctx = RequestContext::from_http(headers, body);
    if let Some(sid) = session_id_from(headers) {
        ctx = ctx.with_session(sid);
    }
    ctx
}

fn set_session_cookie(sid: &str) -> HeaderValue {
    HeaderValue::from_str(&format!(
        "{}={}; HttpOnly; Secure; SameSite=Strict; Path=/",
        SESSION_COOKIE, sid
    ))
    .unwrap()
}

fn clear_session_cookie() -> HeaderValue {
    HeaderValue::from_str(&format!(
        "{}=deleted; Expires=Thu, 01 Jan 1970 00:00:00 GMT; HttpOnly; Secure; SameSite=Strict; Path=/",
        SESSION_COOKIE
    ))
    .unwrap()
}

fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({"success": false, "message": "unauthorized"}))).into_response()
}

fn forbidden_csrf() -> Response {
    (StatusCode::FORBIDDEN, Json(json!({"success": false, "message": "invalid csrf"}))).into_response()
}

#[derive(Debug, Deserialize)]
struct LoginPayload {
    username: String,
    password: String,
}

async fn login(State(state): State<AppState>, Json(payload): Json<LoginPayload>) -> impl IntoResponse {
    match security::authenticate(&state.data_root, &payload.username, &payload.password) {
        Ok(Some(user)) => {
            let session = state.sessions.issue(user);
            let mut headers = HeaderMap::new();
            headers.insert("Set-Cookie", set_session_cookie(&session.session_id));
            (
                StatusCode::OK,
                headers,
                Json(json!({"success": true, "csrf": session.csrf_token})),
            )
        }
        Ok(None) => (
            StatusCode::UNAUTHORIZED,
            HeaderMap::new(),
            Json(json!({"success": false, "message": "invalid credentials"})),
        ),
        Err(e) => {
            error!("login error: {e}");
            let app = AppError::from(e);
            (
                StatusCode::from_u16(app.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                HeaderMap::new(),
                Json(json!({"success": false, "message": app.message()})),
            )
        }
    }
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if !validate_csrf(&state, &headers) {
        return forbidden_csrf();
    }
    if let Some(sid) = session_id_from(&headers) {
        state.sessions.logout(&sid);
        state.flash.clear_session(&sid);
    }
    let mut h = HeaderMap::new();
    h.insert("Set-Cookie", clear_session_cookie());
    (StatusCode::OK, h, Json(json!({"success": true}))).into_response()
}

async fn get_csrf(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some(sid) = session_id_from(&headers) else {
        return unauthorized();
    };
    if state.sessions.validate(&sid).is_none() {
        return unauthorized();
    }
    match state.sessions.csrf_for(&sid) {
        Some(token) => (StatusCode::OK, Json(json!({"success": true, "csrf": token}))).into_response(),
        None => unauthorized(),
    }
}

async fn me(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some(user) = current_user(&state, &headers) else {
        return unauthorized();
    };
    (StatusCode::OK, Json(json!({"success": true, "data": current_user_data(&user)}))).into_response()
}

/// One-shot flash read: returns and clears the session's flash map, the way
/// a page render would consume it.
async fn take_flash(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some(sid) = session_id_from(&headers) else {
        return unauthorized();
    };
    if state.sessions.validate(&sid).is_none() {
        return unauthorized();
    }
    let flash = state.flash.take_all(&sid);
    (StatusCode::OK, Json(json!({"success": true, "data": flash}))).into_response()
}

#[derive(Debug, Deserialize)]
struct CreateCursoPayload {
    nombre: String,
    profesor_id: Option<i64>,
}

/// Who owns a new curso. Only admin/director may assign another profesor;
/// a Profesor caller always owns what they create.
fn curso_owner_id(user: &UserContext, requested: Option<i64>) -> i64 {
    if user.has_any_role(OVERRIDE_ROLES) {
        requested.unwrap_or(user.id)
    } else {
        user.id
    }
}

async fn create_curso(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let Some(user) = current_user(&state, &headers) else {
        return unauthorized();
    };
    if !validate_csrf(&state, &headers) {
        return forbidden_csrf();
    }
    if !(user.has_any_role(OVERRIDE_ROLES) || user.kind == UserKind::Profesor) {
        return role_denied(None);
    }
    let req = request_context(&headers, Some(&body));
    let responder = Responder::new(&req, &*state.flash, &*state.routes);
    let directory = state.directory.clone();
    responder.handle_crud_operation(
        move || {
            let payload: CreateCursoPayload = serde_json::from_value(body.clone())
                .map_err(|e| OperationError::new("datos de curso inválidos").field("nombre", e.to_string()))?;
            if payload.nombre.trim().is_empty() {
                return Err(OperationError::new("datos de curso inválidos").field("nombre", "obligatorio"));
            }
            let profesor_id = curso_owner_id(&user, payload.profesor_id);
            let curso = directory.insert_curso(payload.nombre.trim(), profesor_id)?;
            Ok(OperationResult::with_data(json!(curso))
                .redirect_to(RedirectTarget::new("cursos.show").param("curso", curso.id)))
        },
        "Curso creado correctamente",
        None,
    )
}

async fn show_curso(State(state): State<AppState>, headers: HeaderMap, Path(id): Path<i64>) -> Response {
    let Some(user) = current_user(&state, &headers) else {
        return unauthorized();
    };
    // Lookup miss and access denial collapse to the same 403
    let Some(curso) = state.directory.find_curso(id) else {
        return permission_denied(None);
    };
    if !can_access_curso(&user, &*state.directory, id) {
        return permission_denied(None);
    }
    let req = request_context(&headers, None);
    let responder = Responder::new(&req, &*state.flash, &*state.routes);
    responder.respond_with(OperationResult::with_data(json!(curso)))
}

#[derive(Debug, Deserialize)]
struct EnrollPayload {
    estudiante_id: i64,
}

async fn enroll_estudiante(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> Response {
    let Some(user) = current_user(&state, &headers) else {
        return unauthorized();
    };
    if !validate_csrf(&state, &headers) {
        return forbidden_csrf();
    }
    // Roster changes are writes: read access (enrollment, guardianship) is
    // not enough, the caller must manage the curso
    if !can_manage_curso(&user, &*state.directory, id) {
        return permission_denied(Some("Solo el profesor del curso puede gestionar inscripciones"));
    }
    let req = request_context(&headers, Some(&body));
    let responder = Responder::new(&req, &*state.flash, &*state.routes);
    let directory = state.directory.clone();
    responder.handle_crud_operation(
        move || {
            let payload: EnrollPayload = serde_json::from_value(body.clone())
                .map_err(|e| OperationError::new("datos de inscripción inválidos").field("estudiante_id", e.to_string()))?;
            if !directory.enroll(id, payload.estudiante_id)? {
                return Err(OperationError::new("el estudiante ya estaba inscrito o el curso no existe"));
            }
            Ok(OperationResult::with_data(json!({"curso_id": id, "estudiante_id": payload.estudiante_id})))
        },
        "Estudiante inscrito correctamente",
        Some(RedirectTarget::new("cursos.show").param("curso", id)),
    )
}

#[derive(Debug, Deserialize)]
struct CreateContenidoPayload {
    curso_id: i64,
    titulo: String,
    #[serde(default)]
    publicado: bool,
}

async fn create_contenido(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let Some(user) = current_user(&state, &headers) else {
        return unauthorized();
    };
    if !validate_csrf(&state, &headers) {
        return forbidden_csrf();
    }
    let payload: CreateContenidoPayload = match serde_json::from_value(body.clone()) {
        Ok(p) => p,
        Err(e) => {
            let req = request_context(&headers, Some(&body));
            let responder = Responder::new(&req, &*state.flash, &*state.routes);
            let err = OperationError::new("datos de contenido inválidos").field("body", e.to_string());
            return responder.render_failure(&err);
        }
    };
    // Publishing into a curso requires authoring rights on it
    if !can_manage_curso(&user, &*state.directory, payload.curso_id) {
        return permission_denied(Some("Solo el profesor del curso puede añadir contenido"));
    }
    let req = request_context(&headers, Some(&body));
    let responder = Responder::new(&req, &*state.flash, &*state.routes);
    let directory = state.directory.clone();
    responder.handle_crud_operation(
        move || {
            if payload.titulo.trim().is_empty() {
                return Err(OperationError::new("datos de contenido inválidos").field("titulo", "obligatorio"));
            }
            let contenido = directory.insert_contenido(payload.curso_id, payload.titulo.trim(), payload.publicado)?;
            Ok(OperationResult::with_data(json!(contenido))
                .redirect_to(RedirectTarget::new("contenidos.show").param("contenido", contenido.id)))
        },
        "Contenido creado correctamente",
        None,
    )
}

async fn show_contenido(State(state): State<AppState>, headers: HeaderMap, Path(id): Path<i64>) -> Response {
    let Some(user) = current_user(&state, &headers) else {
        return unauthorized();
    };
    let Some(contenido) = state.directory.find_contenido(id) else {
        return permission_denied(None);
    };
    if !can_access_contenido(&user, &*state.directory, id) {
        return permission_denied(None);
    }
    let req = request_context(&headers, None);
    let responder = Responder::new(&req, &*state.flash, &*state.routes);
    responder.respond_with(OperationResult::with_data(json!(contenido)))
}

async fn publicar_contenido(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> Response {
    let Some(user) = current_user(&state, &headers) else {
        return unauthorized();
    };
    if !validate_csrf(&state, &headers) {
        return forbidden_csrf();
    }
    // Override roles pass even when the contenido is missing; the dispatcher
    // then reports the 404 instead of masking it as a 403
    let manages = state
        .directory
        .find_contenido(id)
        .map(|c| can_manage_curso(&user, &*state.directory, c.curso_id))
        .unwrap_or(false);
    if !(user.has_any_role(OVERRIDE_ROLES) || manages) {
        return permission_denied(Some("Solo el profesor del curso puede publicar"));
    }
    let req = request_context(&headers, Some(&body));
    let responder = Responder::new(&req, &*state.flash, &*state.routes);
    let directory = state.directory.clone();
    responder.handle_crud_operation(
        move || {
            if !directory.set_publicado(id, true)? {
                return Err(OperationError::new("contenido no encontrado").with_status(404));
            }
            Ok(OperationResult::with_data(json!({"contenido_id": id, "publicado": true})))
        },
        "Contenido publicado",
        Some(RedirectTarget::new("contenidos.show").param("contenido", id)),
    )
}

#[derive(Debug, Deserialize)]
struct EntregaPayload {
    contenido_id: i64,
}

async fn entregar_trabajo(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let Some(user) = current_user(&state, &headers) else {
        return unauthorized();
    };
    if !validate_csrf(&state, &headers) {
        return forbidden_csrf();
    }
    if user.kind != UserKind::Estudiante {
        return role_denied(Some("Solo un estudiante puede entregar un trabajo"));
    }
    let payload: EntregaPayload = match serde_json::from_value(body.clone()) {
        Ok(p) => p,
        Err(e) => {
            let req = request_context(&headers, Some(&body));
            let responder = Responder::new(&req, &*state.flash, &*state.routes);
            let err = OperationError::new("datos de entrega inválidos").field("contenido_id", e.to_string());
            return responder.render_failure(&err);
        }
    };
    // The estudiante must see the contenido (published, enrolled) to submit
    if !can_access_contenido(&user, &*state.directory, payload.contenido_id) {
        return permission_denied(None);
    }
    let req = request_context(&headers, Some(&body));
    let responder = Responder::new(&req, &*state.flash, &*state.routes);
    let directory = state.directory.clone();
    let estudiante_id = user.id;
    responder.handle_crud_operation(
        move || {
            let trabajo = directory.insert_trabajo(payload.contenido_id, estudiante_id)?;
            Ok(OperationResult::with_data(json!(trabajo))
                .redirect_to(RedirectTarget::new("trabajos.show").param("trabajo", trabajo.id)))
        },
        "Trabajo entregado correctamente",
        None,
    )
}

async fn show_trabajo(State(state): State<AppState>, headers: HeaderMap, Path(id): Path<i64>) -> Response {
    let Some(user) = current_user(&state, &headers) else {
        return unauthorized();
    };
    let Some(trabajo) = state.directory.find_trabajo(id) else {
        return permission_denied(None);
    };
    if !can_access_trabajo(&user, &*state.directory, id) {
        return permission_denied(None);
    }
    let req = request_context(&headers, None);
    let responder = Responder::new(&req, &*state.flash, &*state.routes);
    responder.respond_with(OperationResult::with_data(json!(trabajo)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profesor_always_owns_their_new_curso() {
        let ana = UserContext::new(11, UserKind::Profesor, "Ana", "Ruiz", "ana@example.com")
            .with_role("profesor");
        assert_eq!(curso_owner_id(&ana, None), 11);
        // A Profesor cannot hand ownership to someone else
        assert_eq!(curso_owner_id(&ana, Some(12)), 11);
    }

    #[test]
    fn director_may_assign_another_owner() {
        let iria = UserContext::new(99, UserKind::Director, "Iria", "Paz", "iria@example.com")
            .with_role("director");
        assert_eq!(curso_owner_id(&iria, Some(11)), 11);
        assert_eq!(curso_owner_id(&iria, None), 99);
    }
}
