//! Role/permission access predicates over cursos, contenidos and trabajos.
//!
//! Pure, side-effect-free rule chains: the first satisfied rule allows,
//! otherwise deny. A lookup miss is a deny, never an error; callers wanting
//! 404 semantics must check existence themselves before asking here.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

use crate::context::{UserContext, UserKind};
use crate::directory::SubjectDirectory;

/// Roles that bypass relationship checks on every subject.
pub const OVERRIDE_ROLES: &[&str] = &["admin", "director"];

pub const PERMISSION_DENIED: &str = "PERMISSION_DENIED";
pub const ROLE_DENIED: &str = "ROLE_DENIED";

/// Curso access: admin/director override, then ownership (Profesor),
/// enrollment (Estudiante), guardianship (Padre).
pub fn can_access_curso(user: &UserContext, dir: &dyn SubjectDirectory, curso_id: i64) -> bool {
    let Some(curso) = dir.find_curso(curso_id) else {
        return false;
    };
    if user.has_any_role(OVERRIDE_ROLES) {
        return true;
    }
    match user.kind {
        UserKind::Profesor => user.owns_curso(&curso),
        UserKind::Estudiante => curso.estudiantes.contains(&user.id),
        UserKind::Padre => user.child_ids().iter().any(|c| curso.estudiantes.contains(c)),
        _ => false,
    }
}

/// Curso management (roster changes, authoring): stricter than read access.
/// Only admin/director or the owning Profesor qualify; enrollment and
/// guardianship grant reads, never writes.
pub fn can_manage_curso(user: &UserContext, dir: &dyn SubjectDirectory, curso_id: i64) -> bool {
    let Some(curso) = dir.find_curso(curso_id) else {
        return false;
    };
    if user.has_any_role(OVERRIDE_ROLES) {
        return true;
    }
    user.kind == UserKind::Profesor && user.owns_curso(&curso)
}

/// Contenido access: curso access is a precondition; an Estudiante is
/// additionally gated on the published flag.
pub fn can_access_contenido(user: &UserContext, dir: &dyn SubjectDirectory, contenido_id: i64) -> bool {
    let Some(contenido) = dir.find_contenido(contenido_id) else {
        return false;
    };
    if !can_access_curso(user, dir, contenido.curso_id) {
        return false;
    }
    if user.kind == UserKind::Estudiante && !contenido.publicado {
        return false;
    }
    true
}

/// Trabajo access: the submitter always sees their own submission, then the
/// owning professor of the trabajo's curso, then admin/director, then a
/// Padre of the submitter.
pub fn can_access_trabajo(user: &UserContext, dir: &dyn SubjectDirectory, trabajo_id: i64) -> bool {
    let Some(trabajo) = dir.find_trabajo(trabajo_id) else {
        return false;
    };
    if trabajo.estudiante_id == user.id {
        return true;
    }
    if user.kind == UserKind::Profesor {
        if let Some(contenido) = dir.find_contenido(trabajo.contenido_id) {
            if let Some(curso) = dir.find_curso(contenido.curso_id) {
                if user.owns_curso(&curso) {
                    return true;
                }
            }
        }
    }
    if user.has_any_role(OVERRIDE_ROLES) {
        return true;
    }
    user.kind == UserKind::Padre && user.child_ids().contains(&trabajo.estudiante_id)
}

fn denied(code: &str, message: &str) -> Response {
    (
        StatusCode::FORBIDDEN,
        Json(json!({"success": false, "error_code": code, "message": message})),
    )
        .into_response()
}

/// 403 for a failed permission check.
pub fn permission_denied(message: Option<&str>) -> Response {
    denied(
        PERMISSION_DENIED,
        message.unwrap_or("No tienes permiso para realizar esta acción"),
    )
}

/// 403 for a failed role check.
pub fn role_denied(message: Option<&str>) -> Response {
    denied(ROLE_DENIED, message.unwrap_or("Tu rol no permite acceder a este recurso"))
}

/// Projection of the authenticated user for page payloads. No decision
/// logic, just the shape the front end expects.
pub fn current_user_data(user: &UserContext) -> Value {
    let mut roles: Vec<&str> = user.roles.iter().map(String::as_str).collect();
    roles.sort_unstable();
    let mut permissions: Vec<&str> = user.permissions.iter().map(String::as_str).collect();
    permissions.sort_unstable();
    json!({
        "id": user.id,
        "name": user.name,
        "surname": user.surname,
        "email": user.email,
        "type": user.kind.as_str(),
        "roles": roles,
        "permissions": permissions,
        "is_admin": user.kind == UserKind::Admin || user.has_role("admin"),
        "is_director": user.kind == UserKind::Director || user.has_role("director"),
        "is_profesor": user.kind == UserKind::Profesor,
        "is_estudiante": user.kind == UserKind::Estudiante,
        "is_padre": user.kind == UserKind::Padre,
    })
}
