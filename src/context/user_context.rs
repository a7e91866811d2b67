use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::directory::Curso;

/// Concrete user variant. Roles refine this further (a Profesor may also
/// carry the `director` role), so predicates consult both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserKind {
    Admin,
    Director,
    Profesor,
    Estudiante,
    Padre,
}

impl UserKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserKind::Admin => "admin",
            UserKind::Director => "director",
            UserKind::Profesor => "profesor",
            UserKind::Estudiante => "estudiante",
            UserKind::Padre => "padre",
        }
    }
}

/// Authenticated-user snapshot resolved once per request from the session.
/// Read-only to the access predicates; never mutated by the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserContext {
    pub id: i64,
    pub name: String,
    pub surname: String,
    pub email: String,
    pub kind: UserKind,
    #[serde(default)]
    pub roles: HashSet<String>,
    #[serde(default)]
    pub permissions: HashSet<String>,
    /// Ids of this user's children; only populated for Padre accounts.
    #[serde(default)]
    pub children: HashSet<i64>,
}

impl UserContext {
    pub fn new(id: i64, kind: UserKind, name: &str, surname: &str, email: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            surname: surname.to_string(),
            email: email.to_string(),
            kind,
            roles: HashSet::new(),
            permissions: HashSet::new(),
            children: HashSet::new(),
        }
    }

    pub fn with_role(mut self, role: &str) -> Self {
        self.roles.insert(role.to_string());
        self
    }

    pub fn with_permission(mut self, permission: &str) -> Self {
        self.permissions.insert(permission.to_string());
        self
    }

    pub fn with_child(mut self, child_id: i64) -> Self {
        self.children.insert(child_id);
        self
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    pub fn has_any_role(&self, roles: &[&str]) -> bool {
        roles.iter().any(|r| self.roles.contains(*r))
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }

    pub fn child_ids(&self) -> &HashSet<i64> {
        &self.children
    }

    /// Whether this user is the owning professor of the given curso.
    pub fn owns_curso(&self, curso: &Curso) -> bool {
        curso.profesor_id == self.id
    }
}
