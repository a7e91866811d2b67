//! Persistence collaborator for access subjects: cursos, contenidos and
//! trabajos. The predicate engine only sees the `SubjectDirectory` trait;
//! `FileDirectory` is the JSON-file-backed implementation used by the server
//! and the tests. Lookups return owned clones so callers never hold a lock.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Curso {
    pub id: i64,
    pub nombre: String,
    /// Owning professor.
    pub profesor_id: i64,
    /// Enrolled student ids.
    #[serde(default)]
    pub estudiantes: HashSet<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contenido {
    pub id: i64,
    pub curso_id: i64,
    pub titulo: String,
    /// Unpublished contenido is invisible to estudiantes.
    pub publicado: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trabajo {
    pub id: i64,
    pub contenido_id: i64,
    /// Submitting student.
    pub estudiante_id: i64,
    pub created_at: DateTime<Utc>,
}

/// Read-only lookup surface the access predicates depend on. Absence is a
/// normal outcome (the predicates translate it into a deny), never an error.
pub trait SubjectDirectory: Send + Sync {
    fn find_curso(&self, id: i64) -> Option<Curso>;
    fn find_contenido(&self, id: i64) -> Option<Contenido>;
    fn find_trabajo(&self, id: i64) -> Option<Trabajo>;
}

pub struct FileDirectory {
    root: PathBuf,
    cursos: RwLock<HashMap<i64, Curso>>,
    contenidos: RwLock<HashMap<i64, Contenido>>,
    trabajos: RwLock<HashMap<i64, Trabajo>>,
    next_id: RwLock<i64>,
}

fn load_map<T: DeserializeOwned + Clone>(path: &Path, id_of: impl Fn(&T) -> i64) -> Result<HashMap<i64, T>> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let file = std::fs::File::open(path).with_context(|| format!("open {}", path.display()))?;
    let rows: Vec<T> = serde_json::from_reader(file).with_context(|| format!("parse {}", path.display()))?;
    Ok(rows.into_iter().map(|r| (id_of(&r), r)).collect())
}

fn save_rows<T: Serialize>(path: &Path, rows: Vec<&T>) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).ok();
    }
    let file = std::fs::File::create(path).with_context(|| format!("create {}", path.display()))?;
    serde_json::to_writer_pretty(file, &rows).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

impl FileDirectory {
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let cursos = load_map(&root.join("cursos.json"), |c: &Curso| c.id)?;
        let contenidos = load_map(&root.join("contenidos.json"), |c: &Contenido| c.id)?;
        let trabajos = load_map(&root.join("trabajos.json"), |t: &Trabajo| t.id)?;
        let max_id = cursos
            .keys()
            .chain(contenidos.keys())
            .chain(trabajos.keys())
            .copied()
            .max()
            .unwrap_or(0);
        Ok(Self {
            root,
            cursos: RwLock::new(cursos),
            contenidos: RwLock::new(contenidos),
            trabajos: RwLock::new(trabajos),
            next_id: RwLock::new(max_id + 1),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.cursos.read().is_empty() && self.contenidos.read().is_empty() && self.trabajos.read().is_empty()
    }

    pub fn next_id(&self) -> i64 {
        let mut guard = self.next_id.write();
        let id = *guard;
        *guard += 1;
        id
    }

    pub fn insert_curso(&self, nombre: &str, profesor_id: i64) -> Result<Curso> {
        let curso = Curso {
            id: self.next_id(),
            nombre: nombre.to_string(),
            profesor_id,
            estudiantes: HashSet::new(),
            created_at: Utc::now(),
        };
        self.cursos.write().insert(curso.id, curso.clone());
        self.persist_cursos()?;
        Ok(curso)
    }

    pub fn enroll(&self, curso_id: i64, estudiante_id: i64) -> Result<bool> {
        let added = {
            let mut map = self.cursos.write();
            match map.get_mut(&curso_id) {
                Some(curso) => curso.estudiantes.insert(estudiante_id),
                None => return Ok(false),
            }
        };
        self.persist_cursos()?;
        Ok(added)
    }

    pub fn insert_contenido(&self, curso_id: i64, titulo: &str, publicado: bool) -> Result<Contenido> {
        let contenido = Contenido {
            id: self.next_id(),
            curso_id,
            titulo: titulo.to_string(),
            publicado,
            created_at: Utc::now(),
        };
        self.contenidos.write().insert(contenido.id, contenido.clone());
        self.persist_contenidos()?;
        Ok(contenido)
    }

    pub fn set_publicado(&self, contenido_id: i64, publicado: bool) -> Result<bool> {
        let changed = {
            let mut map = self.contenidos.write();
            match map.get_mut(&contenido_id) {
                Some(contenido) => {
                    contenido.publicado = publicado;
                    true
                }
                None => false,
            }
        };
        if changed {
            self.persist_contenidos()?;
        }
        Ok(changed)
    }

    pub fn insert_trabajo(&self, contenido_id: i64, estudiante_id: i64) -> Result<Trabajo> {
        let trabajo = Trabajo {
            id: self.next_id(),
            contenido_id,
            estudiante_id,
            created_at: Utc::now(),
        };
        self.trabajos.write().insert(trabajo.id, trabajo.clone());
        self.persist_trabajos()?;
        Ok(trabajo)
    }

    fn persist_cursos(&self) -> Result<()> {
        let map = self.cursos.read();
        let mut rows: Vec<&Curso> = map.values().collect();
        rows.sort_by_key(|c| c.id);
        save_rows(&self.root.join("cursos.json"), rows)
    }

    fn persist_contenidos(&self) -> Result<()> {
        let map = self.contenidos.read();
        let mut rows: Vec<&Contenido> = map.values().collect();
        rows.sort_by_key(|c| c.id);
        save_rows(&self.root.join("contenidos.json"), rows)
    }

    fn persist_trabajos(&self) -> Result<()> {
        let map = self.trabajos.read();
        let mut rows: Vec<&Trabajo> = map.values().collect();
        rows.sort_by_key(|t| t.id);
        save_rows(&self.root.join("trabajos.json"), rows)
    }
}

impl SubjectDirectory for FileDirectory {
    fn find_curso(&self, id: i64) -> Option<Curso> {
        self.cursos.read().get(&id).cloned()
    }

    fn find_contenido(&self, id: i64) -> Option<Contenido> {
        self.contenidos.read().get(&id).cloned()
    }

    fn find_trabajo(&self, id: i64) -> Option<Trabajo> {
        self.trabajos.read().get(&id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn round_trips_through_the_json_files() -> Result<()> {
        let tmp = tempdir()?;
        let curso_id;
        let contenido_id;
        {
            let dir = FileDirectory::open(tmp.path())?;
            assert!(dir.is_empty());
            let curso = dir.insert_curso("Algebra I", 11)?;
            curso_id = curso.id;
            assert!(dir.enroll(curso.id, 7)?);
            // enrolling twice is a no-op, not an error
            assert!(!dir.enroll(curso.id, 7)?);
            let contenido = dir.insert_contenido(curso.id, "Tema 1", false)?;
            contenido_id = contenido.id;
            dir.insert_trabajo(contenido.id, 7)?;
        }
        let dir = FileDirectory::open(tmp.path())?;
        let curso = dir.find_curso(curso_id).expect("curso survives reopen");
        assert_eq!(curso.nombre, "Algebra I");
        assert!(curso.estudiantes.contains(&7));
        assert!(!dir.find_contenido(contenido_id).unwrap().publicado);
        assert!(dir.set_publicado(contenido_id, true)?);
        assert!(dir.find_contenido(contenido_id).unwrap().publicado);
        // ids keep advancing past reloaded rows
        let next = dir.insert_curso("Algebra II", 11)?;
        assert!(next.id > curso_id);
        Ok(())
    }

    #[test]
    fn missing_ids_resolve_to_none() -> Result<()> {
        let tmp = tempdir()?;
        let dir = FileDirectory::open(tmp.path())?;
        assert!(dir.find_curso(999).is_none());
        assert!(dir.find_contenido(999).is_none());
        assert!(dir.find_trabajo(999).is_none());
        assert!(!dir.set_publicado(999, true)?);
        assert!(!dir.enroll(999, 1)?);
        Ok(())
    }
}
