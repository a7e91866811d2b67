//! One-shot flash storage: values written here are visible to exactly the
//! next page render for the same session, then discarded.

use std::collections::HashMap;

use parking_lot::RwLock;

/// Write side of the flash store, the only part the dispatcher needs.
pub trait FlashSink: Send + Sync {
    fn put_flash(&self, session_id: &str, key: &str, value: &str);
}

#[derive(Default)]
pub struct SessionFlash {
    entries: RwLock<HashMap<String, HashMap<String, String>>>,
}

impl SessionFlash {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume the session's flash map. The read removes the entries; a
    /// second call returns an empty map.
    pub fn take_all(&self, session_id: &str) -> HashMap<String, String> {
        self.entries.write().remove(session_id).unwrap_or_default()
    }

    pub fn clear_session(&self, session_id: &str) {
        self.entries.write().remove(session_id);
    }
}

impl FlashSink for SessionFlash {
    fn put_flash(&self, session_id: &str, key: &str, value: &str) {
        self.entries
            .write()
            .entry(session_id.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flash_is_read_exactly_once() {
        let flash = SessionFlash::new();
        flash.put_flash("sid", "success", "Curso creado");
        flash.put_flash("sid", "error", "nope");
        let first = flash.take_all("sid");
        assert_eq!(first.get("success").map(String::as_str), Some("Curso creado"));
        assert_eq!(first.get("error").map(String::as_str), Some("nope"));
        assert!(flash.take_all("sid").is_empty());
    }

    #[test]
    fn sessions_do_not_leak_into_each_other() {
        let flash = SessionFlash::new();
        flash.put_flash("a", "success", "hola");
        assert!(flash.take_all("b").is_empty());
        assert_eq!(flash.take_all("a").len(), 1);
    }
}
