use std::collections::HashMap;
use std::time::{Duration, Instant};

use base64::Engine;
use parking_lot::RwLock;

use crate::tprintln;

use super::user_context::UserContext;

pub type SessionToken = String;

#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: String,
    pub csrf_token: SessionToken,
    pub user: UserContext,
    pub issued_at: Instant,
    pub expires_at: Instant,
}

fn gen_id() -> String {
    // 256-bit random token base64url without padding
    let mut buf = [0u8; 32];
    let _ = getrandom::getrandom(&mut buf);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf)
}

/// In-process session table. Held inside `AppState` behind an `Arc` rather
/// than as a process-wide static, so the resolved user is always an explicit
/// parameter downstream.
pub struct SessionManager {
    pub ttl: Duration,
    sessions: RwLock<HashMap<String, Session>>,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(60 * 60),
            sessions: RwLock::new(HashMap::new()),
        }
    }
}

impl SessionManager {
    pub fn issue(&self, user: UserContext) -> Session {
        let now = Instant::now();
        let sid = gen_id();
        let sess = Session {
            session_id: sid.clone(),
            csrf_token: gen_id(),
            user,
            issued_at: now,
            expires_at: now + self.ttl,
        };
        self.sessions.write().insert(sid.clone(), sess.clone());
        tprintln!("session.issue user={} sid={} ttl_secs={}", sess.user.id, sid, self.ttl.as_secs());
        sess
    }

    /// Resolve the user behind a session id; expired entries are pruned.
    /// Removal is the single source of truth for dead sessions: a logged-out
    /// or revoked id is simply absent from the table.
    pub fn validate(&self, session_id: &str) -> Option<UserContext> {
        let now = Instant::now();
        let mut drop_key: Option<String> = None;
        let out = {
            let map = self.sessions.read();
            if let Some(sess) = map.get(session_id) {
                if sess.expires_at > now {
                    Some(sess.user.clone())
                } else {
                    drop_key = Some(session_id.to_string());
                    None
                }
            } else {
                None
            }
        };
        if let Some(k) = drop_key {
            self.sessions.write().remove(&k);
        }
        out
    }

    pub fn csrf_for(&self, session_id: &str) -> Option<SessionToken> {
        self.sessions.read().get(session_id).map(|s| s.csrf_token.clone())
    }

    pub fn validate_csrf(&self, session_id: &str, provided: &str) -> bool {
        match self.sessions.read().get(session_id) {
            Some(sess) => sess.csrf_token == provided,
            None => false,
        }
    }

    pub fn logout(&self, session_id: &str) -> bool {
        self.sessions.write().remove(session_id).is_some()
    }

    pub fn revoke_user(&self, user_id: i64) -> usize {
        let targets: Vec<String> = self
            .sessions
            .read()
            .iter()
            .filter(|(_, s)| s.user.id == user_id)
            .map(|(sid, _)| sid.clone())
            .collect();
        let mut count = 0usize;
        {
            let mut s = self.sessions.write();
            for sid in targets {
                if s.remove(&sid).is_some() {
                    count += 1;
                }
            }
        }
        tprintln!("session.revoke user={} count={}", user_id, count);
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::UserKind;

    fn user(id: i64) -> UserContext {
        UserContext::new(id, UserKind::Profesor, "Ana", "Ruiz", "ana@example.com")
    }

    #[test]
    fn issue_validate_logout_round_trip() {
        let sm = SessionManager::default();
        let sess = sm.issue(user(7));
        assert_eq!(sm.validate(&sess.session_id).map(|u| u.id), Some(7));
        assert!(sm.validate_csrf(&sess.session_id, &sess.csrf_token));
        assert!(!sm.validate_csrf(&sess.session_id, "bogus"));
        assert!(sm.logout(&sess.session_id));
        assert!(sm.validate(&sess.session_id).is_none());
        // A logged-out session id stays dead even if re-presented
        assert!(!sm.logout(&sess.session_id));
    }

    #[test]
    fn logout_leaves_no_residual_state() {
        let sm = SessionManager::default();
        for _ in 0..5 {
            let sess = sm.issue(user(3));
            assert!(sm.logout(&sess.session_id));
            assert!(!sm.logout(&sess.session_id), "second logout of the same id is a no-op");
        }
        assert!(sm.sessions.read().is_empty(), "logout cycles must not accumulate entries");
        // A fresh login after logout works normally
        let again = sm.issue(user(3));
        assert_eq!(sm.validate(&again.session_id).map(|u| u.id), Some(3));
    }

    #[test]
    fn expired_sessions_are_pruned() {
        let sm = SessionManager { ttl: Duration::from_secs(0), ..Default::default() };
        let sess = sm.issue(user(2));
        assert!(sm.validate(&sess.session_id).is_none());
    }

    #[test]
    fn revoke_user_drops_all_their_sessions() {
        let sm = SessionManager::default();
        let a = sm.issue(user(5));
        let b = sm.issue(user(5));
        let other = sm.issue(user(6));
        assert_eq!(sm.revoke_user(5), 2);
        assert!(sm.validate(&a.session_id).is_none());
        assert!(sm.validate(&b.session_id).is_none());
        assert!(sm.validate(&other.session_id).is_some());
    }
}
