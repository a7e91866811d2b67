//! Authentication/session integration tests: Argon2 credential checks against
//! the JSON account store plus session issue/validate/CSRF behavior, the same
//! flow the login handler runs.

use anyhow::Result;
use tempfile::tempdir;

use aulanet::context::{SessionManager, UserContext, UserKind};
use aulanet::security;

#[test]
fn login_positive_and_negative() -> Result<()> {
    let tmp = tempdir()?;
    let root = tmp.path().to_str().unwrap();

    let alice = UserContext::new(5, UserKind::Profesor, "Alicia", "Vega", "alicia@example.com")
        .with_role("profesor");
    security::add_user(root, "alicia", "s3cr3t!", alice)?;

    assert!(
        security::authenticate(root, "alicia", "wrong")?.is_none(),
        "login with wrong password must fail"
    );
    assert!(
        security::authenticate(root, "nobody", "s3cr3t!")?.is_none(),
        "unknown username must fail"
    );
    let user = security::authenticate(root, "alicia", "s3cr3t!")?.expect("correct password succeeds");
    assert_eq!(user.id, 5);
    assert!(user.has_role("profesor"));
    Ok(())
}

#[test]
fn session_flow_after_login() -> Result<()> {
    let tmp = tempdir()?;
    let root = tmp.path().to_str().unwrap();
    security::ensure_default_admin(root)?;

    let admin = security::authenticate(root, security::DEFAULT_ADMIN_USERNAME, "aulanet")?
        .expect("default admin present");
    let sm = SessionManager::default();
    let session = sm.issue(admin);

    // The cookie value resolves back to the user until logout
    let resolved = sm.validate(&session.session_id).expect("session valid");
    assert!(resolved.has_role("admin"));
    assert!(sm.validate_csrf(&session.session_id, &session.csrf_token));
    assert!(!sm.validate_csrf(&session.session_id, "forged"));

    assert!(sm.logout(&session.session_id));
    assert!(sm.validate(&session.session_id).is_none(), "logged-out session must not resolve");
    assert!(
        !sm.validate_csrf(&session.session_id, &session.csrf_token),
        "CSRF token dies with the session"
    );
    Ok(())
}
