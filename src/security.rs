//! Account store and password verification. Accounts live in a single JSON
//! file under the data root; hashes are Argon2 PHC strings. This is the
//! session layer's collaborator, not part of the access predicates.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use password_hash::{PasswordHash, SaltString};
use serde::{Deserialize, Serialize};

use crate::context::{UserContext, UserKind};

pub const DEFAULT_ADMIN_USERNAME: &str = "aulanet";
const DEFAULT_ADMIN_PASSWORD: &str = "aulanet";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub username: String,
    pub password_hash: String,
    pub user: UserContext,
}

fn accounts_path(data_root: &str) -> PathBuf {
    Path::new(data_root).join("accounts.json")
}

pub fn hash_password(password: &str) -> Result<String> {
    let mut salt_bytes = [0u8; 16];
    getrandom::getrandom(&mut salt_bytes).map_err(|e| anyhow!(e.to_string()))?;
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| anyhow!(e.to_string()))?;
    let argon2 = Argon2::default();
    let phc = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!(e.to_string()))?
        .to_string();
    Ok(phc)
}

pub fn verify_password(hash: &str, password: &str) -> bool {
    if let Ok(parsed) = PasswordHash::new(hash) {
        let argon2 = Argon2::default();
        argon2.verify_password(password.as_bytes(), &parsed).is_ok()
    } else {
        false
    }
}

fn read_accounts(data_root: &str) -> Result<Vec<Account>> {
    let path = accounts_path(data_root);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = std::fs::File::open(&path).with_context(|| format!("open {}", path.display()))?;
    let accounts = serde_json::from_reader(file).with_context(|| format!("parse {}", path.display()))?;
    Ok(accounts)
}

fn write_accounts(data_root: &str, accounts: &[Account]) -> Result<()> {
    let path = accounts_path(data_root);
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).ok();
    }
    let file = std::fs::File::create(&path).with_context(|| format!("create {}", path.display()))?;
    serde_json::to_writer_pretty(file, accounts).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

/// Provision the bootstrap admin on first start; a no-op once the account
/// file exists.
pub fn ensure_default_admin(data_root: &str) -> Result<()> {
    if accounts_path(data_root).exists() {
        return Ok(());
    }
    let user = UserContext::new(1, UserKind::Admin, "Aulanet", "Admin", "admin@aulanet.local")
        .with_role("admin");
    let account = Account {
        username: DEFAULT_ADMIN_USERNAME.to_string(),
        password_hash: hash_password(DEFAULT_ADMIN_PASSWORD)?,
        user,
    };
    write_accounts(data_root, &[account])
}

/// Create or replace the account for `username`.
pub fn add_user(data_root: &str, username: &str, password: &str, user: UserContext) -> Result<()> {
    let mut accounts = read_accounts(data_root)?;
    accounts.retain(|a| a.username != username);
    accounts.push(Account {
        username: username.to_string(),
        password_hash: hash_password(password)?,
        user,
    });
    write_accounts(data_root, &accounts)
}

pub fn alter_password(data_root: &str, username: &str, new_password: &str) -> Result<()> {
    let mut accounts = read_accounts(data_root)?;
    let Some(account) = accounts.iter_mut().find(|a| a.username == username) else {
        return Err(anyhow!("user not found"));
    };
    account.password_hash = hash_password(new_password)?;
    write_accounts(data_root, &accounts)
}

pub fn delete_user(data_root: &str, username: &str) -> Result<()> {
    let mut accounts = read_accounts(data_root)?;
    accounts.retain(|a| a.username != username);
    write_accounts(data_root, &accounts)
}

/// Verify credentials; `Ok(Some(user))` on success, `Ok(None)` on a bad
/// username or password. I/O trouble is the only error path.
pub fn authenticate(data_root: &str, username: &str, password: &str) -> Result<Option<UserContext>> {
    let accounts = read_accounts(data_root)?;
    for account in accounts {
        if account.username == username {
            if verify_password(&account.password_hash, password) {
                return Ok(Some(account.user));
            }
            return Ok(None);
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn hash_and_verify() -> Result<()> {
        let phc = hash_password("s3cr3t!")?;
        assert!(verify_password(&phc, "s3cr3t!"));
        assert!(!verify_password(&phc, "wrong"));
        assert!(!verify_password("not-a-phc-string", "s3cr3t!"));
        Ok(())
    }

    #[test]
    fn default_admin_is_provisioned_once() -> Result<()> {
        let tmp = tempdir()?;
        let root = tmp.path().to_str().unwrap();
        ensure_default_admin(root)?;
        let admin = authenticate(root, DEFAULT_ADMIN_USERNAME, "aulanet")?.expect("default admin logs in");
        assert!(admin.has_role("admin"));
        // Second call must not reset a changed password
        alter_password(root, DEFAULT_ADMIN_USERNAME, "nuevo")?;
        ensure_default_admin(root)?;
        assert!(authenticate(root, DEFAULT_ADMIN_USERNAME, "aulanet")?.is_none());
        assert!(authenticate(root, DEFAULT_ADMIN_USERNAME, "nuevo")?.is_some());
        Ok(())
    }

    #[test]
    fn add_replace_delete_user() -> Result<()> {
        let tmp = tempdir()?;
        let root = tmp.path().to_str().unwrap();
        let user = UserContext::new(7, UserKind::Estudiante, "Luz", "Marín", "luz@example.com");
        add_user(root, "luz", "pw1", user.clone())?;
        assert_eq!(authenticate(root, "luz", "pw1")?.map(|u| u.id), Some(7));
        // Re-adding replaces the credentials rather than duplicating the row
        add_user(root, "luz", "pw2", user)?;
        assert!(authenticate(root, "luz", "pw1")?.is_none());
        assert!(authenticate(root, "luz", "pw2")?.is_some());
        delete_user(root, "luz")?;
        assert!(authenticate(root, "luz", "pw2")?.is_none());
        Ok(())
    }
}
