//! Account registry persistence.
//!
//! The registry is a single `accounts.json` holding every account plus an
//! opaque settings blob. Writes go through a temp file + rename so a
//! concurrent reader never sees partial JSON.

use serde::{Deserialize, Serialize};
use std::path::Path;

use relay_types::error::AccountError;
use relay_types::models::Account;

/// On-disk envelope: accounts plus pass-through settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub(crate) struct AccountsFile {
    #[serde(default)]
    pub accounts: Vec<Account>,
    #[serde(default)]
    pub settings: serde_json::Map<String, serde_json::Value>,
}

/// Read the registry; an absent file is an empty registry.
pub(crate) fn load_file(path: &Path) -> Result<AccountsFile, AccountError> {
    if !path.exists() {
        return Ok(AccountsFile::default());
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| AccountError::Storage { message: format!("read {path:?}: {e}") })?;
    serde_json::from_str(&content)
        .map_err(|e| AccountError::Storage { message: format!("parse {path:?}: {e}") })
}

/// Write the registry atomically.
pub(crate) async fn save_file(path: &Path, file: &AccountsFile) -> Result<(), AccountError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| AccountError::Storage { message: format!("mkdir {parent:?}: {e}") })?;
    }

    let content = serde_json::to_string_pretty(file)
        .map_err(|e| AccountError::Storage { message: format!("serialize: {e}") })?;

    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, content)
        .await
        .map_err(|e| AccountError::Storage { message: format!("write {tmp:?}: {e}") })?;
    tokio::fs::rename(&tmp, path).await.map_err(|e| {
        AccountError::Storage { message: format!("replace {path:?}: {e}") }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_types::models::AccountSource;

    #[test]
    fn missing_file_is_empty_registry() {
        let dir = tempfile::tempdir().unwrap();
        let file = load_file(&dir.path().join("accounts.json")).unwrap();
        assert!(file.accounts.is_empty());
    }

    #[tokio::test]
    async fn roundtrip_preserves_accounts_and_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("accounts.json");

        let mut file = AccountsFile::default();
        file.accounts.push(Account::new("a@example.com".to_string(), AccountSource::Manual));
        file.settings
            .insert("requestDelayMs".to_string(), serde_json::Value::Number(250.into()));

        save_file(&path, &file).await.unwrap();
        let loaded = load_file(&path).unwrap();

        assert_eq!(loaded.accounts.len(), 1);
        assert_eq!(loaded.accounts[0].email, "a@example.com");
        assert_eq!(loaded.settings["requestDelayMs"], 250);
    }

    #[tokio::test]
    async fn save_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("accounts.json");
        save_file(&path, &AccountsFile::default()).await.unwrap();
        assert!(path.exists());
        assert!(!path.with_extension("json.tmp").exists());
    }
}
