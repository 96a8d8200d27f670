//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

use std::fs;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use rand::rngs::OsRng;
use rand::RngCore;
use serde::Deserialize;
use serde::Serialize;

use crate::pair::gen_private_key;
use crate::pair::scalar_from_str;
use crate::pair::PAIR_MODE;

#[derive(Debug, thiserror::Error)]
pub enum KeyConfigError {
    #[error("key configuration I/O on {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("malformed key configuration: {0}")]
    Json(#[from] serde_json::Error),
    #[error("advertiser key is required, please either provide one or generate one")]
    MissingKey,
    #[error("malformed key configuration file, please regenerate the key: {0}")]
    InvalidKey(#[from] crate::pair::CipherError),
}

/// Persisted advertiser private key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyConfig {
    pub id: String,
    /// base64 of the canonical 32-byte scalar
    pub key: String,
    pub mode: String,
    /// RFC 3339
    pub created_at: String,
}

impl KeyConfig {
    pub fn generate() -> KeyConfig {
        let mut id = [0u8; 16];
        OsRng.fill_bytes(&mut id);

        KeyConfig {
            id: hex::encode(id),
            key: gen_private_key(),
            mode: PAIR_MODE.to_string(),
            created_at: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        }
    }

    /// Loads the configuration at `path`
    ///
    /// A missing or empty file is not an error and yields `None`. The parent
    /// directory is created owner-only when it does not exist.
    pub fn load(path: &Path) -> Result<Option<KeyConfig>, KeyConfigError> {
        ensure_dir(path)?;

        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_err(path, e)),
        };
        if content.trim().is_empty() {
            return Ok(None);
        }

        let config: KeyConfig = serde_json::from_str(&content)?;
        Ok(Some(config))
    }

    /// Writes the configuration to `path` readable by the owner only
    pub fn save(&self, path: &Path) -> Result<(), KeyConfigError> {
        ensure_dir(path)?;

        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options.open(path).map_err(|e| io_err(path, e))?;
        let json = serde_json::to_string_pretty(self)?;
        writeln!(file, "{}", json).map_err(|e| io_err(path, e))?;
        debug!("saved key {} to {}", self.id, path.display());
        Ok(())
    }

    /// Returns the key after checking that it parses as a scalar
    pub fn private_key(&self) -> Result<&str, KeyConfigError> {
        if self.key.is_empty() {
            return Err(KeyConfigError::MissingKey);
        }
        scalar_from_str(&self.key)?;
        Ok(&self.key)
    }
}

/// Resolves the private key for a command
///
/// A key file given on the command line wins over the default configuration.
pub fn read_private_key(
    provided_path: Option<&Path>,
    default_config: Option<&KeyConfig>,
) -> Result<String, KeyConfigError> {
    let config = match provided_path {
        Some(p) => KeyConfig::load(p)?,
        None => default_config.cloned(),
    };
    match config {
        Some(c) => c.private_key().map(String::from),
        None => Err(KeyConfigError::MissingKey),
    }
}

fn ensure_dir(path: &Path) -> Result<(), KeyConfigError> {
    let dir = match path.parent() {
        Some(d) if !d.as_os_str().is_empty() => d,
        _ => return Ok(()),
    };
    if dir.exists() {
        return Ok(());
    }

    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder.create(dir).map_err(|e| io_err(dir, e))
}

fn io_err(path: &Path, source: std::io::Error) -> KeyConfigError {
    KeyConfigError::Io {
        path: path.display().to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_has_no_key() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("opair/key/key.json");

        assert_eq!(KeyConfig::load(&path).unwrap(), None);
        assert!(path.parent().unwrap().is_dir());
        assert!(matches!(
            read_private_key(Some(&path), None),
            Err(KeyConfigError::MissingKey)
        ));
    }

    #[test]
    fn save_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("key/key.json");

        let config = KeyConfig::generate();
        config.save(&path).unwrap();

        let loaded = KeyConfig::load(&path).unwrap().unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.private_key().unwrap(), config.key);
        assert_eq!(read_private_key(Some(&path), None).unwrap(), config.key);
        assert_eq!(read_private_key(None, Some(&config)).unwrap(), config.key);
    }

    #[cfg(unix)]
    #[test]
    fn saved_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join("fresh/key.json");
        KeyConfig::generate().save(&path).unwrap();

        let file_mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        let dir_mode = fs::metadata(path.parent().unwrap()).unwrap().permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600);
        assert_eq!(dir_mode, 0o700);
    }

    #[test]
    fn malformed_key_is_rejected() {
        let mut config = KeyConfig::generate();
        config.key = "bm90IGEga2V5".to_string();
        assert!(matches!(
            config.private_key(),
            Err(KeyConfigError::InvalidKey(_))
        ));

        config.key.clear();
        assert!(matches!(config.private_key(), Err(KeyConfigError::MissingKey)));
    }
}
