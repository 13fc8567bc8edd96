//! Persistent cache for access tokens and client registrations.
//!
//! Two record types: access tokens keyed by [`SessionKey`], client
//! registrations keyed by identity-provider region. The cache is
//! process-shared; adapters must tolerate concurrent access from multiple
//! sessions without cross-contamination.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{AuthError, Result};
use crate::token::{AccessToken, ClientRegistration, SessionKey};

/// Storage abstraction for persisted tokens and registrations.
///
/// All operations are synchronous and side-effecting. Reads treat corrupt
/// entries as absent; write failures surface as [`AuthError::Io`] and are
/// never swallowed.
pub trait TokenCache: Send + Sync {
    fn load_access_token(&self, key: &SessionKey) -> Result<Option<AccessToken>>;
    fn save_access_token(&self, key: &SessionKey, token: &AccessToken) -> Result<()>;
    fn invalidate_access_token(&self, key: &SessionKey) -> Result<()>;
    fn load_client_registration(&self, region: &str) -> Result<Option<ClientRegistration>>;
    fn save_client_registration(
        &self,
        region: &str,
        registration: &ClientRegistration,
    ) -> Result<()>;
    fn invalidate_client_registration(&self, region: &str) -> Result<()>;
}

/// File-backed cache using one TOML file per record.
///
/// Token file names embed a digest of the session key; registration file
/// names embed the normalized region. Files are written with owner-only
/// permissions on Unix.
#[derive(Debug, Clone)]
pub struct FileTokenCache {
    base_dir: PathBuf,
}

impl FileTokenCache {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn new_default() -> Self {
        Self {
            base_dir: default_cache_dir(),
        }
    }

    fn token_path(&self, key: &SessionKey) -> PathBuf {
        let digest = Sha256::digest(key.canonical().as_bytes());
        let name = URL_SAFE_NO_PAD.encode(&digest[..16]);
        self.base_dir.join(format!("token-{name}.toml"))
    }

    fn registration_path(&self, region: &str) -> PathBuf {
        self.base_dir
            .join(format!("registration-{}.toml", normalize_label(region)))
    }

    fn read_record<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
        let raw = match fs::read_to_string(path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(AuthError::Io(err.to_string())),
        };
        match toml::from_str(&raw) {
            Ok(record) => Ok(Some(record)),
            Err(err) => {
                // Corrupt entries are a cache miss, not a failure.
                tracing::warn!(path = %path.display(), error = %err, "Discarding corrupt cache entry");
                Ok(None)
            }
        }
    }

    fn write_record<T: Serialize>(&self, path: &Path, record: &T) -> Result<()> {
        fs::create_dir_all(&self.base_dir)?;
        let serialized = toml::to_string(record)?;
        fs::write(path, serialized)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }

    fn remove(path: &Path) -> Result<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(AuthError::Io(err.to_string())),
        }
    }
}

impl TokenCache for FileTokenCache {
    fn load_access_token(&self, key: &SessionKey) -> Result<Option<AccessToken>> {
        Ok(Self::read_record::<TokenFile>(&self.token_path(key))?.map(|file| file.token))
    }

    fn save_access_token(&self, key: &SessionKey, token: &AccessToken) -> Result<()> {
        let record = TokenFile {
            version: 1,
            token: token.clone(),
            saved_at: Utc::now(),
        };
        self.write_record(&self.token_path(key), &record)
    }

    fn invalidate_access_token(&self, key: &SessionKey) -> Result<()> {
        Self::remove(&self.token_path(key))
    }

    fn load_client_registration(&self, region: &str) -> Result<Option<ClientRegistration>> {
        Ok(
            Self::read_record::<RegistrationFile>(&self.registration_path(region))?
                .map(|file| file.registration),
        )
    }

    fn save_client_registration(
        &self,
        region: &str,
        registration: &ClientRegistration,
    ) -> Result<()> {
        let record = RegistrationFile {
            version: 1,
            region: region.to_string(),
            registration: registration.clone(),
            saved_at: Utc::now(),
        };
        self.write_record(&self.registration_path(region), &record)
    }

    fn invalidate_client_registration(&self, region: &str) -> Result<()> {
        Self::remove(&self.registration_path(region))
    }
}

/// In-memory cache adapter. Used in tests and by embedders that manage
/// persistence themselves.
#[derive(Default)]
pub struct MemoryTokenCache {
    tokens: Mutex<HashMap<SessionKey, AccessToken>>,
    registrations: Mutex<HashMap<String, ClientRegistration>>,
}

impl MemoryTokenCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenCache for MemoryTokenCache {
    fn load_access_token(&self, key: &SessionKey) -> Result<Option<AccessToken>> {
        Ok(self
            .tokens
            .lock()
            .expect("cache lock poisoned")
            .get(key)
            .cloned())
    }

    fn save_access_token(&self, key: &SessionKey, token: &AccessToken) -> Result<()> {
        self.tokens
            .lock()
            .expect("cache lock poisoned")
            .insert(key.clone(), token.clone());
        Ok(())
    }

    fn invalidate_access_token(&self, key: &SessionKey) -> Result<()> {
        self.tokens
            .lock()
            .expect("cache lock poisoned")
            .remove(key);
        Ok(())
    }

    fn load_client_registration(&self, region: &str) -> Result<Option<ClientRegistration>> {
        Ok(self
            .registrations
            .lock()
            .expect("cache lock poisoned")
            .get(region)
            .cloned())
    }

    fn save_client_registration(
        &self,
        region: &str,
        registration: &ClientRegistration,
    ) -> Result<()> {
        self.registrations
            .lock()
            .expect("cache lock poisoned")
            .insert(region.to_string(), registration.clone());
        Ok(())
    }

    fn invalidate_client_registration(&self, region: &str) -> Result<()> {
        self.registrations
            .lock()
            .expect("cache lock poisoned")
            .remove(region);
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct TokenFile {
    version: u32,
    token: AccessToken,
    saved_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RegistrationFile {
    version: u32,
    region: String,
    registration: ClientRegistration,
    saved_at: DateTime<Utc>,
}

fn default_cache_dir() -> PathBuf {
    directories::UserDirs::new()
        .map(|dirs| dirs.home_dir().join(".sso-bearer"))
        .unwrap_or_else(|| PathBuf::from(".sso-bearer"))
}

fn normalize_label(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return "default".to_string();
    }
    let mut out = String::with_capacity(trimmed.len());
    for ch in trimmed.chars() {
        let lower = ch.to_ascii_lowercase();
        if lower.is_ascii_alphanumeric() || lower == '-' {
            out.push(lower);
        } else {
            out.push('-');
        }
    }
    if out.trim_matches('-').is_empty() {
        "default".to_string()
    } else {
        out
    }
}
