use crate::domain::session::Session;
use crate::domain::user::UserProfile;
use crate::error::{ApiError, Result};
use serde_json::{Map, Value};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const KEY_SCHEMA_VERSION: &str = "schema_version";
const KEY_TOKEN: &str = "auth_token";
const KEY_REFRESH_TOKEN: &str = "auth_refresh_token";
const KEY_USER: &str = "auth_user";

/// Keys written by earlier clients, folded into the canonical keys once on
/// load and then deleted. The canonical key wins when both are present.
const LEGACY_TOKEN_KEYS: &[&str] = &["authToken", "token"];
const LEGACY_REFRESH_KEYS: &[&str] = &["refreshToken"];
const LEGACY_USER_KEYS: &[&str] = &["user"];
/// Legacy top-level `userId` duplicated a field inside the user blob; it is
/// dropped outright.
const LEGACY_DROPPED_KEYS: &[&str] = &["userId"];

const SCHEMA_VERSION: u64 = 1;

/// File-backed persisted session. The document is a flat JSON object of
/// string keys so older session files remain readable.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    #[must_use]
    pub const fn new(path: PathBuf) -> Self {
        Self { path }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the persisted session, migrating legacy keys and dropping a
    /// corrupted user blob rather than failing. A session is returned only
    /// when both an access token and a user profile are present.
    ///
    /// # Errors
    /// Returns an error if a migrated or repaired document cannot be written
    /// back to disk.
    pub fn load(&self) -> Result<Option<Session>> {
        let mut doc = self.read_document();
        let mut dirty = Self::migrate_legacy(&mut doc);

        let access_token = doc.get(KEY_TOKEN).and_then(Value::as_str).map(str::to_owned);
        let refresh_token = doc.get(KEY_REFRESH_TOKEN).and_then(Value::as_str).map(str::to_owned);

        let user = match doc.get(KEY_USER).and_then(Value::as_str) {
            Some(blob) => match serde_json::from_str::<UserProfile>(blob) {
                Ok(user) => Some(user),
                Err(e) => {
                    tracing::warn!(error = %e, "Dropping corrupted persisted user profile");
                    doc.remove(KEY_USER);
                    dirty = true;
                    None
                }
            },
            None => None,
        };

        if dirty {
            self.write_document(&doc)?;
        }

        Ok(match (access_token, user) {
            (Some(access_token), Some(user)) => Some(Session { access_token, refresh_token, user }),
            _ => None,
        })
    }

    /// Persists the whole session in a single write.
    ///
    /// # Errors
    /// Returns an error if the session file cannot be written.
    pub fn save(&self, session: &Session) -> Result<()> {
        let user_blob = serde_json::to_string(&session.user).map_err(|_| ApiError::Internal)?;

        let mut doc = Map::new();
        doc.insert(KEY_SCHEMA_VERSION.to_string(), Value::from(SCHEMA_VERSION));
        doc.insert(KEY_TOKEN.to_string(), Value::from(session.access_token.as_str()));
        if let Some(refresh_token) = &session.refresh_token {
            doc.insert(KEY_REFRESH_TOKEN.to_string(), Value::from(refresh_token.as_str()));
        }
        doc.insert(KEY_USER.to_string(), Value::from(user_blob));

        self.write_document(&doc)
    }

    /// Removes the session file. Clearing an already-empty store is not an
    /// error.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be removed.
    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn migrate_legacy(doc: &mut Map<String, Value>) -> bool {
        let mut changed = false;

        let mappings: [(&str, &[&str]); 3] = [
            (KEY_TOKEN, LEGACY_TOKEN_KEYS),
            (KEY_REFRESH_TOKEN, LEGACY_REFRESH_KEYS),
            (KEY_USER, LEGACY_USER_KEYS),
        ];
        for (canonical, legacy_keys) in mappings {
            for key in legacy_keys {
                if let Some(value) = doc.remove(*key) {
                    changed = true;
                    if !doc.contains_key(canonical) {
                        doc.insert(canonical.to_string(), value);
                    }
                }
            }
        }
        for key in LEGACY_DROPPED_KEYS {
            changed |= doc.remove(*key).is_some();
        }

        if changed {
            doc.insert(KEY_SCHEMA_VERSION.to_string(), Value::from(SCHEMA_VERSION));
            tracing::info!("Migrated legacy session keys to the canonical schema");
        }
        changed
    }

    fn read_document(&self) -> Map<String, Value> {
        match fs::read(&self.path) {
            Ok(bytes) => match serde_json::from_slice::<Value>(&bytes) {
                Ok(Value::Object(map)) => map,
                _ => {
                    tracing::warn!(path = %self.path.display(), "Session file is not a JSON object, starting empty");
                    Map::new()
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => Map::new(),
            Err(e) => {
                tracing::warn!(error = %e, path = %self.path.display(), "Session file unreadable, starting empty");
                Map::new()
            }
        }
    }

    fn write_document(&self, doc: &Map<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let bytes = serde_json::to_vec_pretty(doc).map_err(|_| ApiError::Internal)?;
        fs::write(&self.path, bytes)?;
        Ok(())
    }
}
