//! Storage of the single bearer credential.
//!
//! The store never fails from the caller's point of view: a missing file, a
//! missing data directory, or an unreadable document all read as "no
//! credential". Problems are logged and swallowed.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Holder of at most one opaque bearer token.
pub trait CredentialStore: Send + Sync {
    /// Overwrite any existing credential.
    fn save(&self, token: &str);

    /// The stored credential, or `None` when absent or storage is unavailable.
    fn read(&self) -> Option<String>;

    /// Remove the credential. Clearing an empty store is a no-op.
    fn clear(&self);
}

/// In-process credential store.
///
/// Used by tests and by contexts without persistent storage.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    token: RwLock<Option<String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn save(&self, token: &str) {
        match self.token.write() {
            Ok(mut guard) => *guard = Some(token.to_string()),
            Err(poisoned) => *poisoned.into_inner() = Some(token.to_string()),
        }
    }

    fn read(&self) -> Option<String> {
        match self.token.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn clear(&self) {
        match self.token.write() {
            Ok(mut guard) => *guard = None,
            Err(poisoned) => *poisoned.into_inner() = None,
        }
    }
}

/// On-disk document. `token` is the well-known key.
#[derive(Debug, Serialize, Deserialize)]
struct StoredCredential {
    token: String,
    saved_at: DateTime<Utc>,
}

const CREDENTIAL_FILE: &str = "credentials.json";

/// Persistent credential store scoped to one backend origin.
///
/// Layout: `{app_data_dir}/adminpanel/{origin_slug}/credentials.json`.
#[derive(Debug)]
pub struct FileCredentialStore {
    path: Option<PathBuf>,
    // Serializes read-modify-write cycles within the process.
    io: Mutex<()>,
}

impl FileCredentialStore {
    /// Store for the given API base URL, under the OS data directory.
    ///
    /// Falls back to an unavailable store if no data directory can be found.
    pub fn for_origin(api_url: &str) -> Self {
        match app_data_dir() {
            Some(mut dir) => {
                dir.push(origin_slug(api_url));
                dir.push(CREDENTIAL_FILE);
                Self::at_path(dir)
            }
            None => {
                tracing::warn!("no app data directory; credentials will not be persisted");
                Self::unavailable()
            }
        }
    }

    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            io: Mutex::new(()),
        }
    }

    /// A store with no backing storage: reads are always absent.
    pub fn unavailable() -> Self {
        Self {
            path: None,
            io: Mutex::new(()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ()> {
        self.io.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_document(path: &Path, doc: &StoredCredential) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let bytes = serde_json::to_vec_pretty(doc)?;
        let tmp = path.with_extension("json.tmp");

        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options.open(&tmp)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    }
}

impl CredentialStore for FileCredentialStore {
    fn save(&self, token: &str) {
        let Some(path) = &self.path else {
            tracing::warn!("credential storage unavailable; token not persisted");
            return;
        };

        let _guard = self.lock();
        let doc = StoredCredential {
            token: token.to_string(),
            saved_at: Utc::now(),
        };

        if let Err(err) = Self::write_document(path, &doc) {
            tracing::warn!(path = %path.display(), "failed to persist credential: {err}");
            // The previous token must not outlive a save that did not land.
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => tracing::warn!(path = %path.display(), "failed to drop stale credential: {err}"),
            }
        }
    }

    fn read(&self) -> Option<String> {
        let path = self.path.as_ref()?;
        let _guard = self.lock();

        let data = match fs::read(path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
            Err(err) => {
                tracing::warn!(path = %path.display(), "failed to read credential: {err}");
                return None;
            }
        };

        match serde_json::from_slice::<StoredCredential>(&data) {
            Ok(doc) => Some(doc.token),
            Err(err) => {
                tracing::warn!(path = %path.display(), "ignoring malformed credential file: {err}");
                None
            }
        }
    }

    fn clear(&self) {
        let Some(path) = &self.path else {
            return;
        };

        let _guard = self.lock();
        match fs::remove_file(path) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => tracing::warn!(path = %path.display(), "failed to clear credential: {err}"),
        }
    }
}

/// Filesystem-safe rendering of an API base URL.
///
/// `http://localhost:8001/` becomes `http_localhost_8001`.
pub fn origin_slug(api_url: &str) -> String {
    let slug: String = api_url
        .trim()
        .trim_end_matches('/')
        .replace("://", "_")
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect();

    let slug = slug.trim_matches('_');
    if slug.is_empty() {
        "default".to_string()
    } else {
        slug.to_string()
    }
}

/// `{data_dir}/adminpanel`, or `~/.local/share/adminpanel` when the OS reports
/// no data directory.
fn app_data_dir() -> Option<PathBuf> {
    let mut dir = dirs::data_dir().or_else(|| {
        dirs::home_dir().map(|mut h| {
            h.push(".local");
            h.push("share");
            h
        })
    })?;
    dir.push("adminpanel");
    Some(dir)
}
