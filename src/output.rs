use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::{Error, Result};

/// Extension of transient request payload files.
pub const REQUEST_FILE_EXTENSION: &str = "txt";

/// Inputs to an artifact name.
#[derive(Debug, Clone, Copy)]
pub struct ArtifactKey<'a> {
    /// Request identity, e.g. `VG.MEPAS` or `VG.MEPAS+2`.
    pub identity: &'a str,
    pub timestamp: DateTime<Utc>,
    /// Distinguishes names produced within the same second.
    pub token: &'a str,
    pub extension: &'a str,
}

/// Pure mapping from an [`ArtifactKey`] to a file name (no directory).
pub trait NamingStrategy: Send + Sync {
    fn file_name(&self, key: &ArtifactKey<'_>) -> String;
}

impl<F> NamingStrategy for F
where
    F: Fn(&ArtifactKey<'_>) -> String + Send + Sync,
{
    fn file_name(&self, key: &ArtifactKey<'_>) -> String {
        self(key)
    }
}

/// `<identity>_<YYYYmmddTHHMMSS>_<token>.<ext>`, identity reduced to filename-safe chars.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimestampNaming;

impl NamingStrategy for TimestampNaming {
    fn file_name(&self, key: &ArtifactKey<'_>) -> String {
        let identity: String = key
            .identity
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '+') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        format!(
            "{identity}_{}_{}.{}",
            key.timestamp.format("%Y%m%dT%H%M%S"),
            key.token,
            key.extension
        )
    }
}

/// Random token safe for file names: UUIDv4 bytes, URL-safe base64 without padding.
pub fn safe_token() -> String {
    URL_SAFE_NO_PAD.encode(uuid::Uuid::new_v4().as_bytes())
}

/// Decides where artifacts go and checks that they were produced.
#[derive(Clone)]
pub struct OutputResolver {
    dir: PathBuf,
    naming: Arc<dyn NamingStrategy>,
}

impl fmt::Debug for OutputResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputResolver")
            .field("dir", &self.dir)
            .finish_non_exhaustive()
    }
}

impl OutputResolver {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            naming: Arc::new(TimestampNaming),
        }
    }

    /// Resolver rooted at the system temporary directory.
    pub fn in_temp_dir() -> Self {
        Self::new(std::env::temp_dir())
    }

    pub fn with_naming(mut self, naming: impl NamingStrategy + 'static) -> Self {
        self.naming = Arc::new(naming);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Deterministic path for the given key parts.
    pub fn artifact_path(
        &self,
        identity: &str,
        extension: &str,
        timestamp: DateTime<Utc>,
        token: &str,
    ) -> PathBuf {
        let key = ArtifactKey {
            identity,
            timestamp,
            token,
            extension,
        };
        self.dir.join(self.naming.file_name(&key))
    }

    /// Fresh path for an invocation happening now.
    pub fn plan(&self, identity: &str, extension: &str) -> PathBuf {
        self.artifact_path(identity, extension, Utc::now(), &safe_token())
    }

    /// Confirm the artifact exists after a successful invocation.
    pub fn verify(&self, path: &Path) -> Result<PathBuf> {
        if path.is_file() {
            debug!(path = %path.display(), "output resolved");
            Ok(path.to_path_buf())
        } else {
            Err(Error::MissingOutput(path.to_path_buf()))
        }
    }
}

/// Remove a file if present. Returns whether something was removed.
pub(crate) fn remove_if_exists(path: &Path) -> Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "removed");
            Ok(true)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(source) => Err(Error::Cleanup {
            path: path.to_path_buf(),
            source,
        }),
    }
}

impl Default for OutputResolver {
    fn default() -> Self {
        Self::in_temp_dir()
    }
}
