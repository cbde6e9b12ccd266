use std::path::{Path, PathBuf};

use async_trait::async_trait;
use herald_common::internal;
use serde::Deserialize;
use tokio::fs;

use crate::{
    SerializationError, ValidationError, r#trait::BackingStore, types::LedgerSnapshot,
};

/// Leading byte of every ledger file
const FORMAT_VERSION: u8 = 1;

/// File-based backing store implementation
///
/// The whole ledger lives in a single file: one format-version byte followed
/// by the bincode encoded [`LedgerSnapshot`].
///
/// # Atomicity
/// Saves write to `.tmp_{filename}` next to the ledger and then rename it over
/// the real file, so a crash mid-write leaves the previous snapshot intact.
/// Saves must not run concurrently against the same path; `RetryLedger`
/// serializes them.
#[derive(Debug, Clone)]
pub struct FileBackingStore {
    path: PathBuf,
}

impl Default for FileBackingStore {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/var/lib/herald/resend.ledger"),
        }
    }
}

// Custom Deserialize implementation with path validation
impl<'de> Deserialize<'de> for FileBackingStore {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct FileBackingStoreHelper {
            path: PathBuf,
        }

        let helper = FileBackingStoreHelper::deserialize(deserializer)?;
        Self::validate_path(&helper.path).map_err(serde::de::Error::custom)?;

        Ok(Self { path: helper.path })
    }
}

impl FileBackingStore {
    /// Validate a ledger path
    ///
    /// # Security Checks
    /// - Rejects paths containing `..` (directory traversal)
    /// - Rejects paths to sensitive system directories
    /// - Ensures the path is absolute
    ///
    /// # Errors
    /// Returns an error if the path is invalid or potentially dangerous
    pub fn validate_path(path: &Path) -> Result<(), ValidationError> {
        if path
            .components()
            .any(|component| component == std::path::Component::ParentDir)
        {
            return Err(ValidationError::ParentDir(path.display().to_string()));
        }

        if !path.is_absolute() {
            return Err(ValidationError::NotAbsolute(path.display().to_string()));
        }

        let sensitive_prefixes = [
            "/etc",
            "/bin",
            "/sbin",
            "/usr/bin",
            "/usr/sbin",
            "/boot",
            "/sys",
            "/proc",
            "/dev",
        ];

        for prefix in &sensitive_prefixes {
            if path.starts_with(prefix) {
                return Err(ValidationError::SystemDirectory {
                    prefix: (*prefix).to_string(),
                    path: path.display().to_string(),
                });
            }
        }

        Ok(())
    }

    /// Create a new `FileBackingStore` builder
    #[must_use]
    pub fn builder() -> FileBackingStoreBuilder {
        FileBackingStoreBuilder::default()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let filename = self
            .path
            .file_name()
            .map_or_else(|| "ledger".into(), |name| name.to_string_lossy());
        self.path.with_file_name(format!(".tmp_{filename}"))
    }

    /// Prepare the ledger location
    ///
    /// Creates the parent directory if needed and removes a temporary file
    /// left behind by a save that was interrupted by a crash.
    ///
    /// # Errors
    /// - If the parent directory cannot be created
    /// - If the ledger path is a directory
    pub fn init(&self) -> crate::Result<()> {
        internal!("Initialising ledger at {}", self.path.display());

        if self.path.is_dir() {
            return Err(ValidationError::IsDirectory(self.path.display().to_string()).into());
        }

        if let Some(parent) = self.path.parent()
            && !parent.try_exists()?
        {
            internal!("{} does not exist, creating...", parent.display());
            std::fs::create_dir_all(parent)?;
        }

        let temp = self.temp_path();
        if temp.try_exists()? {
            std::fs::remove_file(&temp)?;
            internal!(
                level = INFO,
                "Removed interrupted ledger write {}",
                temp.display()
            );
        }

        Ok(())
    }

    fn encode(snapshot: &LedgerSnapshot) -> crate::Result<Vec<u8>> {
        let mut bytes = vec![FORMAT_VERSION];
        bytes.extend(bincode::serde::encode_to_vec(
            snapshot,
            bincode::config::standard(),
        )?);
        Ok(bytes)
    }

    fn decode(bytes: &[u8]) -> crate::Result<LedgerSnapshot> {
        let (&version, body) = bytes
            .split_first()
            .ok_or_else(|| SerializationError::Corrupted("empty ledger file".to_string()))?;

        if version != FORMAT_VERSION {
            return Err(SerializationError::UnsupportedVersion {
                found: version,
                expected: FORMAT_VERSION,
            }
            .into());
        }

        let (snapshot, read) = bincode::serde::decode_from_slice::<LedgerSnapshot, _>(
            body,
            bincode::config::standard(),
        )?;

        if read != body.len() {
            return Err(SerializationError::Corrupted(format!(
                "{} trailing bytes after ledger snapshot",
                body.len() - read
            ))
            .into());
        }

        Ok(snapshot)
    }
}

#[async_trait]
impl BackingStore for FileBackingStore {
    async fn load(&self) -> crate::Result<Option<LedgerSnapshot>> {
        match fs::read(&self.path).await {
            Ok(bytes) => Self::decode(&bytes).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, snapshot: &LedgerSnapshot) -> crate::Result<()> {
        let bytes = Self::encode(snapshot)?;
        let temp = self.temp_path();

        fs::write(&temp, &bytes).await?;
        fs::rename(&temp, &self.path).await?;

        Ok(())
    }
}

/// Builder for [`FileBackingStore`] that validates the path on `build`
#[derive(Debug, Default)]
pub struct FileBackingStoreBuilder {
    path: Option<PathBuf>,
}

impl FileBackingStoreBuilder {
    #[must_use]
    pub fn path(mut self, path: PathBuf) -> Self {
        self.path = Some(path);
        self
    }

    /// # Errors
    /// If the configured path fails validation
    pub fn build(self) -> crate::Result<FileBackingStore> {
        let path = self.path.unwrap_or_else(|| FileBackingStore::default().path);
        FileBackingStore::validate_path(&path)?;
        Ok(FileBackingStore { path })
    }
}
