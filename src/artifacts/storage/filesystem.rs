//! Filesystem-backed artifact storage.
//!
//! Writes go to a temporary file in the same directory, are fsynced, and are
//! then renamed over the target; the directory is fsynced afterwards so the
//! rename itself survives a crash.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::trace;

use super::ArtifactStorage;
use super::validation::validate_name;

/// Artifacts stored as plain files in one directory.
#[derive(Debug, Clone)]
pub struct FilesystemStorage {
    base_dir: PathBuf,
}

impl FilesystemStorage {
    /// Opens the storage directory, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open<P: AsRef<Path>>(base_dir: P) -> io::Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        fs::create_dir_all(&base_dir)?;
        Ok(Self { base_dir })
    }

    /// Directory holding the artifacts.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn path_for(&self, name: &str) -> io::Result<PathBuf> {
        validate_name(name)?;
        Ok(self.base_dir.join(name))
    }

    fn sync_dir(&self) -> io::Result<()> {
        // Directory handles cannot be fsynced on Windows.
        #[cfg(unix)]
        fs::File::open(&self.base_dir)?.sync_all()?;
        Ok(())
    }
}

impl ArtifactStorage for FilesystemStorage {
    fn write(&self, name: &str, data: &[u8]) -> io::Result<()> {
        let path = self.path_for(name)?;

        // Temp names start with '.', which validate_name never accepts,
        // so they cannot collide with or be listed as artifacts.
        let mut tmp = tempfile::Builder::new()
            .prefix(".tmp-")
            .tempfile_in(&self.base_dir)?;
        tmp.write_all(data)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| e.error)?;
        self.sync_dir()?;

        trace!(name, bytes = data.len(), "Wrote artifact");
        Ok(())
    }

    fn read(&self, name: &str) -> io::Result<Option<Vec<u8>>> {
        let path = self.path_for(name)?;
        match fs::read(&path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn delete(&self, name: &str) -> io::Result<bool> {
        let path = self.path_for(name)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                self.sync_dir()?;
                trace!(name, "Deleted artifact");
                Ok(true)
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn exists(&self, name: &str) -> io::Result<bool> {
        let path = self.path_for(name)?;
        path.try_exists()
    }

    fn list(&self) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.base_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str()
                && validate_name(name).is_ok()
            {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}
