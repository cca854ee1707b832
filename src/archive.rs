//! Snapshot archiving
//!
//! Raw documents are written to a scratch directory under `<data>/tmp`,
//! zipped, and the archive is moved to `<data>/storage/<logical path>`.
//! Scratch space is always removed afterwards.

use crate::Result;
use chrono::Utc;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

const TMP_DIR: &str = "tmp";
const STORAGE_DIR: &str = "storage";

/// Filesystem primitives for snapshot archives
#[derive(Debug, Clone)]
pub struct Archiver {
    root: PathBuf,
}

impl Archiver {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: data_dir.into(),
        }
    }

    pub fn temp_root(&self) -> PathBuf {
        self.root.join(TMP_DIR)
    }

    pub fn storage_root(&self) -> PathBuf {
        self.root.join(STORAGE_DIR)
    }

    /// Allocates a fresh scratch directory named after the current time
    ///
    /// Directory creation itself is the collision check: a name that already
    /// exists gets a numeric suffix.
    pub fn create_temp_dir(&self) -> Result<PathBuf> {
        let parent = self.temp_root();
        fs::create_dir_all(&parent)?;

        let millis = Utc::now().timestamp_millis();
        let mut suffix = 0u32;
        loop {
            let name = if suffix == 0 {
                millis.to_string()
            } else {
                format!("{}-{}", millis, suffix)
            };
            let dir = parent.join(name);
            match fs::create_dir(&dir) {
                Ok(()) => return Ok(dir),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => suffix += 1,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Compresses the contents of `dir` into `<dir>.zip`
    ///
    /// Entry names are relative to `dir`.
    pub fn zip_dir(&self, dir: &Path) -> Result<PathBuf> {
        let mut target = dir.as_os_str().to_owned();
        target.push(".zip");
        let target = PathBuf::from(target);

        let mut writer = ZipWriter::new(File::create(&target)?);
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
        add_dir_entries(&mut writer, dir, dir, options)?;
        writer.finish()?;

        Ok(target)
    }

    /// Moves an archive into `<storage>/<logical_path>/`, keeping its file name
    ///
    /// An archive already stored under that name is never replaced; the new
    /// one gets a numeric suffix instead.
    pub fn move_to_storage(&self, archive: &Path, logical_path: &str) -> Result<PathBuf> {
        let dir = self.storage_root().join(logical_path);
        fs::create_dir_all(&dir)?;

        let file_name = archive.file_name().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} has no file name", archive.display()),
            )
        })?;
        let target = free_path(&dir, Path::new(file_name));

        if fs::rename(archive, &target).is_err() {
            // Rename fails across filesystems
            fs::copy(archive, &target)?;
            fs::remove_file(archive)?;
        }

        Ok(target)
    }

    /// Removes `dir` and everything in it; a missing directory is not an error
    pub fn empty_and_delete(&self, dir: &Path) -> Result<()> {
        match fs::remove_dir_all(dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Stores `files` as one zip archive under `logical_path`
    ///
    /// Scratch files are removed whether or not archiving succeeded.
    pub fn archive_snapshot(&self, files: &[(&str, &[u8])], logical_path: &str) -> Result<PathBuf> {
        let dir = self.create_temp_dir()?;

        let result = self.write_and_store(&dir, files, logical_path);

        let cleanup = self.empty_and_delete(&dir);
        if result.is_err() {
            let mut stray = dir.into_os_string();
            stray.push(".zip");
            let _ = fs::remove_file(PathBuf::from(stray));
        }

        let stored = result?;
        cleanup?;
        tracing::debug!("Snapshot stored at {}", stored.display());
        Ok(stored)
    }

    fn write_and_store(
        &self,
        dir: &Path,
        files: &[(&str, &[u8])],
        logical_path: &str,
    ) -> Result<PathBuf> {
        for (name, content) in files {
            let mut file = File::create(dir.join(name))?;
            file.write_all(content)?;
        }
        let archive = self.zip_dir(dir)?;
        self.move_to_storage(&archive, logical_path)
    }
}

fn add_dir_entries(
    writer: &mut ZipWriter<File>,
    base: &Path,
    dir: &Path,
    options: FileOptions,
) -> Result<()> {
    let mut entries = fs::read_dir(dir)?.collect::<io::Result<Vec<_>>>()?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let path = entry.path();
        let name = path
            .strip_prefix(base)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?
            .to_string_lossy()
            .replace('\\', "/");

        if entry.file_type()?.is_dir() {
            writer.add_directory(name, options)?;
            add_dir_entries(writer, base, &path, options)?;
        } else {
            writer.start_file(name, options)?;
            io::copy(&mut File::open(&path)?, writer)?;
        }
    }
    Ok(())
}

/// `dir/name`, or `dir/<stem>-N.<ext>` for the first N not taken yet
fn free_path(dir: &Path, name: &Path) -> PathBuf {
    let candidate = dir.join(name);
    if !candidate.exists() {
        return candidate;
    }

    let stem = name
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = name.extension().map(|e| e.to_string_lossy().into_owned());
    (1u32..)
        .map(|n| match &extension {
            Some(ext) => dir.join(format!("{}-{}.{}", stem, n, ext)),
            None => dir.join(format!("{}-{}", stem, n)),
        })
        .find(|path| !path.exists())
        .unwrap_or(candidate)
}
