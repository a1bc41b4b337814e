//! File enumerator producing a migration run's work list.
//!
//! The enumerator lists every regular file under a root in a deterministic
//! order. Directories are never listed. Symlinks are neither followed nor
//! listed, which rules out cycles and keeps content outside the root from
//! being uploaded.

use std::path::{Path, PathBuf};

use s3_offload_common::{lexical_normalize, relative_posix_path, to_absolute, ProgressCallback};
use walkdir::WalkDir;

use crate::error::FileSystemError;
use crate::glob::GlobFilter;

/// Files discovered between two progress reports.
const PROGRESS_INTERVAL: u64 = 256;

/// Options for enumerating a directory tree.
#[derive(Debug, Clone, Default)]
pub struct EnumerateOptions {
    /// Root directory to walk.
    pub root: PathBuf,
    /// Glob filter applied to root-relative paths.
    pub filter: GlobFilter,
}

impl EnumerateOptions {
    /// Create options for a root with no filtering.
    ///
    /// # Arguments
    /// * `root` - Directory to enumerate
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            filter: GlobFilter::default(),
        }
    }

    /// Set the glob filter.
    pub fn with_filter(mut self, filter: GlobFilter) -> Self {
        self.filter = filter;
        self
    }
}

/// Progress update emitted while walking.
#[derive(Debug, Clone)]
pub struct ScanProgress {
    /// Regular files accepted into the work list so far.
    pub files_found: u64,
    /// Most recently visited path.
    pub current_path: Option<String>,
    /// Whether the walk has finished.
    pub complete: bool,
}

/// Lists regular files under a root directory.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileEnumerator;

impl FileEnumerator {
    /// Create a new enumerator.
    pub fn new() -> Self {
        Self
    }

    /// Enumerate all regular files under `options.root`.
    ///
    /// Entries are visited depth-first with siblings sorted by file name, so
    /// the same tree always yields the same list.
    ///
    /// # Arguments
    /// * `options` - Root and filter configuration
    /// * `progress` - Optional callback; returning `false` cancels the walk
    ///
    /// # Returns
    /// Absolute, lexically normalized file paths.
    ///
    /// # Errors
    /// Returns error if the root is missing, is not a directory, or any entry
    /// below it cannot be read.
    pub fn enumerate(
        &self,
        options: &EnumerateOptions,
        progress: Option<&dyn ProgressCallback<ScanProgress>>,
    ) -> Result<Vec<PathBuf>, FileSystemError> {
        let root: PathBuf = lexical_normalize(&to_absolute(&options.root)?);
        let metadata: std::fs::Metadata =
            std::fs::metadata(&root).map_err(|e| FileSystemError::IoError {
                path: root.display().to_string(),
                source: e,
            })?;
        if !metadata.is_dir() {
            return Err(FileSystemError::InvalidRoot {
                path: root.display().to_string(),
            });
        }

        let mut files: Vec<PathBuf> = Vec::new();

        for entry in WalkDir::new(&root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
        {
            let entry: walkdir::DirEntry = entry.map_err(|e| FileSystemError::IoError {
                path: e
                    .path()
                    .map(|p: &Path| p.display().to_string())
                    .unwrap_or_default(),
                source: e.into(),
            })?;

            if !entry.file_type().is_file() {
                if entry.path_is_symlink() {
                    log::debug!("Skipping symlink {}", entry.path().display());
                }
                continue;
            }

            if !options.filter.is_empty() {
                let relative: String = relative_posix_path(entry.path(), &root)?;
                if !options.filter.matches(&relative) {
                    continue;
                }
            }

            files.push(entry.into_path());

            if let Some(cb) = progress {
                if files.len() as u64 % PROGRESS_INTERVAL == 0 {
                    let update: ScanProgress = ScanProgress {
                        files_found: files.len() as u64,
                        current_path: files.last().map(|p: &PathBuf| p.display().to_string()),
                        complete: false,
                    };
                    if !cb.on_progress(&update) {
                        return Err(FileSystemError::Cancelled);
                    }
                }
            }
        }

        if let Some(cb) = progress {
            cb.on_progress(&ScanProgress {
                files_found: files.len() as u64,
                current_path: None,
                complete: true,
            });
        }

        log::info!("Enumerated {} files under {}", files.len(), root.display());
        Ok(files)
    }
}
