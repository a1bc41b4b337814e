//! Path normalization and object key construction.

use std::path::{Component, Path, PathBuf};

use crate::error::PathError;

/// Convert a path to absolute without resolving symlinks.
///
/// # Arguments
/// * `path` - Path to convert (relative or absolute)
///
/// # Returns
/// Absolute path, joining with current directory if relative.
///
/// # Errors
/// Returns error if current directory cannot be determined.
pub fn to_absolute(path: &Path) -> Result<PathBuf, PathError> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        std::env::current_dir()
            .map(|cwd: PathBuf| cwd.join(path))
            .map_err(|e: std::io::Error| PathError::from_io(path.display().to_string(), e))
    }
}

/// Lexical path normalization without filesystem access.
///
/// Removes `.` components and resolves `..` components lexically.
/// Does not access the filesystem or resolve symlinks.
///
/// # Arguments
/// * `path` - Path to normalize
///
/// # Returns
/// Normalized path with `.` and `..` resolved lexically.
pub fn lexical_normalize(path: &Path) -> PathBuf {
    let mut components: Vec<Component> = Vec::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !components.is_empty()
                    && !matches!(
                        components.last(),
                        Some(Component::ParentDir) | Some(Component::RootDir)
                    )
                {
                    components.pop();
                } else {
                    components.push(component);
                }
            }
            _ => components.push(component),
        }
    }

    components.iter().collect()
}

/// Express a file path relative to a root, in POSIX form.
///
/// Both paths are made absolute and lexically normalized first, so
/// `uploads/./2024/../2024/a.jpg` and `uploads/2024/a.jpg` agree.
///
/// # Arguments
/// * `path` - File path to convert
/// * `root` - Root directory the path must live under
///
/// # Returns
/// Forward-slash separated path relative to `root`.
///
/// # Errors
/// Returns error if path is outside the root directory.
pub fn relative_posix_path(path: &Path, root: &Path) -> Result<String, PathError> {
    let normalized: PathBuf = lexical_normalize(&to_absolute(path)?);
    let normalized_root: PathBuf = lexical_normalize(&to_absolute(root)?);

    let relative: &Path = normalized
        .strip_prefix(&normalized_root)
        .map_err(|_| PathError::OutsideRoot {
            path: normalized.display().to_string(),
            root: normalized_root.display().to_string(),
        })?;

    if relative.as_os_str().is_empty() {
        return Err(PathError::NoObjectKey {
            path: normalized.display().to_string(),
        });
    }

    Ok(to_posix_path(relative))
}

/// Convert a path to POSIX-style string (forward slashes).
///
/// # Arguments
/// * `path` - Path to convert
///
/// # Returns
/// String with forward slashes as separators.
pub fn to_posix_path(path: &Path) -> String {
    path.components()
        .map(|c: Component| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Join a key prefix and a relative POSIX path into an object key.
///
/// Surrounding slashes on the prefix are ignored; an empty prefix yields
/// the relative path unchanged.
///
/// # Arguments
/// * `prefix` - Key prefix, e.g. "uploads"
/// * `relative` - Relative POSIX path, e.g. "2024/05/photo.jpg"
pub fn join_object_key(prefix: &str, relative: &str) -> String {
    let prefix: &str = prefix.trim_matches('/');
    let relative: &str = relative.trim_start_matches('/');
    if prefix.is_empty() {
        relative.to_string()
    } else {
        format!("{}/{}", prefix, relative)
    }
}
