//! Glob pattern matching for the enumeration work list.
//!
//! Patterns are matched against the POSIX path relative to the uploads root,
//! so `**/*.tmp` excludes temporary files at any depth and `2024/**`
//! restricts a run to one year of uploads.

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::error::FileSystemError;

/// Include/exclude filter applied to root-relative paths.
#[derive(Debug, Clone, Default)]
pub struct GlobFilter {
    /// Patterns for files to include (empty = include all).
    include: Vec<String>,
    /// Patterns for files to exclude.
    exclude: Vec<String>,
    /// Compiled include patterns.
    include_set: Option<GlobSet>,
    /// Compiled exclude patterns.
    exclude_set: Option<GlobSet>,
}

impl GlobFilter {
    /// Create a filter with no patterns (matches everything).
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a filter with include patterns only.
    ///
    /// # Errors
    /// Returns error if any pattern is invalid.
    pub fn include(patterns: Vec<String>) -> Result<Self, FileSystemError> {
        Self::with_patterns(patterns, Vec::new())
    }

    /// Create a filter with exclude patterns only.
    ///
    /// # Errors
    /// Returns error if any pattern is invalid.
    pub fn exclude(patterns: Vec<String>) -> Result<Self, FileSystemError> {
        Self::with_patterns(Vec::new(), patterns)
    }

    /// Create a filter with both include and exclude patterns.
    ///
    /// # Arguments
    /// * `include` - Glob patterns for files to include
    /// * `exclude` - Glob patterns for files to exclude
    ///
    /// # Errors
    /// Returns error if any pattern is invalid.
    pub fn with_patterns(
        include: Vec<String>,
        exclude: Vec<String>,
    ) -> Result<Self, FileSystemError> {
        let include_set: Option<GlobSet> = compile_set(&include)?;
        let exclude_set: Option<GlobSet> = compile_set(&exclude)?;
        Ok(Self {
            include,
            exclude,
            include_set,
            exclude_set,
        })
    }

    /// Check if a relative path passes the filter.
    ///
    /// # Arguments
    /// * `path` - POSIX-style path relative to the root
    ///
    /// # Returns
    /// `true` if the path should be part of the work list.
    pub fn matches(&self, path: &str) -> bool {
        let included: bool = self
            .include_set
            .as_ref()
            .map_or(true, |set: &GlobSet| set.is_match(path));
        let excluded: bool = self
            .exclude_set
            .as_ref()
            .map_or(false, |set: &GlobSet| set.is_match(path));

        included && !excluded
    }

    /// Check if the filter has any patterns.
    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }

    /// Get the include patterns.
    pub fn include_patterns(&self) -> &[String] {
        &self.include
    }

    /// Get the exclude patterns.
    pub fn exclude_patterns(&self) -> &[String] {
        &self.exclude
    }
}

/// Compile a pattern list, returning None for an empty list.
fn compile_set(patterns: &[String]) -> Result<Option<GlobSet>, FileSystemError> {
    if patterns.is_empty() {
        return Ok(None);
    }

    let mut builder: GlobSetBuilder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob: Glob = Glob::new(pattern).map_err(|e| FileSystemError::InvalidGlobPattern {
            pattern: pattern.clone(),
            reason: e.to_string(),
        })?;
        builder.add(glob);
    }

    let set: GlobSet = builder
        .build()
        .map_err(|e| FileSystemError::InvalidGlobPattern {
            pattern: patterns.join(", "),
            reason: e.to_string(),
        })?;
    Ok(Some(set))
}
