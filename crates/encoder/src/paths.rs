use std::fs::File;
use std::path::{Path, PathBuf};
use crate::error::{EncodeError, EncodeResult};

/// Extension of encoded slide files
pub const SLIDE_EXTENSION: &str = "iris";

/// Where the output directory came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedOutputDir {
    /// The caller's directory exists and is used as-is
    Requested(PathBuf),
    /// The caller's directory was missing or invalid; the source's parent is used
    Substituted {
        requested: Option<PathBuf>,
        resolved: PathBuf,
    },
}

impl ResolvedOutputDir {
    pub fn path(&self) -> &Path {
        match self {
            ResolvedOutputDir::Requested(dir) => dir,
            ResolvedOutputDir::Substituted { resolved, .. } => resolved,
        }
    }
}

/// Check the source is an existing file we can open for reading
pub fn check_source(source: &Path) -> EncodeResult<()> {
    if !source.is_file() {
        return Err(EncodeError::InvalidSource {
            path: source.to_path_buf(),
            reason: "not an existing file".to_string(),
        });
    }
    File::open(source).map_err(|e| EncodeError::InvalidSource {
        path: source.to_path_buf(),
        reason: e.to_string(),
    })?;
    Ok(())
}

/// Use `requested` if it is a directory, otherwise fall back to the source's parent
pub fn resolve_output_dir(source: &Path, requested: Option<&Path>) -> ResolvedOutputDir {
    if let Some(dir) = requested.filter(|d| d.is_dir()) {
        return ResolvedOutputDir::Requested(dir.to_path_buf());
    }
    let parent = match source.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    ResolvedOutputDir::Substituted {
        requested: requested.map(Path::to_path_buf),
        resolved: parent,
    }
}

/// `<output_dir>/<source stem>.iris`
pub fn slide_output_path(source: &Path, output_dir: &Path) -> PathBuf {
    // push rather than set_extension: a stem like "case.v2" keeps its dot
    let mut name = source.file_stem().unwrap_or(source.as_os_str()).to_os_string();
    name.push(".");
    name.push(SLIDE_EXTENSION);
    output_dir.join(name)
}
