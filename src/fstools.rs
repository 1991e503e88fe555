use std::fs;
use std::path::{Path, PathBuf};

use crate::error::CompressError;

pub const TEMP_FILE_NAME: &str = "temp_ffmpeg_output.mp4";

pub enum DirEntryCategory {
    DoesNotExist,
    RegularFile,
    SymbolicLink,
    Directory,
    Unknown,
}

pub fn classify_file(path: &Path) -> DirEntryCategory {
    match fs::symlink_metadata(path) {
        Ok(metadata) => {
            if metadata.is_symlink() {
                match fs::metadata(path) {
                    Ok(target) if target.is_file() => DirEntryCategory::RegularFile,
                    Ok(_) => DirEntryCategory::SymbolicLink,
                    Err(_) => DirEntryCategory::DoesNotExist,
                }
            } else if metadata.is_file() {
                DirEntryCategory::RegularFile
            } else if metadata.is_dir() {
                DirEntryCategory::Directory
            } else {
                DirEntryCategory::Unknown
            }
        },
        Err(_) => DirEntryCategory::DoesNotExist,
    }
}

pub fn file_size_mb(path: &Path) -> Option<f64> {
    match fs::metadata(path) {
        Ok(metadata) => Some(metadata.len() as f64 / (1024.0 * 1024.0)),
        Err(_) => None,
    }
}

/// `dir/movie.mkv` becomes `dir/movie_compressed.mp4`.
pub fn generate_output_filename(path: &Path) -> PathBuf {
    match path.file_stem() {
        Some(file_stem) => {
            let mut name = file_stem.to_os_string();
            name.push("_compressed.mp4");
            path.with_file_name(name)
        },
        None => PathBuf::from(path),
    }
}

/// The working file lives beside the destination so the final rename stays
/// on one filesystem.
pub fn temp_output_path(destination: &Path) -> PathBuf {
    match destination.parent() {
        Some(dir) => dir.join(TEMP_FILE_NAME),
        None => PathBuf::from(TEMP_FILE_NAME),
    }
}

/// Returns the temp path for `destination`, refusing layouts where writing or
/// cleaning up the working file would clobber the source or the result.
pub fn checked_temp_path(source: &Path, destination: &Path) -> Result<PathBuf, CompressError> {
    let temp = temp_output_path(destination);
    let resolved = resolve(&temp);
    if resolved == resolve(destination) {
        return Err(CompressError::invalid(
            "output",
            &format!("{} is reserved for the working file.", TEMP_FILE_NAME),
        ));
    }
    if resolved == resolve(source) {
        return Err(CompressError::for_file(
            source,
            &format!("the working file {} would overwrite the input.", TEMP_FILE_NAME),
        ));
    }
    Ok(temp)
}

/// Absolute form of `path` for comparison. Only the parent has to exist.
fn resolve(path: &Path) -> PathBuf {
    if let Ok(resolved) = fs::canonicalize(path) {
        return resolved;
    }
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    match (fs::canonicalize(dir), path.file_name()) {
        (Ok(dir), Some(name)) => dir.join(name),
        _ => path.to_path_buf(),
    }
}
