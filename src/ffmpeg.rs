use std::env;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::debug;

use crate::error::CompressError;

pub mod parameter_factories;
pub mod probe;
pub mod progress;
pub mod session;
pub mod throttle;

/// Paths of the two external tools everything else shells out to.
#[derive(Clone, Debug)]
pub struct FFmpeg {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl FFmpeg {
    pub fn locate() -> Result<Self, CompressError> {
        Ok(FFmpeg {
            ffmpeg: locate_binary("ffmpeg")?,
            ffprobe: locate_binary("ffprobe")?,
        })
    }
}

/// A copy next to our own executable wins over one on `PATH`.
fn locate_binary(name: &str) -> Result<PathBuf, CompressError> {
    if let Some(local) = local_binary(name) {
        debug!(?local, "using bundled {}", name);
        return Ok(local);
    }
    if is_installed(Path::new(name)) {
        debug!("using {} from PATH", name);
        return Ok(PathBuf::from(name));
    }
    Err(CompressError::ToolUnavailable { tool: String::from(name) })
}

fn local_binary(name: &str) -> Option<PathBuf> {
    let dir = env::current_exe().ok()?.parent()?.to_path_buf();
    let candidate = dir.join(format!("{}{}", name, env::consts::EXE_SUFFIX));
    match candidate.is_file() {
        true => Some(candidate),
        false => None,
    }
}

pub fn is_installed(program: &Path) -> bool {
    let cmd = Command::new(program)
        .arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    match cmd {
        Ok(status) => status.success(),
        Err(_) => false,
    }
}
