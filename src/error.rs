use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Problems that stop the program before any encoding session starts.
#[derive(Error, Debug)]
pub enum CompressError {
    #[error("{tool} was not found on PATH or next to the executable.")]
    ToolUnavailable { tool: String },

    #[error("Error parsing {path:?}: {msg}")]
    InputParse { path: PathBuf, msg: String },

    #[error("Invalid {name}: {msg}")]
    InvalidArgument { name: &'static str, msg: String },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CompressError {
    pub fn for_file(path: &Path, msg: &str) -> Self {
        CompressError::InputParse {
            path: PathBuf::from(path),
            msg: String::from(msg),
        }
    }

    pub fn invalid(name: &'static str, msg: &str) -> Self {
        CompressError::InvalidArgument {
            name,
            msg: String::from(msg),
        }
    }
}

/// Why an encoding session ended in `SessionOutcome::Failed`.
#[derive(Error, Clone, Debug, PartialEq)]
pub enum SessionError {
    #[error("There was an error executing {program:?}: {msg}")]
    Spawn { program: PathBuf, msg: String },

    #[error("ffmpeg exited with {0}")]
    Exit(i32),

    #[error("ffmpeg did not exit successfully.")]
    Terminated,

    #[error("There was an error waiting for the ffmpeg process: {0}")]
    Wait(String),

    #[error("Unable to move {from:?} to {to:?}: {msg}")]
    Finalize { from: PathBuf, to: PathBuf, msg: String },
}
