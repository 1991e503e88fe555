use std::fmt::Display;
use std::path::Path;
use std::process::{Command, Stdio};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::CompressError;

/// What the encoder needs to know about the first video stream.
#[derive(Clone, Debug, PartialEq)]
pub struct VideoMetadata {
    pub fps: f64,
    pub bitrate_kbps: f64,
    pub width: u32,
    pub height: u32,
    /// Seconds; 0 when unknown.
    pub duration: f64,
}

impl VideoMetadata {
    pub fn unknown() -> Self {
        VideoMetadata {
            fps: 0.0,
            bitrate_kbps: 0.0,
            width: 0,
            height: 0,
            duration: 0.0,
        }
    }

    pub fn resolution(&self) -> String {
        match self.width > 0 && self.height > 0 {
            true => format!("{}x{}", self.width, self.height),
            false => String::from("N/A"),
        }
    }
}

impl Display for VideoMetadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} @ {}fps | {}kbps", self.resolution(), self.fps, self.bitrate_kbps)
    }
}

#[derive(Serialize, Deserialize, Debug)]
struct FFProbeJsonOutput {
    #[serde(default)]
    pub streams: Vec<FFProbeJsonStream>,
}

#[derive(Serialize, Deserialize, Debug)]
struct FFProbeJsonStream {
    pub avg_frame_rate: Option<String>,
    pub bit_rate: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub duration: Option<String>,
}

/// Never fails: anything ffprobe cannot tell us comes back as zero.
pub fn probe_video(ffprobe: &Path, path: &Path) -> VideoMetadata {
    match try_probe_video(ffprobe, path) {
        Ok(metadata) => {
            debug!(?path, ?metadata, "probed video");
            metadata
        },
        Err(err) => {
            warn!(?path, %err, "probe failed, continuing without metadata");
            VideoMetadata::unknown()
        },
    }
}

fn try_probe_video(ffprobe: &Path, path: &Path) -> Result<VideoMetadata, CompressError> {
    let output = Command::new(ffprobe)
        .args(["-v", "error", "-select_streams", "v:0"])
        .args(["-show_entries", "stream=avg_frame_rate,bit_rate,width,height,duration"])
        .args(["-of", "json"])
        .arg(path)
        .stdin(Stdio::null())
        .output()?;
    if !output.status.success() {
        return Err(CompressError::for_file(path, "ffprobe did not exit successfully."));
    }
    let utf8 = String::from_utf8_lossy(&output.stdout);
    parse_probe_output(path, &utf8)
}

fn parse_probe_output(path: &Path, json: &str) -> Result<VideoMetadata, CompressError> {
    let deserialized = serde_json::from_str::<FFProbeJsonOutput>(json)
        .map_err(|e| CompressError::for_file(path, &e.to_string()))?;
    let stream = match deserialized.streams.first() {
        Some(stream) => stream,
        None => return Err(CompressError::for_file(path, "no video stream.")),
    };
    let fps = stream.avg_frame_rate.as_deref().and_then(get_frame_rate).unwrap_or(0.0);
    Ok(VideoMetadata {
        fps: (fps * 100.0).round() / 100.0,
        bitrate_kbps: parse_number(&stream.bit_rate) / 1000.0,
        width: stream.width.unwrap_or(0),
        height: stream.height.unwrap_or(0),
        duration: parse_number(&stream.duration),
    })
}

fn parse_number(value: &Option<String>) -> f64 {
    value.as_deref().and_then(|v| v.parse().ok()).unwrap_or(0.0)
}

/// `30000/1001` to frames per second.
fn get_frame_rate(rational: &str) -> Option<f64> {
    let splits: Vec<&str> = rational.split('/').collect();
    match splits.as_slice() {
        [num, denom] => {
            let num = num.parse::<f64>().ok()?;
            let denom = denom.parse::<f64>().ok()?;
            match denom == 0.0 {
                true => None,
                false => Some(num / denom),
            }
        },
        _ => None,
    }
}
