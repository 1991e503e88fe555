use std::fmt::Display;
use std::path::PathBuf;
use std::time::Duration;

use crate::encoders::Encoder;
use crate::presets::SpeedPreset;

pub const MIN_REPORT_INTERVAL: f64 = 0.1;
pub const MAX_REPORT_INTERVAL: f64 = 3600.0;

/// A `scale` filter expression such as `1280:-1`.
///
/// The expression is kept verbatim so custom ffmpeg expressions pass through;
/// the width is only interpreted for size estimation.
#[derive(Clone, Debug, PartialEq)]
pub struct ScaleTarget {
    expr: String,
}

impl ScaleTarget {
    /// `None` means keep the original resolution.
    pub fn from_str(s: &str) -> Option<Self> {
        let s = s.trim();
        let expr = match s.to_lowercase().as_str() {
            "" | "original" => return None,
            x if x.contains("1080") => "1920:-1",
            x if x.contains("720") => "1280:-1",
            x if x.contains("480") => "854:-1",
            _ => s,
        };
        Some(ScaleTarget { expr: String::from(expr) })
    }

    pub fn expr(&self) -> &str {
        &self.expr
    }

    pub fn target_width(&self) -> Option<u32> {
        self.expr.split(':').next()?.trim().parse().ok()
    }
}

impl Display for ScaleTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.expr)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameRate(pub f64);

impl FrameRate {
    /// `None` means keep the original frame rate.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().parse::<f64>() {
            Ok(fps) if fps > 0.0 => Some(FrameRate(fps)),
            _ => None,
        }
    }
}

impl Display for FrameRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Everything a session needs; fixed for the lifetime of a run.
#[derive(Clone, Debug)]
pub struct EncodingSettings {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub quality: u8,
    pub resolution: Option<ScaleTarget>,
    pub fps: Option<FrameRate>,
    pub preset: SpeedPreset,
    pub encoder: Encoder,
    /// Source duration in seconds; 0 when unknown.
    pub duration: f64,
    pub source_width: u32,
    pub source_height: u32,
    pub source_fps: f64,
    pub report_interval: Duration,
}

impl EncodingSettings {
    pub fn new(source: PathBuf, destination: PathBuf) -> Self {
        EncodingSettings {
            source,
            destination,
            quality: 28,
            resolution: None,
            fps: None,
            preset: SpeedPreset::default(),
            encoder: Encoder::default(),
            duration: 0.0,
            source_width: 0,
            source_height: 0,
            source_fps: 0.0,
            report_interval: Duration::from_millis(500),
        }
    }

    pub fn quality(mut self, quality: u8) -> Self {
        self.quality = quality;
        self
    }

    pub fn resolution(mut self, resolution: Option<ScaleTarget>) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn fps(mut self, fps: Option<FrameRate>) -> Self {
        self.fps = fps;
        self
    }

    pub fn preset(mut self, preset: SpeedPreset) -> Self {
        self.preset = preset;
        self
    }

    pub fn encoder(mut self, encoder: Encoder) -> Self {
        self.encoder = encoder;
        self
    }

    pub fn duration(mut self, seconds: f64) -> Self {
        self.duration = seconds;
        self
    }

    pub fn source_video(mut self, width: u32, height: u32, fps: f64) -> Self {
        self.source_width = width;
        self.source_height = height;
        self.source_fps = fps;
        self
    }

    /// Intervals shorter than `MIN_REPORT_INTERVAL` are raised to it; anything
    /// not representable as a `Duration` becomes `MAX_REPORT_INTERVAL`.
    pub fn report_interval(mut self, seconds: f64) -> Self {
        let seconds = seconds.max(MIN_REPORT_INTERVAL).min(MAX_REPORT_INTERVAL);
        self.report_interval = Duration::try_from_secs_f64(seconds)
            .unwrap_or(Duration::from_secs(MAX_REPORT_INTERVAL as u64));
        self
    }

    pub fn resolution_display(&self) -> String {
        match &self.resolution {
            Some(target) => target.to_string(),
            None => format!("Original ({}x{})", self.source_width, self.source_height),
        }
    }

    pub fn fps_display(&self) -> String {
        match &self.fps {
            Some(fps) => fps.to_string(),
            None => format!("Original ({} fps)", self.source_fps),
        }
    }
}
