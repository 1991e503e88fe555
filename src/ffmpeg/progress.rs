//! Parsing of the status lines ffmpeg prints on stderr, e.g.
//!
//! ```text
//! frame=  240 fps= 48 q=28.0 size=    1536KiB time=00:00:08.00 bitrate=1572.9kbits/s speed=1.6x
//! ```

use std::fmt::Display;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

const FRAME_MARKER: &str = "frame=";
const MAX_PERCENT: f64 = 99.9;
const MIN_PERCENT_FOR_ETA: f64 = 0.1;

static QUALITY_TOKEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"q=[\d.-]+\s*").unwrap());
static SIZE_TOKEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"size=\s*(\d+KiB)").unwrap());
static TIME_TOKEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"time=(\d{2}:\d{2}:\d{2}\.\d+)").unwrap());

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Eta {
    /// No duration or no timestamp, so there is nothing to extrapolate from.
    Unavailable,
    /// Too little progress so far for a meaningful estimate.
    Unknown,
    Remaining(Duration),
}

impl Display for Eta {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Eta::Unavailable | Eta::Unknown => write!(f, "--:--"),
            Eta::Remaining(d) => write!(f, "{}", format_seconds(d.as_secs_f64())),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ProgressSnapshot {
    /// The status line without the `q=` token and with the size made readable.
    pub line: String,
    pub size: Option<String>,
    /// Position in the source, in seconds.
    pub position: Option<f64>,
    /// 0 to 99.9; completion is only signalled by the process exiting.
    pub percent: Option<f64>,
    pub eta: Eta,
}

impl ProgressSnapshot {
    pub fn percent_or_zero(&self) -> f64 {
        self.percent.unwrap_or(0.0)
    }
}

impl Display for ProgressSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.percent {
            Some(percent) => write!(f, "{} | {:.1}% | ETA: {}", self.line, percent, self.eta),
            None => write!(f, "{}", self.line),
        }
    }
}

#[derive(Debug, PartialEq)]
pub enum ParsedLine {
    NotProgress,
    Progress(ProgressSnapshot),
}

/// `duration` is the source length in seconds (0 when unknown) and `elapsed`
/// the wall-clock time since the encoder started.
pub fn parse_progress_line(raw: &str, duration: f64, elapsed: Duration) -> ParsedLine {
    if !raw.contains(FRAME_MARKER) {
        return ParsedLine::NotProgress;
    }

    let raw = raw.trim();
    let mut line = QUALITY_TOKEN.replace_all(raw, "").into_owned();

    let size = SIZE_TOKEN.captures(&line).map(|c| (c[1].to_string(), convert_ffmpeg_size(&c[1])));
    if let Some((token, converted)) = &size {
        line = line.replace(token.as_str(), converted);
    }

    let position = TIME_TOKEN.captures(raw).and_then(|c| parse_time_to_seconds(&c[1]));

    let (percent, eta) = match position {
        Some(secs) if duration > 0.0 => {
            let percent = (secs / duration * 100.0).min(MAX_PERCENT);
            (Some(percent), estimate_remaining(percent, elapsed))
        },
        _ => (None, Eta::Unavailable),
    };

    ParsedLine::Progress(ProgressSnapshot {
        line,
        size: size.map(|(_, converted)| converted),
        position,
        percent,
        eta,
    })
}

/// Extrapolates wall-clock time per percent, not media time.
fn estimate_remaining(percent: f64, elapsed: Duration) -> Eta {
    if percent > MIN_PERCENT_FOR_ETA {
        let remaining = elapsed.as_secs_f64() * (100.0 - percent) / percent;
        Eta::Remaining(Duration::from_secs_f64(remaining.max(0.0)))
    } else {
        Eta::Unknown
    }
}

/// `2048KiB` becomes `2.00MB`. Anything that is not a KiB count is returned as is.
pub fn convert_ffmpeg_size(token: &str) -> String {
    let kib = match token.strip_suffix("KiB").and_then(|n| n.parse::<u64>().ok()) {
        Some(kib) => kib,
        None => return String::from(token),
    };
    let bytes = kib.saturating_mul(1024);
    if bytes >= 1024 * 1024 * 1024 {
        format!("{:.2}GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    } else if bytes >= 1024 * 1024 {
        format!("{:.2}MB", bytes as f64 / (1024.0 * 1024.0))
    } else if bytes >= 1024 {
        format!("{:.2}KB", bytes as f64 / 1024.0)
    } else {
        format!("{}B", bytes)
    }
}

/// `HH:MM:SS.frac` to seconds.
pub fn parse_time_to_seconds(timestamp: &str) -> Option<f64> {
    let parts: Vec<&str> = timestamp.split(':').collect();
    match parts.as_slice() {
        [h, m, s] => {
            let h: u64 = h.parse().ok()?;
            let m: u64 = m.parse().ok()?;
            let s: f64 = s.parse().ok()?;
            Some((h * 3600 + m * 60) as f64 + s)
        },
        _ => None,
    }
}

pub fn format_seconds(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    if total < 60 {
        format!("{}s", total)
    } else if total < 3600 {
        format!("{}m {}s", total / 60, total % 60)
    } else {
        format!("{}h {}m", total / 3600, (total % 3600) / 60)
    }
}
