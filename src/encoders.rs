use std::fmt::Display;

/// Which H.264 implementation ffmpeg should drive.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Encoder {
    Software,
    Nvidia,
    Amd,
    Intel,
}

impl Encoder {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "cpu" | "libx264" => Some(Encoder::Software),
            "nvidia" | "h264_nvenc" => Some(Encoder::Nvidia),
            "amd" | "h264_amf" => Some(Encoder::Amd),
            "intel" | "h264_qsv" => Some(Encoder::Intel),
            _ => None,
        }
    }

    /// Value passed to `-c:v`.
    pub fn codec_name(&self) -> &'static str {
        match self {
            Encoder::Software => "libx264",
            Encoder::Nvidia => "h264_nvenc",
            Encoder::Amd => "h264_amf",
            Encoder::Intel => "h264_qsv",
        }
    }

    pub fn is_hardware(&self) -> bool {
        *self != Encoder::Software
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Encoder::Software
    }
}

impl Display for Encoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.codec_name())
    }
}
