use std::fmt::Display;

/// x264 speed presets, fastest first.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SpeedPreset {
    Ultrafast,
    Veryfast,
    Fast,
    Medium,
    Slow,
    Veryslow,
}

impl SpeedPreset {
    pub const ALL: [SpeedPreset; 6] = [
        SpeedPreset::Ultrafast,
        SpeedPreset::Veryfast,
        SpeedPreset::Fast,
        SpeedPreset::Medium,
        SpeedPreset::Slow,
        SpeedPreset::Veryslow,
    ];

    pub fn from_str(s: &str) -> Option<Self> {
        let s = s.trim().to_lowercase();
        SpeedPreset::ALL.into_iter().find(|p| p.name() == s)
    }

    pub fn name(&self) -> &'static str {
        match self {
            SpeedPreset::Ultrafast => "ultrafast",
            SpeedPreset::Veryfast => "veryfast",
            SpeedPreset::Fast => "fast",
            SpeedPreset::Medium => "medium",
            SpeedPreset::Slow => "slow",
            SpeedPreset::Veryslow => "veryslow",
        }
    }

    /// Multiplier applied to the size estimate. Faster presets compress worse.
    pub fn size_factor(&self) -> f64 {
        match self {
            SpeedPreset::Ultrafast => 1.40,
            SpeedPreset::Veryfast => 1.20,
            SpeedPreset::Fast => 1.10,
            SpeedPreset::Medium => 1.0,
            SpeedPreset::Slow => 0.95,
            SpeedPreset::Veryslow => 0.90,
        }
    }
}

impl Default for SpeedPreset {
    fn default() -> Self {
        SpeedPreset::Medium
    }
}

impl Display for SpeedPreset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
