use crate::presets::SpeedPreset;
use crate::settings::ScaleTarget;

const REFERENCE_QUALITY: f64 = 23.0;
const QUALITY_BASE: f64 = 1.15;
const MIN_FACTOR: f64 = 0.05;
const MAX_QUALITY_FACTOR: f64 = 1.3;

/// Rough output size in MB, before anything is encoded.
pub fn estimate_final_size(
    original_size_mb: f64,
    quality: u8,
    original_width: u32,
    target: Option<&ScaleTarget>,
    preset: SpeedPreset,
) -> f64 {
    let total = quality_factor(quality) * resolution_factor(original_width, target) * preset.size_factor();
    original_size_mb * total.max(MIN_FACTOR)
}

fn quality_factor(quality: u8) -> f64 {
    let factor = 1.0 / QUALITY_BASE.powf(quality as f64 - REFERENCE_QUALITY);
    factor.clamp(MIN_FACTOR, MAX_QUALITY_FACTOR)
}

/// Area scaling: `(target / original)^2`, or 1 when either width is unknown.
fn resolution_factor(original_width: u32, target: Option<&ScaleTarget>) -> f64 {
    if original_width == 0 {
        return 1.0;
    }
    match target.and_then(ScaleTarget::target_width) {
        Some(width) => (width as f64 / original_width as f64).powi(2),
        None => 1.0,
    }
}
