use std::path::PathBuf;
use crate::settings::EncodingSettings;
use super::ParameterFactory;

/// NVENC in variable bitrate mode with a constant-quality target.
pub struct NvencParameterFactory {
    cq: u8,
}

impl NvencParameterFactory {
    pub fn new(settings: &EncodingSettings) -> Self {
        NvencParameterFactory { cq: settings.quality }
    }
}

impl ParameterFactory for NvencParameterFactory {
    fn parameters(&self) -> Vec<PathBuf> {
        vec![
            PathBuf::from("-c:v"), PathBuf::from("h264_nvenc"),
            PathBuf::from("-rc"), PathBuf::from("vbr"),
            PathBuf::from("-cq"), PathBuf::from(self.cq.to_string()),
            PathBuf::from("-preset"), PathBuf::from("p4"),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presets::SpeedPreset;

    #[test]
    fn test_preset_is_fixed() {
        let settings = EncodingSettings::new(PathBuf::from("in.mp4"), PathBuf::from("out.mp4"))
            .quality(31)
            .preset(SpeedPreset::Ultrafast);
        let params = NvencParameterFactory::new(&settings).parameters();
        assert_eq!(params[2..], [
            PathBuf::from("-rc"), PathBuf::from("vbr"),
            PathBuf::from("-cq"), PathBuf::from("31"),
            PathBuf::from("-preset"), PathBuf::from("p4"),
        ]);
    }
}
