use std::path::PathBuf;
use crate::presets::SpeedPreset;
use crate::settings::EncodingSettings;
use super::ParameterFactory;

pub struct X264ParameterFactory {
    crf: u8,
    preset: SpeedPreset,
}

impl X264ParameterFactory {
    pub fn new(settings: &EncodingSettings) -> Self {
        X264ParameterFactory {
            crf: settings.quality,
            preset: settings.preset,
        }
    }
}

impl ParameterFactory for X264ParameterFactory {
    fn parameters(&self) -> Vec<PathBuf> {
        vec![
            PathBuf::from("-c:v"), PathBuf::from("libx264"),
            PathBuf::from("-crf"), PathBuf::from(self.crf.to_string()),
            PathBuf::from("-preset"), PathBuf::from(self.preset.name()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameters() {
        let settings = EncodingSettings::new(PathBuf::from("in.mp4"), PathBuf::from("out.mp4"))
            .quality(23)
            .preset(SpeedPreset::Slow);
        assert_eq!(X264ParameterFactory::new(&settings).parameters(), vec![
            PathBuf::from("-c:v"), PathBuf::from("libx264"),
            PathBuf::from("-crf"), PathBuf::from("23"),
            PathBuf::from("-preset"), PathBuf::from("slow"),
        ]);
    }
}
