use std::path::PathBuf;
use crate::settings::EncodingSettings;
use super::ParameterFactory;

pub struct QsvParameterFactory {
    global_quality: u8,
}

impl QsvParameterFactory {
    pub fn new(settings: &EncodingSettings) -> Self {
        QsvParameterFactory { global_quality: settings.quality }
    }
}

impl ParameterFactory for QsvParameterFactory {
    fn parameters(&self) -> Vec<PathBuf> {
        vec![
            PathBuf::from("-c:v"), PathBuf::from("h264_qsv"),
            PathBuf::from("-global_quality"), PathBuf::from(self.global_quality.to_string()),
            PathBuf::from("-preset"), PathBuf::from("medium"),
        ]
    }
}
