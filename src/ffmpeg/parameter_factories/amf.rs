use std::path::PathBuf;
use crate::settings::EncodingSettings;
use super::ParameterFactory;

/// AMF in constant-QP mode; I and P frames share the same QP.
pub struct AmfParameterFactory {
    qp: u8,
}

impl AmfParameterFactory {
    pub fn new(settings: &EncodingSettings) -> Self {
        AmfParameterFactory { qp: settings.quality }
    }
}

impl ParameterFactory for AmfParameterFactory {
    fn parameters(&self) -> Vec<PathBuf> {
        let qp = self.qp.to_string();
        vec![
            PathBuf::from("-c:v"), PathBuf::from("h264_amf"),
            PathBuf::from("-rc"), PathBuf::from("cqp"),
            PathBuf::from("-qp_i"), PathBuf::from(&qp),
            PathBuf::from("-qp_p"), PathBuf::from(&qp),
            PathBuf::from("-quality"), PathBuf::from("balanced"),
        ]
    }
}
