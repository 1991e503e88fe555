use std::path::PathBuf;

use crate::encoders::Encoder;
use crate::settings::EncodingSettings;

pub mod amf;
pub mod nvenc;
pub mod qsv;
pub mod x264;

/// Produces the `-c:v` selection and rate-control flags for one encoder.
pub trait ParameterFactory {
    fn parameters(&self) -> Vec<PathBuf>;
}

pub fn create_parameter_factory(settings: &EncodingSettings) -> Box<dyn ParameterFactory> {
    match settings.encoder {
        Encoder::Software => Box::new(x264::X264ParameterFactory::new(settings)),
        Encoder::Nvidia => Box::new(nvenc::NvencParameterFactory::new(settings)),
        Encoder::Amd => Box::new(amf::AmfParameterFactory::new(settings)),
        Encoder::Intel => Box::new(qsv::QsvParameterFactory::new(settings)),
    }
}

/// `scale=...,fps=...`, resolution first. `None` when neither is set.
pub fn video_filter(settings: &EncodingSettings) -> Option<String> {
    let mut filters = vec![];
    if let Some(target) = &settings.resolution {
        filters.push(format!("scale={}", target.expr()));
    }
    if let Some(fps) = &settings.fps {
        filters.push(format!("fps={}", fps));
    }
    match filters.is_empty() {
        true => None,
        false => Some(filters.join(",")),
    }
}
