/// Run configuration, built once at startup and passed by reference into
/// every phase. No component reads ambient state.
use std::path::PathBuf;

use constants::CameraProfile;
use serde::Serialize;
use thiserror::Error;

use crate::render::{ChannelConfig, Denoiser, RenderSettings};
use crate::tote::{Tote, ToteError};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown camera profile '{0}' (expected Photoneo-M, Photoneo-L or XYZ-SL)")]
    UnknownCameraProfile(String),
    #[error("{name} must be positive, got {value}")]
    NonPositive { name: &'static str, value: f64 },
    #[error(transparent)]
    Tote(#[from] ToteError),
    #[error("pick batch size must be positive")]
    ZeroPickBatch,
    #[error("model path '{0}' does not exist")]
    MissingModel(PathBuf),
}

#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub output_dir: PathBuf,
    pub camera: CameraProfile,
    pub camera_height: f64,
    pub tote: Tote,
    pub model_path: PathBuf,
    /// Rescale the model so its largest dimension matches this; <= 0 keeps
    /// the original size.
    pub model_max_dimension: f64,
    /// Decimation budget for imported meshes.
    pub max_faces: usize,
    pub num_regen: u32,
    pub num_begin: u32,
    pub num_end: u32,
    pub num_pick: u32,
    pub substeps_per_frame: u32,
    pub render: RenderSettings,
    pub channels: ChannelConfig,
    /// Reproducibility seed; a random one is drawn and recorded if unset.
    pub seed: Option<u64>,
}

impl GenerationConfig {
    /// Fails fast, before any scene state is created.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_pick == 0 {
            return Err(ConfigError::ZeroPickBatch);
        }
        for (name, value) in [
            ("camera height", self.camera_height),
            ("regeneration count", self.num_regen as f64),
            ("substeps per frame", self.substeps_per_frame as f64),
            ("samples", self.render.samples as f64),
            ("mask downsample", self.render.downsample as f64),
        ] {
            if value <= 0.0 {
                return Err(ConfigError::NonPositive { name, value });
            }
        }
        if !self.model_path.exists() {
            return Err(ConfigError::MissingModel(self.model_path.clone()));
        }
        Ok(())
    }
}

/// Summary of the configuration embedded into the run manifest.
#[derive(Serialize)]
pub struct ConfigSummary<'a> {
    pub camera: &'a str,
    pub num_begin: u32,
    pub num_end: u32,
    pub num_pick: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output/deep_tote"),
            camera: CameraProfile::XyzSl,
            camera_height: 2.0,
            tote: Tote {
                length: 0.7,
                width: 0.7,
                height: 0.5,
                thickness: 0.01,
            },
            model_path: PathBuf::from("resources/models/brake_disk.stl"),
            model_max_dimension: 0.0,
            max_faces: 10_000,
            num_regen: 2,
            num_begin: 30,
            num_end: 0,
            num_pick: 5,
            substeps_per_frame: constants::DEFAULT_SUBSTEPS_PER_FRAME,
            render: RenderSettings {
                denoiser: Denoiser::Optix,
                ..RenderSettings::default()
            },
            channels: ChannelConfig::default(),
            seed: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config(dir: &std::path::Path) -> GenerationConfig {
        let model = dir.join("model.stl");
        std::fs::write(&model, b"").unwrap();
        GenerationConfig {
            model_path: model,
            ..GenerationConfig::default()
        }
    }

    #[test]
    fn default_config_validates_once_the_model_exists() {
        let dir = tempfile::tempdir().unwrap();
        assert!(valid_config(dir.path()).validate().is_ok());
    }

    #[test]
    fn zero_pick_batch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = GenerationConfig {
            num_pick: 0,
            ..valid_config(dir.path())
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::ZeroPickBatch)));
    }

    #[test]
    fn missing_model_is_rejected() {
        let cfg = GenerationConfig {
            model_path: PathBuf::from("/nonexistent/part.stl"),
            ..GenerationConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::MissingModel(_))));
    }
}
