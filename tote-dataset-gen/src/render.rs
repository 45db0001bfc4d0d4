/// Render collaborator contract.
use std::fmt;
use std::path::Path;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("render pass failed: {0}")]
    Pass(String),
}

/// Denoiser applied to the color pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Denoiser {
    #[default]
    None,
    Optix,
    OpenImage,
}

impl fmt::Display for Denoiser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Denoiser::None => write!(f, "NONE"),
            Denoiser::Optix => write!(f, "OPTIX"),
            Denoiser::OpenImage => write!(f, "OPENIMAGEDENOISE"),
        }
    }
}

/// Parameters forwarded to every render pass.
#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub samples: u32,
    pub max_bounces: u32,
    pub denoiser: Denoiser,
    /// Resolution divisor for per-object masks.
    pub downsample: u32,
    /// Light-occlusion threshold for the depth cutout mask.
    pub obstruction: f32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            samples: constants::DEFAULT_SAMPLES,
            max_bounces: constants::DEFAULT_MAX_BOUNCES,
            denoiser: Denoiser::Optix,
            downsample: constants::MASK_DOWNSAMPLE,
            obstruction: constants::DEFAULT_OBSTRUCTION,
        }
    }
}

/// Output channel switches for one captured frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChannelConfig {
    /// Skip the light-occlusion cutout and keep the raw depth render.
    pub perfect_depth: bool,
    pub instance_segmap: bool,
    pub object_masks: bool,
    pub class_segmap: bool,
    /// Write per-instance pose and visibility metadata.
    pub mesh_info: bool,
}

pub trait RenderOps {
    /// Renders the color pass to `path` as a grayscale PNG.
    fn render_color(&mut self, path: &Path, settings: &RenderSettings) -> Result<(), RenderError>;

    /// Renders camera-space depth to `path` as a 16-bit PNG, quantized by
    /// `depth_scale` meters per unit.
    fn render_depth(&mut self, path: &Path, depth_scale: f64) -> Result<(), RenderError>;

    /// Renders the binary mask of pixels visible from the offset light.
    /// `threshold` widens the occluded region.
    fn render_light_mask(&mut self, path: &Path, threshold: f32) -> Result<(), RenderError>;

    /// Renders 1-based labels for target-class instances (0 = background)
    /// and returns the raw label array, row-major. Label order matches
    /// `SceneOps::instances_by_class` for the target class.
    fn render_instance_segmap(&mut self, path: &Path) -> Result<Vec<u16>, RenderError>;

    /// Renders each target instance's full unoccluded silhouette alone at
    /// `1/downsample` resolution. Returns one 0/1 mask per instance, in the
    /// same order as the instance segmap labels.
    fn render_object_masks(
        &mut self,
        path: &Path,
        downsample: u32,
    ) -> Result<Vec<Vec<u8>>, RenderError>;

    /// Renders per-pixel class ids as an 8-bit PNG.
    fn render_class_segmap(&mut self, path: &Path) -> Result<(), RenderError>;

    /// Output resolution as (width, height).
    fn resolution(&self) -> (u32, u32);
}
