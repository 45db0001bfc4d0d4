/// Shared static data for the tote dataset generator.
pub mod camera;
pub mod class;
pub mod render_settings;

pub use camera::{CameraInfo, CameraProfile};
pub use class::{CLASS_ENVIRONMENT, CLASS_TARGET, CLASS_TOTE};
pub use render_settings::*;
