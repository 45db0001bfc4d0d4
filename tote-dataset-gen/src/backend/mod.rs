//! Built-in scene and render backend.
//!
//! `SimWorld` implements both collaborator contracts: `SceneOps` through a
//! simplified settling simulation and `RenderOps` through a software
//! rasterizer, so the generator runs without any external engine.

pub mod mesh;
mod raster;
pub mod sim;

pub use sim::{CameraRig, SimWorld};
