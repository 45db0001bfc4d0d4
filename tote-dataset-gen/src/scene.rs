/// Scene/physics collaborator contract.
///
/// The core never touches a scene graph directly; everything it needs from
/// the 3D engine goes through this trait. The built-in software backend
/// implements it, and so can an adapter over a real engine.
use nalgebra::{Isometry3, Vector3};
use thiserror::Error;

/// World pose of an instance (position + orientation).
pub type Pose = Isometry3<f64>;

/// Stable instance handle. Ids are assigned in creation order and never
/// reused within a run, which makes id order a reproducible tie-break.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstanceId(pub u32);

#[derive(Debug, Error)]
pub enum SceneError {
    #[error("unknown instance {0:?}")]
    UnknownInstance(InstanceId),
    #[error("physics settling failed: {0}")]
    Settle(String),
}

pub trait SceneOps {
    /// Clones an instance, sharing the mesh template but owning a fresh pose.
    fn duplicate(&mut self, id: InstanceId) -> Result<InstanceId, SceneError>;

    /// Destroys one instance.
    fn remove(&mut self, id: InstanceId) -> Result<(), SceneError>;

    /// Display name of an instance; duplicates carry a numbered suffix, so
    /// names identify instances in exported metadata.
    fn name(&self, id: InstanceId) -> Result<String, SceneError>;

    fn pose(&self, id: InstanceId) -> Result<Pose, SceneError>;

    fn set_pose(&mut self, id: InstanceId, pose: Pose) -> Result<(), SceneError>;

    /// Half extents of the instance's mesh bounding box in its local frame.
    fn half_extents(&self, id: InstanceId) -> Result<Vector3<f64>, SceneError>;

    /// Geometric overlap query between two instances at their current poses.
    fn overlaps(&self, a: InstanceId, b: InstanceId) -> Result<bool, SceneError>;

    /// Runs physics until rest or until the time budget is exhausted.
    fn settle(&mut self, substeps_per_frame: u32, max_simulation_time: f64)
    -> Result<(), SceneError>;

    /// Live instances carrying the given class id, in ascending id order.
    /// Callers rely on this order for deterministic labeling and tie-breaks.
    fn instances_by_class(&self, class_id: u8) -> Vec<InstanceId>;
}
