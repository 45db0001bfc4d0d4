/// Built-in scene backend: instance registry, overlap queries and a
/// simplified settling simulation.
///
/// This is an approximate stand-in honoring the `SceneOps` contract, not a
/// physics engine: instances settle as bounding spheres under gravity,
/// constrained by the tote interior, keeping their spawn orientation.
use std::sync::Arc;

use constants::SIMULATION_FPS;
use nalgebra::{Matrix3, Vector3};

use crate::backend::mesh::TriMesh;
use crate::scene::{InstanceId, Pose, SceneError, SceneOps};
use crate::tote::{BoxBounds, Tote};

/// Camera rig the raster renderer draws through.
#[derive(Debug, Clone)]
pub struct CameraRig {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    pub width: u32,
    pub height: u32,
    /// Camera position in world coordinates.
    pub position: Vector3<f64>,
    /// World-to-camera rotation.
    pub world_to_cam: Matrix3<f64>,
}

impl CameraRig {
    /// Straight-down rig from OpenCV intrinsics at `height` meters,
    /// matching the extrinsics written into `info.yml`.
    pub fn top_down(intrinsics: &[[f64; 3]; 3], resolution: [u32; 2], height: f64) -> Self {
        Self {
            fx: intrinsics[0][0],
            fy: intrinsics[1][1],
            cx: intrinsics[0][2],
            cy: intrinsics[1][2],
            width: resolution[0],
            height: resolution[1],
            position: Vector3::new(0.0, 0.0, height),
            world_to_cam: Matrix3::from_diagonal(&Vector3::new(1.0, -1.0, -1.0)),
        }
    }

    /// Same orientation, different position; used for the light's shadow
    /// view.
    pub fn relocated(&self, position: Vector3<f64>) -> Self {
        Self {
            position,
            ..self.clone()
        }
    }
}

pub struct SimInstance {
    pub id: InstanceId,
    pub name: String,
    pub class_id: u8,
    pub mesh: Arc<TriMesh>,
    pub pose: Pose,
    pub physics: bool,
    /// Hidden instances still collide but never render.
    pub visible: bool,
}

pub struct SimWorld {
    instances: Vec<SimInstance>,
    next_id: u32,
    duplicate_count: u32,
    pub camera: CameraRig,
    /// Light position for shading and the occlusion mask.
    pub light: Vector3<f64>,
    /// Background light strength in [0, 1] for unlit pixels.
    pub background_light: f64,
    /// Interior the settling step keeps physics instances inside.
    containment: BoxBounds,
}

impl SimWorld {
    pub fn new(camera: CameraRig, light: Vector3<f64>, tote: &Tote) -> Self {
        Self {
            instances: Vec::new(),
            next_id: 0,
            duplicate_count: 0,
            camera,
            light,
            background_light: 1.0,
            containment: tote.placement_bounds(),
        }
    }

    /// Small default rig for unit tests.
    #[cfg(test)]
    pub fn for_tests(tote: &Tote) -> Self {
        let intrinsics = [[160.0, 0.0, 64.0], [0.0, 160.0, 48.0], [0.0, 0.0, 1.0]];
        let camera = CameraRig::top_down(&intrinsics, [128, 96], 2.0);
        Self::new(camera, Vector3::new(0.25, 0.0, 2.0), tote)
    }

    pub fn add_instance(
        &mut self,
        name: &str,
        mesh: Arc<TriMesh>,
        class_id: u8,
        physics: bool,
        visible: bool,
        pose: Pose,
    ) -> InstanceId {
        let id = InstanceId(self.next_id);
        self.next_id += 1;
        self.instances.push(SimInstance {
            id,
            name: name.to_string(),
            class_id,
            mesh,
            pose,
            physics,
            visible,
        });
        id
    }

    pub fn instances(&self) -> &[SimInstance] {
        &self.instances
    }

    fn get(&self, id: InstanceId) -> Result<&SimInstance, SceneError> {
        self.instances
            .iter()
            .find(|inst| inst.id == id)
            .ok_or(SceneError::UnknownInstance(id))
    }

    fn get_mut(&mut self, id: InstanceId) -> Result<&mut SimInstance, SceneError> {
        self.instances
            .iter_mut()
            .find(|inst| inst.id == id)
            .ok_or(SceneError::UnknownInstance(id))
    }

    /// Equivalent sphere radius used by the settling approximation.
    fn settle_radius(mesh: &TriMesh) -> f64 {
        let he = mesh.half_extents();
        (he.x + he.y + he.z) / 3.0
    }
}

impl SceneOps for SimWorld {
    fn duplicate(&mut self, id: InstanceId) -> Result<InstanceId, SceneError> {
        let source = self.get(id)?;
        let name = source.name.clone();
        let mesh = source.mesh.clone();
        let class_id = source.class_id;
        let physics = source.physics;
        let visible = source.visible;
        let pose = source.pose;
        self.duplicate_count += 1;
        let name = format!("{name}.{:03}", self.duplicate_count);
        Ok(self.add_instance(&name, mesh, class_id, physics, visible, pose))
    }

    fn remove(&mut self, id: InstanceId) -> Result<(), SceneError> {
        let before = self.instances.len();
        self.instances.retain(|inst| inst.id != id);
        if self.instances.len() == before {
            return Err(SceneError::UnknownInstance(id));
        }
        Ok(())
    }

    fn name(&self, id: InstanceId) -> Result<String, SceneError> {
        Ok(self.get(id)?.name.clone())
    }

    fn pose(&self, id: InstanceId) -> Result<Pose, SceneError> {
        Ok(self.get(id)?.pose)
    }

    fn set_pose(&mut self, id: InstanceId, pose: Pose) -> Result<(), SceneError> {
        self.get_mut(id)?.pose = pose;
        Ok(())
    }

    fn half_extents(&self, id: InstanceId) -> Result<Vector3<f64>, SceneError> {
        Ok(self.get(id)?.mesh.half_extents())
    }

    fn overlaps(&self, a: InstanceId, b: InstanceId) -> Result<bool, SceneError> {
        let ia = self.get(a)?;
        let ib = self.get(b)?;
        Ok(obb_overlap(
            &ia.pose,
            &ia.mesh.half_extents(),
            &ib.pose,
            &ib.mesh.half_extents(),
        ))
    }

    fn settle(
        &mut self,
        substeps_per_frame: u32,
        max_simulation_time: f64,
    ) -> Result<(), SceneError> {
        if substeps_per_frame == 0 {
            return Err(SceneError::Settle("substeps_per_frame is zero".into()));
        }

        let dt = 1.0 / (SIMULATION_FPS * substeps_per_frame as f64);
        let steps = (max_simulation_time / dt).ceil() as usize;
        let gravity = -9.81;
        let rest_threshold = 1e-3;

        let movers: Vec<usize> = (0..self.instances.len())
            .filter(|i| self.instances[*i].physics)
            .collect();
        let radii: Vec<f64> = movers
            .iter()
            .map(|i| Self::settle_radius(&self.instances[*i].mesh))
            .collect();
        let mut velocities = vec![0.0f64; movers.len()];

        for _ in 0..steps {
            // Integrate vertical motion.
            for (slot, &i) in movers.iter().enumerate() {
                velocities[slot] += gravity * dt;
                let p = &mut self.instances[i].pose.translation;
                p.z += velocities[slot] * dt;
            }

            // Floor and wall constraints from the tote interior.
            for (slot, &i) in movers.iter().enumerate() {
                let r = radii[slot];
                let p = &mut self.instances[i].pose.translation;
                p.x = p.x.clamp(self.containment.min.x + r, self.containment.max.x - r);
                p.y = p.y.clamp(self.containment.min.y + r, self.containment.max.y - r);
                if p.z < self.containment.min.z + r {
                    p.z = self.containment.min.z + r;
                    velocities[slot] = 0.0;
                }
            }

            // Sphere-sphere separation, positional with velocity damping.
            for a in 0..movers.len() {
                for b in (a + 1)..movers.len() {
                    let pa = self.instances[movers[a]].pose.translation.vector;
                    let pb = self.instances[movers[b]].pose.translation.vector;
                    let min_dist = radii[a] + radii[b];
                    let delta = pb - pa;
                    let dist = delta.norm();
                    if dist >= min_dist || dist < f64::EPSILON {
                        continue;
                    }
                    let push = delta / dist * (min_dist - dist) / 2.0;
                    self.instances[movers[a]].pose.translation.vector -= push;
                    self.instances[movers[b]].pose.translation.vector += push;
                    // Resting contact: kill accumulated fall speed.
                    velocities[a] *= 0.5;
                    velocities[b] *= 0.5;
                }
            }

            if velocities.iter().all(|v| v.abs() < rest_threshold) {
                break;
            }
        }
        Ok(())
    }

    fn instances_by_class(&self, class_id: u8) -> Vec<InstanceId> {
        // Registry is append-only and creation-ordered, so this is already
        // ascending id order.
        self.instances
            .iter()
            .filter(|inst| inst.class_id == class_id)
            .map(|inst| inst.id)
            .collect()
    }
}

/// Oriented-bounding-box overlap via the separating axis test.
fn obb_overlap(
    pose_a: &Pose,
    half_a: &Vector3<f64>,
    pose_b: &Pose,
    half_b: &Vector3<f64>,
) -> bool {
    let rot_a = pose_a.rotation.to_rotation_matrix();
    let rot_b = pose_b.rotation.to_rotation_matrix();
    let to_b = pose_b.translation.vector - pose_a.translation.vector;

    let axes_a: Vec<Vector3<f64>> = (0..3).map(|i| rot_a.matrix().column(i).into()).collect();
    let axes_b: Vec<Vector3<f64>> = (0..3).map(|i| rot_b.matrix().column(i).into()).collect();

    let mut axes: Vec<Vector3<f64>> = Vec::with_capacity(15);
    axes.extend(axes_a.iter().copied());
    axes.extend(axes_b.iter().copied());
    for a in &axes_a {
        for b in &axes_b {
            let cross = a.cross(b);
            if cross.norm() > 1e-9 {
                axes.push(cross.normalize());
            }
        }
    }

    for axis in &axes {
        let ra = half_a.x * axes_a[0].dot(axis).abs()
            + half_a.y * axes_a[1].dot(axis).abs()
            + half_a.z * axes_a[2].dot(axis).abs();
        let rb = half_b.x * axes_b[0].dot(axis).abs()
            + half_b.y * axes_b[1].dot(axis).abs()
            + half_b.z * axes_b[2].dot(axis).abs();
        if to_b.dot(axis).abs() > ra + rb {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use constants::CLASS_TARGET;
    use nalgebra::{Translation3, UnitQuaternion};

    fn world() -> SimWorld {
        let tote = Tote::new(0.7, 0.7, 0.5, 0.01).unwrap();
        SimWorld::for_tests(&tote)
    }

    fn cube_at(world: &mut SimWorld, x: f64, y: f64, z: f64) -> InstanceId {
        let mesh = Arc::new(TriMesh::cube(0.1));
        world.add_instance(
            "Cube",
            mesh,
            CLASS_TARGET,
            true,
            true,
            Pose::from_parts(Translation3::new(x, y, z), Default::default()),
        )
    }

    #[test]
    fn duplicates_share_mesh_but_own_poses() {
        let mut world = world();
        let a = cube_at(&mut world, 0.0, 0.0, 0.2);
        let b = world.duplicate(a).unwrap();
        assert_ne!(a, b);

        let moved = Pose::from_parts(Translation3::new(0.2, 0.0, 0.2), Default::default());
        world.set_pose(b, moved).unwrap();
        assert_eq!(world.pose(a).unwrap().translation.x, 0.0);
        assert_eq!(world.pose(b).unwrap().translation.x, 0.2);
    }

    #[test]
    fn removed_instances_are_unknown() {
        let mut world = world();
        let a = cube_at(&mut world, 0.0, 0.0, 0.2);
        world.remove(a).unwrap();
        assert!(matches!(
            world.pose(a),
            Err(SceneError::UnknownInstance(_))
        ));
        assert!(world.instances_by_class(CLASS_TARGET).is_empty());
    }

    #[test]
    fn overlap_detects_interpenetration_and_clearance() {
        let mut world = world();
        let a = cube_at(&mut world, 0.0, 0.0, 0.2);
        let b = cube_at(&mut world, 0.05, 0.0, 0.2);
        let c = cube_at(&mut world, 0.3, 0.0, 0.2);
        assert!(world.overlaps(a, b).unwrap());
        assert!(!world.overlaps(a, c).unwrap());
    }

    #[test]
    fn rotated_boxes_use_their_oriented_extents() {
        let mut world = world();
        let a = cube_at(&mut world, 0.0, 0.0, 0.2);
        let b = cube_at(&mut world, 0.115, 0.0, 0.2);
        // Axis-aligned they clear; a 45 degree yaw widens the footprint
        // enough to touch.
        assert!(!world.overlaps(a, b).unwrap());
        let spun = Pose::from_parts(
            Translation3::new(0.115, 0.0, 0.2),
            UnitQuaternion::from_scaled_axis(Vector3::z() * std::f64::consts::FRAC_PI_4),
        );
        world.set_pose(b, spun).unwrap();
        assert!(world.overlaps(a, b).unwrap());
    }

    #[test]
    fn settling_drops_instances_onto_the_floor() {
        let mut world = world();
        let a = cube_at(&mut world, 0.0, 0.0, 0.4);
        world.settle(20, 3.0).unwrap();
        let z = world.pose(a).unwrap().translation.z;
        // Sphere radius for a 0.1 cube is 0.05; floor top is at 0.01.
        assert!((z - 0.06).abs() < 1e-6, "rest height was {z}");
    }

    #[test]
    fn settling_keeps_instances_inside_the_walls() {
        let mut world = world();
        let a = cube_at(&mut world, 0.6, 0.6, 0.8);
        world.settle(20, 3.0).unwrap();
        let p = world.pose(a).unwrap().translation;
        assert!(p.x.abs() <= 0.35);
        assert!(p.y.abs() <= 0.35);
    }
}
