/// Collision-free placement sampling inside the tote.
use nalgebra::{Translation3, UnitQuaternion, Vector3};
use rand::Rng;
use rand::rngs::StdRng;

use crate::scene::{InstanceId, Pose, SceneError, SceneOps};
use crate::tote::{BoxBounds, Tote};

/// Candidate attempts per instance before one sampler gives up.
pub const MAX_PLACEMENT_ATTEMPTS: u32 = 100;

/// Outcome of one bounded placement attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Placement {
    Placed(Pose),
    /// No collision-free pose found within the attempt budget. The whole
    /// batch attempt is considered failed; the caller re-plans with a wider
    /// spacing factor.
    Exhausted,
}

/// Lazy stream of candidate poses for one object inside one tote.
///
/// Candidates land uniformly in the placement footprint inset by the
/// object's footprint radius, at a height above the current highest
/// occupant. `density` (requested count x spacing factor) widens the
/// vertical spawn band, so a larger spacing factor spreads candidates over
/// more layers instead of crowding one.
#[derive(Debug, Clone)]
pub struct TotePoseSampler {
    bounds: BoxBounds,
    half_extents: Vector3<f64>,
    spawn_band: f64,
}

impl TotePoseSampler {
    pub fn new(tote: &Tote, half_extents: Vector3<f64>, density: f64) -> Self {
        let bounds = tote.placement_bounds();
        let footprint = bounds.dimensions();
        let object_footprint = (2.0 * half_extents.x) * (2.0 * half_extents.y);
        let tote_footprint = (footprint.x * footprint.y).max(f64::EPSILON);
        let layers = (density.max(1.0) * object_footprint / tote_footprint).ceil();
        // Flat meshes have zero z extent; keep the band non-empty so the
        // height draw below never sees an empty range.
        let spawn_band = (layers.max(1.0) * 2.0 * half_extents.z)
            .max(half_extents.norm())
            .max(1e-6);
        Self {
            bounds,
            half_extents,
            spawn_band,
        }
    }

    /// Base height below which no candidate is generated: the floor top.
    pub fn floor_z(&self) -> f64 {
        self.bounds.min.z
    }

    /// Draws the next candidate pose above `highest_z`.
    pub fn candidate(&self, highest_z: f64, rng: &mut StdRng) -> Pose {
        let radius = self.half_extents.x.hypot(self.half_extents.y);
        let x = sample_span(self.bounds.min.x, self.bounds.max.x, radius, rng);
        let y = sample_span(self.bounds.min.y, self.bounds.max.y, radius, rng);
        let clearance = self.half_extents.norm();
        let base = highest_z.max(self.floor_z()) + clearance;
        let z = rng.gen_range(base..base + self.spawn_band);

        let yaw = rng.gen_range(0.0..std::f64::consts::TAU);
        let tilt = rng.gen_range(0.0..std::f64::consts::PI);
        let tilt_dir = rng.gen_range(0.0..std::f64::consts::TAU);
        let tilt_axis = Vector3::new(tilt_dir.cos(), tilt_dir.sin(), 0.0);
        let rotation = UnitQuaternion::from_scaled_axis(tilt_axis * tilt)
            * UnitQuaternion::from_scaled_axis(Vector3::z() * yaw);

        Pose::from_parts(Translation3::new(x, y, z), rotation)
    }
}

/// Uniform sample over `[min+margin, max-margin]`, degrading to the span
/// center when the object is wider than the span.
fn sample_span(min: f64, max: f64, margin: f64, rng: &mut StdRng) -> f64 {
    let lo = min + margin;
    let hi = max - margin;
    if lo >= hi {
        (min + max) / 2.0
    } else {
        rng.gen_range(lo..hi)
    }
}

/// Seats `id` at the first candidate pose that overlaps no other live
/// target-class instance. Overlap testing is delegated to the scene.
pub fn place_collision_free(
    scene: &mut dyn SceneOps,
    id: InstanceId,
    class_id: u8,
    sampler: &TotePoseSampler,
    rng: &mut StdRng,
) -> Result<Placement, SceneError> {
    let peers: Vec<InstanceId> = scene
        .instances_by_class(class_id)
        .into_iter()
        .filter(|peer| *peer != id)
        .collect();

    for _ in 0..MAX_PLACEMENT_ATTEMPTS {
        let mut highest = sampler.floor_z();
        for peer in &peers {
            highest = highest.max(scene.pose(*peer)?.translation.z);
        }

        let pose = sampler.candidate(highest, rng);
        scene.set_pose(id, pose)?;

        let mut collided = false;
        for peer in &peers {
            if scene.overlaps(id, *peer)? {
                collided = true;
                break;
            }
        }
        if !collided {
            return Ok(Placement::Placed(pose));
        }
    }
    Ok(Placement::Exhausted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn sampler() -> TotePoseSampler {
        let tote = Tote::new(0.7, 0.7, 0.5, 0.01).unwrap();
        TotePoseSampler::new(&tote, Vector3::new(0.05, 0.04, 0.03), 30.0)
    }

    #[test]
    fn candidates_stay_inside_the_footprint() {
        let sampler = sampler();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let pose = sampler.candidate(0.01, &mut rng);
            let p = pose.translation.vector;
            assert!(p.x.abs() <= 0.35 - 0.01, "x out of footprint: {}", p.x);
            assert!(p.y.abs() <= 0.35 - 0.01, "y out of footprint: {}", p.y);
            assert!(p.z > 0.01);
        }
    }

    #[test]
    fn candidates_spawn_above_the_highest_occupant() {
        let sampler = sampler();
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..100 {
            let pose = sampler.candidate(0.4, &mut rng);
            assert!(pose.translation.z > 0.4);
        }
    }

    #[test]
    fn flat_meshes_still_draw_candidates() {
        let tote = Tote::new(0.7, 0.7, 0.5, 0.01).unwrap();
        let sampler = TotePoseSampler::new(&tote, Vector3::new(0.05, 0.05, 0.0), 30.0);
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..100 {
            let pose = sampler.candidate(0.01, &mut rng);
            assert!(pose.translation.z > 0.01);
        }
    }

    #[test]
    fn wider_spacing_widens_the_spawn_band() {
        let tote = Tote::new(0.7, 0.7, 0.5, 0.01).unwrap();
        let half = Vector3::new(0.05, 0.05, 0.05);
        let tight = TotePoseSampler::new(&tote, half, 30.0);
        let wide = TotePoseSampler::new(&tote, half, 30.0 * 8.0);
        assert!(wide.spawn_band > tight.spawn_band);
    }
}
