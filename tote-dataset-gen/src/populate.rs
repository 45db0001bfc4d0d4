/// Scene population: duplicate, place, settle, prune.
use constants::{CLASS_TARGET, MAX_SPACING_FACTOR};
use indicatif::{ProgressBar, ProgressStyle};
use nalgebra::Vector3;
use rand::rngs::StdRng;
use thiserror::Error;

use crate::sampler::{Placement, TotePoseSampler, place_collision_free};
use crate::scene::{InstanceId, SceneError, SceneOps};
use crate::tote::{BoxBounds, Tote};

#[derive(Debug, Error)]
pub enum PopulateError {
    #[error(
        "could not seat instance {placed} of {requested} even at spacing factor {spacing_factor}"
    )]
    PlacementExhausted {
        placed: usize,
        requested: u32,
        spacing_factor: f64,
    },
    #[error(transparent)]
    Scene(#[from] SceneError),
}

/// Caps the requested fill count by the tote's interior capacity, measured
/// in object bounding-box volumes.
pub fn fill_count_clamp(requested: u32, tote: &Tote, half_extents: &Vector3<f64>) -> u32 {
    let object_volume =
        (2.0 * half_extents.x) * (2.0 * half_extents.y) * (2.0 * half_extents.z);
    if object_volume <= 0.0 {
        return requested;
    }
    requested.min((tote.interior_volume() / object_volume) as u32)
}

/// Places `count` instances of the template inside the tote without
/// overlaps.
///
/// The template itself is the first instance; every further one is
/// duplicated from it. When a sampler exhausts its attempt budget the
/// spacing factor doubles and the same instance is retried with a rebuilt
/// sampler. Beyond `MAX_SPACING_FACTOR` the run fails: a partially
/// populated tote would silently corrupt the dataset.
pub fn populate_scene(
    scene: &mut dyn SceneOps,
    tote: &Tote,
    template: InstanceId,
    count: u32,
    rng: &mut StdRng,
) -> Result<Vec<InstanceId>, PopulateError> {
    let half_extents = scene.half_extents(template)?;
    let mut spacing_factor = 1.0f64;
    let mut sampler = TotePoseSampler::new(tote, half_extents, count as f64 * spacing_factor);

    let pb = ProgressBar::new(count as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{bar:40.cyan/blue}] {pos}/{len} instances ({percent}%) {msg}")
            .unwrap()
            .progress_chars("▉▊▋▌▍▎▏ "),
    );
    pb.set_message("Placing instances");

    let mut placed: Vec<InstanceId> = Vec::with_capacity(count as usize);
    for index in 0..count {
        let id = if index == 0 {
            template
        } else {
            scene.duplicate(template)?
        };

        loop {
            match place_collision_free(scene, id, CLASS_TARGET, &sampler, rng)? {
                Placement::Placed(_) => break,
                Placement::Exhausted => {
                    spacing_factor *= 2.0;
                    if spacing_factor > MAX_SPACING_FACTOR {
                        return Err(PopulateError::PlacementExhausted {
                            placed: placed.len(),
                            requested: count,
                            spacing_factor,
                        });
                    }
                    sampler =
                        TotePoseSampler::new(tote, half_extents, count as f64 * spacing_factor);
                }
            }
        }
        placed.push(id);
        pb.inc(1);
    }
    pb.finish_with_message("Instances placed");

    Ok(placed)
}

/// Removes every instance of `class_id` whose position lies outside
/// `bounds`. Returns the number removed; the caller must re-query the live
/// count afterwards.
pub fn prune_outside(
    scene: &mut dyn SceneOps,
    bounds: &BoxBounds,
    class_id: u8,
) -> Result<u32, SceneError> {
    let mut removed = 0;
    for id in scene.instances_by_class(class_id) {
        let position = scene.pose(id)?.translation.vector;
        if !bounds.contains(&position) {
            scene.remove(id)?;
            removed += 1;
        }
    }
    Ok(removed)
}
