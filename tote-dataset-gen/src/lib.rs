//! Synthetic bin-picking dataset generator.
//!
//! Fills a tote with instances of a CAD model, settles them under a
//! simplified physics step, then walks a pick plan: each step removes the
//! highest instances, re-settles, and captures annotated frames (color,
//! depth, segmentation maps, per-instance poses) the way a structured-light
//! camera over the tote would see them.

pub mod backend;
pub mod capture;
pub mod config;
pub mod info;
pub mod npz;
pub mod plan;
pub mod populate;
pub mod render;
pub mod sampler;
pub mod scene;
pub mod tote;

use std::sync::Arc;

use nalgebra::Vector3;
use rand::SeedableRng;
use rand::rngs::StdRng;
use thiserror::Error;

use constants::{
    CLASS_ENVIRONMENT, CLASS_TARGET, CLASS_TOTE, MAX_SIMULATION_TIME, VIRTUAL_TOTE_HEIGHT,
};

use crate::backend::mesh::{MeshError, TriMesh};
use crate::backend::{CameraRig, SimWorld};
use crate::capture::{CaptureError, CaptureSession, FrameRecord};
use crate::config::{ConfigError, ConfigSummary, GenerationConfig};
use crate::info::{InfoError, RunManifest, camera_extrinsics, dump_info_yml, write_manifest};
use crate::plan::{PlanError, pick_sequence};
use crate::populate::{PopulateError, fill_count_clamp, populate_scene, prune_outside};
use crate::scene::{Pose, SceneError, SceneOps};

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Mesh(#[from] MeshError),
    #[error(transparent)]
    Info(#[from] InfoError),
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error(transparent)]
    Populate(#[from] PopulateError),
    #[error(transparent)]
    Scene(#[from] SceneError),
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Runs the whole generation pipeline described by `config`.
///
/// One call produces one dataset folder: `info.yml`, a `data/` directory of
/// numbered frames, the processed model, and a `manifest.json` run summary.
/// The frame index is global across regenerations and starts at 1.
pub fn run_generation(config: &GenerationConfig) -> Result<Vec<FrameRecord>, GenerationError> {
    config.validate()?;
    let camera = config.camera.info();

    info::initialize_folder(&config.output_dir, true)?;
    dump_info_yml(
        &config.output_dir.join("info.yml"),
        camera,
        camera_extrinsics(config.camera_height),
        &config.tote,
    )?;

    let seed = config.seed.unwrap_or_else(rand::random);
    let mut rng = StdRng::seed_from_u64(seed);
    println!(
        "Generating dataset with camera {} (seed {seed})",
        camera.name
    );

    let model = Arc::new(prepare_model(config)?);
    let mut session = CaptureSession::new(
        config.output_dir.join("data"),
        config.channels,
        config.render.clone(),
        camera.depth_scale,
    )?;

    let mut frames = Vec::new();
    for regen in 0..config.num_regen {
        println!("Regeneration {}/{}", regen + 1, config.num_regen);
        let count = fill_count_clamp(config.num_begin, &config.tote, &model.half_extents());
        let mut world = build_world(config);
        let template = world.add_instance(
            "Model",
            model.clone(),
            CLASS_TARGET,
            true,
            true,
            Pose::identity(),
        );

        populate_scene(&mut world, &config.tote, template, count, &mut rng)?;
        world.settle(config.substeps_per_frame, MAX_SIMULATION_TIME)?;

        let removed = prune_outside(&mut world, &config.tote.retention_bounds(), CLASS_TARGET)?;
        println!("{removed} objects out of tote are removed");
        remove_named(&mut world, "VirtualTote")?;

        let live = world.instances_by_class(CLASS_TARGET).len() as u32;
        let plan = pick_sequence(live, config.num_end.min(live), config.num_pick)?;
        for picks in plan {
            frames.push(session.execute_step(
                &mut world,
                picks,
                config.substeps_per_frame,
                MAX_SIMULATION_TIME,
            )?);
        }
    }

    println!(
        "Captured {} frames across {} regenerations",
        session.frames_captured(),
        config.num_regen
    );
    write_manifest(
        &config.output_dir,
        &RunManifest {
            config: ConfigSummary {
                camera: camera.name,
                num_begin: config.num_begin,
                num_end: config.num_end,
                num_pick: config.num_pick,
            },
            seed,
            num_regenerations: config.num_regen,
            frames: &frames,
        },
    )?;
    Ok(frames)
}

/// Loads the CAD model, decimates it to the face budget, optionally
/// rescales it, recenters it on its center of mass, and exports the
/// processed copy beside the dataset so poses stay reproducible.
fn prepare_model(config: &GenerationConfig) -> Result<TriMesh, GenerationError> {
    let mut model = TriMesh::from_stl(&config.model_path)?.decimate(config.max_faces);
    if config.model_max_dimension > 0.0 {
        let largest = model.dimensions().max();
        if largest > 0.0 {
            model.scale(config.model_max_dimension / largest);
        }
    }
    model.recenter_to_center_of_mass();
    model.write_stl(&config.output_dir.join("model.stl"))?;
    Ok(model)
}

/// Builds the static scene: camera rig, floor, tote, and the invisible
/// extended tote that keeps falling instances from drifting out sideways.
fn build_world(config: &GenerationConfig) -> SimWorld {
    let camera = config.camera.info();
    let rig = CameraRig::top_down(
        &camera.intrinsics,
        camera.image_resolution,
        config.camera_height,
    );
    let light = Vector3::new(camera.baseline, 0.0, config.camera_height);
    let mut world = SimWorld::new(rig, light, &config.tote);

    world.add_instance(
        "Environment",
        Arc::new(TriMesh::plane(100.0)),
        CLASS_ENVIRONMENT,
        false,
        true,
        Pose::identity(),
    );
    world.add_instance(
        "Tote",
        Arc::new(TriMesh::tote_frame(
            config.tote.length,
            config.tote.width,
            config.tote.height,
            config.tote.thickness,
        )),
        CLASS_TOTE,
        false,
        true,
        Pose::identity(),
    );
    world.add_instance(
        "VirtualTote",
        Arc::new(TriMesh::tote_frame(
            config.tote.length,
            config.tote.width,
            VIRTUAL_TOTE_HEIGHT,
            config.tote.thickness,
        )),
        CLASS_TOTE,
        false,
        false,
        Pose::identity(),
    );
    world
}

fn remove_named(world: &mut SimWorld, name: &str) -> Result<(), GenerationError> {
    let id = world
        .instances()
        .iter()
        .find(|inst| inst.name == name)
        .map(|inst| inst.id);
    if let Some(id) = id {
        world.remove(id)?;
    }
    Ok(())
}
