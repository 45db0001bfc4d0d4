//! End-to-end run over a tiny synthetic model.

use std::fs;
use std::path::Path;

use constants::CameraProfile;
use tote_dataset_gen::backend::mesh::TriMesh;
use tote_dataset_gen::config::GenerationConfig;
use tote_dataset_gen::render::{ChannelConfig, RenderSettings};
use tote_dataset_gen::run_generation;
use tote_dataset_gen::tote::Tote;

fn frame_file(output: &Path, index: u32, suffix: &str) -> std::path::PathBuf {
    output.join("data").join(format!("{index:04}_{suffix}"))
}

#[test]
fn full_run_produces_a_complete_dataset_folder() {
    let dir = tempfile::tempdir().unwrap();
    let model_path = dir.path().join("cube.stl");
    TriMesh::cube(0.05).write_stl(&model_path).unwrap();

    let output = dir.path().join("dataset");
    let config = GenerationConfig {
        output_dir: output.clone(),
        camera: CameraProfile::XyzSl,
        camera_height: 2.0,
        tote: Tote::new(0.3, 0.3, 0.2, 0.01).unwrap(),
        model_path,
        model_max_dimension: 0.0,
        max_faces: 10_000,
        num_regen: 1,
        num_begin: 6,
        num_end: 0,
        num_pick: 3,
        substeps_per_frame: 4,
        render: RenderSettings::default(),
        channels: ChannelConfig {
            perfect_depth: false,
            instance_segmap: true,
            object_masks: true,
            class_segmap: true,
            mesh_info: true,
        },
        seed: Some(11),
    };

    let frames = run_generation(&config).unwrap();

    // One initial full-pile frame plus at least one pick step.
    assert!(frames.len() >= 2, "got {} frames", frames.len());
    assert_eq!(frames[0].index, 1);
    assert_eq!(frames[0].picked, 0);
    assert!(frames[0].live_instances > 0);
    let last = frames.last().unwrap();
    assert_eq!(last.index, frames.len() as u32);
    assert_eq!(last.live_instances, 0);

    assert!(output.join("info.yml").exists());
    assert!(output.join("model.stl").exists());
    assert!(output.join("manifest.json").exists());

    for frame in &frames {
        for suffix in [
            "color.png",
            "depth.png",
            "instmap.png",
            "instmap.npz",
            "objmasks.png",
            "objmasks.npz",
            "clsmap.png",
            "pose.csv",
        ] {
            let path = frame_file(&output, frame.index, suffix);
            assert!(path.exists(), "missing {}", path.display());
        }
        // The light mask is consumed by the depth cutout and deleted.
        assert!(!frame_file(&output, frame.index, "lightmask.png").exists());
    }

    let manifest = fs::read_to_string(output.join("manifest.json")).unwrap();
    assert!(manifest.contains("\"seed\": 11"));
    assert!(manifest.contains("\"camera\": \"XYZ-SL\""));
    assert!(manifest.contains("\"num_pick\": 3"));

    // pose.csv of the first frame carries one row per live instance plus
    // the header, with visibility ratios appended.
    let pose = fs::read_to_string(frame_file(&output, 1, "pose.csv")).unwrap();
    let lines: Vec<&str> = pose.lines().collect();
    assert_eq!(lines.len(), frames[0].live_instances as usize + 1);
    assert!(lines[0].ends_with("visible_ratio"));
}

#[test]
fn reruns_with_the_same_seed_reproduce_the_pick_plan() {
    let dir = tempfile::tempdir().unwrap();
    let model_path = dir.path().join("cube.stl");
    TriMesh::cube(0.05).write_stl(&model_path).unwrap();

    let base = GenerationConfig {
        camera: CameraProfile::XyzSl,
        camera_height: 2.0,
        tote: Tote::new(0.3, 0.3, 0.2, 0.01).unwrap(),
        model_path,
        num_regen: 1,
        num_begin: 4,
        num_end: 0,
        num_pick: 2,
        substeps_per_frame: 4,
        channels: ChannelConfig::default(),
        seed: Some(7),
        ..GenerationConfig::default()
    };

    let first = run_generation(&GenerationConfig {
        output_dir: dir.path().join("a"),
        ..base.clone()
    })
    .unwrap();
    let second = run_generation(&GenerationConfig {
        output_dir: dir.path().join("b"),
        ..base
    })
    .unwrap();

    let summary =
        |frames: &[tote_dataset_gen::capture::FrameRecord]| -> Vec<(u32, u32, u32)> {
            frames
                .iter()
                .map(|f| (f.index, f.picked, f.live_instances))
                .collect()
        };
    assert_eq!(summary(&first), summary(&second));
}
