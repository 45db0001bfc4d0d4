/// Run-level metadata outputs: `info.yml` and `manifest.json`.
use std::fs;
use std::path::Path;

use constants::CameraInfo;
use serde::Serialize;
use thiserror::Error;

use crate::capture::FrameRecord;
use crate::config::ConfigSummary;
use crate::tote::Tote;

#[derive(Debug, Error)]
pub enum InfoError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Serialize)]
struct CameraSection {
    intrinsics: [[f64; 3]; 3],
    extrinsics: [[f64; 4]; 4],
    image_resolution: [u32; 2],
    depth_scale: f64,
    distort_coeffs: [f64; 5],
}

#[derive(Serialize)]
struct ToteSection {
    length: f64,
    width: f64,
    height: f64,
}

#[derive(Serialize)]
struct InfoDoc {
    camera: CameraSection,
    tote: ToteSection,
}

/// Creates the output directory (and its `data/` subdirectory), clearing
/// any previous contents first when `clear` is set.
pub fn initialize_folder(output_dir: &Path, clear: bool) -> std::io::Result<()> {
    if clear && output_dir.exists() {
        fs::remove_dir_all(output_dir)?;
    }
    fs::create_dir_all(output_dir.join("data"))
}

/// Writes `info.yml` once per run, before any scene state exists.
pub fn dump_info_yml(
    path: &Path,
    camera: &CameraInfo,
    extrinsics: [[f64; 4]; 4],
    tote: &Tote,
) -> Result<(), InfoError> {
    let doc = InfoDoc {
        camera: CameraSection {
            intrinsics: camera.intrinsics,
            extrinsics,
            image_resolution: camera.image_resolution,
            depth_scale: camera.depth_scale,
            distort_coeffs: camera.distort_coeffs,
        },
        tote: ToteSection {
            length: tote.length,
            width: tote.width,
            height: tote.height,
        },
    };
    fs::write(path, serde_yaml::to_string(&doc)?)?;
    Ok(())
}

/// Camera-to-world pose: straight down from `height` meters, x aligned with
/// the world x axis.
pub fn camera_extrinsics(height: f64) -> [[f64; 4]; 4] {
    [
        [1.0, 0.0, 0.0, 0.0],
        [0.0, -1.0, 0.0, 0.0],
        [0.0, 0.0, -1.0, height],
        [0.0, 0.0, 0.0, 1.0],
    ]
}

/// Run summary in the manifest idiom: enough to reproduce the run and to
/// sanity-check it without opening any frame.
#[derive(Serialize)]
pub struct RunManifest<'a> {
    pub config: ConfigSummary<'a>,
    pub seed: u64,
    pub num_regenerations: u32,
    pub frames: &'a [FrameRecord],
}

pub fn write_manifest(output_dir: &Path, manifest: &RunManifest<'_>) -> Result<(), InfoError> {
    let path = output_dir.join("manifest.json");
    fs::write(&path, serde_json::to_string_pretty(manifest)?)?;
    println!("Generated run manifest: {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use constants::CameraProfile;

    #[test]
    fn info_yml_contains_both_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("info.yml");
        let tote = Tote::new(0.7, 0.6, 0.5, 0.01).unwrap();
        dump_info_yml(
            &path,
            CameraProfile::XyzSl.info(),
            camera_extrinsics(2.0),
            &tote,
        )
        .unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("camera:"));
        assert!(text.contains("intrinsics:"));
        assert!(text.contains("depth_scale:"));
        assert!(text.contains("tote:"));
        assert!(text.contains("length: 0.7"));
    }

    #[test]
    fn manifest_embeds_the_config_summary() {
        let dir = tempfile::tempdir().unwrap();
        let frames = [FrameRecord {
            index: 1,
            picked: 0,
            live_instances: 4,
        }];
        write_manifest(
            dir.path(),
            &RunManifest {
                config: ConfigSummary {
                    camera: "XYZ-SL",
                    num_begin: 4,
                    num_end: 0,
                    num_pick: 2,
                },
                seed: 3,
                num_regenerations: 1,
                frames: &frames,
            },
        )
        .unwrap();

        let text = fs::read_to_string(dir.path().join("manifest.json")).unwrap();
        assert!(text.contains("\"camera\": \"XYZ-SL\""));
        assert!(text.contains("\"num_pick\": 2"));
        assert!(text.contains("\"seed\": 3"));
        assert!(text.contains("\"live_instances\": 4"));
    }

    #[test]
    fn initialize_folder_clears_previous_output() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("run");
        initialize_folder(&out, true).unwrap();
        fs::write(out.join("data").join("0001_color.png"), b"stale").unwrap();

        initialize_folder(&out, true).unwrap();
        assert!(out.join("data").exists());
        assert!(!out.join("data").join("0001_color.png").exists());
    }
}
