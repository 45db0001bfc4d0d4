/// Pick execution and per-frame capture/annotation.
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use constants::CLASS_TARGET;
use image::ImageBuffer;
use serde::Serialize;
use thiserror::Error;

use crate::npz::{self, NpzError};
use crate::render::{ChannelConfig, RenderError, RenderOps, RenderSettings};
use crate::scene::{InstanceId, SceneError, SceneOps};

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error(transparent)]
    Scene(#[from] SceneError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Npz(#[from] NpzError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

/// Per-frame summary recorded into the run manifest.
#[derive(Debug, Clone, Serialize)]
pub struct FrameRecord {
    pub index: u32,
    /// Instances removed before this capture.
    pub picked: u32,
    /// Target-class instances live in this capture.
    pub live_instances: u32,
}

/// Owns the frame counter and the per-frame output pipeline.
///
/// One session spans the whole run: the frame index increments once per
/// pick-plan step and is never reset between regenerations.
pub struct CaptureSession {
    data_dir: PathBuf,
    channels: ChannelConfig,
    settings: RenderSettings,
    depth_scale: f64,
    frame_index: u32,
}

impl CaptureSession {
    pub fn new(
        data_dir: PathBuf,
        channels: ChannelConfig,
        settings: RenderSettings,
        depth_scale: f64,
    ) -> Result<Self, CaptureError> {
        fs::create_dir_all(&data_dir)?;
        Ok(Self {
            data_dir,
            channels,
            settings,
            depth_scale,
            frame_index: 0,
        })
    }

    pub fn frames_captured(&self) -> u32 {
        self.frame_index
    }

    /// Executes one pick-plan entry: removes the `picks` highest target
    /// instances, re-settles if anything moved, then captures a frame.
    /// A zero entry captures the scene as-is, so the first plan entry
    /// photographs the untouched pile.
    pub fn execute_step<W: SceneOps + RenderOps>(
        &mut self,
        world: &mut W,
        picks: u32,
        substeps_per_frame: u32,
        max_simulation_time: f64,
    ) -> Result<FrameRecord, CaptureError> {
        self.frame_index += 1;
        for _ in 0..picks {
            remove_highest(world, CLASS_TARGET)?;
        }
        if picks > 0 {
            world.settle(substeps_per_frame, max_simulation_time)?;
        }
        self.capture_frame(world, picks)
    }

    fn frame_path(&self, suffix: &str) -> PathBuf {
        self.data_dir
            .join(format!("{:04}_{suffix}", self.frame_index))
    }

    fn capture_frame<W: SceneOps + RenderOps>(
        &mut self,
        world: &mut W,
        picks: u32,
    ) -> Result<FrameRecord, CaptureError> {
        let live = world.instances_by_class(CLASS_TARGET);
        let (width, height) = world.resolution();

        let depth_path = self.frame_path("depth.png");
        world.render_color(&self.frame_path("color.png"), &self.settings)?;
        world.render_depth(&depth_path, self.depth_scale)?;

        if !self.channels.perfect_depth {
            let mask_path = self.frame_path("lightmask.png");
            world.render_light_mask(&mask_path, self.settings.obstruction)?;
            apply_binary_mask(&depth_path, &mask_path, &depth_path)?;
            fs::remove_file(&mask_path)?;
        }

        let mut instance_labels = None;
        if self.channels.instance_segmap {
            let labels = world.render_instance_segmap(&self.frame_path("instmap.png"))?;
            npz::write_npz_u16(
                &self.frame_path("instmap.npz"),
                &labels,
                (height as usize, width as usize),
            )?;
            instance_labels = Some(labels);
        }

        let mut object_masks = None;
        if self.channels.object_masks {
            let masks = world
                .render_object_masks(&self.frame_path("objmasks.png"), self.settings.downsample)?;
            let mask_shape = (
                (height / self.settings.downsample) as usize,
                (width / self.settings.downsample) as usize,
            );
            npz::write_npz_u8_stack(&self.frame_path("objmasks.npz"), &masks, mask_shape)?;
            object_masks = Some(masks);
        }

        if self.channels.class_segmap {
            world.render_class_segmap(&self.frame_path("clsmap.png"))?;
        }

        if self.channels.mesh_info {
            // Visibility ratios need both segmentation channels; without
            // them the column is omitted entirely, not zeroed.
            let ratios = match (&instance_labels, &object_masks) {
                (Some(labels), Some(masks)) => Some(visibility_ratios(
                    labels,
                    masks,
                    self.settings.downsample,
                )),
                _ => None,
            };
            export_meshes_info(world, &self.frame_path("pose.csv"), &live, ratios.as_deref())?;
        }

        Ok(FrameRecord {
            index: self.frame_index,
            picked: picks,
            live_instances: live.len() as u32,
        })
    }
}

/// Removes the highest-positioned instance of the class, if any.
///
/// "Highest" is the maximum world z of the instance origin. Ties go to the
/// smallest instance id, so repeated runs remove the same instance.
pub fn remove_highest<W: SceneOps + ?Sized>(
    scene: &mut W,
    class_id: u8,
) -> Result<Option<InstanceId>, SceneError> {
    let mut best: Option<(InstanceId, f64)> = None;
    for id in scene.instances_by_class(class_id) {
        let z = scene.pose(id)?.translation.z;
        match best {
            Some((_, best_z)) if z <= best_z => {}
            _ => best = Some((id, z)),
        }
    }
    if let Some((id, _)) = best {
        scene.remove(id)?;
        return Ok(Some(id));
    }
    Ok(None)
}

/// Derives the fraction of each instance's silhouette that is visible.
///
/// Visible area comes from the instance segmap (pixels whose label equals
/// the instance's 1-based index); the unoccluded area comes from the
/// downsampled object mask, rescaled by the downsampling factor squared.
pub fn visibility_ratios(labels: &[u16], masks: &[Vec<u8>], downsample: u32) -> Vec<f64> {
    let area_scale = (downsample * downsample) as f64;
    let mut visible = vec![0u64; masks.len()];
    for label in labels {
        let label = *label as usize;
        if label >= 1 && label <= masks.len() {
            visible[label - 1] += 1;
        }
    }

    masks
        .iter()
        .zip(&visible)
        .map(|(mask, seen)| {
            let total = mask.iter().filter(|&&v| v != 0).count() as f64 * area_scale;
            if total <= 0.0 {
                0.0
            } else {
                (*seen as f64 / total).clamp(0.0, 1.0)
            }
        })
        .collect()
}

/// Applies `mask` as a binary cutout over the 16-bit image at `source`:
/// pixels outside the mask are invalidated to zero depth.
pub fn apply_binary_mask(source: &Path, mask: &Path, dest: &Path) -> Result<(), CaptureError> {
    let depth = image::open(source)?.to_luma16();
    let mask = image::open(mask)?.to_luma8();
    let (width, height) = depth.dimensions();

    let cut = ImageBuffer::from_fn(width, height, |x, y| {
        if mask.get_pixel(x, y).0[0] == 0 {
            image::Luma([0u16])
        } else {
            *depth.get_pixel(x, y)
        }
    });
    cut.save(dest)?;
    Ok(())
}

/// Writes one CSV row per live target instance: instance name, pose and
/// optionally the visibility ratio. Row order matches the segmap labels.
fn export_meshes_info<W: SceneOps + ?Sized>(
    scene: &W,
    path: &Path,
    live: &[InstanceId],
    ratios: Option<&[f64]>,
) -> Result<(), CaptureError> {
    let mut file = fs::File::create(path)?;
    match ratios {
        Some(_) => writeln!(
            file,
            "instance,class_id,{},visible_ratio",
            pose_header()
        )?,
        None => writeln!(file, "instance,class_id,{}", pose_header())?,
    }

    for (index, id) in live.iter().enumerate() {
        let name = scene.name(*id)?;
        let pose = scene.pose(*id)?;
        let matrix = pose.to_homogeneous();
        let cells: Vec<String> = matrix.iter().map(|v| format!("{v:.9}")).collect();
        // nalgebra stores column-major; emit row-major to match the header.
        let mut row_major = Vec::with_capacity(16);
        for row in 0..4 {
            for col in 0..4 {
                row_major.push(cells[col * 4 + row].clone());
            }
        }
        match ratios {
            Some(r) => writeln!(
                file,
                "{name},{},{},{:.6}",
                CLASS_TARGET,
                row_major.join(","),
                r[index]
            )?,
            None => writeln!(file, "{name},{},{}", CLASS_TARGET, row_major.join(","))?,
        }
    }
    Ok(())
}

fn pose_header() -> String {
    let mut cols = Vec::with_capacity(16);
    for row in 0..4 {
        for col in 0..4 {
            cols.push(format!("pose_{row}{col}"));
        }
    }
    cols.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mesh::TriMesh;
    use crate::backend::sim::SimWorld;
    use crate::scene::Pose;
    use crate::tote::Tote;
    use nalgebra::Translation3;
    use std::sync::Arc;

    fn stacked_world() -> (SimWorld, Vec<InstanceId>) {
        let tote = Tote::new(0.7, 0.7, 0.5, 0.01).unwrap();
        let mut world = SimWorld::for_tests(&tote);
        let mesh = Arc::new(TriMesh::cube(0.04));
        let mut ids = Vec::new();
        for z in [0.1, 0.3, 0.2] {
            let id = world.add_instance(
                "Model",
                mesh.clone(),
                CLASS_TARGET,
                true,
                true,
                Pose::from_parts(Translation3::new(0.0, 0.0, z), Default::default()),
            );
            ids.push(id);
        }
        (world, ids)
    }

    #[test]
    fn removes_the_highest_instance_first() {
        let (mut world, ids) = stacked_world();
        let removed = remove_highest(&mut world, CLASS_TARGET).unwrap();
        assert_eq!(removed, Some(ids[1]));
        let removed = remove_highest(&mut world, CLASS_TARGET).unwrap();
        assert_eq!(removed, Some(ids[2]));
        let removed = remove_highest(&mut world, CLASS_TARGET).unwrap();
        assert_eq!(removed, Some(ids[0]));
        assert_eq!(remove_highest(&mut world, CLASS_TARGET).unwrap(), None);
    }

    #[test]
    fn equal_heights_break_ties_by_creation_order() {
        let tote = Tote::new(0.7, 0.7, 0.5, 0.01).unwrap();
        let mut world = SimWorld::for_tests(&tote);
        let mesh = Arc::new(TriMesh::cube(0.04));
        let pose = Pose::from_parts(Translation3::new(0.0, 0.0, 0.2), Default::default());
        let first = world.add_instance("Model", mesh.clone(), CLASS_TARGET, true, true, pose);
        let second = world.add_instance("Model", mesh, CLASS_TARGET, true, true, pose);
        assert_eq!(remove_highest(&mut world, CLASS_TARGET).unwrap(), Some(first));
        assert_eq!(
            remove_highest(&mut world, CLASS_TARGET).unwrap(),
            Some(second)
        );
    }

    #[test]
    fn visibility_counts_labels_against_rescaled_mask_area() {
        // Full-resolution 8x8 segmap, masks downsampled by 2 (4x4).
        let mut labels = vec![0u16; 64];
        for i in 0..16 {
            labels[i] = 1; // instance 1: 16 visible pixels.
        }
        labels[20] = 2; // instance 2: a single visible pixel.

        // Each mask covers 4 downsampled pixels = 16 full-res pixels.
        let mut mask = vec![0u8; 16];
        mask[0] = 1;
        mask[1] = 1;
        mask[2] = 1;
        mask[3] = 1;
        let masks = vec![mask.clone(), mask];

        let ratios = visibility_ratios(&labels, &masks, 2);
        assert_eq!(ratios.len(), 2);
        assert!((ratios[0] - 1.0).abs() < 1e-12);
        assert!((ratios[1] - 1.0 / 16.0).abs() < 1e-12);
    }

    #[test]
    fn visibility_is_clipped_to_one() {
        let labels = vec![1u16; 100];
        let masks = vec![vec![1u8; 4]];
        let ratios = visibility_ratios(&labels, &masks, 2);
        assert_eq!(ratios[0], 1.0);
    }

    #[test]
    fn empty_mask_yields_zero_not_nan() {
        let labels = vec![0u16; 4];
        let masks = vec![vec![0u8; 4]];
        assert_eq!(visibility_ratios(&labels, &masks, 2), vec![0.0]);
    }

    #[test]
    fn pose_export_names_instances_by_their_scene_names() {
        let tote = Tote::new(0.7, 0.7, 0.5, 0.01).unwrap();
        let mut world = SimWorld::for_tests(&tote);
        let mesh = Arc::new(TriMesh::cube(0.04));
        let pose = Pose::from_parts(Translation3::new(0.0, 0.0, 0.1), Default::default());
        let template = world.add_instance("Model", mesh, CLASS_TARGET, true, true, pose);
        world.duplicate(template).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pose.csv");
        let live = world.instances_by_class(CLASS_TARGET);
        export_meshes_info(&world, &path, &live, None).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("Model,2,"));
        assert!(lines[2].starts_with("Model.001,2,"));
    }

    #[test]
    fn cutout_invalidates_unlit_pixels() {
        let dir = tempfile::tempdir().unwrap();
        let depth_path = dir.path().join("depth.png");
        let mask_path = dir.path().join("mask.png");

        let depth =
            ImageBuffer::from_fn(4, 4, |x, _| image::Luma([(1000 + x) as u16]));
        depth.save(&depth_path).unwrap();
        let mask = ImageBuffer::from_fn(4, 4, |x, _| {
            image::Luma([if x < 2 { 0u8 } else { 255 }])
        });
        mask.save(&mask_path).unwrap();

        apply_binary_mask(&depth_path, &mask_path, &depth_path).unwrap();
        let cut = image::open(&depth_path).unwrap().to_luma16();
        assert_eq!(cut.get_pixel(0, 0).0[0], 0);
        assert_eq!(cut.get_pixel(3, 0).0[0], 1003);
    }
}
