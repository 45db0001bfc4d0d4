/// Software render backend: pinhole z-buffer rasterization of the scene.
///
/// Implements the `RenderOps` contract with deterministic output. Samples,
/// bounce and denoiser settings are accepted for contract parity; shading
/// is single-bounce Lambert against the offset light.
use std::collections::HashMap;
use std::path::Path;

use constants::CLASS_TARGET;
use image::{ImageBuffer, Luma};
use nalgebra::Vector3;
use rayon::prelude::*;

use crate::backend::mesh::triangle_normal;
use crate::backend::sim::{CameraRig, SimWorld};
use crate::render::{RenderError, RenderOps, RenderSettings};
use crate::scene::{InstanceId, SceneOps};

const NEAR_PLANE: f64 = 1e-6;

/// Per-pixel buffers for one rasterization pass.
struct RasterBuffers {
    width: u32,
    height: u32,
    /// Camera-space depth, infinity where no geometry was hit.
    depth: Vec<f64>,
    /// World position of the hit surface point.
    world: Vec<Vector3<f64>>,
    /// 1-based target instance label, 0 for background and non-targets.
    instance: Vec<u16>,
    class: Vec<u8>,
    shade: Vec<f32>,
}

impl RasterBuffers {
    fn new(width: u32, height: u32) -> Self {
        let len = (width * height) as usize;
        Self {
            width,
            height,
            depth: vec![f64::INFINITY; len],
            world: vec![Vector3::zeros(); len],
            instance: vec![0; len],
            class: vec![0; len],
            shade: vec![0.0; len],
        }
    }
}

impl SimWorld {
    /// Rasterizes visible instances through `rig` at `1/scale` resolution.
    /// `only` restricts the pass to a single instance (used for silhouette
    /// masks).
    fn rasterize(&self, rig: &CameraRig, scale: u32, only: Option<InstanceId>) -> RasterBuffers {
        let width = rig.width / scale;
        let height = rig.height / scale;
        let fx = rig.fx / scale as f64;
        let fy = rig.fy / scale as f64;
        let cx = rig.cx / scale as f64;
        let cy = rig.cy / scale as f64;
        let mut buffers = RasterBuffers::new(width, height);

        let labels: HashMap<InstanceId, u16> = self
            .instances_by_class(CLASS_TARGET)
            .into_iter()
            .enumerate()
            .map(|(index, id)| (id, (index + 1) as u16))
            .collect();

        for instance in self.instances() {
            if !instance.visible {
                continue;
            }
            if let Some(id) = only {
                if instance.id != id {
                    continue;
                }
            }
            let label = labels.get(&instance.id).copied().unwrap_or(0);

            for tri in &instance.mesh.triangles {
                let world: [Vector3<f64>; 3] = [
                    instance.pose.transform_point(&tri[0].into()).coords,
                    instance.pose.transform_point(&tri[1].into()).coords,
                    instance.pose.transform_point(&tri[2].into()).coords,
                ];

                let mut screen = [[0.0f64; 3]; 3];
                let mut clipped = false;
                for (i, p) in world.iter().enumerate() {
                    let cam = rig.world_to_cam * (p - rig.position);
                    if cam.z <= NEAR_PLANE {
                        clipped = true;
                        break;
                    }
                    screen[i] = [fx * cam.x / cam.z + cx, fy * cam.y / cam.z + cy, cam.z];
                }
                if clipped {
                    continue;
                }

                let shade = self.face_shade(&world);
                fill_triangle(
                    &mut buffers,
                    &screen,
                    &world,
                    label,
                    instance.class_id,
                    shade,
                );
            }
        }
        buffers
    }

    fn face_shade(&self, world: &[Vector3<f64>; 3]) -> f32 {
        let normal = triangle_normal(world);
        let centroid = (world[0] + world[1] + world[2]) / 3.0;
        let to_light = self.light - centroid;
        let diffuse = if to_light.norm() > 0.0 {
            normal.dot(&to_light.normalize()).abs()
        } else {
            0.0
        };
        ((0.2 * self.background_light + 0.8 * diffuse).clamp(0.0, 1.0)) as f32
    }

    /// Binary light-occlusion mask: a pixel is unlit when its surface point
    /// is shadowed from the offset light. The shadow-depth tolerance
    /// shrinks as `threshold` grows, widening the occluded region.
    fn light_occlusion(&self, threshold: f32) -> Vec<u8> {
        let camera_pass = self.rasterize(&self.camera, 1, None);
        let light_rig = self.camera.relocated(self.light);
        let light_pass = self.rasterize(&light_rig, 1, None);
        let bias = 0.05 * (0.41 - threshold.clamp(0.0, 0.4) as f64);

        camera_pass
            .depth
            .iter()
            .zip(&camera_pass.world)
            .map(|(depth, point)| {
                if depth.is_infinite() {
                    // No geometry; nothing to invalidate.
                    return 255u8;
                }
                let cam = light_rig.world_to_cam * (point - light_rig.position);
                if cam.z <= NEAR_PLANE {
                    return 0;
                }
                let u = (light_rig.fx * cam.x / cam.z + light_rig.cx).round() as i64;
                let v = (light_rig.fy * cam.y / cam.z + light_rig.cy).round() as i64;
                if u < 0 || v < 0 || u >= light_pass.width as i64 || v >= light_pass.height as i64 {
                    return 0;
                }
                let seen = light_pass.depth[(v as u32 * light_pass.width + u as u32) as usize];
                if cam.z - seen > bias { 0 } else { 255 }
            })
            .collect()
    }
}

/// Two-sided screen-space fill with linear depth interpolation.
fn fill_triangle(
    buffers: &mut RasterBuffers,
    screen: &[[f64; 3]; 3],
    world: &[Vector3<f64>; 3],
    label: u16,
    class_id: u8,
    shade: f32,
) {
    let area = edge(&screen[0], &screen[1], screen[2][0], screen[2][1]);
    if area.abs() < 1e-12 {
        return;
    }

    let min_x = screen.iter().map(|p| p[0]).fold(f64::INFINITY, f64::min);
    let max_x = screen
        .iter()
        .map(|p| p[0])
        .fold(f64::NEG_INFINITY, f64::max);
    let min_y = screen.iter().map(|p| p[1]).fold(f64::INFINITY, f64::min);
    let max_y = screen
        .iter()
        .map(|p| p[1])
        .fold(f64::NEG_INFINITY, f64::max);

    let x0 = (min_x.floor().max(0.0)) as u32;
    let x1 = (max_x.ceil().min(buffers.width as f64 - 1.0)) as u32;
    let y0 = (min_y.floor().max(0.0)) as u32;
    let y1 = (max_y.ceil().min(buffers.height as f64 - 1.0)) as u32;
    if min_x > buffers.width as f64 || max_x < 0.0 || min_y > buffers.height as f64 || max_y < 0.0 {
        return;
    }

    for py in y0..=y1 {
        for px in x0..=x1 {
            let sx = px as f64 + 0.5;
            let sy = py as f64 + 0.5;
            let w0 = edge(&screen[1], &screen[2], sx, sy) / area;
            let w1 = edge(&screen[2], &screen[0], sx, sy) / area;
            let w2 = 1.0 - w0 - w1;
            if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                continue;
            }

            let z = w0 * screen[0][2] + w1 * screen[1][2] + w2 * screen[2][2];
            let index = (py * buffers.width + px) as usize;
            if z < buffers.depth[index] {
                buffers.depth[index] = z;
                buffers.world[index] = world[0] * w0 + world[1] * w1 + world[2] * w2;
                buffers.instance[index] = label;
                buffers.class[index] = class_id;
                buffers.shade[index] = shade;
            }
        }
    }
}

fn edge(a: &[f64; 3], b: &[f64; 3], x: f64, y: f64) -> f64 {
    (b[0] - a[0]) * (y - a[1]) - (b[1] - a[1]) * (x - a[0])
}

impl RenderOps for SimWorld {
    fn render_color(&mut self, path: &Path, _settings: &RenderSettings) -> Result<(), RenderError> {
        let pass = self.rasterize(&self.camera, 1, None);
        let img = ImageBuffer::from_fn(pass.width, pass.height, |x, y| {
            let index = (y * pass.width + x) as usize;
            Luma([(pass.shade[index] * 255.0).round() as u8])
        });
        img.save(path)?;
        Ok(())
    }

    fn render_depth(&mut self, path: &Path, depth_scale: f64) -> Result<(), RenderError> {
        if depth_scale <= 0.0 {
            return Err(RenderError::Pass(format!(
                "depth scale must be positive, got {depth_scale}"
            )));
        }
        let pass = self.rasterize(&self.camera, 1, None);
        let img = ImageBuffer::from_fn(pass.width, pass.height, |x, y| {
            let index = (y * pass.width + x) as usize;
            let depth = pass.depth[index];
            if depth.is_infinite() {
                Luma([0u16])
            } else {
                Luma([(depth / depth_scale).round().clamp(0.0, 65535.0) as u16])
            }
        });
        img.save(path)?;
        Ok(())
    }

    fn render_light_mask(&mut self, path: &Path, threshold: f32) -> Result<(), RenderError> {
        let mask = self.light_occlusion(threshold);
        let (width, height) = self.resolution();
        let img = ImageBuffer::from_fn(width, height, |x, y| {
            Luma([mask[(y * width + x) as usize]])
        });
        img.save(path)?;
        Ok(())
    }

    fn render_instance_segmap(&mut self, path: &Path) -> Result<Vec<u16>, RenderError> {
        let pass = self.rasterize(&self.camera, 1, None);
        let img = ImageBuffer::from_fn(pass.width, pass.height, |x, y| {
            Luma([pass.instance[(y * pass.width + x) as usize]])
        });
        img.save(path)?;
        Ok(pass.instance)
    }

    fn render_object_masks(
        &mut self,
        path: &Path,
        downsample: u32,
    ) -> Result<Vec<Vec<u8>>, RenderError> {
        if downsample == 0 {
            return Err(RenderError::Pass("downsample must be positive".into()));
        }
        let targets = self.instances_by_class(CLASS_TARGET);
        let world: &SimWorld = self;
        let rig = &world.camera;
        let masks: Vec<Vec<u8>> = targets
            .par_iter()
            .map(|id| {
                let pass = world.rasterize(rig, downsample, Some(*id));
                pass.depth
                    .iter()
                    .map(|d| if d.is_finite() { 1u8 } else { 0 })
                    .collect()
            })
            .collect();

        // All masks stacked vertically into one sheet; a blank sheet when
        // the container is already empty.
        let width = rig.width / downsample;
        let height = rig.height / downsample;
        let rows = (masks.len().max(1) as u32) * height;
        let img = ImageBuffer::from_fn(width, rows, |x, y| {
            let mask_index = (y / height) as usize;
            let value = masks
                .get(mask_index)
                .map(|mask| mask[((y % height) * width + x) as usize])
                .unwrap_or(0);
            Luma([value * 255])
        });
        img.save(path)?;
        Ok(masks)
    }

    fn render_class_segmap(&mut self, path: &Path) -> Result<(), RenderError> {
        let pass = self.rasterize(&self.camera, 1, None);
        let img = ImageBuffer::from_fn(pass.width, pass.height, |x, y| {
            Luma([pass.class[(y * pass.width + x) as usize]])
        });
        img.save(path)?;
        Ok(())
    }

    fn resolution(&self) -> (u32, u32) {
        (self.camera.width, self.camera.height)
    }
}
