use std::error::Error;
use std::path::PathBuf;

use clap::Parser;
use constants::CameraProfile;
use tote_dataset_gen::config::{ConfigError, GenerationConfig};
use tote_dataset_gen::render::{ChannelConfig, RenderSettings};
use tote_dataset_gen::run_generation;
use tote_dataset_gen::tote::Tote;

/// Synthetic bin-picking dataset generator.
#[derive(Debug, Parser)]
#[command(version, about = "Generate annotated deep-tote picking datasets")]
struct Args {
    /// Dataset output directory; cleared before the run.
    #[arg(long, default_value = "output/deep_tote")]
    output_dir: PathBuf,

    /// Camera profile: Photoneo-M, Photoneo-L or XYZ-SL.
    #[arg(long, default_value = "XYZ-SL")]
    camera_type: String,

    /// Camera height above the floor, meters.
    #[arg(long, default_value_t = 2.0)]
    camera_height: f64,

    /// Light-occlusion threshold in [0, 0.4]; higher obstructs more depth.
    #[arg(long, default_value_t = 0.2)]
    obstruction: f32,

    /// Tote interior dimensions and wall thickness, meters.
    #[arg(long, default_value_t = 0.7)]
    tote_length: f64,
    #[arg(long, default_value_t = 0.7)]
    tote_width: f64,
    #[arg(long, default_value_t = 0.5)]
    tote_height: f64,
    #[arg(long, default_value_t = 0.01)]
    tote_thickness: f64,

    /// CAD model to fill the tote with (binary STL).
    #[arg(long)]
    model_path: PathBuf,

    /// Rescale the model so its largest dimension matches this, meters.
    /// Zero keeps the original size.
    #[arg(long, default_value_t = 0.0)]
    model_max_dimension: f64,

    /// Face budget the model is decimated down to.
    #[arg(long, default_value_t = 10_000)]
    max_faces: usize,

    /// How many times the tote is refilled from scratch.
    #[arg(long, default_value_t = 2)]
    num_regen: u32,

    /// Instance count the tote starts with.
    #[arg(long, default_value_t = 30)]
    num_begin: u32,

    /// Instance count left when a regeneration stops.
    #[arg(long, default_value_t = 0)]
    num_end: u32,

    /// Instances removed per pick step.
    #[arg(long, default_value_t = 5)]
    num_pick: u32,

    #[arg(long, default_value_t = 10)]
    samples: u32,

    #[arg(long, default_value_t = 3)]
    max_bounces: u32,

    #[arg(long, default_value_t = 20)]
    substeps_per_frame: u32,

    /// Keep the raw depth render instead of the light-occlusion cutout.
    #[arg(long)]
    enable_perfect_depth: bool,

    #[arg(long)]
    enable_instance_segmap: bool,

    #[arg(long)]
    enable_object_masks: bool,

    #[arg(long)]
    enable_class_segmap: bool,

    /// Write per-instance poses (and visibility, when both segmentation
    /// channels are enabled) for every frame.
    #[arg(long)]
    enable_mesh_info: bool,

    /// Reproducibility seed; drawn at random and recorded if omitted.
    #[arg(long)]
    seed: Option<u64>,
}

impl Args {
    fn into_config(self) -> Result<GenerationConfig, Box<dyn Error>> {
        let camera = CameraProfile::from_name(&self.camera_type)
            .ok_or_else(|| ConfigError::UnknownCameraProfile(self.camera_type.clone()))?;
        let tote = Tote::new(
            self.tote_length,
            self.tote_width,
            self.tote_height,
            self.tote_thickness,
        )?;
        Ok(GenerationConfig {
            output_dir: self.output_dir,
            camera,
            camera_height: self.camera_height,
            tote,
            model_path: self.model_path,
            model_max_dimension: self.model_max_dimension,
            max_faces: self.max_faces,
            num_regen: self.num_regen,
            num_begin: self.num_begin,
            num_end: self.num_end,
            num_pick: self.num_pick,
            substeps_per_frame: self.substeps_per_frame,
            render: RenderSettings {
                samples: self.samples,
                max_bounces: self.max_bounces,
                obstruction: self.obstruction,
                ..RenderSettings::default()
            },
            channels: ChannelConfig {
                perfect_depth: self.enable_perfect_depth,
                instance_segmap: self.enable_instance_segmap,
                object_masks: self.enable_object_masks,
                class_segmap: self.enable_class_segmap,
                mesh_info: self.enable_mesh_info,
            },
            seed: self.seed,
        })
    }
}

fn main() {
    if let Err(err) = try_main() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<(), Box<dyn Error>> {
    let config = Args::parse().into_config()?;
    let frames = run_generation(&config)?;
    println!("Generated {} frames", frames.len());
    Ok(())
}
