/// Shared defaults for rendering and simulation.

/// Samples per pixel for the color pass.
pub const DEFAULT_SAMPLES: u32 = 10;

/// Maximum light bounces for the color pass.
pub const DEFAULT_MAX_BOUNCES: u32 = 3;

/// Downsampling factor for per-object silhouette masks. Mask areas must be
/// rescaled by the square of this factor to compare against full-resolution
/// areas.
pub const MASK_DOWNSAMPLE: u32 = 4;

/// Default light-occlusion threshold; reasonable range 0..0.4.
pub const DEFAULT_OBSTRUCTION: f32 = 0.2;

/// Physics substeps per simulated frame; higher is more stable.
pub const DEFAULT_SUBSTEPS_PER_FRAME: u32 = 20;

/// Wall-clock-equivalent budget for one settling call, seconds.
pub const MAX_SIMULATION_TIME: f64 = 3.0;

/// Simulated frame rate the substep count is relative to.
pub const SIMULATION_FPS: f64 = 24.0;

/// Height of the invisible catch walls used while the pile settles, meters.
pub const VIRTUAL_TOTE_HEIGHT: f64 = 100.0;

/// Upper bound for the placement spacing factor. Doubling starts at 1.0, so
/// this allows ten widening retries before the run fails.
pub const MAX_SPACING_FACTOR: f64 = 1024.0;
