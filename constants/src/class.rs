/// Semantic class codes attached to every scene instance.
///
/// The class id filters bulk operations: only target-class instances are
/// pruned, picked and labeled in the instance segmentation map.
pub const CLASS_ENVIRONMENT: u8 = 0;
pub const CLASS_TOTE: u8 = 1;
pub const CLASS_TARGET: u8 = 2;
