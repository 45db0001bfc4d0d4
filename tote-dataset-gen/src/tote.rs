/// Tote geometry and the axis-aligned volumes derived from it.
use nalgebra::Vector3;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ToteError {
    #[error("tote {name} must be positive, got {value}")]
    NonPositiveDimension { name: &'static str, value: f64 },
    #[error("tote walls ({thickness}) must be thinner than half the footprint")]
    WallsTooThick { thickness: f64 },
}

/// Axis-aligned box with inclusive containment tests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxBounds {
    pub min: Vector3<f64>,
    pub max: Vector3<f64>,
}

impl BoxBounds {
    pub fn new(min: Vector3<f64>, max: Vector3<f64>) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, p: &Vector3<f64>) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }

    pub fn dimensions(&self) -> Vector3<f64> {
        self.max - self.min
    }

    /// Shrinks the box by `margin` on every side in x and y only.
    pub fn inset_xy(&self, margin: f64) -> Self {
        Self {
            min: Vector3::new(self.min.x + margin, self.min.y + margin, self.min.z),
            max: Vector3::new(self.max.x - margin, self.max.y - margin, self.max.z),
        }
    }
}

/// Open-topped container the instances are placed and settled into.
///
/// The interior footprint spans `±length/2 × ±width/2` centered on the
/// origin, with the floor top at `z = thickness`. The retention volume is
/// the box every settled target instance must end up inside; anything
/// outside it after settling is pruned.
#[derive(Debug, Clone)]
pub struct Tote {
    pub length: f64,
    pub width: f64,
    pub height: f64,
    pub thickness: f64,
}

impl Tote {
    pub fn new(length: f64, width: f64, height: f64, thickness: f64) -> Result<Self, ToteError> {
        for (name, value) in [
            ("length", length),
            ("width", width),
            ("height", height),
            ("thickness", thickness),
        ] {
            if value <= 0.0 {
                return Err(ToteError::NonPositiveDimension { name, value });
            }
        }
        if thickness * 2.0 >= length.min(width) {
            return Err(ToteError::WallsTooThick { thickness });
        }
        Ok(Self {
            length,
            width,
            height,
            thickness,
        })
    }

    /// Volume candidate poses are sampled into: the interior inset by the
    /// wall thickness. Always a subset of the retention volume.
    pub fn placement_bounds(&self) -> BoxBounds {
        self.retention_bounds().inset_xy(self.thickness)
    }

    /// Volume a settled target instance must occupy to survive pruning.
    pub fn retention_bounds(&self) -> BoxBounds {
        BoxBounds::new(
            Vector3::new(-self.length / 2.0, -self.width / 2.0, self.thickness),
            Vector3::new(
                self.length / 2.0,
                self.width / 2.0,
                self.thickness + self.height,
            ),
        )
    }

    /// Interior capacity used to clamp the requested fill count.
    pub fn interior_volume(&self) -> f64 {
        self.length * self.width * self.height
    }

    /// Z coordinate of the floor top surface.
    pub fn floor_z(&self) -> f64 {
        self.thickness
    }
}
