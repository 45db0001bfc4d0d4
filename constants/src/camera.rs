/// Supported structured-light camera profiles.
///
/// A closed enumeration rather than a keyed table: an unknown profile name
/// is rejected before any scene state is created.
use serde::Serialize;

/// Fixed sensor parameters for one camera profile.
#[derive(Debug, Clone, Serialize)]
pub struct CameraInfo {
    pub name: &'static str,
    /// OpenCV-style 3x3 intrinsics matrix (pixels).
    pub intrinsics: [[f64; 3]; 3],
    /// Output resolution as [width, height].
    pub image_resolution: [u32; 2],
    pub distort_coeffs: [f64; 5],
    /// Meters per unit of the 16-bit depth output.
    pub depth_scale: f64,
    /// Projector / light offset from the camera along X, meters.
    pub baseline: f64,
}

pub const PHOTONEO_M: CameraInfo = CameraInfo {
    name: "Photoneo-M",
    intrinsics: [[2318.0, 0.0, 1032.0], [0.0, 2318.0, 772.0], [0.0, 0.0, 1.0]],
    image_resolution: [2064, 1544],
    distort_coeffs: [0.0, 0.0, 0.0, 0.0, 0.0],
    depth_scale: 0.0001,
    baseline: 0.35,
};

pub const PHOTONEO_L: CameraInfo = CameraInfo {
    name: "Photoneo-L",
    intrinsics: [[2345.0, 0.0, 1032.0], [0.0, 2345.0, 772.0], [0.0, 0.0, 1.0]],
    image_resolution: [2064, 1544],
    distort_coeffs: [0.0, 0.0, 0.0, 0.0, 0.0],
    depth_scale: 0.0001,
    baseline: 0.55,
};

pub const XYZ_SL: CameraInfo = CameraInfo {
    name: "XYZ-SL",
    intrinsics: [[2413.0, 0.0, 1024.0], [0.0, 2413.0, 768.0], [0.0, 0.0, 1.0]],
    image_resolution: [2048, 1536],
    distort_coeffs: [0.0, 0.0, 0.0, 0.0, 0.0],
    depth_scale: 0.00005,
    baseline: 0.25,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraProfile {
    PhotoneoM,
    PhotoneoL,
    XyzSl,
}

impl CameraProfile {
    pub const ALL: &'static [CameraProfile] = &[
        CameraProfile::PhotoneoM,
        CameraProfile::PhotoneoL,
        CameraProfile::XyzSl,
    ];

    /// Validated lookup by the profile's public name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Photoneo-M" => Some(CameraProfile::PhotoneoM),
            "Photoneo-L" => Some(CameraProfile::PhotoneoL),
            "XYZ-SL" => Some(CameraProfile::XyzSl),
            _ => None,
        }
    }

    pub fn info(&self) -> &'static CameraInfo {
        match self {
            CameraProfile::PhotoneoM => &PHOTONEO_M,
            CameraProfile::PhotoneoL => &PHOTONEO_L,
            CameraProfile::XyzSl => &XYZ_SL,
        }
    }

    pub fn name(&self) -> &'static str {
        self.info().name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_accepts_known_profiles() {
        for profile in CameraProfile::ALL {
            assert_eq!(CameraProfile::from_name(profile.name()), Some(*profile));
        }
    }

    #[test]
    fn lookup_rejects_unknown_profiles() {
        assert_eq!(CameraProfile::from_name("Photoneo-XL"), None);
        assert_eq!(CameraProfile::from_name(""), None);
    }
}
