///! Radiosity patches

use glam::DVec3;

use crate::geom::{self, Winding};

use super::FaceGeometry;

/// Patch light energy transfer
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Transfer {
    /// Receiving patch
    pub patch: usize,

    /// Transferred part, all transfers of a patch sum to `TRANSFER_SCALE`
    pub coefficient: u32,
}

/// Fixed point one of transfer coefficients
pub const TRANSFER_SCALE: u32 = 0x10000;

/// Piece of face light is exchanged between
#[derive(Clone, Debug)]
pub struct Patch {
    /// Patch polygon, world space
    pub winding: Winding,

    /// Winding center lifted off the face
    pub origin: DVec3,

    /// Face plane normal, flipped for back side faces
    pub normal: DVec3,

    /// Winding area, at least 1
    pub area: f64,

    /// Output face index
    pub face: usize,

    /// Part of incoming light that is reflected
    pub reflectivity: DVec3,

    /// Light emitted by the surface itself
    pub base_light: DVec3,

    /// Average direct light of samples lying on the patch
    pub sample_light: DVec3,

    /// Count of samples added to `sample_light`
    pub samples: usize,

    /// Light the patch emits, bounces are added here
    pub total_light: DVec3,

    /// Energy transfers to other patches
    pub transfers: Vec<Transfer>,
}

/// Normalize color so its largest channel is 1, returns that channel
pub fn color_normalize(color: DVec3) -> (f64, DVec3) {
    let max = color.max_element();

    if max == 0.0 {
        (0.0, color)
    } else {
        (max, color / max)
    }
}

impl Patch {
    /// Patch of face polygon
    pub fn new(winding: Winding, face: usize, normal: DVec3, reflectivity: DVec3, base_light: DVec3) -> Self {
        let origin = winding.center() + normal;
        let area = winding.area().max(1.0);

        Self {
            winding,
            origin,
            normal,
            area,
            face,
            reflectivity,
            base_light,
            sample_light: DVec3::ZERO,
            samples: 0,
            total_light: base_light,
            transfers: Vec::new(),
        }
    }

    /// Patch piece with the same surface attributes
    fn with_winding(&self, winding: Winding) -> Self {
        Self::new(winding, self.face, self.normal, self.reflectivity, self.base_light)
    }

    /// Split patch by the first grid line crossing it
    fn split(&self, size: f64) -> Option<(Patch, Patch)> {
        let bounds = self.winding.bounds();

        for axis in 0..3 {
            let low = ((bounds.min[axis] + 1.0) / size).floor();
            let high = ((bounds.max[axis] - 1.0) / size).floor();

            if low >= high {
                continue;
            }

            let mut normal = DVec3::ZERO;
            normal[axis] = 1.0;

            let (Some(front), Some(back)) = self.winding.clip(normal, (low + 1.0) * size, geom::ON_EPSILON) else {
                log::trace!("patch of face {} can't be split", self.face);
                return None;
            };

            return Some((self.with_winding(front), self.with_winding(back)));
        }

        None
    }
}

/// One patch per face with polygon
pub fn make_patches(faces: &[Option<FaceGeometry>], reflectivity: f64) -> Vec<Patch> {
    let reflectivity = DVec3::splat(reflectivity);
    let (_, normalized) = color_normalize(reflectivity);

    faces
        .iter()
        .enumerate()
        .filter_map(|(index, face)| {
            let face = face.as_ref()?;

            // only level models emit light
            let base_light = match face.light_value {
                Some(value) if face.level => normalized * value as f64,
                _ => DVec3::ZERO,
            };

            Some(Patch::new(Winding::new(face.points.clone()), index, face.normal, reflectivity, base_light))
        })
        .collect()
}

/// Chop patches by world grid of patch size
pub fn subdivide_patches(patches: Vec<Patch>, size: f64) -> Vec<Patch> {
    let start_count = patches.len();
    let mut result = Vec::with_capacity(patches.len());
    let mut stack = patches;
    stack.reverse();

    while let Some(patch) = stack.pop() {
        match patch.split(size) {
            Some((front, back)) => {
                stack.push(back);
                stack.push(front);
            }
            None => result.push(patch),
        }
    }

    log::debug!("{} patches subdivided into {}", start_count, result.len());

    result
}

/// Patch indices of every face
pub fn face_patches(patches: &[Patch], face_count: usize) -> Vec<Vec<usize>> {
    let mut result = vec![Vec::new(); face_count];

    for (index, patch) in patches.iter().enumerate() {
        result[patch.face].push(index);
    }

    result
}


// patches.rs
