///! Texture projection descriptors

use glam::DVec3;

use crate::{error::{check_capacity, Error}, flags::SurfaceFlags, limits};

/// Texture mapping, shared by faces with equal projection
#[derive(Clone, Debug, PartialEq)]
pub struct TexInfo {
    /// S and T projection vectors, `[x, y, z, offset]`
    pub vecs: [[f32; 4]; 2],

    /// Surface flags
    pub flags: SurfaceFlags,

    /// Light emission value for LIGHT surfaces
    pub value: i32,

    /// Texture name
    pub texture: String,

    /// Next frame of animated texture, -1 if none
    pub next_texinfo: i32,
}

/// Brush side texture parameters as written in map
#[derive(Clone, Debug, PartialEq)]
pub struct BrushTexture {
    /// Texture name
    pub name: String,

    /// Texture shift (in texels)
    pub shift: [f64; 2],

    /// Texture rotation (in degrees)
    pub rotate: f64,

    /// Texture scale
    pub scale: [f64; 2],

    /// Surface flags
    pub flags: SurfaceFlags,

    /// Surface value
    pub value: i32,
}

impl TexInfo {
    /// Project point to texture space
    pub fn project(&self, point: DVec3) -> [f64; 2] {
        let mut result = [0.0; 2];

        for (axis, vec) in self.vecs.iter().enumerate() {
            result[axis] = point.x * vec[0] as f64
                + point.y * vec[1] as f64
                + point.z * vec[2] as f64
                + vec[3] as f64;
        }

        result
    }

    /// Projection axis vector
    pub fn axis(&self, index: usize) -> DVec3 {
        let vec = &self.vecs[index];

        DVec3::new(vec[0] as f64, vec[1] as f64, vec[2] as f64)
    }
}

/// Find best fitting UV from pre-defined candidate set
pub fn find_texture_uv(normal: DVec3) -> (DVec3, DVec3) {
    // Candidate array contains [normal, u, v] triplets.
    const UV_CANDIDADTES: [[DVec3; 3]; 6] = [
        [
            DVec3::new(0.0, 0.0, 1.0),
            DVec3::new(1.0, 0.0, 0.0),
            DVec3::new(0.0, -1.0, 0.0),
        ], // floor
        [
            DVec3::new(0.0, 0.0, -1.0),
            DVec3::new(1.0, 0.0, 0.0),
            DVec3::new(0.0, -1.0, 0.0),
        ], // ceiling
        [
            DVec3::new(1.0, 0.0, 0.0),
            DVec3::new(0.0, 1.0, 0.0),
            DVec3::new(0.0, 0.0, -1.0),
        ], // west wall
        [
            DVec3::new(-1.0, 0.0, 0.0),
            DVec3::new(0.0, 1.0, 0.0),
            DVec3::new(0.0, 0.0, -1.0),
        ], // east wall
        [
            DVec3::new(0.0, 1.0, 0.0),
            DVec3::new(1.0, 0.0, 0.0),
            DVec3::new(0.0, 0.0, -1.0),
        ], // south wall
        [
            DVec3::new(0.0, -1.0, 0.0),
            DVec3::new(1.0, 0.0, 0.0),
            DVec3::new(0.0, 0.0, -1.0),
        ], // north wall
    ];

    let mut best_dot = 0.0;
    let mut best_candidate = &UV_CANDIDADTES[0];

    // strict comparison, so floor/ceiling win 45 degree ties
    for candidate in &UV_CANDIDADTES {
        let dot = candidate[0].dot(normal);

        if dot > best_dot {
            best_dot = dot;
            best_candidate = candidate;
        }
    }

    (best_candidate[1], best_candidate[2])
}

/// Build texinfo for brush side. `origin` is the inline model origin.
pub fn texinfo_for_brush_texture(normal: DVec3, texture: &BrushTexture, origin: DVec3) -> TexInfo {
    let (u, v) = find_texture_uv(normal);
    let mut vecs = [u, v];

    let shift = [origin.dot(u), origin.dot(v)];

    let scale = texture.scale.map(|s| if s == 0.0 { 1.0 } else { s });

    // rotate axis
    let (sinv, cosv) = match texture.rotate {
        r if r == 0.0 => (0.0, 1.0),
        r if r == 90.0 => (1.0, 0.0),
        r if r == 180.0 => (0.0, -1.0),
        r if r == 270.0 => (-1.0, 0.0),
        r => r.to_radians().sin_cos(),
    };

    let first_nonzero = |vec: DVec3| if vec.x != 0.0 {
        0
    } else if vec.y != 0.0 {
        1
    } else {
        2
    };
    let sv = first_nonzero(vecs[0]);
    let tv = first_nonzero(vecs[1]);

    for vec in &mut vecs {
        let ns = cosv * vec[sv] - sinv * vec[tv];
        let nt = sinv * vec[sv] + cosv * vec[tv];
        vec[sv] = ns;
        vec[tv] = nt;
    }

    let mut result = [[0.0f32; 4]; 2];
    for axis in 0..2 {
        for component in 0..3 {
            result[axis][component] = (vecs[axis][component] / scale[axis]) as f32;
        }
        result[axis][3] = (shift[axis] + texture.shift[axis]) as f32;
    }

    TexInfo {
        vecs: result,
        flags: texture.flags,
        value: texture.value,
        texture: texture.name.clone(),
        next_texinfo: -1,
    }
}

/// Deduplicating texinfo storage
#[derive(Default)]
pub struct TexInfoTable {
    /// Texinfo set
    infos: Vec<TexInfo>,
}

impl TexInfoTable {
    /// Create empty table
    pub fn new() -> Self {
        Self { infos: Vec::new() }
    }

    /// Find equal texinfo or add new one
    pub fn find_or_add(&mut self, info: TexInfo) -> Result<usize, Error> {
        if let Some(index) = self.infos.iter().position(|existing| *existing == info) {
            return Ok(index);
        }

        check_capacity("texinfo", self.infos.len() + 1, limits::MAX_MAP_TEXINFO)?;
        self.infos.push(info);

        Ok(self.infos.len() - 1)
    }

    /// Get texinfo by index
    pub fn get(&self, index: usize) -> &TexInfo {
        &self.infos[index]
    }

    /// All texinfos
    pub fn infos(&self) -> &[TexInfo] {
        &self.infos
    }

    /// Build table from already existing set
    pub fn from_infos(infos: Vec<TexInfo>) -> Self {
        Self { infos }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use glam::DVec3;

    use super::*;

    fn texture() -> BrushTexture {
        BrushTexture {
            name: "tex_common/grey".to_string(),
            shift: [0.0, 0.0],
            rotate: 0.0,
            scale: [1.0, 1.0],
            flags: SurfaceFlags::empty(),
            value: 0,
        }
    }

    #[test]
    fn floor_wins_diagonal_tie() {
        let (u, v) = find_texture_uv(DVec3::new(0.0, 1.0, 1.0).normalize());

        assert_eq!(u, DVec3::X);
        assert_eq!(v, DVec3::NEG_Y);
    }

    #[test]
    fn wall_projection() {
        let info = texinfo_for_brush_texture(DVec3::X, &texture(), DVec3::ZERO);
        let [s, t] = info.project(DVec3::new(5.0, 10.0, 20.0));

        assert_relative_eq!(s, 10.0);
        assert_relative_eq!(t, -20.0);
    }

    #[test]
    fn scale_and_shift() {
        let mut texture = texture();
        texture.scale = [0.5, 2.0];
        texture.shift = [4.0, 8.0];

        let info = texinfo_for_brush_texture(DVec3::Z, &texture, DVec3::ZERO);
        let [s, t] = info.project(DVec3::new(10.0, 10.0, 0.0));

        assert_relative_eq!(s, 24.0);
        assert_relative_eq!(t, 3.0);
    }

    #[test]
    fn table_deduplicates() {
        let mut table = TexInfoTable::new();
        let info = texinfo_for_brush_texture(DVec3::Z, &texture(), DVec3::ZERO);

        let a = table.find_or_add(info.clone()).unwrap();
        let b = table.find_or_add(info).unwrap();

        assert_eq!(a, b);
        assert_eq!(table.infos().len(), 1);
    }
}

// texinfo.rs
