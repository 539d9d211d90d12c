///! Face lightmap sampling and final light

use glam::DVec3;

use crate::{error::Error, limits};

use super::{
    lights::{Lights, DIRECT_LIGHT},
    patches::Patch,
    trace::Tracer,
    FaceGeometry,
    LightContext,
};

/// Distance sun rays are traced to
const SUN_DISTANCE: f64 = 8192.0;

/// Sample is added to patches with bounds extended by this value
const PATCH_SAMPLE_EPSILON: f64 = 8.0;

/// Distance sample is pushed toward face center and off the face
const SAMPLE_PUSH: f64 = 0.5;

/// Sample offsets used with extra samples, in lightmap texels
const EXTRA_SAMPLE_OFFSETS: [[f64; 2]; 5] = [
    [0.0, 0.0],
    [-0.4, -0.4],
    [0.4, -0.4],
    [0.4, 0.4],
    [-0.4, 0.4],
];

/// Lightmap texel to world mapping of a face
#[derive(Copy, Clone, Debug)]
pub struct LightmapProjection {
    /// World point with zero texture coordinates, lies on the face plane
    pub origin: DVec3,

    /// World offsets of one texture unit along S and T
    pub axes: [DVec3; 2],

    /// First lightmap texel coordinates
    pub mins: [i32; 2],

    /// Lightmap size in texels minus one
    pub size: [usize; 2],

    /// Texture units per lightmap texel
    pub step: f64,
}

impl LightmapProjection {
    /// Build projection of face. None if texture axes are parallel to the face.
    pub fn new(face: &FaceGeometry, step: f64) -> Result<Option<Self>, Error> {
        let world_to_tex = face.vecs.map(|vec| DVec3::new(vec[0], vec[1], vec[2]));

        let Some(mut tex_normal) = world_to_tex[1].cross(world_to_tex[0]).try_normalize() else {
            return Ok(None);
        };

        let mut dist_scale = tex_normal.dot(face.normal);
        if dist_scale.abs() < 0.0001 {
            log::warn!("texture axes of face on plane {} are parallel to it", face.plane);
            return Ok(None);
        }
        if dist_scale < 0.0 {
            dist_scale = -dist_scale;
            tex_normal = -tex_normal;
        }
        let dist_scale = 1.0 / dist_scale;

        // texture axes projected onto the face along texture normal
        let axes = world_to_tex.map(|axis| {
            let distance = axis.dot(face.normal) * dist_scale;
            (axis - tex_normal * distance) / axis.length_squared()
        });

        let mut origin = -axes[0] * face.vecs[0][3] - axes[1] * face.vecs[1][3];
        let distance = (origin.dot(face.normal) - face.distance) * dist_scale;
        origin -= tex_normal * distance;
        origin += face.offset;

        // texture extents
        let mut mins = [f64::MAX; 2];
        let mut maxs = [f64::MIN; 2];
        for point in &face.local_points {
            for axis in 0..2 {
                let value = world_to_tex[axis].dot(*point) + face.vecs[axis][3];
                mins[axis] = mins[axis].min(value);
                maxs[axis] = maxs[axis].max(value);
            }
        }

        let texel_mins = mins.map(|value| (value / step).floor());
        let size = [
            ((maxs[0] / step).ceil() - texel_mins[0]).max(0.0) as usize,
            ((maxs[1] / step).ceil() - texel_mins[1]).max(0.0) as usize,
        ];

        if (size[0] + 1) * (size[1] + 1) > limits::SINGLEMAP {
            return Err(Error::SurfaceTooLarge { width: size[0] + 1, height: size[1] + 1 });
        }

        Ok(Some(Self {
            origin,
            axes,
            mins: texel_mins.map(|value| value as i32),
            size,
            step,
        }))
    }

    /// Count of lightmap samples
    pub fn sample_count(&self) -> usize {
        (self.size[0] + 1) * (self.size[1] + 1)
    }

    /// World position of texel, `offset` is in texels
    pub fn sample_point(&self, s: usize, t: usize, offset: [f64; 2]) -> DVec3 {
        let us = (self.mins[0] as f64 + s as f64 + offset[0]) * self.step;
        let ut = (self.mins[1] as f64 + t as f64 + offset[1]) * self.step;

        self.origin + self.axes[0] * us + self.axes[1] * ut
    }
}

/// Direct light of a face
#[derive(Clone, Debug, Default)]
pub struct FaceLight {
    /// Light of every sample, row by row
    pub samples: Vec<DVec3>,

    /// Positions the samples were gathered at
    pub points: Vec<DVec3>,

    /// Sample light to add to face patches
    pub patch_light: Vec<(usize, DVec3)>,
}

/// Direct light reaching the point
fn gather_sample_light(point: DVec3, normal: DVec3, lights: &Lights, tracer: &Tracer) -> DVec3 {
    let mut light = DVec3::ZERO;

    for direct in &lights.direct {
        let delta = direct.origin - point;
        let distance = delta.length();
        let Some(direction) = delta.try_normalize() else {
            continue;
        };

        let Some(scale) = direct.scale(direction, distance, normal) else {
            continue;
        };

        if tracer.test_line(point, direct.origin) {
            continue;
        }

        light += direct.color * scale;
    }

    if let Some(sun) = &lights.sun {
        let dot = sun.direction.dot(normal);

        if dot > 0.001 && !tracer.test_line(point, point + sun.direction * SUN_DISTANCE) {
            light += sun.color * (sun.intensity * dot);
        }
    }

    light
}

/// Gather direct light of all the face samples. None for unlit faces.
pub fn build_facelight(
    face: &FaceGeometry,
    face_patches: &[usize],
    patches: &[Patch],
    context: &LightContext,
) -> Result<Option<FaceLight>, Error> {
    if face.warp {
        return Ok(None);
    }

    let step = (1u32 << context.options.light_quant) as f64;
    let Some(projection) = LightmapProjection::new(face, step)? else {
        return Ok(None);
    };

    let offsets = if context.options.extra_samples {
        &EXTRA_SAMPLE_OFFSETS[..]
    } else {
        &EXTRA_SAMPLE_OFFSETS[..1]
    };
    let weight = 1.0 / offsets.len() as f64;

    let center = face.points.iter().copied().sum::<DVec3>() / face.points.len() as f64;
    let push = |point: DVec3| {
        point + (center - point).normalize_or_zero() * SAMPLE_PUSH + face.normal * SAMPLE_PUSH
    };

    let mut result = FaceLight {
        samples: Vec::with_capacity(projection.sample_count()),
        points: Vec::with_capacity(projection.sample_count()),
        patch_light: Vec::new(),
    };

    for t in 0..=projection.size[1] {
        for s in 0..=projection.size[0] {
            let light = offsets
                .iter()
                .map(|offset| {
                    let point = push(projection.sample_point(s, t, *offset));
                    gather_sample_light(point, face.normal, context.lights, context.tracer) * weight
                })
                .sum::<DVec3>();

            let origin = projection.sample_point(s, t, [0.0, 0.0]);

            if context.options.bounce > 0 && light.element_sum() >= DIRECT_LIGHT {
                for index in face_patches {
                    let bounds = patches[*index].winding.bounds().extend(DVec3::splat(PATCH_SAMPLE_EPSILON));

                    if bounds.contains_point(origin) {
                        result.patch_light.push((*index, light));
                    }
                }
            }

            result.samples.push(light);
            result.points.push(push(origin));
        }
    }

    // emitting surfaces light themselves
    if let Some(first) = face_patches.first() {
        let base_light = patches[*first].base_light;

        if base_light.max_element() >= DIRECT_LIGHT {
            for sample in &mut result.samples {
                *sample += base_light;
            }
        }
    }

    Ok(Some(result))
}

/// Distance weighted total light of visible patches near the point
fn interpolate_bounce(point: DVec3, candidates: &[usize], patches: &[Patch], radius: f64, tracer: &Tracer) -> DVec3 {
    let mut light = DVec3::ZERO;
    let mut total_weight = 0.0;

    for index in candidates {
        let patch = &patches[*index];
        let distance2 = patch.origin.distance_squared(point);

        if distance2 > radius * radius || tracer.test_line(point, patch.origin) {
            continue;
        }

        let weight = 1.0 / distance2.max(1.0);
        light += patch.total_light * weight;
        total_weight += weight;
    }

    if total_weight == 0.0 {
        DVec3::ZERO
    } else {
        light / total_weight
    }
}

/// Final RGB lightmap of face. `candidates` are patches of faces lying on the same plane side.
pub fn final_light_face(facelight: &FaceLight, candidates: &[usize], patches: &[Patch], context: &LightContext) -> Vec<u8> {
    let options = context.options;
    let radius = options.patch_size * 2.0;

    let mut data = Vec::with_capacity(facelight.samples.len() * 3);

    for (sample, point) in facelight.samples.iter().zip(&facelight.points) {
        let mut light = *sample;

        if options.bounce > 0 {
            light += interpolate_bounce(*point, candidates, patches, radius, context.tracer);
        }

        light = ((light + context.lights.ambient) * options.light_scale).max(DVec3::ONE);

        // scale down keeping hue
        let max = light.max_element();
        if max > options.max_light {
            light *= options.max_light / max;
        }

        data.extend(light.to_array().map(|channel| channel as u8));
    }

    data
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn floor_face(size: f64, offset: DVec3) -> FaceGeometry {
        let local_points = vec![
            DVec3::new(0.0, 0.0, 0.0),
            DVec3::new(0.0, size, 0.0),
            DVec3::new(size, size, 0.0),
            DVec3::new(size, 0.0, 0.0),
        ];

        FaceGeometry {
            points: local_points.iter().map(|point| *point + offset).collect(),
            local_points,
            offset,
            normal: DVec3::Z,
            distance: 0.0,
            plane: 0,
            side: false,
            vecs: [[1.0, 0.0, 0.0, 0.0], [0.0, -1.0, 0.0, 0.0]],
            warp: false,
            level: true,
            light_value: None,
        }
    }

    #[test]
    fn samples_lie_on_face() {
        let offset = DVec3::new(0.0, 0.0, 32.0);
        let projection = LightmapProjection::new(&floor_face(64.0, offset), 16.0).unwrap().unwrap();

        assert_eq!(projection.size, [4, 4]);
        assert_eq!(projection.sample_count(), 25);

        let first = projection.sample_point(0, 0, [0.0, 0.0]);
        let last = projection.sample_point(4, 4, [0.0, 0.0]);
        assert_relative_eq!(first.z, 32.0, epsilon = 1e-9);
        assert_relative_eq!(first.x, 0.0, epsilon = 1e-9);
        assert_relative_eq!(last.x, 64.0, epsilon = 1e-9);

        // T axis points to -Y
        assert_relative_eq!(first.y, 64.0, epsilon = 1e-9);
        assert_relative_eq!(last.y, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn huge_surface_is_rejected() {
        let result = LightmapProjection::new(&floor_face(8192.0, DVec3::ZERO), 16.0);

        assert!(matches!(result, Err(Error::SurfaceTooLarge { width: 513, height: 513 })));
    }
}

// facelight.rs
