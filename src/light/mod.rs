///! Patch radiosity lighting of compiled BSP file

use std::collections::HashMap;

use glam::DVec3;

use crate::{
    bsp::format::BspFile,
    error::{check_capacity, Error},
    flags::SurfaceFlags,
    limits,
    map::Map,
    options::LightOptions,
    threads::ThreadPool,
};

pub mod facelight;
pub mod lights;
pub mod patches;
pub mod trace;
pub mod transfer;

use lights::Lights;
use trace::Tracer;

/// Face of compiled file, as lighting sees it
#[derive(Clone, Debug)]
pub struct FaceGeometry {
    /// Polygon points, world space
    pub points: Vec<DVec3>,

    /// Polygon points, model space
    pub local_points: Vec<DVec3>,

    /// Model origin
    pub offset: DVec3,

    /// Face normal, flipped for back sided faces
    pub normal: DVec3,

    /// Model space plane distance along the normal
    pub distance: f64,

    /// Plane index
    pub plane: usize,

    /// Face is on the back side of its plane
    pub side: bool,

    /// Texture projection vectors
    pub vecs: [[f64; 4]; 2],

    /// Face is not lit
    pub warp: bool,

    /// Face belongs to a level model
    pub level: bool,

    /// Surface light value of LIGHT faces
    pub light_value: Option<i32>,
}

/// Read only state shared by the parallel stages
pub struct LightContext<'a> {
    /// Light options
    pub options: &'a LightOptions,

    /// Occlusion tests
    pub tracer: &'a Tracer<'a>,

    /// Light sources
    pub lights: &'a Lights,
}

/// Build face geometry. None for degenerate faces.
fn face_geometry(file: &BspFile, index: usize, offset: DVec3, level: bool) -> Option<FaceGeometry> {
    let face = file.faces[index];
    let plane = *file.planes.get(face.plane as usize)?;
    let texinfo = *file.texinfo.get(face.texinfo as usize)?;

    let first_edge = usize::try_from(face.first_edge).ok()?;
    let local_points = file.surfedges
        .get(first_edge..first_edge + face.edge_count as usize)?
        .iter()
        .map(|surfedge| {
            let [first, second] = { file.edges.get(surfedge.unsigned_abs() as usize)?.v };
            let vertex = if *surfedge >= 0 { first } else { second };
            let point = file.vertexes.get(vertex as usize)?.point;

            Some(DVec3::from(point))
        })
        .collect::<Option<Vec<_>>>()?;

    if local_points.len() < 3 {
        return None;
    }

    let mut normal = DVec3::from(plane.normal);
    let mut distance = plane.distance as f64;
    let side = face.side != 0;
    if side {
        normal = -normal;
        distance = -distance;
    }

    let flags = SurfaceFlags::from_bits_retain(texinfo.flags);
    let vecs = { texinfo.vecs }.map(|vec| vec.map(|value| value as f64));

    Some(FaceGeometry {
        points: local_points.iter().map(|point| *point + offset).collect(),
        local_points,
        offset,
        normal,
        distance,
        plane: face.plane as usize,
        side,
        vecs,
        warp: flags.contains(SurfaceFlags::WARP),
        level,
        light_value: flags.contains(SurfaceFlags::LIGHT).then_some(texinfo.value),
    })
}

/// Geometry of all the file faces
fn face_geometries(file: &BspFile) -> Vec<Option<FaceGeometry>> {
    let mut faces = vec![None; file.faces.len()];

    for (model_index, model) in file.models.iter().enumerate() {
        let origin = DVec3::from(model.origin);
        let level = model_index < limits::NUM_LEVEL_MODELS;
        let first = { model.first_face }.max(0) as usize;
        let last = (first + { model.face_count }.max(0) as usize).min(faces.len());

        for index in first..last {
            faces[index] = face_geometry(file, index, origin, level);
        }
    }

    faces
}

/// Light all the faces of the file, replaces lighting lump
pub fn light_bsp(file: &mut BspFile, options: &LightOptions, pool: &ThreadPool) -> Result<(), Error> {
    let entities = Map::parse(&file.entities)?.entities;
    let faces = face_geometries(file);
    let tracer = Tracer::new(file);

    let mut patches = patches::subdivide_patches(
        patches::make_patches(&faces, options.reflectivity),
        options.patch_size,
    );
    let face_patches = patches::face_patches(&patches, faces.len());
    let lights = lights::create_direct_lights(&mut patches, &entities, options);

    let context = LightContext {
        options,
        tracer: &tracer,
        lights: &lights,
    };

    log::debug!("building facelights of {} faces", faces.len());
    let facelights = pool.try_run_on_indices(faces.len(), |index| match &faces[index] {
        Some(face) => facelight::build_facelight(face, &face_patches[index], &patches, &context),
        None => Ok(None),
    })?;

    for (index, color) in facelights.iter().flatten().flat_map(|light| light.patch_light.iter()) {
        let patch = &mut patches[*index];
        patch.sample_light += *color;
        patch.samples += 1;
    }
    for patch in &mut patches {
        if patch.samples != 0 {
            patch.sample_light /= patch.samples as f64;
        }
    }

    if options.bounce > 0 {
        log::debug!("making transfers of {} patches", patches.len());
        let transfers = pool.run_on_indices(patches.len(), |index| transfer::make_transfers(index, &patches, &tracer));
        let transfer_count = transfers.iter().map(Vec::len).sum::<usize>();

        for (patch, transfers) in patches.iter_mut().zip(transfers) {
            patch.transfers = transfers;
        }
        log::info!("{} transfers", transfer_count);

        let energies = transfer::bounce_light(&mut patches, options.bounce, pool);
        log::info!("{} bounces, {:.1} energy added", energies.len(), energies.iter().sum::<f64>());
    }

    // patches of every plane side
    let mut plane_patches = HashMap::<(usize, bool), Vec<usize>>::new();
    for (index, patch) in patches.iter().enumerate() {
        if let Some(face) = &faces[patch.face] {
            plane_patches.entry((face.plane, face.side)).or_default().push(index);
        }
    }

    log::debug!("final light");
    let lightmaps = pool.run_on_indices(faces.len(), |index| {
        let (Some(face), Some(light)) = (&faces[index], &facelights[index]) else {
            return None;
        };
        let candidates = plane_patches
            .get(&(face.plane, face.side))
            .map(Vec::as_slice)
            .unwrap_or(&[]);

        Some(facelight::final_light_face(light, candidates, &patches, &context))
    });

    let mut lighting = vec![options.light_quant as u8];
    let mut offsets = Vec::with_capacity(lightmaps.len());
    for lightmap in &lightmaps {
        match lightmap {
            Some(data) => {
                offsets.push(lighting.len() as i32);
                lighting.extend_from_slice(data);
            }
            None => offsets.push(-1),
        }
    }
    check_capacity("lighting", lighting.len(), limits::MAX_MAP_LIGHTING)?;

    log::info!(
        "{} lit faces, {} bytes of lighting",
        offsets.iter().filter(|offset| **offset >= 0).count(),
        lighting.len()
    );

    for (face, offset) in file.faces.iter_mut().zip(offsets) {
        face.light_offset = offset;
    }
    file.lighting = lighting;

    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::{
        bsp::compiler::compile_bsp,
        map::loader::tests::box_brush_text,
        options::CompileOptions,
    };

    use super::*;

    #[test]
    fn submodel_faces_are_offset() {
        let text = format!(
            "{{ \"classname\" \"worldspawn\" {{ {} }} }}\n\
            {{ \"classname\" \"func_door\" \"origin\" \"0 0 256\" {{ {} }} }}",
            box_brush_text(DVec3::ZERO, DVec3::splat(64.0), "tex/grey", ""),
            box_brush_text(DVec3::ZERO, DVec3::splat(32.0), "tex/door", ""),
        );
        let file = compile_bsp(&Map::parse(&text).unwrap(), &CompileOptions::default()).unwrap();
        let faces = face_geometries(&file);

        let door = file.models[limits::NUM_LEVEL_MODELS];
        let door_faces = &faces[door.first_face as usize..(door.first_face + door.face_count) as usize];

        assert_eq!(door_faces.len(), 6);
        for face in door_faces {
            let face = face.as_ref().unwrap();

            assert!(!face.level);
            assert_eq!(face.offset, DVec3::new(0.0, 0.0, 256.0));

            // brush is authored in world space, origin only moves it to model space
            assert!(face.points.iter().all(|point| (0.0..=32.0).contains(&point.z)));
            for (point, local) in face.points.iter().zip(&face.local_points) {
                assert_eq!(*local, *point - face.offset);
            }
        }
        assert!(faces[..door.first_face as usize].iter().flatten().all(|face| face.level));
    }

    #[test]
    fn lit_faces_get_lightmaps() {
        let text = format!(
            "{{ \"classname\" \"worldspawn\" {{ {} }} }}\n\
            {{ \"classname\" \"light\" \"origin\" \"32 32 96\" \"light\" \"200\" }}",
            box_brush_text(DVec3::ZERO, DVec3::splat(64.0), "tex/grey", ""),
        );
        let mut file = compile_bsp(&Map::parse(&text).unwrap(), &CompileOptions::default()).unwrap();
        let pool = ThreadPool::new(2).unwrap();

        light_bsp(&mut file, &LightOptions::default(), &pool).unwrap();

        assert_eq!(file.lighting[0], 4);
        assert!(file.faces.iter().all(|face| face.light_offset >= 1));

        // the top face sees the light, the bottom one doesn't
        let top = file.faces
            .iter()
            .find(|face| {
                let normal = file.planes[face.plane as usize].normal;
                let side = face.side;
                normal.z == 1.0 && side == 0
            })
            .unwrap();
        let bottom = file.faces
            .iter()
            .find(|face| {
                let normal = file.planes[face.plane as usize].normal;
                let side = face.side;
                normal.z == 1.0 && side == 1
            })
            .unwrap();

        let top_light = file.lighting[{ top.light_offset } as usize];
        let bottom_light = file.lighting[{ bottom.light_offset } as usize];
        assert!(top_light > 1);
        assert_eq!(bottom_light, 1);
    }
}

// mod.rs
