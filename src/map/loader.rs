///! Map entities to map brushes conversion

use std::ops::Range;

use glam::DVec3;

use crate::{
    brush::{MapBrush, Side, SideFlags},
    error::{check_capacity, Error},
    flags::{Contents, SurfaceFlags},
    geom::{self, BoundBox, Plane},
    limits,
    options::CompileOptions,
    plane_table::{PlaneId, PlaneTable},
    texinfo::{texinfo_for_brush_texture, BrushTexture, TexInfoTable},
};

use super::{Brush as RawBrush, Entity, Map};

/// Loading result
pub struct LoadedMap {
    /// Entities, func_group entities and empty inline models removed
    pub entities: Vec<Entity>,

    /// Brush range of every entity in `brushes`
    pub entity_brushes: Vec<Range<usize>>,

    /// All brushes, world brushes first
    pub brushes: Vec<MapBrush>,

    /// World brush bounds
    pub world_bounds: BoundBox,

    /// Face subdivision size (worldspawn may override the configured one)
    pub subdivide_size: f64,
}

/// Brush before texture projection is known
struct PendingBrush {
    /// Brush with planes and windings set up
    brush: MapBrush,

    /// Texture of every side
    textures: Vec<BrushTexture>,
}

/// Entity classes that become inline models
fn is_inline_model(classname: &str) -> bool {
    matches!(classname, "func_breakable" | "func_door" | "func_door_sliding" | "func_rotating")
        || classname.starts_with("trigger_")
}

/// Apply content and surface flags implied by texture name
fn apply_implied_flags(name: &str, contents: &mut Contents, surface: &mut SurfaceFlags) {
    let short_name = name.strip_prefix("tex_common/").unwrap_or("");

    match short_name {
        "actorclip" => *contents |= Contents::ACTORCLIP,
        "caulk" | "nodraw" | "trigger" | "ladder" => *surface |= SurfaceFlags::NODRAW,
        "hint" => *surface |= SurfaceFlags::HINT,
        "origin" => *contents = Contents::ORIGIN,
        "weaponclip" => *contents |= Contents::WEAPONCLIP,
        _ => {
            if name.contains("water") {
                *contents |= Contents::WATER | Contents::PASSABLE;
            }
        }
    }
}

/// Side contents after all implicit rules
fn side_contents(name: &str, contents: u32, surface: u32, options: &CompileOptions) -> (Contents, SurfaceFlags) {
    let mut contents = Contents::from_bits_retain(contents);
    let mut surface = SurfaceFlags::from_bits_retain(surface);

    apply_implied_flags(name, &mut contents, &mut surface);

    if surface.is_translucent() {
        contents |= Contents::DETAIL | Contents::TRANSLUCENT | Contents::WINDOW;
        contents.remove(Contents::SOLID);
    }

    if options.full_detail {
        contents.remove(Contents::DETAIL);
    }

    if (contents.visible() | (contents & (Contents::ACTORCLIP | Contents::WEAPONCLIP | Contents::ORIGIN))).is_empty() {
        contents |= Contents::SOLID;
    }

    // hint and skip sides don't bound anything
    if surface.intersects(SurfaceFlags::HINT | SurfaceFlags::SKIP) {
        contents = Contents::empty();
    }

    (contents, surface)
}

/// Check flag combinations that make no sense
fn check_flags(contents: Contents, entity: usize, brush: usize) -> Result<(), Error> {
    if contents.contains(Contents::ACTORCLIP | Contents::PASSABLE) {
        return Err(Error::InvalidBrushFlags { entity, brush, reason: "actorclip brush can't be passable" });
    }
    if contents.is_clip() && contents.contains(Contents::SOLID) {
        return Err(Error::InvalidBrushFlags { entity, brush, reason: "clip brush can't be solid" });
    }

    Ok(())
}

/// Parse single brush. Returns `None` if brush should be skipped.
fn parse_brush(
    raw: &RawBrush,
    entity: usize,
    brush_num: usize,
    planes: &mut PlaneTable,
    options: &CompileOptions,
) -> Result<Option<PendingBrush>, Error> {
    let mut sides = Vec::<Side>::with_capacity(raw.faces.len() + 6);
    let mut textures = Vec::with_capacity(raw.faces.len() + 6);

    'face_loop: for face in &raw.faces {
        let Some(plane) = planes.from_points(face.points[0], face.points[1], face.points[2])? else {
            log::warn!("entity {}, brush {}: plane with no normal", entity, brush_num);
            continue 'face_loop;
        };

        for side in &sides {
            if side.plane == plane {
                log::warn!("entity {}, brush {}: duplicate plane", entity, brush_num);
                continue 'face_loop;
            }
            if side.plane == plane.negated() {
                log::warn!("entity {}, brush {}: mirrored plane", entity, brush_num);
                continue 'face_loop;
            }
        }

        let (contents, surface) = side_contents(&face.texture_name, face.contents, face.surface_flags, options);

        sides.push(Side {
            plane,
            texinfo: None,
            winding: None,
            original: None,
            contents,
            surface,
            flags: SideFlags::empty(),
        });

        textures.push(BrushTexture {
            name: face.texture_name.clone(),
            shift: [face.texture_offset_x, face.texture_offset_y],
            rotate: face.texture_rotation,
            scale: [face.texture_scale_x, face.texture_scale_y],
            flags: surface,
            value: face.value,
        });
    }

    let mut contents = sides
        .iter()
        .fold(Contents::empty(), |total, side| total | side.contents);

    // detail and translucency are brush-wide
    let shared = contents & (Contents::DETAIL | Contents::TRANSLUCENT);
    for side in &mut sides {
        side.contents |= shared;
    }

    if contents.level_mask() == 0 && !contents.is_clip() && !contents.contains(Contents::ORIGIN) {
        contents |= Contents::LEVEL_ALL;
    }

    check_flags(contents, entity, brush_num)?;

    if options.no_detail && contents.contains(Contents::DETAIL) {
        return Ok(None);
    }
    if options.no_water && contents.contains(Contents::WATER) {
        return Ok(None);
    }

    let mut brush = MapBrush {
        entity,
        brush_num,
        contents,
        sides,
        bounds: BoundBox::zero(),
        finished: false,
    };
    brush.make_windings(planes);

    if brush.visible_side_count() == 0 {
        log::warn!("entity {}, brush {}: no visible sides, skipped", entity, brush_num);
        return Ok(None);
    }

    let world_box = BoundBox::new(DVec3::splat(-geom::MAX_WORLD_WIDTH), DVec3::splat(geom::MAX_WORLD_WIDTH));
    if !world_box.contains(&brush.bounds) {
        log::warn!("entity {}, brush {}: bounds out of world range", entity, brush_num);
    }

    Ok(Some(PendingBrush { brush, textures }))
}

/// Move brush to inline model local space
fn adjust_for_origin(brush: &mut MapBrush, origin: DVec3, planes: &mut PlaneTable) -> Result<(), Error> {
    for side in &mut brush.sides {
        let plane = *planes.get(side.plane);
        side.plane = planes.find_or_add(plane.normal, plane.distance - plane.normal.dot(origin))?;
        side.winding = None;
        side.flags.remove(SideFlags::VISIBLE);
    }

    brush.make_windings(planes);

    Ok(())
}

/// Add axial and edge bevels, reorder axial planes
fn add_brush_bevels(brush: &mut MapBrush, planes: &mut PlaneTable) -> Result<(), Error> {
    // add the axial planes
    let mut order = 0;
    for axis in 0..3 {
        for dir in [-1.0, 1.0] {
            let found = brush.sides
                .iter()
                .position(|side| planes.get(side.plane).normal[axis] == dir);

            let index = match found {
                Some(index) => index,
                None => {
                    let mut normal = DVec3::ZERO;
                    normal[axis] = dir;
                    let distance = if dir == 1.0 { brush.bounds.max[axis] } else { -brush.bounds.min[axis] };

                    brush.sides.push(bevel_side(&brush.sides[0], planes.find_or_add(normal, distance)?));
                    brush.sides.len() - 1
                }
            };

            // put the plane to its canonical position
            brush.sides.swap(order, index);
            order += 1;
        }
    }

    let is_axial = brush.sides
        .iter()
        .all(|side| planes.get(side.plane).ty.is_axial());
    if is_axial {
        return Ok(());
    }

    // test the non-axial plane edges
    for i in 6..brush.sides.len() {
        let Some(winding) = brush.sides[i].winding.clone() else {
            continue;
        };

        for j in 0..winding.points.len() {
            let k = (j + 1) % winding.points.len();
            let edge = winding.points[j] - winding.points[k];

            if edge.length() < 0.5 {
                continue;
            }
            let edge = snap_vector(edge.normalize());

            if edge.abs().max_element() == 1.0 {
                continue;
            }

            // try the six possible slanted axials from this edge
            for axis in 0..3 {
                for dir in [-1.0, 1.0] {
                    let mut axis_vec = DVec3::ZERO;
                    axis_vec[axis] = dir;

                    let normal = edge.cross(axis_vec);
                    if normal.length() < 0.5 {
                        continue;
                    }
                    let normal = normal.normalize();
                    let distance = winding.points[j].dot(normal);

                    if !is_outer_bevel(brush, planes, normal, distance) {
                        continue;
                    }

                    let plane = planes.find_or_add(normal, distance)?;
                    brush.sides.push(bevel_side(&brush.sides[0], plane));
                }
            }
        }
    }

    Ok(())
}

/// Bevel side copying texture and contents of the first side
fn bevel_side(first: &Side, plane: PlaneId) -> Side {
    Side {
        plane,
        texinfo: first.texinfo,
        winding: None,
        original: None,
        contents: first.contents,
        surface: first.surface,
        flags: SideFlags::BEVEL,
    }
}

/// Snap nearly-axial direction
fn snap_vector(mut vector: DVec3) -> DVec3 {
    for axis in 0..3 {
        if (vector[axis] - 1.0).abs() < geom::NORMAL_EPSILON {
            vector = DVec3::ZERO;
            vector[axis] = 1.0;
            break;
        }
        if (vector[axis] + 1.0).abs() < geom::NORMAL_EPSILON {
            vector = DVec3::ZERO;
            vector[axis] = -1.0;
            break;
        }
    }

    vector
}

/// Check if all brush points lie behind the plane and the plane is not a brush side
fn is_outer_bevel(brush: &MapBrush, planes: &PlaneTable, normal: DVec3, distance: f64) -> bool {
    let candidate = Plane::new(normal, distance);

    for side in &brush.sides {
        let plane = planes.get(side.plane);

        // this plane is already used
        if true
            && (plane.normal - normal).abs().max_element() < geom::NORMAL_EPSILON
            && (plane.distance - distance).abs() < geom::DIST_EPSILON
        {
            return false;
        }

        let Some(winding) = &side.winding else {
            continue;
        };

        let mut min_back = 0.0f64;
        for point in &winding.points {
            let d = candidate.distance_to(*point);

            // point in front, not a hull plane
            if d > 0.1 {
                return false;
            }
            min_back = min_back.min(d);
        }

        // winding lies on the bevel plane
        if min_back > -0.1 {
            return false;
        }
    }

    true
}

/// Load all brushes of the map
pub fn load_map(
    map: &Map,
    planes: &mut PlaneTable,
    texinfos: &mut TexInfoTable,
    options: &CompileOptions,
) -> Result<LoadedMap, Error> {
    let Some(world) = map.entities.first() else {
        return Err(Error::NoWorldspawn);
    };
    if world.classname() != "worldspawn" {
        return Err(match map.find_entity("classname", Some("worldspawn")) {
            Some(_) => Error::FirstEntityNotWorldspawn(world.classname().to_string()),
            None => Error::NoWorldspawn,
        });
    }

    // func_group brushes are world brushes
    let mut world = world.clone();
    let mut source_entities = Vec::with_capacity(map.entities.len());
    for entity in &map.entities[1..] {
        if entity.classname() == "func_group" {
            world.brushes.extend(entity.brushes.iter().cloned());
        } else {
            source_entities.push(entity.clone());
        }
    }
    source_entities.insert(0, world);

    let mut entities = Vec::with_capacity(source_entities.len());
    let mut entity_brushes = Vec::with_capacity(source_entities.len());
    let mut brushes = Vec::<MapBrush>::new();

    for mut entity in source_entities {
        let entity_index = entities.len();
        let mut origin = if entity_index == 0 { DVec3::ZERO } else { entity.vector("origin") };
        let raw_brushes = std::mem::take(&mut entity.brushes);
        let mut pending = Vec::with_capacity(raw_brushes.len());

        for (brush_num, raw) in raw_brushes.iter().enumerate() {
            let Some(brush) = parse_brush(raw, entity_index, brush_num, planes, options)? else {
                continue;
            };

            if brush.brush.contents.contains(Contents::ORIGIN) {
                if entity_index == 0 {
                    return Err(Error::OriginBrushInWorld { entity: entity_index, brush: brush_num });
                }

                origin = brush.brush.bounds.center();
                entity.set("origin", format!("{} {} {}", origin.x as i32, origin.y as i32, origin.z as i32));
                continue;
            }

            pending.push(brush);
        }

        if entity_index != 0 && pending.is_empty() && (!raw_brushes.is_empty() || is_inline_model(entity.classname())) {
            log::warn!("entity {} ({}) has no brushes, removed", entity_index, entity.classname());
            continue;
        }

        let start = brushes.len();

        for PendingBrush { mut brush, textures } in pending {
            if origin != DVec3::ZERO {
                adjust_for_origin(&mut brush, origin, planes)?;
            }

            for (side, texture) in brush.sides.iter_mut().zip(textures.iter()) {
                let normal = planes.get(side.plane).normal;
                side.texinfo = Some(texinfos.find_or_add(texinfo_for_brush_texture(normal, texture, origin))?);
            }

            add_brush_bevels(&mut brush, planes)?;

            check_capacity("brushes", brushes.len() + 1, limits::MAX_MAP_BRUSHES)?;
            brushes.push(brush);
        }

        entity_brushes.push(start..brushes.len());
        check_capacity("entities", entities.len() + 1, limits::MAX_MAP_ENTITIES)?;
        entities.push(entity);
    }

    let world_bounds = brushes[entity_brushes[0].clone()]
        .iter()
        .fold(BoundBox::zero(), |total, brush| total.total(&brush.bounds));

    let mut subdivide_size = options.subdivide_size;
    let world_subdivide = entities[0].float("subdivide");
    if (256.0..=2048.0).contains(&world_subdivide) {
        log::info!("using subdivide size {} from worldspawn", world_subdivide);
        subdivide_size = world_subdivide;
    }

    log::info!("{} entities, {} brushes, {} planes", entities.len(), brushes.len(), planes.len());

    Ok(LoadedMap { entities, entity_brushes, brushes, world_bounds, subdivide_size })
}


// loader.rs
