///! Level and inline model partitioning

use glam::DVec3;

use crate::{
    brush::Brush,
    csg,
    error::{check_capacity, Error},
    flags::Contents,
    geom::{self, BoundBox},
    limits,
    options::BlockRange,
};

use super::{
    builder,
    compiler::Session,
    emit::EMPTY_MODEL,
    faces,
    format,
    portals,
    tjunc,
};

/// Cells with larger horizontal extent are split
const SPLIT_BRUSH_SIZE: f64 = 256.0;

/// Level block size
const BLOCK_SIZE: f64 = 512.0;

/// Cell bounds padding brushes are taken with
const V_EPSILON: f64 = 1.0;

/// Region level cells are built in
pub fn level_region(block: &BlockRange) -> BoundBox {
    BoundBox::new(
        DVec3::new(
            block.xl as f64 * BLOCK_SIZE + 1.0,
            block.yl as f64 * BLOCK_SIZE + 1.0,
            -geom::MAX_WORLD_WIDTH + 1.0,
        ),
        DVec3::new(
            (block.xh + 1) as f64 * BLOCK_SIZE - 1.0,
            (block.yh + 1) as f64 * BLOCK_SIZE - 1.0,
            geom::MAX_WORLD_WIDTH - 1.0,
        ),
    )
}

/// Check if brush with the contents belongs to level model
pub fn is_level_brush(contents: Contents, level: usize) -> bool {
    match level {
        limits::LEVEL_WEAPONCLIP => contents.contains(Contents::WEAPONCLIP),
        limits::LEVEL_ACTORCLIP => contents.contains(Contents::ACTORCLIP),
        level => !contents.is_clip() && contents.level_mask() as usize == level,
    }
}

/// World brushes of level that aren't in any cell tree yet
fn unfinished_level_brushes(session: &Session, level: usize) -> Vec<usize> {
    session.entity_brushes[0]
        .clone()
        .filter(|index| {
            let brush = &session.map_brushes[*index];
            !brush.finished && is_level_brush(brush.contents, level)
        })
        .collect()
}

/// Build, portalize, face and emit tree of map brushes, returns head reference
fn build_region(session: &mut Session, brushes: &[usize], bounds: &BoundBox) -> Result<i32, Error> {
    let options = session.options;

    let mut list = brushes
        .iter()
        .map(|index| Brush::from_map_brush(*index, &session.map_brushes[*index]))
        .collect::<Vec<_>>();

    if !options.no_csg {
        list = csg::chop_brushes(list, &session.planes);
    }

    let mut tree = builder::build_tree(list, bounds, options.micro_volume, &mut session.planes)?;
    portals::make_tree_portals(&mut tree, &session.planes);
    portals::mark_visible_sides(&mut tree, &mut session.map_brushes, brushes.iter().copied(), &session.planes);
    faces::make_faces(&mut tree, &session.face_context())?;
    tjunc::fix_tjuncs(&mut tree, &mut session.vertices, !options.no_tjunc)?;

    session.emitter.emit_tree(&mut tree)
}

/// Build level nodes of brushes with centers inside of the cell
pub fn construct_level_nodes(session: &mut Session, level: usize, cell: &BoundBox) -> Result<i32, Error> {
    let candidates = unfinished_level_brushes(session, level);

    let centers = candidates
        .iter()
        .map(|index| (*index, session.map_brushes[*index].bounds.center()))
        .filter(|(_, center)| cell.contains_point(*center))
        .collect::<Vec<_>>();

    if centers.is_empty() {
        return Ok(EMPTY_MODEL);
    }

    let bounds = centers
        .iter()
        .fold(BoundBox::zero(), |bounds, (index, _)| bounds.total(&session.map_brushes[*index].bounds));

    let mut subtrees = Vec::with_capacity(3);
    let size = bounds.size();

    if size.x > SPLIT_BRUSH_SIZE || size.y > SPLIT_BRUSH_SIZE {
        let axis = if size.x >= size.y { 0 } else { 1 };
        let middle = bounds.center()[axis];

        let front_count = centers.iter().filter(|(_, center)| center[axis] < middle).count();

        // don't split if one of halves gets nothing
        if front_count != 0 && front_count != centers.len() {
            let mut front_cell = *cell;
            front_cell.max[axis] = middle;
            let mut back_cell = *cell;
            back_cell.min[axis] = middle;

            subtrees.push(construct_level_nodes(session, level, &front_cell)?);
            subtrees.push(construct_level_nodes(session, level, &back_cell)?);
        }
    }

    // brushes left for this cell
    let padded = bounds.extend(DVec3::splat(V_EPSILON));
    let local = unfinished_level_brushes(session, level)
        .into_iter()
        .filter(|index| padded.contains(&session.map_brushes[*index].bounds))
        .collect::<Vec<_>>();

    if !local.is_empty() {
        for index in &local {
            session.map_brushes[*index].finished = true;
        }

        log::debug!("level {}: cell with {} brushes", level, local.len());
        subtrees.push(build_region(session, &local, &padded)?);
    }

    session.emitter.join_subtrees(&subtrees)
}

/// Model of output file
fn add_model(session: &mut Session, bounds: &BoundBox, origin: DVec3, head_node: i32, first_face: usize) -> Result<(), Error> {
    let file = &mut session.emitter.file;
    check_capacity("models", file.models.len() + 1, limits::MAX_MAP_MODELS)?;

    let bounds = if bounds.is_empty() { BoundBox::new(DVec3::ZERO, DVec3::ZERO) } else { *bounds };

    file.models.push(format::Model {
        mins: bounds.min.into(),
        maxs: bounds.max.into(),
        origin: origin.into(),
        head_node,
        first_face: first_face as i32,
        face_count: (file.faces.len() - first_face) as i32,
    });

    Ok(())
}

/// Build level model
pub fn process_level(session: &mut Session, level: usize) -> Result<(), Error> {
    session.emitter.edges.begin_model();

    for index in session.entity_brushes[0].clone() {
        session.map_brushes[index].finished = false;
    }

    let first_face = session.emitter.file.faces.len();
    let region = level_region(&session.options.block);
    let head = construct_level_nodes(session, level, &region)?;

    let bounds = session.entity_brushes[0]
        .clone()
        .map(|index| &session.map_brushes[index])
        .filter(|brush| brush.finished && is_level_brush(brush.contents, level))
        .fold(BoundBox::zero(), |bounds, brush| bounds.total(&brush.bounds));

    if head != EMPTY_MODEL {
        log::info!("level {}: {} faces", level, session.emitter.file.faces.len() - first_face);
    }

    add_model(session, &bounds, DVec3::ZERO, head, first_face)
}

/// Build inline model of brush entity
pub fn process_submodel(session: &mut Session, entity: usize) -> Result<(), Error> {
    session.emitter.edges.begin_model();

    let first_face = session.emitter.file.faces.len();
    let brushes = session.entity_brushes[entity].clone().collect::<Vec<_>>();
    let world = BoundBox::new(DVec3::splat(-geom::MAX_WORLD_WIDTH), DVec3::splat(geom::MAX_WORLD_WIDTH));

    let head = build_region(session, &brushes, &world)?;

    let bounds = brushes
        .iter()
        .fold(BoundBox::zero(), |bounds, index| bounds.total(&session.map_brushes[*index].bounds));
    let origin = session.entities[entity].vector("origin");

    log::debug!("entity {} ({}): inline model", entity, session.entities[entity].classname());

    add_model(session, &bounds, origin, head, first_face)
}

#[cfg(test)]
mod tests {
    use crate::{map::{loader::tests::box_brush_text, Map}, options::CompileOptions};

    use super::*;

    #[test]
    fn level_filter() {
        let all = Contents::SOLID | Contents::LEVEL_ALL;

        assert!(is_level_brush(all, 255));
        assert!(!is_level_brush(all, 1));
        assert!(is_level_brush(Contents::SOLID | Contents::LEVEL_1, 1));
        assert!(is_level_brush(Contents::WEAPONCLIP | Contents::ACTORCLIP, limits::LEVEL_WEAPONCLIP));
        assert!(is_level_brush(Contents::WEAPONCLIP | Contents::ACTORCLIP, limits::LEVEL_ACTORCLIP));
        assert!(!is_level_brush(Contents::ACTORCLIP | Contents::LEVEL_ALL, 255));
    }

    #[test]
    fn default_region_is_shrunk_block_range() {
        let region = level_region(&BlockRange::default());

        assert_eq!(region.min, DVec3::new(-4095.0, -4095.0, -4095.0));
        assert_eq!(region.max, DVec3::new(4095.0, 4095.0, 4095.0));
    }

    #[test]
    fn distant_brushes_get_separate_cells() {
        let text = format!(
            "{{ \"classname\" \"worldspawn\" {{ {} }} {{ {} }} }}",
            box_brush_text(DVec3::ZERO, DVec3::splat(64.0), "tex/grey", ""),
            box_brush_text(DVec3::new(1024.0, 0.0, 0.0), DVec3::new(1088.0, 64.0, 64.0), "tex/grey", ""),
        );
        let map = Map::parse(&text).unwrap();
        let options = CompileOptions::default();

        let mut session = Session::new(&map, &options).unwrap();
        process_level(&mut session, 255).unwrap();

        let file = &session.emitter.file;
        let model = file.models[0];
        let head = model.head_node;

        // cells are joined by a merge node
        assert!(head >= 0);
        assert_eq!({ file.nodes[head as usize].plane }, -1);
        assert_eq!({ model.face_count }, 12);
        assert_eq!({ model.mins }, format::Vec3 { x: 0.0, y: 0.0, z: 0.0 });
        assert_eq!({ model.maxs }, format::Vec3 { x: 1088.0, y: 64.0, z: 64.0 });
        assert!(session.map_brushes.iter().all(|brush| brush.finished));
    }
}

// levels.rs
