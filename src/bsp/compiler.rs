///! WBSPC compiler implementation file

/*
1. Load map brushes: planes, texinfos, bevels, implied content flags
2. Build level models. Every level region is subdivided into cells, every
    cell gets its own chopped brush list, BSP tree, portals and faces.
    Cell trees are joined by planeless merge nodes.
3. Build inline models of brush entities over the whole world
4. Write session tables and entity string
5. Light faces with patch radiosity (unless disabled)
*/

use std::ops::Range;

use crate::{
    brush::MapBrush,
    error::Error,
    geom::BoundBox,
    light,
    limits,
    map::{self, loader, Entity, Map},
    options::CompileOptions,
    plane_table::PlaneTable,
    texinfo::TexInfoTable,
    threads::ThreadPool,
};

use super::{
    emit::Emitter,
    faces::FaceContext,
    format::BspFile,
    levels,
    tjunc::VertexPool,
};

/// Compilation session. Owns every table that lives through the whole compilation.
pub struct Session<'a> {
    /// Compiler configuration
    pub options: &'a CompileOptions,

    /// Plane pairs
    pub planes: PlaneTable,

    /// Texture projections
    pub texinfos: TexInfoTable,

    /// Map entities, worldspawn first
    pub entities: Vec<Entity>,

    /// Brush range of every entity
    pub entity_brushes: Vec<Range<usize>>,

    /// Append-only map brush arena
    pub map_brushes: Vec<MapBrush>,

    /// World brush bounds
    pub world_bounds: BoundBox,

    /// Face subdivision size
    pub subdivide_size: f64,

    /// Output vertices
    pub vertices: VertexPool,

    /// Output lumps
    pub emitter: Emitter,
}

/// Give every brush entity after the world its inline model number
fn set_model_numbers(entities: &mut [Entity], entity_brushes: &[Range<usize>]) {
    let mut model = limits::NUM_LEVEL_MODELS;

    for (entity, brushes) in entities.iter_mut().zip(entity_brushes.iter()).skip(1) {
        if !brushes.is_empty() {
            entity.set("model", format!("*{}", model));
            model += 1;
        }
    }
}

impl<'a> Session<'a> {
    /// Load map into new session
    pub fn new(map: &Map, options: &'a CompileOptions) -> Result<Self, Error> {
        let mut planes = PlaneTable::new();
        let mut texinfos = TexInfoTable::new();

        let loader::LoadedMap {
            mut entities,
            entity_brushes,
            brushes,
            world_bounds,
            subdivide_size,
        } = loader::load_map(map, &mut planes, &mut texinfos, options)?;

        set_model_numbers(&mut entities, &entity_brushes);

        let mut emitter = Emitter::new(!options.no_share);
        emitter.emit_brushes(&brushes)?;

        Ok(Self {
            options,
            planes,
            texinfos,
            entities,
            entity_brushes,
            map_brushes: brushes,
            world_bounds,
            subdivide_size,
            vertices: VertexPool::new(!options.no_weld),
            emitter,
        })
    }

    /// Face extraction context of the session
    pub fn face_context(&self) -> FaceContext<'_> {
        FaceContext {
            planes: &self.planes,
            map_brushes: &self.map_brushes,
            texinfos: &self.texinfos,
            entities: &self.entities,
            merge: !self.options.no_merge,
            subdivide_size: if self.options.no_subdiv { None } else { Some(self.subdivide_size) },
            backclip: self.options.backclip,
        }
    }

    /// Build all the models
    pub fn process_models(&mut self) -> Result<(), Error> {
        for level in 0..limits::NUM_LEVEL_MODELS {
            levels::process_level(self, level)?;
        }

        for entity in 1..self.entities.len() {
            if !self.entity_brushes[entity].is_empty() {
                levels::process_submodel(self, entity)?;
            }
        }

        Ok(())
    }

    /// Finish output file
    pub fn finish(self) -> Result<BspFile, Error> {
        let entities = map::write_entities(&self.entities);
        let file = self.emitter.finish(&self.planes, &self.texinfos, &self.vertices, entities);

        log::info!(
            "{} models, {} nodes, {} leafs, {} faces, {} vertexes, {} edges",
            file.models.len(),
            file.nodes.len(),
            file.leafs.len(),
            file.faces.len(),
            file.vertexes.len(),
            file.edges.len(),
        );

        file.check_limits()?;

        Ok(file)
    }
}

/// Build geometry of the map
pub fn compile_bsp(map: &Map, options: &CompileOptions) -> Result<BspFile, Error> {
    let mut session = Session::new(map, options)?;

    session.process_models()?;
    session.finish()
}

/// Compile map into a lit BSP file
pub fn compile(map: &Map, options: &CompileOptions, pool: &ThreadPool) -> Result<BspFile, Error> {
    let start = std::time::Instant::now();
    let mut file = compile_bsp(map, options)?;
    log::info!("bsp done in {:.2}s", start.elapsed().as_secs_f64());

    if !options.no_rad {
        let start = std::time::Instant::now();
        light::light_bsp(&mut file, &options.light, pool)?;
        log::info!("radiosity done in {:.2}s", start.elapsed().as_secs_f64());
    }

    Ok(file)
}

/// Replace entity string of compiled file with the map one, keeping geometry
pub fn update_entities(file: &mut BspFile, map: &Map, options: &CompileOptions) -> Result<(), Error> {
    let mut planes = PlaneTable::new();
    let mut texinfos = TexInfoTable::new();
    let mut loaded = loader::load_map(map, &mut planes, &mut texinfos, options)?;

    set_model_numbers(&mut loaded.entities, &loaded.entity_brushes);
    file.entities = map::write_entities(&loaded.entities);

    file.check_limits()
}

#[cfg(test)]
mod tests {
    use glam::DVec3;

    use crate::map::loader::tests::box_brush_text;

    use super::*;

    #[test]
    fn inline_models_are_numbered_after_levels() {
        let text = format!(
            "{{ \"classname\" \"worldspawn\" {{ {} }} }}\n\
            {{ \"classname\" \"func_door\" {{ {} }} }}\n\
            {{ \"classname\" \"info_player_start\" \"origin\" \"32 32 96\" }}",
            box_brush_text(DVec3::ZERO, DVec3::splat(64.0), "tex/grey", ""),
            box_brush_text(DVec3::new(128.0, 0.0, 0.0), DVec3::new(160.0, 64.0, 64.0), "tex/door", ""),
        );
        let map = Map::parse(&text).unwrap();
        let options = CompileOptions::default();

        let file = compile_bsp(&map, &options).unwrap();
        let entities = Map::parse(&file.entities).unwrap();

        assert_eq!(file.models.len(), limits::NUM_LEVEL_MODELS + 1);
        assert_eq!(entities.entities[1].get("model"), Some("*258"));
        assert_eq!(entities.entities[2].get("model"), None);

        let door = file.models[limits::NUM_LEVEL_MODELS];
        assert!({ door.head_node } >= 0);
        assert_eq!({ door.face_count }, 6);

        // only the world level with all level flags has geometry
        let filled = file.models[..limits::NUM_LEVEL_MODELS]
            .iter()
            .enumerate()
            .filter(|(_, model)| model.head_node != -1)
            .map(|(index, _)| index)
            .collect::<Vec<_>>();
        assert_eq!(filled, vec![255]);
    }

    #[test]
    fn only_entities_are_replaced() {
        let world = box_brush_text(DVec3::ZERO, DVec3::splat(64.0), "tex/grey", "");
        let map = Map::parse(&format!("{{ \"classname\" \"worldspawn\" {{ {} }} }}", world)).unwrap();
        let options = CompileOptions::default();
        let mut file = compile_bsp(&map, &options).unwrap();
        let face_count = file.faces.len();

        let map = Map::parse(&format!(
            "{{ \"classname\" \"worldspawn\" \"light_day\" \"200\" {{ {} }} }}",
            world
        )).unwrap();
        update_entities(&mut file, &map, &options).unwrap();

        assert!(file.entities.contains("\"light_day\" \"200\""));
        assert_eq!(file.faces.len(), face_count);
    }
}

// compiler.rs
