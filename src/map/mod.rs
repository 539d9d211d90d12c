///! Source map and entity representation

use glam::DVec3;

/// .map text parser
pub mod parser;

/// Map brushes to BSP brushes conversion
pub mod loader;

/// Single brush face, as written in map
#[derive(Clone, Debug)]
pub struct BrushFace {
    /// Plane points, clockwise if watched from the front
    pub points: [DVec3; 3],

    /// Brush texture name
    pub texture_name: String,

    /// Texture offset by X (in texels)
    pub texture_offset_x: f64,

    /// Texture offset by Y (in texels)
    pub texture_offset_y: f64,

    /// Texture rotation (in degrees)
    pub texture_rotation: f64,

    /// Texture scale by X
    pub texture_scale_x: f64,

    /// Texture scale by Y
    pub texture_scale_y: f64,

    /// Content flags, 0 if omitted
    pub contents: u32,

    /// Surface flags, 0 if omitted
    pub surface_flags: u32,

    /// Surface value, 0 if omitted
    pub value: i32,
}

/// Map brush
#[derive(Clone, Debug)]
pub struct Brush {
    /// Face set
    pub faces: Vec<BrushFace>,
}

/// Map entity (brush set and ordered string-string property collection)
#[derive(Clone, Debug, Default)]
pub struct Entity {
    /// Entity properties, in file order
    pub properties: Vec<(String, String)>,

    /// Entity brush set
    pub brushes: Vec<Brush>,
}

/// Map (entity collection, actually)
#[derive(Clone, Debug, Default)]
pub struct Map {
    /// All map entities
    pub entities: Vec<Entity>,
}

/// Parse 'x y z' vector property value
pub fn parse_vector(value: &str) -> Option<DVec3> {
    let flt_arr = value
        .split_whitespace()
        .map(|str| str.parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .ok()?;

    let [x, y, z] = flt_arr.get(..)? else {
        return None;
    };

    Some(DVec3::new(*x, *y, *z))
}

/// Write entity properties in map text format
pub fn write_entities(entities: &[Entity]) -> String {
    let mut result = String::new();

    for entity in entities {
        result.push_str("{\n");
        for (key, value) in &entity.properties {
            result.push_str(&format!("\"{}\" \"{}\"\n", key, value));
        }
        result.push_str("}\n");
    }

    result
}

impl Entity {
    /// Get property value
    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Set property value, replacing existing one
    pub fn set(&mut self, key: &str, value: String) {
        if let Some(entry) = self.properties.iter_mut().find(|(k, _)| k == key) {
            entry.1 = value;
        } else {
            self.properties.push((key.to_string(), value));
        }
    }

    /// Remove property
    pub fn remove(&mut self, key: &str) {
        self.properties.retain(|(k, _)| k != key);
    }

    /// Entity class name, empty if none
    pub fn classname(&self) -> &str {
        self.get("classname").unwrap_or("")
    }

    /// Float property, 0 if missing or malformed
    pub fn float(&self, key: &str) -> f64 {
        self.get(key)
            .and_then(|value| value.trim().parse::<f64>().ok())
            .unwrap_or(0.0)
    }

    /// Vector property, zero if missing or malformed
    pub fn vector(&self, key: &str) -> DVec3 {
        self.get(key)
            .and_then(parse_vector)
            .unwrap_or(DVec3::ZERO)
    }
}

impl Map {
    /// Find entity by property
    pub fn find_entity(&self, key: &str, value: Option<&str>) -> Option<&Entity> {
        self.entities
            .iter()
            .find(|entity| match (entity.get(key), value) {
                (Some(actual_value), Some(value)) => actual_value == value,
                (Some(_), None) => true,
                (None, _) => false,
            })
    }

    /// Write entity properties in map text format (brushes are not written)
    pub fn entity_string(&self) -> String {
        write_entities(&self.entities)
    }
}

#[cfg(test)]
mod tests {
    use glam::DVec3;

    use super::*;

    #[test]
    fn entity_properties() {
        let mut entity = Entity::default();
        entity.set("classname", "light".to_string());
        entity.set("origin", "1 2 3".to_string());
        entity.set("light", "200".to_string());
        entity.set("light", "300".to_string());

        assert_eq!(entity.classname(), "light");
        assert_eq!(entity.vector("origin"), DVec3::new(1.0, 2.0, 3.0));
        assert_eq!(entity.float("light"), 300.0);
        assert_eq!(entity.float("missing"), 0.0);
        assert_eq!(entity.properties.len(), 3);
    }

    #[test]
    fn entity_string_round_trip() {
        let mut entity = Entity::default();
        entity.set("classname", "worldspawn".to_string());
        entity.set("message", "hello world".to_string());

        let map = Map { entities: vec![entity] };
        let parsed = Map::parse(&map.entity_string()).unwrap();

        assert_eq!(parsed.entities.len(), 1);
        assert_eq!(parsed.entities[0].get("message"), Some("hello world"));
        assert!(parsed.find_entity("classname", Some("worldspawn")).is_some());
    }
}

// mod.rs
