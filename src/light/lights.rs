///! Direct light sources: emitting surfaces, light entities, sun and ambient

use glam::DVec3;

use crate::{map::Entity, options::LightOptions};

use super::patches::{color_normalize, Patch};

/// Patches emitting at least this much light in some channel become direct lights
pub const DIRECT_LIGHT: f64 = 3.0;

/// Intensity of light entity without "light" key
const DEFAULT_LIGHT: f64 = 100.0;

/// Spotlight cone of light entity without "_cone" key, degrees
const DEFAULT_CONE: f64 = 10.0;

/// Angle value meaning 'straight up'
const ANGLE_UP: f64 = -1.0;

/// Angle value meaning 'straight down'
const ANGLE_DOWN: f64 = -2.0;

/// Direct light kind
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum LightKind {
    /// Omnidirectional, linear falloff
    Point,

    /// Point light limited by cone
    Spot {
        /// Cone axis
        direction: DVec3,

        /// Cosine of cone half angle
        stop_dot: f64,
    },

    /// Emitting patch, inverse square falloff
    Surface {
        /// Emitting surface normal
        normal: DVec3,
    },
}

/// Light source
#[derive(Copy, Clone, Debug)]
pub struct DirectLight {
    /// Light position
    pub origin: DVec3,

    /// Normalized color
    pub color: DVec3,

    /// Intensity
    pub intensity: f64,

    /// Light kind
    pub kind: LightKind,
}

/// Sunlight, infinitely far light
#[derive(Copy, Clone, Debug)]
pub struct Sun {
    /// Intensity
    pub intensity: f64,

    /// Direction to the sun
    pub direction: DVec3,

    /// Normalized color
    pub color: DVec3,
}

/// All the light sources of the map
#[derive(Clone, Debug, Default)]
pub struct Lights {
    /// Point, spot and surface lights
    pub direct: Vec<DirectLight>,

    /// Sun, if any
    pub sun: Option<Sun>,

    /// Ambient light added to every sample
    pub ambient: DVec3,
}

impl DirectLight {
    /// Light contribution scale at the position with the surface normal
    /// (`delta` is normalized direction to light). None if light doesn't reach the point.
    pub fn scale(&self, delta: DVec3, distance: f64, normal: DVec3) -> Option<f64> {
        let dot = delta.dot(normal);

        // behind sample surface
        if dot <= 0.001 {
            return None;
        }

        let scale = match self.kind {
            LightKind::Point => (self.intensity - distance) * dot,
            LightKind::Surface { normal: light_normal } => {
                let dot2 = -delta.dot(light_normal);
                if dot2 <= 0.001 {
                    return None;
                }
                self.intensity / (distance * distance) * dot * dot2
            }
            LightKind::Spot { direction, stop_dot } => {
                let dot2 = -delta.dot(direction);
                if dot2 <= stop_dot {
                    return None;
                }
                (self.intensity - distance) * dot
            }
        };

        (scale > 0.0).then_some(scale)
    }
}

/// Direction of yaw angle, with special up and down values
fn angle_direction(angle: f64) -> DVec3 {
    if angle == ANGLE_UP {
        DVec3::Z
    } else if angle == ANGLE_DOWN {
        DVec3::NEG_Z
    } else {
        let radians = angle.to_radians();
        DVec3::new(radians.cos(), radians.sin(), 0.0)
    }
}

/// Light of `light*` entity
fn entity_light(entity: &Entity, entities: &[Entity], options: &LightOptions) -> DirectLight {
    let origin = entity.vector("origin");

    let mut intensity = entity.float("light");
    if intensity == 0.0 {
        intensity = DEFAULT_LIGHT;
    }

    let color = match entity.get("_color") {
        Some(value) if value.len() > 1 => color_normalize(entity.vector("_color")).1,
        _ => DVec3::ONE,
    };

    let target = entity.get("target").unwrap_or("");
    let kind = if entity.classname() == "light_spot" || !target.is_empty() {
        let mut cone = entity.float("_cone");
        if cone == 0.0 {
            cone = DEFAULT_CONE;
        }

        let direction = if target.is_empty() {
            angle_direction(entity.float("angle"))
        } else {
            match entities.iter().find(|e| e.get("targetname") == Some(target)) {
                Some(e) => (e.vector("origin") - origin).normalize_or_zero(),
                None => {
                    log::warn!(
                        "light at ({} {} {}) has missing target '{}'",
                        origin.x as i32, origin.y as i32, origin.z as i32, target
                    );
                    DVec3::NEG_Z
                }
            }
        };

        LightKind::Spot { direction, stop_dot: cone.to_radians().cos() }
    } else {
        LightKind::Point
    };

    DirectLight {
        origin,
        color,
        intensity: intensity * options.entity_scale,
        kind,
    }
}

/// Worldspawn sun and ambient
fn world_lights(world: &Entity, options: &LightOptions) -> (Option<Sun>, DVec3) {
    let suffix = if options.day { "day" } else { "night" };
    let key = |name: &str| format!("{}_{}", name, suffix);

    let intensity = world
        .get(&key("light"))
        .and_then(|value| value.trim().parse::<f64>().ok())
        .unwrap_or(0.0);

    let direction = match world.get(&key("angles")) {
        Some(_) => {
            let angles = world.vector(&key("angles"));
            let (pitch, yaw) = (angles.x.to_radians(), angles.y.to_radians());
            DVec3::new(yaw.cos() * pitch.sin(), yaw.sin() * pitch.sin(), pitch.cos())
        }
        None => DVec3::Z,
    };

    let color = match world.get(&key("color")) {
        Some(_) => color_normalize(world.vector(&key("color"))).1,
        None => DVec3::ONE,
    };

    let ambient = match world.get(&key("ambient")) {
        Some(_) => world.vector(&key("ambient")),
        None => options.ambient,
    };

    let sun = (intensity != 0.0).then_some(Sun { intensity, direction, color });

    (sun, ambient * 128.0)
}

/// Collect light sources. Emitting patches send all their light as direct
/// lights, so their total light is cleared.
pub fn create_direct_lights(patches: &mut [Patch], entities: &[Entity], options: &LightOptions) -> Lights {
    let mut direct = Vec::new();

    for patch in patches.iter_mut() {
        if patch.total_light.max_element() < DIRECT_LIGHT {
            continue;
        }

        let (intensity, color) = color_normalize(patch.total_light);

        direct.push(DirectLight {
            origin: patch.origin,
            color,
            intensity: intensity * patch.area * options.direct_scale,
            kind: LightKind::Surface { normal: patch.normal },
        });

        // all sent now
        patch.total_light = DVec3::ZERO;
    }

    for entity in entities.iter().skip(1) {
        if !entity.classname().starts_with("light") {
            continue;
        }

        // lights for the night version only
        if options.day && entity.float("spawnflags") as i32 & 1 == 0 {
            continue;
        }

        direct.push(entity_light(entity, entities, options));
    }

    let (sun, ambient) = match entities.first() {
        Some(world) => world_lights(world, options),
        None => (None, options.ambient * 128.0),
    };

    log::info!(
        "{} direct lights for {} lightmap",
        direct.len(),
        if options.day { "day" } else { "night" }
    );

    Lights { direct, sun, ambient }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use crate::map::Map;

    use super::*;

    fn entities(text: &str) -> Vec<Entity> {
        Map::parse(text).unwrap().entities
    }

    #[test]
    fn light_entities() {
        let entities = entities(r#"
            { "classname" "worldspawn" "light_night" "150" "angles_night" "90 0 0" "ambient_night" "0.1 0.1 0.2" }
            { "classname" "light" "origin" "0 0 64" "_color" "1 0.5 0.5" }
            { "classname" "light_spot" "origin" "0 0 128" "angle" "-2" "light" "300" }
            { "classname" "light" "origin" "64 0 128" "target" "t1" }
            { "classname" "info_null" "targetname" "t1" "origin" "64 0 0" }
        "#);
        let lights = create_direct_lights(&mut [], &entities, &LightOptions::default());

        assert_eq!(lights.direct.len(), 3);

        let point = lights.direct[0];
        assert_eq!(point.kind, LightKind::Point);
        assert_eq!(point.intensity, 100.0);
        assert_eq!(point.color, DVec3::new(1.0, 0.5, 0.5));

        let LightKind::Spot { direction, stop_dot } = lights.direct[1].kind else {
            panic!("spotlight expected");
        };
        assert_eq!(direction, DVec3::NEG_Z);
        assert_relative_eq!(stop_dot, 10.0f64.to_radians().cos());

        let LightKind::Spot { direction, .. } = lights.direct[2].kind else {
            panic!("targeted light must be a spotlight");
        };
        assert_relative_eq!(direction.z, -1.0);

        let sun = lights.sun.unwrap();
        assert_eq!(sun.intensity, 150.0);
        assert_relative_eq!(sun.direction.x, 1.0, epsilon = 1e-9);
        assert_relative_eq!(lights.ambient.z, 25.6, epsilon = 1e-9);
    }

    #[test]
    fn day_uses_day_lights_only() {
        let entities = entities(r#"
            { "classname" "worldspawn" "light_night" "150" }
            { "classname" "light" "origin" "0 0 64" }
            { "classname" "light" "origin" "0 0 64" "spawnflags" "1" }
        "#);
        let options = LightOptions { day: true, ..Default::default() };
        let lights = create_direct_lights(&mut [], &entities, &options);

        assert_eq!(lights.direct.len(), 1);
        assert!(lights.sun.is_none());
    }

    #[test]
    fn point_light_falloff() {
        let light = DirectLight {
            origin: DVec3::new(0.0, 0.0, 64.0),
            color: DVec3::ONE,
            intensity: 100.0,
            kind: LightKind::Point,
        };

        assert_relative_eq!(light.scale(DVec3::Z, 64.0, DVec3::Z).unwrap(), 36.0);
        assert!(light.scale(DVec3::Z, 120.0, DVec3::Z).is_none());
        assert!(light.scale(DVec3::Z, 10.0, DVec3::NEG_Z).is_none());
    }
}

// lights.rs
