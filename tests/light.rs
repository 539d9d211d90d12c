///! Radiosity scenarios

mod common;

use glam::DVec3;

use wbspc::{
    bsp::{compiler, format::BspFile},
    map::Map,
    options::{CompileOptions, LightOptions},
    threads::ThreadPool,
};

use common::{box_brush, face_points, world_map};

/// Hollow 128 unit cube with 16 unit walls
fn room_brushes() -> Vec<String> {
    let v = DVec3::new;

    vec![
        box_brush(v(-16.0, -16.0, -16.0), v(144.0, 144.0, 0.0), "tex/floor"),
        box_brush(v(-16.0, -16.0, 128.0), v(144.0, 144.0, 144.0), "tex/ceil"),
        box_brush(v(-16.0, -16.0, 0.0), v(0.0, 144.0, 128.0), "tex/wall"),
        box_brush(v(128.0, -16.0, 0.0), v(144.0, 144.0, 128.0), "tex/wall"),
        box_brush(v(0.0, -16.0, 0.0), v(128.0, 0.0, 128.0), "tex/wall"),
        box_brush(v(0.0, 128.0, 0.0), v(128.0, 144.0, 128.0), "tex/wall"),
    ]
}

/// Lightmap bytes of every face
fn face_lightmaps(file: &BspFile) -> Vec<Option<&[u8]>> {
    let offsets = file.faces.iter().map(|face| face.light_offset).collect::<Vec<_>>();

    offsets
        .iter()
        .map(|offset| {
            let start = usize::try_from(*offset).ok()?;
            let end = offsets
                .iter()
                .filter_map(|other| usize::try_from(*other).ok())
                .filter(|other| *other > start)
                .min()
                .unwrap_or(file.lighting.len());

            Some(&file.lighting[start..end])
        })
        .collect()
}

fn light_room(entities: &str, options: &LightOptions) -> BspFile {
    let text = world_map(&room_brushes(), entities);
    let mut file = compiler::compile_bsp(&Map::parse(&text).unwrap(), &CompileOptions::default()).unwrap();
    let pool = ThreadPool::new(2).unwrap();

    wbspc::light::light_bsp(&mut file, options, &pool).unwrap();

    file
}

#[test]
fn light_reaches_visible_surfaces_only() {
    let file = light_room(
        "{\n\"classname\" \"light\"\n\"origin\" \"64 64 64\"\n\"light\" \"300\"\n}\n",
        &LightOptions::default(),
    );
    let lightmaps = face_lightmaps(&file);

    assert_eq!(file.lighting[0], LightOptions::default().light_quant as u8);

    let mut inner = 0;
    let mut outer = 0;

    for (face, lightmap) in lightmaps.iter().enumerate() {
        let lightmap = lightmap.expect("every face of the room is lit");
        assert_eq!(lightmap.len() % 3, 0);

        let points = face_points(&file, face);
        let center = points.iter().copied().sum::<DVec3>() / points.len() as f64;

        if center.min_element() > -0.5 && center.max_element() < 128.5 {
            inner += 1;
            assert!(lightmap.iter().any(|value| *value > 1), "inner face {} is dark", face);
            assert!(lightmap.iter().all(|value| *value as f64 <= LightOptions::default().max_light));
        } else {
            outer += 1;
            assert!(lightmap.iter().all(|value| *value == 1), "outer face {} is lit", face);
        }
    }

    assert!(inner >= 6);
    assert!(outer >= 6);
}

#[test]
fn dark_room_gets_ambient_only() {
    let options = LightOptions {
        ambient: DVec3::splat(0.25),
        ..Default::default()
    };
    let file = light_room("", &options);

    // 0.25 * 128
    assert!(file.lighting[1..].iter().all(|value| *value == 32));
}

#[test]
fn bright_light_keeps_hue() {
    let options = LightOptions { bounce: 0, ..Default::default() };
    let file = light_room(
        "{\n\"classname\" \"light\"\n\"origin\" \"64 64 64\"\n\"light\" \"100000\"\n\"_color\" \"1 0.5 0.5\"\n}\n",
        &options,
    );

    let max_light = options.max_light as u8;
    let saturated = file.lighting[1..]
        .chunks_exact(3)
        .filter(|color| color[0] >= max_light - 1)
        .collect::<Vec<_>>();

    assert!(!saturated.is_empty());
    assert!(saturated.iter().all(|color| color[0] <= max_light));
    assert!(saturated.iter().all(|color| color[1] == color[2] && color[1] < color[0]));
}

// light.rs
