#![allow(dead_code)]

///! Map building helpers shared by the integration tests

use glam::DVec3;

use wbspc::bsp::format::BspFile;

/// Axial box brush in map text format
pub fn box_brush(min: DVec3, max: DVec3, texture: &str) -> String {
    let (a, b) = (min, max);

    let sides = [
        [(a.x, a.y, a.z), (a.x, b.y, a.z), (a.x, a.y, b.z)],
        [(b.x, a.y, a.z), (b.x, a.y, b.z), (b.x, b.y, a.z)],
        [(a.x, a.y, a.z), (a.x, a.y, b.z), (b.x, a.y, a.z)],
        [(a.x, b.y, a.z), (b.x, b.y, a.z), (a.x, b.y, b.z)],
        [(a.x, a.y, a.z), (b.x, a.y, a.z), (a.x, b.y, a.z)],
        [(a.x, a.y, b.z), (a.x, b.y, b.z), (b.x, a.y, b.z)],
    ];

    let mut text = String::from("{\n");
    for side in sides {
        for (x, y, z) in side {
            text += &format!("( {} {} {} ) ", x, y, z);
        }
        text += &format!("{} 0 0 0 1 1\n", texture);
    }
    text += "}\n";

    text
}

/// Map of worldspawn with the brushes and extra point entities
pub fn world_map(brushes: &[String], entities: &str) -> String {
    format!("{{\n\"classname\" \"worldspawn\"\n{}}}\n{}", brushes.concat(), entities)
}

/// Face polygon of compiled file
pub fn face_points(file: &BspFile, face: usize) -> Vec<DVec3> {
    let face = file.faces[face];
    let first = face.first_edge as usize;

    file.surfedges[first..first + face.edge_count as usize]
        .iter()
        .map(|surfedge| {
            let [first, second] = { file.edges[surfedge.unsigned_abs() as usize].v };
            let vertex = if *surfedge >= 0 { first } else { second };

            DVec3::from(file.vertexes[vertex as usize].point)
        })
        .collect()
}

// common/mod.rs
