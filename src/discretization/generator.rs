use super::mesh::{Cell, Face, Mesh, Node};
use glam::DVec3;
use meshless_voronoi::Voronoi;

/// Build the raw Voronoi diagram of a box centered at the origin.
pub fn build_voronoi(generators: &[DVec3], width: [f64; 3]) -> Voronoi {
    Voronoi::build(
        generators,
        [-width[0] / 2.0, -width[1] / 2.0, -width[2] / 2.0].into(),
        width.into(),
        3,
        false,
    )
}

/// Convert a `Voronoi` diagram into a [`Mesh`].
pub fn parse_voronoi(voronoi: &Voronoi, generators: &[DVec3]) -> Mesh {
    let connections = voronoi.cell_face_connections();
    let cells = voronoi
        .cells()
        .iter()
        .enumerate()
        .map(|(id, cell)| Cell {
            id,
            volume: cell.volume(),
            centroid: cell.centroid().to_array(),
            face_ids: connections[cell.face_connections_offset()..][..cell.face_count()].to_vec(),
        })
        .collect();

    let faces = voronoi
        .faces()
        .iter()
        .map(|face| Face {
            area: face.area(),
            normal: face.normal().to_array(),
            neighbor_cell_ids: (face.left(), face.right()),
            centroid: face.centroid().to_array(),
        })
        .collect();

    let nodes = generators
        .iter()
        .map(|g| Node { position: g.to_array() })
        .collect();

    Mesh { cells, faces, nodes }
}

pub fn create_voronoi_mesh(generators: &[DVec3], width: [f64; 3]) -> Mesh {
    let voronoi = build_voronoi(generators, width);
    parse_voronoi(&voronoi, generators)
}

/// Voronoi mesh of the rectangle `[0, width[0]] x [0, width[1]]`, extruded by
/// `thickness` in z (one cell thick).
pub fn create_flat_3d_mesh(points_2d: &[(f64, f64)], width: [f64; 2], thickness: f64) -> Mesh {
    let generators: Vec<DVec3> = points_2d
        .iter()
        .map(|(x, y)| DVec3::new(*x - width[0] / 2.0, *y - width[1] / 2.0, 0.0))
        .collect();

    create_voronoi_mesh(&generators, [width[0], width[1], thickness])
}

/// Cell-centered points of an `nx` by `ny` grid on `[0, width[0]] x [0, width[1]]`.
pub fn create_regular_2d_grid(width: [f64; 2], nx: usize, ny: usize) -> Vec<(f64, f64)> {
    let dx = width[0] / nx as f64;
    let dy = width[1] / ny as f64;

    (0..ny)
        .flat_map(|j| (0..nx).map(move |i| ((i as f64 + 0.5) * dx, (j as f64 + 0.5) * dy)))
        .collect()
}

/// Like [`create_regular_2d_grid`] but with every point shifted by a
/// deterministic offset of at most `amplitude` cell widths, giving genuinely
/// polygonal Voronoi cells.
pub fn create_perturbed_2d_grid(width: [f64; 2], nx: usize, ny: usize, amplitude: f64) -> Vec<(f64, f64)> {
    let dx = width[0] / nx as f64;
    let dy = width[1] / ny as f64;
    create_regular_2d_grid(width, nx, ny)
        .into_iter()
        .enumerate()
        .map(|(n, (x, y))| {
            let t = n as f64;
            let sx = (t * 12.9898).sin() * amplitude * dx;
            let sy = (t * 78.233).cos() * amplitude * dy;
            (x + sx, y + sy)
        })
        .collect()
}

/// Uniform 1D mesh of `[0, length]` with unit cross-section.
///
/// Interior faces point in `+x`; the two end faces are boundary faces with
/// outward normals `-x` and `+x`.
pub fn create_interval_mesh(length: f64, num_cells: usize) -> Mesh {
    if num_cells == 0 {
        return Mesh::default();
    }

    let h = length / num_cells as f64;
    let mut faces = Vec::with_capacity(num_cells + 1);
    let mut cells: Vec<Cell> = (0..num_cells)
        .map(|id| Cell {
            id,
            volume: h,
            centroid: [(id as f64 + 0.5) * h, 0.0, 0.0],
            face_ids: Vec::with_capacity(2),
        })
        .collect();

    for i in 0..=num_cells {
        let (neighbors, normal) = match i {
            0 => ((0, None), [-1.0, 0.0, 0.0]),
            _ if i == num_cells => ((num_cells - 1, None), [1.0, 0.0, 0.0]),
            _ => ((i - 1, Some(i)), [1.0, 0.0, 0.0]),
        };
        let face_id = faces.len();
        cells[neighbors.0].face_ids.push(face_id);
        if let Some(l) = neighbors.1 {
            cells[l].face_ids.push(face_id);
        }
        faces.push(Face {
            area: 1.0,
            normal,
            neighbor_cell_ids: neighbors,
            centroid: [i as f64 * h, 0.0, 0.0],
        });
    }

    let nodes = cells.iter().map(|c| Node { position: c.centroid }).collect();
    Mesh { cells, faces, nodes }
}
