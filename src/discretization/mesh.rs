/// The complete computational grid.
#[derive(Clone, Debug, Default)]
pub struct Mesh {
    pub cells: Vec<Cell>,
    pub faces: Vec<Face>,
    pub nodes: Vec<Node>,
}

/// A single control volume.
#[derive(Clone, Debug)]
pub struct Cell {
    pub id: usize,
    pub volume: f64,
    pub centroid: [f64; 3],
    pub face_ids: Vec<usize>,
}

/// An interface between two cells, or between a cell and the boundary.
#[derive(Clone, Debug)]
pub struct Face {
    pub area: f64,
    pub normal: [f64; 3],
    /// `(inner cell, outer cell)`; the outer cell is `None` on the boundary.
    pub neighbor_cell_ids: (usize, Option<usize>),
    pub centroid: [f64; 3],
}

#[derive(Clone, Debug)]
pub struct Node {
    pub position: [f64; 3],
}

#[inline]
pub fn distance(p1: [f64; 3], p2: [f64; 3]) -> f64 {
    (0..=2).map(|i| (p2[i] - p1[i]).powi(2)).sum::<f64>().sqrt()
}

impl Face {
    pub fn is_boundary(&self) -> bool {
        self.neighbor_cell_ids.1.is_none()
    }

    /// Boundary faces of an extruded 2D mesh whose normal points out of plane
    /// (top and bottom caps) carry no flux.
    pub fn is_lateral(&self) -> bool {
        self.normal[2].abs() < 0.5
    }
}

impl Mesh {
    pub fn num_cells(&self) -> usize {
        self.cells.len()
    }

    pub fn volumes(&self) -> Vec<f64> {
        self.cells.iter().map(|c| c.volume).collect()
    }

    pub fn total_volume(&self) -> f64 {
        self.cells.iter().map(|c| c.volume).sum()
    }

    /// Two-point flux weight `area / distance` of a face, with the distance
    /// clamped from below by `min_distance`.
    ///
    /// Interior faces use the centroid-to-centroid distance, boundary faces
    /// the distance from the inner centroid to the face centroid.
    pub fn transmissibility(&self, face: &Face, min_distance: f64) -> f64 {
        let (k, outer) = face.neighbor_cell_ids;
        let d = match outer {
            Some(l) => distance(self.cells[k].centroid, self.cells[l].centroid),
            None => distance(face.centroid, self.cells[k].centroid),
        };
        face.area / d.max(min_distance)
    }

    pub fn interior_faces(&self) -> impl Iterator<Item = (usize, usize, &Face)> {
        self.faces.iter().filter_map(|f| match f.neighbor_cell_ids {
            (k, Some(l)) => Some((k, l, f)),
            (_, None) => None,
        })
    }

    /// Smallest and largest centroid spacing across interior faces.
    pub fn spacing(&self) -> Option<(f64, f64)> {
        self.interior_faces()
            .map(|(k, l, _)| distance(self.cells[k].centroid, self.cells[l].centroid))
            .fold(None, |acc, d| match acc {
                None => Some((d, d)),
                Some((lo, hi)) => Some((lo.min(d), hi.max(d))),
            })
    }
}
