//! Camera pixel layout and neighbor adjacency.
//!
//! A `CameraGeometry` is immutable per telescope: pixel centers on the
//! focal plane, pixel areas and shapes, and a sparse symmetric neighbor
//! matrix derived from pairwise center distances. Cleaning, morphology,
//! and leakage all reduce to walks over this adjacency.

use crate::error::GeometryError;

/// Pixel shape on the focal plane.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelShape {
    /// Square pixel (code 1).
    Square,
    /// Hexagonal pixel (code 2).
    Hexagon,
}

impl PixelShape {
    /// Decode the on-disk shape code.
    pub fn from_code(code: i32) -> Result<Self, GeometryError> {
        match code {
            1 => Ok(PixelShape::Square),
            2 => Ok(PixelShape::Hexagon),
            other => Err(GeometryError::UnknownPixelShape(other)),
        }
    }

    /// On-disk shape code.
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            PixelShape::Square => 1,
            PixelShape::Hexagon => 2,
        }
    }

    /// Neighbor-distance factor applied to `sqrt(max pixel area)`.
    fn neighbor_factor(self) -> f64 {
        match self {
            PixelShape::Square => 1.1,
            PixelShape::Hexagon => 1.4,
        }
    }

    /// Upper bound on interior neighbor count.
    fn neighbor_bound(self) -> usize {
        match self {
            PixelShape::Square => 4,
            PixelShape::Hexagon => 8,
        }
    }
}

/// Symmetric 0/1 adjacency stored as compressed sparse rows.
///
/// Entry (i, j) is set iff pixel j is a geometric neighbor of pixel i;
/// self-entries are never set. Neighbor lookups and mask dilations are
/// O(edges).
#[derive(Clone, Debug)]
pub struct NeighborMatrix {
    row_ptr: Vec<usize>,
    col_idx: Vec<usize>,
}

impl NeighborMatrix {
    fn from_rows(rows: Vec<Vec<usize>>) -> Self {
        let mut row_ptr = Vec::with_capacity(rows.len() + 1);
        let mut col_idx = Vec::new();
        row_ptr.push(0);
        for row in rows {
            col_idx.extend(row);
            row_ptr.push(col_idx.len());
        }
        Self { row_ptr, col_idx }
    }

    /// Number of rows (pixels).
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.row_ptr.len() - 1
    }

    /// Neighbor indices of pixel `i`.
    #[must_use]
    pub fn neighbors(&self, i: usize) -> &[usize] {
        &self.col_idx[self.row_ptr[i]..self.row_ptr[i + 1]]
    }

    /// Neighbor count of pixel `i`.
    #[must_use]
    pub fn degree(&self, i: usize) -> usize {
        self.row_ptr[i + 1] - self.row_ptr[i]
    }

    /// Sparse matrix-vector product against a boolean mask: for each
    /// pixel, the number of set neighbors.
    #[must_use]
    pub fn count_set_neighbors(&self, mask: &[bool]) -> Vec<usize> {
        let mut counts = vec![0usize; self.num_rows()];
        for (i, count) in counts.iter_mut().enumerate() {
            *count = self.neighbors(i).iter().filter(|&&j| mask[j]).count();
        }
        counts
    }

    /// Pixels that have at least one set neighbor in `mask`.
    #[must_use]
    pub fn has_set_neighbor(&self, mask: &[bool]) -> Vec<bool> {
        self.count_set_neighbors(mask)
            .into_iter()
            .map(|c| c > 0)
            .collect()
    }
}

/// Immutable per-telescope pixel layout plus derived adjacency.
#[derive(Clone, Debug)]
pub struct CameraGeometry {
    /// Camera model name.
    pub camera_name: String,
    /// Number of pixels.
    pub num_pixels: usize,
    /// Pixel center x coordinates (meters on the focal plane).
    pub pix_x: Vec<f64>,
    /// Pixel center y coordinates (meters on the focal plane).
    pub pix_y: Vec<f64>,
    /// Pixel areas (m^2).
    pub pix_area: Vec<f64>,
    /// Pixel shapes.
    pub pix_type: Vec<PixelShape>,
    /// Neighbor adjacency.
    pub neigh_matrix: NeighborMatrix,
    border_1: Vec<bool>,
    border_2: Vec<bool>,
}

impl CameraGeometry {
    /// Build a camera geometry and its neighbor matrix.
    ///
    /// Two pixels are neighbors iff their center distance is at most
    /// `factor * sqrt(max pixel area)`, with factor 1.4 for hexagonal and
    /// 1.1 for square pixels (the larger of the pair's factors applies).
    ///
    /// # Errors
    /// Fails if the pixel arrays disagree in length, a shape code is
    /// unknown, or the resulting adjacency violates the per-shape
    /// neighbor bound.
    pub fn new(
        camera_name: impl Into<String>,
        pix_x: Vec<f64>,
        pix_y: Vec<f64>,
        pix_area: Vec<f64>,
        pix_type_codes: &[i32],
    ) -> Result<Self, GeometryError> {
        let num_pixels = pix_x.len();
        for (name, len) in [
            ("pix_y", pix_y.len()),
            ("pix_area", pix_area.len()),
            ("pix_type", pix_type_codes.len()),
        ] {
            if len != num_pixels {
                return Err(GeometryError::LengthMismatch {
                    name,
                    got: len,
                    expected: num_pixels,
                });
            }
        }

        let pix_type = pix_type_codes
            .iter()
            .map(|&code| PixelShape::from_code(code))
            .collect::<Result<Vec<_>, _>>()?;

        let neigh_matrix = build_neighbors(&pix_x, &pix_y, &pix_area, &pix_type)?;
        let (border_1, border_2) = border_masks(&neigh_matrix);

        Ok(Self {
            camera_name: camera_name.into(),
            num_pixels,
            pix_x,
            pix_y,
            pix_area,
            pix_type,
            neigh_matrix,
            border_1,
            border_2,
        })
    }

    /// Rectangular grid of unit-area square pixels with unit spacing.
    ///
    /// Pixel `i` sits at `(i % nx, i / nx)`; handy for demos and tests.
    pub fn rectangular(
        camera_name: impl Into<String>,
        nx: usize,
        ny: usize,
    ) -> Result<Self, GeometryError> {
        let mut pix_x = Vec::with_capacity(nx * ny);
        let mut pix_y = Vec::with_capacity(nx * ny);
        for j in 0..ny {
            for i in 0..nx {
                pix_x.push(i as f64);
                pix_y.push(j as f64);
            }
        }
        let pix_area = vec![1.0; nx * ny];
        let pix_type = vec![1; nx * ny];
        Self::new(camera_name, pix_x, pix_y, pix_area, &pix_type)
    }

    /// Pixels on the outermost ring: fewer neighbors than the camera
    /// maximum.
    #[must_use]
    pub fn border_mask_1(&self) -> &[bool] {
        &self.border_1
    }

    /// Outermost ring widened by one dilation.
    #[must_use]
    pub fn border_mask_2(&self) -> &[bool] {
        &self.border_2
    }

}

/// Build the adjacency with a uniform spatial grid so construction stays
/// near O(N) for large cameras.
fn build_neighbors(
    pix_x: &[f64],
    pix_y: &[f64],
    pix_area: &[f64],
    pix_type: &[PixelShape],
) -> Result<NeighborMatrix, GeometryError> {
    let n = pix_x.len();
    if n == 0 {
        return Ok(NeighborMatrix::from_rows(Vec::new()));
    }

    let max_area = pix_area.iter().cloned().fold(0.0_f64, f64::max);
    let scale = max_area.sqrt();
    let max_radius = 1.4 * scale;

    let min_x = pix_x.iter().cloned().fold(f64::INFINITY, f64::min);
    let min_y = pix_y.iter().cloned().fold(f64::INFINITY, f64::min);
    let cell = max_radius.max(f64::MIN_POSITIVE);

    let mut grid: std::collections::HashMap<(i64, i64), Vec<usize>> =
        std::collections::HashMap::new();
    let cell_of = |x: f64, y: f64| {
        (
            ((x - min_x) / cell).floor() as i64,
            ((y - min_y) / cell).floor() as i64,
        )
    };
    for i in 0..n {
        grid.entry(cell_of(pix_x[i], pix_y[i])).or_default().push(i);
    }

    let mut rows: Vec<Vec<usize>> = vec![Vec::new(); n];
    for i in 0..n {
        let (ci, cj) = cell_of(pix_x[i], pix_y[i]);
        for di in -1..=1 {
            for dj in -1..=1 {
                let Some(candidates) = grid.get(&(ci + di, cj + dj)) else {
                    continue;
                };
                for &j in candidates {
                    if j <= i {
                        continue;
                    }
                    let radius = pix_type[i]
                        .neighbor_factor()
                        .max(pix_type[j].neighbor_factor())
                        * scale;
                    let dx = pix_x[i] - pix_x[j];
                    let dy = pix_y[i] - pix_y[j];
                    if dx * dx + dy * dy <= radius * radius {
                        rows[i].push(j);
                        rows[j].push(i);
                    }
                }
            }
        }
    }

    for row in &mut rows {
        row.sort_unstable();
    }

    for (i, row) in rows.iter().enumerate() {
        let bound = pix_type[i].neighbor_bound();
        if row.len() > bound {
            return Err(GeometryError::AdjacencyBound {
                pixel: i,
                count: row.len(),
                bound,
            });
        }
    }

    Ok(NeighborMatrix::from_rows(rows))
}

fn border_masks(neigh: &NeighborMatrix) -> (Vec<bool>, Vec<bool>) {
    let n = neigh.num_rows();
    let max_degree = (0..n).map(|i| neigh.degree(i)).max().unwrap_or(0);
    let border_1: Vec<bool> = (0..n).map(|i| neigh.degree(i) < max_degree).collect();
    let widened = neigh.has_set_neighbor(&border_1);
    let border_2: Vec<bool> = border_1
        .iter()
        .zip(&widened)
        .map(|(&b, &w)| b || w)
        .collect();
    (border_1, border_2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rectangular_grid_connectivity() {
        let camera = CameraGeometry::rectangular("test", 4, 4).unwrap();
        assert_eq!(camera.num_pixels, 16);
        // Center pixel 5 touches 1, 4, 6, 9; diagonals are beyond 1.1.
        assert_eq!(camera.neigh_matrix.neighbors(5), &[1, 4, 6, 9]);
        // Corner pixel 0 touches 1 and 4 only.
        assert_eq!(camera.neigh_matrix.neighbors(0), &[1, 4]);
    }

    #[test]
    fn test_adjacency_is_symmetric_without_self_entries() {
        let camera = CameraGeometry::rectangular("test", 5, 5).unwrap();
        let neigh = &camera.neigh_matrix;
        for i in 0..camera.num_pixels {
            assert!(!neigh.neighbors(i).contains(&i));
            for &j in neigh.neighbors(i) {
                assert!(neigh.neighbors(j).contains(&i));
            }
        }
    }

    #[test]
    fn test_border_masks_on_5x5() {
        let camera = CameraGeometry::rectangular("test", 5, 5).unwrap();
        let ring1 = camera.border_mask_1();
        let ring2 = camera.border_mask_2();
        assert_eq!(ring1.iter().filter(|&&b| b).count(), 16);
        assert_eq!(ring2.iter().filter(|&&b| b).count(), 24);
        // The exact center is the only pixel outside ring 2.
        assert!(!ring2[12]);
    }

    #[test]
    fn test_hexagon_code_widens_radius() {
        // Same integer grid, hex code: 1.4 still excludes diagonals
        // (sqrt 2) but keeps the 4-connectivity.
        let pix_x: Vec<f64> = (0..9).map(|i| (i % 3) as f64).collect();
        let pix_y: Vec<f64> = (0..9).map(|i| (i / 3) as f64).collect();
        let camera = CameraGeometry::new(
            "hex",
            pix_x,
            pix_y,
            vec![1.0; 9],
            &[2; 9],
        )
        .unwrap();
        assert_eq!(camera.neigh_matrix.neighbors(4), &[1, 3, 5, 7]);
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let err = CameraGeometry::new("bad", vec![0.0, 1.0], vec![0.0], vec![1.0; 2], &[1, 1])
            .unwrap_err();
        assert!(matches!(err, GeometryError::LengthMismatch { .. }));
    }

    #[test]
    fn test_unknown_pixel_shape_rejected() {
        let err =
            CameraGeometry::new("bad", vec![0.0], vec![0.0], vec![1.0], &[7]).unwrap_err();
        assert!(matches!(err, GeometryError::UnknownPixelShape(7)));
    }

    #[test]
    fn test_count_set_neighbors() {
        let camera = CameraGeometry::rectangular("test", 4, 4).unwrap();
        let mut mask = vec![false; 16];
        mask[10] = true;
        let counts = camera.neigh_matrix.count_set_neighbors(&mask);
        assert_eq!(counts[6], 1);
        assert_eq!(counts[9], 1);
        assert_eq!(counts[11], 1);
        assert_eq!(counts[14], 1);
        assert_eq!(counts[10], 0);
        assert_eq!(counts[0], 0);
    }
}
