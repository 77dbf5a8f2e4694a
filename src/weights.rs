//! Row-standardized contiguity weights over the district polygons.
//!
//! Adjacency is rook contiguity (shared boundary with positive length),
//! found with an R-tree candidate pass and confirmed via the DE-9IM
//! boundary/boundary entry. Rows are standardized to sum to 1 ("W" style);
//! an island district keeps an all-zero row and therefore contributes a
//! neutral (zero) spatial lag, the permissive policy, logged explicitly.

use anyhow::Result;
use geo::{BoundingRect, MultiPolygon, Rect, Relate};
use log::warn;
use nalgebra::DMatrix;
use rstar::{RTree, RTreeObject, AABB};

#[derive(Debug, Clone)]
struct BoundingBox {
    idx: usize,
    bbox: Rect<f64>,
}

impl RTreeObject for BoundingBox {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(self.bbox.min().into(), self.bbox.max().into())
    }
}

/// Neighbor lists plus their row-standardized weights.
#[derive(Debug, Clone)]
pub struct SpatialWeights {
    neighbors: Vec<Vec<u32>>,
}

impl SpatialWeights {
    /// Build rook-contiguity weights from the district polygons.
    pub fn contiguity(polygons: &[MultiPolygon<f64>]) -> Result<Self> {
        let rtree = RTree::bulk_load(
            polygons.iter().enumerate()
                .filter_map(|(i, poly)| {
                    poly.bounding_rect().map(|bbox| BoundingBox { idx: i, bbox })
                })
                .collect(),
        );

        let mut neighbors: Vec<Vec<u32>> = vec![Vec::new(); polygons.len()];

        for i in 0..polygons.len() {
            let Some(rect) = polygons[i].bounding_rect() else { continue };
            let search = AABB::from_corners(
                [rect.min().x, rect.min().y],
                [rect.max().x, rect.max().y],
            );

            for cand in rtree.locate_in_envelope_intersecting(&search) {
                let j = cand.idx;
                if j <= i { continue; } // check each unordered pair once

                let im = polygons[i].relate(&polygons[j]);

                // Rook predicate: touches, and boundary∩boundary has
                // dimension 1 (index 4 of the DE-9IM string).
                if im.is_touches() && im.matches("****1****")? {
                    neighbors[i].push(j as u32);
                    neighbors[j].push(i as u32);
                }
            }
        }

        let weights = Self { neighbors };
        let islands = weights.islands();
        if !islands.is_empty() {
            warn!(
                "spatial weights: {} island district(s) with zero neighbors; \
                 they receive a zero spatial lag",
                islands.len()
            );
        }
        Ok(weights)
    }

    /// Build weights directly from neighbor lists (tests, synthetic grids).
    pub fn from_neighbors(neighbors: Vec<Vec<u32>>) -> Self {
        Self { neighbors }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }

    #[inline]
    pub fn degree(&self, i: usize) -> usize {
        self.neighbors[i].len()
    }

    #[inline]
    pub fn neighbors_of(&self, i: usize) -> &[u32] {
        &self.neighbors[i]
    }

    /// Indices of zero-neighbor districts.
    pub fn islands(&self) -> Vec<usize> {
        self.neighbors.iter().enumerate()
            .filter(|(_, n)| n.is_empty())
            .map(|(i, _)| i)
            .collect()
    }

    /// Row-standardized weight of the edge i→j: 1/degree(i).
    #[inline]
    fn weight(&self, i: usize) -> f64 {
        match self.neighbors[i].len() {
            0 => 0.0,
            d => 1.0 / d as f64,
        }
    }

    /// Row-standardized spatial lag: (Wx)ᵢ = mean of x over i's neighbors.
    /// Islands get 0 (the permissive policy).
    pub fn lag(&self, values: &[f64]) -> Vec<f64> {
        assert_eq!(values.len(), self.len(), "lag input length must match weights");
        self.neighbors.iter()
            .map(|nbrs| {
                if nbrs.is_empty() {
                    0.0
                } else {
                    nbrs.iter().map(|&j| values[j as usize]).sum::<f64>() / nbrs.len() as f64
                }
            })
            .collect()
    }

    /// Dense row-standardized W (eigenvalue computation, impact traces).
    pub fn to_dense(&self) -> DMatrix<f64> {
        let n = self.len();
        let mut w = DMatrix::zeros(n, n);
        for (i, nbrs) in self.neighbors.iter().enumerate() {
            let wij = self.weight(i);
            for &j in nbrs {
                w[(i, j as usize)] = wij;
            }
        }
        w
    }

    /// Similar symmetric matrix D^{-1/2} A D^{-1/2}: same spectrum as the
    /// row-standardized W (similarity transform), but real-symmetric, so the
    /// eigenvalues can be taken from a symmetric solver.
    pub fn to_symmetric(&self) -> DMatrix<f64> {
        let n = self.len();
        let mut m = DMatrix::zeros(n, n);
        for (i, nbrs) in self.neighbors.iter().enumerate() {
            for &j in nbrs {
                let j = j as usize;
                let dij = (self.degree(i) * self.degree(j)) as f64;
                if dij > 0.0 {
                    m[(i, j)] = 1.0 / dij.sqrt();
                }
            }
        }
        m
    }

    /// Σᵢⱼ wᵢⱼ: one per non-island row under row standardization.
    pub fn s0(&self) -> f64 {
        self.neighbors.iter().filter(|n| !n.is_empty()).count() as f64
    }

    /// ½ Σᵢⱼ (wᵢⱼ + wⱼᵢ)², a Moran variance term.
    pub fn s1(&self) -> f64 {
        let mut sum = 0.0;
        for (i, nbrs) in self.neighbors.iter().enumerate() {
            for &j in nbrs {
                let wij = self.weight(i);
                let wji = self.weight(j as usize);
                sum += (wij + wji) * (wij + wji);
            }
        }
        sum / 2.0
    }

    /// Σᵢ (Σⱼ wᵢⱼ + Σⱼ wⱼᵢ)², a Moran variance term.
    pub fn s2(&self) -> f64 {
        let n = self.len();
        let mut row_sums = vec![0.0; n];
        let mut col_sums = vec![0.0; n];
        for (i, nbrs) in self.neighbors.iter().enumerate() {
            let wij = self.weight(i);
            for &j in nbrs {
                row_sums[i] += wij;
                col_sums[j as usize] += wij;
            }
        }
        (0..n).map(|i| (row_sums[i] + col_sums[i]) * (row_sums[i] + col_sums[i])).sum()
    }

    /// Weighted cross-product Σᵢⱼ wᵢⱼ zᵢ zⱼ (Moran numerator).
    pub fn cross_product(&self, z: &[f64]) -> f64 {
        assert_eq!(z.len(), self.len());
        self.neighbors.iter().enumerate()
            .map(|(i, nbrs)| {
                let wij = self.weight(i);
                nbrs.iter().map(|&j| wij * z[i] * z[j as usize]).sum::<f64>()
            })
            .sum()
    }
}

/// Rook-contiguity neighbor lists for a rows×cols grid of square cells,
/// row-major. Shared by the unit tests and the synthetic end-to-end test.
pub fn grid_neighbors(rows: usize, cols: usize) -> Vec<Vec<u32>> {
    let mut neighbors = vec![Vec::new(); rows * cols];
    for r in 0..rows {
        for c in 0..cols {
            let i = r * cols + c;
            if c + 1 < cols {
                neighbors[i].push((i + 1) as u32);
                neighbors[i + 1].push(i as u32);
            }
            if r + 1 < rows {
                neighbors[i].push((i + cols) as u32);
                neighbors[i + cols].push(i as u32);
            }
        }
    }
    neighbors
}

#[cfg(test)]
mod tests {
    use geo::polygon;

    use super::*;

    /// 2×2 grid of unit squares, row-major: 0 1 / 2 3.
    fn four_squares() -> Vec<MultiPolygon<f64>> {
        let square = |x: f64, y: f64| {
            MultiPolygon(vec![polygon![
                (x: x, y: y), (x: x + 1.0, y: y), (x: x + 1.0, y: y + 1.0), (x: x, y: y + 1.0),
            ]])
        };
        vec![square(0.0, 1.0), square(1.0, 1.0), square(0.0, 0.0), square(1.0, 0.0)]
    }

    #[test]
    fn rook_contiguity_on_a_grid() {
        let weights = SpatialWeights::contiguity(&four_squares()).unwrap();
        assert_eq!(weights.len(), 4);
        // Each cell borders exactly its two edge neighbors, not the diagonal.
        for i in 0..4 {
            assert_eq!(weights.degree(i), 2, "cell {i}");
        }
        assert!(weights.islands().is_empty());
    }

    #[test]
    fn island_keeps_zero_row() {
        let square = |x: f64| {
            MultiPolygon(vec![polygon![
                (x: x, y: 0.0), (x: x + 1.0, y: 0.0), (x: x + 1.0, y: 1.0), (x: x, y: 1.0),
            ]])
        };
        // Third square is far away: an island.
        let weights = SpatialWeights::contiguity(&[square(0.0), square(1.0), square(50.0)]).unwrap();
        assert_eq!(weights.islands(), vec![2]);

        let lag = weights.lag(&[1.0, 3.0, 7.0]);
        assert_eq!(lag[0], 3.0);
        assert_eq!(lag[1], 1.0);
        assert_eq!(lag[2], 0.0); // neutral lag for the island
    }

    #[test]
    fn rows_sum_to_one_except_islands() {
        let mut neighbors = grid_neighbors(3, 3);
        neighbors.push(Vec::new()); // append an island
        let weights = SpatialWeights::from_neighbors(neighbors);

        let w = weights.to_dense();
        for i in 0..weights.len() {
            let row_sum: f64 = w.row(i).iter().sum();
            if weights.degree(i) == 0 {
                assert_eq!(row_sum, 0.0);
            } else {
                assert!((row_sum - 1.0).abs() < 1e-9, "row {i} sums to {row_sum}");
            }
        }
    }

    #[test]
    fn lag_is_neighbor_mean() {
        let weights = SpatialWeights::from_neighbors(grid_neighbors(1, 3));
        let lag = weights.lag(&[10.0, 20.0, 40.0]);
        assert_eq!(lag, vec![20.0, 25.0, 20.0]);
    }

    #[test]
    fn symmetric_form_has_same_trace_structure() {
        let weights = SpatialWeights::from_neighbors(grid_neighbors(2, 2));
        let w = weights.to_dense();
        let s = weights.to_symmetric();
        // Both are hollow; their traces agree (similarity preserves them).
        assert_eq!(w.trace(), 0.0);
        assert_eq!(s.trace(), 0.0);
        // tr(W²) = tr(S²) since S = D^{1/2} W D^{-1/2}.
        assert!(((&w * &w).trace() - (&s * &s).trace()).abs() < 1e-9);
    }

    #[test]
    fn moran_sums_on_a_line() {
        // 1–2–3 path graph, row-standardized.
        let weights = SpatialWeights::from_neighbors(grid_neighbors(1, 3));
        assert_eq!(weights.s0(), 3.0);
        // S1: pairs (0,1): w01=1, w10=0.5 -> 2.25 ; (1,2): 0.5+1 -> 2.25 ; sum = 4.5
        assert!((weights.s1() - 4.5).abs() < 1e-12);
        // S2: node 0: row 1 + col 0.5 ; node 1: row 1 + col 2 ; node 2: row 1 + col 0.5
        let expect = (1.5f64 * 1.5) + (3.0 * 3.0) + (1.5 * 1.5);
        assert!((weights.s2() - expect).abs() < 1e-12);
    }
}
