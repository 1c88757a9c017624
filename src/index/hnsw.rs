//! Approximate nearest-neighbor table operator backing `vector_search`,
//! gated behind the `vectors` feature. HNSW graph construction/search
//! internals are an external collaborator per the engine's scope: this
//! module is a thin, safe wrapper over `hnsw_rs`, not a reimplementation.
//!
//! Unlike [`super::btree::BPlusTree`] and [`super::CompositeHashIndex`],
//! this index is rebuilt from its stored vectors on every query rather than
//! incrementally maintained -- `vector_search` is expected to run over a
//! materialized table snapshot per query, not a live mutating index.

use hnsw_rs::dist::DistL2;
use hnsw_rs::hnsw::Hnsw;

/// Row id + vector pairs handed to [`search`].
pub struct VectorColumn<'a> {
    pub row_ids: &'a [usize],
    pub vectors: &'a [Vec<f32>],
}

/// Returns up to `k` `(row_id, distance)` pairs nearest to `query`, ordered
/// nearest-first. Empty input yields an empty result rather than an error.
pub fn search(column: VectorColumn<'_>, query: &[f32], k: usize) -> Vec<(usize, f64)> {
    if column.vectors.is_empty() || k == 0 {
        return Vec::new();
    }
    let max_elements = column.vectors.len();
    let ef_construction = 200;
    let max_layer = ((max_elements as f64).ln() / 16f64.ln()).ceil().clamp(4.0, 16.0) as usize;
    let mut hnsw: Hnsw<f32, DistL2> = Hnsw::new(16, max_elements, max_layer, ef_construction, DistL2);
    for (idx, vector) in column.vectors.iter().enumerate() {
        hnsw.insert((vector.as_slice(), idx));
    }

    let ef_search = (k * 4).max(ef_construction);
    hnsw.search(query, k, ef_search)
        .into_iter()
        .map(|neighbour| (column.row_ids[neighbour.d_id], f64::from(neighbour.distance)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nearest_neighbor_of_an_exact_match_is_itself() {
        let row_ids = [10, 20, 30];
        let vectors = vec![vec![0.0, 0.0], vec![1.0, 1.0], vec![5.0, 5.0]];
        let results = search(
            VectorColumn {
                row_ids: &row_ids,
                vectors: &vectors,
            },
            &[1.0, 1.0],
            1,
        );
        assert_eq!(results[0].0, 20);
    }

    #[test]
    fn empty_column_returns_no_results() {
        let row_ids: [usize; 0] = [];
        let vectors: Vec<Vec<f32>> = Vec::new();
        let results = search(
            VectorColumn {
                row_ids: &row_ids,
                vectors: &vectors,
            },
            &[1.0, 1.0],
            5,
        );
        assert!(results.is_empty());
    }
}
