use crate::error::AnnError;
use crate::node::squared_l2;
use crate::{NearestNeighbours, Neighbour};

/// FlatIndex answers queries by exhaustive Euclidean scan.
/// Exact, so useful as a recall baseline and for small galleries.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    dims: usize,
    vectors: Vec<f32>,
}

impl FlatIndex {
    pub fn new(dims: usize) -> Result<Self, AnnError> {
        if dims == 0 {
            return Err(AnnError::InvalidFormat("invalid dimension 0".into()));
        }
        Ok(Self {
            dims,
            vectors: Vec::new(),
        })
    }

    /// Append a vector, returning its slot.
    pub fn push(&mut self, vector: &[f32]) -> Result<usize, AnnError> {
        if vector.len() != self.dims {
            return Err(AnnError::DimensionMismatch {
                got: vector.len(),
                want: self.dims,
            });
        }
        self.vectors.extend_from_slice(vector);
        Ok(self.len() - 1)
    }
}

impl NearestNeighbours for FlatIndex {
    fn dimensions(&self) -> usize {
        self.dims
    }

    fn len(&self) -> usize {
        self.vectors.len() / self.dims
    }

    fn query(
        &self,
        vector: &[f32],
        k: usize,
        _search_k: Option<usize>,
    ) -> Result<Vec<Neighbour>, AnnError> {
        if vector.len() != self.dims {
            return Err(AnnError::DimensionMismatch {
                got: vector.len(),
                want: self.dims,
            });
        }

        let mut scored: Vec<(f32, usize)> = self
            .vectors
            .chunks_exact(self.dims)
            .enumerate()
            .map(|(slot, v)| (squared_l2(v, vector), slot))
            .collect();
        scored.sort_by(|a, b| a.0.total_cmp(&b.0));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(d, slot)| Neighbour {
                slot,
                distance: d.sqrt(),
            })
            .collect())
    }
}
