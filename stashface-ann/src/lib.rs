//! Euclidean nearest-neighbour indexes over a fixed gallery of embeddings.
//!
//! [`AnnoyIndex`] reads and queries forests in the Annoy file layout,
//! [`IndexBuilder`] produces them offline, and [`FlatIndex`] is an exact
//! scan with the same interface.

mod node;

pub mod annoy;
pub mod builder;
pub mod error;
pub mod flat;

pub use annoy::AnnoyIndex;
pub use builder::IndexBuilder;
pub use error::AnnError;
pub use flat::FlatIndex;

/// A gallery slot returned by a query together with its L2 distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbour {
    pub slot: usize,
    pub distance: f32,
}

/// Read-only k-nearest-neighbour search over a gallery.
///
/// Implementations must be safe for concurrent queries (Send + Sync).
pub trait NearestNeighbours: Send + Sync {
    /// Dimensionality every query vector must have.
    fn dimensions(&self) -> usize;

    /// Number of gallery slots.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return at most `k` slots ordered by ascending distance.
    ///
    /// `search_k` bounds how many candidates are inspected; `None` lets the
    /// index pick its default. Fails with [`AnnError::DimensionMismatch`]
    /// if `vector` has the wrong length.
    fn query(
        &self,
        vector: &[f32],
        k: usize,
        search_k: Option<usize>,
    ) -> Result<Vec<Neighbour>, AnnError>;
}
