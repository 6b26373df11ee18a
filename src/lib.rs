pub mod config;
pub mod error;
pub mod extract;
pub mod identity;
pub mod matcher;
pub mod metadata;
pub mod resolver;
pub mod storage;

// Re-export index types for convenience
pub use stashface_ann::{AnnoyIndex, FlatIndex, IndexBuilder, NearestNeighbours, Neighbour};

pub use error::ResolveError;
pub use extract::EmbeddingExtractor;
pub use resolver::{Performer, ResolutionResult, Resolver, SearchParams};
pub use storage::Gallery;
